//! Randomised maze generation.
//!
//! Mazes are carved as a depth-first spanning tree over the board, converted
//! to the shared wall-grid layout, then loosened: a few exits are punched into
//! the bottom edge and a share of interior walls is knocked out so the maze
//! has loops.

use marble_maze_shared::config::GameConfig;
use marble_maze_shared::maze::{grid_len, wall_index, Direction, WallCell};
use rand::seq::SliceRandom;
use rand::Rng;

/// A board cell during carving, with one wall flag per [`Direction`].
#[derive(Debug, Clone, Copy)]
struct CarveCell {
    walls: [bool; 4],
}

impl CarveCell {
    fn untouched(&self) -> bool {
        self.walls.iter().all(|&w| w)
    }
}

/// A cell on the carving stack with its neighbours in visiting order.
struct Frame {
    x: usize,
    y: usize,
    neighbours: Vec<(usize, usize, Direction)>,
    next: usize,
}

impl Frame {
    fn enter(x: usize, y: usize, size: usize, rng: &mut impl Rng) -> Self {
        let mut neighbours: Vec<_> = Direction::ALL
            .into_iter()
            .filter_map(|dir| dir.step(x, y, size).map(|(nx, ny)| (nx, ny, dir)))
            .collect();
        neighbours.shuffle(rng);
        Self {
            x,
            y,
            neighbours,
            next: 0,
        }
    }
}

/// Randomised depth-first carve from `(0, 0)`. Cells are row-major.
///
/// Uses an explicit stack, visiting neighbours in the same order as the
/// recursive formulation so a given seed always yields the same maze.
fn carve(size: usize, rng: &mut impl Rng) -> Vec<CarveCell> {
    let mut cells = vec![CarveCell { walls: [true; 4] }; size * size];
    if size == 0 {
        return cells;
    }

    let mut stack = vec![Frame::enter(0, 0, size, rng)];
    while let Some(top) = stack.last_mut() {
        let Some(&(nx, ny, dir)) = top.neighbours.get(top.next) else {
            stack.pop();
            continue;
        };
        top.next += 1;
        let (x, y) = (top.x, top.y);

        if !cells[ny * size + nx].untouched() {
            continue;
        }
        cells[y * size + x].walls[dir as usize] = false;
        cells[ny * size + nx].walls[dir.opposite() as usize] = false;
        stack.push(Frame::enter(nx, ny, size, rng));
    }

    cells
}

/// A perfect maze in wall-grid form: every cell reachable, no loops, all
/// boundaries closed.
pub fn generate_perfect(size: usize, rng: &mut impl Rng) -> Vec<WallCell> {
    let cells = carve(size, rng);
    let mut walls = Vec::with_capacity(grid_len(size));

    for x in 0..size {
        for y in 0..size {
            let cell = cells[y * size + x];
            walls.push(WallCell::new(
                cell.walls[Direction::North as usize],
                cell.walls[Direction::West as usize],
            ));
        }
        // Closes the bottom edge under column x.
        walls.push(WallCell::new(true, false));
    }
    // Closes the right edge.
    for _ in 0..size {
        walls.push(WallCell::new(false, true));
    }
    walls.push(WallCell::new(false, false));

    walls
}

/// Clear the bottom wall under `count` randomly picked columns. Picks may
/// repeat, so fewer exits can result.
pub fn open_exits(walls: &mut [WallCell], size: usize, count: usize, rng: &mut impl Rng) {
    if size == 0 {
        return;
    }
    for _ in 0..count {
        let x = rng.gen_range(0..size);
        walls[wall_index(size, x, size)].top = false;
    }
}

/// Independently clear each `left` and `top` flag of cells with `x >= 1` and
/// `y >= 1` with probability `chance`.
pub fn remove_random_walls(walls: &mut [WallCell], size: usize, chance: f64, rng: &mut impl Rng) {
    for x in 1..size {
        for y in 1..size {
            let cell = &mut walls[wall_index(size, x, y)];
            if rng.gen::<f64>() < chance {
                cell.left = false;
            }
            if rng.gen::<f64>() < chance {
                cell.top = false;
            }
        }
    }
}

/// Generate the playable maze for a board described by `config`.
pub fn generate(config: &GameConfig, rng: &mut impl Rng) -> Vec<WallCell> {
    let size = config.board_size;
    let mut walls = generate_perfect(size, rng);
    open_exits(&mut walls, size, config.exit_count(), rng);
    remove_random_walls(&mut walls, size, config.wall_removal_chance, rng);
    walls
}
