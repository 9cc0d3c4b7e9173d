//! Wall-grid layout and traversal.
//!
//! A board of `size × size` cells is stored as a `(size+1) × (size+1)` grid of
//! [`WallCell`]s. The grid is x-major: cell `(x, y)` lives at
//! `x * (size + 1) + y`, with `y` growing downwards. `top` blocks the edge
//! towards `y - 1` and `left` the edge towards `x - 1`.
//!
//! The trailing entry of every x group (`y == size`) closes the bottom edge and
//! the trailing group (`x == size`) closes the right edge. Entries at
//! `(x, size)` with `top == false` are exits out of the maze.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use ts_rs::TS;

/// North (`top`) and west (`left`) wall flags of one grid entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct WallCell {
    #[serde(rename = "t")]
    pub top: bool,
    #[serde(rename = "l")]
    pub left: bool,
}

impl WallCell {
    pub const fn new(top: bool, left: bool) -> Self {
        Self { top, left }
    }
}

/// Cardinal direction, in the order neighbours are enumerated while carving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    /// `(dx, dy)` step, with `y` growing downwards.
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }

    /// Neighbour of `(x, y)` in this direction, if it lies on a `size × size` board.
    pub fn step(self, x: usize, y: usize, size: usize) -> Option<(usize, usize)> {
        let (dx, dy) = self.offset();
        let nx = x.checked_add_signed(dx)?;
        let ny = y.checked_add_signed(dy)?;
        (nx < size && ny < size).then_some((nx, ny))
    }
}

/// Length of the wall-grid for a board of `size` cells per side.
pub fn grid_len(size: usize) -> usize {
    (size + 1) * (size + 1)
}

/// Linear index of entry `(x, y)`; both may reach `size` for sentinels.
#[inline]
pub fn wall_index(size: usize, x: usize, y: usize) -> usize {
    x * (size + 1) + y
}

/// Whether the ball can move from interior cell `(x, y)` in `dir` without
/// crossing a wall or leaving the board.
pub fn is_open(walls: &[WallCell], size: usize, x: usize, y: usize, dir: Direction) -> bool {
    let Some((nx, ny)) = dir.step(x, y, size) else {
        return false;
    };
    match dir {
        Direction::North => !walls[wall_index(size, x, y)].top,
        Direction::South => !walls[wall_index(size, nx, ny)].top,
        Direction::West => !walls[wall_index(size, x, y)].left,
        Direction::East => !walls[wall_index(size, nx, ny)].left,
    }
}

/// Number of interior cells reachable from `(0, 0)`.
pub fn reachable_cells(walls: &[WallCell], size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    let mut seen = vec![false; size * size];
    let mut queue = VecDeque::from([(0usize, 0usize)]);
    seen[0] = true;
    let mut count = 0;

    while let Some((x, y)) = queue.pop_front() {
        count += 1;
        for dir in Direction::ALL {
            if !is_open(walls, size, x, y, dir) {
                continue;
            }
            if let Some((nx, ny)) = dir.step(x, y, size) {
                let slot = &mut seen[ny * size + nx];
                if !*slot {
                    *slot = true;
                    queue.push_back((nx, ny));
                }
            }
        }
    }

    count
}

/// Number of cleared wall edges between pairs of interior cells.
pub fn open_interior_edges(walls: &[WallCell], size: usize) -> usize {
    let mut open = 0;
    for x in 0..size {
        for y in 0..size {
            let cell = walls[wall_index(size, x, y)];
            if x > 0 && !cell.left {
                open += 1;
            }
            if y > 0 && !cell.top {
                open += 1;
            }
        }
    }
    open
}

/// Columns whose bottom edge is open.
pub fn exits(walls: &[WallCell], size: usize) -> Vec<usize> {
    (0..size)
        .filter(|&x| !walls[wall_index(size, x, size)].top)
        .collect()
}
