//! Per-frame ball simulation run by each client against the walls it received
//! from the server.
//!
//! Board space is the unit square centred on the origin, x to the right and
//! y upwards. Cell `(cx, cy)` of the wall-grid (y growing downwards) has its
//! centre at `(-0.5 + (cx + 0.5) / size, 0.5 - (cy + 0.5) / size)`.

use glam::DVec2;

use crate::maze::{wall_index, WallCell};
use crate::protocol::PowerUpWire;

/// Tuning of the local simulation. Lengths marked "cells" are fractions of a
/// cell width.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicsConfig {
    /// Gravity magnitude (board units / s^2)
    pub gravity: f64,
    /// Ball radius (cells)
    pub ball_radius: f64,
    /// Largest displacement of a single sub-step (cells)
    pub max_step: f64,
    /// Share of the penetration removed from the position per contact
    pub correction: f64,
    /// Velocity impulse per unit of penetration, before dividing by the step
    pub impulse: f64,
    /// Half thickness of vertical walls (cells)
    pub wall_half_thickness: f64,
    /// Overhang and half thickness of horizontal walls (cells squared)
    pub rail_extent: f64,
    /// Cells around the ball tested for contacts
    pub search_radius: usize,
    /// How far below the board the ball must be to count as escaped
    pub exit_margin: f64,
    /// Half extent of the pickup box around a power-up (cells)
    pub pickup_half_extent: f64,
    /// Upper bound on a frame's time step (s)
    pub max_frame_dt: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 1.0,
            ball_radius: 0.25,
            max_step: 0.02,
            correction: 0.5,
            impulse: 0.02,
            wall_half_thickness: 0.05,
            rail_extent: 0.25,
            search_radius: 2,
            exit_margin: 0.03,
            pickup_half_extent: 0.3,
            max_frame_dt: 1.0 / 30.0,
        }
    }
}

/// Axis-aligned box used for wall and pickup contacts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec2,
    pub max: DVec2,
}

impl Aabb {
    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    pub fn around(centre: DVec2, half_extent: f64) -> Self {
        Self::new(centre - DVec2::splat(half_extent), centre + DVec2::splat(half_extent))
    }

    pub fn closest_point(&self, p: DVec2) -> DVec2 {
        p.clamp(self.min, self.max)
    }

    pub fn distance_squared(&self, p: DVec2) -> f64 {
        self.closest_point(p).distance_squared(p)
    }

    pub fn touches_sphere(&self, centre: DVec2, radius: f64) -> bool {
        self.distance_squared(centre) <= radius * radius
    }
}

/// Per-frame inputs sampled from the device and the latest snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    /// Frame duration in seconds, clamped by `max_frame_dt`
    pub dt: f64,
    /// Shared board rotation as rendered (radians)
    pub board_rotation: f64,
    /// Device linear acceleration already rotated into board space
    pub acceleration: DVec2,
    /// Holder of an active zero-gravity power-up
    pub zero_gravity: bool,
}

/// Local state of the player's ball.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub centre: DVec2,
    pub velocity: DVec2,
    pub radius: f64,
}

/// The client physics engine for one ball.
#[derive(Debug, Clone)]
pub struct BallPhysics {
    pub config: PhysicsConfig,
    pub ball: Ball,
}

impl BallPhysics {
    pub fn new(config: PhysicsConfig, board_size: usize) -> Self {
        let radius = config.ball_radius / board_size.max(1) as f64;
        Self {
            config,
            ball: Ball {
                centre: DVec2::ZERO,
                velocity: DVec2::ZERO,
                radius,
            },
        }
    }

    /// Park the ball at its waiting-room spot, at rest.
    pub fn place(&mut self, centre: DVec2) {
        self.ball.centre = centre;
        self.ball.velocity = DVec2::ZERO;
    }

    /// Advance one rendered frame. Returns the number of sub-steps taken.
    pub fn step(&mut self, walls: &[WallCell], board_size: usize, input: &FrameInput) -> usize {
        let size = board_size.max(1);
        let dt = input.dt.clamp(0.0, self.config.max_frame_dt);
        self.ball.radius = self.config.ball_radius / size as f64;

        if !input.zero_gravity {
            self.ball.velocity += gravity_vector(input.board_rotation) * self.config.gravity * dt;
        }
        self.ball.velocity += input.acceleration * dt;

        let steps = sub_steps(
            self.ball.velocity.length() * dt,
            self.config.max_step / size as f64,
        );
        if dt <= 0.0 {
            return steps;
        }
        let sub_dt = dt / steps as f64;
        for _ in 0..steps {
            self.ball.centre += self.ball.velocity * sub_dt;
            self.resolve_contacts(walls, size, sub_dt);
        }
        steps
    }

    /// Push the ball out of every wall in its neighbourhood.
    fn resolve_contacts(&mut self, walls: &[WallCell], size: usize, sub_dt: f64) {
        let (bx, by) = nearest_grid_point(self.ball.centre, size);
        let reach = self.config.search_radius as isize;
        let cell = 1.0 / size as f64;

        for i in (bx - reach).max(0)..(bx + reach + 1).min(size as isize + 1) {
            for j in (by - reach).max(0)..(by + reach + 1).min(size as isize + 1) {
                let (x, y) = (i as usize, j as usize);
                let entry = walls[wall_index(size, x, y)];

                if x < size && entry.top {
                    let extent = self.config.rail_extent * cell * cell;
                    let left = -0.5 + x as f64 * cell - extent;
                    let wall_y = 0.5 - y as f64 * cell;
                    let wall = Aabb::new(
                        DVec2::new(left, wall_y - extent),
                        DVec2::new(left + cell + 2.0 * extent, wall_y + extent),
                    );
                    self.push_out(&wall, sub_dt);
                }
                if y < size && entry.left {
                    let half = self.config.wall_half_thickness * cell;
                    let wall_x = -0.5 + x as f64 * cell;
                    let bottom = 0.5 - (y + 1) as f64 * cell;
                    let wall = Aabb::new(
                        DVec2::new(wall_x - half, bottom),
                        DVec2::new(wall_x + half, bottom + cell),
                    );
                    self.push_out(&wall, sub_dt);
                }
            }
        }
    }

    fn push_out(&mut self, wall: &Aabb, sub_dt: f64) {
        let ball = &mut self.ball;
        if !wall.touches_sphere(ball.centre, ball.radius) {
            return;
        }
        let on_box = wall.closest_point(ball.centre);
        let delta = on_box - ball.centre;
        // Deepest point of the sphere towards the box.
        let on_sphere = ball.centre + delta * (ball.radius / (delta.length() + 1e-4));
        let push = on_box - on_sphere;

        ball.centre += push * self.config.correction;
        ball.velocity += push * (self.config.impulse / sub_dt);
    }

    /// The ball has dropped out through an exit in the bottom edge.
    pub fn has_escaped(&self) -> bool {
        self.ball.centre.y < -0.5 - self.config.exit_margin
    }

    /// Whether the ball overlaps the pickup box of `power_up`.
    pub fn touches(&self, power_up: &PowerUpWire, board_size: usize) -> bool {
        let size = board_size.max(1);
        let centre = cell_centre(power_up.x as f64, power_up.y as f64, size);
        Aabb::around(centre, self.config.pickup_half_extent / size as f64)
            .touches_sphere(self.ball.centre, self.ball.radius)
    }
}

/// Direction gravity pulls in for a board rotated by `rotation`.
pub fn gravity_vector(rotation: f64) -> DVec2 {
    DVec2::new(rotation.sin(), -rotation.cos())
}

/// Number of sub-steps so no single step moves further than `max_step`.
pub fn sub_steps(displacement: f64, max_step: f64) -> usize {
    if !displacement.is_finite() || max_step <= 0.0 {
        return 1;
    }
    ((displacement / max_step).ceil() as usize).max(1)
}

/// Board-space centre of cell `(cx, cy)`.
pub fn cell_centre(cx: f64, cy: f64, size: usize) -> DVec2 {
    let cell = 1.0 / size as f64;
    DVec2::new(-0.5 + (cx + 0.5) * cell, 0.5 - (cy + 0.5) * cell)
}

/// Grid corner nearest to a board-space point.
fn nearest_grid_point(p: DVec2, size: usize) -> (isize, isize) {
    let s = size as f64;
    (
        ((p.x + 0.5) * s).round() as isize,
        ((0.5 - p.y) * s).round() as isize,
    )
}

/// Where a player's ball waits in the top row before the round starts.
///
/// Balls are spread evenly by roster position.
pub fn spawn_position(index: usize, player_count: usize, size: usize) -> DVec2 {
    let s = size.max(1) as f64;
    let column = ((index + 1) as f64 / (player_count + 1) as f64 * s).round();
    DVec2::new(column / s - 0.5 - 0.5 / s, 0.5 - 0.5 / s)
}

/// Board tilt from the device's gravity vector, with zero meaning upright.
pub fn tilt_from_gravity(gravity: DVec2) -> f64 {
    use std::f64::consts::{FRAC_PI_2, TAU};

    let mut angle = gravity.y.atan2(gravity.x);
    if angle < -FRAC_PI_2 {
        angle += TAU;
    }
    angle - FRAC_PI_2
}

/// Rotate the device's linear acceleration into board space, given how far
/// the rendered board is turned away from the local tilt.
pub fn device_acceleration(linear: DVec2, board_rotation: f64, tilt: f64) -> DVec2 {
    let d = board_rotation - tilt;
    let (sin, cos) = d.sin_cos();
    DVec2::new(
        -linear.x * cos + linear.y * sin,
        -linear.x * sin - linear.y * cos,
    )
}
