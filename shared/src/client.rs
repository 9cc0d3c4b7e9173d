//! Client side of the poll protocol.
//!
//! A [`ClientSession`] holds the latest accepted lobby snapshot, runs the
//! local ball simulation once per rendered frame and produces the poll
//! queries that feed the ball's kinematics back to the server. Transport and
//! rendering are left to the caller.

use glam::DVec2;

use crate::config::GameConfig;
use crate::physics::{
    device_acceleration, spawn_position, tilt_from_gravity, Ball, BallPhysics, FrameInput,
    PhysicsConfig,
};
use crate::protocol::{
    LobbyId, LobbyStatus, LobbyWire, PlayerId, PollQuery, PollResponse, Reply, ResponseGate, Skill,
};

/// A poll is issued on every fifth rendered frame.
pub const POLL_EVERY_FRAMES: u64 = 5;

/// What the caller should send after a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutcome {
    /// Time to issue a poll (see [`ClientSession::poll_query`])
    pub poll_due: bool,
    /// Cells of unheld power-ups the ball is touching
    pub pickups: Vec<(i32, i32)>,
}

#[derive(Debug, Clone)]
pub struct ClientSession {
    lobby_id: LobbyId,
    player_id: Option<PlayerId>,
    rules: GameConfig,
    gate: ResponseGate,
    lobby: Option<LobbyWire>,
    physics: Option<BallPhysics>,
    /// Smoothed shared board rotation
    rotation: f64,
    /// Smoothed local device tilt
    tilt: f64,
    frame: u64,
    halted: Option<String>,
}

impl ClientSession {
    /// A session that only watches the board.
    pub fn spectator(lobby_id: impl Into<LobbyId>, rules: GameConfig) -> Self {
        Self {
            lobby_id: lobby_id.into(),
            player_id: None,
            rules,
            gate: ResponseGate::default(),
            lobby: None,
            physics: None,
            rotation: 0.0,
            tilt: 0.0,
            frame: 0,
            halted: None,
        }
    }

    /// A session driving one player's ball.
    pub fn player(
        lobby_id: impl Into<LobbyId>,
        player_id: impl Into<PlayerId>,
        rules: GameConfig,
        physics: PhysicsConfig,
    ) -> Self {
        let mut session = Self::spectator(lobby_id, rules);
        session.player_id = Some(player_id.into());
        session.physics = Some(BallPhysics::new(physics, rules.board_size));
        session
    }

    pub fn lobby(&self) -> Option<&LobbyWire> {
        self.lobby.as_ref()
    }

    pub fn ball(&self) -> Option<&Ball> {
        self.physics.as_ref().map(|p| &p.ball)
    }

    /// Error that stopped the session, if any.
    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// Rotation to render the board with: the shared tilt, relative to the
    /// device's own tilt for players.
    pub fn board_rotation(&self) -> f64 {
        if self.player_id.is_some() {
            self.rotation - self.tilt
        } else {
            self.rotation
        }
    }

    /// Feed one device gravity reading into the smoothed local tilt.
    pub fn observe_tilt(&mut self, device_gravity: DVec2) {
        self.tilt = self
            .rules
            .blend_angle(self.tilt, tilt_from_gravity(device_gravity));
    }

    /// Any reported error ends the session: local state is dropped and
    /// simulation stops.
    pub fn halt(&mut self, message: impl Into<String>) {
        self.halted = Some(message.into());
        self.lobby = None;
    }

    /// Adopt a snapshot from a discrete action (join, start, reset).
    pub fn apply_snapshot(&mut self, lobby: LobbyWire) {
        if self.halted.is_none() {
            self.lobby = Some(lobby);
        }
    }

    /// Handle a poll reply. Returns whether the snapshot was adopted.
    pub fn apply_poll(&mut self, reply: Reply<PollResponse>) -> bool {
        if self.halted.is_some() {
            return false;
        }
        match reply.into_result() {
            Ok(response) => {
                if !self.gate.accept(response.timestamp) {
                    return false;
                }
                self.lobby = Some(response.lobby);
                true
            }
            Err(message) => {
                self.halt(message);
                false
            }
        }
    }

    /// Run one rendered frame.
    pub fn frame(&mut self, dt: f64, linear_acceleration: DVec2) -> FrameOutcome {
        let Some(lobby) = self.lobby.as_ref() else {
            return FrameOutcome::default();
        };
        let mut outcome = FrameOutcome {
            poll_due: self.frame % POLL_EVERY_FRAMES == 0,
            pickups: Vec::new(),
        };
        self.frame += 1;
        self.rotation = self.rules.blend_angle(self.rotation, lobby.gravity_angle);

        let (Some(player_id), Some(physics)) = (self.player_id.as_deref(), self.physics.as_mut())
        else {
            return outcome;
        };

        match lobby.status {
            LobbyStatus::Waiting => {
                if let Some(index) = lobby.player_index(player_id) {
                    physics.place(spawn_position(index, lobby.players.len(), lobby.board_size));
                }
            }
            LobbyStatus::Playing => {
                let input = FrameInput {
                    dt,
                    board_rotation: self.rotation,
                    acceleration: device_acceleration(
                        linear_acceleration,
                        self.rotation,
                        self.tilt,
                    ),
                    zero_gravity: lobby.held_by(player_id, Skill::ZeroGravity).next().is_some(),
                };
                physics.step(&lobby.walls, lobby.board_size, &input);

                outcome.pickups = lobby
                    .power_ups
                    .iter()
                    .filter(|p| p.holder.is_none() && physics.touches(p, lobby.board_size))
                    .map(|p| (p.x, p.y))
                    .collect();
            }
            LobbyStatus::Finished => {}
        }

        outcome
    }

    /// Build the next poll; spectators report nothing but the timestamp.
    pub fn poll_query(&self, timestamp: i64) -> PollQuery {
        let mut query = PollQuery::spectator(self.lobby_id.clone(), timestamp);
        if let (Some(player_id), Some(physics)) = (&self.player_id, &self.physics) {
            let ball = &physics.ball;
            query.player = Some(player_id.clone());
            query.gravity = Some(self.tilt);
            query.bx = Some(ball.centre.x);
            query.by = Some(ball.centre.y);
            query.vx = Some(ball.velocity.x);
            query.vy = Some(ball.velocity.y);
            if physics.has_escaped() {
                query.win = Some(String::new());
            }
        }
        query
    }
}
