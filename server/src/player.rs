//! Connected players and the movement reports they send.

use marble_maze_shared::protocol::{PlayerId, PlayerWire, PollQuery};

/// Ball kinematics reported by a player's poll. Missing fields keep the
/// stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MovementReport {
    pub timestamp: i64,
    pub gravity_angle: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub vx: Option<f64>,
    pub vy: Option<f64>,
}

impl MovementReport {
    /// The report carried by a poll, if it has a timestamp.
    pub fn from_query(query: &PollQuery) -> Option<Self> {
        Some(Self {
            timestamp: query.timestamp?,
            gravity_angle: query.gravity,
            x: query.bx,
            y: query.by,
            vx: query.vx,
            vy: query.vy,
        })
    }
}

/// A player in one lobby.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub score: u32,
    /// Tilt last reported by this player's device
    pub gravity_angle: f64,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    /// Timestamp of the last accepted report (ms)
    pub last_poll: i64,
}

impl Player {
    pub fn new(id: PlayerId, username: String, last_poll: i64) -> Self {
        Self {
            id,
            username,
            score: 0,
            gravity_angle: 0.0,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            last_poll,
        }
    }

    /// Apply a report if it is newer than the last accepted one.
    /// Older or duplicate reports are ignored.
    pub fn apply(&mut self, report: &MovementReport) -> bool {
        if report.timestamp <= self.last_poll {
            return false;
        }
        if let Some(g) = report.gravity_angle {
            self.gravity_angle = g;
        }
        if let Some(x) = report.x {
            self.x = x;
        }
        if let Some(y) = report.y {
            self.y = y;
        }
        if let Some(vx) = report.vx {
            self.vx = vx;
        }
        if let Some(vy) = report.vy {
            self.vy = vy;
        }
        self.last_poll = report.timestamp;
        true
    }

    /// No report accepted for longer than `timeout_ms`.
    pub fn is_stale(&self, now_ms: i64, timeout_ms: i64) -> bool {
        self.last_poll.saturating_add(timeout_ms) < now_ms
    }

    pub fn to_wire(&self) -> PlayerWire {
        PlayerWire {
            player_id: self.id.clone(),
            username: self.username.clone(),
            score: self.score,
            gravity_angle: self.gravity_angle,
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            last_poll: self.last_poll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(timestamp: i64) -> MovementReport {
        MovementReport {
            timestamp,
            gravity_angle: Some(0.3),
            x: Some(0.1),
            y: Some(-0.2),
            vx: Some(1.0),
            vy: Some(-1.0),
        }
    }

    #[test]
    fn newer_report_is_applied() {
        let mut player = Player::new("1".to_string(), "ada".to_string(), 100);
        assert!(player.apply(&report(101)));
        assert_eq!(player.last_poll, 101);
        assert_eq!(player.gravity_angle, 0.3);
        assert_eq!((player.x, player.y), (0.1, -0.2));
        assert_eq!((player.vx, player.vy), (1.0, -1.0));
    }

    #[test]
    fn stale_or_duplicate_report_is_ignored() {
        let mut player = Player::new("1".to_string(), "ada".to_string(), 100);
        let before = player.clone();
        assert!(!player.apply(&report(100)));
        assert!(!player.apply(&report(50)));
        assert_eq!(player, before);
    }

    #[test]
    fn missing_fields_keep_stored_values() {
        let mut player = Player::new("1".to_string(), "ada".to_string(), 0);
        player.apply(&report(1));
        let partial = MovementReport {
            timestamp: 2,
            x: Some(0.4),
            ..Default::default()
        };
        assert!(player.apply(&partial));
        assert_eq!(player.x, 0.4);
        assert_eq!(player.y, -0.2);
        assert_eq!(player.gravity_angle, 0.3);
    }

    #[test]
    fn staleness_is_strictly_after_timeout() {
        let player = Player::new("1".to_string(), "ada".to_string(), 1_000);
        assert!(!player.is_stale(11_000, 10_000));
        assert!(player.is_stale(11_001, 10_000));
    }

    #[test]
    fn report_requires_timestamp() {
        let mut query = PollQuery::default();
        assert!(MovementReport::from_query(&query).is_none());
        query.timestamp = Some(7);
        query.bx = Some(0.5);
        let report = MovementReport::from_query(&query).unwrap();
        assert_eq!(report.timestamp, 7);
        assert_eq!(report.x, Some(0.5));
        assert_eq!(report.y, None);
    }
}
