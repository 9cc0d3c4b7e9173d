use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use ts_rs::TS;

use crate::maze::WallCell;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Body of the pickup acknowledgement.
pub const SUCCESS_MESSAGE: &str = "success";

pub type LobbyId = String;
pub type PlayerId = String;

// === Snapshot ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub enum Skill {
    #[serde(rename = "0g")]
    ZeroGravity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct PlayerWire {
    pub player_id: PlayerId,
    pub username: String,
    pub score: u32,
    pub gravity_angle: f64,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    #[ts(type = "number")]
    pub last_poll: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct PowerUpWire {
    pub x: i32,
    pub y: i32,
    pub skill: Skill,
    pub holder: Option<PlayerId>,
    #[ts(type = "number | null")]
    pub time_activated: Option<i64>,
}

/// Full lobby snapshot, as served by every lobby route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct LobbyWire {
    pub id: LobbyId,
    pub status: LobbyStatus,
    pub gravity_angle: f64,
    pub winner: Option<PlayerId>,
    pub board_size: usize,
    pub walls: Vec<WallCell>,
    pub players: BTreeMap<PlayerId, PlayerWire>,
    pub power_ups: Vec<PowerUpWire>,
}

impl LobbyWire {
    /// Roster position of a player, which clients use to pick ball colours.
    pub fn player_index(&self, player_id: &str) -> Option<usize> {
        self.players.keys().position(|id| id == player_id)
    }

    /// Power-ups currently held by `player_id` with the given skill.
    pub fn held_by<'a>(
        &'a self,
        player_id: &'a str,
        skill: Skill,
    ) -> impl Iterator<Item = &'a PowerUpWire> + 'a {
        self.power_ups
            .iter()
            .filter(move |p| p.skill == skill && p.holder.as_deref() == Some(player_id))
    }
}

// === Responses ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct JoinResponse {
    pub player: PlayerId,
    pub lobby: LobbyWire,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct LobbyResponse {
    pub lobby: LobbyWire,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn success() -> Self {
        Self {
            message: SUCCESS_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PollResponse {
    #[ts(type = "number")]
    pub timestamp: i64,
    pub lobby: LobbyWire,
}

/// Body of `/health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub protocol_version: u32,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// In-band failure body; every route may answer with this instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct ErrorResponse {
    pub error: String,
}

/// Either a route's success body or the in-band error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply<T> {
    Err(ErrorResponse),
    Ok(T),
}

impl<T> Reply<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Reply::Ok(body) => Ok(body),
            Reply::Err(e) => Err(e.error),
        }
    }
}

// === Requests (query strings) ===

/// Numeric query field that counts as absent when it does not parse, so a
/// malformed value never rejects the whole request.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.trim().parse().ok()))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct LobbyQuery {
    #[serde(default)]
    pub lobby: LobbyId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct JoinQuery {
    #[serde(default)]
    pub lobby: LobbyId,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PowerUpQuery {
    #[serde(default)]
    pub lobby: LobbyId,
    #[serde(default)]
    pub player: PlayerId,
    /// Cell coordinates; a missing or malformed one names no cell
    #[serde(default, deserialize_with = "lenient")]
    pub px: Option<i32>,
    #[serde(default, deserialize_with = "lenient")]
    pub py: Option<i32>,
}

impl PowerUpQuery {
    pub fn cell(&self) -> Option<(i32, i32)> {
        self.px.zip(self.py)
    }
}

/// One reconciliation exchange. Spectators send only `lobby` and `timestamp`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PollQuery {
    #[serde(default)]
    pub lobby: LobbyId,
    pub player: Option<PlayerId>,
    #[ts(type = "number | null")]
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<i64>,
    /// Locally measured board tilt (radians)
    #[serde(default, deserialize_with = "lenient")]
    pub gravity: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub bx: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub by: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub vx: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub vy: Option<f64>,
    /// Present (any value) when the ball has left the maze
    pub win: Option<String>,
}

impl PollQuery {
    pub fn spectator(lobby: impl Into<LobbyId>, timestamp: i64) -> Self {
        Self {
            lobby: lobby.into(),
            timestamp: Some(timestamp),
            ..Default::default()
        }
    }

    pub fn is_win(&self) -> bool {
        self.win.is_some()
    }
}

// === Client-side ordering ===

/// Drops poll responses that arrive out of order.
///
/// A response is accepted only if its timestamp is strictly newer than the
/// last accepted one.
#[derive(Debug, Clone, Default)]
pub struct ResponseGate {
    latest: Option<i64>,
}

impl ResponseGate {
    pub fn accept(&mut self, timestamp: i64) -> bool {
        match self.latest {
            Some(latest) if timestamp <= latest => false,
            _ => {
                self.latest = Some(timestamp);
                true
            }
        }
    }

    pub fn latest(&self) -> Option<i64> {
        self.latest
    }
}
