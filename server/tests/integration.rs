//! Integration tests for the marble maze server.
//!
//! These tests run the real router and lobby loop and issue requests
//! against it in-process.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use glam::DVec2;
use marble_maze_server::clock::ManualClock;
use marble_maze_server::config::ServerConfig;
use marble_maze_server::http::{router, AppState};
use marble_maze_server::lobby_loop::{run_lobby_loop, LobbyCommand};
use marble_maze_server::sync::SyncEndpoint;
use marble_maze_shared::client::ClientSession;
use marble_maze_shared::config::GameConfig;
use marble_maze_shared::maze::grid_len;
use marble_maze_shared::physics::{spawn_position, PhysicsConfig};
use marble_maze_shared::protocol::{
    HealthResponse, JoinResponse, LobbyResponse, LobbyStatus, LobbyWire, MessageResponse,
    PollQuery, PollResponse, Reply, PROTOCOL_VERSION,
};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tower::ServiceExt;

const T0: i64 = 1_700_000_000_000;

/// Start a lobby loop on a manual clock and return the router in front of it.
fn start_test_app(seed: u64) -> (Router, ManualClock) {
    let clock = ManualClock::new(T0);
    let config = ServerConfig {
        rng_seed: Some(seed),
        ..Default::default()
    };
    let endpoint = SyncEndpoint::new(config.game, config.rng_seed, Arc::new(clock.clone()));
    let (lobby_tx, lobby_rx) = mpsc::channel::<LobbyCommand>(config.command_buffer);
    tokio::spawn(run_lobby_loop(lobby_rx, endpoint, config));
    (router(AppState { lobby_tx }), clock)
}

async fn get_raw(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

/// GET `uri`, expecting HTTP 200 and a JSON body.
async fn get<T: DeserializeOwned>(app: &Router, uri: &str) -> T {
    let (status, body) = get_raw(app, uri).await;
    assert_eq!(status, StatusCode::OK, "{uri}");
    serde_json::from_slice(&body).unwrap()
}

async fn create(app: &Router) -> LobbyWire {
    get(app, "/lobby/create").await
}

/// Percent-encode a query value, keeping only unreserved characters.
fn encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

fn uri_with(path: &str, pairs: &[(&str, String)]) -> String {
    let query: Vec<String> = pairs
        .iter()
        .map(|(key, value)| format!("{key}={}", encode(value)))
        .collect();
    format!("{path}?{}", query.join("&"))
}

async fn join(app: &Router, lobby: &str, username: &str) -> Reply<JoinResponse> {
    let uri = uri_with(
        "/lobby/join",
        &[("lobby", lobby.to_string()), ("username", username.to_string())],
    );
    get(app, &uri).await
}

fn poll_uri(query: &PollQuery) -> String {
    let mut pairs = vec![("lobby", query.lobby.clone())];
    if let Some(player) = &query.player {
        pairs.push(("player", player.clone()));
    }
    if let Some(timestamp) = query.timestamp {
        pairs.push(("timestamp", timestamp.to_string()));
    }
    let fields = [
        ("gravity", query.gravity),
        ("bx", query.bx),
        ("by", query.by),
        ("vx", query.vx),
        ("vy", query.vy),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            pairs.push((key, value.to_string()));
        }
    }
    if let Some(win) = &query.win {
        pairs.push(("win", win.clone()));
    }
    uri_with("/lobby/poll", &pairs)
}

async fn poll(app: &Router, query: &PollQuery) -> Reply<PollResponse> {
    get(app, &poll_uri(query)).await
}

#[tokio::test]
async fn test_health() {
    let (app, _) = start_test_app(1);
    let health: HealthResponse = get(&app, "/health").await;
    assert_eq!(health, HealthResponse::ok());
    assert_eq!(health.protocol_version, PROTOCOL_VERSION);
}

#[tokio::test]
async fn test_usernames_survive_query_encoding() {
    let (app, _) = start_test_app(2);
    let lobby = create(&app).await;
    for name in ["ada lovelace", "tom & jerry", "x=1?", "é"] {
        let joined = join(&app, &lobby.id, name).await.into_result().unwrap();
        assert_eq!(joined.lobby.players[&joined.player].username, name);
    }
}

#[tokio::test]
async fn test_create_returns_fresh_lobby() {
    let (app, _) = start_test_app(1);
    let (_, body) = get_raw(&app, "/lobby/create").await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "waiting");
    assert_eq!(json["boardSize"], 12);
    assert!(json["winner"].is_null());
    assert_eq!(json["gravityAngle"], 0.0);
    assert_eq!(json["walls"].as_array().unwrap().len(), grid_len(12));
    assert_eq!(json["powerUps"].as_array().unwrap().len(), 4);
    assert_eq!(json["powerUps"][0]["skill"], "0g");

    let id = json["id"].as_str().unwrap();
    assert_eq!(id.len(), 6);
    assert!(id.bytes().all(|b| b.is_ascii_uppercase()));

    let second = create(&app).await;
    assert_ne!(second.id, id);
}

#[tokio::test]
async fn test_errors_are_in_band() {
    let (app, _) = start_test_app(2);

    for uri in [
        "/lobby/join?lobby=NOPE&username=ada",
        "/lobby/start?lobby=NOPE",
        "/lobby/reset?lobby=NOPE",
        "/lobby/powerup?lobby=NOPE&player=1&px=0&py=0",
        "/lobby/poll?lobby=NOPE&timestamp=1",
        "/lobby/join",
    ] {
        let (status, body) = get_raw(&app, uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Lobby doesn't exist." }), "{uri}");
    }

    let lobby = create(&app).await;
    let reply = poll(
        &app,
        &PollQuery {
            player: Some("999".to_string()),
            ..PollQuery::spectator(lobby.id, T0)
        },
    )
    .await;
    assert_eq!(reply.into_result().unwrap_err(), "Player not in game.");
}

#[tokio::test]
async fn test_fifth_player_is_turned_away() {
    let (app, _) = start_test_app(3);
    let lobby = create(&app).await;

    let mut ids = Vec::new();
    for name in ["a", "b", "c", "d"] {
        let joined = join(&app, &lobby.id, name).await.into_result().unwrap();
        assert_eq!(joined.lobby.players[&joined.player].username, name);
        assert_eq!(joined.lobby.players[&joined.player].last_poll, T0 + 10_000);
        ids.push(joined.player);
    }

    let full = join(&app, &lobby.id, "e").await;
    assert_eq!(full.into_result().unwrap_err(), "Lobby full.");

    let response = poll(&app, &PollQuery::spectator(lobby.id.clone(), T0))
        .await
        .into_result()
        .unwrap();
    assert_eq!(response.lobby.players.len(), 4);
    for id in &ids {
        assert!(response.lobby.players.contains_key(id));
    }
}

#[tokio::test]
async fn test_malformed_fields_do_not_reject_poll() {
    let (app, _) = start_test_app(4);
    let lobby = create(&app).await;
    let player = join(&app, &lobby.id, "ada").await.into_result().unwrap().player;

    let uri = format!(
        "/lobby/poll?lobby={}&player={player}&timestamp=soon&gravity=up&bx=1",
        lobby.id
    );
    let response: Reply<PollResponse> = get(&app, &uri).await;
    let response = response.into_result().unwrap();
    let stored = &response.lobby.players[&player];
    assert_eq!(stored.x, 0.0);
    assert_eq!(stored.last_poll, T0 + 10_000);
}

#[tokio::test]
async fn test_power_up_pickup_and_expiry() {
    let (app, clock) = start_test_app(5);
    let lobby = create(&app).await;
    let target = lobby.power_ups[0].clone();
    let uri = |player: &str| {
        format!(
            "/lobby/powerup?lobby={}&player={player}&px={}&py={}",
            lobby.id, target.x, target.y
        )
    };

    let first: MessageResponse = get(&app, &uri("1")).await;
    let second: MessageResponse = get(&app, &uri("2")).await;
    assert_eq!(first, MessageResponse::success());
    assert_eq!(second, MessageResponse::success());

    let nowhere = format!("/lobby/powerup?lobby={}&player=3&px=east&py=", lobby.id);
    let third: MessageResponse = get(&app, &nowhere).await;
    assert_eq!(third, MessageResponse::success());

    clock.advance(7_499);
    let response = poll(&app, &PollQuery::spectator(lobby.id.clone(), 0))
        .await
        .into_result()
        .unwrap();
    let held = response
        .lobby
        .power_ups
        .iter()
        .find(|p| p.x == target.x && p.y == target.y)
        .unwrap();
    assert_eq!(held.holder.as_deref(), Some("1"));
    assert_eq!(held.time_activated, Some(T0));

    clock.advance(1);
    let response = poll(&app, &PollQuery::spectator(lobby.id.clone(), 0))
        .await
        .into_result()
        .unwrap();
    assert!(!response
        .lobby
        .power_ups
        .iter()
        .any(|p| p.x == target.x && p.y == target.y));
}

#[tokio::test]
async fn test_client_session_plays_a_round() {
    let (app, clock) = start_test_app(6);
    let rules = GameConfig::default();
    let lobby = create(&app).await;
    let joined = join(&app, &lobby.id, "ada").await.into_result().unwrap();

    let mut session = ClientSession::player(
        lobby.id.clone(),
        joined.player.clone(),
        rules,
        PhysicsConfig::default(),
    );
    let mut watcher = ClientSession::spectator(lobby.id.clone(), rules);
    session.apply_snapshot(joined.lobby);

    // Waiting room: the ball sits at its spawn point.
    session.frame(1.0 / 60.0, DVec2::ZERO);
    let spawn = spawn_position(0, 1, rules.board_size);
    assert_eq!(session.ball().unwrap().centre, spawn);

    let uri = format!("/lobby/start?lobby={}", lobby.id);
    let started = get::<Reply<LobbyResponse>>(&app, &uri)
        .await
        .into_result()
        .unwrap();
    assert_eq!(started.lobby.status, LobbyStatus::Playing);
    session.apply_snapshot(started.lobby);

    // Clients stamp polls past the join grace period.
    let mut timestamp = T0 + 10_000;
    let mut last_response = None;
    for _ in 0..30 {
        clock.advance(16);
        let outcome = session.frame(1.0 / 60.0, DVec2::ZERO);
        if outcome.poll_due {
            timestamp += 1;
            let reply = poll(&app, &session.poll_query(timestamp)).await;
            if let Reply::Ok(response) = &reply {
                last_response = Some(response.clone());
            }
            assert!(session.apply_poll(reply));
            assert!(watcher.apply_poll(poll(&app, &watcher.poll_query(timestamp)).await));
        }
    }

    let ball = session.ball().unwrap();
    assert!(ball.centre.y < spawn.y, "ball should fall under gravity");

    let seen = &watcher.lobby().unwrap().players[&joined.player];
    let last_query = session.poll_query(timestamp);
    assert_eq!(Some(seen.x), last_query.bx);
    assert_eq!(Some(seen.last_poll), Some(timestamp));

    // A late duplicate of an earlier response is discarded.
    let stale = last_response.unwrap();
    assert!(!session.apply_poll(Reply::Ok(PollResponse {
        timestamp: stale.timestamp - 1,
        lobby: stale.lobby,
    })));

    // Claim the win.
    timestamp += 1;
    let winning = PollQuery {
        win: Some(String::new()),
        ..session.poll_query(timestamp)
    };
    assert!(session.apply_poll(poll(&app, &winning).await));
    let lobby_now = session.lobby().unwrap();
    assert_eq!(lobby_now.status, LobbyStatus::Finished);
    assert_eq!(lobby_now.winner.as_deref(), Some(joined.player.as_str()));
    assert_eq!(lobby_now.players[&joined.player].score, 1);

    // Reset keeps the roster but rebuilds the board.
    let uri = format!("/lobby/reset?lobby={}", lobby.id);
    let reset = get::<Reply<LobbyResponse>>(&app, &uri)
        .await
        .into_result()
        .unwrap();
    assert_eq!(reset.lobby.status, LobbyStatus::Waiting);
    assert_eq!(reset.lobby.winner, None);
    assert_ne!(reset.lobby.walls, lobby.walls);
    assert_eq!(reset.lobby.power_ups.len(), lobby.power_ups.len());
    assert!(reset.lobby.players.contains_key(&joined.player));

    // Going silent gets the player evicted and ends their session.
    clock.advance(30_000);
    assert!(watcher.apply_poll(poll(&app, &watcher.poll_query(0)).await));
    assert!(watcher.lobby().unwrap().players.is_empty());

    timestamp += 1;
    assert!(!session.apply_poll(poll(&app, &session.poll_query(timestamp)).await));
    assert_eq!(session.halted(), Some("Player not in game."));
}

#[tokio::test]
async fn test_gravity_converges_over_http() {
    let (app, clock) = start_test_app(7);
    let lobby = create(&app).await;
    let mut players = Vec::new();
    for name in ["a", "b"] {
        players.push(join(&app, &lobby.id, name).await.into_result().unwrap().player);
    }

    let target = 0.3;
    let mut angle = 0.0;
    for round in 1..=10 {
        clock.advance(100);
        for player in &players {
            let query = PollQuery {
                player: Some(player.clone()),
                gravity: Some(target),
                ..PollQuery::spectator(lobby.id.clone(), T0 + 10_000 + round)
            };
            angle = poll(&app, &query).await.into_result().unwrap().lobby.gravity_angle;
        }
    }
    assert!((angle - target).abs() < 0.05 * target, "{angle}");
}
