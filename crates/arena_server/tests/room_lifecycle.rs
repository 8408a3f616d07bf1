//! Rooms driven end to end through the registry and protocol, on paused time.

use std::time::Duration;

use tokio::time::{self, Instant};

use arena_core::prelude::*;
use arena_server::protocol::{route, ClientMessage, ErrorCode, MatchVerb, ServerMessage};
use arena_server::registry::RoomRegistry;
use arena_server::{RoomId, ServerConfig};

const ALICE: &str = "alice";
const BOB: &str = "bob";

fn registry() -> RoomRegistry {
    RoomRegistry::new(ServerConfig::default(), MatchConfig::default())
}

fn error_code(message: &ServerMessage) -> Option<ErrorCode> {
    match message {
        ServerMessage::Error { code, .. } => Some(*code),
        _ => None,
    }
}

/// A full room whose match has started.
async fn started(registry: &RoomRegistry) -> RoomId {
    let room = registry.create_room().unwrap();
    room.add_player(ALICE, "Alice").unwrap();
    room.add_player(BOB, "Bob").unwrap();
    time::sleep(Duration::from_millis(1050)).await;
    assert_eq!(room.status(), MatchStatus::InProgress);
    room.id()
}

#[tokio::test(start_paused = true)]
async fn test_second_player_starts_match_after_grace() {
    let registry = registry();
    let room = registry.create_room().unwrap();

    let alice = room.add_player(ALICE, "Alice").unwrap();
    assert_eq!(alice.team, Team::Red);
    assert_eq!(room.status(), MatchStatus::Waiting);

    let bob = room.add_player(BOB, "Bob").unwrap();
    assert_eq!(bob.team, Team::Blue);
    assert!(room.is_full());

    time::sleep(Duration::from_millis(900)).await;
    assert_eq!(room.status(), MatchStatus::Waiting);
    assert!(!room.is_ticking());

    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(room.status(), MatchStatus::InProgress);
    assert!(room.is_ticking());

    let info = room.get_room_info();
    assert_eq!(info.player_count, 2);
    assert!(info.started_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_reach_subscribers() {
    let registry = registry();
    let room = registry.create_room().unwrap();
    let mut snapshots = registry.subscribe(room.id()).unwrap();
    room.add_player(ALICE, "Alice").unwrap();
    room.add_player(BOB, "Bob").unwrap();

    let first = snapshots.recv().await.unwrap();
    assert_eq!(first.status, MatchStatus::InProgress);
    assert_eq!(first.tick, 1);
    assert_eq!(first.players.len(), 2);

    let second = snapshots.recv().await.unwrap();
    assert_eq!(second.tick, 2);
    assert!(second.game_time > first.game_time);
}

#[tokio::test(start_paused = true)]
async fn test_king_kill_ends_and_tears_down() {
    let registry = registry();
    let id = started(&registry).await;
    let room = registry.get_room(id).unwrap();
    let mut snapshots = registry.subscribe(id).unwrap();

    room.with_engine(|engine| {
        let king = engine.tower_at(Team::Red, TowerSlot::King).unwrap().id;
        engine.deal_damage_to_structure(king, u32::MAX);
    });
    time::sleep(Duration::from_millis(250)).await;

    assert_eq!(room.status(), MatchStatus::Ended);
    assert!(!room.is_ticking());

    let mut last = None;
    while let Ok(snapshot) = snapshots.try_recv() {
        last = Some(snapshot);
    }
    let last = last.unwrap();
    assert_eq!(last.winner, Some(Winner::Blue));
    assert_eq!(last.end_reason, Some(EndReason::KingDestroyed));

    // The room lingers for the teardown delay, then disappears.
    time::sleep(Duration::from_secs(29)).await;
    assert!(registry.get_room(id).is_ok());
    time::sleep(Duration::from_secs(2)).await;
    assert!(registry.get_room(id).is_err());
    assert!(room.is_destroyed());
    assert_eq!(registry.room_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_leaving_pauses_and_resume_continues() {
    let registry = registry();
    let id = started(&registry).await;
    let room = registry.get_room(id).unwrap();

    assert!(room.remove_player(BOB));
    assert_eq!(room.status(), MatchStatus::Paused);
    assert!(!room.is_ticking());

    let frozen = room.get_snapshot().tick;
    time::sleep(Duration::from_secs(1)).await;
    assert_eq!(room.get_snapshot().tick, frozen);

    room.add_player(BOB, "Bob").unwrap();
    assert_eq!(room.status(), MatchStatus::Paused);
    room.resume_game().unwrap();
    time::sleep(Duration::from_millis(350)).await;

    assert_eq!(room.status(), MatchStatus::InProgress);
    assert!(room.get_snapshot().tick > frozen);
}

#[tokio::test(start_paused = true)]
async fn test_silent_room_is_swept() {
    let registry = registry();
    let id = started(&registry).await;

    assert!(registry.sweep_heartbeats(Instant::now()).is_empty());

    time::sleep(Duration::from_secs(61)).await;
    let removed = registry.sweep_heartbeats(Instant::now());

    assert_eq!(removed, vec![id]);
    assert!(registry.get_room(id).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_protocol_match_flow() {
    let registry = registry();

    let ServerMessage::MatchCreated { match_id } = route(&registry, ALICE, ClientMessage::CreateMatch) else {
        panic!("expected MatchCreated");
    };
    let joined = route(
        &registry,
        ALICE,
        ClientMessage::JoinMatch {
            match_id,
            name: "Alice".into(),
        },
    );
    assert!(matches!(joined, ServerMessage::Joined { player, .. } if player.team == Team::Red));

    let deploy = |player: &str, unit_type, row, col| {
        route(
            &registry,
            player,
            ClientMessage::DeployUnit {
                match_id,
                unit_type,
                row,
                col,
            },
        )
    };

    let early = deploy(ALICE, UnitKind::Giant, 10, 8);
    assert_eq!(error_code(&early), Some(ErrorCode::GameNotStarted));

    route(
        &registry,
        BOB,
        ClientMessage::JoinMatch {
            match_id,
            name: "Bob".into(),
        },
    );
    time::sleep(Duration::from_millis(1050)).await;

    assert_eq!(deploy(ALICE, UnitKind::Giant, 10, 8), ServerMessage::Ack);
    time::sleep(Duration::from_millis(100)).await;

    let ServerMessage::Snapshot { snapshot } = route(&registry, ALICE, ClientMessage::GetState { match_id }) else {
        panic!("expected Snapshot");
    };
    assert_eq!(snapshot.units.len(), 1);
    assert_eq!(snapshot.units[0].team, Team::Red);

    let broke = deploy(ALICE, UnitKind::Valkyrie, 10, 8);
    assert_eq!(error_code(&broke), Some(ErrorCode::NotEnoughElixir));
    let off_board = deploy(BOB, UnitKind::Valkyrie, 40, 8);
    assert_eq!(error_code(&off_board), Some(ErrorCode::InvalidPosition));
    let stranger = deploy("mallory", UnitKind::Valkyrie, 20, 8);
    assert_eq!(error_code(&stranger), Some(ErrorCode::Unauthorized));

    let ServerMessage::Matches { rooms } = route(&registry, BOB, ClientMessage::ListMatches) else {
        panic!("expected Matches");
    };
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].status, MatchStatus::InProgress);

    let surrender = route(
        &registry,
        BOB,
        ClientMessage::MatchAction {
            match_id,
            action: MatchVerb::Surrender,
        },
    );
    assert_eq!(surrender, ServerMessage::Ack);
    time::sleep(Duration::from_millis(150)).await;

    let room = registry.get_room(match_id).unwrap();
    let snapshot = room.get_snapshot();
    assert_eq!(room.status(), MatchStatus::Ended);
    assert_eq!(snapshot.winner, Some(Winner::Red));
    assert_eq!(snapshot.end_reason, Some(EndReason::Surrender));

    let late = deploy(ALICE, UnitKind::Giant, 10, 8);
    assert_eq!(error_code(&late), Some(ErrorCode::GameEnded));
}

fn control(
    registry: &RoomRegistry,
    player: &str,
    match_id: RoomId,
    action: MatchVerb,
) -> ServerMessage {
    route(registry, player, ClientMessage::MatchAction { match_id, action })
}

#[tokio::test(start_paused = true)]
async fn test_only_members_pause_and_resume() {
    let registry = registry();
    let id = started(&registry).await;
    let room = registry.get_room(id).unwrap();

    let outsider = control(&registry, "mallory", id, MatchVerb::Pause);
    assert_eq!(error_code(&outsider), Some(ErrorCode::Unauthorized));
    assert_eq!(room.status(), MatchStatus::InProgress);
    assert!(room.is_ticking());

    assert_eq!(control(&registry, ALICE, id, MatchVerb::Pause), ServerMessage::Ack);
    assert_eq!(room.status(), MatchStatus::Paused);

    let outsider = control(&registry, "mallory", id, MatchVerb::Resume);
    assert_eq!(error_code(&outsider), Some(ErrorCode::Unauthorized));
    assert_eq!(room.status(), MatchStatus::Paused);

    assert_eq!(control(&registry, BOB, id, MatchVerb::Resume), ServerMessage::Ack);
    assert_eq!(room.status(), MatchStatus::InProgress);
}

#[tokio::test(start_paused = true)]
async fn test_deploy_onto_tower_is_invalid_position() {
    let registry = registry();
    let id = started(&registry).await;
    let deploy = |player: &str, row, col| {
        route(
            &registry,
            player,
            ClientMessage::DeployUnit {
                match_id: id,
                unit_type: UnitKind::MiniPekka,
                row,
                col,
            },
        )
    };

    // Red king footprint, then a Blue princess footprint.
    assert_eq!(error_code(&deploy(ALICE, 1, 8)), Some(ErrorCode::InvalidPosition));
    assert_eq!(error_code(&deploy(BOB, 27, 14)), Some(ErrorCode::InvalidPosition));
    time::sleep(Duration::from_millis(150)).await;

    let room = registry.get_room(id).unwrap();
    let snapshot = room.get_snapshot();
    assert!(snapshot.units.is_empty());
    assert!(snapshot.players.iter().all(|player| player.elixir >= 5.0));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_room_is_reported() {
    let registry = registry();
    let reply = route(
        &registry,
        ALICE,
        ClientMessage::GetState {
            match_id: RoomId::nil(),
        },
    );
    assert_eq!(error_code(&reply), Some(ErrorCode::RoomNotFound));
    assert_eq!(route(&registry, ALICE, ClientMessage::Ping), ServerMessage::Pong);
}
