//! End-to-end table scenarios: matchmaking, heads-up play, timers, and the
//! disconnect ghost model, all driven on virtual time.

mod common;

use common::{heads_up_100, Harness};

use openpoker::net::ServerEvent;
use openpoker::table::TableConfig;
use openpoker::{Broadcaster, Clock, HandPhase, PlayerAction, PlayerStatus, Variant};

#[tokio::test]
async fn six_max_matchmaking_seats_in_queue_order() {
    let harness = Harness::new();
    let matchmaker = harness.matchmaker(vec![Variant::six_max()]);
    let users: Vec<i64> = (1..=6).collect();
    let mut streams: Vec<_> = users.iter().map(|&u| harness.connect(u)).collect();

    for &user in &users {
        matchmaker.join_queue(user, "six_max").await.unwrap();
    }
    harness.settle().await;

    // Every queued user got match_found with the same game id.
    let mut game_ids = Vec::new();
    for stream in &mut streams {
        let game_id = stream
            .find(|event| match event {
                ServerEvent::MatchFound { game_id, .. } => Some(*game_id),
                _ => None,
            })
            .expect("match_found");
        game_ids.push(game_id);
    }
    assert!(game_ids.windows(2).all(|w| w[0] == w[1]));

    let handle = harness.tables.get(game_ids[0]).expect("table addressable");
    let snapshot = handle.snapshot(None).await.unwrap();

    // Users A..F sit in seats 1..6; button 1, blinds 2 and 3, first
    // actor under the gun at seat 4.
    let seats: Vec<(usize, i64)> = snapshot.players.iter().map(|p| (p.seat, p.user_id)).collect();
    assert_eq!(seats, vec![(1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6)]);
    assert_eq!(snapshot.current_phase, HandPhase::Preflop);
    assert_eq!(snapshot.button_seat, Some(1));
    assert_eq!(snapshot.sb_seat, Some(2));
    assert_eq!(snapshot.bb_seat, Some(3));
    assert_eq!(snapshot.current_actor_seat, Some(4));
}

#[tokio::test]
async fn heads_up_all_in_finishes_game_with_chip_changes() {
    let harness = Harness::new();
    let config = TableConfig::cash(heads_up_100()).with_deck_seed(11);
    let (game_id, handle, _) = harness.tables.create_table(config, None);
    let room = Broadcaster::table_room(game_id);
    let mut p1 = harness.connect_to_room(1, &room);
    let _p2 = harness.connect_to_room(2, &room);

    handle.sit_down(1, Some(1), None).await.unwrap();
    handle.sit_down(2, Some(2), None).await.unwrap();
    harness.settle().await;

    // Button is the small blind and acts first preflop.
    let snapshot = handle.snapshot(None).await.unwrap();
    assert_eq!(snapshot.button_seat, Some(1));
    assert_eq!(snapshot.current_actor_seat, Some(1));

    handle
        .act(1, 1, PlayerAction::Raise { amount: 10 })
        .await
        .unwrap();
    handle
        .act(2, 2, PlayerAction::Raise { amount: 30 })
        .await
        .unwrap();
    handle.act(1, 1, PlayerAction::Allin).await.unwrap();
    handle.act(2, 2, PlayerAction::Call).await.unwrap();
    harness.settle().await;

    // Single 200-chip pot, board ran out to the river. The busted seat is
    // vacated at settlement, leaving only the winner seated.
    let snapshot = handle.snapshot(None).await.unwrap();
    assert_eq!(snapshot.current_phase, HandPhase::Settled);
    assert_eq!(snapshot.community_cards.len(), 5);
    let stacks: Vec<u32> = snapshot.players.iter().map(|p| p.chips).collect();
    assert_eq!(stacks, vec![200]);

    let runout = p1.find(|event| match event {
        ServerEvent::HandRunout {
            winner_id, board, ..
        } => Some((*winner_id, board.len())),
        _ => None,
    });
    let (winner_id, board_len) = runout.expect("hand_runout");
    assert_eq!(board_len, 5);

    // The inter-hand boundary vacates the busted seat and ends the game.
    harness.advance(3_000).await;
    let finished = p1.find(|event| match event {
        ServerEvent::GameFinished {
            reason,
            winner_id,
            stats,
            ..
        } => Some((reason.clone(), *winner_id, stats.clone())),
        _ => None,
    });
    let (reason, finished_winner, stats) = finished.expect("game_finished");
    assert_eq!(reason, "completed");
    assert_eq!(finished_winner, Some(winner_id));
    let stats = stats.expect("stats");
    assert_eq!(stats.total_hands, 1);
    let mut changes: Vec<i64> = stats.chip_changes.values().copied().collect();
    changes.sort_unstable();
    assert_eq!(changes, vec![-100, 100]);
    assert_eq!(stats.chip_changes[&winner_id], 100);

    // The settlement was recorded through the history hook.
    let records = harness.history.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].winner_id, winner_id);
    assert_eq!(records[0].hand_number, 1);
    let contributed: u32 = records[0].seats.iter().map(|s| s.contributed).sum();
    let won: u32 = records[0].awards.iter().map(|a| a.amount).sum();
    assert_eq!(contributed, won);
    assert_eq!(records[0].seats.len(), 2);
}

#[tokio::test]
async fn turn_timer_auto_folds_at_deadline() {
    let harness = Harness::new();
    let config = TableConfig::cash(heads_up_100()).with_deck_seed(3);
    let (game_id, handle, _) = harness.tables.create_table(config, None);
    let room = Broadcaster::table_room(game_id);
    let mut p2 = harness.connect_to_room(2, &room);

    handle.sit_down(1, Some(1), None).await.unwrap();
    handle.sit_down(2, Some(2), None).await.unwrap();
    harness.settle().await;

    let started = p2
        .find(|event| match event {
            ServerEvent::TurnTimerStarted {
                deadline,
                duration,
                active_seat,
                ..
            } => Some((*deadline, *duration, *active_seat)),
            _ => None,
        })
        .expect("turn_timer_started");
    assert_eq!(started.1, 30_000);
    assert_eq!(started.2, 1);
    assert_eq!(started.0, harness.clock.now_millis() + 30_000);

    // Nothing fires early.
    harness.advance(29_999).await;
    let snapshot = handle.snapshot(None).await.unwrap();
    assert_eq!(snapshot.current_actor_seat, Some(1));

    // At the deadline the small blind owes chips, so the auto action is a
    // fold and the hand settles to the big blind.
    harness.advance(1).await;
    let snapshot = handle.snapshot(None).await.unwrap();
    assert_eq!(snapshot.current_phase, HandPhase::Settled);
    let p2_player = snapshot.players.iter().find(|p| p.user_id == 2).unwrap();
    assert_eq!(p2_player.chips, 101);
}

#[tokio::test]
async fn disconnect_ghost_folds_then_leaves_after_grace() {
    let harness = Harness::new();
    let config = TableConfig::cash(heads_up_100()).with_deck_seed(5);
    let (game_id, handle, _) = harness.tables.create_table(config, None);
    let room = Broadcaster::table_room(game_id);
    let mut p2 = harness.connect_to_room(2, &room);

    handle.sit_down(1, Some(1), None).await.unwrap();
    handle.sit_down(2, Some(2), None).await.unwrap();
    harness.settle().await;
    p2.drain();

    // Seat 1 (on turn) loses its last socket.
    handle
        .send(openpoker::table::TableMessage::PresenceChanged {
            user_id: 1,
            online: false,
        })
        .unwrap();
    harness.settle().await;
    let status = p2
        .find(|event| match event {
            ServerEvent::PlayerStatusUpdate {
                player_id, status, ..
            } => Some((*player_id, *status)),
            _ => None,
        })
        .expect("status update");
    assert_eq!(status, (1, PlayerStatus::Disconnected));

    // The turn timer still fires at its original deadline and folds.
    harness.advance(30_000).await;
    let snapshot = handle.snapshot(None).await.unwrap();
    assert_eq!(snapshot.current_phase, HandPhase::Settled);
    assert!(snapshot
        .players
        .iter()
        .any(|p| p.user_id == 1 && p.folded));

    // Hand two starts at the boundary with the ghost still dealt in.
    harness.advance(3_000).await;
    let snapshot = handle.snapshot(None).await.unwrap();
    assert_eq!(snapshot.current_phase, HandPhase::Preflop);
    p2.drain();

    // Grace expires 60s after the disconnect: the ghost becomes LEFT.
    harness.advance(27_000).await;
    let status = p2
        .find(|event| match event {
            ServerEvent::PlayerStatusUpdate {
                player_id, status, ..
            } => Some((*player_id, *status)),
            _ => None,
        })
        .expect("left update");
    assert_eq!(status, (1, PlayerStatus::Left));

    // Seat 2 calls; the departed seat folds as soon as action reaches it,
    // and the seat is vacated at the next boundary.
    handle.act(2, 2, PlayerAction::Call).await.unwrap();
    harness.settle().await;
    harness.advance(3_000).await;
    let vacated = p2.find(|event| match event {
        ServerEvent::SeatVacated { seat_number, .. } => Some(*seat_number),
        _ => None,
    });
    assert_eq!(vacated, Some(1));
}

#[tokio::test]
async fn reconnect_before_grace_restores_the_seat() {
    let harness = Harness::new();
    let config = TableConfig::cash(heads_up_100()).with_deck_seed(5);
    let (_game_id, handle, _) = harness.tables.create_table(config, None);

    handle.sit_down(1, Some(1), None).await.unwrap();
    handle.sit_down(2, Some(2), None).await.unwrap();
    harness.settle().await;

    handle
        .send(openpoker::table::TableMessage::PresenceChanged {
            user_id: 1,
            online: false,
        })
        .unwrap();
    harness.advance(10_000).await;

    let outcome = handle.join(1).await.unwrap();
    assert!(outcome.resumed);
    harness.settle().await;
    let snapshot = handle.snapshot(None).await.unwrap();
    let p1 = snapshot.players.iter().find(|p| p.user_id == 1).unwrap();
    assert_eq!(p1.status, PlayerStatus::Active);
    assert_eq!(p1.disconnect_deadline, None);

    // The stale grace timer is cancelled: advancing past it changes
    // nothing.
    harness.advance(60_000).await;
    let snapshot = handle.snapshot(None).await.unwrap();
    let p1 = snapshot.players.iter().find(|p| p.user_id == 1).unwrap();
    assert_ne!(p1.status, PlayerStatus::Left);
}

#[tokio::test]
async fn repeated_join_is_idempotent() {
    let harness = Harness::new();
    let config = TableConfig::cash(heads_up_100()).with_deck_seed(9);
    let (_game_id, handle, _) = harness.tables.create_table(config, None);
    handle.sit_down(1, Some(1), None).await.unwrap();
    handle.sit_down(2, Some(2), None).await.unwrap();
    harness.settle().await;

    let first = handle.join(3).await.unwrap();
    let second = handle.join(3).await.unwrap();
    assert!(!first.resumed && !second.resumed);
    assert_eq!(first.snapshot, second.snapshot);
}

#[tokio::test]
async fn hole_cards_are_masked_for_other_viewers() {
    let harness = Harness::new();
    let mut variant = Variant::six_max();
    variant.max_players = 3;
    variant.queue_target = 3;
    let config = TableConfig::cash(variant).with_deck_seed(21);
    let (_game_id, handle, _) = harness.tables.create_table(config, None);
    handle.sit_down(1, Some(1), None).await.unwrap();
    handle.sit_down(2, Some(2), None).await.unwrap();
    handle.sit_down(3, Some(3), None).await.unwrap();
    harness.settle().await;

    let view = handle.snapshot(Some(1)).await.unwrap();
    for player in &view.players {
        if player.user_id == 1 {
            assert_eq!(player.hole_cards.as_ref().map(Vec::len), Some(2));
        } else {
            assert_eq!(player.hole_cards, None);
        }
    }
    // A spectator view shows no hole cards at all.
    let view = handle.snapshot(None).await.unwrap();
    assert!(view.players.iter().all(|p| p.hole_cards.is_none()));
}

#[tokio::test]
async fn private_table_flow_request_approve_and_admin() {
    let harness = Harness::new();
    let host = 10;
    let guest = 20;
    let mut host_stream = harness.connect(host);
    let config = TableConfig::private(heads_up_100(), host);
    let (game_id, handle, join_code) = harness.tables.create_table(config, None);
    let join_code = join_code.expect("private tables mint a join code");
    assert_eq!(join_code.len(), 5);
    assert_eq!(
        harness.tables.lookup_join_code(&join_code.to_lowercase()),
        Some(game_id)
    );

    // Guests cannot self-seat; they request and the host approves.
    let err = handle.sit_down(guest, None, None).await.unwrap_err();
    assert_eq!(err.to_string(), "Host only");
    handle.request_seat(guest).await.unwrap();
    let pending = host_stream.find(|event| match event {
        ServerEvent::SeatRequestPending { user_id, .. } => Some(*user_id),
        _ => None,
    });
    assert_eq!(pending, Some(guest));

    handle.sit_down(host, Some(1), None).await.unwrap();
    handle
        .admin(
            host,
            openpoker::net::messages::AdminCommand::Approve {
                user_id: guest,
                chips: Some(150),
            },
        )
        .await
        .unwrap();
    harness.settle().await;

    // No hand yet: private tables wait for the host's start.
    let snapshot = handle.snapshot(None).await.unwrap();
    assert_eq!(snapshot.current_phase, HandPhase::Waiting);
    let guest_player = snapshot.players.iter().find(|p| p.user_id == guest).unwrap();
    assert_eq!(guest_player.chips, 150);

    // Non-hosts are rejected from admin actions.
    let err = handle
        .admin(guest, openpoker::net::messages::AdminCommand::StartGame)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Host only");

    handle
        .admin(host, openpoker::net::messages::AdminCommand::StartGame)
        .await
        .unwrap();
    harness.settle().await;
    let snapshot = handle.snapshot(None).await.unwrap();
    assert_eq!(snapshot.current_phase, HandPhase::Preflop);

    // Blind changes apply at the next hand boundary.
    handle
        .admin(
            host,
            openpoker::net::messages::AdminCommand::SetBlinds { small: 5, big: 10 },
        )
        .await
        .unwrap();
    let snapshot = handle.snapshot(None).await.unwrap();
    assert_eq!((snapshot.small_blind, snapshot.big_blind), (1, 2));
}

#[tokio::test]
async fn pause_takes_effect_at_the_hand_boundary() {
    let harness = Harness::new();
    let host = 1;
    let config = TableConfig::private(heads_up_100(), host).with_deck_seed(2);
    let (_game_id, handle, _) = harness.tables.create_table(config, None);
    handle.sit_down(host, Some(1), None).await.unwrap();
    handle
        .admin(
            host,
            openpoker::net::messages::AdminCommand::Approve {
                user_id: 2,
                chips: None,
            },
        )
        .await
        .unwrap_err();
    // User 2 never requested a seat; seat them via a request instead.
    handle.request_seat(2).await.unwrap();
    handle
        .admin(
            host,
            openpoker::net::messages::AdminCommand::Approve {
                user_id: 2,
                chips: None,
            },
        )
        .await
        .unwrap();
    handle
        .admin(host, openpoker::net::messages::AdminCommand::StartGame)
        .await
        .unwrap();
    harness.settle().await;

    // Pause mid-hand: the current hand keeps running.
    handle
        .admin(host, openpoker::net::messages::AdminCommand::Pause)
        .await
        .unwrap();
    let snapshot = handle.snapshot(None).await.unwrap();
    assert!(snapshot.is_paused);
    assert_eq!(snapshot.current_phase, HandPhase::Preflop);
    assert!(snapshot.current_actor_seat.is_some());

    // Finish the hand; no new hand starts while paused.
    let actor = snapshot.current_actor_seat.unwrap();
    let actor_user = snapshot
        .players
        .iter()
        .find(|p| p.seat == actor)
        .unwrap()
        .user_id;
    handle.act(actor_user, actor, PlayerAction::Fold).await.unwrap();
    harness.advance(3_000).await;
    let snapshot = handle.snapshot(None).await.unwrap();
    assert_eq!(snapshot.current_phase, HandPhase::Waiting);

    // Resume deals again.
    handle
        .admin(host, openpoker::net::messages::AdminCommand::Resume)
        .await
        .unwrap();
    harness.settle().await;
    let snapshot = handle.snapshot(None).await.unwrap();
    assert_eq!(snapshot.current_phase, HandPhase::Preflop);
}
