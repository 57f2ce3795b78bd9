//! Session router: the per-socket command dispatcher.
//!
//! One persistent WebSocket per client. Inbound JSON commands are
//! rate-limited and validated here, then forwarded to table, matchmaker,
//! or tournament handles; the router never mutates game state directly.
//! Outbound events flow through the connection registry's per-socket
//! channel, so room broadcasts and command responses share one ordered
//! stream.
//!
//! The `user_id` query parameter is the opaque identifier produced by the
//! authentication layer in front of this service; this core trusts it as
//! already verified.

use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use openpoker::connection::{ConnId, EventSender};
use openpoker::net::messages::{ClientCommand, ServerEvent};
use openpoker::table::{TableError, TableMessage};
use openpoker::{Broadcaster, TableId, UserId};

use super::AppState;
use crate::api::rate_limiter::RateLimiter;
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    user_id: UserId,
}

/// Process-wide count of open sockets, mirrored into the connections
/// gauge.
static ACTIVE_SOCKETS: AtomicUsize = AtomicUsize::new(0);

/// Upgrade to a WebSocket session for an authenticated user.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query.user_id, state))
}

struct SocketCtx {
    user_id: UserId,
    conn_id: ConnId,
    sender: EventSender,
}

async fn handle_socket(socket: WebSocket, user_id: UserId, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (conn_id, mut events, sender) = state.registry.register(user_id);
    metrics::websocket_connections_active(ACTIVE_SOCKETS.fetch_add(1, Ordering::Relaxed) + 1);
    info!(user_id, conn_id, "websocket connected");

    // If the user holds a seat somewhere, their table learns they are
    // back before any explicit join_game.
    if let Some(game_id) = state.sessions.game_of(user_id)
        && let Some(handle) = state.tables.get(game_id)
    {
        let _ = handle.send(TableMessage::PresenceChanged {
            user_id,
            online: true,
        });
    }

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!("failed to serialize event: {err}");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let ctx = SocketCtx {
        user_id,
        conn_id,
        sender,
    };
    let mut limiter = RateLimiter::per_second(state.commands_per_second);

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                state.registry.touch(user_id);
                if !limiter.check() {
                    metrics::commands_rate_limited_total();
                    let _ = ctx.sender.send(ServerEvent::error("Rate limit exceeded"));
                    continue;
                }
                match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => {
                        debug!(user_id, ?command, "command");
                        dispatch(command, &ctx, &state).await;
                    }
                    Err(err) => {
                        let _ = ctx
                            .sender
                            .send(ServerEvent::error(format!("Invalid command: {err}")));
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    // Cleanup: drop room memberships, then report presence if this was
    // the user's last socket.
    send_task.abort();
    metrics::websocket_connections_active(
        ACTIVE_SOCKETS
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1),
    );
    state.broadcaster.leave_all(conn_id);
    let last_socket = state.registry.deregister(user_id, conn_id);
    if last_socket
        && let Some(game_id) = state.sessions.game_of(user_id)
        && let Some(handle) = state.tables.get(game_id)
    {
        let _ = handle.send(TableMessage::PresenceChanged {
            user_id,
            online: false,
        });
    }
    info!(user_id, conn_id, "websocket disconnected");
}

/// Route one validated command. Responses and errors go back on the
/// originating socket only; room traffic is produced by the actors.
async fn dispatch(command: ClientCommand, ctx: &SocketCtx, state: &AppState) {
    metrics::commands_total(command_kind(&command));
    match command {
        ClientCommand::JoinGame { game_id } | ClientCommand::JoinTable { table_id: game_id } => {
            join_game(game_id, ctx, state).await;
        }
        ClientCommand::LeaveGame { game_id } => {
            let Some(handle) = state.tables.get(game_id) else {
                return send_error(ctx, "Game not found");
            };
            match handle.leave(ctx.user_id).await {
                Ok(()) => {
                    state
                        .broadcaster
                        .leave_room(&Broadcaster::table_room(game_id), ctx.conn_id);
                }
                Err(err) => send_error(ctx, err),
            }
        }
        ClientCommand::Action {
            game_id,
            seat,
            action,
        } => {
            let Some(handle) = state.tables.get(game_id) else {
                return send_error(ctx, "Game not found");
            };
            if let Err(err) = handle.act(ctx.user_id, seat, action).await {
                send_error(ctx, err);
            }
        }
        ClientCommand::JoinQueue { queue_type } => {
            state.broadcaster.join_room(
                &Broadcaster::queue_room(&queue_type),
                ctx.conn_id,
                ctx.user_id,
                ctx.sender.clone(),
            );
            if let Err(err) = state.matchmaker.join_queue(ctx.user_id, &queue_type).await {
                send_error(ctx, err);
            }
        }
        ClientCommand::LeaveQueue { queue_type } => {
            state
                .broadcaster
                .leave_room(&Broadcaster::queue_room(&queue_type), ctx.conn_id);
            if let Err(err) = state.matchmaker.leave_queue(ctx.user_id, &queue_type).await {
                send_error(ctx, err);
            }
        }
        ClientCommand::CheckQueueStatus => {
            let status = state.matchmaker.queue_status(ctx.user_id).await;
            let _ = ctx.sender.send(status);
        }
        ClientCommand::CheckActiveSession => {
            let game_id = state.sessions.game_of(ctx.user_id);
            let _ = ctx.sender.send(ServerEvent::SessionStatus {
                in_game: game_id.is_some(),
                game_id,
                status: game_id.map(|_| "active".to_string()),
            });
        }
        ClientCommand::CheckActiveStatus => {
            let status = state.sessions.status_of(ctx.user_id);
            let _ = ctx.sender.send(ServerEvent::ActiveStatus {
                game: status.game,
                tournament: status.tournament,
                queue: status.queue,
            });
        }
        ClientCommand::CreatePrivateTable { variant } => {
            let Some(variant) = state.matchmaker.variant(&variant).cloned() else {
                return send_error(ctx, "Unknown variant");
            };
            let config = openpoker::TableConfig::private(variant, ctx.user_id);
            let (game_id, _, join_code) = state.tables.create_table(config, None);
            metrics::tables_active(state.tables.active_table_count());
            state.broadcaster.join_room(
                &Broadcaster::table_room(game_id),
                ctx.conn_id,
                ctx.user_id,
                ctx.sender.clone(),
            );
            let _ = ctx
                .sender
                .send(ServerEvent::TableCreated { game_id, join_code });
        }
        ClientCommand::LookupJoinCode { code } => {
            match state.tables.lookup_join_code(&code) {
                Some(game_id) => {
                    let _ = ctx.sender.send(ServerEvent::JoinCodeResolved { game_id });
                }
                None => send_error(ctx, "Join code not found"),
            }
        }
        ClientCommand::RequestSeat { game_id } => {
            let Some(handle) = state.tables.get(game_id) else {
                return send_error(ctx, "Game not found");
            };
            if let Err(err) = handle.request_seat(ctx.user_id).await {
                send_error(ctx, err);
            }
        }
        ClientCommand::HostSelfSeat {
            game_id,
            seat_number,
        } => {
            let Some(handle) = state.tables.get(game_id) else {
                return send_error(ctx, "Game not found");
            };
            if let Err(err) = handle.sit_down(ctx.user_id, seat_number, None).await {
                send_error(ctx, err);
            }
        }
        ClientCommand::AdminAction { game_id, action } => {
            let Some(handle) = state.tables.get(game_id) else {
                return send_error(ctx, "Game not found");
            };
            if let Err(err) = handle.admin(ctx.user_id, action).await {
                send_error(ctx, err);
            }
        }
        ClientCommand::CreateTournament { settings } => {
            match state.tournaments.create(ctx.user_id, settings) {
                Ok((tournament_id, _)) => {
                    state.broadcaster.join_room(
                        &Broadcaster::tournament_room(tournament_id),
                        ctx.conn_id,
                        ctx.user_id,
                        ctx.sender.clone(),
                    );
                    let _ = ctx
                        .sender
                        .send(ServerEvent::TournamentCreated { tournament_id });
                }
                Err(err) => send_error(ctx, err),
            }
        }
        ClientCommand::RegisterTournament { tournament_id } => {
            let Some(handle) = state.tournaments.get(tournament_id) else {
                return send_error(ctx, "Tournament not found");
            };
            state.broadcaster.join_room(
                &Broadcaster::tournament_room(tournament_id),
                ctx.conn_id,
                ctx.user_id,
                ctx.sender.clone(),
            );
            if let Err(err) = handle.register(ctx.user_id).await {
                send_error(ctx, err);
            }
        }
        ClientCommand::UnregisterTournament { tournament_id } => {
            let Some(handle) = state.tournaments.get(tournament_id) else {
                return send_error(ctx, "Tournament not found");
            };
            if let Err(err) = handle.unregister(ctx.user_id).await {
                send_error(ctx, err);
            }
        }
        ClientCommand::TournamentAdminAction {
            tournament_id,
            action,
        } => {
            let Some(handle) = state.tournaments.get(tournament_id) else {
                return send_error(ctx, "Tournament not found");
            };
            if let Err(err) = handle.admin(ctx.user_id, action).await {
                send_error(ctx, err);
            }
        }
        ClientCommand::GetTournamentState { tournament_id } => {
            let Some(handle) = state.tournaments.get(tournament_id) else {
                return send_error(ctx, "Tournament not found");
            };
            match handle.state().await {
                Ok(snapshot) => {
                    let _ = ctx.sender.send(ServerEvent::TournamentState(snapshot));
                }
                Err(err) => send_error(ctx, err),
            }
        }
        ClientCommand::JoinTournamentRoom { tournament_id } => {
            if state.tournaments.get(tournament_id).is_none() {
                return send_error(ctx, "Tournament not found");
            }
            state.broadcaster.join_room(
                &Broadcaster::tournament_room(tournament_id),
                ctx.conn_id,
                ctx.user_id,
                ctx.sender.clone(),
            );
        }
    }
}

/// `join_game`: subscribe the socket to the table room and deliver the
/// authoritative snapshot (plus `sync_game` after a reconnect). Repeating
/// the join is idempotent.
async fn join_game(game_id: TableId, ctx: &SocketCtx, state: &AppState) {
    let Some(handle) = state.tables.get(game_id) else {
        return send_error(ctx, "Game not found");
    };
    state.broadcaster.join_room(
        &Broadcaster::table_room(game_id),
        ctx.conn_id,
        ctx.user_id,
        ctx.sender.clone(),
    );
    match handle.join(ctx.user_id).await {
        Ok(outcome) => {
            let _ = ctx
                .sender
                .send(ServerEvent::GameState(outcome.snapshot.clone()));
            if outcome.resumed {
                let _ = ctx.sender.send(ServerEvent::SyncGame(outcome.snapshot));
            }
        }
        Err(TableError::GameOver) => send_error(ctx, "Game not found"),
        Err(err) => send_error(ctx, err),
    }
}

fn send_error(ctx: &SocketCtx, err: impl ToString) {
    let _ = ctx.sender.send(ServerEvent::error(err.to_string()));
}

fn command_kind(command: &ClientCommand) -> &'static str {
    match command {
        ClientCommand::JoinGame { .. } => "join_game",
        ClientCommand::LeaveGame { .. } => "leave_game",
        ClientCommand::Action { .. } => "action",
        ClientCommand::JoinQueue { .. } => "join_queue",
        ClientCommand::LeaveQueue { .. } => "leave_queue",
        ClientCommand::CheckQueueStatus => "check_queue_status",
        ClientCommand::CheckActiveSession => "check_active_session",
        ClientCommand::CheckActiveStatus => "check_active_status",
        ClientCommand::CreatePrivateTable { .. } => "create_private_table",
        ClientCommand::LookupJoinCode { .. } => "lookup_join_code",
        ClientCommand::RequestSeat { .. } => "request_seat",
        ClientCommand::HostSelfSeat { .. } => "host_self_seat",
        ClientCommand::AdminAction { .. } => "admin_action",
        ClientCommand::CreateTournament { .. } => "create_tournament",
        ClientCommand::RegisterTournament { .. } => "register_tournament",
        ClientCommand::UnregisterTournament { .. } => "unregister_tournament",
        ClientCommand::TournamentAdminAction { .. } => "tournament_admin_action",
        ClientCommand::GetTournamentState { .. } => "get_tournament_state",
        ClientCommand::JoinTournamentRoom { .. } => "join_tournament_room",
        ClientCommand::JoinTable { .. } => "join_table",
    }
}
