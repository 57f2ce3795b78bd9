//! Real-time multiplayer poker server.
//!
//! Spawns the authoritative runtime (tables, matchmaker, tournaments) and
//! exposes one WebSocket endpoint per client session.

mod api;
mod config;
mod logging;
mod metrics;

use std::sync::Arc;

use anyhow::Error;
use ctrlc::set_handler;
use pico_args::Arguments;
use tracing::info;

use openpoker::clock::{Clock, SystemClock};
use openpoker::db::{Database, PgHandHistory, TournamentStore};
use openpoker::history::{HandHistorySink, NullHistorySink};
use openpoker::table::TableDeps;
use openpoker::{
    ActiveSessions, Broadcaster, ConnectionRegistry, Matchmaker, TableManager,
    TournamentDirectory, Variant,
};

use crate::config::ServerConfig;

const HELP: &str = "\
Run the poker service

USAGE:
  op_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:7070]
  --db-url     URL         Postgres connection string  [default: env DATABASE_URL; omit for memory-only]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g. 0.0.0.0:7070)
  DATABASE_URL             Postgres connection string for hand history and
                           tournament bookkeeping
  METRICS_BIND             Prometheus exporter address (e.g. 127.0.0.1:9090)
  COMMANDS_PER_SECOND      Per-socket command budget [default: 20]
  RUST_LOG                 Log filter
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }
    let bind_override = pargs.opt_value_from_str("--bind")?;
    let database_url_override = pargs.opt_value_from_str("--db-url")?;

    set_handler(|| std::process::exit(0))?;
    logging::init();

    let config = ServerConfig::from_env(bind_override, database_url_override)?;

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(Error::msg)?;
        info!("metrics exporter on {metrics_bind}");
    }

    // Persistence is an optional collaborator: without a database the
    // runtime is memory-only and hand histories are dropped.
    let (history, store): (Arc<dyn HandHistorySink>, Option<Arc<TournamentStore>>) =
        match &config.database {
            Some(db_config) => {
                let database = Database::connect(db_config).await?;
                info!("database connected");
                let pool = Arc::new(database.pool().clone());
                (
                    Arc::new(PgHandHistory::new(Arc::clone(&pool))),
                    Some(Arc::new(TournamentStore::new(pool))),
                )
            }
            None => {
                info!("no DATABASE_URL; running memory-only");
                (Arc::new(NullHistorySink), None)
            }
        };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&clock)));
    let broadcaster = Arc::new(Broadcaster::new());
    let sessions = Arc::new(ActiveSessions::new());
    let deps = TableDeps {
        clock: Arc::clone(&clock),
        broadcaster: Arc::clone(&broadcaster),
        registry: Arc::clone(&registry),
        sessions: Arc::clone(&sessions),
        history,
    };
    let tables = TableManager::new(deps.clone());
    let matchmaker = Arc::new(Matchmaker::new(
        vec![Variant::heads_up(), Variant::six_max()],
        Arc::clone(&clock),
        Arc::clone(&sessions),
        Arc::clone(&registry),
        Arc::clone(&broadcaster),
        Arc::clone(&tables),
    ));
    let tournaments = Arc::new(TournamentDirectory::new(
        deps.clone(),
        Arc::clone(&tables),
        store,
    ));

    let state = api::AppState {
        registry,
        broadcaster,
        sessions,
        tables,
        matchmaker,
        tournaments,
        commands_per_second: config.commands_per_second,
    };

    let app = api::router(state);
    info!("poker service listening on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
