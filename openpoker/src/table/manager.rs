//! Table directory: mints table actors and resolves ids and join codes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

use super::actor::{TableActor, TableDeps};
use super::config::{mint_join_code, normalize_join_code, TableConfig};
use super::messages::{TableHandle, TableSettlement};
use crate::game::entities::TableId;

pub struct TableManager {
    deps: TableDeps,
    tables: Arc<RwLock<HashMap<TableId, TableHandle>>>,
    join_codes: Arc<RwLock<HashMap<String, TableId>>>,
    closed_tx: RwLock<Option<mpsc::UnboundedSender<TableId>>>,
    next_table_id: AtomicI64,
}

impl TableManager {
    #[must_use]
    pub fn new(deps: TableDeps) -> Arc<Self> {
        let manager = Arc::new(Self {
            deps,
            tables: Arc::new(RwLock::new(HashMap::new())),
            join_codes: Arc::new(RwLock::new(HashMap::new())),
            closed_tx: RwLock::new(None),
            next_table_id: AtomicI64::new(1),
        });
        manager.spawn_reaper();
        manager
    }

    /// Directory cleanup: table actors push their id here when they close.
    fn spawn_reaper(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<TableId>();
        let tables = Arc::clone(&self.tables);
        let join_codes = Arc::clone(&self.join_codes);
        tokio::spawn(async move {
            while let Some(table_id) = rx.recv().await {
                tables.write().expect("tables poisoned").remove(&table_id);
                join_codes
                    .write()
                    .expect("join codes poisoned")
                    .retain(|_, id| *id != table_id);
                log::debug!("table {table_id} reaped from directory");
            }
        });
        *self.closed_tx.write().expect("closed_tx poisoned") = Some(tx);
    }

    /// Create and spawn a table. The handle is registered in the directory
    /// before this returns, so the new table is addressable before any
    /// `match_found` is broadcast. Returns the join code for private
    /// tables.
    pub fn create_table(
        &self,
        config: TableConfig,
        settlement_tx: Option<mpsc::UnboundedSender<TableSettlement>>,
    ) -> (TableId, TableHandle, Option<String>) {
        let table_id = self.next_table_id.fetch_add(1, Ordering::Relaxed);
        let closed_tx = self.closed_tx.read().expect("closed_tx poisoned").clone();
        let join_code = config.is_private().then(|| {
            let mut rng = StdRng::from_os_rng();
            let mut codes = self.join_codes.write().expect("join codes poisoned");
            loop {
                let code = mint_join_code(&mut rng);
                if !codes.contains_key(&code) {
                    codes.insert(code.clone(), table_id);
                    break code;
                }
            }
        });
        let (actor, handle) = TableActor::new(
            table_id,
            config,
            self.deps.clone(),
            settlement_tx,
            closed_tx,
        );
        self.tables
            .write()
            .expect("tables poisoned")
            .insert(table_id, handle.clone());
        tokio::spawn(actor.run());
        log::info!("created table {table_id}");
        (table_id, handle, join_code)
    }

    #[must_use]
    pub fn get(&self, table_id: TableId) -> Option<TableHandle> {
        self.tables
            .read()
            .expect("tables poisoned")
            .get(&table_id)
            .cloned()
    }

    /// Case-insensitive join-code lookup.
    #[must_use]
    pub fn lookup_join_code(&self, code: &str) -> Option<TableId> {
        self.join_codes
            .read()
            .expect("join codes poisoned")
            .get(&normalize_join_code(code))
            .copied()
    }

    #[must_use]
    pub fn active_table_count(&self) -> usize {
        self.tables.read().expect("tables poisoned").len()
    }
}
