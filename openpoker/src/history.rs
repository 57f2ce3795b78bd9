//! Hand-history hook point.
//!
//! The runtime is memory-authoritative; histories are written through this
//! collaborator after each settlement from a background task. A failing
//! sink logs and never blocks the next hand. The binary codec and replay
//! format live outside this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::entities::{Card, Chips, SeatNumber, TableId, TournamentId, UserId};
use crate::game::pot::{Pot, PotAward};

/// One seat's outcome within a recorded hand. `manifest_index` is the
/// reduced 0..N-1 ordering of dealt-in players at hand start.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HandSeatRecord {
    pub manifest_index: usize,
    pub user_id: UserId,
    pub seat: SeatNumber,
    pub hole_cards: Vec<Card>,
    pub contributed: Chips,
    pub folded: bool,
    pub won: Chips,
}

/// Complete record of one settled hand.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HandRecord {
    pub id: Uuid,
    pub table_id: TableId,
    pub tournament_id: Option<TournamentId>,
    pub hand_number: u64,
    pub board: Vec<Card>,
    pub seats: Vec<HandSeatRecord>,
    pub pots: Vec<Pot>,
    pub awards: Vec<PotAward>,
    pub winner_id: UserId,
    pub completed_at: DateTime<Utc>,
}

#[async_trait]
pub trait HandHistorySink: Send + Sync + 'static {
    async fn record_hand(&self, record: HandRecord) -> anyhow::Result<()>;
}

/// Sink that drops every record. Used when no database is configured and in
/// tests that do not care about history.
pub struct NullHistorySink;

#[async_trait]
impl HandHistorySink for NullHistorySink {
    async fn record_hand(&self, record: HandRecord) -> anyhow::Result<()> {
        log::trace!(
            "dropping hand record {} for table {}",
            record.hand_number,
            record.table_id
        );
        Ok(())
    }
}

/// In-memory sink for test assertions.
#[derive(Default)]
pub struct MemoryHistorySink {
    pub records: std::sync::Mutex<Vec<HandRecord>>,
}

#[async_trait]
impl HandHistorySink for MemoryHistorySink {
    async fn record_hand(&self, record: HandRecord) -> anyhow::Result<()> {
        self.records.lock().expect("history sink poisoned").push(record);
        Ok(())
    }
}
