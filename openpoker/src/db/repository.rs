//! Append-only repositories for hand histories and tournament bookkeeping.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

use crate::game::entities::{TournamentId, UserId};
use crate::history::{HandHistorySink, HandRecord};
use crate::tournament::models::{Participant, TournamentSettings, TournamentStatus};

/// Postgres-backed [`HandHistorySink`]. Rows are append-only; the full
/// record rides along as JSONB for the external codec and statistics
/// aggregator to consume.
pub struct PgHandHistory {
    pool: Arc<PgPool>,
}

impl PgHandHistory {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HandHistorySink for PgHandHistory {
    async fn record_hand(&self, record: HandRecord) -> anyhow::Result<()> {
        let payload = serde_json::to_value(&record)?;
        sqlx::query(
            r#"
            INSERT INTO hand_histories (id, table_id, tournament_id, hand_number, winner_id, payload, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.table_id)
        .bind(record.tournament_id)
        .bind(record.hand_number as i64)
        .bind(record.winner_id)
        .bind(payload)
        .bind(record.completed_at)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}

/// Tournament and participant bookkeeping, written on every status
/// transition. Reads happen only during operational recovery, never in the
/// hot path.
pub struct TournamentStore {
    pool: Arc<PgPool>,
}

impl TournamentStore {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn upsert_tournament(
        &self,
        tournament_id: TournamentId,
        host_id: UserId,
        settings: &TournamentSettings,
        status: TournamentStatus,
        current_level: usize,
    ) -> anyhow::Result<()> {
        let settings_json = serde_json::to_value(settings)?;
        sqlx::query(
            r#"
            INSERT INTO tournaments (id, host_id, title, settings, status, current_level, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (id) DO UPDATE
            SET settings = EXCLUDED.settings,
                status = EXCLUDED.status,
                current_level = EXCLUDED.current_level,
                updated_at = NOW()
            "#,
        )
        .bind(tournament_id)
        .bind(host_id)
        .bind(&settings.title)
        .bind(settings_json)
        .bind(status.to_string())
        .bind(current_level as i32)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    pub async fn upsert_participant(
        &self,
        tournament_id: TournamentId,
        participant: &Participant,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tournament_participants
                (tournament_id, user_id, status, current_stack, current_table_id, current_seat, finish_position, eliminated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tournament_id, user_id) DO UPDATE
            SET status = EXCLUDED.status,
                current_stack = EXCLUDED.current_stack,
                current_table_id = EXCLUDED.current_table_id,
                current_seat = EXCLUDED.current_seat,
                finish_position = EXCLUDED.finish_position,
                eliminated_at = EXCLUDED.eliminated_at
            "#,
        )
        .bind(tournament_id)
        .bind(participant.user_id)
        .bind(participant.status.to_string())
        .bind(i64::from(participant.current_stack))
        .bind(participant.current_table_id)
        .bind(participant.current_seat.map(|s| s as i32))
        .bind(participant.finish_position.map(|p| p as i32))
        .bind(participant.eliminated_at.map(|ms| ms as i64))
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    pub async fn delete_participant(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "DELETE FROM tournament_participants WHERE tournament_id = $1 AND user_id = $2",
        )
        .bind(tournament_id)
        .bind(user_id)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}
