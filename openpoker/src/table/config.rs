//! Per-table configuration and join codes.

use rand::Rng;

use crate::constants::JOIN_CODE_LEN;
use crate::game::entities::{TournamentId, UserId, Variant};

/// How a table came to exist and how it behaves between hands.
#[derive(Clone, Debug)]
pub struct TableConfig {
    pub variant: Variant,
    /// Present on private tables only; gates admin actions.
    pub host_id: Option<UserId>,
    /// Back-reference used for event tagging and the settlement hook.
    pub tournament_id: Option<TournamentId>,
    /// Fixed deck seed for deterministic tests; production tables draw
    /// from OS entropy per hand.
    pub deck_seed: Option<u64>,
    /// Whether hands start on their own once two funded players are
    /// seated. Private tables wait for the host's start command.
    pub auto_start: bool,
}

impl TableConfig {
    /// Matchmade cash table: no host, starts on its own.
    #[must_use]
    pub fn cash(variant: Variant) -> Self {
        Self {
            variant,
            host_id: None,
            tournament_id: None,
            deck_seed: None,
            auto_start: true,
        }
    }

    /// Private host-controlled table.
    #[must_use]
    pub fn private(variant: Variant, host_id: UserId) -> Self {
        Self {
            variant,
            host_id: Some(host_id),
            tournament_id: None,
            deck_seed: None,
            auto_start: false,
        }
    }

    /// Tournament-owned table; pause state follows the supervisor.
    #[must_use]
    pub fn tournament(variant: Variant, tournament_id: TournamentId) -> Self {
        Self {
            variant,
            host_id: None,
            tournament_id: Some(tournament_id),
            deck_seed: None,
            auto_start: true,
        }
    }

    #[must_use]
    pub fn with_deck_seed(mut self, seed: u64) -> Self {
        self.deck_seed = Some(seed);
        self
    }

    #[must_use]
    pub fn is_private(&self) -> bool {
        self.host_id.is_some()
    }
}

const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Mint a join code: exactly five characters of `[A-Z0-9]`.
#[must_use]
pub fn mint_join_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..JOIN_CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..JOIN_CODE_ALPHABET.len());
            JOIN_CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// Canonical form used for case-insensitive lookup.
#[must_use]
pub fn normalize_join_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
