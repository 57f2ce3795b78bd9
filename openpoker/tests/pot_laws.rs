//! Property-based laws for the pot engine: purity, permutation
//! independence, conservation, and eligibility monotonicity.

use std::collections::HashMap;

use proptest::prelude::*;

use openpoker::game::eval::{HandCategory, HandRank};
use openpoker::game::pot::{build_pots, settle, Contribution};

fn contribution_strategy() -> impl Strategy<Value = Vec<Contribution>> {
    prop::collection::vec((1u32..=500, any::<bool>()), 2..=9).prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, (amount, folded))| Contribution {
                user_id: i as i64 + 1,
                amount,
                // Keep at least one live contributor.
                folded: folded && i != 0,
            })
            .collect()
    })
}

fn ranks_for(contributions: &[Contribution]) -> HashMap<i64, HandRank> {
    contributions
        .iter()
        .filter(|c| !c.folded)
        .map(|c| {
            // Deterministic but varied strength derived from the input.
            let category = match c.amount % 4 {
                0 => HandCategory::HighCard,
                1 => HandCategory::OnePair,
                2 => HandCategory::TwoPair,
                _ => HandCategory::Flush,
            };
            (
                c.user_id,
                HandRank {
                    category,
                    kickers: vec![(c.amount % 13) as u8 + 2],
                },
            )
        })
        .collect()
}

proptest! {
    /// Pot composition is a pure function of the contribution multiset.
    #[test]
    fn build_pots_is_pure(contributions in contribution_strategy()) {
        let first = build_pots(&contributions);
        let second = build_pots(&contributions);
        prop_assert_eq!(first, second);
    }

    /// Input permutation never changes the pot list.
    #[test]
    fn build_pots_is_order_independent(
        contributions in contribution_strategy(),
        rotation in 0usize..9,
    ) {
        let baseline = build_pots(&contributions);
        let mut rotated = contributions.clone();
        let len = rotated.len();
        rotated.rotate_left(rotation % len);
        prop_assert_eq!(baseline, build_pots(&rotated));
    }

    /// Pot amounts sum back to the contributions.
    #[test]
    fn pots_are_reversible_to_contributions(contributions in contribution_strategy()) {
        let pots = build_pots(&contributions);
        let contributed: u32 = contributions.iter().map(|c| c.amount).sum();
        let potted: u32 = pots.iter().map(|p| p.amount).sum();
        prop_assert_eq!(contributed, potted);
    }

    /// Folded players never appear in any eligible set.
    #[test]
    fn folded_players_never_eligible(contributions in contribution_strategy()) {
        let pots = build_pots(&contributions);
        for contribution in contributions.iter().filter(|c| c.folded) {
            for pot in &pots {
                prop_assert!(!pot.eligible.contains(&contribution.user_id));
            }
        }
    }

    /// For all i < j, pots[i].eligible ⊇ pots[j].eligible, and every set is
    /// non-empty.
    #[test]
    fn eligible_sets_shrink_monotonically(contributions in contribution_strategy()) {
        let pots = build_pots(&contributions);
        for pot in &pots {
            prop_assert!(!pot.eligible.is_empty());
        }
        for pair in pots.windows(2) {
            prop_assert!(pair[1].eligible.is_subset(&pair[0].eligible));
        }
    }

    /// Settlement pays out exactly what went in.
    #[test]
    fn settlement_conserves_chips(contributions in contribution_strategy()) {
        let pots = build_pots(&contributions);
        let ranks = ranks_for(&contributions);
        let order: Vec<i64> = contributions.iter().map(|c| c.user_id).collect();
        let awards = settle(&pots, &ranks, &order);
        let potted: u32 = pots.iter().map(|p| p.amount).sum();
        let awarded: u32 = awards.iter().map(|a| a.amount).sum();
        prop_assert_eq!(potted, awarded);
        // Only eligible (never folded) players win.
        for award in &awards {
            prop_assert!(ranks.contains_key(&award.user_id));
        }
    }
}
