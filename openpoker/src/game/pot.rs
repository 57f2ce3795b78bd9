//! Layered pot construction and settlement.
//!
//! Pure functions over per-player hand contributions. Folded players
//! contribute chips but are never eligible for any pot. The caller (the
//! table) applies awards to chip counts; nothing here mutates players.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::entities::{Chips, UserId};
use super::eval::HandRank;

/// One layer of the pot with the set of users who may win it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Pot {
    pub amount: Chips,
    pub eligible: BTreeSet<UserId>,
}

/// A player's total contribution to the hand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Contribution {
    pub user_id: UserId,
    pub amount: Chips,
    pub folded: bool,
}

/// Chips owed to one user out of settlement.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PotAward {
    pub user_id: UserId,
    pub amount: Chips,
}

/// Build the ordered pot list `[main, side₁, …]` from hand contributions.
///
/// Standard layered algorithm: at each distinct contribution level `Lk`, a
/// pot of `(Lk − Lk₋₁) × |contributors ≥ Lk|` forms, eligible to the
/// not-folded contributors at or above that level. Eligible sets shrink
/// monotonically across side pots.
#[must_use]
pub fn build_pots(contributions: &[Contribution]) -> Vec<Pot> {
    let mut levels: Vec<Chips> = contributions
        .iter()
        .filter(|c| c.amount > 0)
        .map(|c| c.amount)
        .collect();
    levels.sort_unstable();
    levels.dedup();

    let mut pots = Vec::with_capacity(levels.len());
    let mut prev = 0;
    for level in levels {
        let slice = level - prev;
        let contributors = contributions
            .iter()
            .filter(|c| c.amount >= level)
            .count() as Chips;
        let eligible: BTreeSet<UserId> = contributions
            .iter()
            .filter(|c| !c.folded && c.amount >= level)
            .map(|c| c.user_id)
            .collect();
        let amount = slice * contributors;
        // A layer only folded players reach merges into the pot below it:
        // their chips are still owed to whoever wins that pot.
        if eligible.is_empty() {
            if let Some(last) = pots.last_mut() {
                let last: &mut Pot = last;
                last.amount += amount;
            }
            prev = level;
            continue;
        }
        pots.push(Pot { amount, eligible });
        prev = level;
    }
    pots
}

/// Settle every pot: each is awarded to its highest-ranked eligible hand,
/// with ties split evenly and odd chips handed out one at a time following
/// `odd_chip_order` (users clockwise starting left of the button).
#[must_use]
pub fn settle(
    pots: &[Pot],
    ranks: &HashMap<UserId, HandRank>,
    odd_chip_order: &[UserId],
) -> Vec<PotAward> {
    let mut totals: HashMap<UserId, Chips> = HashMap::new();
    for pot in pots {
        let best = pot
            .eligible
            .iter()
            .filter_map(|user| ranks.get(user))
            .max()
            .cloned();
        let winners: Vec<UserId> = match best {
            Some(best) => pot
                .eligible
                .iter()
                .filter(|user| ranks.get(user) == Some(&best))
                .copied()
                .collect(),
            // No ranked hands (fold-out): the whole eligible set shares.
            None => pot.eligible.iter().copied().collect(),
        };
        if winners.is_empty() {
            continue;
        }
        let share = pot.amount / winners.len() as Chips;
        let mut remainder = pot.amount % winners.len() as Chips;
        for &user in &winners {
            *totals.entry(user).or_default() += share;
        }
        let mut granted: Vec<UserId> = Vec::with_capacity(remainder as usize);
        for &user in odd_chip_order.iter().chain(winners.iter()) {
            if remainder == 0 {
                break;
            }
            if winners.contains(&user) && !granted.contains(&user) {
                *totals.entry(user).or_default() += 1;
                granted.push(user);
                remainder -= 1;
            }
        }
    }
    let mut awards: Vec<PotAward> = totals
        .into_iter()
        .map(|(user_id, amount)| PotAward { user_id, amount })
        .collect();
    awards.sort_unstable_by(|a, b| b.amount.cmp(&a.amount).then(a.user_id.cmp(&b.user_id)));
    awards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::eval::{HandCategory, HandRank};

    fn contrib(user_id: UserId, amount: Chips, folded: bool) -> Contribution {
        Contribution {
            user_id,
            amount,
            folded,
        }
    }

    fn rank_of(category: HandCategory, kickers: &[u8]) -> HandRank {
        HandRank {
            category,
            kickers: kickers.to_vec(),
        }
    }

    #[test]
    fn single_level_single_pot() {
        let pots = build_pots(&[contrib(1, 50, false), contrib(2, 50, false)]);
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, 100);
        assert_eq!(pots[0].eligible, BTreeSet::from([1, 2]));
    }

    #[test]
    fn three_way_all_in_builds_layered_side_pots() {
        // Stacks 20/50/80, all in. Main 60 {all}, side 60 {2,3}, side 30 {3}.
        let pots = build_pots(&[
            contrib(1, 20, false),
            contrib(2, 50, false),
            contrib(3, 80, false),
        ]);
        assert_eq!(pots.len(), 3);
        assert_eq!(pots[0].amount, 60);
        assert_eq!(pots[0].eligible, BTreeSet::from([1, 2, 3]));
        assert_eq!(pots[1].amount, 60);
        assert_eq!(pots[1].eligible, BTreeSet::from([2, 3]));
        assert_eq!(pots[2].amount, 30);
        assert_eq!(pots[2].eligible, BTreeSet::from([3]));
    }

    #[test]
    fn folded_players_contribute_but_never_win() {
        let pots = build_pots(&[
            contrib(1, 50, true),
            contrib(2, 100, false),
            contrib(3, 100, false),
        ]);
        let total: Chips = pots.iter().map(|p| p.amount).sum();
        assert_eq!(total, 250);
        for pot in &pots {
            assert!(!pot.eligible.contains(&1));
        }
    }

    #[test]
    fn folded_top_layer_folds_into_pot_below() {
        // The deepest contributor folded; their extra chips join the last
        // contested pot instead of forming an uncontestable layer.
        let pots = build_pots(&[
            contrib(1, 30, false),
            contrib(2, 30, false),
            contrib(3, 60, true),
        ]);
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, 120);
        assert_eq!(pots[0].eligible, BTreeSet::from([1, 2]));
    }

    #[test]
    fn eligible_sets_shrink_monotonically() {
        let pots = build_pots(&[
            contrib(1, 10, false),
            contrib(2, 40, false),
            contrib(3, 90, false),
            contrib(4, 90, false),
        ]);
        for pair in pots.windows(2) {
            assert!(pair[1].eligible.is_subset(&pair[0].eligible));
            assert!(!pair[1].eligible.is_empty());
        }
    }

    #[test]
    fn settlement_respects_pot_order() {
        let pots = build_pots(&[
            contrib(1, 20, false),
            contrib(2, 50, false),
            contrib(3, 80, false),
        ]);
        // User 1 has the best hand but is only eligible for the main pot.
        let ranks = HashMap::from([
            (1, rank_of(HandCategory::Flush, &[14, 9, 7, 4, 2])),
            (2, rank_of(HandCategory::OnePair, &[10, 14, 8, 3])),
            (3, rank_of(HandCategory::TwoPair, &[9, 5, 13])),
        ]);
        let awards = settle(&pots, &ranks, &[1, 2, 3]);
        let by_user: HashMap<UserId, Chips> =
            awards.iter().map(|a| (a.user_id, a.amount)).collect();
        assert_eq!(by_user[&1], 60);
        assert_eq!(by_user[&3], 60 + 30);
        assert!(!by_user.contains_key(&2));
    }

    #[test]
    fn tie_splits_with_odd_chip_left_of_button_first() {
        let pots = build_pots(&[
            contrib(1, 33, false),
            contrib(2, 33, false),
            contrib(3, 35, true),
        ]);
        let rank = rank_of(HandCategory::Straight, &[9]);
        let ranks = HashMap::from([(1, rank.clone()), (2, rank)]);
        // Order left of the button: user 2 collects the odd chip.
        let awards = settle(&pots, &ranks, &[2, 1]);
        let by_user: HashMap<UserId, Chips> =
            awards.iter().map(|a| (a.user_id, a.amount)).collect();
        assert_eq!(by_user[&2], 51);
        assert_eq!(by_user[&1], 50);
    }

    #[test]
    fn fold_out_awards_whole_pot_without_ranks() {
        let pots = build_pots(&[
            contrib(1, 10, true),
            contrib(2, 10, true),
            contrib(3, 10, false),
        ]);
        let awards = settle(&pots, &HashMap::new(), &[3]);
        assert_eq!(awards, vec![PotAward { user_id: 3, amount: 30 }]);
    }

    #[test]
    fn settlement_conserves_chips() {
        let contributions = [
            contrib(1, 7, false),
            contrib(2, 19, false),
            contrib(3, 19, true),
            contrib(4, 52, false),
        ];
        let pots = build_pots(&contributions);
        let ranks = HashMap::from([
            (1, rank_of(HandCategory::OnePair, &[8, 14, 9, 4])),
            (2, rank_of(HandCategory::OnePair, &[8, 14, 9, 4])),
            (4, rank_of(HandCategory::HighCard, &[13, 11, 9, 6, 3])),
        ]);
        let awards = settle(&pots, &ranks, &[2, 3, 4, 1]);
        let total_in: Chips = contributions.iter().map(|c| c.amount).sum();
        let total_out: Chips = awards.iter().map(|a| a.amount).sum();
        assert_eq!(total_in, total_out);
    }
}
