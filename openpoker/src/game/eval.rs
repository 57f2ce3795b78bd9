//! Hand strength evaluation.
//!
//! `rank` is the pure collaborator seam the runtime calls once per showdown:
//! given hole cards and the board it returns a totally ordered
//! `(category, kickers)` value. The bundled evaluator picks the best five of
//! up to seven cards.

use serde::{Deserialize, Serialize};

use super::entities::{Card, Value};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandCategory {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
}

/// Ranked hand value. Ordering compares category first, then the kicker
/// values in decision order, so `>` means "beats".
#[derive(Clone, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct HandRank {
    pub category: HandCategory,
    pub kickers: Vec<Value>,
}

/// Rank the best five-card hand among `hole ∪ board`.
#[must_use]
pub fn rank(hole: &[Card], board: &[Card]) -> HandRank {
    let mut cards: Vec<Card> = Vec::with_capacity(hole.len() + board.len());
    cards.extend_from_slice(hole);
    cards.extend_from_slice(board);
    debug_assert!(cards.len() >= 5);

    let mut best: Option<HandRank> = None;
    let n = cards.len();
    for a in 0..n - 4 {
        for b in a + 1..n - 3 {
            for c in b + 1..n - 2 {
                for d in c + 1..n - 1 {
                    for e in d + 1..n {
                        let hand = [cards[a], cards[b], cards[c], cards[d], cards[e]];
                        let ranked = rank_five(&hand);
                        if best.as_ref().is_none_or(|cur| ranked > *cur) {
                            best = Some(ranked);
                        }
                    }
                }
            }
        }
    }
    best.expect("at least one five-card combination")
}

fn rank_five(cards: &[Card; 5]) -> HandRank {
    let mut values: Vec<Value> = cards.iter().map(|c| c.0).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));

    let is_flush = cards.iter().all(|c| c.1 == cards[0].1);
    let straight_high = straight_high(&values);

    // Group values by multiplicity: (count, value), biggest groups first.
    let mut groups: Vec<(usize, Value)> = Vec::with_capacity(5);
    for &v in &values {
        match groups.iter_mut().find(|(_, gv)| *gv == v) {
            Some((count, _)) => *count += 1,
            None => groups.push((1, v)),
        }
    }
    groups.sort_unstable_by(|a, b| b.cmp(a));

    match (is_flush, straight_high) {
        (true, Some(high)) => HandRank {
            category: HandCategory::StraightFlush,
            kickers: vec![high],
        },
        (true, None) if groups.len() == 5 => HandRank {
            category: HandCategory::Flush,
            kickers: values,
        },
        (false, Some(high)) if groups.len() == 5 => HandRank {
            category: HandCategory::Straight,
            kickers: vec![high],
        },
        _ => match groups.as_slice() {
            [(4, quad), (1, kicker)] => HandRank {
                category: HandCategory::FourOfAKind,
                kickers: vec![*quad, *kicker],
            },
            [(3, trips), (2, pair)] => HandRank {
                category: HandCategory::FullHouse,
                kickers: vec![*trips, *pair],
            },
            [(3, trips), (1, k1), (1, k2)] => HandRank {
                category: HandCategory::ThreeOfAKind,
                kickers: vec![*trips, *k1, *k2],
            },
            [(2, hi), (2, lo), (1, kicker)] => HandRank {
                category: HandCategory::TwoPair,
                kickers: vec![*hi, *lo, *kicker],
            },
            [(2, pair), (1, k1), (1, k2), (1, k3)] => HandRank {
                category: HandCategory::OnePair,
                kickers: vec![*pair, *k1, *k2, *k3],
            },
            _ => HandRank {
                category: HandCategory::HighCard,
                kickers: values,
            },
        },
    }
}

/// High card of a straight among five distinct descending values, if any.
/// The wheel (A-5-4-3-2) counts with a high card of 5.
fn straight_high(sorted_desc: &[Value]) -> Option<Value> {
    let mut distinct = sorted_desc.to_vec();
    distinct.dedup();
    if distinct.len() != 5 {
        return None;
    }
    if distinct[0] - distinct[4] == 4 {
        return Some(distinct[0]);
    }
    if distinct == [14, 5, 4, 3, 2] {
        return Some(5);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::Suit::{Club, Diamond, Heart, Spade};

    fn cards(spec: &[(Value, super::super::entities::Suit)]) -> Vec<Card> {
        spec.iter().map(|&(v, s)| Card(v, s)).collect()
    }

    #[test]
    fn straight_flush_beats_quads() {
        let board = cards(&[(9, Heart), (8, Heart), (7, Heart), (9, Club), (9, Spade)]);
        let sf = rank(&cards(&[(6, Heart), (5, Heart)]), &board);
        let quads = rank(&cards(&[(9, Diamond), (2, Club)]), &board);
        assert_eq!(sf.category, HandCategory::StraightFlush);
        assert_eq!(quads.category, HandCategory::FourOfAKind);
        assert!(sf > quads);
    }

    #[test]
    fn wheel_straight_is_five_high() {
        let r = rank(
            &cards(&[(14, Club), (2, Heart)]),
            &cards(&[(3, Spade), (4, Diamond), (5, Club), (13, Heart), (9, Spade)]),
        );
        assert_eq!(r.category, HandCategory::Straight);
        assert_eq!(r.kickers, vec![5]);
    }

    #[test]
    fn ace_high_straight_beats_wheel() {
        let board = cards(&[(3, Spade), (4, Diamond), (5, Club), (13, Heart), (12, Spade)]);
        let wheel = rank(&cards(&[(14, Club), (2, Heart)]), &board);
        let broadway = rank(&cards(&[(14, Heart), (11, Club)]), &board);
        assert!(broadway > wheel);
    }

    #[test]
    fn kickers_break_pair_ties() {
        let board = cards(&[(9, Spade), (9, Diamond), (5, Club), (7, Heart), (2, Spade)]);
        let ace_kicker = rank(&cards(&[(14, Club), (3, Heart)]), &board);
        let king_kicker = rank(&cards(&[(13, Club), (3, Diamond)]), &board);
        assert_eq!(ace_kicker.category, HandCategory::OnePair);
        assert!(ace_kicker > king_kicker);
    }

    #[test]
    fn identical_hands_tie() {
        let board = cards(&[(14, Spade), (14, Diamond), (9, Club), (9, Heart), (4, Spade)]);
        let a = rank(&cards(&[(2, Club), (3, Heart)]), &board);
        let b = rank(&cards(&[(2, Diamond), (3, Spade)]), &board);
        assert_eq!(a, b);
    }

    #[test]
    fn full_house_over_flush() {
        let fh = rank(
            &cards(&[(8, Club), (8, Diamond)]),
            &cards(&[(8, Spade), (4, Heart), (4, Club), (10, Heart), (2, Heart)]),
        );
        let flush = rank(
            &cards(&[(14, Heart), (3, Heart)]),
            &cards(&[(8, Spade), (4, Heart), (4, Club), (10, Heart), (2, Heart)]),
        );
        assert_eq!(fh.category, HandCategory::FullHouse);
        assert_eq!(flush.category, HandCategory::Flush);
        assert!(fh > flush);
    }

    #[test]
    fn picks_best_five_of_seven() {
        // Board two pair plus a bigger pocket pair must use the pocket pair.
        let r = rank(
            &cards(&[(13, Club), (13, Diamond)]),
            &cards(&[(10, Spade), (10, Heart), (6, Club), (6, Heart), (2, Spade)]),
        );
        assert_eq!(r.category, HandCategory::TwoPair);
        assert_eq!(r.kickers, vec![13, 10, 6]);
    }

    #[test]
    fn two_card_rank_ordering_matches_categories() {
        let order = [
            HandCategory::HighCard,
            HandCategory::OnePair,
            HandCategory::TwoPair,
            HandCategory::ThreeOfAKind,
            HandCategory::Straight,
            HandCategory::Flush,
            HandCategory::FullHouse,
            HandCategory::FourOfAKind,
            HandCategory::StraightFlush,
        ];
        for pair in order.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
