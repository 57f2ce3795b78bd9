//! Seeded 52-card deck.
//!
//! The shuffle is a deterministic Fisher–Yates over a seeded PRNG so a table
//! can replay exactly in tests while production tables draw their seed from
//! OS entropy. Unseen cards are never exposed.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::entities::{Card, Suit};

#[derive(Clone, Debug)]
pub struct Deck {
    cards: [Card; 52],
    next: usize,
}

impl Deck {
    /// Build a deck shuffled from `seed`.
    #[must_use]
    pub fn shuffled(seed: u64) -> Self {
        let mut cards: [Card; 52] = [Card(2, Suit::Club); 52];
        for (i, value) in (2u8..=14u8).enumerate() {
            for (j, suit) in [Suit::Club, Suit::Spade, Suit::Diamond, Suit::Heart]
                .into_iter()
                .enumerate()
            {
                cards[4 * i + j] = Card(value, suit);
            }
        }
        let mut rng = StdRng::seed_from_u64(seed);
        cards.shuffle(&mut rng);
        Self { cards, next: 0 }
    }

    /// Build a deck shuffled from OS entropy.
    #[must_use]
    pub fn shuffled_from_entropy() -> Self {
        Self::shuffled(rand::random())
    }

    fn deal(&mut self, n: usize) -> Vec<Card> {
        let end = (self.next + n).min(52);
        let cards = self.cards[self.next..end].to_vec();
        self.next = end;
        cards
    }

    /// Deal `n` hole cards.
    pub fn deal_hole(&mut self, n: usize) -> Vec<Card> {
        self.deal(n)
    }

    /// Deal `n` community cards.
    pub fn deal_board(&mut self, n: usize) -> Vec<Card> {
        self.deal(n)
    }

    /// Discard `n` cards face down.
    pub fn burn(&mut self, n: usize) {
        self.next = (self.next + n).min(52);
    }

    /// Cards dealt or burned so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.next
    }
}
