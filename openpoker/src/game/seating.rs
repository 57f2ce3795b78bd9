//! Fixed-size seat ring and turn-order helpers.
//!
//! Seats are numbered 1..=N and never shift; empty seats are retained so
//! position arithmetic stays stable across joins and leaves. All clockwise
//! scans advance modulo N in increasing seat order starting at `from + 1`.

use thiserror::Error;

use super::entities::{Player, SeatNumber, UserId};

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum SeatError {
    #[error("Invalid seat")]
    InvalidSeat,
    #[error("Seat is taken")]
    SeatTaken,
    #[error("Table is full")]
    TableFull,
    #[error("Already seated")]
    AlreadySeated,
}

#[derive(Clone, Debug)]
pub struct SeatRing {
    seats: Vec<Option<Player>>,
}

impl SeatRing {
    #[must_use]
    pub fn new(max_players: usize) -> Self {
        Self {
            seats: vec![None; max_players],
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.seats.len()
    }

    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.seats.iter().filter(|s| s.is_some()).count()
    }

    /// Seat a player. The player's own `seat` field must match `seat`.
    pub fn seat(&mut self, player: Player, seat: SeatNumber) -> Result<(), SeatError> {
        if seat == 0 || seat > self.seats.len() {
            return Err(SeatError::InvalidSeat);
        }
        if self.player_by_user(player.user_id).is_some() {
            return Err(SeatError::AlreadySeated);
        }
        if self.occupied_count() >= self.seats.len() {
            return Err(SeatError::TableFull);
        }
        let slot = &mut self.seats[seat - 1];
        if slot.is_some() {
            return Err(SeatError::SeatTaken);
        }
        *slot = Some(player);
        Ok(())
    }

    pub fn vacate(&mut self, seat: SeatNumber) -> Option<Player> {
        if seat == 0 || seat > self.seats.len() {
            return None;
        }
        self.seats[seat - 1].take()
    }

    #[must_use]
    pub fn get(&self, seat: SeatNumber) -> Option<&Player> {
        self.seats.get(seat.checked_sub(1)?)?.as_ref()
    }

    pub fn get_mut(&mut self, seat: SeatNumber) -> Option<&mut Player> {
        self.seats.get_mut(seat.checked_sub(1)?)?.as_mut()
    }

    #[must_use]
    pub fn player_by_user(&self, user_id: UserId) -> Option<&Player> {
        self.occupants().find(|p| p.user_id == user_id)
    }

    pub fn player_by_user_mut(&mut self, user_id: UserId) -> Option<&mut Player> {
        self.seats
            .iter_mut()
            .filter_map(|s| s.as_mut())
            .find(|p| p.user_id == user_id)
    }

    /// Seated players in seat order.
    pub fn occupants(&self) -> impl Iterator<Item = &Player> {
        self.seats.iter().filter_map(|s| s.as_ref())
    }

    pub fn occupants_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.seats.iter_mut().filter_map(|s| s.as_mut())
    }

    /// Lowest-numbered empty seat, if any.
    #[must_use]
    pub fn first_open_seat(&self) -> Option<SeatNumber> {
        self.seats.iter().position(|s| s.is_none()).map(|i| i + 1)
    }

    /// Next seat strictly clockwise of `from` whose occupant matches
    /// `filter`. Wraps around the ring; `from` itself is considered last.
    pub fn next_matching<F>(&self, from: SeatNumber, filter: F) -> Option<SeatNumber>
    where
        F: Fn(&Player) -> bool,
    {
        let n = self.seats.len();
        if n == 0 {
            return None;
        }
        for step in 1..=n {
            let seat = (from - 1 + step) % n + 1;
            if let Some(player) = self.get(seat)
                && filter(player)
            {
                return Some(seat);
            }
        }
        None
    }

    /// Seats whose occupants match `filter`, in clockwise order starting
    /// strictly after `from`.
    pub fn seats_clockwise_of<F>(&self, from: SeatNumber, filter: F) -> Vec<SeatNumber>
    where
        F: Fn(&Player) -> bool,
    {
        let n = self.seats.len();
        let mut out = Vec::new();
        for step in 1..=n {
            let seat = (from - 1 + step) % n + 1;
            if let Some(player) = self.get(seat)
                && filter(player)
            {
                out.push(seat);
            }
        }
        out
    }

    /// Assign small and big blind seats relative to `button` among seats
    /// matching `filter`. Heads-up, the button posts the small blind.
    pub fn assign_positions<F>(&self, button: SeatNumber, filter: F) -> Option<(SeatNumber, SeatNumber)>
    where
        F: Fn(&Player) -> bool + Copy,
    {
        let in_hand = self.seats_clockwise_of(button, filter);
        let button_in = self.get(button).is_some_and(|p| filter(p));
        let total = in_hand.len() + usize::from(button_in);
        if total < 2 {
            return None;
        }
        if total == 2 {
            // Heads-up: the dealer button is the small blind.
            let sb = if button_in { button } else { *in_hand.first()? };
            let bb = self.next_matching(sb, filter)?;
            return Some((sb, bb));
        }
        let sb = *in_hand.first()?;
        let bb = self.next_matching(sb, filter)?;
        Some((sb, bb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::PlayerStatus;

    fn ring_with(seats: &[(SeatNumber, UserId, u32)]) -> SeatRing {
        let mut ring = SeatRing::new(6);
        for &(seat, user, chips) in seats {
            let mut p = Player::new(user, seat, chips);
            p.status = PlayerStatus::Active;
            ring.seat(p, seat).unwrap();
        }
        ring
    }

    #[test]
    fn seat_and_vacate_round_trip() {
        let mut ring = ring_with(&[(2, 10, 100)]);
        assert_eq!(ring.occupied_count(), 1);
        let p = ring.vacate(2).unwrap();
        assert_eq!(p.user_id, 10);
        assert_eq!(ring.occupied_count(), 0);
        assert!(ring.vacate(2).is_none());
    }

    #[test]
    fn duplicate_seat_and_user_rejected() {
        let mut ring = ring_with(&[(1, 10, 100)]);
        let err = ring.seat(Player::new(11, 1, 100), 1).unwrap_err();
        assert_eq!(err, SeatError::SeatTaken);
        let err = ring.seat(Player::new(10, 2, 100), 2).unwrap_err();
        assert_eq!(err, SeatError::AlreadySeated);
    }

    #[test]
    fn full_ring_refuses_joins() {
        let mut ring = SeatRing::new(2);
        ring.seat(Player::new(1, 1, 50), 1).unwrap();
        ring.seat(Player::new(2, 2, 50), 2).unwrap();
        assert_eq!(
            ring.seat(Player::new(3, 2, 50), 2).unwrap_err(),
            SeatError::TableFull
        );
    }

    #[test]
    fn invalid_seat_numbers_rejected() {
        let mut ring = SeatRing::new(4);
        assert_eq!(
            ring.seat(Player::new(1, 0, 10), 0).unwrap_err(),
            SeatError::InvalidSeat
        );
        assert_eq!(
            ring.seat(Player::new(1, 5, 10), 5).unwrap_err(),
            SeatError::InvalidSeat
        );
    }

    #[test]
    fn next_matching_wraps_and_skips() {
        let ring = ring_with(&[(1, 10, 100), (3, 30, 0), (5, 50, 100)]);
        // Seat 3 has no chips; scanning for chips skips it.
        assert_eq!(ring.next_matching(1, |p| p.chips > 0), Some(5));
        assert_eq!(ring.next_matching(5, |p| p.chips > 0), Some(1));
        // From a seat, the seat itself is reachable only after a full wrap.
        let lone = ring_with(&[(4, 40, 100)]);
        assert_eq!(lone.next_matching(4, |p| p.chips > 0), Some(4));
    }

    #[test]
    fn positions_three_handed() {
        let ring = ring_with(&[(1, 10, 100), (2, 20, 100), (3, 30, 100)]);
        let (sb, bb) = ring.assign_positions(1, |p| p.chips > 0).unwrap();
        assert_eq!((sb, bb), (2, 3));
    }

    #[test]
    fn positions_heads_up_button_is_small_blind() {
        let ring = ring_with(&[(2, 20, 100), (5, 50, 100)]);
        let (sb, bb) = ring.assign_positions(2, |p| p.chips > 0).unwrap();
        assert_eq!((sb, bb), (2, 5));
        let (sb, bb) = ring.assign_positions(5, |p| p.chips > 0).unwrap();
        assert_eq!((sb, bb), (5, 2));
    }

    #[test]
    fn positions_need_two_players() {
        let ring = ring_with(&[(2, 20, 100)]);
        assert!(ring.assign_positions(2, |p| p.chips > 0).is_none());
    }

    #[test]
    fn clockwise_listing_starts_after_from() {
        let ring = ring_with(&[(1, 10, 100), (2, 20, 100), (4, 40, 100), (6, 60, 100)]);
        assert_eq!(ring.seats_clockwise_of(2, |_| true), vec![4, 6, 1, 2]);
    }
}
