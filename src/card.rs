// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Card directory.
//!
//! Owns every issued fare card and is the only place card balances change.
//!
//! ```text
//!  issue ──► Active ──block──► Blocked
//!             │  ▲
//!     debit ──┘  └── top_up
//! ```
//!
//! Blocked cards are kept forever; they decline taps and refuse top-ups.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use fare_card_engine::{CardDirectory, CardNumber};
//!
//! let cards = CardDirectory::new();
//! let number = CardNumber::from("RFID-1");
//! cards.issue(number.clone(), None, dec!(10.00)).unwrap();
//!
//! assert!(cards.debit(&number, dec!(7.50)));
//! assert!(!cards.debit(&number, dec!(5.00)));
//! assert_eq!(cards.find_by_number(&number).unwrap().balance(), dec!(2.50));
//! ```

use crate::base::{CardNumber, MONEY_PRECISION, RiderId};
use crate::error::FareError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::Ref;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use std::fmt;

/// Card lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
pub enum CardStatus {
    Active,
    Blocked,
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("Active"),
            Self::Blocked => f.write_str("Blocked"),
        }
    }
}

/// Why a debit was not applied.
///
/// These are expected outcomes of a tap, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decline {
    UnknownCard,
    Inactive,
    InsufficientFunds,
    InvalidAmount,
}

impl fmt::Display for Decline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCard => f.write_str("unknown card"),
            Self::Inactive => f.write_str("card inactive"),
            Self::InsufficientFunds => f.write_str("insufficient funds"),
            Self::InvalidAmount => f.write_str("invalid amount"),
        }
    }
}

#[derive(Debug)]
struct CardData {
    number: CardNumber,
    rider_id: Option<RiderId>,
    balance: Decimal,
    status: CardStatus,
    created_at: DateTime<Utc>,
}

impl CardData {
    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: card balance went negative: {}",
            self.balance
        );
    }

    /// Increases the balance of an active card.
    fn top_up(&mut self, amount: Decimal) -> Result<(), FareError> {
        if self.status != CardStatus::Active {
            return Err(FareError::CardInactive);
        }
        if amount <= Decimal::ZERO {
            return Err(FareError::InvalidAmount);
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(FareError::InvalidAmount)?;
        self.assert_invariants();
        Ok(())
    }

    /// Check-and-subtract. Leaves the card untouched unless it is active and
    /// holds at least `amount`.
    fn debit(&mut self, amount: Decimal) -> Result<Decimal, Decline> {
        if amount <= Decimal::ZERO {
            return Err(Decline::InvalidAmount);
        }
        if self.status != CardStatus::Active {
            return Err(Decline::Inactive);
        }
        if self.balance < amount {
            return Err(Decline::InsufficientFunds);
        }
        self.balance -= amount;
        self.assert_invariants();
        Ok(self.balance)
    }
}

/// An issued fare card.
#[derive(Debug)]
pub struct Card {
    inner: Mutex<CardData>,
}

impl Card {
    fn new(number: CardNumber, rider_id: Option<RiderId>, balance: Decimal) -> Self {
        Self {
            inner: Mutex::new(CardData {
                number,
                rider_id,
                balance,
                status: CardStatus::Active,
                created_at: Utc::now(),
            }),
        }
    }

    pub fn number(&self) -> CardNumber {
        self.inner.lock().number.clone()
    }

    pub fn rider_id(&self) -> Option<RiderId> {
        self.inner.lock().rider_id
    }

    pub fn balance(&self) -> Decimal {
        self.inner.lock().balance
    }

    pub fn status(&self) -> CardStatus {
        self.inner.lock().status
    }

    pub fn is_active(&self) -> bool {
        self.status() == CardStatus::Active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.lock().created_at
    }
}

impl Serialize for Card {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Card", 5)?;
        state.serialize_field("card", &data.number)?;
        state.serialize_field("rider", &data.rider_id)?;
        state.serialize_field("balance", &data.balance.round_dp(MONEY_PRECISION))?;
        state.serialize_field("status", &data.status)?;
        state.serialize_field("created_at", &data.created_at)?;
        state.end()
    }
}

/// Concurrent store of fare cards keyed by card number.
///
/// Every balance change happens while holding the card's own lock, so two
/// taps racing on one card can never both spend the same funds.
#[derive(Debug, Default)]
pub struct CardDirectory {
    cards: DashMap<CardNumber, Card>,
}

impl CardDirectory {
    pub fn new() -> Self {
        Self {
            cards: DashMap::new(),
        }
    }

    /// Issues a new active card, optionally assigned to a rider and seeded
    /// with an opening balance.
    ///
    /// # Errors
    ///
    /// - [`FareError::InvalidCardNumber`] - Card number is blank.
    /// - [`FareError::InvalidAmount`] - Opening balance is negative.
    /// - [`FareError::DuplicateCard`] - Number already issued.
    pub fn issue(
        &self,
        number: CardNumber,
        rider_id: Option<RiderId>,
        opening_balance: Decimal,
    ) -> Result<(), FareError> {
        if number.is_empty() {
            return Err(FareError::InvalidCardNumber);
        }
        if opening_balance < Decimal::ZERO {
            return Err(FareError::InvalidAmount);
        }
        match self.cards.entry(number) {
            Entry::Occupied(_) => Err(FareError::DuplicateCard),
            Entry::Vacant(entry) => {
                let number = entry.key().clone();
                entry.insert(Card::new(number, rider_id, opening_balance));
                Ok(())
            }
        }
    }

    /// Exact-match lookup. Returns `None` if no card has this number.
    pub fn find_by_number(&self, number: &CardNumber) -> Option<Ref<'_, CardNumber, Card>> {
        self.cards.get(number)
    }

    /// Credits an active card.
    ///
    /// # Errors
    ///
    /// - [`FareError::CardNotFound`] - No such card. Its [`kind`] is
    ///   [`ErrorKind::NotFound`], not `InvalidState`, matching every other
    ///   lookup of a missing card.
    /// - [`FareError::CardInactive`] - Card is blocked.
    /// - [`FareError::InvalidAmount`] - Amount is zero or negative, or the
    ///   new balance would not fit in a `Decimal`.
    ///
    /// [`kind`]: FareError::kind
    /// [`ErrorKind::NotFound`]: crate::error::ErrorKind::NotFound
    pub fn top_up(&self, number: &CardNumber, amount: Decimal) -> Result<(), FareError> {
        let card = self.cards.get(number).ok_or(FareError::CardNotFound)?;
        card.inner.lock().top_up(amount)
    }

    /// Debits `amount` if the card is active and can cover it.
    ///
    /// Returns `false` without touching the card otherwise.
    pub fn debit(&self, number: &CardNumber, amount: Decimal) -> bool {
        self.try_debit(number, amount).is_ok()
    }

    /// Like [`debit`](Self::debit) but reports the remaining balance or the
    /// reason the debit was declined.
    pub fn try_debit(&self, number: &CardNumber, amount: Decimal) -> Result<Decimal, Decline> {
        let card = self.cards.get(number).ok_or(Decline::UnknownCard)?;
        card.inner.lock().debit(amount)
    }

    /// Blocks a card. Blocking an already blocked card is a no-op.
    pub fn block(&self, number: &CardNumber) -> Result<(), FareError> {
        let card = self.cards.get(number).ok_or(FareError::CardNotFound)?;
        card.inner.lock().status = CardStatus::Blocked;
        Ok(())
    }

    /// Returns `true` if the card exists and is active.
    pub fn is_valid(&self, number: &CardNumber) -> bool {
        self.cards
            .get(number)
            .map(|card| card.is_active())
            .unwrap_or(false)
    }

    /// Card numbers assigned to `rider_id`, sorted.
    pub fn cards_for_rider(&self, rider_id: RiderId) -> Vec<CardNumber> {
        let mut numbers: Vec<CardNumber> = self
            .cards
            .iter()
            .filter(|card| card.rider_id() == Some(rider_id))
            .map(|card| card.key().clone())
            .collect();
        numbers.sort();
        numbers
    }

    /// Iterates over every issued card, in no particular order.
    pub fn cards(
        &self,
    ) -> impl Iterator<Item = dashmap::mapref::multiple::RefMulti<'_, CardNumber, Card>> {
        self.cards.iter()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
