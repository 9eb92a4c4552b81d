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

//! Fare engine.
//!
//! The [`FareEngine`] is the only component with business rules. It owns the
//! card directory, attendance ledger and payment ledger, and reads the route
//! catalog.
//!
//! # Session lifecycle per (trip, rider)
//!
//! ```text
//!  NoSession ──tap_in──► Open ──tap_out──► Closed (Pending) ──vet──► Approved | Rejected
//! ```
//!
//! # Tap-in is a three-step saga
//!
//! 1. debit the card (atomic check-and-subtract)
//! 2. open an attendance session
//! 3. record a completed `TapIn` charge
//!
//! There is no transaction across the three stores. Each step boundary is
//! logged so a debit without matching attendance or ledger entries can be
//! traced and reconciled out of band.
//!
//! # Refunds
//!
//! A refund on tap-out flips the ledger entry only. The card balance is not
//! credited back; card balances and the payment ledger are settled separately.

use crate::attendance::{AttendanceLedger, AttendanceRecord};
use crate::base::{AttendanceId, CardNumber, RiderId, TripId};
use crate::card::CardDirectory;
use crate::config::EngineConfig;
use crate::error::FareError;
use crate::payment::{EntryKind, PaymentLedger};
use crate::route::{FareSuggestion, InMemoryCatalog, RouteCatalog, suggest_fares};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

/// Message returned by every tap-out that closed a session.
pub const TAP_OUT_RECORDED: &str = "Tap-out recorded, pending vetting.";

/// Outcome of a tap-out as shown to the rider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TapOutResponse {
    pub success: bool,
    pub message: String,
    /// Closed session, when `success` is true.
    pub attendance_id: Option<AttendanceId>,
}

impl TapOutResponse {
    fn closed(record: &AttendanceRecord) -> Self {
        Self {
            success: true,
            message: TAP_OUT_RECORDED.to_owned(),
            attendance_id: Some(record.id),
        }
    }

    fn failed(error: &FareError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            attendance_id: None,
        }
    }
}

/// Fare-card engine.
///
/// # Invariants
///
/// - A card balance never goes negative.
/// - A successful tap-in debits exactly the fare, opens exactly one session
///   and appends exactly one completed `TapIn` charge.
/// - A ledger entry is refunded at most once.
/// - Vetting only applies to closed sessions.
#[derive(Debug)]
pub struct FareEngine<C = InMemoryCatalog> {
    cards: CardDirectory,
    attendance: AttendanceLedger,
    payments: PaymentLedger,
    catalog: C,
}

impl<C: RouteCatalog> FareEngine<C> {
    /// Assembles an engine from already constructed stores.
    pub fn new(
        cards: CardDirectory,
        attendance: AttendanceLedger,
        payments: PaymentLedger,
        catalog: C,
    ) -> Self {
        FareEngine {
            cards,
            attendance,
            payments,
            catalog,
        }
    }

    /// Creates an engine with empty stores configured by `config`.
    pub fn with_config(config: EngineConfig, catalog: C) -> Self {
        Self::new(
            CardDirectory::new(),
            AttendanceLedger::with_selection(config.session_selection),
            PaymentLedger::new(),
            catalog,
        )
    }

    /// Charges `fare` and opens a session for `rider_id` on `trip_id`.
    ///
    /// Returns `Ok(false)` without changing anything when the card is
    /// unknown, blocked, or cannot cover the fare.
    ///
    /// Not idempotent: every successful call spends the fare again.
    ///
    /// # Errors
    ///
    /// - [`FareError::InvalidAmount`] - Fare is zero or negative.
    pub fn tap_in(
        &self,
        card: &CardNumber,
        fare: Decimal,
        trip_id: TripId,
        rider_id: RiderId,
        stop: &str,
    ) -> Result<bool, FareError> {
        let span = info_span!("tap_in", %card, %trip_id, %rider_id, %fare);
        let _enter = span.enter();

        if fare <= Decimal::ZERO {
            return Err(FareError::InvalidAmount);
        }

        let remaining = match self.cards.try_debit(card, fare) {
            Ok(remaining) => remaining,
            Err(reason) => {
                debug!(%reason, "tap-in declined");
                return Ok(false);
            }
        };
        debug!(%remaining, "debit applied");

        let record = self.attendance.open_session(trip_id, rider_id, stop, Utc::now());
        debug!(attendance_id = %record.id, %stop, "session opened");

        let entry = self
            .payments
            .record_charge(rider_id, Some(trip_id), fare, EntryKind::TapIn);
        info!(attendance_id = %record.id, entry_id = %entry.id, "tap-in recorded");

        Ok(true)
    }

    /// Closes the rider's session on `trip_id`, optionally refunding the
    /// most recent tap-in charge.
    ///
    /// The message is [`TAP_OUT_RECORDED`] whenever the session closed,
    /// whether or not a refund was found.
    pub fn tap_out(
        &self,
        trip_id: TripId,
        rider_id: RiderId,
        stop: &str,
        refund: bool,
    ) -> TapOutResponse {
        let span = info_span!("tap_out", %trip_id, %rider_id, refund);
        let _enter = span.enter();

        let record = match self
            .attendance
            .close_session(trip_id, rider_id, stop, Utc::now())
        {
            Ok(record) => record,
            Err(error) => {
                debug!(%error, "tap-out rejected");
                return TapOutResponse::failed(&error);
            }
        };
        info!(attendance_id = %record.id, %stop, "session closed, pending vetting");

        if refund {
            let refunded =
                self.payments
                    .refund_most_recent_charge(rider_id, Some(trip_id), EntryKind::TapIn);
            if refunded {
                info!(attendance_id = %record.id, "tap-in charge refunded");
            } else {
                warn!(attendance_id = %record.id, "refund requested but no completed charge found");
            }
        }

        TapOutResponse::closed(&record)
    }

    /// Records an administrator's decision on a closed session.
    ///
    /// # Errors
    ///
    /// - [`FareError::AttendanceNotFound`] - No record with this id.
    /// - [`FareError::SessionStillOpen`] - The session was never tapped out.
    pub fn vet_tap_out(
        &self,
        attendance_id: AttendanceId,
        approve: bool,
        reason: Option<String>,
    ) -> Result<(), FareError> {
        self.attendance.vet(attendance_id, approve, reason)?;
        info!(%attendance_id, approve, "tap-out vetted");
        Ok(())
    }

    /// # Errors
    ///
    /// - [`FareError::CardNotFound`] - No such card.
    /// - [`FareError::CardInactive`] - Card is blocked.
    /// - [`FareError::InvalidAmount`] - Amount is zero or negative, or the
    ///   new balance would overflow.
    pub fn top_up(&self, card: &CardNumber, amount: Decimal) -> Result<(), FareError> {
        self.cards.top_up(card, amount)?;
        info!(%card, %amount, "card topped up");
        Ok(())
    }

    /// Current balance, or `None` if the card does not exist.
    pub fn get_balance(&self, card: &CardNumber) -> Option<Decimal> {
        self.cards.find_by_number(card).map(|card| card.balance())
    }

    /// Every catalog trip serving `boarding` → `drop_off`, with its fare.
    pub fn suggest_fares(&self, boarding: &str, drop_off: &str) -> Vec<FareSuggestion> {
        suggest_fares(&self.catalog, boarding, drop_off)
    }

    /// Issues a new active card.
    ///
    /// # Errors
    ///
    /// See [`CardDirectory::issue`].
    pub fn issue_card(
        &self,
        card: CardNumber,
        rider_id: Option<RiderId>,
        opening_balance: Decimal,
    ) -> Result<(), FareError> {
        let number = card.to_string();
        self.cards.issue(card, rider_id, opening_balance)?;
        info!(card = %number, %opening_balance, "card issued");
        Ok(())
    }

    /// Blocks a card; blocked cards decline taps and top-ups.
    pub fn block_card(&self, card: &CardNumber) -> Result<(), FareError> {
        self.cards.block(card)?;
        info!(%card, "card blocked");
        Ok(())
    }

    /// `true` if the card exists and is active.
    pub fn validate_card(&self, card: &CardNumber) -> bool {
        self.cards.is_valid(card)
    }

    pub fn cards(&self) -> &CardDirectory {
        &self.cards
    }

    pub fn attendance(&self) -> &AttendanceLedger {
        &self.attendance
    }

    pub fn payments(&self) -> &PaymentLedger {
        &self.payments
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }
}

impl FareEngine<InMemoryCatalog> {
    /// Creates an engine with default settings and an empty catalog.
    pub fn in_memory() -> Self {
        Self::with_config(EngineConfig::default(), InMemoryCatalog::new())
    }
}

impl Default for FareEngine<InMemoryCatalog> {
    fn default() -> Self {
        Self::in_memory()
    }
}
