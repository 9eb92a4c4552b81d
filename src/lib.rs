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

//! # Fare Card Engine
//!
//! RFID fare-card processing for student transport: riders tap in to board
//! (paying the fare from their card), tap out to close the session, may ask
//! for the fare to be refunded, and administrators vet each tap-out.
//!
//! ## Core Components
//!
//! - [`CardDirectory`]: issued cards and their balances
//! - [`AttendanceLedger`]: one record per tap session of a rider on a trip
//! - [`PaymentLedger`]: fare charges and their refund state
//! - [`RouteCatalog`]: read-only trip stops with cumulative prices
//! - [`FareEngine`]: tap-in, tap-out, vetting, top-up and fare suggestion
//!
//! ## Example
//!
//! ```
//! use fare_card_engine::{CardNumber, FareEngine, RiderId, TripId, TAP_OUT_RECORDED};
//! use rust_decimal_macros::dec;
//! use uuid::Uuid;
//!
//! let engine = FareEngine::in_memory();
//! let card = CardNumber::from("RFID-1");
//! let trip = TripId(Uuid::from_u128(1));
//! let rider = RiderId(Uuid::from_u128(2));
//!
//! engine.issue_card(card.clone(), Some(rider), dec!(10.00)).unwrap();
//!
//! assert!(engine.tap_in(&card, dec!(7.50), trip, rider, "Gate A").unwrap());
//! assert_eq!(engine.get_balance(&card), Some(dec!(2.50)));
//!
//! // Not enough left for a second ride.
//! assert!(!engine.tap_in(&card, dec!(5.00), trip, rider, "Gate A").unwrap());
//!
//! let response = engine.tap_out(trip, rider, "Gate B", false);
//! assert!(response.success);
//! assert_eq!(response.message, TAP_OUT_RECORDED);
//! ```
//!
//! ## Thread Safety
//!
//! All stores are safe to share across threads. Taps on different cards run
//! in parallel; taps on the same card are serialized by that card's lock.

pub mod attendance;
mod base;
pub mod card;
mod config;
mod engine;
pub mod error;
pub mod payment;
pub mod route;

pub use attendance::{AttendanceLedger, AttendanceRecord, VettingStatus};
pub use base::{AttendanceId, CardNumber, EntryId, RiderId, SessionKey, TripId};
pub use card::{Card, CardDirectory, CardStatus, Decline};
pub use config::{EngineConfig, SessionSelection};
pub use engine::{FareEngine, TAP_OUT_RECORDED, TapOutResponse};
pub use error::{ErrorKind, FareError};
pub use payment::{EntryKind, EntryStatus, LedgerEntry, PaymentLedger};
pub use route::{
    CatalogError, FareSuggestion, InMemoryCatalog, RouteCatalog, RouteStop, TripRoute,
    suggest_fares,
};
