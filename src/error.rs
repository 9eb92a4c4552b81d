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

//! Error types for fare-card operations.
//!
//! A declined tap (insufficient balance, inactive or unknown card) is not an
//! error: [`FareEngine::tap_in`](crate::FareEngine::tap_in) reports it as
//! `Ok(false)`. Everything here is a request the engine refused to apply.

use thiserror::Error;

/// Broad classification of a [`FareError`], used when rendering responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Referenced entity is absent.
    NotFound,
    /// Operation is not valid for the entity's current state.
    InvalidState,
    /// Caller supplied a malformed or out-of-range value.
    InvalidArgument,
}

/// Fare-card processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FareError {
    /// No card with the given number
    #[error("card not found")]
    CardNotFound,

    /// No attendance record with the given id
    #[error("attendance record not found")]
    AttendanceNotFound,

    /// Tap-out without a prior tap-in for the same trip and rider
    #[error("No tap-in record found for this trip/student.")]
    SessionNotFound,

    /// The matched tap session already has a tap-out time
    #[error("Already tapped out.")]
    AlreadyClosed,

    /// Card is blocked
    #[error("card is not active")]
    CardInactive,

    /// Vetting requested for a session that has not been tapped out
    #[error("session has not been tapped out")]
    SessionStillOpen,

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Card number is blank
    #[error("invalid card number")]
    InvalidCardNumber,

    /// A card with this number was already issued
    #[error("card already issued")]
    DuplicateCard,

    /// Route stops are malformed (e.g. price decreases along the route)
    #[error("invalid route: {0}")]
    InvalidRoute(String),
}

impl FareError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CardNotFound | Self::AttendanceNotFound | Self::SessionNotFound => {
                ErrorKind::NotFound
            }
            Self::AlreadyClosed | Self::CardInactive | Self::SessionStillOpen => {
                ErrorKind::InvalidState
            }
            Self::InvalidAmount
            | Self::InvalidCardNumber
            | Self::DuplicateCard
            | Self::InvalidRoute(_) => ErrorKind::InvalidArgument,
        }
    }
}
