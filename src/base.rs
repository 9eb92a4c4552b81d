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

//! Core identifier types for cards, riders, trips and ledger records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Decimal places kept when money leaves the engine.
pub(crate) const MONEY_PRECISION: u32 = 4;

/// Serializes an amount rounded to [`MONEY_PRECISION`] places.
pub(crate) fn serialize_money<S>(amount: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    Serialize::serialize(&amount.round_dp(MONEY_PRECISION), serializer)
}

/// Printed number of an RFID fare card.
///
/// Card numbers are matched exactly; no case folding or trimming is applied
/// here. Callers that read numbers from external input trim them first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CardNumber(pub String);

impl CardNumber {
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CardNumber {
    fn from(number: &str) -> Self {
        Self(number.to_owned())
    }
}

/// Rider (student) reference owned by the identity directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RiderId(pub Uuid);

impl fmt::Display for RiderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trip reference owned by the routing subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TripId(pub Uuid);

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generated identifier of an attendance record.
///
/// Allocated from a monotonic counter, so ids also reflect insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AttendanceId(pub u64);

impl fmt::Display for AttendanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generated identifier of a payment ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (trip, rider) pair: the unit a tap session is tracked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub trip_id: TripId,
    pub rider_id: RiderId,
}

impl SessionKey {
    pub fn new(trip_id: TripId, rider_id: RiderId) -> Self {
        Self { trip_id, rider_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_card_number_is_empty() {
        assert!(CardNumber::new("").is_empty());
        assert!(CardNumber::new("   ").is_empty());
        assert!(!CardNumber::new("RFID-1").is_empty());
    }

    #[test]
    fn identifiers_serialize_transparently() {
        let card = serde_json::to_string(&CardNumber::from("RFID-1")).unwrap();
        assert_eq!(card, "\"RFID-1\"");

        let id = serde_json::to_string(&AttendanceId(7)).unwrap();
        assert_eq!(id, "7");

        let trip = TripId(Uuid::from_u128(1));
        assert_eq!(
            serde_json::to_string(&trip).unwrap(),
            "\"00000000-0000-0000-0000-000000000001\""
        );
    }

    #[test]
    fn money_is_serialized_to_four_places() {
        #[derive(Serialize)]
        struct Amount {
            #[serde(serialize_with = "serialize_money")]
            value: Decimal,
        }

        let json = serde_json::to_string(&Amount {
            value: Decimal::new(1_123_456_789, 9),
        })
        .unwrap();
        assert_eq!(json, r#"{"value":"1.1235"}"#);
    }
}
