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

//! Payment ledger.
//!
//! Append-only log of fare charges. The single permitted mutation is the
//! refund flip:
//!
//! ```text
//!  TapIn (Completed) ──refund──► TapOutRefund (Refunded)
//! ```
//!
//! The flip happens in place rather than by appending a reversing entry, so a
//! second refund attempt for the same charge finds nothing left to refund.

use crate::base::{EntryId, RiderId, TripId, serialize_money};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Completed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    TapIn,
    TapOutRefund,
}

impl EntryKind {
    /// Kind an entry of this kind takes once refunded.
    pub fn refunded(self) -> Self {
        match self {
            Self::TapIn | Self::TapOutRefund => Self::TapOutRefund,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TapIn => f.write_str("TapIn"),
            Self::TapOutRefund => f.write_str("TapOutRefund"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub rider_id: RiderId,
    pub trip_id: Option<TripId>,
    #[serde(serialize_with = "serialize_money")]
    pub amount: Decimal,
    pub status: EntryStatus,
    pub kind: EntryKind,
    pub created_at: DateTime<Utc>,
}

/// Concurrent payment ledger indexed by (rider, trip).
#[derive(Debug)]
pub struct PaymentLedger {
    entries: DashMap<EntryId, LedgerEntry>,
    by_rider_trip: DashMap<(RiderId, Option<TripId>), Vec<EntryId>>,
    next_id: AtomicU64,
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            by_rider_trip: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends a completed charge. Always succeeds.
    pub fn record_charge(
        &self,
        rider_id: RiderId,
        trip_id: Option<TripId>,
        amount: Decimal,
        kind: EntryKind,
    ) -> LedgerEntry {
        let entry = LedgerEntry {
            id: EntryId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            rider_id,
            trip_id,
            amount,
            status: EntryStatus::Completed,
            kind,
            created_at: Utc::now(),
        };

        let mut ids = self.by_rider_trip.entry((rider_id, trip_id)).or_default();
        self.entries.insert(entry.id, entry.clone());
        ids.push(entry.id);

        entry
    }

    /// Flips the most recent completed `kind` charge for (rider, trip) to
    /// refunded.
    ///
    /// Returns `false` if there is no such charge. The status is re-checked
    /// under the entry's lock; if a concurrent refund won the race the next
    /// candidate is selected.
    pub fn refund_most_recent_charge(
        &self,
        rider_id: RiderId,
        trip_id: Option<TripId>,
        kind: EntryKind,
    ) -> bool {
        loop {
            let Some(id) = self.most_recent_completed(rider_id, trip_id, kind) else {
                return false;
            };
            if let Some(mut entry) = self.entries.get_mut(&id) {
                if entry.status == EntryStatus::Completed && entry.kind == kind {
                    entry.status = EntryStatus::Refunded;
                    entry.kind = kind.refunded();
                    return true;
                }
            }
        }
    }

    fn most_recent_completed(
        &self,
        rider_id: RiderId,
        trip_id: Option<TripId>,
        kind: EntryKind,
    ) -> Option<EntryId> {
        let ids = self.by_rider_trip.get(&(rider_id, trip_id))?.value().clone();
        ids.into_iter()
            .filter_map(|id| self.get(id))
            .filter(|entry| entry.status == EntryStatus::Completed && entry.kind == kind)
            .max_by_key(|entry| (entry.created_at, entry.id))
            .map(|entry| entry.id)
    }

    pub fn get(&self, id: EntryId) -> Option<LedgerEntry> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// Entries for (rider, trip), oldest first.
    pub fn entries_for(&self, rider_id: RiderId, trip_id: Option<TripId>) -> Vec<LedgerEntry> {
        let Some(ids) = self.by_rider_trip.get(&(rider_id, trip_id)) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| self.get(*id)).collect()
    }

    /// Every entry, oldest first.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PaymentLedger {
    fn default() -> Self {
        Self::new()
    }
}
