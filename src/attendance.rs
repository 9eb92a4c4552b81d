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

//! Attendance ledger.
//!
//! One record per tap session of a rider on a trip:
//!
//! ```text
//!  open_session ──► Open ──close_session──► Closed (Pending) ──vet──► Approved | Rejected
//! ```
//!
//! Opening never checks for an existing open record; concurrent sessions for
//! the same pair are possible and are resolved by the [`SessionSelection`]
//! policy at tap-out.

use crate::base::{AttendanceId, RiderId, SessionKey, TripId};
use crate::config::SessionSelection;
use crate::error::FareError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Administrative review outcome of a tap-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VettingStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub id: AttendanceId,
    pub trip_id: TripId,
    pub rider_id: RiderId,
    pub tap_in_at: DateTime<Utc>,
    pub tap_in_stop: String,
    pub tap_out_at: Option<DateTime<Utc>>,
    pub tap_out_stop: Option<String>,
    /// `None` until the session is tapped out.
    pub vetting: Option<VettingStatus>,
    pub vetting_reason: Option<String>,
}

impl AttendanceRecord {
    pub fn is_open(&self) -> bool {
        self.tap_out_at.is_none()
    }
}

/// Concurrent store of attendance records.
///
/// Records live in `records`; `sessions` lists the ids opened for each
/// (trip, rider) pair in insertion order. Locks are always taken session
/// index first, record second.
#[derive(Debug)]
pub struct AttendanceLedger {
    records: DashMap<AttendanceId, AttendanceRecord>,
    sessions: DashMap<SessionKey, Vec<AttendanceId>>,
    next_id: AtomicU64,
    selection: SessionSelection,
}

impl AttendanceLedger {
    pub fn new() -> Self {
        Self::with_selection(SessionSelection::default())
    }

    pub fn with_selection(selection: SessionSelection) -> Self {
        Self {
            records: DashMap::new(),
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            selection,
        }
    }

    pub fn selection(&self) -> SessionSelection {
        self.selection
    }

    /// Opens a new tap session. Always succeeds.
    pub fn open_session(
        &self,
        trip_id: TripId,
        rider_id: RiderId,
        stop: impl Into<String>,
        at: DateTime<Utc>,
    ) -> AttendanceRecord {
        let id = AttendanceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let record = AttendanceRecord {
            id,
            trip_id,
            rider_id,
            tap_in_at: at,
            tap_in_stop: stop.into(),
            tap_out_at: None,
            tap_out_stop: None,
            vetting: None,
            vetting_reason: None,
        };

        // Index and record become visible together to close_session.
        let mut ids = self
            .sessions
            .entry(SessionKey::new(trip_id, rider_id))
            .or_default();
        self.records.insert(id, record.clone());
        ids.push(id);

        record
    }

    /// Closes the selected session for `(trip_id, rider_id)` and marks it
    /// pending vetting.
    ///
    /// # Errors
    ///
    /// - [`FareError::SessionNotFound`] - The pair never tapped in.
    /// - [`FareError::AlreadyClosed`] - The selected record is already closed.
    pub fn close_session(
        &self,
        trip_id: TripId,
        rider_id: RiderId,
        stop: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, FareError> {
        let ids = self
            .sessions
            .get(&SessionKey::new(trip_id, rider_id))
            .ok_or(FareError::SessionNotFound)?;

        let selected = match self.selection {
            SessionSelection::FirstMatch => ids.first().copied(),
            SessionSelection::LatestOpen => ids
                .iter()
                .rev()
                .find(|id| {
                    self.records
                        .get(*id)
                        .map(|record| record.is_open())
                        .unwrap_or(false)
                })
                .or_else(|| ids.last())
                .copied(),
        };
        let id = selected.ok_or(FareError::SessionNotFound)?;

        let mut record = self
            .records
            .get_mut(&id)
            .ok_or(FareError::SessionNotFound)?;
        if !record.is_open() {
            return Err(FareError::AlreadyClosed);
        }
        record.tap_out_at = Some(at);
        record.tap_out_stop = Some(stop.into());
        record.vetting = Some(VettingStatus::Pending);

        Ok(record.value().clone())
    }

    /// Records a vetting decision on a closed session. A later decision
    /// overwrites an earlier one.
    ///
    /// # Errors
    ///
    /// - [`FareError::AttendanceNotFound`] - No record with this id.
    /// - [`FareError::SessionStillOpen`] - The session has no tap-out yet.
    pub fn vet(
        &self,
        id: AttendanceId,
        approve: bool,
        reason: Option<String>,
    ) -> Result<(), FareError> {
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or(FareError::AttendanceNotFound)?;
        if record.is_open() {
            return Err(FareError::SessionStillOpen);
        }
        record.vetting = Some(if approve {
            VettingStatus::Approved
        } else {
            VettingStatus::Rejected
        });
        record.vetting_reason = reason;
        Ok(())
    }

    pub fn get(&self, id: AttendanceId) -> Option<AttendanceRecord> {
        self.records.get(&id).map(|record| record.value().clone())
    }

    /// Records for a (trip, rider) pair in the order they were opened.
    pub fn records_for(&self, trip_id: TripId, rider_id: RiderId) -> Vec<AttendanceRecord> {
        let Some(ids) = self.sessions.get(&SessionKey::new(trip_id, rider_id)) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| self.get(*id)).collect()
    }

    /// Number of open sessions for a (trip, rider) pair.
    pub fn open_count(&self, trip_id: TripId, rider_id: RiderId) -> usize {
        self.records_for(trip_id, rider_id)
            .iter()
            .filter(|record| record.is_open())
            .count()
    }

    /// Closed sessions still waiting for a vetting decision, oldest first.
    pub fn pending_vetting(&self) -> Vec<AttendanceRecord> {
        let mut pending: Vec<AttendanceRecord> = self
            .records
            .iter()
            .filter(|record| record.vetting == Some(VettingStatus::Pending))
            .map(|record| record.value().clone())
            .collect();
        pending.sort_by_key(|record| record.id);
        pending
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for AttendanceLedger {
    fn default() -> Self {
        Self::new()
    }
}
