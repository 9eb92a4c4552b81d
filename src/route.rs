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

//! Route catalog adapter and segment pricing.
//!
//! The catalog is owned by the routing subsystem; the engine only reads it.
//! Each trip carries its stops in travel order with the cumulative price from
//! the first stop, so the fare between two stops is the difference of their
//! cumulative prices.

use crate::base::{TripId, serialize_money};
use crate::error::FareError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    pub name: String,
    pub order: u32,
    #[serde(serialize_with = "serialize_money")]
    pub price_from_start: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripRoute {
    pub trip_id: TripId,
    pub stops: Vec<RouteStop>,
}

impl TripRoute {
    /// Checks that cumulative prices never go negative or decrease along the
    /// route.
    pub fn validate(&self) -> Result<(), FareError> {
        let mut previous = Decimal::ZERO;
        for stop in &self.stops {
            if stop.price_from_start < previous {
                return Err(FareError::InvalidRoute(format!(
                    "trip {}: price at stop '{}' decreases to {}",
                    self.trip_id, stop.name, stop.price_from_start
                )));
            }
            previous = stop.price_from_start;
        }
        Ok(())
    }

    /// Fare between two stops of this trip.
    ///
    /// Stops are matched by exact name, first occurrence. Returns the boarding
    /// index, drop-off index and price, or `None` unless both stops exist and
    /// the drop-off comes strictly after the boarding stop.
    pub fn segment(&self, boarding: &str, drop_off: &str) -> Option<(usize, usize, Decimal)> {
        let boarding_idx = self.stops.iter().position(|s| s.name == boarding)?;
        let drop_off_idx = self.stops.iter().position(|s| s.name == drop_off)?;
        if drop_off_idx <= boarding_idx {
            return None;
        }
        let price =
            self.stops[drop_off_idx].price_from_start - self.stops[boarding_idx].price_from_start;
        Some((boarding_idx, drop_off_idx, price))
    }
}

/// A trip that serves a requested segment, with its fare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FareSuggestion {
    pub trip_id: TripId,
    pub boarding_order: usize,
    pub drop_off_order: usize,
    #[serde(serialize_with = "serialize_money")]
    pub price: Decimal,
}

/// Read access to the trips known to the routing subsystem.
pub trait RouteCatalog {
    /// Every trip, in catalog order.
    fn trips(&self) -> Vec<TripRoute>;
}

/// Every trip serving `boarding` → `drop_off`, in catalog order.
pub fn suggest_fares<C: RouteCatalog + ?Sized>(
    catalog: &C,
    boarding: &str,
    drop_off: &str,
) -> Vec<FareSuggestion> {
    catalog
        .trips()
        .into_iter()
        .filter_map(|trip| {
            let (boarding_order, drop_off_order, price) = trip.segment(boarding, drop_off)?;
            Some(FareSuggestion {
                trip_id: trip.trip_id,
                boarding_order,
                drop_off_order,
                price,
            })
        })
        .collect()
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("malformed catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] FareError),
}

/// Catalog held in memory, e.g. loaded from a JSON export.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    trips: Vec<TripRoute>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog, validating every trip.
    pub fn from_trips(trips: Vec<TripRoute>) -> Result<Self, FareError> {
        let mut catalog = Self::new();
        for trip in trips {
            catalog.add_trip(trip)?;
        }
        Ok(catalog)
    }

    /// Reads a JSON array of trips.
    ///
    /// ```json
    /// [{"trip_id": "…", "stops": [{"name": "A", "order": 0, "price_from_start": "0"}]}]
    /// ```
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let trips: Vec<TripRoute> = serde_json::from_reader(reader)?;
        Ok(Self::from_trips(trips)?)
    }

    pub fn add_trip(&mut self, trip: TripRoute) -> Result<(), FareError> {
        trip.validate()?;
        self.trips.push(trip);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }
}

impl RouteCatalog for InMemoryCatalog {
    fn trips(&self) -> Vec<TripRoute> {
        self.trips.clone()
    }
}
