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

//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Which attendance record a tap-out closes when a trip/rider pair has more
/// than one.
///
/// Normal use produces a single session per rider per trip, in which case
/// both policies agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum SessionSelection {
    /// Close the first record ever opened for the pair, even if it is already
    /// closed (the tap-out then fails with "Already tapped out.").
    #[default]
    FirstMatch,
    /// Close the most recently opened record that is still open.
    LatestOpen,
}

/// Settings for a [`FareEngine`](crate::FareEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub session_selection: SessionSelection,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_selection(mut self, session_selection: SessionSelection) -> Self {
        self.session_selection = session_selection;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reproduces_first_match() {
        assert_eq!(
            EngineConfig::default().session_selection,
            SessionSelection::FirstMatch
        );
    }

    #[test]
    fn builder_overrides_selection() {
        let config = EngineConfig::new().with_session_selection(SessionSelection::LatestOpen);
        assert_eq!(config.session_selection, SessionSelection::LatestOpen);
    }
}
