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

use clap::{Parser, Subcommand};
use csv::{ReaderBuilder, Trim, Writer};
use fare_card_engine::{
    AttendanceId, CardNumber, EngineConfig, FareEngine, FareError, InMemoryCatalog, RiderId,
    SessionSelection, TripId,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Fare Card Engine - Replay card events and query segment fares
#[derive(Parser, Debug)]
#[command(name = "fare-card-engine")]
#[command(about = "RFID fare-card engine for student transport", long_about = None)]
struct Args {
    /// Log filter (e.g. `info`, `fare_card_engine=debug`); logs go to stderr
    #[arg(long, env = "LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a CSV of card events and print the resulting cards to stdout
    ///
    /// Expected format: type,card,amount,trip,rider,stop,record,reason
    Replay {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Which session a tap-out closes when a rider has several on a trip
        #[arg(long, env = "SESSION_SELECTION", value_enum, default_value_t = SessionSelection::FirstMatch)]
        session_selection: SessionSelection,
    },
    /// List trips serving a segment, with fares, from a JSON route catalog
    Suggest {
        #[arg(long, value_name = "FILE")]
        catalog: PathBuf,

        boarding: String,

        drop_off: String,
    },
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match args.command {
        Command::Replay {
            input,
            session_selection,
        } => run_replay(input, session_selection),
        Command::Suggest {
            catalog,
            boarding,
            drop_off,
        } => run_suggest(catalog, &boarding, &drop_off),
    };

    if let Err(message) = result {
        eprintln!("{message}");
        process::exit(1);
    }
}

fn run_replay(input: PathBuf, session_selection: SessionSelection) -> Result<(), String> {
    let file = File::open(&input)
        .map_err(|e| format!("Error opening file '{}': {}", input.display(), e))?;

    let config = EngineConfig::new().with_session_selection(session_selection);
    let engine = replay_events(BufReader::new(file), config)
        .map_err(|e| format!("Error processing events: {e}"))?;

    write_cards(&engine, std::io::stdout()).map_err(|e| format!("Error writing output: {e}"))
}

fn run_suggest(catalog: PathBuf, boarding: &str, drop_off: &str) -> Result<(), String> {
    let file = File::open(&catalog)
        .map_err(|e| format!("Error opening catalog '{}': {}", catalog.display(), e))?;
    let catalog = InMemoryCatalog::from_reader(BufReader::new(file))
        .map_err(|e| format!("Error loading catalog: {e}"))?;
    info!(trips = catalog.len(), "catalog loaded");

    let engine = FareEngine::with_config(EngineConfig::default(), catalog);
    let mut wtr = Writer::from_writer(std::io::stdout());
    for suggestion in engine.suggest_fares(boarding, drop_off) {
        wtr.serialize(&suggestion)
            .map_err(|e| format!("Error writing output: {e}"))?;
    }
    wtr.flush().map_err(|e| format!("Error writing output: {e}"))
}

/// Raw CSV record matching the event format.
///
/// Fields: `type, card, amount, trip, rider, stop, record, reason`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    event: String,
    #[serde(default)]
    card: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    trip: Option<Uuid>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    rider: Option<Uuid>,
    #[serde(default)]
    stop: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    record: Option<u64>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum CardEvent {
    Issue {
        card: CardNumber,
        rider: Option<RiderId>,
        amount: Decimal,
    },
    TopUp {
        card: CardNumber,
        amount: Decimal,
    },
    Block {
        card: CardNumber,
    },
    TapIn {
        card: CardNumber,
        fare: Decimal,
        trip: TripId,
        rider: RiderId,
        stop: String,
    },
    TapOut {
        trip: TripId,
        rider: RiderId,
        stop: String,
        refund: bool,
    },
    Vet {
        record: AttendanceId,
        approve: bool,
        reason: Option<String>,
    },
}

impl CsvRecord {
    /// Converts a CSV record to a card event.
    ///
    /// Returns `None` for unknown event types or missing required fields.
    fn into_event(self) -> Option<CardEvent> {
        let card = self.card.map(CardNumber::new);
        let trip = self.trip.map(TripId);
        let rider = self.rider.map(RiderId);

        match self.event.to_lowercase().as_str() {
            "issue" => Some(CardEvent::Issue {
                card: card?,
                rider,
                amount: self.amount.unwrap_or(Decimal::ZERO),
            }),
            "topup" => Some(CardEvent::TopUp {
                card: card?,
                amount: self.amount?,
            }),
            "block" => Some(CardEvent::Block { card: card? }),
            "tapin" => Some(CardEvent::TapIn {
                card: card?,
                fare: self.amount?,
                trip: trip?,
                rider: rider?,
                stop: self.stop.unwrap_or_default(),
            }),
            kind @ ("tapout" | "tapout_refund") => Some(CardEvent::TapOut {
                trip: trip?,
                rider: rider?,
                stop: self.stop.unwrap_or_default(),
                refund: kind == "tapout_refund",
            }),
            kind @ ("approve" | "reject") => Some(CardEvent::Vet {
                record: AttendanceId(self.record?),
                approve: kind == "approve",
                reason: self.reason,
            }),
            _ => None,
        }
    }
}

fn apply_event(engine: &FareEngine, event: CardEvent) -> Result<(), FareError> {
    match event {
        CardEvent::Issue {
            card,
            rider,
            amount,
        } => engine.issue_card(card, rider, amount),
        CardEvent::TopUp { card, amount } => engine.top_up(&card, amount),
        CardEvent::Block { card } => engine.block_card(&card),
        CardEvent::TapIn {
            card,
            fare,
            trip,
            rider,
            stop,
        } => {
            if !engine.tap_in(&card, fare, trip, rider, &stop)? {
                info!(%card, "tap-in declined: insufficient funds or card inactive");
            }
            Ok(())
        }
        CardEvent::TapOut {
            trip,
            rider,
            stop,
            refund,
        } => {
            let response = engine.tap_out(trip, rider, &stop, refund);
            if !response.success {
                info!(%trip, %rider, message = %response.message, "tap-out not recorded");
            }
            Ok(())
        }
        CardEvent::Vet {
            record,
            approve,
            reason,
        } => engine.vet_tap_out(record, approve, reason),
    }
}

/// Replays card events from a CSV reader.
///
/// Rows are streamed one at a time. Malformed rows and events the engine
/// refuses are logged and skipped.
///
/// # CSV Format
///
/// Columns: `type, card, amount, trip, rider, stop, record, reason`
/// - `type`: issue, topup, block, tapin, tapout, tapout_refund, approve, reject
/// - `amount`: opening balance, top-up amount or fare
/// - `record`: attendance id for approve/reject
///
/// # Example
///
/// ```csv
/// type,card,amount,trip,rider,stop,record,reason
/// issue,RFID-1,10.00,,,,,
/// tapin,RFID-1,7.50,00000000-0000-0000-0000-000000000001,00000000-0000-0000-0000-000000000002,Gate A,,
/// tapout_refund,,,00000000-0000-0000-0000-000000000001,00000000-0000-0000-0000-000000000002,Gate B,,
/// approve,,,,,,1,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
fn replay_events<R: Read>(reader: R, config: EngineConfig) -> Result<FareEngine, csv::Error> {
    let engine = FareEngine::with_config(config, InMemoryCatalog::new());

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        match result {
            Ok(record) => {
                let Some(event) = record.into_event() else {
                    warn!(line, "skipping invalid event record");
                    continue;
                };
                debug!(line, ?event, "applying event");
                if let Err(error) = apply_event(&engine, event) {
                    warn!(line, %error, "skipping rejected event");
                }
            }
            Err(error) => {
                warn!(line, %error, "skipping malformed row");
            }
        }
    }

    Ok(engine)
}

/// Writes card states as CSV, ordered by card number.
///
/// Columns: `card, rider, balance, status, created_at`
fn write_cards<W: Write>(engine: &FareEngine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    let mut cards: Vec<_> = engine.cards().cards().collect();
    cards.sort_by(|a, b| a.key().cmp(b.key()));
    for card in cards {
        wtr.serialize(card.value())?;
    }

    wtr.flush()?;
    Ok(())
}
