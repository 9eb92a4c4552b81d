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

//! Concurrency tests using parking_lot's built-in deadlock detector.
//!
//! These run the real engine from many threads and check that same-card
//! races never overspend, refunds flip at most once, and no lock cycle
//! forms between the card, attendance and payment stores.

use fare_card_engine::{CardNumber, EntryKind, EntryStatus, FareEngine, RiderId, TripId};
use parking_lot::deadlock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

// === Deadlock Detection Infrastructure ===

/// Starts a background thread that checks for deadlocks.
/// Returns a handle to stop the detector.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
}

fn trip(id: u128) -> TripId {
    TripId(Uuid::from_u128(id))
}

fn rider(id: u128) -> RiderId {
    RiderId(Uuid::from_u128(1_000 + id))
}

// === Tests ===

/// Many threads tapping the same card: successes are bounded by the balance
/// and every success left exactly one session and one charge.
#[test]
fn same_card_taps_never_overspend() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(FareEngine::in_memory());
    let card = CardNumber::from("RFID-1");
    engine.issue_card(card.clone(), Some(rider(1)), dec!(50.00)).unwrap();
    let successes = Arc::new(AtomicUsize::new(0));

    const NUM_THREADS: usize = 32;
    const TAPS_PER_THREAD: usize = 10;

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let card = card.clone();
            let successes = Arc::clone(&successes);
            thread::spawn(move || {
                for _ in 0..TAPS_PER_THREAD {
                    if engine
                        .tap_in(&card, dec!(1.00), trip(t as u128), rider(1), "Gate A")
                        .unwrap()
                    {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                    let _ = engine.get_balance(&card);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    let successes = successes.load(Ordering::SeqCst);
    assert_eq!(successes, 50);
    assert_eq!(engine.get_balance(&card), Some(Decimal::ZERO));
    assert_eq!(engine.payments().len(), successes);
    assert_eq!(engine.attendance().len(), successes);
}

/// Concurrent refund attempts against one charge: exactly one wins.
#[test]
fn concurrent_refunds_flip_once() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(FareEngine::in_memory());
    let card = CardNumber::from("RFID-1");
    engine.issue_card(card.clone(), Some(rider(1)), dec!(10.00)).unwrap();
    engine.tap_in(&card, dec!(7.50), trip(1), rider(1), "Gate A").unwrap();

    let wins = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let wins = Arc::clone(&wins);
            thread::spawn(move || {
                if engine
                    .payments()
                    .refund_most_recent_charge(rider(1), Some(trip(1)), EntryKind::TapIn)
                {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    assert_eq!(wins.load(Ordering::SeqCst), 1);
    let entries = engine.payments().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, EntryStatus::Refunded);
    assert_eq!(engine.get_balance(&card), Some(dec!(2.50)));
}

/// Concurrent tap-outs of one session: exactly one closes it.
#[test]
fn concurrent_tap_outs_close_once() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(FareEngine::in_memory());
    let card = CardNumber::from("RFID-1");
    engine.issue_card(card.clone(), Some(rider(1)), dec!(10.00)).unwrap();
    engine.tap_in(&card, dec!(1.00), trip(1), rider(1), "Gate A").unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.tap_out(trip(1), rider(1), "Gate B", true).success)
        })
        .collect();

    let closed = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .filter(|success| *success)
        .count();

    stop_deadlock_detector(detector);

    assert_eq!(closed, 1);
    assert_eq!(engine.attendance().open_count(trip(1), rider(1)), 0);
    assert_eq!(engine.attendance().pending_vetting().len(), 1);
}

/// Full ride lifecycle across many riders and cards at once.
#[test]
fn no_deadlock_full_lifecycle_many_riders() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(FareEngine::in_memory());

    const NUM_RIDERS: u128 = 40;
    const RIDES: usize = 5;

    for r in 0..NUM_RIDERS {
        engine
            .issue_card(CardNumber::new(format!("RFID-{r}")), Some(rider(r)), dec!(100.00))
            .unwrap();
    }

    let handles: Vec<_> = (0..NUM_RIDERS)
        .map(|r| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let card = CardNumber::new(format!("RFID-{r}"));
                for ride in 0..RIDES {
                    let trip = trip(ride as u128);
                    assert!(engine.tap_in(&card, dec!(2.00), trip, rider(r), "Gate A").unwrap());
                    let response = engine.tap_out(trip, rider(r), "Gate B", ride % 2 == 0);
                    assert!(response.success);
                    engine
                        .vet_tap_out(response.attendance_id.unwrap(), ride % 3 != 0, None)
                        .unwrap();
                    engine.top_up(&card, dec!(1.00)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    for r in 0..NUM_RIDERS {
        let card = CardNumber::new(format!("RFID-{r}"));
        assert_eq!(engine.get_balance(&card), Some(dec!(95.00)));
    }
    assert_eq!(engine.attendance().len(), (NUM_RIDERS as usize) * RIDES);
    assert!(engine.attendance().pending_vetting().is_empty());
    let refunded = engine
        .payments()
        .entries()
        .iter()
        .filter(|e| e.status == EntryStatus::Refunded)
        .count();
    assert_eq!(refunded, (NUM_RIDERS as usize) * 3);
}
