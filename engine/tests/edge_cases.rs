//! Edge case tests for lodge-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use lodge_engine::{
    make_promise, Backend, Dataset, Error, Future, InlineExecutor, MemoryBackend, Operation,
    Reservation, ReservationId, StreamObserver, StreamableItems, StreamableType, Store,
    TaskResult, ThreadPool, DEFAULT_ENDPOINT,
};
use serde_json::json;

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

fn booking(room: i64, from: NaiveDate, to: NaiveDate) -> Reservation {
    Reservation::new("Guest", room, from, to)
}

/// Records every event as a short string.
#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }
}

impl StreamObserver for Recorder {
    fn items_added(&self, items: &StreamableItems) {
        self.push(format!("add:{}", items.len()));
    }
    fn items_updated(&self, items: &StreamableItems) {
        self.push(format!("update:{}", items.len()));
    }
    fn items_removed(&self, ids: &[ReservationId]) {
        self.push(format!("remove:{}", ids.len()));
    }
    fn cleared(&self) {
        self.push("clear".into());
    }
    fn initialized(&self) {
        self.push("init".into());
    }
}

fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not met in time");
}

// ============================================================================
// Futures
// ============================================================================

#[test]
fn chain_across_mixed_executors() {
    let pool = ThreadPool::with_name(2, "edge-pool");
    let (future, promise) = make_promise::<u64>();

    let result = future
        .then(pool.clone(), |v| v + 1)
        .then(InlineExecutor, |v| v * 10)
        .then(pool, |v| {
            let name = thread::current().name().map(str::to_owned);
            (v, name)
        });

    promise.resolve(1);
    let (value, name) = result.get();
    assert_eq!(value, 20);
    assert!(name.unwrap().starts_with("edge-pool"));
}

#[test]
fn ready_future_chains_immediately() {
    let value = Future::ready("lodge".to_string())
        .then(InlineExecutor, |s| s.len())
        .get();
    assert_eq!(value, 5);
}

#[test]
fn many_pairs_resolved_concurrently() {
    let pool = ThreadPool::new(4);
    let (promises, futures): (Vec<_>, Vec<_>) = (0..200u32)
        .map(|i| {
            let (future, promise) = make_promise::<u32>();
            (promise, future.then(pool.clone(), move |v| v + i))
        })
        .unzip();

    let resolver = thread::spawn(move || {
        for promise in promises {
            promise.resolve(1);
        }
    });

    let sum: u32 = futures.into_iter().map(Future::get).sum();
    resolver.join().unwrap();
    assert_eq!(sum, (1..=200).sum::<u32>());
}

#[test]
fn unit_values_flow_through() {
    let (future, promise) = make_promise::<()>();
    let done = future.then(InlineExecutor, |()| "done");
    promise.resolve(());
    assert_eq!(done.get(), "done");
}

// ============================================================================
// Store
// ============================================================================

#[test]
fn zero_night_reservation_rejected() {
    let mut store = Store::new();
    let same_day = booking(1, date(3, 1), date(3, 1));
    assert!(matches!(
        store.apply(Operation::StoreNewReservation(same_day)),
        Err(Error::InvalidReservation { .. })
    ));

    let backwards = booking(1, date(3, 5), date(3, 1));
    assert!(store
        .apply(Operation::StoreNewReservation(backwards))
        .is_err());
    assert_eq!(store.reservation_count(), 0);
}

#[test]
fn back_to_back_bookings_share_a_room() {
    let mut store = Store::new();
    store
        .apply(Operation::StoreNewReservation(booking(1, date(3, 1), date(3, 4))))
        .unwrap();
    store
        .apply(Operation::StoreNewReservation(booking(1, date(3, 4), date(3, 6))))
        .unwrap();
    let clash = store.apply(Operation::StoreNewReservation(booking(1, date(3, 5), date(3, 7))));

    assert!(clash.is_err());
    assert_eq!(store.reservation_count(), 2);
}

#[test]
fn update_into_a_clash_keeps_the_old_version() {
    let mut store = Store::new();
    store
        .apply(Operation::StoreNewReservation(booking(1, date(3, 1), date(3, 3))))
        .unwrap();
    store
        .apply(Operation::StoreNewReservation(booking(2, date(3, 1), date(3, 3))))
        .unwrap();

    let moved = booking(1, date(3, 2), date(3, 4)).with_id(2);
    assert!(store.apply(Operation::UpdateReservation(moved)).is_err());
    assert_eq!(store.reservation(2).unwrap().room_id, 2);

    // Extending a booking over its own nights is fine.
    let longer = booking(1, date(3, 1), date(3, 5)).with_id(1);
    store.apply(Operation::UpdateReservation(longer)).unwrap();
    assert_eq!(store.reservation(1).unwrap().nights(), 4);
}

#[test]
fn assigned_ids_skip_explicit_ones() {
    let mut store = Store::new();
    store
        .apply(Operation::StoreNewReservation(
            booking(1, date(4, 1), date(4, 2)).with_id(40),
        ))
        .unwrap();
    let next = store
        .apply(Operation::StoreNewReservation(booking(2, date(4, 1), date(4, 2))))
        .unwrap();
    assert_eq!(next.reservation_id, 41);

    let duplicate = store.apply(Operation::StoreNewReservation(
        booking(3, date(4, 1), date(4, 2)).with_id(40),
    ));
    assert_eq!(duplicate.unwrap_err(), Error::ReservationAlreadyExists(40));
}

#[test]
fn unicode_descriptions_survive() {
    let mut store = Store::new();
    let guest = Reservation::new("Zoë 🏨 Müller", 1, date(5, 1), date(5, 2));
    let id = store
        .apply(Operation::StoreNewReservation(guest))
        .unwrap()
        .reservation_id;

    let json = serde_json::to_string(store.reservation(id).unwrap()).unwrap();
    let back: Reservation = serde_json::from_str(&json).unwrap();
    assert_eq!(back.description, "Zoë 🏨 Müller");
}

#[test]
fn deleting_twice_fails_the_second_time() {
    let mut store = Store::new();
    store
        .apply(Operation::StoreNewReservation(booking(1, date(6, 1), date(6, 2))))
        .unwrap();
    store.apply(Operation::DeleteReservation(1)).unwrap();
    assert_eq!(
        store.apply(Operation::DeleteReservation(1)).unwrap_err(),
        Error::ReservationNotFound(1)
    );
}

// ============================================================================
// Datasets
// ============================================================================

#[test]
fn empty_dataset_builds_empty_store() {
    let store = Dataset::from_json("{}").unwrap().into_store().unwrap();
    assert_eq!(store.reservation_count(), 0);
}

#[test]
fn clashing_dataset_rejected() {
    let json = json!({
        "formatVersion": 1,
        "reservations": [
            {"id": 1, "roomId": 7, "checkIn": "2024-07-01", "checkOut": "2024-07-04"},
            {"id": 2, "roomId": 7, "checkIn": "2024-07-03", "checkOut": "2024-07-05"}
        ]
    });
    let dataset = Dataset::from_json(&json.to_string()).unwrap();
    assert!(matches!(
        dataset.into_store(),
        Err(Error::InvalidDataset(_))
    ));
}

#[test]
fn missing_dataset_file() {
    let err = Dataset::load("/nonexistent/lodge-seed.json").unwrap_err();
    assert!(matches!(err, Error::InvalidDataset(_)));
}

// ============================================================================
// Memory backend
// ============================================================================

#[test]
fn empty_batch_resolves_to_no_results() {
    let backend = MemoryBackend::new(1);
    let results = backend.queue_operations(Vec::new()).results.get();
    assert!(results.is_empty());
}

#[test]
fn largest_id_then_assigned_id_reports_an_error_entry() {
    let backend = MemoryBackend::new(1);
    let results = backend
        .queue_operations(vec![
            Operation::StoreNewReservation(booking(1, date(2, 1), date(2, 2)).with_id(i64::MAX)),
            Operation::StoreNewReservation(booking(2, date(2, 1), date(2, 2))),
        ])
        .results
        .get();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0], TaskResult::Ok { id: i64::MAX });
    assert!(matches!(results[1], TaskResult::Error { .. }));
    assert_eq!(backend.reservation_count(), 1);
}

#[test]
fn batches_from_many_threads_get_unique_ids() {
    let backend = MemoryBackend::new(3);
    let handles: Vec<_> = (0..8)
        .map(|room| {
            let backend = backend.clone();
            thread::spawn(move || {
                let ops = (1..=10)
                    .map(|day| {
                        Operation::StoreNewReservation(booking(
                            room,
                            date(8, day),
                            date(8, day + 1),
                        ))
                    })
                    .collect();
                backend.queue_operations(ops).results.get()
            })
        })
        .collect();

    let mut ids: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .map(|result| match result {
            TaskResult::Ok { id } => id,
            TaskResult::Error { message } => panic!("unexpected failure: {message}"),
        })
        .collect();
    ids.sort_unstable();
    ids.dedup();

    assert_eq!(ids.len(), 80);
    assert_eq!(backend.reservation_count(), 80);
}

#[test]
fn every_stream_sees_every_change_in_order() {
    let backend = MemoryBackend::new(2);
    let recorders: Vec<_> = (0..5).map(|_| Arc::new(Recorder::default())).collect();
    let handles: Vec<_> = recorders
        .iter()
        .map(|r| {
            backend
                .create_stream(r.clone(), StreamableType::Reservation, DEFAULT_ENDPOINT, json!({}))
                .unwrap()
        })
        .collect();
    wait_for(|| recorders.iter().all(|r| r.events() == ["init"]));

    backend
        .queue_operations(vec![
            Operation::StoreNewReservation(booking(1, date(9, 1), date(9, 3))),
            Operation::UpdateReservation(booking(1, date(9, 1), date(9, 4)).with_id(1)),
            Operation::DeleteReservation(1),
        ])
        .results
        .get();

    for recorder in &recorders {
        assert_eq!(recorder.events(), ["init", "add:1", "update:1", "remove:1"]);
    }
    drop(handles);
    assert_eq!(backend.stream_count(), 0);
}

#[test]
fn stream_opened_mid_traffic_sees_consistent_snapshot() {
    let backend = MemoryBackend::new(2);
    let (done_tx, done_rx) = mpsc::channel();

    let writer = backend.clone();
    thread::spawn(move || {
        for day in 1..=20 {
            writer
                .queue_operations(vec![Operation::StoreNewReservation(booking(
                    1,
                    date(10, day),
                    date(10, day + 1),
                ))])
                .results
                .get();
        }
        done_tx.send(()).unwrap();
    });

    let recorder = Arc::new(Recorder::default());
    let _handle = backend
        .create_stream(recorder.clone(), StreamableType::Reservation, DEFAULT_ENDPOINT, json!({}))
        .unwrap();
    done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    wait_for(|| recorder.events().contains(&"init".to_string()));

    // Snapshot size plus later additions accounts for every reservation.
    let events = recorder.events();
    let init_at = events.iter().position(|e| e == "init").unwrap();
    let snapshot: usize = events[..init_at]
        .iter()
        .map(|e| e.trim_start_matches("add:").parse::<usize>().unwrap())
        .sum();
    let later = events[init_at + 1..].len();
    assert_eq!(snapshot + later, 20);
}
