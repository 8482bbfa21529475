//! End-to-end behaviour through the public API, several sessions sharing one
//! data directory.

use std::sync::{Arc, Barrier};
use std::thread;

use bakery_ops::auth::{self, AuthFailure, Registration};
use bakery_ops::calendar::{self, YearMonth};
use bakery_ops::checklist::{self, CheckOff, Completion};
use bakery_ops::reservations::{self, NewReservation};
use bakery_ops::schedule::{self, NewShift};
use bakery_ops::tables::Shift;
use bakery_ops::{Removed, Store, StoreConfig};
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct Bakery {
    _dir: TempDir,
    store: Store,
}

#[fixture]
fn bakery() -> Bakery {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path()).with_pbkdf2_iterations(16);
    let store = Store::open(config).unwrap();
    store.bootstrap().unwrap();
    Bakery { _dir: dir, store }
}

fn may() -> YearMonth {
    "2024-05".parse().unwrap()
}

fn shift(date: &str, user: &str, start: &str, end: &str) -> NewShift {
    NewShift {
        date: date.to_string(),
        user: user.to_string(),
        start_time: start.to_string(),
        end_time: end.to_string(),
        color: "blue".to_string(),
    }
}

#[rstest]
fn two_sessions_checking_the_same_item_log_it_once(bakery: Bakery) {
    checklist::seed_defaults(&bakery.store).unwrap();
    const SESSIONS: usize = 6;
    let barrier = Arc::new(Barrier::new(SESSIONS));
    let handles: Vec<_> = (0..SESSIONS)
        .map(|n| {
            let store = bakery.store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                checklist::mark_done(
                    &store,
                    CheckOff {
                        date: "2024-05-01".to_string(),
                        kind: "open".to_string(),
                        item: "Preheat ovens".to_string(),
                        user: format!("baker{n}"),
                        time: "06:00".to_string(),
                    },
                )
                .unwrap()
            })
        })
        .collect();
    let done = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|outcome| *outcome == Completion::Done)
        .count();
    assert_eq!(done, 1);

    let progress = checklist::progress(&bakery.store, "2024-05-01", "open").unwrap();
    assert_eq!((progress.completed, progress.total), (1, 5));
}

#[rstest]
fn writers_on_different_tables_do_not_lose_rows(bakery: Bakery) {
    const PER_TABLE: usize = 8;
    let mut handles = Vec::new();
    for n in 0..PER_TABLE {
        let store = bakery.store.clone();
        handles.push(thread::spawn(move || {
            schedule::add_shift(&store, shift("2024-05-03", "kim", "09:00", "10:00")).unwrap();
        }));
        let store = bakery.store.clone();
        handles.push(thread::spawn(move || {
            reservations::add_reservation(
                &store,
                NewReservation {
                    date: "2024-05-03".to_string(),
                    time: format!("{:02}:00", 8 + n),
                    item: "Baguette".to_string(),
                    count: 1,
                    customer_name: format!("customer {n}"),
                    customer_phone: String::new(),
                    created_by: "Kim".to_string(),
                },
            )
            .unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(schedule::shifts_for_day(&bakery.store, "2024-05-03").unwrap().len(), PER_TABLE);
    let day = reservations::for_date(&bakery.store, "2024-05-03").unwrap();
    assert_eq!(day.len(), PER_TABLE);
    assert!(day.windows(2).all(|pair| pair[0].time <= pair[1].time));
}

#[rstest]
fn wage_totals_follow_the_schedule(bakery: Bakery) {
    auth::register(&bakery.store, "kim", "pw", "Kim", 10_000).unwrap();
    schedule::add_shift(&bakery.store, shift("2024-05-02", "Kim", "09:00", "13:00")).unwrap();
    let late = schedule::add_shift(&bakery.store, shift("2024-05-20", "Kim", "22:00", "02:00"))
        .unwrap();

    let totals = schedule::monthly_totals(&bakery.store, "Kim", may()).unwrap();
    assert_eq!(totals.shift_count, 2);
    assert_eq!(totals.total_hours, 8.0);
    assert_eq!(totals.estimated_pay, 80_000);

    assert_eq!(schedule::remove_shift(&bakery.store, late).unwrap(), Removed::Deleted);
    let totals = schedule::monthly_totals(&bakery.store, "Kim", may()).unwrap();
    assert_eq!(totals.estimated_pay, 40_000);
}

#[rstest]
fn calendar_groups_stored_shifts_by_day(bakery: Bakery) {
    for date in ["2024-05-01", "2024-05-15", "2024-05-15", "2024-06-01"] {
        schedule::add_shift(&bakery.store, shift(date, "lee", "09:00", "12:00")).unwrap();
    }
    let rows: Vec<Shift> = bakery.store.read::<Shift>().unwrap();
    let buckets = calendar::month_buckets(rows, may());
    assert_eq!(buckets.len(), 31);
    assert_eq!(buckets[&1].len(), 1);
    assert_eq!(buckets[&15].len(), 2);
    assert_eq!(buckets.values().map(Vec::len).sum::<usize>(), 3);
}

#[rstest]
fn login_failures_look_alike(bakery: Bakery) {
    assert_eq!(
        auth::register(&bakery.store, "realuser", "rightpass", "Real", 9_000).unwrap(),
        Registration::Created
    );
    let unknown = auth::verify(&bakery.store, "ghost", "anything").unwrap();
    let wrong = auth::verify(&bakery.store, "realuser", "wrongpass").unwrap();
    assert_eq!(unknown, Err(AuthFailure));
    assert_eq!(wrong, Err(AuthFailure));

    let raw = std::fs::read_to_string(bakery.store.table_path("users")).unwrap();
    assert!(!raw.contains("rightpass"));
    let view = bakery.store.read_table("users").unwrap();
    assert_eq!(view.rows[0]["password_hash"], "[redacted]");
}

#[rstest]
fn unparsable_table_is_reported_not_overwritten(bakery: Bakery) {
    let path = bakery.store.table_path("schedule");
    std::fs::write(&path, "id,date,user,start_time,end_time,role\n\"1,2024-05-01\n").unwrap();

    assert!(schedule::shifts_for_month(&bakery.store, may()).unwrap().is_empty());
    let err = schedule::add_shift(&bakery.store, shift("2024-05-02", "kim", "09:00", "10:00"));
    assert!(matches!(
        err,
        Err(bakery_ops::AppError::Storage(bakery_ops::StoreError::Malformed { .. }))
    ));
    assert!(std::fs::read_to_string(&path).unwrap().contains("\"1,2024-05-01"));
}
