mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::time::Duration;

use orbitfarm_dispatch::{run, BarrierState, Cadence};

use common::{dispatcher, full_set, HOUR};

fn quiet() -> Cadence {
    Cadence::new(HOUR, HOUR).unwrap()
}

#[test]
fn run_to_completion_covers_every_coordinate_once() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path(), 40, 30, 4, true, quiet(), Duration::ZERO);

    let report = run(&d).unwrap();

    assert!(report.finalized);
    assert!(!report.aborted);
    assert_eq!(report.units_computed, 1200);
    assert_eq!(report.workers.len(), 4);
    assert_eq!(report.workers.iter().filter(|w| w.finalized).count(), 1);

    let claims = d.engine().claims.lock().clone();
    let unique: HashSet<_> = claims.iter().copied().collect();
    assert_eq!(claims.len(), 1200, "every unit flushed exactly once");
    assert_eq!(unique, full_set(40, 30));

    assert_eq!(d.barrier().state(), BarrierState::Fired);
    assert!(dir.path().join("out").join("Test_0000.dat").exists());
    assert!(dir.path().join("out").join("Test_0000.txt").exists());
    assert!(!dir.path().join("DataDump.dat").exists());
    assert!(d.shutdown_timer().is_due());
}

#[test]
fn single_worker_direct_mode() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path(), 7, 5, 1, false, quiet(), Duration::ZERO);
    let report = run(&d).unwrap();
    assert!(report.finalized);
    let unique: HashSet<_> = d.engine().claims.lock().iter().copied().collect();
    assert_eq!(unique, full_set(7, 5));
}

#[test]
fn checkpoints_run_only_while_everyone_is_quiescent() {
    let dir = tempfile::tempdir().unwrap();
    let cadence = Cadence::new(Duration::from_millis(15), Duration::from_millis(5)).unwrap();
    let d = dispatcher(dir.path(), 120, 100, 4, true, cadence, Duration::from_micros(50));

    let report = run(&d).unwrap();

    assert!(report.finalized);
    assert!(report.saves >= 1, "run should span at least one save interval");
    let probes = d.store().probes.lock().clone();
    assert_eq!(probes.len() as u64, report.saves + 1, "saves plus the final persist");
    for p in &probes {
        assert_eq!(p.paused, p.registered, "persist began before quiescence: {p:?}");
        assert_eq!(p.in_flight, 0, "unit work overlapped a persist: {p:?}");
    }
    assert_eq!(d.store().max_inside.load(Ordering::SeqCst), 1);
    assert_eq!(probes.last().unwrap().registered, 0);

    let claims = d.engine().claims.lock().clone();
    let unique: HashSet<_> = claims.iter().copied().collect();
    assert_eq!(claims.len(), unique.len());
    assert_eq!(unique, full_set(120, 100));
}

#[test]
fn clean_stop_saves_then_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path(), 200, 200, 4, true, quiet(), Duration::from_micros(50));

    let report = std::thread::scope(|s| {
        s.spawn(|| {
            std::thread::sleep(Duration::from_millis(30));
            d.coordinator().request_clean_stop();
        });
        run(&d).unwrap()
    });

    assert!(report.aborted);
    assert!(!report.finalized);
    assert_eq!(report.saves, 1);
    assert!(report.units_computed < 40_000);

    let probes = d.store().probes.lock().clone();
    assert_eq!(probes.len(), 1);
    assert_eq!(
        probes[0].completed, report.units_computed,
        "no unit may be handed out after the stopping save"
    );
    assert_eq!(d.barrier().state(), BarrierState::Fired);
    assert!(d.shutdown_timer().deadline().is_some());
    assert!(dir.path().join("DataDump.dat").exists());
}

#[test]
fn abort_stops_every_worker_without_saving() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path(), 200, 200, 3, false, quiet(), Duration::from_micros(50));

    let report = std::thread::scope(|s| {
        s.spawn(|| {
            std::thread::sleep(Duration::from_millis(20));
            d.coordinator().request_abort();
        });
        run(&d).unwrap()
    });

    assert!(report.aborted);
    assert!(!report.finalized);
    assert_eq!(report.saves, 0);
    assert!(report.units_computed < 40_000);
    assert!(d.store().probes.lock().is_empty());
    assert_eq!(d.coordinator().registered_workers(), 0);
    assert_eq!(d.barrier().state(), BarrierState::Armed);
}

#[test]
fn sleep_freezes_progress_until_wakeup() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path(), 100, 60, 3, true, quiet(), Duration::from_micros(50));

    let report = std::thread::scope(|s| {
        s.spawn(|| {
            std::thread::sleep(Duration::from_millis(10));
            let c = d.coordinator();
            c.sleep();
            let frozen = c.progress().completed;
            std::thread::sleep(Duration::from_millis(40));
            assert_eq!(c.progress().completed, frozen);
            c.wakeup();
        });
        run(&d).unwrap()
    });

    assert!(report.finalized);
    let claims = d.engine().claims.lock().clone();
    let unique: HashSet<_> = claims.iter().copied().collect();
    assert_eq!(claims.len(), 6000);
    assert_eq!(unique, full_set(100, 60));
}
