mod common;

use common::{ScriptedPoller, engine, eventually, wait_parked};
use netpoll::{Direction, EngineBuilder, Error};

use std::io;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_open_close_round_trip() {
    let (engine, poller) = engine();

    let pd = engine.open(11).unwrap();
    assert!(engine.is_open(11));
    assert_eq!(engine.open_handles(), 1);
    assert_eq!(poller.registered(), vec![11]);

    pd.unblock();
    pd.close().unwrap();

    assert!(!engine.is_open(11));
    assert_eq!(engine.open_handles(), 0);
    assert_eq!(poller.deregistered(), vec![11]);
}

#[test]
fn test_open_twice_is_rejected() {
    let (engine, _poller) = engine();

    let _pd = engine.open(12).unwrap();
    let error = engine.open(12).unwrap_err();

    match error {
        Error::Registration { handle, source } => {
            assert_eq!(handle, 12);
            assert_eq!(source.kind(), io::ErrorKind::AlreadyExists);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_rejected_registration_leaves_no_entry() {
    let (engine, poller) = engine();
    poller.reject(13);

    assert!(matches!(
        engine.open(13),
        Err(Error::Registration { handle: 13, .. })
    ));
    assert!(!engine.is_open(13));

    // The rejection was one-shot.
    assert!(engine.open(13).is_ok());
}

#[test]
fn test_late_close_keeps_reused_handle() {
    let (engine, poller) = engine();

    let old = engine.open(14).unwrap();
    old.unblock();
    old.close().unwrap();

    let new = engine.open(14).unwrap();
    old.close().unwrap();

    assert!(engine.is_open(14));
    assert_eq!(poller.deregistered(), vec![14]);

    let reader = {
        let new = new.clone();
        thread::spawn(move || new.wait(Direction::Read))
    };
    wait_parked(&new, Direction::Read, 1);

    poller.ready_read(14);
    assert!(reader.join().unwrap().is_ok());
}

#[test]
fn test_poller_failure_is_fatal() {
    let (mut engine, poller) = engine();
    let _pd = engine.open(15).unwrap();

    poller.fail(io::ErrorKind::Other);

    eventually(|| matches!(engine.open(16), Err(Error::PollerFatal(_))));
    assert!(matches!(engine.shutdown(), Err(Error::PollerFatal(_))));
}

#[test]
fn test_fatal_error_keeps_os_code() {
    let (mut engine, poller) = engine();

    // EBADF
    poller.fail_os(9);

    eventually(|| matches!(engine.open(21), Err(Error::PollerFatal(_))));

    match engine.open(22) {
        Err(Error::PollerFatal(source)) => assert_eq!(source.raw_os_error(), Some(9)),
        other => panic!("unexpected open result: {:?}", other),
    }
    match engine.shutdown() {
        Err(Error::PollerFatal(source)) => assert_eq!(source.raw_os_error(), Some(9)),
        other => panic!("unexpected shutdown result: {:?}", other),
    }
}

#[test]
fn test_shutdown_is_idempotent() {
    let (mut engine, poller) = engine();

    engine.shutdown().unwrap();
    engine.shutdown().unwrap();

    assert!(poller.is_shutdown());
    assert!(matches!(engine.open(17), Err(Error::Shutdown)));
}

#[test]
fn test_close_after_engine_drop() {
    let (engine, _poller) = engine();
    let pd = engine.open(18).unwrap();

    drop(engine);

    pd.unblock();
    assert!(matches!(pd.close(), Err(Error::Shutdown)));
}

#[test]
fn test_engines_are_independent() {
    let (first, first_poller) = engine();
    let (second, _second_poller) = engine();

    let a = first.open(19).unwrap();
    let b = second.open(19).unwrap();

    let reader = {
        let b = b.clone();
        thread::spawn(move || b.wait(Direction::Read))
    };
    wait_parked(&b, Direction::Read, 1);

    first_poller.ready_read(19);
    assert!(a.wait(Direction::Read).is_ok());

    thread::sleep(Duration::from_millis(30));
    assert!(!reader.is_finished());

    b.unblock();
    assert!(matches!(reader.join().unwrap(), Err(Error::Closing)));
}

#[test]
fn test_open_and_close_while_dispatch_is_polling() {
    let poller = ScriptedPoller::new();
    let mut engine = EngineBuilder::new()
        .poll_timeout(Duration::from_secs(10))
        .abort_on_fatal(false)
        .build(poller.clone())
        .unwrap();

    eventually(|| poller.is_polling());

    let start = Instant::now();

    let pd = engine.open(20).unwrap();
    pd.unblock();
    pd.close().unwrap();

    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(poller.is_polling());
    assert!(!engine.is_open(20));
    assert_eq!(poller.deregistered(), vec![20]);

    let start = Instant::now();
    engine.shutdown().unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
#[should_panic(expected = "batch_size must be > 0")]
fn test_zero_batch_size_panics() {
    let _ = EngineBuilder::new().batch_size(0);
}

#[test]
#[should_panic(expected = "poll_timeout must be > 0")]
fn test_zero_poll_timeout_panics() {
    let _ = EngineBuilder::new().poll_timeout(Duration::ZERO);
}

#[test]
fn test_builder_defaults_start() {
    let poller = ScriptedPoller::new();
    let mut engine = EngineBuilder::default()
        .abort_on_fatal(false)
        .build(poller)
        .unwrap();

    assert_eq!(engine.descriptor(), None);
    engine.shutdown().unwrap();
}
