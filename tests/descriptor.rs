mod common;

use common::{engine, wait_parked};
use netpoll::{Direction, Error};

use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_read_deadline_leaves_writer_parked() {
    let (engine, _poller) = engine();
    let pd = engine.open(7).unwrap();

    let writer = {
        let pd = pd.clone();
        thread::spawn(move || pd.wait(Direction::Write))
    };
    wait_parked(&pd, Direction::Write, 1);

    let start = Instant::now();
    pd.set_deadline(Duration::from_millis(50), Direction::Read);
    pd.reset(Direction::Read).unwrap();

    let result = pd.wait(Direction::Read);

    assert!(matches!(result, Err(Error::Timeout)), "got {:?}", result);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(50), "woke early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(300), "woke late: {:?}", elapsed);

    // The read deadline must not touch the write side.
    thread::sleep(Duration::from_millis(20));
    assert_eq!(pd.waiters(Direction::Write), 1);
    assert!(!writer.is_finished());

    pd.unblock();
    assert!(matches!(writer.join().unwrap(), Err(Error::Closing)));
}

#[test]
fn test_write_readiness_wakes_only_writer() {
    let (engine, poller) = engine();
    let pd = engine.open(3).unwrap();

    let reader = {
        let pd = pd.clone();
        thread::spawn(move || pd.wait(Direction::Read))
    };
    let writer = {
        let pd = pd.clone();
        thread::spawn(move || pd.wait(Direction::Write))
    };
    wait_parked(&pd, Direction::Read, 1);
    wait_parked(&pd, Direction::Write, 1);

    poller.ready_write(3);

    assert!(writer.join().unwrap().is_ok());
    assert_eq!(pd.waiters(Direction::Read), 1);

    poller.ready_read(3);
    assert!(reader.join().unwrap().is_ok());
}

#[test]
fn test_unblock_releases_every_waiter() {
    let (engine, _poller) = engine();
    let pd = engine.open(4).unwrap();

    let waiters: Vec<_> = (0..6)
        .map(|i| {
            let pd = pd.clone();
            let direction = if i % 2 == 0 {
                Direction::Read
            } else {
                Direction::Write
            };
            thread::spawn(move || pd.wait(direction))
        })
        .collect();

    wait_parked(&pd, Direction::Both, 6);
    pd.unblock();

    for waiter in waiters {
        assert!(matches!(waiter.join().unwrap(), Err(Error::Closing)));
    }
    assert!(matches!(pd.reset(Direction::Read), Err(Error::Closing)));
}

#[test]
fn test_readiness_for_unknown_handle_is_ignored() {
    let (engine, poller) = engine();
    let pd = engine.open(8).unwrap();

    let reader = {
        let pd = pd.clone();
        thread::spawn(move || pd.wait(Direction::Read))
    };
    wait_parked(&pd, Direction::Read, 1);

    poller.ready_read(99);
    poller.ready_read(8);

    assert!(reader.join().unwrap().is_ok());
}

#[test]
fn test_latest_deadline_wins() {
    let (engine, _poller) = engine();
    let pd = engine.open(5).unwrap();

    pd.set_deadline(Duration::from_millis(30), Direction::Read);
    pd.set_deadline(Duration::ZERO, Direction::Read);

    let reader = {
        let pd = pd.clone();
        thread::spawn(move || pd.wait(Direction::Read))
    };
    wait_parked(&pd, Direction::Read, 1);

    thread::sleep(Duration::from_millis(100));
    assert!(!reader.is_finished());

    pd.set_deadline(Duration::from_millis(20), Direction::Read);
    assert!(matches!(reader.join().unwrap(), Err(Error::Timeout)));
}

#[test]
fn test_both_direction_deadline_expires_both_sides() {
    let (engine, _poller) = engine();
    let pd = engine.open(6).unwrap();

    pd.set_deadline(Duration::from_millis(30), Direction::Both);

    let reader = {
        let pd = pd.clone();
        thread::spawn(move || pd.wait(Direction::Read))
    };

    assert!(matches!(pd.wait(Direction::Write), Err(Error::Timeout)));
    assert!(matches!(reader.join().unwrap(), Err(Error::Timeout)));
}

#[test]
fn test_new_deadline_clears_expired_state() {
    let (engine, _poller) = engine();
    let pd = engine.open(9).unwrap();

    pd.set_deadline_at(Some(Instant::now()), Direction::Write);
    assert!(matches!(pd.reset(Direction::Write), Err(Error::Timeout)));
    assert!(pd.reset(Direction::Read).is_ok());

    pd.set_deadline(Duration::from_secs(60), Direction::Write);
    assert!(pd.reset(Direction::Write).is_ok());
}

#[test]
fn test_timeout_converts_to_io_error() {
    let (engine, _poller) = engine();
    let pd = engine.open(10).unwrap();

    pd.set_deadline_at(Some(Instant::now()), Direction::Read);
    let error: std::io::Error = pd.wait(Direction::Read).unwrap_err().into();

    assert_eq!(error.kind(), std::io::ErrorKind::TimedOut);
}
