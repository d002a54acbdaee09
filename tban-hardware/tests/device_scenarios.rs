//! End-to-end scenarios for the device handle, driven through the replay link

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tban_core::registers::{CH_PWM, DS_TEMP, MINI_RPM};
use tban_core::{check_firmware_at_least, TbanConfig, TbanError, Variant};
use tban_hardware::{ExclusiveLock, ReplayLink, Tban, Transport};

fn test_config(dir: &tempfile::TempDir) -> TbanConfig {
    let mut config = TbanConfig::default();
    config.device.timeout_ms = 300;
    config.lock.path = dir.path().join("xban.lock");
    config.lock.timeout_secs = 0;
    config.timing.settle_ms = 0;
    config.timing.mini_settle_ms = 0;
    config.timing.receive_backoff_ms = 1;
    config
}

fn open_handle(dir: &tempfile::TempDir, link: &ReplayLink) -> Tban<ReplayLink> {
    let handle = link.clone();
    let mut tban = Tban::with_connector(&test_config(dir), move |_| Ok(handle.clone())).unwrap();
    tban.open().unwrap();
    tban
}

fn injected_base() -> Vec<u8> {
    let mut buf: Vec<u8> = (0..285).map(|i| (i * 7 % 256) as u8).collect();
    buf[0] = 100;
    buf[273] = 0x28;
    buf
}

fn injected_mini() -> Vec<u8> {
    let mut buf = vec![0u8; 285];
    buf[0] = 100;
    buf[1] = 253;
    buf[62] = 254;
    buf[44] = 120;
    buf[46] = 95;
    buf
}

#[test]
fn receive_is_independent_of_chunk_boundaries() {
    let data: Vec<u8> = (0..285).map(|i| (i % 256) as u8).collect();
    for dribble in [1, 2, 5, 31, 32, 33, 285] {
        let link = ReplayLink::new();
        link.set_dribble(dribble);
        link.push_input(&data);
        let mut transport = Transport::new(link, Duration::from_millis(1));

        let received = transport.receive(285, Duration::from_secs(2)).unwrap();
        assert_eq!(received, data, "dribble of {} bytes", dribble);
    }
}

#[test]
fn receive_with_silent_link_times_out_on_schedule() {
    let backoff = Duration::from_millis(5);
    let timeout = Duration::from_millis(60);
    let mut transport = Transport::new(ReplayLink::new(), backoff);

    let start = Instant::now();
    let result = transport.receive(285, timeout);
    let elapsed = start.elapsed();

    assert!(matches!(
        result,
        Err(TbanError::ReceiveTimeout {
            expected: 285,
            received: 0
        })
    ));
    assert!(elapsed >= timeout);
    // one backoff interval, plus scheduling slack
    assert!(elapsed < timeout + backoff + Duration::from_millis(100));
}

#[test]
fn query_then_get_matches_every_byte() {
    let dir = tempfile::tempdir().unwrap();
    let link = ReplayLink::new();
    link.set_answer([0x05, 0x36], injected_base());
    let mut tban = open_handle(&dir, &link);

    tban.query(Variant::Base).unwrap();
    let expected = injected_base();
    for (index, byte) in expected.iter().enumerate() {
        assert_eq!(tban.get(Variant::Base, index).unwrap(), *byte);
    }
    assert!(tban.present(Variant::Base));
    assert_eq!(tban.get(Variant::Base, 4).unwrap(), expected[4]);
}

#[test]
fn corrupt_query_never_overwrites_cache() {
    let dir = tempfile::tempdir().unwrap();
    let link = ReplayLink::new();
    let good = injected_base();
    let mut bad = vec![0xEE; 285];
    bad[0] = 42;
    link.queue_response(good.clone());
    link.queue_response(bad);
    let mut tban = open_handle(&dir, &link);

    tban.query(Variant::Base).unwrap();
    assert!(matches!(
        tban.query(Variant::Base),
        Err(TbanError::CorruptData(Variant::Base))
    ));
    assert_eq!(tban.get(Variant::Base, 10).unwrap(), good[10]);
    assert_eq!(tban.read(&CH_PWM, 0).unwrap(), u32::from(good[137]) * 2);
}

#[test]
fn mini_sentinels_are_each_required() {
    let dir = tempfile::tempdir().unwrap();
    let link = ReplayLink::new();
    link.queue_response(injected_mini());
    let mut tban = open_handle(&dir, &link);

    tban.query(Variant::Mini).unwrap();
    assert!(tban.present(Variant::Mini));
    assert_eq!(tban.read(&MINI_RPM, 1).unwrap(), 95);

    for index in [0, 1, 62] {
        let mut broken = injected_mini();
        broken[index] = broken[index].wrapping_add(1);
        link.queue_response(broken);
        assert!(
            matches!(
                tban.query(Variant::Mini),
                Err(TbanError::CorruptData(Variant::Mini))
            ),
            "byte {} must be checked",
            index
        );
    }
    assert_eq!(tban.read(&MINI_RPM, 0).unwrap(), 120);
}

#[test]
fn firmware_gate_boundary() {
    let mut base = injected_base();
    base[273] = 0x28;
    assert!(check_firmware_at_least(&base, 28).is_ok());
    assert!(matches!(
        check_firmware_at_least(&base, 29),
        Err(TbanError::FirmwareTooOld {
            required: 29,
            actual: 28
        })
    ));
}

#[test]
fn lock_is_exclusive_until_released() {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("xban.lock");

    let mut first = ExclusiveLock::new(&path, Duration::ZERO);
    first.acquire().unwrap();
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        std::process::id().to_string()
    );

    let mut second = ExclusiveLock::new(&path, Duration::from_millis(30))
        .with_retry_interval(Duration::from_millis(10));
    assert!(matches!(
        second.acquire(),
        Err(TbanError::AlreadyInUse { .. })
    ));

    first.release().unwrap();
    second.acquire().unwrap();
    assert!(second.is_held());
}

#[test]
fn lock_held_by_other_live_process_is_respected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("xban.lock");
    // pid 1 always exists; without privileges the probe reports EPERM
    std::fs::write(&path, "1").unwrap();

    let mut lock = ExclusiveLock::new(&path, Duration::from_millis(20))
        .with_retry_interval(Duration::from_millis(5));
    match lock.acquire() {
        Err(TbanError::AlreadyInUse { pid, .. }) => assert_eq!(pid, Some(1)),
        other => panic!("Expected AlreadyInUse, got {:?}", other),
    }
}

#[test]
fn abandoned_lock_is_reclaimed_without_waiting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("xban.lock");
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let dead = child.id();
    child.wait().unwrap();
    std::fs::write(&path, dead.to_string()).unwrap();

    let mut lock = ExclusiveLock::new(&path, Duration::from_secs(10));
    let start = Instant::now();
    lock.acquire().unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn second_handle_cannot_open_while_first_is_open() {
    let dir = tempfile::tempdir().unwrap();
    let link = ReplayLink::new();
    let mut first = open_handle(&dir, &link);

    let handle = link.clone();
    let mut second =
        Tban::with_connector(&test_config(&dir), move |_| Ok(handle.clone())).unwrap();
    assert!(matches!(
        second.open(),
        Err(TbanError::AlreadyInUse { .. })
    ));

    first.close().unwrap();
    second.open().unwrap();
}

#[test]
fn offline_snapshot_serves_register_reads() {
    let dir = tempfile::tempdir().unwrap();
    let mut base = injected_base();
    base[238] = 45;
    let link = ReplayLink::from_captures(base, None);
    let mut tban = open_handle(&dir, &link);

    tban.query(Variant::Base).unwrap();
    assert_eq!(tban.read(&DS_TEMP, 0).unwrap(), 45);
    assert!(tban.last_query().is_some());
}
