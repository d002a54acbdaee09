//! Signal-triggered shutdown of the real binary

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

fn write_base_capture(dir: &tempfile::TempDir) -> PathBuf {
    let mut buf = vec![0u8; 285];
    buf[0] = 100;
    buf[272] = 0x10;
    buf[273] = 0x28;
    let text: Vec<String> = buf.iter().map(u8::to_string).collect();
    let path = dir.path().join("base.txt");
    std::fs::write(&path, text.join(" ")).unwrap();
    path
}

fn spawn(lock: &Path, base: &Path, args: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_tbanctl"))
        .arg("--no-config")
        .arg("--lock-file")
        .arg(lock)
        .arg("--fake-dev")
        .arg(base)
        .args(args)
        .env_remove("TBAN_DEVICE")
        .env_remove("TBAN_LOCKFILE")
        .env_remove("TBAN_LOCK_TIMEOUT")
        .env_remove("TBAN_RETRIES")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    done()
}

fn signal(child: &Child, signal: Signal) {
    kill(Pid::from_raw(child.id() as i32), signal).unwrap();
}

fn wait_exit(child: &mut Child) -> ExitStatus {
    let mut status = None;
    let exited = wait_until(Duration::from_secs(10), || {
        status = child.try_wait().unwrap();
        status.is_some()
    });
    if !exited {
        let _ = child.kill();
        panic!("tbanctl did not exit after the signal");
    }
    status.unwrap()
}

#[test]
fn test_sigint_during_monitor_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let lock = dir.path().join("tbanctl.lock");
    let base = write_base_capture(&dir);

    let mut child = spawn(&lock, &base, &["monitor", "--interval", "5"]);
    assert!(
        wait_until(Duration::from_secs(10), || lock.exists()),
        "tbanctl never took the lock"
    );
    std::thread::sleep(Duration::from_millis(200));

    signal(&child, Signal::SIGINT);
    let status = wait_exit(&mut child);

    assert_eq!(status.code(), Some(130));
    assert!(!lock.exists());
}

#[test]
fn test_sigterm_during_lock_wait_leaves_holder_alone() {
    let dir = tempfile::tempdir().unwrap();
    let lock = dir.path().join("tbanctl.lock");
    let base = write_base_capture(&dir);
    let holder = std::process::id().to_string();
    std::fs::write(&lock, &holder).unwrap();

    let mut child = spawn(&lock, &base, &["--lock-wait", "30", "status"]);
    std::thread::sleep(Duration::from_millis(500));

    let start = Instant::now();
    signal(&child, Signal::SIGTERM);
    let status = wait_exit(&mut child);

    assert_eq!(status.code(), Some(130));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(std::fs::read_to_string(&lock).unwrap(), holder);
}
