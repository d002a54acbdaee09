//! Cooperative exclusive-access lock
//!
//! The lock is a file containing the decimal pid of its holder. Every tool
//! that talks to the controller takes it before opening the port, so two
//! processes never interleave frames on the same line.
//!
//! Reclaiming an abandoned lock is not atomic. The stale check, the removal
//! and the re-create are separate filesystem steps, so two processes
//! reclaiming the same lock at once can both end up believing they hold it:
//! B reads the dead pid, A removes and re-creates the file, then B removes
//! A's fresh file and creates its own. This race is accepted.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tban_core::{LockConfig, Result, TbanError};
use tracing::{debug, warn};

/// Pid-file lock with a bounded wait
#[derive(Debug)]
pub struct ExclusiveLock {
    path: PathBuf,
    timeout: Duration,
    retry_interval: Duration,
    interrupt: Option<Arc<AtomicBool>>,
    held: bool,
}

impl ExclusiveLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            retry_interval: Duration::from_secs(1),
            interrupt: None,
            held: false,
        }
    }

    pub fn from_config(config: &LockConfig) -> Self {
        Self::new(config.path.clone(), config.timeout()).with_retry_interval(config.retry_interval())
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Point the lock at another file; refused while the lock is held
    pub fn configure(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        if self.held {
            return Err(TbanError::LockFileChangeNotAllowed);
        }
        self.path = path.into();
        Ok(())
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Give up waiting for a live holder once `flag` is raised
    pub fn set_interrupt(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = Some(flag);
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Take the lock, waiting up to the configured timeout for a live holder
    pub fn acquire(&mut self) -> Result<()> {
        if self.held {
            return Ok(());
        }

        let start = Instant::now();
        let pid = std::process::id();

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
            {
                Ok(mut file) => {
                    if let Err(source) = write!(file, "{}", pid) {
                        let _ = fs::remove_file(&self.path);
                        return Err(TbanError::CannotCreateLockFile {
                            path: self.path.clone(),
                            source,
                        });
                    }
                    self.held = true;
                    debug!("Acquired lock {} for pid {}", self.path.display(), pid);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let owner = read_owner(&self.path);

                    if let Some(owner) = owner {
                        if !process_alive(owner) {
                            warn!(
                                "Removing stale lock {} left by pid {}",
                                self.path.display(),
                                owner
                            );
                            match fs::remove_file(&self.path) {
                                Ok(()) => continue,
                                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                                Err(source) => {
                                    return Err(TbanError::CannotDeleteLockFile {
                                        path: self.path.clone(),
                                        source,
                                    })
                                }
                            }
                        }
                    }

                    if self.interrupted() {
                        return Err(TbanError::Interrupted);
                    }
                    let elapsed = start.elapsed();
                    if elapsed >= self.timeout {
                        return Err(TbanError::AlreadyInUse {
                            path: self.path.clone(),
                            pid: owner,
                        });
                    }
                    debug!(
                        "Lock {} held by {:?}, retrying",
                        self.path.display(),
                        owner
                    );
                    std::thread::sleep(self.retry_interval.min(self.timeout - elapsed));
                }
                Err(source) => {
                    return Err(TbanError::CannotCreateLockFile {
                        path: self.path.clone(),
                        source,
                    })
                }
            }
        }
    }

    /// Delete the lock file
    pub fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        fs::remove_file(&self.path).map_err(|source| TbanError::CannotDeleteLockFile {
            path: self.path.clone(),
            source,
        })?;
        self.held = false;
        debug!("Released lock {}", self.path.display());
        Ok(())
    }
}

impl Drop for ExclusiveLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release lock on drop: {}", e);
        }
    }
}

/// Pid recorded in the lock file, `None` when unreadable
fn read_owner(path: &Path) -> Option<u32> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|&pid| pid > 0)
}

/// Whether `pid` may still be running. Only a definite "no such process"
/// counts as dead.
pub fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return true;
    };
    !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn test_acquire_writes_pid_and_release_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xban.lock");
        let mut lock = ExclusiveLock::new(&path, Duration::from_secs(1));

        lock.acquire().unwrap();
        assert!(lock.is_held());
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, std::process::id().to_string());

        lock.release().unwrap();
        assert!(!lock.is_held());
        assert!(!path.exists());
    }

    #[test]
    fn test_live_holder_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xban.lock");
        fs::write(&path, std::process::id().to_string()).unwrap();

        let mut lock = ExclusiveLock::new(&path, Duration::from_millis(50))
            .with_retry_interval(Duration::from_millis(10));
        let start = Instant::now();
        match lock.acquire() {
            Err(TbanError::AlreadyInUse { pid, .. }) => {
                assert_eq!(pid, Some(std::process::id()));
            }
            other => panic!("Expected AlreadyInUse, got {:?}", other),
        }
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(path.exists());
    }

    #[test]
    fn test_interrupt_stops_the_wait() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xban.lock");
        fs::write(&path, std::process::id().to_string()).unwrap();

        let flag = Arc::new(AtomicBool::new(true));
        let mut lock = ExclusiveLock::new(&path, Duration::from_secs(30))
            .with_retry_interval(Duration::from_millis(10));
        lock.set_interrupt(flag);
        let start = Instant::now();
        assert!(matches!(lock.acquire(), Err(TbanError::Interrupted)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!lock.is_held());
        assert!(path.exists());
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xban.lock");
        fs::write(&path, dead_pid().to_string()).unwrap();

        let mut lock = ExclusiveLock::new(&path, Duration::from_secs(5));
        let start = Instant::now();
        lock.acquire().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_unreadable_lock_counts_as_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xban.lock");
        fs::write(&path, "not a pid").unwrap();

        let mut lock = ExclusiveLock::new(&path, Duration::ZERO);
        assert!(matches!(
            lock.acquire(),
            Err(TbanError::AlreadyInUse { pid: None, .. })
        ));
    }

    #[test]
    fn test_configure_refused_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = ExclusiveLock::new(dir.path().join("a.lock"), Duration::ZERO);
        lock.configure(dir.path().join("b.lock")).unwrap();
        lock.acquire().unwrap();
        assert!(matches!(
            lock.configure(dir.path().join("c.lock")),
            Err(TbanError::LockFileChangeNotAllowed)
        ));
        assert_eq!(lock.path(), dir.path().join("b.lock"));
    }

    #[test]
    fn test_drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xban.lock");
        {
            let mut lock = ExclusiveLock::new(&path, Duration::ZERO);
            lock.acquire().unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_release_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xban.lock");
        let mut lock = ExclusiveLock::new(&path, Duration::ZERO);
        lock.acquire().unwrap();
        fs::remove_file(&path).unwrap();
        assert!(matches!(
            lock.release(),
            Err(TbanError::CannotDeleteLockFile { .. })
        ));
    }

    #[test]
    fn test_process_alive() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(dead_pid()));
        assert!(process_alive(u32::MAX));
    }
}
