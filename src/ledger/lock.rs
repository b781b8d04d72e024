use super::{LockMode, LockTimeoutBehavior};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, StoreError};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

const SPIN_INTERVAL: Duration = Duration::from_millis(10);

/// Cooperative cross-process lock: a sentinel file created with
/// exclusive-create semantics and removed when the guard drops.
///
/// Each sentinel carries a unique owner token. Removal (release or stale
/// break) first renames the sentinel aside and only deletes it when the token
/// is the one the caller expected; otherwise it is linked back in place.
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    mode: LockMode,
    timeout: Duration,
    stale_after: Option<Duration>,
    on_timeout: LockTimeoutBehavior,
}

/// Held lock. Dropping it releases the sentinel.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LockGuard {
    held: Option<(PathBuf, String)>,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>, config: &LedgerConfig) -> Self {
        Self {
            path: path.into(),
            mode: config.lock_mode,
            timeout: Duration::from_millis(config.lock_timeout_ms),
            stale_after: (config.stale_lock_secs > 0)
                .then(|| Duration::from_secs(config.stale_lock_secs)),
            on_timeout: config.on_lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Spin until the sentinel is ours or the deadline passes.
    pub fn acquire(&self) -> Result<LockGuard, LedgerError> {
        if self.mode == LockMode::None {
            return Ok(LockGuard { held: None });
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let token = format!("{} {}", std::process::id(), Uuid::new_v4());
        let started = Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
            {
                Ok(mut file) => {
                    file.write_all(token.as_bytes())
                        .and_then(|()| file.sync_data())
                        .map_err(|e| StoreError::io(&self.path, e))?;
                    return Ok(LockGuard {
                        held: Some((self.path.clone(), token)),
                    });
                }
                Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                    if self.break_if_stale() {
                        continue;
                    }
                }
                Err(error) => return Err(StoreError::io(&self.path, error).into()),
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                let waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
                return match self.on_timeout {
                    LockTimeoutBehavior::Fail => Err(LedgerError::LockTimeout {
                        path: self.path.display().to_string(),
                        waited_ms,
                    }),
                    LockTimeoutBehavior::Proceed => {
                        tracing::warn!(
                            path = %self.path.display(),
                            waited_ms,
                            "lock contended past deadline; proceeding unlocked"
                        );
                        Ok(LockGuard { held: None })
                    }
                };
            }
            std::thread::sleep(SPIN_INTERVAL);
        }
    }

    fn break_if_stale(&self) -> bool {
        let Some(stale_after) = self.stale_after else {
            return false;
        };
        let age = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());
        let Some(age) = age.filter(|age| *age > stale_after) else {
            return false;
        };
        let Ok(observed) = fs::read_to_string(&self.path) else {
            return false;
        };
        tracing::warn!(
            path = %self.path.display(),
            age_secs = age.as_secs(),
            "removing stale lock sentinel"
        );
        self.break_stale(&observed)
    }

    /// Remove the sentinel only if it still carries `observed`.
    fn break_stale(&self, observed: &str) -> bool {
        remove_if_owned(&self.path, observed)
    }
}

static ASIDE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Rename `path` aside, then delete it when its token is `expected`.
/// A sentinel that turns out to belong to someone else is linked back.
fn remove_if_owned(path: &Path, expected: &str) -> bool {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    let seq = ASIDE_SEQ.fetch_add(1, Ordering::Relaxed);
    name.push(format!(".{}.{seq}.aside", std::process::id()));
    let aside = path.with_file_name(name);

    if fs::rename(path, &aside).is_err() {
        return false;
    }
    let owned = fs::read_to_string(&aside).is_ok_and(|token| token == expected);
    if !owned
        && let Err(error) = fs::hard_link(&aside, path)
    {
        tracing::warn!(path = %path.display(), %error, "could not restore lock sentinel");
    }
    let _ = fs::remove_file(&aside);
    owned
}

impl LockGuard {
    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some((path, token)) = self.held.take()
            && path.exists()
            && !remove_if_owned(&path, &token)
        {
            tracing::warn!(path = %path.display(), "lock sentinel was taken over; left in place");
        }
    }
}
