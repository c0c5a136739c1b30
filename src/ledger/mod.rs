//! On-disk ledger file: a JSON [`LedgerSnapshot`] guarded by a lock file.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use eyre::WrapErr;
use fs2::FileExt;
use referral_core::{LedgerSnapshot, MemoryStore, ReferralError};

const LOCK_POLL: Duration = Duration::from_millis(20);

/// Exclusive handle on a ledger file for the lifetime of one command.
#[derive(Debug)]
pub struct LedgerFile {
    path: PathBuf,
    _lock: FileLock,
}

impl LedgerFile {
    pub fn open(path: &Path, lock_timeout: Duration) -> eyre::Result<Self> {
        let lock = FileLock::acquire(sibling(path, "lock"), lock_timeout)?;
        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored ledger, or an empty one if the file does not exist yet.
    pub fn load(&self) -> eyre::Result<MemoryStore> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "starting a new ledger");
                return Ok(MemoryStore::new());
            }
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("read {}", self.path.display()))
            }
        };
        let snapshot: LedgerSnapshot = serde_json::from_slice(&bytes)
            .wrap_err_with(|| format!("parse {}", self.path.display()))?;
        let store = MemoryStore::from_snapshot(snapshot)?;
        Ok(store)
    }

    /// Write the ledger through a temporary sibling and rename it into place.
    pub fn save(&self, store: &MemoryStore) -> eyre::Result<()> {
        let snapshot = store.snapshot()?;
        let json = serde_json::to_vec_pretty(&snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = sibling(&self.path, "tmp");
        {
            let mut file = fs::File::create(&tmp)
                .wrap_err_with(|| format!("create {}", tmp.display()))?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
            .wrap_err_with(|| format!("replace {}", self.path.display()))?;
        tracing::debug!(
            path = %self.path.display(),
            height = snapshot.meta.height,
            root = %snapshot.state_root,
            "ledger saved"
        );
        Ok(())
    }
}

/// Advisory lock on `<ledger>.lock`. The file itself is left in place; the
/// kernel drops the lock when the handle closes, including on a crash.
#[derive(Debug)]
struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    fn acquire(path: PathBuf, timeout: Duration) -> eyre::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .wrap_err_with(|| format!("open {}", path.display()))?;

        let deadline = Instant::now() + timeout;
        let mut warned = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(err) if is_contended(&err) => {
                    if Instant::now() >= deadline {
                        return Err(ReferralError::TransientConflict(format!(
                            "ledger is locked by another process ({})",
                            path.display()
                        ))
                        .into());
                    }
                    if !warned {
                        tracing::warn!(lock = %path.display(), "waiting for ledger lock");
                        warned = true;
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(err) => return Err(err).wrap_err_with(|| format!("lock {}", path.display())),
            }
        }

        // Informational only: whoever holds the lock, not the content, decides.
        let mut holder = &file;
        let _ = holder
            .set_len(0)
            .and_then(|()| writeln!(holder, "{}", std::process::id()));
        Ok(Self { file, path })
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.path.display(), %err, "failed to release ledger lock");
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
