use crate::resolver::TickerResolution;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{task::JoinHandle, time::Instant};

/// Identity key to resolution store consulted before any resolver runs.
#[async_trait]
pub trait TickerCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<TickerResolution>;

    /// Stores `value` under `key`, replacing whatever was there.
    async fn set(&self, key: &str, value: TickerResolution);
}

#[derive(Debug, Default)]
pub struct MemoryTickerCache {
    entries: Mutex<HashMap<String, TickerResolution>>,
}

impl MemoryTickerCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TickerCache for MemoryTickerCache {
    async fn get(&self, key: &str) -> Option<TickerResolution> {
        self.entries.lock().get(key).cloned()
    }

    async fn set(&self, key: &str, value: TickerResolution) {
        self.entries.lock().insert(key.to_owned(), value);
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("error accessing cache file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error encoding cache file {}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Copy, Clone)]
pub struct CacheConfig {
    /// Quiet period after the last `set` before the table is written.
    pub debounce: Duration,
    /// Upper bound on how long a write can be postponed by a stream of `set`s.
    pub max_wait: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            max_wait: Duration::from_secs(5),
        }
    }
}

struct PendingFlush {
    generation: u64,
    first_scheduled: Instant,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Schedule {
    generation: u64,
    pending: Option<PendingFlush>,
}

struct Shared {
    path: PathBuf,
    entries: Mutex<HashMap<String, TickerResolution>>,
    schedule: Mutex<Schedule>,
    write_lock: tokio::sync::Mutex<()>,
}

impl Shared {
    async fn persist(&self) -> Result<(), CacheError> {
        let _writing = self.write_lock.lock().await;
        let snapshot: BTreeMap<String, TickerResolution> = self
            .entries
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let json = serde_json::to_string_pretty(&snapshot).map_err(|source| CacheError::Json {
            path: self.path.clone(),
            source,
        })?;
        let io_error = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };
        let temporary = self.path.with_extension("json.tmp");
        tokio::fs::write(&temporary, json).await.map_err(io_error)?;
        tokio::fs::rename(&temporary, &self.path)
            .await
            .map_err(io_error)?;
        log::debug!("Wrote {} cached tickers to {}", snapshot.len(), self.path.display());
        Ok(())
    }
}

/// JSON file backed cache: `{"<identity key>": {"ticker": .., "currency": ..}}`.
///
/// The whole table is read at construction; a missing or corrupt file gives
/// an empty table. Writes are debounced on a background task, so owners must
/// call [`FileTickerCache::flush`] before exiting.
pub struct FileTickerCache {
    shared: Arc<Shared>,
    config: CacheConfig,
}

impl FileTickerCache {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, CacheConfig::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: CacheConfig) -> Self {
        let path = path.into();
        let entries = load(&path);
        Self {
            shared: Arc::new(Shared {
                path,
                entries: Mutex::new(entries),
                schedule: Mutex::new(Schedule::default()),
                write_lock: tokio::sync::Mutex::new(()),
            }),
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels any scheduled write and writes the table now.
    pub async fn flush(&self) -> Result<(), CacheError> {
        if let Some(pending) = self.shared.schedule.lock().pending.take() {
            pending.handle.abort();
        }
        self.shared.persist().await
    }

    /// Replaces the scheduled write, if any, with one `debounce` from now,
    /// without pushing it past `max_wait` from the first unflushed `set`.
    fn schedule_flush(&self) {
        let now = Instant::now();
        let mut schedule = self.shared.schedule.lock();
        schedule.generation += 1;
        let generation = schedule.generation;
        let first_scheduled = match schedule.pending.take() {
            Some(previous) => {
                previous.handle.abort();
                previous.first_scheduled
            }
            None => now,
        };
        let deadline = first_scheduled + self.config.max_wait;
        let fire_at = (now + self.config.debounce).min(deadline.max(now));

        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(fire_at).await;
            let still_current = {
                let mut schedule = shared.schedule.lock();
                let current = schedule
                    .pending
                    .as_ref()
                    .map_or(false, |pending| pending.generation == generation);
                if current {
                    schedule.pending = None;
                }
                current
            };
            if !still_current {
                return;
            }
            if let Err(error) = shared.persist().await {
                log::warn!("Failed to save ticker cache: {:#}", anyhow::Error::from(error));
            }
        });
        schedule.pending = Some(PendingFlush {
            generation,
            first_scheduled,
            handle,
        });
    }
}

fn load(path: &Path) -> HashMap<String, TickerResolution> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == ErrorKind::NotFound => return HashMap::new(),
        Err(error) => {
            log::warn!("Failed to load ticker cache from {}: {}", path.display(), error);
            return HashMap::new();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|error| {
        log::warn!("Failed to load ticker cache from {}: {}", path.display(), error);
        HashMap::new()
    })
}

#[async_trait]
impl TickerCache for FileTickerCache {
    async fn get(&self, key: &str) -> Option<TickerResolution> {
        self.shared.entries.lock().get(key).cloned()
    }

    async fn set(&self, key: &str, value: TickerResolution) {
        self.shared.entries.lock().insert(key.to_owned(), value);
        self.schedule_flush();
    }
}
