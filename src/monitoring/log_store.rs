//! Per-device activity log
//!
//! ```text
//! write(serial, ..)
//!    │
//!    ├─> buffers[serial]  (ring, newest 100)  ──rewrite──> <log_dir>/<serial>.log
//!    │
//!    └─> listeners[serial] ──try_send──> listener queue (10) ──> listen() callback
//! ```
//!
//! Buffers and listener queues live behind separate locks so that subscribe
//! and unsubscribe churn never holds up the writer. File rewrites are ordered
//! per serial and happen outside the buffer lock. Fan-out is non-blocking:
//! a full queue loses that event, a closed queue is pruned.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::MonitoringResult;
use crate::model::MonitoringLog;

/// Entries kept per serial, in memory and on disk
pub const MAX_LOG_LINES: usize = 100;

/// Capacity of each live listener queue
pub const LISTENER_CAPACITY: usize = 10;

type ListenerMap = HashMap<String, HashMap<u64, mpsc::Sender<MonitoringLog>>>;

pub struct ActivityLogStore {
    log_dir: PathBuf,
    buffers: RwLock<HashMap<String, VecDeque<MonitoringLog>>>,
    /// One lock per serial ordering its writes and file rewrites
    files: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    listeners: RwLock<ListenerMap>,
    next_listener_id: AtomicU64,
    shutdown: CancellationToken,
}

impl ActivityLogStore {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let log_dir = log_dir.into();
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            error!("failed to create log directory {}: {e}", log_dir.display());
        }

        Self {
            log_dir,
            buffers: RwLock::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            next_listener_id: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Append an event, mirror the buffer to disk and fan it out
    ///
    /// Writes for one serial are applied in order under that serial's file
    /// lock. The shared buffer map is only locked to append and snapshot, so
    /// disk I/O for one device never holds up another.
    ///
    /// File errors are reported through tracing only; the in-memory buffer and
    /// live listeners still receive the event.
    pub async fn write(&self, serial: &str, success: bool, message: impl Into<String>) {
        let log = MonitoringLog::new(serial, success, message);

        let file = self.file_lock(serial).await;
        let _file = file.lock().await;

        self.hydrate(serial).await;

        let snapshot: Vec<MonitoringLog> = {
            let mut buffers = self.buffers.write().await;
            let buffer = buffers.entry(serial.to_string()).or_default();
            buffer.push_back(log.clone());
            while buffer.len() > MAX_LOG_LINES {
                buffer.pop_front();
            }
            buffer.iter().cloned().collect()
        };

        if let Err(e) = self.rewrite_file(serial, &snapshot).await {
            error!(serial, "failed to write activity log file: {e}");
        }

        self.notify(serial, &log).await;
    }

    /// The newest `limit` entries in chronological order (`0` = all buffered)
    pub async fn get(&self, serial: &str, limit: usize) -> Vec<MonitoringLog> {
        self.hydrate(serial).await;

        self.buffers
            .read()
            .await
            .get(serial)
            .map(|buffer| tail(buffer, limit))
            .unwrap_or_default()
    }

    /// Drop the buffer for `serial` and truncate its file
    #[instrument(skip(self))]
    pub async fn clear(&self, serial: &str) -> MonitoringResult<()> {
        let file = self.file_lock(serial).await;
        let _file = file.lock().await;

        self.buffers
            .write()
            .await
            .insert(serial.to_string(), VecDeque::new());

        tokio::fs::create_dir_all(&self.log_dir).await?;
        tokio::fs::write(self.log_path(serial), b"").await?;

        info!("cleared activity log");
        Ok(())
    }

    /// Drop every buffer and delete every log file in the log directory
    pub async fn clear_all(&self) -> MonitoringResult<()> {
        let mut buffers = self.buffers.write().await;
        buffers.clear();

        let mut entries = match tokio::fs::read_dir(&self.log_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "log") {
                tokio::fs::remove_file(&path).await?;
            }
        }

        info!("cleared all activity logs");
        Ok(())
    }

    /// Stream the log of `serial` into `callback`
    ///
    /// The buffered tail is replayed first, then live events are delivered
    /// until `token` is cancelled, the store shuts down, or the callback
    /// returns an error (which is passed through).
    #[instrument(skip(self, token, callback))]
    pub async fn listen<F>(
        &self,
        token: CancellationToken,
        serial: &str,
        callback: F,
    ) -> anyhow::Result<()>
    where
        F: FnMut(MonitoringLog) -> anyhow::Result<()> + Send,
    {
        let (id, rx) = self.subscribe(serial).await;
        let result = self.deliver(token, serial, rx, callback).await;
        self.unsubscribe(serial, id).await;
        result
    }

    /// Replay the tail, then forward queued events
    ///
    /// The queue is subscribed before the replay, so its head may repeat
    /// entries the replay already delivered; those are skipped.
    async fn deliver<F>(
        &self,
        token: CancellationToken,
        serial: &str,
        mut rx: mpsc::Receiver<MonitoringLog>,
        mut callback: F,
    ) -> anyhow::Result<()>
    where
        F: FnMut(MonitoringLog) -> anyhow::Result<()> + Send,
    {
        let mut replayed = self.get(serial, MAX_LOG_LINES).await;
        for log in replayed.iter().cloned() {
            callback(log)?;
        }

        loop {
            let log = tokio::select! {
                _ = token.cancelled() => {
                    debug!("listener scope ended");
                    return Ok(());
                }
                _ = self.shutdown.cancelled() => {
                    debug!("log store shutting down");
                    return Ok(());
                }
                next = rx.recv() => match next {
                    Some(log) => log,
                    None => return Ok(()),
                },
            };

            if !replayed.is_empty() {
                if replayed.contains(&log) {
                    continue;
                }
                replayed.clear();
            }

            callback(log)?;
        }
    }

    /// Deliver `log` to every listener of its serial without blocking
    ///
    /// Fan-out runs under the read lock; closed queues found on the way are
    /// pruned afterwards under the write lock.
    pub async fn notify(&self, serial: &str, log: &MonitoringLog) {
        let closed: Vec<u64> = {
            let listeners = self.listeners.read().await;
            let Some(queues) = listeners.get(serial) else {
                return;
            };

            queues
                .iter()
                .filter_map(|(id, tx)| match tx.try_send(log.clone()) {
                    Ok(()) => None,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(serial, listener = id, "listener queue full, dropping event");
                        None
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => Some(*id),
                })
                .collect()
        };

        if closed.is_empty() {
            return;
        }

        let mut listeners = self.listeners.write().await;
        if let Some(queues) = listeners.get_mut(serial) {
            for id in &closed {
                queues.remove(id);
            }
            if queues.is_empty() {
                listeners.remove(serial);
            }
        }
        debug!(serial, pruned = closed.len(), "pruned closed listeners");
    }

    /// Close every listener and refuse to keep streaming
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.listeners.write().await.clear();
        debug!("activity log store shut down");
    }

    async fn subscribe(&self, serial: &str) -> (u64, mpsc::Receiver<MonitoringLog>) {
        let (tx, rx) = mpsc::channel(LISTENER_CAPACITY);
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);

        self.listeners
            .write()
            .await
            .entry(serial.to_string())
            .or_default()
            .insert(id, tx);

        (id, rx)
    }

    async fn unsubscribe(&self, serial: &str, id: u64) {
        let mut listeners = self.listeners.write().await;
        if let Some(queues) = listeners.get_mut(serial) {
            queues.remove(&id);
            if queues.is_empty() {
                listeners.remove(serial);
            }
        }
    }

    #[cfg(test)]
    async fn listener_count(&self, serial: &str) -> usize {
        self.listeners
            .read()
            .await
            .get(serial)
            .map_or(0, HashMap::len)
    }

    /// Hold the buffer map exclusively, stalling every write and read
    #[cfg(test)]
    pub(crate) async fn lock_buffers(
        &self,
    ) -> tokio::sync::RwLockWriteGuard<'_, HashMap<String, VecDeque<MonitoringLog>>> {
        self.buffers.write().await
    }

    async fn file_lock(&self, serial: &str) -> Arc<Mutex<()>> {
        self.files
            .lock()
            .await
            .entry(serial.to_string())
            .or_default()
            .clone()
    }

    /// Seed the buffer of `serial` from its file the first time it is touched
    async fn hydrate(&self, serial: &str) {
        if self.buffers.read().await.contains_key(serial) {
            return;
        }

        let hydrated = read_tail(&self.log_path(serial)).await;
        self.buffers
            .write()
            .await
            .entry(serial.to_string())
            .or_insert(hydrated);
    }

    fn log_path(&self, serial: &str) -> PathBuf {
        let file_name: String = serial
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.log_dir.join(format!("{file_name}.log"))
    }

    async fn rewrite_file(&self, serial: &str, buffer: &[MonitoringLog]) -> MonitoringResult<()> {
        let mut data = String::new();
        for log in buffer {
            data.push_str(&serde_json::to_string(log)?);
            data.push('\n');
        }

        tokio::fs::create_dir_all(&self.log_dir).await?;
        tokio::fs::write(self.log_path(serial), data).await?;
        Ok(())
    }
}

fn tail(buffer: &VecDeque<MonitoringLog>, limit: usize) -> Vec<MonitoringLog> {
    let skip = if limit == 0 {
        0
    } else {
        buffer.len().saturating_sub(limit)
    };
    buffer.iter().skip(skip).cloned().collect()
}

/// Load the newest entries of an existing log file, skipping unparsable lines
async fn read_tail(path: &Path) -> VecDeque<MonitoringLog> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return VecDeque::new(),
        Err(e) => {
            warn!("failed to read activity log {}: {e}", path.display());
            return VecDeque::new();
        }
    };

    let mut buffer = VecDeque::with_capacity(MAX_LOG_LINES);
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<MonitoringLog>(line) {
            Ok(log) => {
                buffer.push_back(log);
                if buffer.len() > MAX_LOG_LINES {
                    buffer.pop_front();
                }
            }
            Err(e) => warn!("skipping malformed activity log line: {e}"),
        }
    }
    buffer
}
