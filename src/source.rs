use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::model::Snapshot;

/// Upstream boundary: anything that can hand the engine a full, immutable
/// copy of every collection on demand. The engine never holds on to a
/// snapshot between invocations, so a source is free to replace the data
/// wholesale between fetches.
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self) -> Result<Snapshot>;
}

/// Snapshot source backed by a single JSON document holding the six
/// collections. Collections absent from the document default to empty.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotSource for JsonFileSource {
    fn fetch(&self) -> Result<Snapshot> {
        let raw = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Snapshot(format!("{}: {e}", self.path.display())))
    }
}

/// Re-delivers full snapshots through a watch channel whenever the source
/// content changes. Receivers always observe the latest complete snapshot;
/// intermediate ones they missed are simply superseded.
pub struct SnapshotWatcher<S> {
    source: S,
    interval: Duration,
}

impl<S: SnapshotSource + 'static> SnapshotWatcher<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Fetch the initial snapshot and return a receiver that updates on every
    /// observed change, plus the handle driving the poll loop. The loop ends
    /// when the last receiver is dropped.
    pub fn subscribe(self) -> Result<(watch::Receiver<Snapshot>, tokio::task::JoinHandle<()>)> {
        let initial = self.source.fetch()?;
        let mut last_serialized = serde_json::to_string(&initial).unwrap_or_default();
        let (tx, rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                match self.source.fetch() {
                    Ok(snapshot) => {
                        let serialized = serde_json::to_string(&snapshot).unwrap_or_default();
                        if serialized != last_serialized {
                            last_serialized = serialized;
                            if tx.send(snapshot).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        // Keep the previous snapshot live; a torn write will
                        // resolve on a later tick.
                        log::warn!("snapshot refresh failed: {e}");
                    }
                }
            }
        });

        Ok((rx, handle))
    }
}
