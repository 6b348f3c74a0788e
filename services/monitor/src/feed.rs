//! JSON-lines feed ingestion.
//!
//! The feed is a file of [`FeedRecord`] lines. The reader keeps a byte
//! position so that a followed file is only read from where it left off, and
//! a trailing line without a newline is left for the next poll.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use offwatch_events::FeedRecord;
use offwatch_store::InMemoryOffsetStore;
use thiserror::Error;
use tokio::{sync::watch, task::JoinError};
use tracing::{debug, error, info, warn};

/// Errors reading the feed file.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read feed {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("feed read task failed: {0}")]
    Task(#[from] JoinError),
}

/// Outcome of one read pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Records applied to the store without error.
    pub applied: usize,
    /// Lines that did not parse.
    pub skipped: usize,
    /// Records whose store dispatch returned a hook error.
    pub failed: usize,
}

impl FeedStats {
    pub fn is_empty(&self) -> bool {
        self.applied == 0 && self.skipped == 0 && self.failed == 0
    }

    fn absorb(&mut self, other: FeedStats) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Incremental reader over a JSON-lines feed.
#[derive(Debug)]
pub struct FeedReader {
    path: PathBuf,
    position: u64,
    line_no: u64,
}

impl FeedReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            position: 0,
            line_no: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset just past the last complete line consumed.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Apply every complete line appended since the last call.
    ///
    /// A missing file reads as empty. A file shorter than the current
    /// position is treated as truncated and read again from the start.
    pub fn read_available(&mut self, store: &InMemoryOffsetStore) -> Result<FeedStats, FeedError> {
        let chunk = match self.read_chunk() {
            Ok(chunk) => chunk,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FeedStats::default()),
            Err(source) => {
                return Err(FeedError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let Some(end) = chunk.iter().rposition(|b| *b == b'\n') else {
            return Ok(FeedStats::default());
        };
        let complete = &chunk[..=end];
        self.position += complete.len() as u64;

        let mut stats = FeedStats::default();
        for raw in complete.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
            self.line_no += 1;
            stats.absorb(self.apply_line(store, raw));
        }
        Ok(stats)
    }

    fn read_chunk(&mut self) -> io::Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len < self.position {
            warn!(
                path = %self.path.display(),
                position = self.position,
                len,
                "Feed shrank; reading from the start"
            );
            self.position = 0;
            self.line_no = 0;
        }

        file.seek(SeekFrom::Start(self.position))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn apply_line(&self, store: &InMemoryOffsetStore, raw: &[u8]) -> FeedStats {
        let mut stats = FeedStats::default();

        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                warn!(line = self.line_no, error = %e, "Feed line is not UTF-8; skipping");
                stats.skipped = 1;
                return stats;
            }
        };

        let record = match FeedRecord::parse_line(line) {
            Ok(Some(record)) => record,
            Ok(None) => return stats,
            Err(e) => {
                warn!(line = self.line_no, error = %e, "Malformed feed line; skipping");
                stats.skipped = 1;
                return stats;
            }
        };

        match store.apply(&record.event) {
            Ok(()) => stats.applied = 1,
            Err(e) => {
                error!(
                    line = self.line_no,
                    event_type = record.event.event_type(),
                    topic_partition = %record.event.topic_partition(),
                    error = %e,
                    "Plugin hook failed while applying feed record"
                );
                stats.failed = 1;
            }
        }
        stats
    }
}

/// Run one read pass on the blocking pool.
///
/// Reading the file and the hooks the store invokes (file writes in the
/// event log plugin) are blocking, so they stay off the runtime's workers.
pub async fn read_blocking(
    mut reader: FeedReader,
    store: Arc<InMemoryOffsetStore>,
) -> Result<(FeedReader, FeedStats), FeedError> {
    tokio::task::spawn_blocking(move || -> Result<_, FeedError> {
        let stats = reader.read_available(&store)?;
        Ok((reader, stats))
    })
    .await?
}

/// Tail the feed until shutdown is signalled.
pub async fn run_follow_loop(
    mut reader: FeedReader,
    store: Arc<InMemoryOffsetStore>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<FeedStats, FeedError> {
    let mut total = FeedStats::default();
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        path = %reader.path().display(),
        position = reader.position(),
        poll_interval_ms = poll_interval.as_millis() as u64,
        "Following feed"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (next, stats) = read_blocking(reader, Arc::clone(&store)).await?;
                reader = next;
                if !stats.is_empty() {
                    debug!(
                        applied = stats.applied,
                        skipped = stats.skipped,
                        failed = stats.failed,
                        "Feed poll"
                    );
                }
                total.absorb(stats);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(
                        applied = total.applied,
                        skipped = total.skipped,
                        failed = total.failed,
                        "Feed follower shutting down"
                    );
                    return Ok(total);
                }
            }
        }
    }
}
