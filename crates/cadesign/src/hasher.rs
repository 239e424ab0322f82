//! # Chunked Hasher
//!
//! Streams a source through an incremental hash accumulator in fixed-size
//! windows, so a file of any size is hashed without being held in memory.
//!
//! ## Invariants
//!
//! - Windows are visited in order `0..ceil(len / window_size)`; window `i`
//!   covers `[i * w, min((i + 1) * w, len))`.
//! - The update for window `i` completes before window `i + 1` is read.
//! - Progress is reported after each update and is non-decreasing; `percent()`
//!   rounds down, so 100 is reported exactly once, for the last window.
//! - A zero-length source has no windows and reports no progress, but the
//!   accumulator still receives one empty update so its digest is defined.
//! - Any failure aborts the pass. There is no resume; a retry starts at window 0
//!   with a fresh accumulator.

use async_trait::async_trait;
use tracing::debug;
use tracing::trace;

use crate::error::Result;
use crate::source::ChunkSource;

/// Window size used when none is configured: 3 MiB.
pub const DEFAULT_WINDOW_SIZE: usize = 3 * 1024 * 1024;

/// Something that digests data fed to it in order.
#[async_trait]
pub trait HashAccumulator: Send {
    async fn update(&mut self, window: &[u8]) -> Result<()>;
}

/// Number of windows needed to cover `len` bytes.
pub fn window_count(len: u64, window_size: usize) -> u64 {
    len.div_ceil(window_size.max(1) as u64)
}

/// How far a hashing pass has come.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Windows completed so far.
    pub window: u64,
    pub total: u64,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.window.min(self.total) * 100 / self.total) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.window >= self.total
    }
}

/// A step of a hashing pass, reported as it happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashEvent {
    /// About to read window `i`.
    Reading(u64),
    /// Window `i` is read and being fed to the accumulator.
    Hashing(u64),
    /// Window `progress.window - 1` has been digested.
    Progress(Progress),
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkedHasher {
    window_size: usize,
}

impl Default for ChunkedHasher {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl ChunkedHasher {
    /// A zero window size is treated as one byte.
    pub fn new(window_size: usize) -> Self {
        Self { window_size: window_size.max(1) }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Runs a full pass. Returns the number of windows processed.
    ///
    /// `on_event` may veto the pass by returning an error.
    pub async fn run<S, A, F>(&self, source: &mut S, accumulator: &mut A, mut on_event: F) -> Result<u64>
    where
        S: ChunkSource + ?Sized,
        A: HashAccumulator + ?Sized,
        F: FnMut(HashEvent) -> Result<()>,
    {
        let len = source.len();
        let total = window_count(len, self.window_size);
        debug!(len, window_size = self.window_size, total, "starting hash pass");

        if total == 0 {
            accumulator.update(&[]).await?;
            return Ok(0);
        }

        for i in 0..total {
            let offset = i * self.window_size as u64;
            let size = (len - offset).min(self.window_size as u64) as usize;

            on_event(HashEvent::Reading(i))?;
            let window = source.read_window(offset, size).await?;

            on_event(HashEvent::Hashing(i))?;
            accumulator.update(&window).await?;
            trace!(window = i, offset, size, "window hashed");

            on_event(HashEvent::Progress(Progress { window: i + 1, total }))?;
        }

        debug!(total, "hash pass complete");
        Ok(total)
    }
}
