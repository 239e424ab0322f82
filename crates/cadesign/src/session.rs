//! # Signing Session
//!
//! A session tracks one file through hashing and signing. Its state machine:
//!
//! ```text
//! Idle -> ReadingChunk(0) -> Hashing(0) -> ReadingChunk(1) -> ... -> Hashing(n-1)
//!      -> Signing -> Signed -> [Verifying] -> Done
//! ```
//!
//! An empty input goes straight from `Idle` to `Signing`. Any non-terminal
//! state may move to `Failed`.
//!
//! ## Invariants
//!
//! - `Done` and `Failed` are terminal; no transition leaves them.
//! - Chunk indices advance by exactly one, and `Signing` follows the last
//!   window only.
//! - Observers see every accepted transition and every progress report, in order.

use std::sync::Arc;

use tracing::debug;
use tracing::info;

use crate::algorithm::DigestAlgorithm;
use crate::certificate::CertificateSelector;
use crate::error::Error;
use crate::error::Result;
use crate::hasher::HashEvent;
use crate::hasher::Progress;
use crate::hasher::window_count;

#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    ReadingChunk(u64),
    Hashing(u64),
    Signing,
    Signed,
    Verifying,
    Done,
    Failed(Error),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Whether a session over `total_windows` windows may move from `self` to `next`.
    pub fn allows(&self, next: &SessionState, total_windows: u64) -> bool {
        use SessionState::*;
        match (self, next) {
            (Done | Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Idle, ReadingChunk(0)) => total_windows > 0,
            (Idle, Signing) => total_windows == 0,
            (ReadingChunk(i), Hashing(j)) => i == j,
            (Hashing(i), ReadingChunk(j)) => *j == i + 1 && *j < total_windows,
            (Hashing(i), Signing) => i + 1 == total_windows,
            (Signing, Signed) => true,
            (Signed, Verifying) | (Signed, Done) => true,
            (Verifying, Done) => true,
            _ => false,
        }
    }

    /// First state after `Idle` for a session over `total_windows` windows.
    pub fn first(total_windows: u64) -> SessionState {
        if total_windows == 0 { SessionState::Signing } else { SessionState::ReadingChunk(0) }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ReadingChunk(i) => write!(f, "reading chunk {}", i),
            Self::Hashing(i) => write!(f, "hashing chunk {}", i),
            Self::Signing => write!(f, "signing"),
            Self::Signed => write!(f, "signed"),
            Self::Verifying => write!(f, "verifying"),
            Self::Done => write!(f, "done"),
            Self::Failed(e) => write!(f, "failed ({})", e),
        }
    }
}

/// Something reported by a session as it runs.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    State(SessionState),
    Progress(Progress),
}

/// Receives session events. Called synchronously from the signing task.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

impl<F> SessionObserver for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}

/// State of one signing run.
pub struct SigningSession {
    selector: CertificateSelector,
    window_size: usize,
    total_windows: u64,
    current_window: Option<u64>,
    algorithm: Option<DigestAlgorithm>,
    state: SessionState,
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl SigningSession {
    pub fn new(selector: CertificateSelector, window_size: usize, len: u64) -> Self {
        Self {
            selector,
            window_size: window_size.max(1),
            total_windows: window_count(len, window_size),
            current_window: None,
            algorithm: None,
            state: SessionState::Idle,
            observers: Vec::new(),
        }
    }

    pub fn observe(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn selector(&self) -> &CertificateSelector {
        &self.selector
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn total_windows(&self) -> u64 {
        self.total_windows
    }

    /// Index of the window being read or hashed, or the last one that was.
    pub fn current_window(&self) -> Option<u64> {
        self.current_window
    }

    pub fn algorithm(&self) -> Option<DigestAlgorithm> {
        self.algorithm
    }

    pub fn set_algorithm(&mut self, algorithm: DigestAlgorithm) {
        self.algorithm = Some(algorithm);
    }

    /// Moves to `next`, or rejects the transition.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.allows(&next, self.total_windows) {
            return Err(Error::InvalidState { from: self.state.to_string(), to: next.to_string() });
        }
        match &next {
            SessionState::ReadingChunk(i) | SessionState::Hashing(i) => {
                self.current_window = Some(*i);
                debug!(state = %next, "session transition");
            }
            SessionState::Failed(_) => {}
            _ => info!(state = %next, "session transition"),
        }
        self.state = next;
        self.emit(SessionEvent::State(self.state.clone()));
        Ok(())
    }

    /// Records a failure and hands the error back for propagation.
    ///
    /// A session that has already finished keeps its terminal state.
    pub fn fail(&mut self, error: Error) -> Error {
        if !self.state.is_terminal() {
            info!(error = %error, from = %self.state, "session failed");
            self.state = SessionState::Failed(error.clone());
            self.emit(SessionEvent::State(self.state.clone()));
        }
        error
    }

    pub fn report(&mut self, progress: Progress) {
        self.emit(SessionEvent::Progress(progress));
    }

    /// Applies one event from the chunked hasher.
    pub fn on_hash_event(&mut self, event: HashEvent) -> Result<()> {
        match event {
            HashEvent::Reading(i) => self.transition(SessionState::ReadingChunk(i)),
            HashEvent::Hashing(i) => self.transition(SessionState::Hashing(i)),
            HashEvent::Progress(progress) => {
                self.report(progress);
                Ok(())
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

impl std::fmt::Debug for SigningSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningSession")
            .field("selector", &self.selector)
            .field("window_size", &self.window_size)
            .field("total_windows", &self.total_windows)
            .field("current_window", &self.current_window)
            .field("algorithm", &self.algorithm)
            .field("state", &self.state)
            .finish()
    }
}
