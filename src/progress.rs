//! Cooperative cancellation and progress/result streaming (§5, §6, §9).
//!
//! The optimiser models itself as a single task owning the worker pool
//! handle, communicating progress and best-so-far results over bounded
//! channels rather than through shared mutable state (§9 "coroutine/
//! event-loop control flow").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::types::NestResult;

/// A cheap-to-clone cooperative cancellation flag, checked (a) between
/// generations, (b) between sheets within placement, (c) between awaits
/// in the worker pool fan-out (§5).
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken { flag: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// `{generation?, placed_fraction ∈ [0,1]}` (§6).
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    pub generation: Option<u64>,
    pub placed_fraction: f64,
}

/// Terminal outcome of a run (§6), alongside the `TerminalState` tag
/// already carried by callers that only need the enum.
pub enum RunEvent {
    Progress(ProgressEvent),
    Result(NestResult),
}

/// Bounded sender/receiver pair for streaming progress and strictly-
/// improving results out of the engine (§9). `capacity` bounds the
/// channel so a slow consumer applies backpressure rather than letting
/// the engine race arbitrarily far ahead.
pub fn channel(capacity: usize) -> (Sender<RunEvent>, Receiver<RunEvent>) {
    crossbeam_channel::bounded(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_uncancelled_and_is_shared_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn channel_delivers_events_in_order() {
        let (tx, rx) = channel(4);
        tx.send(RunEvent::Progress(ProgressEvent { generation: Some(1), placed_fraction: 0.5 }))
            .unwrap();
        match rx.recv().unwrap() {
            RunEvent::Progress(p) => assert_eq!(p.generation, Some(1)),
            RunEvent::Result(_) => panic!("expected progress event"),
        }
    }
}
