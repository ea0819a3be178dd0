//! Rolling in-memory history of the one tracked conversation.
//!
//! Append-only and mutex-guarded. Readers take a snapshot copy under the
//! lock and release it before any network call — no I/O ever happens while
//! the lock is held.

use doppel_core::message::Turn;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Ordered log of `(speaker, text)` turns. Cheap to clone — clones share
/// the same underlying log.
#[derive(Clone)]
pub struct History {
    turns: Arc<Mutex<Vec<Turn>>>,
    max_context_turns: usize,
}

impl History {
    /// Create an empty history whose snapshots are capped at
    /// `max_context_turns` trailing turns.
    pub fn new(max_context_turns: usize) -> Self {
        Self {
            turns: Arc::new(Mutex::new(Vec::new())),
            max_context_turns,
        }
    }

    /// Append one turn. Append order is chronological order.
    pub async fn append(&self, turn: Turn) {
        self.turns.lock().await.push(turn);
    }

    /// Append a synced batch of older turns, preserving their order.
    pub async fn seed(&self, batch: Vec<Turn>) {
        self.turns.lock().await.extend(batch);
    }

    /// Copy out the trailing window the generator is allowed to see.
    pub async fn snapshot(&self) -> Vec<Turn> {
        let turns = self.turns.lock().await;
        let start = turns.len().saturating_sub(self.max_context_turns);
        turns[start..].to_vec()
    }

    pub async fn len(&self) -> usize {
        self.turns.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.turns.lock().await.is_empty()
    }
}
