#![forbid(unsafe_code)]

//! Dirty tracking, edit batching and autosave scheduling.
//!
//! Every edit bumps a generation counter. A save records the generation it
//! snapshotted; when it completes the session is clean only if no edit
//! landed in between.
//!
//! Batches nest. While any batch is open the level is mid-edit and no
//! autosave is due.

use std::time::{Duration, Instant};

const TARGET: &str = "blb.session";

#[derive(Debug, Clone)]
pub struct EditSession {
    generation: u64,
    saved_generation: u64,
    batch_depth: u32,
    interval: Duration,
    last_save: Instant,
}

impl EditSession {
    #[must_use]
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            generation: 0,
            saved_generation: 0,
            batch_depth: 0,
            interval,
            last_save: now,
        }
    }

    /// Record one edit to the live grid.
    pub fn mark_dirty(&mut self) {
        self.generation += 1;
    }

    /// Generation to hand to [`mark_saved`](Self::mark_saved) once the
    /// snapshot taken now has been written.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.generation != self.saved_generation
    }

    /// A save of the state at `generation` finished at `now`.
    pub fn mark_saved(&mut self, generation: u64, now: Instant) {
        self.saved_generation = self.saved_generation.max(generation.min(self.generation));
        self.last_save = now;
    }

    /// Reset after loading a different file or version.
    pub fn reset(&mut self, now: Instant) {
        self.saved_generation = self.generation;
        self.batch_depth = 0;
        self.last_save = now;
    }

    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Close the innermost batch. Closing a batch that was never opened is
    /// logged and otherwise ignored.
    pub fn end_batch(&mut self) {
        if self.batch_depth == 0 {
            tracing::error!(target: TARGET, "end_batch called without a matching begin_batch");
            return;
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.mark_dirty();
        }
    }

    #[must_use]
    pub fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    /// Dirty, outside any batch, and the interval has elapsed since the
    /// last save.
    #[must_use]
    pub fn autosave_due(&self, now: Instant) -> bool {
        self.is_dirty()
            && !self.in_batch()
            && now.saturating_duration_since(self.last_save) >= self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn clean_session_is_never_due() {
        let t0 = Instant::now();
        let session = EditSession::new(MINUTE, t0);
        assert!(!session.autosave_due(t0 + 10 * MINUTE));
    }

    #[test]
    fn due_after_interval_when_dirty() {
        let t0 = Instant::now();
        let mut session = EditSession::new(MINUTE, t0);
        session.mark_dirty();
        assert!(!session.autosave_due(t0 + Duration::from_secs(30)));
        assert!(session.autosave_due(t0 + MINUTE));
    }

    #[test]
    fn open_batch_defers_autosave() {
        let t0 = Instant::now();
        let mut session = EditSession::new(MINUTE, t0);
        session.mark_dirty();
        session.begin_batch();
        session.begin_batch();
        assert!(!session.autosave_due(t0 + 2 * MINUTE));
        session.end_batch();
        assert!(session.in_batch());
        session.end_batch();
        assert!(session.autosave_due(t0 + 2 * MINUTE));
    }

    #[test]
    fn unmatched_end_batch_is_ignored() {
        let t0 = Instant::now();
        let mut session = EditSession::new(MINUTE, t0);
        session.end_batch();
        assert!(!session.in_batch());
        session.begin_batch();
        assert!(session.in_batch());
    }

    #[test]
    fn edits_during_save_keep_session_dirty() {
        let t0 = Instant::now();
        let mut session = EditSession::new(MINUTE, t0);
        session.mark_dirty();
        let snapshot = session.generation();
        session.mark_dirty();
        session.mark_saved(snapshot, t0 + MINUTE);
        assert!(session.is_dirty());

        session.mark_saved(session.generation(), t0 + MINUTE);
        assert!(!session.is_dirty());
    }

    #[test]
    fn late_completion_never_regresses() {
        let t0 = Instant::now();
        let mut session = EditSession::new(MINUTE, t0);
        session.mark_dirty();
        session.mark_dirty();
        session.mark_saved(2, t0);
        session.mark_saved(1, t0);
        assert!(!session.is_dirty());
    }
}
