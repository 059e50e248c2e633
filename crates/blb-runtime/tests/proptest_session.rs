#![forbid(unsafe_code)]

//! Property tests for the owning-thread plumbing.
//!
//! # Invariants tested
//!
//! 1. **Dispatcher FIFO**: callbacks run in enqueue order, across threads
//!    that each enqueue in order, and a drain empties the queue.
//! 2. **Dirty tracking**: a session is clean exactly when the newest
//!    completed save covered the newest edit.
//! 3. **Batches**: no autosave is due while a batch is open, and unmatched
//!    `end_batch` calls never underflow the depth.

use std::thread;
use std::time::{Duration, Instant};

use blb_runtime::{EditSession, MainThreadDispatcher};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum SessionOp {
    Edit,
    Snapshot,
    Complete,
    Begin,
    End,
}

fn session_op() -> impl Strategy<Value = SessionOp> {
    prop_oneof![
        3 => Just(SessionOp::Edit),
        1 => Just(SessionOp::Snapshot),
        1 => Just(SessionOp::Complete),
        1 => Just(SessionOp::Begin),
        1 => Just(SessionOp::End),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // ========================================================================
    // 1. Dispatcher FIFO
    // ========================================================================

    #[test]
    fn dispatcher_preserves_order(values in prop::collection::vec(any::<u32>(), 0..64)) {
        let dispatcher = MainThreadDispatcher::<Vec<u32>>::new();
        for v in values.clone() {
            dispatcher.enqueue(move |seen: &mut Vec<u32>| seen.push(v));
        }
        let mut seen = Vec::new();
        prop_assert_eq!(dispatcher.drain(&mut seen), values.len());
        prop_assert_eq!(seen, values);
        prop_assert!(dispatcher.is_empty());
    }

    #[test]
    fn dispatcher_keeps_per_thread_order(threads in 1usize..5, per_thread in 1usize..20) {
        let dispatcher = MainThreadDispatcher::<Vec<(usize, usize)>>::new();
        let workers: Vec<_> = (0..threads)
            .map(|t| {
                let d = dispatcher.clone();
                thread::spawn(move || {
                    for i in 0..per_thread {
                        d.enqueue(move |seen: &mut Vec<(usize, usize)>| seen.push((t, i)));
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let mut seen = Vec::new();
        dispatcher.drain(&mut seen);
        prop_assert_eq!(seen.len(), threads * per_thread);
        for t in 0..threads {
            let order: Vec<usize> = seen.iter().filter(|(owner, _)| *owner == t).map(|(_, i)| *i).collect();
            prop_assert_eq!(order, (0..per_thread).collect::<Vec<_>>());
        }
    }

    // ========================================================================
    // 2 & 3. Session dirty tracking and batches
    // ========================================================================

    #[test]
    fn session_matches_model(ops in prop::collection::vec(session_op(), 0..64)) {
        let t0 = Instant::now();
        let mut session = EditSession::new(Duration::ZERO, t0);
        let mut edits = 0u64;
        let mut saved = 0u64;
        let mut depth = 0u32;
        let mut pending: Option<u64> = None;

        for op in ops {
            match op {
                SessionOp::Edit => {
                    session.mark_dirty();
                    edits += 1;
                }
                SessionOp::Snapshot => pending = Some(session.generation()),
                SessionOp::Complete => {
                    if let Some(generation) = pending.take() {
                        session.mark_saved(generation, t0);
                        saved = saved.max(generation);
                    }
                }
                SessionOp::Begin => {
                    session.begin_batch();
                    depth += 1;
                }
                SessionOp::End => {
                    session.end_batch();
                    if depth > 0 {
                        depth -= 1;
                        if depth == 0 {
                            edits += 1;
                        }
                    }
                }
            }

            prop_assert_eq!(session.generation(), edits);
            prop_assert_eq!(session.is_dirty(), saved != edits);
            prop_assert_eq!(session.in_batch(), depth > 0);
            if depth > 0 {
                prop_assert!(!session.autosave_due(t0 + Duration::from_secs(1)));
            } else {
                prop_assert_eq!(session.autosave_due(t0), session.is_dirty());
            }
        }
    }
}
