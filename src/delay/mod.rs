//! # Delay admission gate.
//!
//! Holds grains whose configured delay has not elapsed and hands them to the
//! chain scheduler when due.
//!
//! ```text
//! submit(delay > 0) ─► DelayGate::schedule(id, now + delay)      O(log n)
//!                            │
//!          gate driver ──────┤ sleep_until(peek_due())            O(1) peek
//!          (one task)        │   woken early by Notify on a new earliest deadline
//!                            ▼
//!                      pop_due(now) ─► scheduler.release(id)
//!
//! terminate(delayed id) ─► DelayGate::remove(id) ─► Cancelled
//! ```
//!
//! The gate is a plain data structure; the orchestrator owns the single driver
//! task, so thousands of delayed grains cost heap entries, not tasks.

mod gate;

pub use gate::DelayGate;
