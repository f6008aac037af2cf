//! Taskhive: a single-process task kernel.
//!
//! Accepts tasks, screens them against safety rules, queues them by
//! priority, hands them to registered workers, enforces timeouts, and keeps
//! a hash-chained audit trail while broadcasting state changes on an
//! in-process event bus.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod kernel;
pub mod logging;
pub mod store;
pub mod types;
