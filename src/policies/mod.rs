//! Retry policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how delays between failed `waitpid` retries evolve (first / factor / max)
//!
//! ## Quick wiring
//! ```text
//! Config { reap_retries, reap_backoff: BackoffPolicy }
//!      └─► core::reaper::Reaper uses:
//!           - reap_retries to bound consecutive failures of one pass
//!           - reap_backoff.next(attempt) to sleep between them
//! ```

mod backoff;

pub use backoff::BackoffPolicy;
