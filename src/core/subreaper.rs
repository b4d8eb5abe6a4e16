//! # Subreaper mode for the supervisor process.
//!
//! On Linux, `prctl(PR_SET_CHILD_SUBREAPER)` makes orphaned descendants get
//! reparented to this process instead of PID 1, which is what lets the reaper
//! adopt them. The attribute is process-wide and set once; [`enable`] caches
//! the outcome and later calls return it without touching the kernel again.
//!
//! Elsewhere [`enable`] is a no-op and [`adoption_available`] stays `false`:
//! the supervisor then only manages its direct child.

use std::sync::OnceLock;

use crate::error::SubreaperError;

static STATE: OnceLock<Result<bool, SubreaperError>> = OnceLock::new();

/// Enables subreaper mode for the current process (init-once).
///
/// Must run before the target command is launched, otherwise grandchildren
/// orphaned early are lost to PID 1.
pub fn enable() -> Result<(), SubreaperError> {
    STATE.get_or_init(apply).map(|_| ())
}

/// True once [`enable`] succeeded on a platform that supports adoption.
pub fn adoption_available() -> bool {
    matches!(STATE.get(), Some(Ok(true)))
}

#[cfg(target_os = "linux")]
fn apply() -> Result<bool, SubreaperError> {
    use nix::sys::prctl;

    prctl::set_child_subreaper(true).map_err(SubreaperError::Prctl)?;
    if !prctl::get_child_subreaper().map_err(SubreaperError::Prctl)? {
        return Err(SubreaperError::NotApplied);
    }
    Ok(true)
}

#[cfg(not(target_os = "linux"))]
fn apply() -> Result<bool, SubreaperError> {
    Ok(false)
}
