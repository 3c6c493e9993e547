//! Lock Manager and Session Manager: stateless functional units
//! parameterized by a KVG handle and the capabilities (clock, branch
//! provider) needed to act on a caller's behalf, per design note 9 — no
//! process-global mutable state.

pub mod locks;
pub mod records;
pub mod sessions;

pub use locks::{AcquireOutcome, CheckOutcome, DenyReason, LockEntry, LockManager, ReleaseOutcome};
pub use records::{LockRecord, SessionRecord};
pub use sessions::{
    HeartbeatOutcome, SessionManager, SessionStatusEntry, StalenessTier, UnregisterOutcome,
};
