//! Core primitives for mediating exclusive locks over named resources
//! across concurrent developer-tooling sessions: a key-value gateway, a
//! pure naming/context resolver, a lock manager, and a session manager.
//!
//! Every unit here is a stateless function or struct parameterized by a
//! KVG handle and injected capabilities (clock, branch provider) — there
//! is no process-global mutable state, so a caller can run as many
//! independent coordination contexts as it likes in one process.

#![forbid(unsafe_code)]

pub mod branch;
pub mod clock;
pub mod config;
pub mod coordination;
pub mod domain_types;
pub mod error;
pub mod kvg;
pub mod naming;
pub mod session_context;

pub use config::Config;
pub use error::{Error, Result};
pub use session_context::SessionContext;
