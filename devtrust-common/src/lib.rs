//! DevTrust Common
//!
//! Shared plumbing for the device trust stack:
//! - Component-tagged structured logging with device ID context
//! - Level-checked logging macros
//! - The wall-clock / time-sync collaborator used for certificate validity

pub mod logging;
pub mod macros;
pub mod time;

pub use logging::{Component, Logger};
pub use time::{FixedTimeSource, SystemTimeSource, TimeSource};
