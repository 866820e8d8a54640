//! Process-level integration for the long-running `watch` mode.

#[cfg(feature = "daemon")]
pub mod signals;
