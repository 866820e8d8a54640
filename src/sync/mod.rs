//! The synchronizer: a background worker that keeps the region index in
//! step with the directory, and the controller that owns it.

pub mod controller;
pub(crate) mod shared;
pub mod suppression;
pub mod worker;

pub use controller::{InitialLoad, SyncController, SyncOptions, ViewUpdate, initial_load};
pub use shared::WorkerState;
pub use suppression::SuppressionSet;
pub use worker::UiTask;
