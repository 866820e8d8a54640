//! Directory scanning: fingerprinted entries, snapshots, and the change differ.

pub mod differ;
pub mod fingerprint;
pub mod snapshot;
