//! Platform abstractions.

pub mod file_id;
