//! Withdrawal compliance export.

mod compliance;

pub use compliance::*;
