//! Read-only statement enforcement.

pub mod readonly;

pub use readonly::ReadOnlyGuard;
