//! The `utils` module provides definitions shared across the broker:
//! the error taxonomy written to clients and logging setup.

pub mod error;
pub mod logging;
