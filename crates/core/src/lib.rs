//! Shared building blocks for the palettepool workspace.
//!
//! Holds the identifier types, the common error enum, pool sizing rules,
//! and the environment-driven [`PoolConfig`](config::PoolConfig). This
//! crate has no internal dependencies so every other crate can use it.

pub mod config;
pub mod error;
pub mod panic;
pub mod sizing;
pub mod types;

pub use config::PoolConfig;
pub use error::CoreError;
pub use panic::panic_message;
pub use types::{JobId, WorkerId};
