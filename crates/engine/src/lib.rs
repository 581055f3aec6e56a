//! Computation unit plumbing for the palette engine.
//!
//! A computation unit is a dedicated OS thread that owns one [`Engine`]
//! and runs exactly one operation at a time. Callers talk to it through a
//! cloneable [`UnitClient`], which turns every engine operation into an
//! async request/reply exchange. Buffers are moved into and out of the
//! unit, never copied.
//!
//! - [`engine`] -- the [`Engine`] trait and the [`LoopbackEngine`] stand-in.
//! - [`protocol`] -- request/response messages and input shape checks.
//! - [`unit`] -- thread spawning and the async client.

pub mod engine;
pub mod error;
pub mod protocol;
pub mod unit;

pub use engine::{Engine, GeneratedPalette, LoopbackEngine};
pub use error::EngineError;
pub use protocol::{EngineRequest, EngineResponse};
pub use unit::{ComputeUnit, UnitClient};
