//! Conversion worker pool.
//!
//! A fixed number of long-lived workers execute [`task::ConversionTask`]s
//! handed out by the FIFO scheduler in [`pool`]. The actual conversion is a
//! [`converter::Converter`] implementation; production uses
//! [`converter::ToolConverter`].

pub mod converter;
pub mod pool;
pub mod task;

pub use converter::{Converter, ToolConverter, ToolPaths};
pub use pool::{ConversionPool, PoolStats};
pub use task::{ConversionError, ConversionInput, ConversionKind, ConversionTask};
