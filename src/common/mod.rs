//! Common types shared across nodestore.
//!
//! - Configuration constants and [`TableConfig`]
//! - Error types
//! - Identifiers ([`BlockId`], [`SlotId`])

mod block_id;
pub mod config;
pub mod error;
mod slot_id;

pub use block_id::BlockId;
pub use config::TableConfig;
pub use error::{Error, Result};
pub use slot_id::SlotId;
