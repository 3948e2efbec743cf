//! # BI command-line support
//!
//! File backends used by the `bi` binary.

pub mod backend;

pub use backend::{FileBackend, Inventory, InventoryHost};
