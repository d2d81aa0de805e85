//! kanban-core library.
//!
//! Persistence for boards, columns and cards with a dense per-parent
//! ordering, plus the guest identity lifecycle (resolve, merge, sweep).
//!
//! # Conventions
//!
//! - **Errors**: typed [`error::KanbanError`] in the library; `anyhow::Result`
//!   for store bootstrap and config loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).
//! - **Transactions**: every mutation runs under `BEGIN IMMEDIATE` via
//!   [`db::immediate`]; nested calls join the outer transaction.

pub mod config;
pub mod db;
pub mod error;
pub mod guest;
pub mod lock;
pub mod model;
pub mod order;
pub mod reorder;
pub mod session;
pub mod timestamp;

pub use error::{KanbanError, Result};
