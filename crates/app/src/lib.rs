//! # dstate App Crate
//!
//! Assembles the replicated state machine: the store, the module registry,
//! the upgrade coordinator, and the six-stage consensus surface, in the
//! exact boot order the upgrade subsystem depends on.
//!
//! ## Boot order
//!
//! ```text
//! store ──> version map ──> coordinator bind ──> store loader armed
//!                                                      │
//!   health monitor (optional, env-gated) <─────────────┘
//! ```
//!
//! The pending store rewrite is applied inside finalize at its bound
//! height, before the upgrade handler and before any module processing.

pub mod app;
pub mod health;

pub use app::{App, AppError};
