//! # dstate Common Crate
//!
//! Shared abstractions used by every other crate in the workspace.
//!
//! ## Modules
//! - `store`: named key-value multistore trait and in-memory implementation
//! - `module`: application-module trait and name-keyed registry
//! - `config`: configuration management
//!
//! ## Store Architecture
//! ```text
//! ┌─────────────────┐
//! │   MultiStore    │  <- Abstract trait
//! └────────┬────────┘
//!          │
//!   ┌──────▼────────┐
//!   │MemoryMultiStore│
//!   └───────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let mut store = MemoryMultiStore::new();
//! store.add_store("bank")?;
//! store.set("bank", b"balance/alice", b"100")?;
//! ```

pub mod config;
pub mod module;
pub mod store;

pub use config::Config;
pub use module::{AppModule, ModuleError, ModuleRegistry};
pub use store::{MemoryMultiStore, MultiStore, StoreError};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
