//! Persistence layer.
//!
//! [`Store`] is the boundary the services talk to. [`DbOperations`] backs it
//! with Postgres; [`MemoryStore`] keeps everything in process.

pub mod memory;
pub mod models;
pub mod operations;
pub mod store;

pub use memory::MemoryStore;
pub use models::{AnalysisEntry, ClassInfo, Reflection, Role, Sentiment, User, UserSession};
pub use operations::DbOperations;
pub use store::{StudentProfile, Store};
