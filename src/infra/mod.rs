//! Infrastructure layer
//!
//! Contains the expense store trait and its in-memory implementation, plus
//! process-level plumbing (shutdown signal handling).

mod error;
mod graceful_shutdown;
mod memory;
mod traits;

pub use error::*;
pub use graceful_shutdown::shutdown_signal;
pub use memory::InMemoryExpenseStore;
pub use traits::*;
