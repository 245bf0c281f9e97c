//! Domain models
//!
//! Expense records handled by the protected routes. Authentication never
//! reaches into this layer; handlers receive an identity that has already
//! been checked.

mod expense;

pub use expense::*;
