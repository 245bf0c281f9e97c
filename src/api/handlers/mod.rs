//! HTTP handlers

pub mod admin;
pub mod expenses;
pub mod health;
pub mod token;
