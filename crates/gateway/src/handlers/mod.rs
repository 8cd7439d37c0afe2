//! Request handlers

pub mod health;
pub mod search;
pub mod surveys;
