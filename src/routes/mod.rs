//! Route modules for the Intake server

pub mod health;
pub mod upload;
