//! Domain models for the balance mutation engine

pub mod account;
pub mod audit;
