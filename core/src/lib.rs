//! Reclamation resolution & allocation engine.
//!
//! Adjudicates disputes between the two parties of a rental booking and
//! turns an approve/reject decision into a settlement plan over the
//! booking's rent and deposit pools plus a reputation penalty.

pub mod clock;
pub mod config;
pub mod counterparty;
pub mod directory;
pub mod error;
pub mod event;
pub mod fund_distribution;
pub mod penalty_calculator;
pub mod reclamation;
pub mod reclamation_service;
pub mod reputation_engine;
pub mod settlement;
pub mod store;
pub mod types;
