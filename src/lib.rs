//! Record keeping for a small bakery: staff accounts, shift schedule and pay,
//! open/close checklists, pickup reservations and an announcement board, all
//! kept as CSV tables in one data directory.

pub mod auth;
pub mod calendar;
pub mod checklist;
pub mod cli;
pub mod config;
pub mod csv;
pub mod error;
pub mod posts;
pub mod reservations;
pub mod schedule;
pub mod store;
pub mod tables;

pub use config::StoreConfig;
pub use error::{AppError, Result, StoreError};
pub use store::{Change, Removed, Store};
