//! Single-node proof-of-work ledger.
//!
//! The [`blockchain`] module holds the ledger engine; [`api`] exposes it over
//! HTTP and [`config`] reads the server settings.

pub mod api;
pub mod blockchain;
pub mod config;
