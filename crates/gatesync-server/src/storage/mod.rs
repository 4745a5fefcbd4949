//! SQLite storage for the `GateSync` server.
//!
//! The store is the single source of truth: terminal records, canonical
//! entities, the per-terminal command queue, and the append-only sync log
//! all live here. There is no authoritative in-process cache.

mod models;
mod queries_biometrics;
mod queries_commands;
mod queries_terminals;
mod queries_users;

#[cfg(test)]
mod tests;

pub use models::{
    BioPhoto, Biometric, Command, IdCard, Message, SyncLogEntry, Terminal, User, UserMessage,
    UserPhoto, WorkCode,
};
pub use queries_commands::SyncLogParams;

pub use gatesync_core::db::DatabaseError;

gatesync_core::define_database!(Database, "Database migrations complete");
