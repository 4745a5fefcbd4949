//! `GateSync` Server Library
//!
//! Core functionality for the `GateSync` push server:
//! - SQLite storage for terminals, users, biometrics and the command queue
//! - Terminal registry with active-set snapshots
//! - Per-terminal durable command FIFO with reply reconciliation
//! - Upload ingest and fleet fan-out
//! - Push-protocol HTTP endpoints and the operator API

pub mod http;
pub mod queue;
pub mod registry;
pub mod storage;
pub mod sync;
