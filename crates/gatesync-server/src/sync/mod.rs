//! Fleet synchronization: the ingest pipeline and the fan-out.
//!
//! One inbound upload becomes N outbound commands, one per active peer
//! terminal, in the unified command dialect. Fan-out is best-effort and
//! never waits for peers; delivery is observed asynchronously via replies
//! on the command queue.

pub mod fanout;
pub mod ingest;

pub use fanout::{Fanout, FanoutSummary};
pub use ingest::{IngestOutcome, Ingestor};
