//! Device-side half of the ingestion pipeline: capture samples from the
//! platform health store, hold them in a durable local queue, and drain the
//! queue to the server whenever connectivity allows. Delivery is
//! at-least-once; the server's record-identity dedup makes replays safe.

pub mod agent;
pub mod client;
pub mod identity;
pub mod queue;

use thiserror::Error;

pub use agent::{
    CaptureSummary, DrainReport, HealthSource, InstantReading, IntervalReading, SyncAgent,
    SyncIdentity,
};
pub use client::IngestClient;
pub use queue::OfflineQueue;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("local queue error: {0}")]
    Queue(#[from] rusqlite::Error),
    #[error("payload encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server rejected batch ({status}): {reason}")]
    Rejected { status: u16, reason: String },
}
