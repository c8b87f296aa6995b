//! The uplink session.
//!
//! - [`services`]: the shared services object every handler and module sees
//! - [`wire`]: validated outbound helpers on top of the protocol builders
//! - [`burst`]: our burst and the end-of-burst actions
//! - [`run`]: connection lifecycle, read loop, restart and shutdown
//! - [`rehash`]: configuration reload with change announcements
//! - [`connection`]: plain/TLS transport
//! - [`tasks`]: tracked timers, workers and the deferred-task queue

mod burst;
mod connection;
mod rehash;
mod run;
mod services;
mod tasks;
mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{S2sStream, certificate_fingerprint, connect};
pub use rehash::RehashReport;
pub use run::{Exit, run, run_session};
pub use services::{Control, Receivers, Services};
pub use tasks::{Deferred, DeferredQueue, TaskInfo, TaskKind, Tasks};

use crate::protocol::ModeTables;

/// Where the link is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Handshaking,
    Bursting,
    Synced,
    Rehashing,
    Restarting,
    ShuttingDown,
}

/// Per-link negotiated state. Reset on every (re)connect.
#[derive(Debug, Clone)]
pub struct LinkState {
    pub phase: SessionState,
    pub tables: ModeTables,
    pub uplink_sid: Option<String>,
    pub uplink_name: Option<String>,
    pub protocol_version: Option<u32>,
    /// Our burst went out.
    pub burst_sent: bool,
    /// The uplink's end-of-burst was processed.
    pub burst_complete: bool,
    /// A rehash changed a field that only a restart applies.
    pub restart_required: bool,
}

impl LinkState {
    pub fn new(tables: ModeTables) -> Self {
        Self {
            phase: SessionState::Disconnected,
            tables,
            uplink_sid: None,
            uplink_name: None,
            protocol_version: None,
            burst_sent: false,
            burst_complete: false,
            restart_required: false,
        }
    }
}

/// Current unix time in seconds.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
