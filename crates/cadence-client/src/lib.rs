//! # cadence-client
//!
//! The embeddable stream engine: a single-writer [`StreamService`] holding
//! the canonical stream state, an async command layer that talks to an
//! injected [`Backend`], and diff-based change events for list surfaces.
//!
//! The embedding application constructs a [`ClientContext`] with its
//! backend implementation, subscribes to [`service::StreamService::events`],
//! and drives the engine through the functions in [`commands`].

pub mod backend;
pub mod commands;
pub mod error;
pub mod events;
pub mod service;
pub mod session;
pub mod state;
pub mod stream;

use tracing_subscriber::{fmt, EnvFilter};

pub use backend::{Backend, Image, Intent, IntentParticipant, IntentResult, SendableChunk};
pub use error::{ClientError, Result};
pub use events::{ChunkListChange, SentChunk, ServiceEvents, StreamListChange, Subscription};
pub use service::StreamService;
pub use session::Session;
pub use state::ClientContext;
pub use stream::{SharedStream, Stream};

/// Installs the global tracing subscriber. Call once at application start;
/// `RUST_LOG` overrides the defaults.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("cadence_client=debug,cadence_store=info,cadence_shared=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
