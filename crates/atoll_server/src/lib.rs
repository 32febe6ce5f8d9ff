//! # Atoll Server Host
//!
//! The async shell around the `atoll_world` simulation core. The core is
//! synchronous and single-owner; this crate gives it a place to live:
//!
//! - [`WorldHost`] owns the world on one tokio task and ticks it on a
//!   fixed interval
//! - [`WorldHandle`] is the cloneable command channel connection handlers
//!   use to reach the world
//! - [`ClientSink`] abstracts delivery; [`ChannelSink`] is the in-process
//!   implementation used by tests and embedded tools
//! - [`ServerMessage`] is the JSON wire envelope clients receive
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use atoll_server::{ChannelSink, HostConfig, WorldHost};
//! use atoll_world::ClientId;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let sink = Arc::new(ChannelSink::new());
//! let (host, handle) = WorldHost::new(HostConfig::default(), sink.clone());
//! tokio::spawn(host.run());
//!
//! // Mint the id at accept time and wire up delivery before joining.
//! let client = ClientId::new();
//! let mut incoming = sink.register(client);
//! handle.join(client, "mara").await.unwrap();
//! while let Some(bytes) = incoming.recv().await {
//!     // decode and forward to the connection
//! }
//! # }
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod sink;


pub use config::{HostConfig, LoggingSettings};
pub use error::{HostError, HostResult};
pub use host::{WorldCommand, WorldHandle, WorldHost};
pub use logging::{display_banner, setup_logging};
pub use sink::{ChannelSink, ClientSink, ServerMessage};
