//! # mpi-run
//!
//! A small MPI-style SPMD runtime: ranks, a store-and-forward router on
//! rank 0, point-to-point send/recv, and the four collectives built on
//! top of them.

pub mod cli;
pub mod comm;
pub mod config;
pub mod demos;
pub mod error;
pub mod inbox;
pub mod launcher;
pub mod logging;
pub mod message;
pub mod registry;
pub mod runtime;
pub mod transport;
pub mod wire;

pub use comm::Comm;
pub use config::{ConfigBuilder, InfraConfig};
pub use message::Message;

/// The current version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
