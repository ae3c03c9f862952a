//! Core library for the Switchboard coordination daemon.
//!
//! Several agent processes working on the same project connect to one daemon
//! over a Unix domain socket and speak newline-delimited JSON-RPC 2.0. The
//! daemon keeps an agent presence registry, a persisted priority command
//! queue, an in-memory advisory lock table and a topic-based broadcaster.
//!
//! Quick start:
//! - Load config via `switchboard_core::config::load(Some(&state_dir))`.
//! - `daemon::Daemon::open(&state_dir, cfg)`, register domain methods with
//!   `Daemon::register_method`, then `Daemon::start` it.
//! - Handlers broadcast events through `RequestContext::broadcast`.

pub mod adapters;
pub mod broadcast;
pub mod config;
pub mod connection;
pub mod daemon;
pub mod error;
pub mod locks;
pub mod logging;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod rpc;
