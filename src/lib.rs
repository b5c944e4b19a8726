//! Purpose: Client library for the whiterabbit accounting services' compound FindAll envelopes.
//! Exports: `core` (wire codec, entities, envelopes, type registry, framing, errors),
//!          `api` (transport and typed service clients), `config` (endpoint/token resolution).
//! Role: Backs the `whiterabbit` CLI; usable directly by other Rust callers.
//! Invariants: Decoding is pure and synchronous; all I/O lives behind `api::Transport`.
pub mod api;
pub mod config;
pub mod core;
