//! Unreal Engine dependency pack extraction library.
//!
//! This crate reads `.ue4dependencies` manifests, works out which packs back
//! the requested files, fetches those packs from a local cache or the CDN,
//! and slices each blob out of the decompressed pack into the output tree.
//! It is used by the `gitdeps` CLI binary and can be consumed
//! programmatically by build tooling.
//!
//! # Modules
//!
//! - [`cancel`] - Cancellation token with optional deadline
//! - [`cli`] - Command-line argument definitions
//! - [`commands`] - Subcommand implementations behind the CLI
//! - [`config`] - Optional TOML configuration and flag merging
//! - [`coordinator`] - Worker pool driving fetch and extract per pack
//! - [`error`] - Top-level error type for CLI runs
//! - [`events`] - Structured event sink passed into every component
//! - [`extract`] - Blob slicing with path-safety and hash checks
//! - [`fetch`] - Pack sources (local cache, HTTP) and gzip decoding
//! - [`manifest`] - Manifest model, XML parser, and loader
//! - [`output`] - URL list and manifest summary formatting
//! - [`resolver`] - Hash indices, prefix filtering, and pack selection
//! - [`verification`] - SHA-1 verification and hash policy

pub mod cancel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod extract;
pub mod fetch;
pub mod manifest;
pub mod output;
pub mod resolver;
pub mod verification;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
