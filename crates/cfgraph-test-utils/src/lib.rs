//! Shared test utilities for the cfgraph workspace.
//!
//! This crate provides fixtures used across crate test suites. It is a
//! dev-dependency only and never published.
//!
//! # Modules
//!
//! - [`resolvers`]: resolvers that count their invocations
//! - [`cache`]: [`RecordingCache`] for asserting cache traffic
//! - [`plugins`]: [`TablePlugin`], a plugin answering from a fixed table
//! - [`services`]: shorthand for building service definitions

pub mod cache;
pub mod plugins;
pub mod resolvers;
pub mod services;

pub use cache::RecordingCache;
pub use plugins::TablePlugin;
pub use resolvers::{CallCounter, counting_resolver};
pub use services::{item, root, service};
