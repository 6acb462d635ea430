//! Chain oracle implementations
//!
//! Real node or indexer clients live outside this crate and implement
//! `core::traits::ChainLookup`. This module provides the in-memory oracle the
//! CLI and tests run against.

pub mod observed_chain;

pub use observed_chain::{ObservedChain, ObservedTransfer};
