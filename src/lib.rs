//! lawrag - Hybrid legal retrieval
//!
//! Retrieves supporting passages for Vietnamese traffic law questions from a
//! semantic and a lexical search backend, fuses both rankings with Reciprocal
//! Rank Fusion and refines the head with a cross-encoder reranker, degrading
//! gracefully when any backend fails.

pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod eval;
pub mod retrieval;

pub use error::{LawragError, Result};
