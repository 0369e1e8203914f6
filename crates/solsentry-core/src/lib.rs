//! Core library for `SolSentry`.
//!
//! Contains the heuristic Solidity scanner and gas estimator, the AI provider
//! seam and its OpenAI-compatible client, the analysis pipeline that ties
//! them together, JWT and password handling, the rate limiter, and the audit
//! system. This crate depends on `solsentry-storage` for models and the
//! `Store` trait and knows nothing about HTTP routing.

pub mod ai;
pub mod audit;
pub mod audit_file;
pub mod auth;
pub mod error;
pub mod gas;
pub mod pipeline;
pub mod ratelimit;
pub mod scanner;
pub mod source;
