//! # Steadfast Admin API Library
//!
//! HTTP surface of the Steadfast admin backend: routing, extraction,
//! response envelopes and configuration on top of `steadfast-shared`.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Environment configuration
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Extractors that reject with the JSON error envelope
//! - `middleware`: Permission enforcement and security headers
//! - `response`: Success envelope
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod response;
pub mod routes;
