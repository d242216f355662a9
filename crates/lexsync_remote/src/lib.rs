//! # LexSync Remote
//!
//! Authenticated, timeout-bounded CRUD primitives against the shared
//! relational backend and its attachment blob namespace.
//!
//! This crate provides:
//! - Session handling with proactive refresh ([`SessionProvider`])
//! - Backend error classification ([`RemoteError`])
//! - The [`RemoteBackend`] and [`BlobStore`] trait seams
//! - A REST implementation over an abstract [`HttpClient`]
//! - Fixed-size sequential write batching with halt-at-failure reporting
//! - An in-memory [`MockBackend`] for tests
//!
//! ## Key invariants
//!
//! - Every remote call carries a non-expired auth context
//! - Every remote call is bounded by an explicit timeout
//! - A write batch either fully succeeds or is reported failed at its
//!   boundary; earlier batches stay committed, later batches are untouched

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod backend;
mod batch;
mod error;
mod http;
mod mock;
mod rest;

pub use auth::{fresh_session, AuthSession, SessionProvider, StaticSessions};
pub use backend::{BlobStore, RemoteBackend};
pub use batch::{push_in_batches, BatchFailure};
pub use error::{classify_response, RemoteError, RemoteResult};
pub use http::{ApiRequest, ApiResponse, HttpClient, Method};
pub use mock::MockBackend;
pub use rest::{RestBackend, RestConfig};
