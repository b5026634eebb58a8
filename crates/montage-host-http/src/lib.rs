//! HTTP capability for generation backends.
//!
//! Executors never talk to `reqwest` directly. They go through the
//! [`HttpClient`] trait so tests can substitute canned responses, and through
//! [`Endpoint`] which owns the base URL and credentials of one backend.

mod client;
mod endpoint;
mod error;

pub use client::{HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestClient};
pub use endpoint::Endpoint;
pub use error::HttpError;
