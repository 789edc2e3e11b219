//! Core types for the courier HTTP middleware.
//!
//! This crate provides the values that flow between a transport and the
//! middleware decorating it:
//! - [`Request`] and [`RequestBuilder`] - single-use HTTP requests with buffered bodies
//! - [`Response`] - buffered HTTP responses
//! - [`Error`], [`Result`] and [`CancelReason`] - error handling
//! - [`HttpClient`] - the transport trait
//! - [`Method`], [`Version`], [`StatusCode`] and [`header`] - re-exported from `http`

mod body;
mod client;
mod error;
pub mod prelude;
mod request;
mod response;

pub use body::{from_json, to_json};
pub use client::{HttpClient, HttpClientExt};
pub use error::{CancelReason, Error, Result};
pub use request::{Request, RequestBuilder, RequestParts};
pub use response::Response;

// Re-export http crate types for methods, versions, status codes and headers
pub use http::{Extensions, Method, StatusCode, Version, header};
