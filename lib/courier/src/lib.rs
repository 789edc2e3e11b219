//! Resilient HTTP client middleware.
//!
//! `courier` decorates a request/response transport with:
//! - automatic retries with constant or exponential backoff ([`RetryPolicy`])
//! - per-request interception rules ([`InterceptorOptions`])
//! - a shared busy indicator for in-flight requests ([`BusyIndicator`])
//! - usage metrics with a sliding response-time window ([`MetricsAggregator`])
//! - cooperative cancellation, per request and session-wide ([`LinkedCancellation`])
//!
//! The [`Interceptor`] is a Tower service, so it wraps any transport with the
//! `Service<Request<Bytes>>` shape. [`HyperClient`] is the bundled hyper-based one.
//!
//! # Example
//!
//! ```ignore
//! use courier::prelude::*;
//! use std::time::Duration;
//!
//! let session = Session::new();
//! let options = InterceptorOptions::builder()
//!     .retry_delay(Duration::from_millis(200))
//!     .intercept_when(|request| request.url().path().starts_with("/api/"))
//!     .build();
//!
//! let client = HyperClient::builder()
//!     .with_interceptor(options, session.clone())
//!     .build();
//!
//! let order: Order = client.get("https://shop.example.com/api/orders/42").await?.json()?;
//! println!("{}", session.metrics_summary());
//! ```

mod busy;
mod cancel;
mod client;
mod config;
mod connector;
mod interceptor;
mod metrics;
mod options;
pub mod prelude;
mod replay;
mod retry;
mod session;

pub use busy::{BusyChange, BusyGuard, BusyIndicator};
pub use cancel::LinkedCancellation;
pub use client::{BoxedService, HyperClient, HyperClientBuilder, ServiceFuture};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_USER_AGENT};
pub use interceptor::{Interceptor, InterceptorLayer};
pub use metrics::{MAX_RESPONSE_TIME_SAMPLES, Metrics, MetricsAggregator};
pub use options::{
    DEFAULT_RETRY_STATUS_CODES, InterceptorOptions, InterceptorOptionsBuilder, OnRetry,
    RequestPredicate,
};
pub use replay::RequestReplicator;
pub use retry::{RetryDecision, RetryOutcome, RetryPolicy};
pub use session::Session;

// Re-export tower for layer composition
pub use tower;

// Cancellation tokens travel in request properties
pub use tokio_util::sync::CancellationToken;

// Re-export core types
pub use courier_core::{
    CancelReason, Error, Extensions, HttpClient, HttpClientExt, Method, Request, RequestBuilder,
    RequestParts, Response, Result, StatusCode, Version, from_json, header, to_json,
};
