//! Prelude module for convenient imports.
//!
//! ```ignore
//! use courier::prelude::*;
//! ```

pub use crate::{
    BusyIndicator, CancelReason, CancellationToken, Error, HttpClient, HttpClientExt, HyperClient,
    Interceptor, InterceptorLayer, InterceptorOptions, Method, Metrics, Request, Response, Result,
    Session, StatusCode,
};
pub use serde::{Deserialize, Serialize};
