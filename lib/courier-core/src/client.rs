//! Transport traits.
//!
//! [`HttpClient`] is the inner "send" primitive the courier middleware decorates.
//! Cancellation is cooperative: dropping the returned future aborts the call.

use std::future::Future;

use bytes::Bytes;
use http::Method;

use crate::{Request, Response, Result};

/// Core HTTP client trait.
///
/// Implementations receive a single-use [`Request`] by value and produce a
/// buffered [`Response`].
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request and return the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails:
    /// - Network errors
    /// - TLS errors
    /// - Timeouts
    /// - Invalid request
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send;
}

/// Extension trait for [`HttpClient`] with convenience methods.
pub trait HttpClientExt: HttpClient {
    /// Execute a GET request.
    fn get(&self, url: &str) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::builder(Method::GET, url).build();
            self.execute(request).await
        }
    }

    /// Execute a POST request with a JSON body.
    fn post_json<T: serde::Serialize + Send + Sync>(
        &self,
        url: &str,
        body: &T,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::<Bytes>::builder(Method::POST, url)
                .json(body)?
                .build();
            self.execute(request).await
        }
    }
}

impl<T: HttpClient> HttpClientExt for T {}
