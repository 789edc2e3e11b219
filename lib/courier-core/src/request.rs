//! HTTP request building.
//!
//! A [`Request`] is a single-use value: sending it moves it into the transport.
//! Everything it carries (method, URL, headers, buffered body, protocol version and
//! the per-request property bag) is plain data, so a fresh copy can always be rebuilt
//! from its parts before it is sent.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use courier_core::{Method, Request};
//!
//! let request = Request::<Bytes>::builder(Method::GET, "https://api.example.com/orders".parse().unwrap())
//!     .header("Accept", "application/json")
//!     .query("page", "1")
//!     .build();
//! assert_eq!(request.url().query(), Some("page=1"));
//! ```

use std::collections::HashMap;

use bytes::Bytes;
use http::{Extensions, Method, Version};

/// An HTTP request with method, URL, headers, optional buffered body, protocol
/// version and ad-hoc properties.
#[derive(Debug)]
pub struct Request<B = Bytes> {
    method: Method,
    url: url::Url,
    headers: HashMap<String, String>,
    body: Option<B>,
    version: Version,
    properties: Extensions,
}

/// Decomposed [`Request`]: (method, url, headers, body, version, properties).
pub type RequestParts<B> = (
    Method,
    url::Url,
    HashMap<String, String>,
    Option<B>,
    Version,
    Extensions,
);

impl<B> Request<B> {
    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: url::Url) -> RequestBuilder<B> {
        RequestBuilder::new(method, url)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Mutable access to headers.
    #[must_use]
    pub fn headers_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.headers
    }

    /// Single header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> Option<&B> {
        self.body.as_ref()
    }

    /// Protocol version requested for this call.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Per-request properties (tracing context, cancellation tokens, flags...).
    #[must_use]
    pub const fn properties(&self) -> &Extensions {
        &self.properties
    }

    /// Mutable access to the per-request properties.
    #[must_use]
    pub fn properties_mut(&mut self) -> &mut Extensions {
        &mut self.properties
    }

    /// Consume into (method, url, headers, body, version, properties).
    #[must_use]
    pub fn into_parts(self) -> RequestParts<B> {
        (
            self.method,
            self.url,
            self.headers,
            self.body,
            self.version,
            self.properties,
        )
    }

    /// Rebuild a request from its parts.
    #[must_use]
    pub fn from_parts(parts: RequestParts<B>) -> Self {
        let (method, url, headers, body, version, properties) = parts;
        Self {
            method,
            url,
            headers,
            body,
            version,
            properties,
        }
    }
}

/// Builder for constructing [`Request`] instances.
#[derive(Debug, Clone)]
pub struct RequestBuilder<B = Bytes> {
    method: Method,
    url: url::Url,
    headers: HashMap<String, String>,
    body: Option<B>,
    version: Version,
    properties: Extensions,
}

impl<B> RequestBuilder<B> {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: HashMap::new(),
            body: None,
            version: Version::HTTP_11,
            properties: Extensions::new(),
        }
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets multiple headers.
    #[must_use]
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Appends a query parameter to the URL.
    #[must_use]
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: B) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the protocol version.
    #[must_use]
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Attaches a typed property to the request.
    #[must_use]
    pub fn property<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.properties.insert(value);
        self
    }

    /// Builds the [`Request`].
    #[must_use]
    pub fn build(self) -> Request<B> {
        Request {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            version: self.version,
            properties: self.properties,
        }
    }
}

impl RequestBuilder<Bytes> {
    /// Set a JSON body.
    pub fn json<T: serde::Serialize>(self, value: &T) -> crate::Result<Self> {
        let body = crate::to_json(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_url() -> url::Url {
        url::Url::parse("https://api.example.com/orders").expect("valid URL")
    }

    #[test]
    fn builder_defaults() {
        let request = Request::<Bytes>::builder(Method::GET, orders_url()).build();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.version(), Version::HTTP_11);
        assert!(request.headers().is_empty());
        assert!(request.body().is_none());
        assert!(request.properties().is_empty());
    }

    #[test]
    fn builder_sets_everything() {
        #[derive(Debug, Clone, PartialEq)]
        struct TraceId(&'static str);

        let request = Request::builder(Method::POST, orders_url())
            .header("X-Tenant", "acme")
            .query("dry_run", "true")
            .body(Bytes::from_static(b"{}"))
            .version(Version::HTTP_2)
            .property(TraceId("abc"))
            .build();

        assert_eq!(request.header("X-Tenant"), Some("acme"));
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/orders?dry_run=true"
        );
        assert_eq!(request.body(), Some(&Bytes::from_static(b"{}")));
        assert_eq!(request.version(), Version::HTTP_2);
        assert_eq!(request.properties().get::<TraceId>(), Some(&TraceId("abc")));
    }

    #[test]
    fn parts_round_trip_preserves_properties() {
        let request = Request::<Bytes>::builder(Method::DELETE, orders_url())
            .property(42_u32)
            .build();

        let rebuilt = Request::from_parts(request.into_parts());

        assert_eq!(rebuilt.method(), Method::DELETE);
        assert_eq!(rebuilt.properties().get::<u32>(), Some(&42));
    }

    #[test]
    fn json_body_sets_content_type() {
        let request = Request::<Bytes>::builder(Method::POST, orders_url())
            .json(&serde_json::json!({ "sku": "A-1" }))
            .expect("json")
            .build();

        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(
            request.body().map(|b| b.to_vec()),
            Some(br#"{"sku":"A-1"}"#.to_vec())
        );
    }
}
