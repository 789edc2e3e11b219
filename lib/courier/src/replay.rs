//! Request replay.
//!
//! A [`Request`] is consumed by the transport when sent. Before the first attempt the
//! retry loop keeps a replica as a template, and every later attempt sends a fresh
//! replica of that template.

use bytes::Bytes;

use crate::Request;

/// Builds independent, resend-safe copies of a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestReplicator;

impl RequestReplicator {
    /// Copy method, URL, headers, body, protocol version and properties.
    ///
    /// The body is a reference-counted [`Bytes`] buffer, so copying it never
    /// re-reads anything.
    #[must_use]
    pub fn replicate(request: &Request<Bytes>) -> Request<Bytes> {
        let mut builder = Request::builder(request.method().clone(), request.url().clone())
            .headers(
                request
                    .headers()
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone())),
            )
            .version(request.version());

        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let mut replica = builder.build();
        *replica.properties_mut() = request.properties().clone();
        replica
    }
}
