//! Request interceptor middleware.
//!
//! [`Interceptor`] decorates an inner transport service. For every request it
//! decides whether to manage it at all, marks the session busy, retries failed
//! attempts with backoff, records the outcome in the session metrics and honors
//! both the caller's and the session-wide cancellation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service, ServiceExt};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    CancelReason, Error, HttpClient, InterceptorOptions, LinkedCancellation, Request,
    RequestReplicator, Response, Result, RetryDecision, RetryPolicy, Session,
};

/// Status of synthesized responses and of flows that ended in an error.
const SERVER_ERROR_STATUS: u16 = 500;

/// Reason of the synthesized response when no attempt left an error description.
const EXHAUSTED_REASON: &str = "max retry attempts reached";

/// Layer that wraps a service with an [`Interceptor`].
///
/// # Example
///
/// ```ignore
/// use courier::{InterceptorLayer, InterceptorOptions, Session};
/// use tower::ServiceBuilder;
///
/// let session = Session::new();
/// let service = ServiceBuilder::new()
///     .layer(InterceptorLayer::new(InterceptorOptions::default(), session.clone()))
///     .service(transport);
/// ```
#[derive(Debug, Clone)]
pub struct InterceptorLayer {
    options: Arc<InterceptorOptions>,
    session: Session,
}

impl InterceptorLayer {
    /// Create a layer sharing `session` with every service it wraps.
    #[must_use]
    pub fn new(options: InterceptorOptions, session: Session) -> Self {
        Self {
            options: Arc::new(options),
            session,
        }
    }
}

impl<S> Layer<S> for InterceptorLayer {
    type Service = Interceptor<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Interceptor {
            inner,
            options: Arc::clone(&self.options),
            session: self.session.clone(),
        }
    }
}

/// Service that intercepts requests on their way to `S`.
///
/// The caller's cancellation token is read from the request properties:
///
/// ```ignore
/// let token = CancellationToken::new();
/// let request = Request::<Bytes>::builder(Method::GET, url)
///     .property(token.clone())
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct Interceptor<S> {
    inner: S,
    options: Arc<InterceptorOptions>,
    session: Session,
}

impl<S> Interceptor<S> {
    /// Wrap `inner`.
    pub fn new(inner: S, options: InterceptorOptions, session: Session) -> Self {
        Self {
            inner,
            options: Arc::new(options),
            session,
        }
    }

    /// The interceptor options.
    #[must_use]
    pub fn options(&self) -> &InterceptorOptions {
        &self.options
    }

    /// The shared session state.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }
}

impl<S> Interceptor<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    /// Send `request` through the interception pipeline.
    ///
    /// The returned future owns everything it needs; dropping it aborts the
    /// in-flight attempt and releases the busy indicator.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `caller` or the session-wide token fires first
    /// - non-transport errors of the inner service (invalid request, serialization)
    ///
    /// Exhausted retries are not an error: they produce a synthesized 500 response.
    pub fn intercept(
        &self,
        request: Request<Bytes>,
        caller: CancellationToken,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send + use<S> {
        let mut this = self.clone();
        async move {
            if !this.options.should_intercept(&request) {
                return this.bypass(request, &caller).await;
            }

            let span = info_span!(
                "http_intercept",
                method = %request.method(),
                url = %request.url(),
            );
            this.managed(request, caller).instrument(span).await
        }
    }

    async fn bypass(
        &mut self,
        request: Request<Bytes>,
        caller: &CancellationToken,
    ) -> Result<Response<Bytes>> {
        debug!(method = %request.method(), url = %request.url(), "request not intercepted");

        let send = async { self.inner.ready().await?.call(request).await };
        tokio::select! {
            biased;
            () = caller.cancelled() => Err(Error::Cancelled(CancelReason::Caller)),
            result = send => result,
        }
    }

    async fn managed(
        &mut self,
        request: Request<Bytes>,
        caller: CancellationToken,
    ) -> Result<Response<Bytes>> {
        let _busy = self
            .options
            .should_show_loader(&request)
            .then(|| self.session.busy().enter());

        let start = Instant::now();
        let cancellation = LinkedCancellation::new(caller, self.session.busy().global_token());

        let result = self.send_with_retry(request, &cancellation).await;

        let elapsed = start.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let metrics = self.session.aggregator();

        match &result {
            Ok(response) if response.is_success() || response.is_redirection() => {
                let status = response.status();
                metrics.record_success(status, elapsed);
                info!(status, elapsed_ms, "request completed");
            }
            Ok(response) => {
                let status = response.status();
                metrics.record_failure(status, elapsed);
                warn!(status, elapsed_ms, reason = response.reason(), "request failed");
            }
            Err(Error::Cancelled(CancelReason::Global)) => {
                info!(elapsed_ms, "request cancelled by session");
            }
            Err(error) => {
                metrics.record_failure(SERVER_ERROR_STATUS, elapsed);
                warn!(error = %error, elapsed_ms, "request aborted");
            }
        }

        result
    }

    async fn send_with_retry(
        &mut self,
        request: Request<Bytes>,
        cancellation: &LinkedCancellation,
    ) -> Result<Response<Bytes>> {
        let options = Arc::clone(&self.options);
        let policy = RetryPolicy::new(&options);
        let detailed = options.enable_detailed_logging;

        // Taken before the original is moved into the transport.
        let template =
            (options.max_retry_attempts > 1).then(|| RequestReplicator::replicate(&request));
        let mut original = Some(request);
        let mut last_error: Option<String> = None;
        let mut attempt = 0;

        loop {
            let request = match original.take() {
                Some(request) => request,
                None => template
                    .as_ref()
                    .map(RequestReplicator::replicate)
                    .ok_or_else(|| Error::invalid_request("request cannot be replayed"))?,
            };

            if detailed {
                debug!(attempt, headers = ?request.headers(), "sending attempt");
            }

            let inner = &mut self.inner;
            let outcome = cancellation
                .run(async move { inner.ready().await?.call(request).await })
                .await?;

            if detailed {
                match &outcome {
                    Ok(response) => {
                        debug!(attempt, status = response.status(), "attempt completed");
                    }
                    Err(error) => {
                        debug!(attempt, error = %error, "attempt failed");
                    }
                }
            }

            let decision = policy.decide(attempt, outcome.as_ref());
            match (decision, outcome) {
                (RetryDecision::Done, Ok(response)) => {
                    if !policy.is_retryable_status(response.status()) {
                        return Ok(response);
                    }
                    let reason = last_error.unwrap_or_else(|| {
                        format!("server responded with status {}", response.status())
                    });
                    return Ok(exhausted(attempt, reason));
                }
                (RetryDecision::Done, Err(error)) if error.is_transport() => {
                    return Ok(exhausted(attempt, error.to_string()));
                }
                (RetryDecision::Done, Err(error)) => return Err(error),
                (RetryDecision::Retry { delay }, outcome) => {
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    let error = match outcome {
                        Ok(response) => {
                            warn!(
                                attempt = attempt + 1,
                                status = response.status(),
                                delay_ms,
                                "retrying after retryable status"
                            );
                            None
                        }
                        Err(error) => {
                            warn!(
                                attempt = attempt + 1,
                                error = %error,
                                delay_ms,
                                "retrying after transport error"
                            );
                            last_error = Some(error.to_string());
                            Some(error)
                        }
                    };

                    self.session.aggregator().record_retry(attempt == 0);
                    policy.notify(attempt, error.as_ref(), delay).await;
                    cancellation.run(tokio::time::sleep(delay)).await?;
                }
            }

            attempt += 1;
        }
    }
}

/// The response returned once retries are exhausted without a usable response.
fn exhausted(attempt: u32, reason: String) -> Response<Bytes> {
    let reason = if reason.is_empty() {
        EXHAUSTED_REASON.to_string()
    } else {
        reason
    };
    warn!(attempts = attempt + 1, reason = %reason, "retries exhausted");
    Response::from_status(SERVER_ERROR_STATUS, reason)
}

fn caller_token(request: &Request<Bytes>) -> CancellationToken {
    request
        .properties()
        .get::<CancellationToken>()
        .cloned()
        .unwrap_or_default()
}

impl<S> Service<Request<Bytes>> for Interceptor<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        // The inner service is driven to readiness before each attempt.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let caller = caller_token(&request);
        Box::pin(self.intercept(request, caller))
    }
}

impl<S> HttpClient for Interceptor<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send,
{
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        let caller = caller_token(&request);
        self.intercept(request, caller)
    }
}
