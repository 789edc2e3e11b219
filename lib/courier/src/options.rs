//! Interceptor configuration types.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::{Error, Request};

/// Decides something about a request before it is sent.
pub type RequestPredicate = Arc<dyn Fn(&Request<Bytes>) -> bool + Send + Sync>;

/// Callback fired before each retry delay with `(attempt, error, delay)`.
///
/// `attempt` is the 1-based number of the retry about to happen; `error` is `None`
/// when the retry was triggered by a response status rather than a transport error.
pub type OnRetry =
    Arc<dyn Fn(u32, Option<&Error>, Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// Status codes retried by default: 500, 502, 503, 504 and 408.
pub const DEFAULT_RETRY_STATUS_CODES: [u16; 5] = [500, 502, 503, 504, 408];

/// Configuration for the request interceptor.
///
/// Use [`InterceptorOptions::builder`] to override individual fields.
#[derive(Clone)]
pub struct InterceptorOptions {
    /// Total number of attempts, the first one included. Never below 1.
    pub max_retry_attempts: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Double the delay after every attempt instead of keeping it constant.
    pub use_exponential_backoff: bool,
    /// Response statuses that trigger a retry.
    pub retry_on_status_codes: HashSet<u16>,
    /// Whether transport failures (connection, TLS, timeout) are retried.
    pub retry_on_timeout: bool,
    /// Only matching requests are intercepted; `None` intercepts everything.
    pub intercept_predicate: Option<RequestPredicate>,
    /// Only matching requests toggle the busy indicator; `None` toggles for all.
    pub show_loader_predicate: Option<RequestPredicate>,
    /// Awaited before each retry delay.
    pub on_retry: Option<OnRetry>,
    /// Emit per-attempt debug events (headers, delays, outcomes).
    pub enable_detailed_logging: bool,
}

impl Default for InterceptorOptions {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            use_exponential_backoff: true,
            retry_on_status_codes: HashSet::from(DEFAULT_RETRY_STATUS_CODES),
            retry_on_timeout: true,
            intercept_predicate: None,
            show_loader_predicate: None,
            on_retry: None,
            enable_detailed_logging: false,
        }
    }
}

impl fmt::Debug for InterceptorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorOptions")
            .field("max_retry_attempts", &self.max_retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("use_exponential_backoff", &self.use_exponential_backoff)
            .field("retry_on_status_codes", &self.retry_on_status_codes)
            .field("retry_on_timeout", &self.retry_on_timeout)
            .field("intercept_predicate", &self.intercept_predicate.is_some())
            .field("show_loader_predicate", &self.show_loader_predicate.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .field("enable_detailed_logging", &self.enable_detailed_logging)
            .finish()
    }
}

impl InterceptorOptions {
    /// Create a new options builder.
    #[must_use]
    pub fn builder() -> InterceptorOptionsBuilder {
        InterceptorOptionsBuilder::default()
    }

    /// The fixed policy of the original unconfigurable handler.
    ///
    /// Three attempts, retried on transport errors or HTTP 500 only, back to back.
    #[must_use]
    pub fn legacy() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_delay: Duration::ZERO,
            use_exponential_backoff: false,
            retry_on_status_codes: HashSet::from([500]),
            retry_on_timeout: true,
            ..Self::default()
        }
    }

    /// Whether `request` goes through the interceptor at all.
    #[must_use]
    pub fn should_intercept(&self, request: &Request<Bytes>) -> bool {
        self.intercept_predicate
            .as_ref()
            .is_none_or(|predicate| predicate(request))
    }

    /// Whether `request` marks the busy indicator while in flight.
    #[must_use]
    pub fn should_show_loader(&self, request: &Request<Bytes>) -> bool {
        self.show_loader_predicate
            .as_ref()
            .is_none_or(|predicate| predicate(request))
    }
}

/// Builder for [`InterceptorOptions`].
#[derive(Default)]
pub struct InterceptorOptionsBuilder {
    max_retry_attempts: Option<u32>,
    retry_delay: Option<Duration>,
    use_exponential_backoff: Option<bool>,
    retry_on_status_codes: Option<HashSet<u16>>,
    retry_on_timeout: Option<bool>,
    intercept_predicate: Option<RequestPredicate>,
    show_loader_predicate: Option<RequestPredicate>,
    on_retry: Option<OnRetry>,
    enable_detailed_logging: Option<bool>,
}

impl fmt::Debug for InterceptorOptionsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorOptionsBuilder")
            .field("max_retry_attempts", &self.max_retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("use_exponential_backoff", &self.use_exponential_backoff)
            .field("retry_on_status_codes", &self.retry_on_status_codes)
            .field("retry_on_timeout", &self.retry_on_timeout)
            .field("enable_detailed_logging", &self.enable_detailed_logging)
            .finish_non_exhaustive()
    }
}

impl InterceptorOptionsBuilder {
    /// Set the total number of attempts (values below 1 are raised to 1).
    #[must_use]
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = Some(attempts);
        self
    }

    /// Set the base delay between attempts.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Enable or disable exponential backoff.
    #[must_use]
    pub fn use_exponential_backoff(mut self, enabled: bool) -> Self {
        self.use_exponential_backoff = Some(enabled);
        self
    }

    /// Replace the set of status codes that trigger a retry.
    #[must_use]
    pub fn retry_on_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retry_on_status_codes = Some(codes.into_iter().collect());
        self
    }

    /// Enable or disable retries on transport failures.
    #[must_use]
    pub fn retry_on_timeout(mut self, enabled: bool) -> Self {
        self.retry_on_timeout = Some(enabled);
        self
    }

    /// Only intercept requests matching `predicate`.
    ///
    /// ```ignore
    /// let options = InterceptorOptions::builder()
    ///     .intercept_when(|request| request.url().path().starts_with("/api/"))
    ///     .build();
    /// ```
    #[must_use]
    pub fn intercept_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request<Bytes>) -> bool + Send + Sync + 'static,
    {
        self.intercept_predicate = Some(Arc::new(predicate));
        self
    }

    /// Only toggle the busy indicator for requests matching `predicate`.
    #[must_use]
    pub fn show_loader_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request<Bytes>) -> bool + Send + Sync + 'static,
    {
        self.show_loader_predicate = Some(Arc::new(predicate));
        self
    }

    /// Run `callback` before each retry delay; the delay starts once it completes.
    ///
    /// ```ignore
    /// let options = InterceptorOptions::builder()
    ///     .on_retry(|attempt, error, delay| {
    ///         let error = error.map(ToString::to_string);
    ///         async move { notify_user(attempt, error, delay).await }
    ///     })
    ///     .build();
    /// ```
    #[must_use]
    pub fn on_retry<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(u32, Option<&Error>, Duration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_retry = Some(Arc::new(
            move |attempt: u32, error: Option<&Error>, delay: Duration| {
                callback(attempt, error, delay).boxed()
            },
        ));
        self
    }

    /// Enable or disable detailed logging.
    #[must_use]
    pub fn enable_detailed_logging(mut self, enabled: bool) -> Self {
        self.enable_detailed_logging = Some(enabled);
        self
    }

    /// Build the options.
    #[must_use]
    pub fn build(self) -> InterceptorOptions {
        let defaults = InterceptorOptions::default();
        InterceptorOptions {
            max_retry_attempts: self
                .max_retry_attempts
                .unwrap_or(defaults.max_retry_attempts)
                .max(1),
            retry_delay: self.retry_delay.unwrap_or(defaults.retry_delay),
            use_exponential_backoff: self
                .use_exponential_backoff
                .unwrap_or(defaults.use_exponential_backoff),
            retry_on_status_codes: self
                .retry_on_status_codes
                .unwrap_or(defaults.retry_on_status_codes),
            retry_on_timeout: self.retry_on_timeout.unwrap_or(defaults.retry_on_timeout),
            intercept_predicate: self.intercept_predicate,
            show_loader_predicate: self.show_loader_predicate,
            on_retry: self.on_retry,
            enable_detailed_logging: self
                .enable_detailed_logging
                .unwrap_or(defaults.enable_detailed_logging),
        }
    }
}
