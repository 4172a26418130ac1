//! Resilient upstream client
//!
//! One logical GET is driven through an explicit retry state machine:
//!
//! ```text
//! ATTEMPT -> SUCCESS
//!         -> FATAL_FAILURE            (404, other 4xx)
//!         -> RETRYABLE_FAILURE -> ATTEMPT      (attempt < max_retries)
//!                              -> EXHAUSTED    (attempt == max_retries)
//! ```
//!
//! Every attempt is paced, goes out through the next proxy (when enabled) with
//! fresh browser headers, and has its body decoded per `Content-Encoding`
//! before JSON parsing. Every retryable failure counts against the proxy it
//! went through. Blocking statuses (403/429/503) and connection-level errors
//! rotate the proxy and reset the browser session before the next attempt.

use rand::Rng;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::constants::{
    BACKOFF_JITTER_MS, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_CAP_MS, DEFAULT_MAX_RETRIES,
    DIRECT_TIMEOUT_SECS, PROXIED_TIMEOUT_SECS, RATE_LIMITED_BACKOFF_BASE_MS,
    RATE_LIMITED_BACKOFF_CAP_MS,
};
use crate::services::encoding::decode_body;
use crate::services::identity::IdentityGenerator;
use crate::services::pacing::PacedScheduler;
use crate::services::proxy_pool::{ProxyEndpoint, ProxyPool};
use crate::services::transport::{OutboundRequest, RawResponse, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network error, 403/429 or 5xx
    #[error("transient upstream failure: {message}")]
    TransientUpstream { status: Option<u16>, message: String },

    /// 404: the entity no longer exists upstream
    #[error("not found: {url}")]
    NotFound { url: String },

    /// 2xx with a body that could not be decoded or parsed
    #[error("malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    /// Any other 4xx
    #[error("permanent rejection (HTTP {status}) from {url}")]
    PermanentRejection { status: u16, url: String },

    #[error("gave up after {attempts} attempts for {url}: {last}")]
    ExhaustedRetries {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }

    /// The error that ended the request (unwraps `ExhaustedRetries`)
    pub fn last_error(&self) -> &FetchError {
        match self {
            FetchError::ExhaustedRetries { last, .. } => last.last_error(),
            other => other,
        }
    }
}

/// Classification of one HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// Retry after backoff; `rotate` also switches proxy and browser session
    Retryable { rotate: bool },
    NotFound,
    Fatal,
}

/// Default status classification
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        403 | 429 | 503 => StatusClass::Retryable { rotate: true },
        404 => StatusClass::NotFound,
        500..=599 => StatusClass::Retryable { rotate: false },
        _ => StatusClass::Fatal,
    }
}

/// Capped exponential backoff: `min(base * 2^(attempt-1), cap)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let ms = self.base_ms.saturating_mul(1u64 << exponent).min(self.cap_ms);
        Duration::from_millis(ms)
    }
}

/// Classification and backoff rules handed to the state machine
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per logical request
    pub max_retries: u32,
    pub classify: fn(u16) -> StatusClass,
    /// Backoff after HTTP 429
    pub rate_limited: Backoff,
    /// Backoff after every other retryable failure
    pub default: Backoff,
    /// Upper bound of uniform jitter added to each delay
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            classify: classify_status,
            rate_limited: Backoff {
                base_ms: RATE_LIMITED_BACKOFF_BASE_MS,
                cap_ms: RATE_LIMITED_BACKOFF_CAP_MS,
            },
            default: Backoff {
                base_ms: DEFAULT_BACKOFF_BASE_MS,
                cap_ms: DEFAULT_BACKOFF_CAP_MS,
            },
            jitter_ms: BACKOFF_JITTER_MS,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn classify(&self, status: u16) -> StatusClass {
        (self.classify)(status)
    }

    /// Backoff before the attempt following failed attempt `attempt` (1-based), without jitter
    pub fn backoff(&self, status: Option<u16>, attempt: u32) -> Duration {
        match status {
            Some(429) => self.rate_limited.delay(attempt),
            _ => self.default.delay(attempt),
        }
    }

    fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=self.jitter_ms))
    }
}

/// Per-call overrides
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    pub max_retries: Option<u32>,
    pub pacing: Option<PacedScheduler>,
}

impl RequestOptions {
    pub fn new(max_retries: u32, pacing: PacedScheduler) -> Self {
        Self {
            max_retries: Some(max_retries),
            pacing: Some(pacing),
        }
    }
}

/// Outcome of a single attempt
#[derive(Debug, Clone, PartialEq)]
enum AttemptOutcome {
    Success,
    Retryable { status: Option<u16>, rotate: bool },
    NotFound,
    Fatal { status: u16 },
}

/// Transient record of one attempt, logged and dropped
#[derive(Debug)]
struct RequestAttempt {
    number: u32,
    proxy: Option<ProxyEndpoint>,
    session: String,
    elapsed: Duration,
    outcome: AttemptOutcome,
}

impl RequestAttempt {
    fn log(&self, url: &str, max_retries: u32) {
        let proxy = self
            .proxy
            .as_ref()
            .map_or_else(|| "direct".to_string(), |p| p.to_string());
        debug!(
            url = url,
            attempt = self.number,
            max_retries = max_retries,
            proxy = %proxy,
            session = %self.session,
            elapsed_ms = self.elapsed.as_millis() as u64,
            outcome = ?self.outcome,
            "Upstream attempt finished"
        );
    }
}

enum AttemptFailure {
    Retry {
        error: FetchError,
        status: Option<u16>,
        rotate: bool,
    },
    Fatal(FetchError),
}

/// Issues logical GET requests with pacing, proxy rotation and retries
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    proxies: Option<Arc<ProxyPool>>,
    identity: IdentityGenerator,
    policy: RetryPolicy,
    pacing: PacedScheduler,
    proxied_timeout: Duration,
    direct_timeout: Duration,
    warned_empty_pool: AtomicBool,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            proxies: None,
            identity: IdentityGenerator::new(),
            policy,
            pacing: PacedScheduler::disabled(),
            proxied_timeout: Duration::from_secs(PROXIED_TIMEOUT_SECS),
            direct_timeout: Duration::from_secs(DIRECT_TIMEOUT_SECS),
            warned_empty_pool: AtomicBool::new(false),
        }
    }

    pub fn with_proxies(mut self, pool: Arc<ProxyPool>) -> Self {
        self.proxies = Some(pool);
        self
    }

    pub fn with_pacing(mut self, pacing: PacedScheduler) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_timeouts(mut self, proxied: Duration, direct: Duration) -> Self {
        self.proxied_timeout = proxied;
        self.direct_timeout = direct;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn proxies(&self) -> Option<&Arc<ProxyPool>> {
        self.proxies.as_ref()
    }

    /// GET `url` and parse the JSON body with default options
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        self.get_json_with(url, RequestOptions::default()).await
    }

    /// GET `url` and parse the JSON body, retrying per the policy
    pub async fn get_json_with<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<T, FetchError> {
        let max_retries = options.max_retries.unwrap_or(self.policy.max_retries).max(1);
        let pacing = options.pacing.unwrap_or(self.pacing);

        let mut proxy = self.pick_proxy().await;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            pacing.pause().await;

            let request = OutboundRequest {
                url: url.to_string(),
                headers: self.identity.headers(),
                proxy: proxy.clone(),
                timeout: if proxy.is_some() { self.proxied_timeout } else { self.direct_timeout },
            };

            let started = Instant::now();
            let response = self.transport.get(&request).await;
            let result = self.evaluate::<T>(url, response);

            let outcome = match &result {
                Ok(_) => AttemptOutcome::Success,
                Err(AttemptFailure::Retry { status, rotate, .. }) => AttemptOutcome::Retryable {
                    status: *status,
                    rotate: *rotate,
                },
                Err(AttemptFailure::Fatal(FetchError::NotFound { .. })) => AttemptOutcome::NotFound,
                Err(AttemptFailure::Fatal(FetchError::PermanentRejection { status, .. })) => {
                    AttemptOutcome::Fatal { status: *status }
                }
                Err(AttemptFailure::Fatal(_)) => AttemptOutcome::Fatal { status: 0 },
            };
            RequestAttempt {
                number: attempt,
                proxy: proxy.clone(),
                session: self.identity.session().token,
                elapsed: started.elapsed(),
                outcome,
            }
            .log(url, max_retries);

            match result {
                Ok(value) => {
                    if let (Some(pool), Some(p)) = (&self.proxies, &proxy) {
                        pool.record_outcome(p, true);
                    }
                    self.persist_cursor();
                    return Ok(value);
                }
                Err(AttemptFailure::Fatal(error)) => {
                    self.persist_cursor();
                    return Err(error);
                }
                Err(AttemptFailure::Retry { error, status, rotate }) => {
                    self.penalise(proxy.as_ref(), status);

                    if attempt >= max_retries {
                        self.persist_cursor();
                        warn!(url = url, attempts = attempt, error = %error, "Upstream retries exhausted");
                        return Err(FetchError::ExhaustedRetries {
                            url: url.to_string(),
                            attempts: attempt,
                            last: Box::new(error),
                        });
                    }

                    let delay = self.policy.backoff(status, attempt) + self.policy.jitter();
                    info!(
                        url = url,
                        attempt = attempt,
                        max_retries = max_retries,
                        reason = %error,
                        delay_s = delay.as_secs_f64(),
                        "Upstream retry backoff"
                    );
                    sleep(delay).await;

                    if rotate {
                        proxy = self.rotate(proxy, status).await;
                    }
                }
            }
        }
    }

    /// Classify one transport result; decode and parse on success
    fn evaluate<T: DeserializeOwned>(
        &self,
        url: &str,
        response: Result<RawResponse, TransportError>,
    ) -> Result<T, AttemptFailure> {
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                return Err(AttemptFailure::Retry {
                    error: FetchError::TransientUpstream {
                        status: None,
                        message: e.to_string(),
                    },
                    status: None,
                    rotate: true,
                })
            }
        };

        let status = response.status;
        match self.policy.classify(status) {
            StatusClass::Success => {
                let malformed = |message: String| AttemptFailure::Retry {
                    error: FetchError::MalformedResponse {
                        url: url.to_string(),
                        message,
                    },
                    status: Some(status),
                    rotate: false,
                };

                let encoding = response.header("content-encoding").map(str::to_string);
                let body = decode_body(encoding.as_deref(), response.body).map_err(|e| malformed(e.to_string()))?;
                serde_json::from_slice::<T>(&body).map_err(|e| malformed(format!("JSON parse error: {}", e)))
            }
            StatusClass::Retryable { rotate } => Err(AttemptFailure::Retry {
                error: FetchError::TransientUpstream {
                    status: Some(status),
                    message: format!("HTTP {} from {}", status, url),
                },
                status: Some(status),
                rotate,
            }),
            StatusClass::NotFound => Err(AttemptFailure::Fatal(FetchError::NotFound { url: url.to_string() })),
            StatusClass::Fatal => Err(AttemptFailure::Fatal(FetchError::PermanentRejection {
                status,
                url: url.to_string(),
            })),
        }
    }

    /// Count a failed attempt against the proxy it went through; a 403 also flags it
    fn penalise(&self, proxy: Option<&ProxyEndpoint>, status: Option<u16>) {
        if let (Some(pool), Some(p)) = (&self.proxies, proxy) {
            if status == Some(403) {
                pool.record_blocked(p);
            } else {
                pool.record_outcome(p, false);
            }
        }
    }

    /// Switch to the next proxy and start a new browser session
    async fn rotate(&self, current: Option<ProxyEndpoint>, status: Option<u16>) -> Option<ProxyEndpoint> {
        self.identity.reset_session();
        let next = self.pick_proxy().await;

        if let (Some(from), Some(to)) = (&current, &next) {
            debug!(from = %from, to = %to, status = ?status, "Rotated proxy");
        }
        next
    }

    async fn pick_proxy(&self) -> Option<ProxyEndpoint> {
        let pool = self.proxies.as_ref()?;

        if pool.is_exhausted() {
            match pool.reload_if_exhausted().await {
                Some(Ok(count)) => info!(proxies = count, "Proxy pool exhausted, reloaded"),
                Some(Err(e)) => warn!(error = %e, "Proxy pool exhausted and reload failed"),
                None => {}
            }
        }

        let next = pool.next();
        if next.is_none() && !self.warned_empty_pool.swap(true, Ordering::Relaxed) {
            warn!("Proxy pool is empty, falling back to direct connection");
        }
        next
    }

    fn persist_cursor(&self) {
        if let Some(pool) = &self.proxies {
            if let Err(e) = pool.persist() {
                debug!(error = %e, "Failed to persist proxy cursor");
            }
        }
    }
}
