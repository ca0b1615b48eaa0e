// src/exchange/http.rs
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::exchange::rate_limit::RateLimiter;
use hyper::client::HttpConnector;
use hyper::{body, Body, Client, Method, Request, StatusCode};
use hyper_tls::HttpsConnector;
use tokio::time::{sleep, timeout, Duration};

/// Status codes worth another attempt
const RETRY_STATUSES: [StatusCode; 4] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Outgoing request description; rebuilt into a hyper request per attempt
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
    /// Safe to resend after the venue may have seen it
    pub idempotent: bool,
}

impl HttpRequest {
    pub fn get(url: String) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            body: None,
            idempotent: true,
        }
    }

    pub fn post(url: String, body: String) -> Self {
        Self {
            method: Method::POST,
            url,
            headers: Vec::new(),
            body: Some(body),
            idempotent: false,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn build(&self) -> ExchangeResult<Request<Body>> {
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(&self.url);

        for (name, value) in &self.headers {
            builder = builder.header(*name, value.as_str());
        }

        let body = match &self.body {
            Some(b) => Body::from(b.clone()),
            None => Body::empty(),
        };

        builder
            .body(body)
            .map_err(|e| ExchangeError::Request(format!("Invalid request {}: {}", self.url, e)))
    }
}

/// A failed attempt, and whether the request may have reached the venue
#[derive(Debug)]
struct AttemptError {
    error: ExchangeError,
    sent: bool,
}

impl AttemptError {
    fn unsent(error: ExchangeError) -> Self {
        Self { error, sent: false }
    }

    fn sent(error: ExchangeError) -> Self {
        Self { error, sent: true }
    }
}

/// Transient failures are retried. A non-idempotent request is only
/// resent when the previous attempt never left the client.
fn should_retry(request: &HttpRequest, failure: &AttemptError) -> bool {
    failure.error.is_transient() && (request.idempotent || !failure.sent)
}

/// HTTPS transport with bounded retries and exponential backoff
pub struct HttpTransport {
    client: Client<HttpsConnector<HttpConnector>>,
    limiter: Option<RateLimiter>,
    max_retries: u32,
    backoff: Duration,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(max_retries: u32, backoff: Duration, request_timeout: Duration) -> Self {
        let client = Client::builder().build::<_, Body>(HttpsConnector::new());

        Self {
            client,
            limiter: None,
            max_retries,
            backoff,
            request_timeout,
        }
    }

    /// Space every attempt, retries included, by at least `interval`
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.limiter = Some(RateLimiter::new(interval));
        self
    }

    /// Send the request and return the response body of a 2xx answer
    pub async fn send(&self, request: &HttpRequest) -> ExchangeResult<String> {
        let mut attempt = 0;

        loop {
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }

            match self.send_once(request).await {
                Ok(text) => return Ok(text),
                Err(failure) if should_retry(request, &failure) && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    log::warn!(
                        "{} {} failed ({}), retry {}/{} in {:?}",
                        request.method,
                        request.url,
                        failure.error,
                        attempt + 1,
                        self.max_retries,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => {
                    if failure.sent && !request.idempotent && failure.error.is_transient() {
                        log::error!(
                            "{} {} may have reached the venue ({}), not resending",
                            request.method,
                            request.url,
                            failure.error
                        );
                    }
                    return Err(failure.error);
                }
            }
        }
    }

    /// Backoff before retry number `attempt + 1`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt)
    }

    async fn send_once(&self, request: &HttpRequest) -> Result<String, AttemptError> {
        let built = request.build().map_err(AttemptError::unsent)?;

        // A timeout cannot tell whether the venue got the request
        let response = timeout(self.request_timeout, self.client.request(built))
            .await
            .map_err(|_| {
                AttemptError::sent(ExchangeError::Connection(format!(
                    "Request to {} timed out",
                    request.url
                )))
            })?
            .map_err(|e| {
                let error = ExchangeError::Connection(format!("{}", e));
                if e.is_connect() {
                    AttemptError::unsent(error)
                } else {
                    AttemptError::sent(error)
                }
            })?;

        let status = response.status();
        let bytes = body::to_bytes(response.into_body()).await.map_err(|e| {
            AttemptError::sent(ExchangeError::Connection(format!(
                "Failed to read body: {}",
                e
            )))
        })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        classify_status(status, text).map_err(AttemptError::sent)
    }
}

fn classify_status(status: StatusCode, text: String) -> ExchangeResult<String> {
    if status.is_success() {
        return Ok(text);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ExchangeError::RateLimit(text));
    }

    if RETRY_STATUSES.contains(&status) {
        return Err(ExchangeError::Connection(format!("HTTP {}: {}", status, text)));
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ExchangeError::Authentication(format!("HTTP {}: {}", status, text)));
    }

    Err(ExchangeError::Api(format!("HTTP {}: {}", status, text)))
}
