//! Guarded HTTP executor.
//!
//! All outbound traffic goes through [`GuardedExecutor::execute`]. Redirects
//! are followed by hand so that every hop is re-validated by the request
//! guard, bodies are read under a size cap, and concurrency is bounded both
//! globally and per host.

mod body;
mod config;
mod error;
pub mod redirect;

pub use config::{HttpConfig, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_MARKUP_BYTES};
pub use error::ExecutorError;

use crate::guard::resolver::GuardedDns;
use crate::guard::UrlValidator;
use dashmap::DashMap;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use reqwest::Method;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;
use url::Url;

/// Which body cap applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyLimit {
    /// `max_body_bytes`
    #[default]
    General,
    /// `max_markup_bytes`, for pages that will be scanned
    Markup,
    Bytes(usize),
}

/// A single outbound request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    follow_redirects: bool,
    max_redirects: Option<usize>,
    body_limit: BodyLimit,
    verify_tls: bool,
    timeout: Option<Duration>,
    session: Option<Arc<Jar>>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            follow_redirects: true,
            max_redirects: None,
            body_limit: BodyLimit::General,
            verify_tls: true,
            timeout: None,
            session: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST with an `application/x-www-form-urlencoded` body.
    pub fn post_form<K, V>(url: Url, fields: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
            .finish();
        let mut request = Self::new(Method::POST, url);
        request.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        request.body = Some(encoded.into_bytes());
        request
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Return redirect responses as they are instead of following them.
    pub fn no_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = Some(max);
        self
    }

    pub fn body_limit(mut self, limit: BodyLimit) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn markup(self) -> Self {
        self.body_limit(BodyLimit::Markup)
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cookie jar read and updated at every hop.
    pub fn session(mut self, jar: Arc<Jar>) -> Self {
        self.session = Some(jar);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// URL of the last hop
    pub final_url: Url,
    /// Redirects followed
    pub redirects: usize,
    /// Wall time from the first byte sent to the body fully read
    pub elapsed: Duration,
}

impl Response {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP executor that enforces the request guard on every hop.
pub struct GuardedExecutor {
    validator: Arc<UrlValidator>,
    /// Client that verifies TLS certificates
    client: reqwest::Client,
    /// Client for targets configured with `verify_tls = false`
    insecure_client: reqwest::Client,
    config: HttpConfig,
    total: Arc<Semaphore>,
    per_host: DashMap<String, Arc<Semaphore>>,
    closed: AtomicBool,
}

impl GuardedExecutor {
    pub fn new(config: HttpConfig, validator: Arc<UrlValidator>) -> Result<Self, ExecutorError> {
        let dns = GuardedDns::new(Arc::clone(&validator));
        let client = build_client(&config, dns.clone(), true)?;
        let insecure_client = build_client(&config, dns, false)?;
        let total = Arc::new(Semaphore::new(config.max_connections.max(1)));

        Ok(Self {
            validator,
            client,
            insecure_client,
            config,
            total,
            per_host: DashMap::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    pub fn validator(&self) -> &UrlValidator {
        &self.validator
    }

    /// Execute a request, following redirects if enabled.
    ///
    /// The whole redirect chain shares one deadline.
    pub async fn execute(&self, request: Request) -> Result<Response, ExecutorError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExecutorError::Closed);
        }
        let deadline = request.timeout.unwrap_or_else(|| self.config.timeout());
        match tokio::time::timeout(deadline, self.run(request, deadline)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout(deadline)),
        }
    }

    /// Stop accepting requests. Requests waiting for a slot fail with
    /// [`ExecutorError::Closed`].
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.total.close();
        for entry in self.per_host.iter() {
            entry.value().close();
        }
        debug!("Guarded executor shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn run(&self, request: Request, deadline: Duration) -> Result<Response, ExecutorError> {
        let Request {
            mut method,
            mut url,
            mut headers,
            body: mut payload,
            follow_redirects,
            max_redirects,
            body_limit,
            verify_tls,
            session,
            ..
        } = request;
        let max_redirects = max_redirects.unwrap_or(self.config.max_redirects);
        let limit = match body_limit {
            BodyLimit::General => self.config.max_body_bytes,
            BodyLimit::Markup => self.config.max_markup_bytes,
            BodyLimit::Bytes(n) => n,
        };
        let client = if verify_tls {
            &self.client
        } else {
            &self.insecure_client
        };
        let start = Instant::now();
        let mut redirects = 0;

        loop {
            self.validator.validate(&url).await?;
            let _permits = self.acquire(&url).await?;

            let mut builder = client
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(jar) = &session {
                if let Some(cookies) = jar.cookies(&url) {
                    builder = builder.header(COOKIE, cookies);
                }
            }
            if let Some(bytes) = &payload {
                builder = builder.body(bytes.clone());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| error::classify_reqwest_error(e, deadline))?;

            if let Some(jar) = &session {
                let mut set_cookies = response.headers().get_all(SET_COOKIE).iter();
                jar.set_cookies(&mut set_cookies, &url);
            }

            let status = response.status();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match location {
                Some(location) if follow_redirects && status.is_redirection() => {
                    if redirects >= max_redirects {
                        return Err(ExecutorError::TooManyRedirects(max_redirects));
                    }
                    let next = redirect::resolve_location(&url, &location).map_err(|e| {
                        ExecutorError::InvalidRedirect {
                            location: location.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    debug!(
                        status = status.as_u16(),
                        from = %url,
                        to = %next,
                        hop = redirects + 1,
                        "Following redirect"
                    );
                    redirect::strip_cross_origin_headers(&mut headers, &url, &next);
                    let (next_method, next_body) = redirect::next_request(status, method, payload);
                    if next_body.is_none() {
                        headers.remove(CONTENT_TYPE);
                    }
                    method = next_method;
                    payload = next_body;
                    url = next;
                    redirects += 1;
                }
                _ => {
                    let response_headers = response.headers().clone();
                    let bytes = body::read_capped(response, limit, deadline).await?;
                    return Ok(Response {
                        status: status.as_u16(),
                        headers: response_headers,
                        body: bytes,
                        final_url: url,
                        redirects,
                        elapsed: start.elapsed(),
                    });
                }
            }
        }
    }

    async fn acquire(
        &self,
        url: &Url,
    ) -> Result<(OwnedSemaphorePermit, OwnedSemaphorePermit), ExecutorError> {
        let total = Arc::clone(&self.total)
            .acquire_owned()
            .await
            .map_err(|_| ExecutorError::Closed)?;

        let host = format!(
            "{}:{}",
            url.host_str().unwrap_or_default(),
            url.port_or_known_default().unwrap_or_default()
        );
        let semaphore = self
            .per_host
            .entry(host)
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_connections_per_host.max(1))))
            .clone();
        if self.closed.load(Ordering::Acquire) {
            semaphore.close();
        }
        let per_host = semaphore
            .acquire_owned()
            .await
            .map_err(|_| ExecutorError::Closed)?;
        Ok((total, per_host))
    }
}

fn build_client(
    config: &HttpConfig,
    dns: GuardedDns,
    verify_tls: bool,
) -> Result<reqwest::Client, ExecutorError> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.timeout())
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .dns_resolver(Arc::new(dns))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_seconds))
        .user_agent(config.user_agent.clone())
        .danger_accept_invalid_certs(!verify_tls)
        .build()
        .map_err(|e| ExecutorError::Client(e.to_string()))
}
