use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{
    header::{HeaderName, HeaderValue, ACCEPT},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;

use crate::{
    auth::AuthClient,
    errors::{Error, Result, TransportError},
    gateway::{RefreshGate, SessionRefresher, TokenRefresher, TokenStore},
    http::{parse_api_error_parts, HeaderList, RequestOptions},
    profile::ProfileClient,
    resumes::ResumesClient,
    telemetry::{HttpRequestMetrics, RequestContext, Telemetry},
    CLIENT_HEADER, DEFAULT_BASE_URL, DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT, REQUEST_ID_HEADER,
};

#[derive(Clone, Default)]
pub struct Config {
    pub base_url: Option<String>,
    /// Access token to seed the session with (e.g. restored from storage).
    /// Usually left unset; `AuthClient::login` populates the token store.
    pub access_token: Option<String>,
    pub client_header: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Default extra headers applied to all requests.
    pub default_headers: Option<HeaderList>,
    /// Optional metrics callbacks (HTTP latency, poll attempts).
    pub metrics: Option<crate::telemetry::MetricsCallbacks>,
    /// Custom refresh implementation. Defaults to posting `/auth/refresh`
    /// with the cookie-jar refresh credential.
    pub refresher: Option<Arc<dyn TokenRefresher>>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("client_header", &self.client_header)
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .field("client_header", &self.inner.client_header)
            .field("request_timeout", &self.inner.request_timeout)
            .finish_non_exhaustive()
    }
}

pub(crate) struct ClientInner {
    base_url: String,
    http: reqwest::Client,
    request_timeout: Duration,
    client_header: String,
    default_headers: Option<HeaderList>,
    pub(crate) tokens: TokenStore,
    pub(crate) gate: RefreshGate,
    pub(crate) refresher: Arc<dyn TokenRefresher>,
    pub(crate) telemetry: Telemetry,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let base = cfg
            .base_url
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base = base.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base)
            .map_err(|err| Error::Config(format!("invalid base url: {err}")))?;

        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let request_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        // The refresh credential is an HTTP-only cookie, so the client keeps
        // a cookie jar even though the SDK never reads cookies itself.
        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .cookie_store(true)
                .build()
                .map_err(|err| TransportError::connect("failed to build http client", err))?,
        };

        let tokens = match cfg.access_token.filter(|t| !t.trim().is_empty()) {
            Some(token) => TokenStore::with_token(token),
            None => TokenStore::new(),
        };

        let refresher = cfg
            .refresher
            .unwrap_or_else(|| Arc::new(SessionRefresher::new(http.clone(), base.clone())));

        let client_header = cfg
            .client_header
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLIENT_HEADER.to_string());

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url: base,
                http,
                request_timeout,
                client_header,
                default_headers: cfg.default_headers,
                tokens,
                gate: RefreshGate::new(),
                refresher,
                telemetry: Telemetry::new(cfg.metrics),
            }),
        })
    }

    pub fn auth(&self) -> AuthClient {
        AuthClient {
            inner: self.inner.clone(),
        }
    }

    pub fn resumes(&self) -> ResumesClient {
        ResumesClient {
            inner: self.inner.clone(),
        }
    }

    pub fn profile(&self) -> ProfileClient {
        ProfileClient {
            inner: self.inner.clone(),
        }
    }

    /// Handle to the shared access-token cell.
    pub fn tokens(&self) -> TokenStore {
        self.inner.tokens.clone()
    }
}

fn apply_header_list(
    mut builder: reqwest::RequestBuilder,
    headers: &HeaderList,
) -> Result<reqwest::RequestBuilder> {
    for entry in headers.iter() {
        if !entry.is_valid() {
            continue;
        }
        let name = HeaderName::from_bytes(entry.key.trim().as_bytes())
            .map_err(|err| Error::Config(format!("invalid header name: {err}")))?;
        let val = HeaderValue::from_str(entry.value.trim())
            .map_err(|err| Error::Config(format!("invalid header value: {err}")))?;
        builder = builder.header(name, val);
    }
    Ok(builder)
}

impl ClientInner {
    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.http.request(method, url)
    }

    /// Request against a fully-qualified URL (e.g. a presigned download).
    pub(crate) fn request_absolute(
        &self,
        method: Method,
        url: &str,
    ) -> Result<reqwest::RequestBuilder> {
        let url = reqwest::Url::parse(url)
            .map_err(|err| Error::Config(format!("invalid url: {err}")))?;
        Ok(self.http.request(method, url))
    }

    pub(crate) fn with_headers(
        &self,
        mut builder: reqwest::RequestBuilder,
        options: &RequestOptions,
    ) -> Result<reqwest::RequestBuilder> {
        builder = builder.header(ACCEPT, "application/json");
        if let Some(req_id) = options.request_id.as_deref() {
            if !req_id.trim().is_empty() {
                builder = builder.header(REQUEST_ID_HEADER, req_id);
            }
        }
        builder = builder.header(CLIENT_HEADER, self.client_header.as_str());

        if let Some(defaults) = &self.default_headers {
            builder = apply_header_list(builder, defaults)?;
        }
        builder = apply_header_list(builder, &options.headers)?;

        Ok(builder)
    }

    pub(crate) fn with_timeout(
        &self,
        builder: reqwest::RequestBuilder,
        timeout: Option<Duration>,
    ) -> reqwest::RequestBuilder {
        builder.timeout(timeout.unwrap_or(self.request_timeout))
    }

    pub(crate) fn make_context(&self, method: &Method, path: &str) -> RequestContext {
        RequestContext::new(method.as_str(), path)
    }

    fn record_http(
        &self,
        start: Instant,
        status: Option<u16>,
        error: Option<String>,
        auth_retry: bool,
        ctx: &RequestContext,
    ) {
        if self.telemetry.http_enabled() {
            self.telemetry.record_http(HttpRequestMetrics {
                latency: start.elapsed(),
                status,
                error,
                auth_retry,
                context: ctx.clone(),
            });
        }
    }

    async fn error_from_response(&self, resp: reqwest::Response, ctx: &RequestContext) -> Error {
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await.unwrap_or_default();
        tracing::warn!(
            method = %ctx.method,
            path = %ctx.path,
            status = status.as_u16(),
            "request failed"
        );
        parse_api_error_parts(status, &headers, body)
    }

    /// Issue a request with the current bearer attached; on a 401 (unless the
    /// caller opted out) recover once through the refresh gate and retry with
    /// the new token. The retry is never refreshed again.
    pub(crate) async fn send_authorized(
        &self,
        builder: reqwest::RequestBuilder,
        options: &RequestOptions,
        ctx: RequestContext,
    ) -> Result<reqwest::Response> {
        let ctx = ctx.with_request_id(options.request_id.clone());
        let retry_builder = builder.try_clone();
        let start = Instant::now();

        let mut attempt = builder;
        if let Some(token) = self.tokens.get() {
            attempt = attempt.bearer_auth(token);
        }
        tracing::debug!(method = %ctx.method, path = %ctx.path, "dispatching request");
        let resp = match attempt.send().await {
            Ok(resp) => resp,
            Err(err) => {
                self.record_http(start, None, Some(err.to_string()), false, &ctx);
                return Err(TransportError::from_reqwest(err));
            }
        };

        let status = resp.status();
        self.record_http(start, Some(status.as_u16()), None, false, &ctx);
        if status.is_success() {
            return Ok(resp);
        }
        if status != StatusCode::UNAUTHORIZED || options.skip_auth_refresh {
            return Err(self.error_from_response(resp, &ctx).await);
        }

        // Bodies built from streams are not cloneable; surface the 401 rather
        // than retry with a half-consumed request.
        let Some(retry_builder) = retry_builder else {
            return Err(self.error_from_response(resp, &ctx).await);
        };
        drop(resp);

        let token = self
            .gate
            .fresh_token(self.refresher.as_ref(), &self.tokens)
            .await?;

        let retry_start = Instant::now();
        let retry_resp = match retry_builder.bearer_auth(token).send().await {
            Ok(resp) => resp,
            Err(err) => {
                self.record_http(retry_start, None, Some(err.to_string()), true, &ctx);
                return Err(TransportError::from_reqwest(err));
            }
        };
        let retry_status = retry_resp.status();
        self.record_http(retry_start, Some(retry_status.as_u16()), None, true, &ctx);
        if retry_status.is_success() {
            Ok(retry_resp)
        } else {
            Err(self.error_from_response(retry_resp, &ctx).await)
        }
    }

    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        options: &RequestOptions,
        ctx: RequestContext,
    ) -> Result<T> {
        let resp = self.send_authorized(builder, options, ctx).await?;
        let bytes = resp.bytes().await.map_err(TransportError::from_reqwest)?;
        let parsed = serde_json::from_slice::<T>(&bytes).map_err(Error::Serialization)?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_base_url() {
        let err = Client::new(Config {
            base_url: Some("not a url".into()),
            ..Default::default()
        })
        .expect_err("bad base url");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn seeds_token_store_from_config() {
        let client = Client::new(Config {
            access_token: Some("tok_1".into()),
            ..Default::default()
        })
        .expect("client");
        assert_eq!(client.tokens().get().as_deref(), Some("tok_1"));
    }

    #[test]
    fn blank_access_token_is_ignored() {
        let client = Client::new(Config {
            access_token: Some("   ".into()),
            ..Default::default()
        })
        .expect("client");
        assert!(client.tokens().get().is_none());
    }

    #[test]
    fn config_debug_masks_token() {
        let cfg = Config {
            access_token: Some("secret".into()),
            ..Default::default()
        };
        let printed = format!("{cfg:?}");
        assert!(!printed.contains("secret"));
    }
}
