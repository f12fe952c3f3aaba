//! Session lifecycle: register, login, refresh, logout.
//!
//! The backend issues short-lived bearer access tokens plus a rotating
//! refresh credential delivered as an HTTP-only cookie. Only the access
//! token is visible to this SDK; the cookie rides the shared cookie jar.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    client::ClientInner,
    errors::{Result, ValidationError},
    http::RequestOptions,
};

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// Access-token grant returned by login and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Seconds until the access token expires.
    pub expires_in: u64,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
struct LogoutResponse {
    #[allow(dead_code)]
    message: String,
}

fn require_field<'a>(value: &'a str, field_name: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("is required")
            .with_field(field_name)
            .into());
    }
    Ok(trimmed)
}

#[derive(Clone)]
pub struct AuthClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl AuthClient {
    /// Create an account. Does not log in; call [`AuthClient::login`] after.
    pub async fn register(&self, req: RegisterRequest) -> Result<UserAccount> {
        require_field(&req.email, "email")?;
        require_field(&req.password, "password")?;
        require_field(&req.full_name, "full_name")?;

        let options = RequestOptions::default().without_auth_refresh();
        let builder = self.inner.request(Method::POST, "/auth/register").json(&req);
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::POST, "/auth/register");
        self.inner.execute_json(builder, &options, ctx).await
    }

    /// Exchange credentials for an access token. On success the token is
    /// stored so subsequent requests carry it; the refresh cookie lands in
    /// the shared cookie jar.
    pub async fn login(&self, req: LoginRequest) -> Result<TokenResponse> {
        require_field(&req.email, "email")?;
        require_field(&req.password, "password")?;

        // A 401 here means bad credentials; refreshing would be nonsense.
        let options = RequestOptions::default().without_auth_refresh();
        let builder = self.inner.request(Method::POST, "/auth/login").json(&req);
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::POST, "/auth/login");
        let token: TokenResponse = self.inner.execute_json(builder, &options, ctx).await?;
        self.inner.tokens.set(token.access_token.as_str());
        Ok(token)
    }

    /// Manually rotate the access token using the cookie-jar refresh
    /// credential. The gateway performs this automatically on 401; this is
    /// for callers that refresh proactively.
    pub async fn refresh(&self) -> Result<TokenResponse> {
        let options = RequestOptions::default().without_auth_refresh();
        let builder = self.inner.request(Method::POST, "/auth/refresh");
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::POST, "/auth/refresh");
        let token: TokenResponse = self.inner.execute_json(builder, &options, ctx).await?;
        self.inner.tokens.set(token.access_token.as_str());
        Ok(token)
    }

    /// Revoke the refresh credential and tear down local session state. The
    /// access token is cleared and any callers parked on an in-flight
    /// refresh are rejected, even if the revocation request itself fails.
    pub async fn logout(&self) -> Result<()> {
        let options = RequestOptions::default().without_auth_refresh();
        let builder = self.inner.request(Method::POST, "/auth/logout");
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::POST, "/auth/logout");
        let result = self
            .inner
            .execute_json::<LogoutResponse>(builder, &options, ctx)
            .await;

        self.inner.tokens.clear();
        self.inner.gate.reject_pending();
        result.map(|_| ())
    }

    /// Fetch the authenticated account.
    pub async fn me(&self) -> Result<UserAccount> {
        let options = RequestOptions::default();
        let builder = self.inner.request(Method::GET, "/users/me");
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::GET, "/users/me");
        self.inner.execute_json(builder, &options, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_defaults_token_type() {
        let token: TokenResponse =
            serde_json::from_str("{\"access_token\":\"t1\",\"expires_in\":300}").unwrap();
        assert_eq!(token.token_type, "bearer");
        assert_eq!(token.expires_in, 300);
    }

    #[test]
    fn user_account_tolerates_missing_optional_fields() {
        let account: UserAccount =
            serde_json::from_str("{\"id\":\"u1\",\"email\":\"a@b.c\"}").unwrap();
        assert!(account.full_name.is_none());
        assert!(account.created_at.is_none());
    }

    #[test]
    fn require_field_trims_and_rejects_blank() {
        assert_eq!(require_field(" x ", "email").unwrap(), "x");
        assert!(require_field("  ", "email").is_err());
    }
}
