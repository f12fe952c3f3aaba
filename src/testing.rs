//! Helpers for wiring the client against a mock server in tests.

use std::time::Duration;

use crate::{Client, Config};

/// Create a test client pointing at a wiremock server, pre-seeded with an
/// access token and short timeouts for predictable behavior.
pub fn test_client(base_url: &str) -> Client {
    Client::new(Config {
        base_url: Some(base_url.to_string()),
        access_token: Some("test-token".to_string()),
        timeout: Some(Duration::from_secs(5)),
        connect_timeout: Some(Duration::from_secs(2)),
        ..Default::default()
    })
    .expect("client")
}

/// Same as [`test_client`] but without a seeded token, for exercising
/// unauthenticated flows.
pub fn test_client_anonymous(base_url: &str) -> Client {
    Client::new(Config {
        base_url: Some(base_url.to_string()),
        timeout: Some(Duration::from_secs(5)),
        connect_timeout: Some(Duration::from_secs(2)),
        ..Default::default()
    })
    .expect("client")
}
