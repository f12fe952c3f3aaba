//! Refresh-gateway tests: single-flight 401 recovery, waiter draining, and
//! the non-refreshable retry guarantee.

use std::str::FromStr;
use std::time::Duration;

use serde_json::json;
use tailorcv::testing::test_client;
use tailorcv::{Error, RequestOptions, ResumeId};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RESUME_ID: &str = "67e55044-10b1-426f-9247-bb680e5fe0c8";

fn resume_id() -> ResumeId {
    ResumeId::from_str(RESUME_ID).expect("resume id")
}

fn report_body() -> serde_json::Value {
    json!({ "resume_id": RESUME_ID, "status": "processing" })
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh_and_both_retry_with_new_token() {
    let server = MockServer::start().await;

    // The stale token always earns a 401.
    Mock::given(method("GET"))
        .and(path(format!("/resumes/{RESUME_ID}")))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token expired" })))
        .expect(2)
        .mount(&server)
        .await;

    // Exactly one refresh; the delay keeps the gate occupied long enough for
    // the second 401 observer to enqueue as a waiter.
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(100))
                .set_body_json(json!({ "access_token": "t2", "expires_in": 300 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Retries must carry the refreshed token.
    Mock::given(method("GET"))
        .and(path(format!("/resumes/{RESUME_ID}")))
        .and(header("Authorization", "Bearer t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(report_body()))
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let resumes = client.resumes();

    let (a, b) = tokio::join!(resumes.status(resume_id()), resumes.status(resume_id()));
    a.expect("first caller succeeds after refresh");
    b.expect("second caller succeeds after refresh");

    assert_eq!(client.tokens().get().as_deref(), Some("t2"));
}

#[tokio::test]
async fn failed_refresh_rejects_every_caller_without_retrying() {
    let server = MockServer::start().await;

    // Both original requests 401; with the refresh failing, no retry ever
    // happens, so these mocks see exactly one request each caller.
    Mock::given(method("GET"))
        .and(path(format!("/resumes/{RESUME_ID}")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token expired" })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_delay(Duration::from_millis(50))
                .set_body_json(json!({ "detail": "Invalid refresh token" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let resumes = client.resumes();

    let (a, b) = tokio::join!(resumes.status(resume_id()), resumes.status(resume_id()));
    for result in [a, b] {
        let err = result.expect_err("refresh failure should surface");
        assert!(matches!(err, Error::AuthFailure), "got {err:?}");
        assert_eq!(
            err.to_string(),
            "Authentication failed, please log in again"
        );
    }

    // The stale token was discarded.
    assert!(client.tokens().get().is_none());
}

#[tokio::test]
async fn post_refresh_retry_is_never_refreshed_again() {
    let server = MockServer::start().await;

    // 401 regardless of token: initial attempt + exactly one retry.
    Mock::given(method("GET"))
        .and(path(format!("/resumes/{RESUME_ID}")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token expired" })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t2", "expires_in": 300 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client
        .resumes()
        .status(resume_id())
        .await
        .expect_err("retry 401 surfaces as-is");
    match err {
        Error::Api(api) => assert!(api.is_unauthorized()),
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn opted_out_call_surfaces_401_without_refreshing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/resumes/{RESUME_ID}")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token expired" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t2", "expires_in": 300 })))
        .expect(0)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client
        .resumes()
        .status_with_options(resume_id(), RequestOptions::default().without_auth_refresh())
        .await
        .expect_err("401 surfaces directly");
    match err {
        Error::Api(api) => {
            assert!(api.is_unauthorized());
            assert_eq!(api.message, "Token expired");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_401_errors_bypass_the_gate() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/resumes/{RESUME_ID}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "Resume not found" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t2", "expires_in": 300 })))
        .expect(0)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client
        .resumes()
        .status(resume_id())
        .await
        .expect_err("404 surfaces directly");
    match err {
        Error::Api(api) => {
            assert_eq!(api.status, 404);
            assert_eq!(api.message, "Resume not found");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}
