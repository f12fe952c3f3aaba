//! Rust client SDK for the TailorCV resume generation API.
//!
//! The backend generates resumes asynchronously: submitting a draft returns
//! `202 Accepted` with a job id, and completion is tracked by polling the
//! status endpoint. This crate wraps that surface with an authenticated
//! client (bearer token + transparent single-flight refresh on 401) and a
//! cancellable status poller with bounded attempts and capped linear
//! backoff.

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.tailorcv.app/api/v1";

/// Default User-Agent-style client identification header value.
pub(crate) const DEFAULT_CLIENT_HEADER: &str = concat!("tailorcv-rust/", env!("CARGO_PKG_VERSION"));

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// HTTP header name for request ID tracing.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// HTTP header name identifying the SDK to the backend.
pub(crate) const CLIENT_HEADER: &str = "X-TailorCV-Client";

mod auth;
mod client;
mod errors;
mod gateway;
mod http;
mod identifiers;
mod poll;
mod profile;
mod resumes;
mod telemetry;
pub mod testing;

pub use auth::{AuthClient, LoginRequest, RegisterRequest, TokenResponse, UserAccount};
pub use client::{Client, Config};
pub use errors::{
    ApiError, Error, Result, TransportError, TransportErrorKind, ValidationError,
};
pub use gateway::{SessionRefresher, TokenRefresher, TokenStore};
pub use http::{HeaderEntry, HeaderList, RequestOptions};
pub use identifiers::{ResumeId, TemplateId};
pub use poll::{
    PollConfig, PollMachine, PollPhase, PollSnapshot, PollVerdict, StatusPoller, TIMEOUT_MESSAGE,
};
pub use profile::{Profile, ProfileClient, ProfileExists};
pub use resumes::{
    DraftProfile, DraftSkills, EducationEntry, ExperienceEntry, ProjectEntry,
    ResumeCreateResponse, ResumeDraft, ResumeStatus, ResumeStatusReport, ResumesClient,
    TemplatePreferences,
};
pub use telemetry::{
    HttpRequestMetrics, MetricsCallbacks, PollAttemptMetrics, RequestContext,
};
