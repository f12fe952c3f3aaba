//! Resume generation jobs: submit a draft, track status, list and delete.
//!
//! Generation is asynchronous server-side: `create` returns `202 Accepted`
//! with a `resume_id`, and the job is tracked via `GET /resumes/{id}`,
//! usually through [`ResumesClient::watch`], which drives a
//! [`StatusPoller`](crate::poll::StatusPoller) until a terminal state.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::{
    client::ClientInner,
    errors::{Error, Result, TransportError, ValidationError},
    http::RequestOptions,
    identifiers::{ResumeId, TemplateId},
    poll::{PollConfig, StatusPoller},
};

/// Lifecycle status of a generation job.
///
/// The server vocabulary has drifted over time (`completed`/`failed` in older
/// records, `complete`/`error` today), so parsing normalizes both spellings.
/// Unrecognized values land in `Other` and are treated as still-processing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResumeStatus {
    Draft,
    Pending,
    Processing,
    Complete,
    Error,
    Other(String),
}

impl ResumeStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ResumeStatus::Draft => "draft",
            ResumeStatus::Pending => "pending",
            ResumeStatus::Processing => "processing",
            ResumeStatus::Complete => "complete",
            ResumeStatus::Error => "error",
            ResumeStatus::Other(other) => other.as_str(),
        }
    }

    /// Whether the job will make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResumeStatus::Complete | ResumeStatus::Error)
    }
}

impl From<&str> for ResumeStatus {
    fn from(value: &str) -> Self {
        ResumeStatus::from(value.to_string())
    }
}

impl From<String> for ResumeStatus {
    fn from(value: String) -> Self {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "draft" => ResumeStatus::Draft,
            "pending" => ResumeStatus::Pending,
            "processing" => ResumeStatus::Processing,
            "complete" | "completed" => ResumeStatus::Complete,
            "error" | "failed" => ResumeStatus::Error,
            _ => ResumeStatus::Other(normalized),
        }
    }
}

impl From<ResumeStatus> for String {
    fn from(value: ResumeStatus) -> Self {
        value.as_str().to_string()
    }
}

/// Status report for one generation job.
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeStatusReport {
    pub resume_id: ResumeId,
    pub status: ResumeStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// Present once the rendered PDF is available.
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default, alias = "error")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

/// Decode a status payload in either accepted wire shape.
///
/// Canonical responses put the report at the top level. Older servers nest
/// it under a `resume` key; that envelope is probed first and kept only as a
/// compatibility shim.
pub(crate) fn decode_status_payload(value: Value) -> Result<ResumeStatusReport> {
    if let Some(nested) = value.get("resume") {
        if nested.is_object() {
            return serde_json::from_value(nested.clone()).map_err(Error::Serialization);
        }
    }
    serde_json::from_value(value).map_err(Error::Serialization)
}

/// Acknowledgement for an accepted generation request.
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeCreateResponse {
    pub resume_id: ResumeId,
    pub status: ResumeStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// Draft payload
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftProfile {
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub company: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EducationEntry {
    pub institution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftSkills {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technical: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub soft: Vec<String>,
}

/// Rendering preferences forwarded to the template engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatePreferences {
    pub tone: String,
    pub bullets_per_section: u8,
    pub include_skills: bool,
    pub include_projects: bool,
    pub include_certifications: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateId>,
}

impl Default for TemplatePreferences {
    fn default() -> Self {
        Self {
            tone: "professional".to_string(),
            bullets_per_section: 3,
            include_skills: true,
            include_projects: true,
            include_certifications: true,
            color_scheme: Some("blue".to_string()),
            font_family: Some("Arial".to_string()),
            template: None,
        }
    }
}

/// Structured input for a generation job.
///
/// AI enhancement only rewrites text in the sections named by
/// `sections_to_enhance`; it never adds or removes sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeDraft {
    pub profile: DraftProfile,
    /// Job posting to tailor against; optional for plain profile exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub education: Vec<EducationEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<ProjectEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<DraftSkills>,
    #[serde(default)]
    pub ai_enhancement: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections_to_enhance: Vec<String>,
    #[serde(default)]
    pub template_preferences: TemplatePreferences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
}

impl ResumeDraft {
    /// Mirror of the server-side draft validation, run before dispatch so
    /// obviously broken drafts never cost a round trip.
    pub fn validate(&self) -> Result<()> {
        if self.profile.full_name.trim().is_empty() {
            return Err(ValidationError::new("is required")
                .with_field("profile.full_name")
                .into());
        }
        if self.experience.is_empty() {
            return Err(ValidationError::new("at least one experience entry is required")
                .with_field("experience")
                .into());
        }
        for (idx, entry) in self.experience.iter().enumerate() {
            if entry.company.trim().is_empty() || entry.title.trim().is_empty() {
                return Err(ValidationError::new("company and title are required")
                    .with_field(format!("experience[{idx}]"))
                    .into());
            }
        }
        Ok(())
    }
}

// ============================================================================
// Client
// ============================================================================

#[derive(Clone)]
pub struct ResumesClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ResumesClient {
    /// Submit a draft for generation. Returns immediately with a
    /// `processing` acknowledgement; track completion via
    /// [`ResumesClient::watch`] or [`ResumesClient::status`].
    pub async fn create(&self, draft: &ResumeDraft) -> Result<ResumeCreateResponse> {
        self.create_with_options(draft, RequestOptions::default())
            .await
    }

    pub async fn create_with_options(
        &self,
        draft: &ResumeDraft,
        options: RequestOptions,
    ) -> Result<ResumeCreateResponse> {
        draft.validate()?;
        let builder = self.inner.request(Method::POST, "/resumes").json(draft);
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::POST, "/resumes");
        self.inner.execute_json(builder, &options, ctx).await
    }

    /// Fetch the current status report for a job.
    pub async fn status(&self, resume_id: ResumeId) -> Result<ResumeStatusReport> {
        self.status_with_options(resume_id, RequestOptions::default())
            .await
    }

    pub async fn status_with_options(
        &self,
        resume_id: ResumeId,
        options: RequestOptions,
    ) -> Result<ResumeStatusReport> {
        if resume_id.is_nil() {
            return Err(ValidationError::new("resume_id is required")
                .with_field("resume_id")
                .into());
        }
        let path = format!("/resumes/{resume_id}");
        let builder = self.inner.request(Method::GET, &path);
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::GET, &path);
        let payload: Value = self.inner.execute_json(builder, &options, ctx).await?;
        decode_status_payload(payload)
    }

    /// List the caller's jobs, newest first.
    pub async fn list(&self, limit: Option<u32>, skip: Option<u32>) -> Result<Vec<ResumeStatusReport>> {
        let mut path = "/resumes".to_string();
        let mut q = vec![];
        if let Some(limit) = limit {
            q.push(("limit", limit.to_string()));
        }
        if let Some(skip) = skip {
            q.push(("skip", skip.to_string()));
        }
        if !q.is_empty() {
            path.push('?');
            path.push_str(
                &q.into_iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("&"),
            );
        }

        let options = RequestOptions::default();
        let builder = self.inner.request(Method::GET, &path);
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::GET, &path);
        let payload: Vec<Value> = self.inner.execute_json(builder, &options, ctx).await?;
        payload.into_iter().map(decode_status_payload).collect()
    }

    pub async fn delete(&self, resume_id: ResumeId) -> Result<()> {
        if resume_id.is_nil() {
            return Err(ValidationError::new("resume_id is required")
                .with_field("resume_id")
                .into());
        }
        let options = RequestOptions::default();
        let path = format!("/resumes/{resume_id}");
        let builder = self.inner.request(Method::DELETE, &path);
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::DELETE, &path);
        self.inner
            .send_authorized(builder, &options, ctx)
            .await
            .map(|_| ())
    }

    /// Start polling a job until it reaches a terminal state. The returned
    /// handle exposes snapshots, `stop()`, and `wait()`; dropping it stops
    /// the poll.
    pub fn watch(&self, resume_id: ResumeId, config: PollConfig) -> Result<StatusPoller> {
        let poller = StatusPoller::new(self.clone(), resume_id, config)?;
        poller.start();
        Ok(poller)
    }

    /// Fetch the PDF bytes for a completed job via its download URL.
    pub async fn download(&self, report: &ResumeStatusReport) -> Result<Vec<u8>> {
        let url = report.download_url.as_deref().ok_or_else(|| {
            Error::from(ValidationError::new("report has no download_url").with_field("download_url"))
        })?;
        let options = RequestOptions::default();
        let builder = self.inner.request_absolute(Method::GET, url)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::GET, url);
        let resp = self.inner.send_authorized(builder, &options, ctx).await?;
        let bytes = resp.bytes().await.map_err(TransportError::from_reqwest)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_normalizes_legacy_spellings() {
        assert_eq!(ResumeStatus::from("completed"), ResumeStatus::Complete);
        assert_eq!(ResumeStatus::from("failed"), ResumeStatus::Error);
        assert_eq!(ResumeStatus::from(" Processing "), ResumeStatus::Processing);
    }

    #[test]
    fn unknown_status_is_not_terminal() {
        let status = ResumeStatus::from("queued_for_ocr");
        assert_eq!(status, ResumeStatus::Other("queued_for_ocr".into()));
        assert!(!status.is_terminal());
        assert!(ResumeStatus::Complete.is_terminal());
        assert!(ResumeStatus::Error.is_terminal());
    }

    #[test]
    fn decodes_top_level_report() {
        let report = decode_status_payload(json!({
            "resume_id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "status": "processing"
        }))
        .unwrap();
        assert_eq!(report.status, ResumeStatus::Processing);
    }

    #[test]
    fn decodes_legacy_resume_envelope() {
        let report = decode_status_payload(json!({
            "resume": {
                "resume_id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
                "status": "complete",
                "download_url": "https://files.example.com/r1.pdf"
            }
        }))
        .unwrap();
        assert_eq!(report.status, ResumeStatus::Complete);
        assert_eq!(
            report.download_url.as_deref(),
            Some("https://files.example.com/r1.pdf")
        );
    }

    #[test]
    fn error_field_alias_is_accepted() {
        let report = decode_status_payload(json!({
            "resume_id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "status": "error",
            "error": "LLM quota exceeded"
        }))
        .unwrap();
        assert_eq!(report.error_message.as_deref(), Some("LLM quota exceeded"));
    }

    #[test]
    fn draft_requires_full_name_and_experience() {
        let err = ResumeDraft::default().validate().expect_err("empty draft");
        match err {
            Error::Validation(v) => assert_eq!(v.field.as_deref(), Some("profile.full_name")),
            other => panic!("expected validation error, got {other:?}"),
        }

        let draft = ResumeDraft {
            profile: DraftProfile {
                full_name: "Ada Lovelace".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = draft.validate().expect_err("no experience");
        match err {
            Error::Validation(v) => assert_eq!(v.field.as_deref(), Some("experience")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_draft_passes() {
        let draft = ResumeDraft {
            profile: DraftProfile {
                full_name: "Ada Lovelace".into(),
                ..Default::default()
            },
            experience: vec![ExperienceEntry {
                company: "Analytical Engines Ltd".into(),
                title: "Engineer".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn template_preferences_default_tone() {
        let prefs = TemplatePreferences::default();
        assert_eq!(prefs.tone, "professional");
        assert_eq!(prefs.bullets_per_section, 3);
    }
}
