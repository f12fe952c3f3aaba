//! Professional profile CRUD. The profile is the persistent source that
//! resume drafts snapshot at creation time.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    client::ClientInner,
    errors::{Result, ValidationError},
    http::RequestOptions,
    resumes::{EducationEntry, ExperienceEntry, ProjectEntry},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub education: Vec<EducationEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<ProjectEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub awards: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileExists {
    pub exists: bool,
}

#[derive(Clone)]
pub struct ProfileClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ProfileClient {
    pub async fn get(&self) -> Result<Profile> {
        let options = RequestOptions::default();
        let builder = self.inner.request(Method::GET, "/profile");
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::GET, "/profile");
        self.inner.execute_json(builder, &options, ctx).await
    }

    /// Create or replace the profile.
    pub async fn upsert(&self, profile: &Profile) -> Result<Profile> {
        if profile.full_name.trim().is_empty() {
            return Err(ValidationError::new("is required")
                .with_field("full_name")
                .into());
        }
        let options = RequestOptions::default();
        let builder = self.inner.request(Method::POST, "/profile").json(profile);
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::POST, "/profile");
        self.inner.execute_json(builder, &options, ctx).await
    }

    pub async fn delete(&self) -> Result<()> {
        let options = RequestOptions::default();
        let builder = self.inner.request(Method::DELETE, "/profile");
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::DELETE, "/profile");
        self.inner
            .send_authorized(builder, &options, ctx)
            .await
            .map(|_| ())
    }

    pub async fn exists(&self) -> Result<bool> {
        let options = RequestOptions::default();
        let builder = self.inner.request(Method::GET, "/profile/exists");
        let builder = self.inner.with_headers(builder, &options)?;
        let builder = self.inner.with_timeout(builder, options.timeout);
        let ctx = self.inner.make_context(&Method::GET, "/profile/exists");
        let payload: ProfileExists = self.inner.execute_json(builder, &options, ctx).await?;
        Ok(payload.exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_round_trips_minimal_payload() {
        let profile: Profile =
            serde_json::from_str("{\"full_name\":\"Ada Lovelace\"}").unwrap();
        assert_eq!(profile.full_name, "Ada Lovelace");
        assert!(profile.skills.is_empty());

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["full_name"], "Ada Lovelace");
        assert!(json.get("skills").is_none());
    }
}
