//! Supabase (PostgREST) backed store.
//!
//! The service-role key bypasses row-level security, so ownership is
//! enforced here with an explicit `user_id=eq.` filter on every query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::{NewVoice, StoreError, Voice, VoiceStore, VoiceUpdate};

const DEFAULT_TABLE: &str = "voices";

#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    pub service_key: String,
    pub table: String,
}

impl PostgrestConfig {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_key: service_key.into(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgrestVoiceStore {
    http: reqwest::Client,
    table_url: String,
    service_key: String,
}

#[derive(Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
}

#[derive(Serialize)]
struct PatchBody<'a> {
    #[serde(flatten)]
    update: &'a VoiceUpdate,
    updated_at: DateTime<Utc>,
}

impl PostgrestVoiceStore {
    pub fn new(config: PostgrestConfig) -> Result<Self, StoreError> {
        if config.url.trim().is_empty() || config.service_key.trim().is_empty() {
            return Err(StoreError::InvalidData(
                "Missing Supabase URL or service key".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            table_url: format!("{}/rest/v1/{}", config.url.trim_end_matches('/'), config.table),
            service_key: config.service_key,
        })
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=representation")
            .header(header::ACCEPT, "application/json")
    }

    /// Send and decode the returned rows.
    async fn rows(&self, builder: RequestBuilder) -> Result<Vec<Voice>, StoreError> {
        let response = self.authed(builder).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<Vec<Voice>>().await?)
    }

    fn owned_filter(user_id: &str, id: Uuid) -> [(&'static str, String); 2] {
        [("id", format!("eq.{id}")), ("user_id", format!("eq.{user_id}"))]
    }
}

async fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<PostgrestErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or(body);
    error!("Supabase returned {status}: {message}");
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl VoiceStore for PostgrestVoiceStore {
    async fn create(&self, voice: NewVoice) -> Result<Voice, StoreError> {
        voice.validate()?;
        let rows = self
            .rows(self.http.post(&self.table_url).query(&[("select", "*")]).json(&voice))
            .await?;
        let created = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::InvalidData("Voice creation returned no data".to_string()))?;
        debug!("Saved voice {} for user {}", created.id, created.user_id);
        Ok(created)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Voice>, StoreError> {
        let filter = format!("eq.{user_id}");
        self.rows(self.http.get(&self.table_url).query(&[
            ("select", "*"),
            ("user_id", filter.as_str()),
            ("order", "created_at.desc"),
        ]))
        .await
    }

    async fn update(&self, user_id: &str, id: Uuid, update: VoiceUpdate) -> Result<Voice, StoreError> {
        let body = PatchBody {
            update: &update,
            updated_at: Utc::now(),
        };
        let rows = self
            .rows(
                self.http
                    .patch(&self.table_url)
                    .query(&Self::owned_filter(user_id, id))
                    .json(&body),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<(), StoreError> {
        let rows = self
            .rows(self.http.delete(&self.table_url).query(&Self::owned_filter(user_id, id)))
            .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        debug!("Deleted voice {id}");
        Ok(())
    }
}
