//! Voice library persistence.
//!
//! A saved voice is a named reference to a provider voice id plus the
//! settings the user picked for it. Records are owned by an opaque user id;
//! every read and write is scoped to that id.

mod error;
mod memory;
mod postgrest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tts_core::VoiceSettings;
use uuid::Uuid;

pub use error::StoreError;
pub use memory::MemoryVoiceStore;
pub use postgrest::{PostgrestConfig, PostgrestVoiceStore};

/// A persisted voice record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub id: Uuid,
    pub user_id: String,
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub settings: VoiceSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape for [`Voice`]. Id and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVoice {
    pub user_id: String,
    pub voice_id: String,
    pub name: String,
    pub description: Option<String>,
    pub preview_url: Option<String>,
    #[serde(default)]
    pub settings: VoiceSettings,
}

impl NewVoice {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.user_id.trim().is_empty() {
            return Err(StoreError::InvalidData("user_id is required".to_string()));
        }
        if self.voice_id.trim().is_empty() {
            return Err(StoreError::InvalidData("voice_id is required".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(StoreError::InvalidData("name is required".to_string()));
        }
        Ok(())
    }
}

/// Partial update. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<VoiceSettings>,
}

impl VoiceUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.preview_url.is_none()
            && self.settings.is_none()
    }

    fn apply(&self, voice: &mut Voice) {
        if let Some(name) = &self.name {
            voice.name = name.clone();
        }
        if let Some(description) = &self.description {
            voice.description = Some(description.clone());
        }
        if let Some(preview_url) = &self.preview_url {
            voice.preview_url = Some(preview_url.clone());
        }
        if let Some(settings) = &self.settings {
            voice.settings = settings.clone();
        }
    }
}

/// Storage for saved voices.
#[async_trait]
pub trait VoiceStore: Send + Sync {
    async fn create(&self, voice: NewVoice) -> Result<Voice, StoreError>;

    /// All voices of `user_id`, newest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Voice>, StoreError>;

    async fn update(&self, user_id: &str, id: Uuid, update: VoiceUpdate) -> Result<Voice, StoreError>;

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<(), StoreError>;
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
