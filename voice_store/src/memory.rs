use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{NewVoice, StoreError, Voice, VoiceStore, VoiceUpdate};

/// Process-local store, used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryVoiceStore {
    voices: RwLock<Vec<Voice>>,
}

impl MemoryVoiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VoiceStore for MemoryVoiceStore {
    async fn create(&self, voice: NewVoice) -> Result<Voice, StoreError> {
        voice.validate()?;
        let now = Utc::now();
        let record = Voice {
            id: Uuid::new_v4(),
            user_id: voice.user_id,
            voice_id: voice.voice_id,
            name: voice.name,
            description: voice.description,
            preview_url: voice.preview_url,
            settings: voice.settings,
            created_at: now,
            updated_at: now,
        };
        self.voices.write().await.push(record.clone());
        Ok(record)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Voice>, StoreError> {
        let voices = self.voices.read().await;
        // Reverse first so records sharing a timestamp still come out newest first.
        let mut owned: Vec<Voice> = voices
            .iter()
            .rev()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn update(&self, user_id: &str, id: Uuid, update: VoiceUpdate) -> Result<Voice, StoreError> {
        let mut voices = self.voices.write().await;
        let voice = voices
            .iter_mut()
            .find(|v| v.id == id && v.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        update.apply(voice);
        voice.updated_at = Utc::now();
        Ok(voice.clone())
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<(), StoreError> {
        let mut voices = self.voices.write().await;
        let before = voices.len();
        voices.retain(|v| !(v.id == id && v.user_id == user_id));
        if voices.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
