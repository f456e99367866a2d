// src/services/media_library.rs
//! Media library persistence: one row per finished generation.

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{MediaRepository, ServiceResult};
use crate::models::media_item::MediaItem;

pub struct PostgresMediaRepository {
    pool: PgPool,
}

impl PostgresMediaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Setup media library table
    pub async fn setup(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS media_items (
                id VARCHAR(255) PRIMARY KEY,
                user_email VARCHAR(255) NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                media_type VARCHAR(32) NOT NULL,
                mime_type VARCHAR(64) NOT NULL,
                gcs_uri TEXT NOT NULL,
                gcs_uris JSONB NOT NULL,
                prompt TEXT,
                model VARCHAR(128) NOT NULL,
                duration DOUBLE PRECISION NOT NULL,
                generation_time DOUBLE PRECISION NOT NULL,
                comment TEXT,
                mode VARCHAR(32) NOT NULL,
                r2v_reference_images JSONB NOT NULL,
                source_uris JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_media_items_user_email_timestamp
            ON media_items(user_email, timestamp DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("✅ Media library table setup complete");
        Ok(())
    }
}

#[async_trait]
impl MediaRepository for PostgresMediaRepository {
    async fn add_media_item(&self, item: MediaItem) -> ServiceResult<String> {
        let id = item.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        sqlx::query(
            r#"
            INSERT INTO media_items
            (id, user_email, timestamp, media_type, mime_type, gcs_uri, gcs_uris, prompt,
             model, duration, generation_time, comment, mode, r2v_reference_images, source_uris)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(&id)
        .bind(&item.user_email)
        .bind(item.timestamp)
        .bind(&item.media_type)
        .bind(&item.mime_type)
        .bind(&item.gcs_uri)
        .bind(serde_json::to_value(&item.gcs_uris)?)
        .bind(&item.prompt)
        .bind(&item.model)
        .bind(item.duration)
        .bind(item.generation_time)
        .bind(&item.comment)
        .bind(&item.mode)
        .bind(serde_json::to_value(&item.r2v_reference_images)?)
        .bind(serde_json::to_value(&item.source_uris)?)
        .execute(&self.pool)
        .await?;

        info!(media_item_id = %id, user_email = %item.user_email, "Media item stored");
        Ok(id)
    }
}

/// Keeps media items in process memory. Used when no database is configured.
#[derive(Default)]
pub struct InMemoryMediaRepository {
    items: RwLock<Vec<MediaItem>>,
}

impl InMemoryMediaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn items(&self) -> Vec<MediaItem> {
        self.items.read().await.clone()
    }
}

#[async_trait]
impl MediaRepository for InMemoryMediaRepository {
    async fn add_media_item(&self, mut item: MediaItem) -> ServiceResult<String> {
        let id = item.id.get_or_insert_with(|| Uuid::new_v4().to_string()).clone();
        self.items.write().await.push(item);
        info!(media_item_id = %id, "Media item stored in memory");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_item() -> MediaItem {
        MediaItem {
            id: None,
            user_email: "player@example.com".to_string(),
            timestamp: Utc::now(),
            media_type: "video".to_string(),
            mime_type: "video/mp4".to_string(),
            gcs_uri: "gs://bucket/final.mp4".to_string(),
            gcs_uris: vec!["gs://bucket/final.mp4".to_string()],
            prompt: Some("A pixel hero runs".to_string()),
            model: "veo-3.1-preview".to_string(),
            duration: 8.0,
            generation_time: 42.0,
            comment: None,
            mode: "r2v".to_string(),
            r2v_reference_images: vec![],
            source_uris: vec![],
        }
    }

    #[tokio::test]
    async fn test_in_memory_assigns_ids() {
        let repo = InMemoryMediaRepository::new();
        let first = repo.add_media_item(sample_item()).await.unwrap();
        let second = repo.add_media_item(sample_item()).await.unwrap();

        assert_ne!(first, second);
        let items = repo.items().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id.as_deref(), Some(first.as_str()));
    }
}
