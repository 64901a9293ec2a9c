use anyhow::Result;
use chrono::Utc;
use mediabrowse_core::{SearchKind, SearchRequest};
use sqlx::{Row, SqlitePool};

/// Repository for the single-row last search request
pub struct SearchSettingsRepository {
    pool: SqlitePool,
}

impl SearchSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self) -> Result<SearchRequest> {
        let row = sqlx::query(
            "SELECT query, title, artist, album, kind FROM search_settings WHERE id = 1"
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(SearchRequest::default());
        };

        let kind: String = row.get("kind");
        let kind = kind.parse::<SearchKind>().unwrap_or_else(|e| {
            tracing::warn!("{}, falling back to track", e);
            SearchKind::default()
        });

        Ok(SearchRequest {
            query: row.get("query"),
            title: row.get("title"),
            artist: row.get("artist"),
            album: row.get("album"),
            kind,
        })
    }

    pub async fn save(&self, request: &SearchRequest) -> Result<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT OR REPLACE INTO search_settings (id, query, title, artist, album, kind, updated_at)
             VALUES (1, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&request.query)
        .bind(&request.title)
        .bind(&request.artist)
        .bind(&request.album)
        .bind(request.kind.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Repository for named secrets
pub struct CredentialRepository {
    pool: SqlitePool,
}

impl CredentialRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, name: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT secret FROM credential WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get(0)))
    }

    pub async fn set(&self, name: &str, secret: &str) -> Result<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT OR REPLACE INTO credential (name, secret, updated_at) VALUES (?, ?, ?)"
        )
        .bind(name)
        .bind(secret)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM credential WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
