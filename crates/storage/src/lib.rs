use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use sanitation_core::{
    BinType, ClassId, Complaint, ComplaintDraft, ComplaintStatus, Language, WasteType,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

pub trait ComplaintRepository: Send + Sync {
    /// Inserts a new record. Existing ids are never overwritten.
    async fn insert_complaint(&self, complaint: &Complaint) -> Result<()>;
    async fn load_complaint(&self, id: &str) -> Result<Option<Complaint>>;
    async fn complaint_exists(&self, id: &str) -> Result<bool>;
    async fn recent_complaints(&self, limit: usize) -> Result<Vec<Complaint>>;
}

pub trait DraftRepository: Send + Sync {
    async fn load_draft(&self, draft_id: &str) -> Result<Option<ComplaintDraft>>;
    async fn upsert_draft(&self, draft: &ComplaintDraft) -> Result<()>;
    async fn remove_draft(&self, draft_id: &str) -> Result<bool>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    complaints: Arc<RwLock<HashMap<String, Complaint>>>,
    drafts: Arc<RwLock<HashMap<String, ComplaintDraft>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComplaintRepository for MemoryStore {
    async fn insert_complaint(&self, complaint: &Complaint) -> Result<()> {
        let mut complaints = self.complaints.write();
        if complaints.contains_key(&complaint.id) {
            anyhow::bail!("complaint {} already exists", complaint.id);
        }
        complaints.insert(complaint.id.clone(), complaint.clone());
        Ok(())
    }

    async fn load_complaint(&self, id: &str) -> Result<Option<Complaint>> {
        Ok(self.complaints.read().get(id).cloned())
    }

    async fn complaint_exists(&self, id: &str) -> Result<bool> {
        Ok(self.complaints.read().contains_key(id))
    }

    async fn recent_complaints(&self, limit: usize) -> Result<Vec<Complaint>> {
        let mut items = self.complaints.read().values().cloned().collect::<Vec<_>>();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        items.truncate(limit);
        Ok(items)
    }
}

impl DraftRepository for MemoryStore {
    async fn load_draft(&self, draft_id: &str) -> Result<Option<ComplaintDraft>> {
        Ok(self.drafts.read().get(draft_id).cloned())
    }

    async fn upsert_draft(&self, draft: &ComplaintDraft) -> Result<()> {
        self.drafts
            .write()
            .insert(draft.draft_id.clone(), draft.clone());
        Ok(())
    }

    async fn remove_draft(&self, draft_id: &str) -> Result<bool> {
        Ok(self.drafts.write().remove(draft_id).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0_u64;
        self.drafts.write().retain(|_, value| {
            let keep = value.expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });

        Ok(removed)
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url {}", database_url))?
            .create_if_missing(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if database_url.contains(":memory:") {
            // Each in-memory connection is its own database.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        tracing::info!(database_url, "sqlite complaint store ready");
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS complaints (
              id TEXT PRIMARY KEY,
              issue TEXT NOT NULL,
              location TEXT NOT NULL,
              language TEXT NOT NULL,
              complaint_text TEXT NOT NULL,
              status TEXT NOT NULL DEFAULT 'Filed',
              timestamp TEXT NOT NULL,
              bin_type TEXT NOT NULL DEFAULT 'unknown',
              waste_type TEXT NOT NULL DEFAULT 'unknown'
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS complaint_drafts (
              draft_id TEXT PRIMARY KEY,
              issue TEXT,
              location TEXT,
              bin_type TEXT,
              waste_type TEXT,
              class_id INTEGER,
              created_at TEXT NOT NULL,
              expires_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid stored timestamp {raw}"))?
        .with_timezone(&Utc))
}

fn complaint_from_row(row: &SqliteRow) -> Result<Complaint> {
    let language: String = row.get("language");
    let status: String = row.get("status");
    let bin_type: String = row.get("bin_type");
    let waste_type: String = row.get("waste_type");
    let timestamp: String = row.get("timestamp");

    Ok(Complaint {
        id: row.get("id"),
        issue: row.get("issue"),
        location: row.get("location"),
        language: Language::from_code_or_default(Some(&language)),
        complaint_text: row.get("complaint_text"),
        status: ComplaintStatus::parse(&status),
        timestamp: parse_timestamp(&timestamp)?,
        bin_type: BinType::parse(&bin_type),
        waste_type: WasteType::parse(&waste_type),
    })
}

impl ComplaintRepository for SqliteStore {
    async fn insert_complaint(&self, complaint: &Complaint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO complaints
              (id, issue, location, language, complaint_text, status, timestamp, bin_type, waste_type)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&complaint.id)
        .bind(&complaint.issue)
        .bind(&complaint.location)
        .bind(complaint.language.as_code())
        .bind(&complaint.complaint_text)
        .bind(complaint.status.as_str())
        .bind(format_timestamp(complaint.timestamp))
        .bind(complaint.bin_type.as_str())
        .bind(complaint.waste_type.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed inserting complaint {}", complaint.id))?;

        Ok(())
    }

    async fn load_complaint(&self, id: &str) -> Result<Option<Complaint>> {
        let row = sqlx::query(
            r#"
            SELECT id, issue, location, language, complaint_text, status, timestamp, bin_type, waste_type
            FROM complaints
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(complaint_from_row).transpose()
    }

    async fn complaint_exists(&self, id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM complaints WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn recent_complaints(&self, limit: usize) -> Result<Vec<Complaint>> {
        let rows = sqlx::query(
            r#"
            SELECT id, issue, location, language, complaint_text, status, timestamp, bin_type, waste_type
            FROM complaints
            ORDER BY timestamp DESC, id ASC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(complaint_from_row).collect()
    }
}

impl DraftRepository for SqliteStore {
    async fn load_draft(&self, draft_id: &str) -> Result<Option<ComplaintDraft>> {
        let row = sqlx::query(
            r#"
            SELECT draft_id, issue, location, bin_type, waste_type, class_id, created_at, expires_at
            FROM complaint_drafts
            WHERE draft_id = ?1
            "#,
        )
        .bind(draft_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let bin_type: Option<String> = row.get("bin_type");
        let waste_type: Option<String> = row.get("waste_type");
        let class_id: Option<i64> = row.get("class_id");
        let created_at: String = row.get("created_at");
        let expires_at: String = row.get("expires_at");

        Ok(Some(ComplaintDraft {
            draft_id: row.get("draft_id"),
            issue: row.get("issue"),
            location: row.get("location"),
            bin_type: bin_type.as_deref().map(BinType::parse),
            waste_type: waste_type.as_deref().map(WasteType::parse),
            class_id: class_id.and_then(|value| ClassId::try_from(value).ok()),
            created_at: parse_timestamp(&created_at)?,
            expires_at: parse_timestamp(&expires_at)?,
        }))
    }

    async fn upsert_draft(&self, draft: &ComplaintDraft) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO complaint_drafts
              (draft_id, issue, location, bin_type, waste_type, class_id, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(draft_id) DO UPDATE SET
              issue=excluded.issue,
              location=excluded.location,
              bin_type=excluded.bin_type,
              waste_type=excluded.waste_type,
              class_id=excluded.class_id,
              expires_at=excluded.expires_at
            "#,
        )
        .bind(&draft.draft_id)
        .bind(&draft.issue)
        .bind(&draft.location)
        .bind(draft.bin_type.map(BinType::as_str))
        .bind(draft.waste_type.map(WasteType::as_str))
        .bind(draft.class_id.map(i64::from))
        .bind(format_timestamp(draft.created_at))
        .bind(format_timestamp(draft.expires_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_draft(&self, draft_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM complaint_drafts WHERE draft_id = ?1")
            .bind(draft_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM complaint_drafts WHERE expires_at <= ?1")
            .bind(format_timestamp(now))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl ComplaintRepository for Store {
    async fn insert_complaint(&self, complaint: &Complaint) -> Result<()> {
        match self {
            Store::Memory(store) => store.insert_complaint(complaint).await,
            Store::Sqlite(store) => store.insert_complaint(complaint).await,
        }
    }

    async fn load_complaint(&self, id: &str) -> Result<Option<Complaint>> {
        match self {
            Store::Memory(store) => store.load_complaint(id).await,
            Store::Sqlite(store) => store.load_complaint(id).await,
        }
    }

    async fn complaint_exists(&self, id: &str) -> Result<bool> {
        match self {
            Store::Memory(store) => store.complaint_exists(id).await,
            Store::Sqlite(store) => store.complaint_exists(id).await,
        }
    }

    async fn recent_complaints(&self, limit: usize) -> Result<Vec<Complaint>> {
        match self {
            Store::Memory(store) => store.recent_complaints(limit).await,
            Store::Sqlite(store) => store.recent_complaints(limit).await,
        }
    }
}

impl DraftRepository for Store {
    async fn load_draft(&self, draft_id: &str) -> Result<Option<ComplaintDraft>> {
        match self {
            Store::Memory(store) => store.load_draft(draft_id).await,
            Store::Sqlite(store) => store.load_draft(draft_id).await,
        }
    }

    async fn upsert_draft(&self, draft: &ComplaintDraft) -> Result<()> {
        match self {
            Store::Memory(store) => store.upsert_draft(draft).await,
            Store::Sqlite(store) => store.upsert_draft(draft).await,
        }
    }

    async fn remove_draft(&self, draft_id: &str) -> Result<bool> {
        match self {
            Store::Memory(store) => store.remove_draft(draft_id).await,
            Store::Sqlite(store) => store.remove_draft(draft_id).await,
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        match self {
            Store::Memory(store) => store.purge_expired(now).await,
            Store::Sqlite(store) => store.purge_expired(now).await,
        }
    }
}
