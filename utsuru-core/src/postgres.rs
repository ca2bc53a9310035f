//! PostgreSQL persistence for image records and fingerprints.
//!
//! Records live in `images`, fingerprints in `image_fingerprints` keyed by
//! image id. Similarity queries compute the Hamming distance in SQL with
//! `bit_count` (PostgreSQL 14+) and order by distance, then insertion
//! sequence, matching the in-memory index.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{Result, UtsuruError};
use crate::fingerprint::Fingerprint;
use crate::index::SimilarityMatch;
use crate::records::{ImageId, ImageRecord, NewImageRecord};

/// PostgreSQL-backed image store.
#[derive(Clone)]
pub struct PostgresImageStore {
    pool: PgPool,
}

/// Row type for record queries.
#[derive(FromRow)]
struct ImageRow {
    id: Uuid,
    owner_id: String,
    filename: String,
    url: Option<String>,
    size: i64,
    created_at: DateTime<Utc>,
    fingerprint: i64,
}

impl From<ImageRow> for ImageRecord {
    fn from(row: ImageRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            filename: row.filename,
            url: row.url,
            size: u64::try_from(row.size).unwrap_or_default(),
            fingerprint: Fingerprint::from_i64(row.fingerprint),
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct MatchRow {
    image_id: Uuid,
    distance: i64,
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl PostgresImageStore {
    /// Connect to the database at `database_url`.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| UtsuruError::Storage(format!("connection failed: {}", e)))?;

        tracing::info!("Connected to PostgreSQL image store");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Image store migrations completed");
        Ok(())
    }

    /// Check database connection health
    pub async fn check_health(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a record and its fingerprint in one transaction.
    ///
    /// The `(owner_id, filename)` unique constraint is the authoritative
    /// dedup check; a violation maps to [`UtsuruError::DuplicateRecord`].
    pub async fn insert_record(&self, input: &NewImageRecord) -> Result<ImageRecord> {
        let size = i64::try_from(input.size)
            .map_err(|_| UtsuruError::Storage(format!("file too large: {} bytes", input.size)))?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            r#"
            INSERT INTO images (id, owner_id, filename, url, size)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.owner_id)
        .bind(&input.filename)
        .bind(&input.url)
        .bind(size)
        .fetch_one(&mut *tx)
        .await;

        let (id, created_at) = match inserted {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => {
                return Err(UtsuruError::DuplicateRecord {
                    owner_id: input.owner_id.clone(),
                    filename: input.filename.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        sqlx::query("INSERT INTO image_fingerprints (image_id, fingerprint) VALUES ($1, $2)")
            .bind(id)
            .bind(input.fingerprint.to_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            %id,
            owner_id = %input.owner_id,
            filename = %input.filename,
            "Stored image record"
        );

        Ok(ImageRecord {
            id,
            owner_id: input.owner_id.clone(),
            filename: input.filename.clone(),
            size: input.size,
            url: input.url.clone(),
            fingerprint: input.fingerprint,
            created_at,
        })
    }

    /// Whether `owner_id` already has an image named `filename`.
    pub async fn record_exists(&self, owner_id: &str, filename: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM images WHERE owner_id = $1 AND filename = $2)
            "#,
        )
        .bind(owner_id)
        .bind(filename)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Upload dedup pre-check against the database.
    ///
    /// Async counterpart of [`DedupGate`](crate::gate::DedupGate). The
    /// unique constraint behind [`insert_record`](Self::insert_record)
    /// still settles concurrent uploads.
    pub async fn should_ingest(&self, owner_id: &str, filename: &str) -> Result<bool> {
        let exists = self.record_exists(owner_id, filename).await?;
        if exists {
            tracing::debug!(
                owner_id,
                filename,
                "Skipping upload: filename already exists for owner"
            );
        }
        Ok(!exists)
    }

    /// Record the storage URL of a persisted blob. The URL can only be set once.
    pub async fn set_url(&self, id: ImageId, url: &str) -> Result<()> {
        let result = sqlx::query("UPDATE images SET url = $2 WHERE id = $1 AND url IS NULL")
            .bind(id)
            .bind(url)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return match self.get_record(id).await? {
                Some(_) => Err(UtsuruError::Storage(format!(
                    "storage URL already set for image {}",
                    id
                ))),
                None => Err(UtsuruError::RecordNotFound(id)),
            };
        }
        Ok(())
    }

    /// Insert or replace the fingerprint of an existing image.
    pub async fn put_fingerprint(&self, id: ImageId, fingerprint: Fingerprint) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO image_fingerprints (image_id, fingerprint)
            VALUES ($1, $2)
            ON CONFLICT (image_id) DO UPDATE SET fingerprint = EXCLUDED.fingerprint
            "#,
        )
        .bind(id)
        .bind(fingerprint.to_i64())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(UtsuruError::RecordNotFound(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_record(&self, id: ImageId) -> Result<Option<ImageRecord>> {
        let row: Option<ImageRow> = sqlx::query_as(
            r#"
            SELECT i.id, i.owner_id, i.filename, i.url, i.size, i.created_at, f.fingerprint
            FROM images i
            JOIN image_fingerprints f ON f.image_id = i.id
            WHERE i.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Every stored image within `threshold` bits of `fingerprint`, closest
    /// first, ties in insertion order.
    ///
    /// A negative threshold is rejected before any SQL is issued.
    pub async fn similar_to(
        &self,
        fingerprint: Fingerprint,
        threshold: i64,
    ) -> Result<Vec<SimilarityMatch>> {
        if threshold < 0 {
            return Err(UtsuruError::InvalidThreshold(threshold));
        }

        let rows: Vec<MatchRow> = sqlx::query_as(
            r#"
            SELECT image_id, distance FROM (
                SELECT f.image_id,
                       bit_count((f.fingerprint # $1)::bit(64)) AS distance,
                       i.seq
                FROM image_fingerprints f
                JOIN images i ON i.id = f.image_id
            ) scored
            WHERE distance <= $2
            ORDER BY distance ASC, seq ASC
            "#,
        )
        .bind(fingerprint.to_i64())
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(
            query = %fingerprint,
            threshold,
            matches = rows.len(),
            "Similarity query (postgres)"
        );

        Ok(rows
            .into_iter()
            .map(|row| SimilarityMatch {
                image_id: row.image_id,
                distance: row.distance.clamp(0, 64) as u32,
            })
            .collect())
    }
}

impl std::fmt::Debug for PostgresImageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresImageStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}
