use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashSet;

use crate::db_pool::DbPool;
use crate::db_types::{
    NewSlideshow, NewSubmission, Slideshow, SlideshowId, SlideshowRow, SlideshowScope,
    Submission, SubmissionId, SubmissionSummary, VisibilityUpdate,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Slideshow {0} not found")]
    SlideshowNotFound(SlideshowId),
    #[error("Submission {0} not found")]
    SubmissionNotFound(SubmissionId),
    #[error("Invalid data: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read/write contract the slideshow engine needs from the submission store.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn load_slideshow(&self, id: SlideshowId) -> StoreResult<Option<Slideshow>>;

    /// Visible submissions in the slideshow's scope, least played first.
    ///
    /// Archived, hidden and slideshow-hidden submissions are never returned,
    /// nor is anything in `exclude`.
    async fn query_eligible(
        &self,
        slideshow: &Slideshow,
        exclude: &HashSet<SubmissionId>,
        limit: Option<u32>,
    ) -> StoreResult<Vec<SubmissionSummary>>;

    /// Increments the global and the per-slideshow play counters of `ids`.
    async fn record_plays(
        &self,
        ids: &[SubmissionId],
        slideshow_id: SlideshowId,
    ) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct SqliteSubmissionStore {
    pool: DbPool,
}

const SUBMISSION_COLUMNS: &str = "id, event_id, partner_id, image_url, width, height, hidden, \
                                  archived, play_count, created_at";

impl SqliteSubmissionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn create_slideshow(&self, new: &NewSlideshow) -> StoreResult<Slideshow> {
        if new.name.trim().is_empty() {
            return Err(StoreError::Invalid("slideshow name must not be empty".into()));
        }
        if new.scope.id().trim().is_empty() {
            return Err(StoreError::Invalid("slideshow scope id must not be empty".into()));
        }

        let display_duration_ms = new
            .display_duration_ms
            .map(i64::try_from)
            .transpose()
            .map_err(|_| StoreError::Invalid("display_duration_ms out of range".into()))?;
        let target_slides = new
            .target_slides
            .map(i64::try_from)
            .transpose()
            .map_err(|_| StoreError::Invalid("target_slides out of range".into()))?;

        let result = sqlx::query(
            "INSERT INTO slideshows (name, scope_kind, scope_id, display_duration_ms, target_slides, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(new.name.trim())
        .bind(new.scope.kind())
        .bind(new.scope.id())
        .bind(display_duration_ms)
        .bind(target_slides)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.load_slideshow(id)
            .await?
            .ok_or(StoreError::SlideshowNotFound(id))
    }

    pub async fn create_submission(&self, new: &NewSubmission) -> StoreResult<Submission> {
        if new.image_url.trim().is_empty() {
            return Err(StoreError::Invalid("image_url must not be empty".into()));
        }
        if new.event_id.trim().is_empty() || new.partner_id.trim().is_empty() {
            return Err(StoreError::Invalid(
                "event_id and partner_id must not be empty".into(),
            ));
        }

        let result = sqlx::query(
            "INSERT INTO submissions (event_id, partner_id, image_url, width, height, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.event_id)
        .bind(&new.partner_id)
        .bind(&new.image_url)
        .bind(new.width)
        .bind(new.height)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_submission(id)
            .await?
            .ok_or(StoreError::SubmissionNotFound(id))
    }

    pub async fn get_submission(&self, id: SubmissionId) -> StoreResult<Option<Submission>> {
        let sql = format!("SELECT {} FROM submissions WHERE id = ?", SUBMISSION_COLUMNS);
        let submission = sqlx::query_as::<_, Submission>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(submission)
    }

    pub async fn set_visibility(
        &self,
        id: SubmissionId,
        update: &VisibilityUpdate,
    ) -> StoreResult<Submission> {
        let result = sqlx::query(
            "UPDATE submissions
             SET hidden = COALESCE(?, hidden), archived = COALESCE(?, archived)
             WHERE id = ?",
        )
        .bind(update.hidden)
        .bind(update.archived)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SubmissionNotFound(id));
        }

        self.get_submission(id)
            .await?
            .ok_or(StoreError::SubmissionNotFound(id))
    }

    pub async fn hide_in_slideshow(
        &self,
        slideshow_id: SlideshowId,
        submission_id: SubmissionId,
    ) -> StoreResult<()> {
        self.ensure_exists(slideshow_id, submission_id).await?;
        sqlx::query(
            "INSERT OR IGNORE INTO slideshow_hidden (slideshow_id, submission_id, created_at)
             VALUES (?, ?, ?)",
        )
        .bind(slideshow_id)
        .bind(submission_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn unhide_in_slideshow(
        &self,
        slideshow_id: SlideshowId,
        submission_id: SubmissionId,
    ) -> StoreResult<()> {
        self.ensure_exists(slideshow_id, submission_id).await?;
        sqlx::query("DELETE FROM slideshow_hidden WHERE slideshow_id = ? AND submission_id = ?")
            .bind(slideshow_id)
            .bind(submission_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Play count of `submission_id` within one slideshow, 0 if never shown there.
    pub async fn slideshow_play_count(
        &self,
        slideshow_id: SlideshowId,
        submission_id: SubmissionId,
    ) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT play_count FROM slideshow_plays WHERE slideshow_id = ? AND submission_id = ?",
        )
        .bind(slideshow_id)
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    async fn ensure_exists(
        &self,
        slideshow_id: SlideshowId,
        submission_id: SubmissionId,
    ) -> StoreResult<()> {
        if self.load_slideshow(slideshow_id).await?.is_none() {
            return Err(StoreError::SlideshowNotFound(slideshow_id));
        }
        if self.get_submission(submission_id).await?.is_none() {
            return Err(StoreError::SubmissionNotFound(submission_id));
        }
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for SqliteSubmissionStore {
    async fn load_slideshow(&self, id: SlideshowId) -> StoreResult<Option<Slideshow>> {
        let row = sqlx::query_as::<_, SlideshowRow>(
            "SELECT id, name, scope_kind, scope_id, display_duration_ms, target_slides, created_at
             FROM slideshows
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let kind = row.scope_kind.clone();
                row.into_slideshow()
                    .map(Some)
                    .ok_or_else(|| StoreError::Invalid(format!("unknown scope kind '{}'", kind)))
            }
            None => Ok(None),
        }
    }

    async fn query_eligible(
        &self,
        slideshow: &Slideshow,
        exclude: &HashSet<SubmissionId>,
        limit: Option<u32>,
    ) -> StoreResult<Vec<SubmissionSummary>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT s.id, s.image_url, s.width, s.height,
                    COALESCE(p.play_count, 0) AS play_count, s.created_at
             FROM submissions s
             LEFT JOIN slideshow_plays p
                    ON p.submission_id = s.id AND p.slideshow_id = ",
        );
        qb.push_bind(slideshow.id);
        qb.push(" WHERE s.archived = 0 AND s.hidden = 0");

        match &slideshow.scope {
            SlideshowScope::Event(event_id) => {
                qb.push(" AND s.event_id = ");
                qb.push_bind(event_id.clone());
            }
            SlideshowScope::Partner(partner_id) => {
                qb.push(" AND s.partner_id = ");
                qb.push_bind(partner_id.clone());
            }
        }

        qb.push(
            " AND NOT EXISTS (SELECT 1 FROM slideshow_hidden h
                              WHERE h.submission_id = s.id AND h.slideshow_id = ",
        );
        qb.push_bind(slideshow.id);
        qb.push(")");

        if !exclude.is_empty() {
            // one bind for the whole set, SQLite caps bound variables per statement
            let ids: Vec<SubmissionId> = exclude.iter().copied().collect();
            let ids = serde_json::to_string(&ids)
                .map_err(|e| StoreError::Invalid(format!("Cannot encode excluded ids: {}", e)))?;
            qb.push(" AND s.id NOT IN (SELECT value FROM json_each(");
            qb.push_bind(ids);
            qb.push("))");
        }

        qb.push(" ORDER BY play_count ASC, s.created_at ASC, s.id ASC");

        if let Some(limit) = limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(limit));
        }

        let candidates = qb
            .build_query_as::<SubmissionSummary>()
            .fetch_all(&self.pool)
            .await?;

        debug!(
            "Slideshow {} ({}): {} eligible candidates ({} excluded)",
            slideshow.id,
            slideshow.scope,
            candidates.len(),
            exclude.len()
        );

        Ok(candidates)
    }

    async fn record_plays(
        &self,
        ids: &[SubmissionId],
        slideshow_id: SlideshowId,
    ) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for id in ids {
            sqlx::query("UPDATE submissions SET play_count = play_count + 1 WHERE id = ?")
                .bind(*id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "INSERT INTO slideshow_plays (slideshow_id, submission_id, play_count, last_played_at)
                 VALUES (?, ?, 1, ?)
                 ON CONFLICT(slideshow_id, submission_id)
                 DO UPDATE SET play_count = play_count + 1,
                               last_played_at = excluded.last_played_at",
            )
            .bind(slideshow_id)
            .bind(*id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
