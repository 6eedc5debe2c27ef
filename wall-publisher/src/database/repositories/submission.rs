//! Submission store.
//!
//! Workers only ever talk to [`SubmissionStore`]. Claiming is atomic: a claimed
//! row is invisible to other claimers until its claim expires, so a crashed
//! worker's submission comes back after `claim_ttl`. Every claim carries a
//! fresh claim id; a worker keeps its claim alive with
//! [`SubmissionStore::renew_claim`] and loses it once the row is claimed again.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::SqlitePool;

use crate::database::models::SubmissionDbModel;
use crate::database::time::now_ms;
use crate::domain::{Submission, SubmissionStatus};
use crate::{Error, Result};

/// Default time after which an unfinished claim is handed out again.
pub const DEFAULT_CLAIM_TTL: Duration = Duration::from_secs(600);

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Claim the oldest approved submission that has not been published yet.
    async fn fetch_one_approved(&self) -> Result<Option<Submission>>;

    /// Restart the claim timer of a claimed submission. `false` when the row
    /// was claimed again by someone else or is no longer approved and unpublished.
    async fn renew_claim(&self, submission: &Submission) -> Result<bool>;

    async fn get(&self, id: i64) -> Result<Submission>;

    /// Insert or update by id. New submissions get their id assigned here.
    ///
    /// Saving a claimed submission fails with [`Error::ClaimLost`] once the
    /// stored row has left the approved-and-unpublished state.
    async fn save(&self, submission: &mut Submission) -> Result<()>;

    async fn list_by_status(&self, status: SubmissionStatus) -> Result<Vec<Submission>>;

    /// Submissions for the given ids, in id order. Unknown ids are skipped.
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Submission>>;
}

/// SQLx implementation of SubmissionStore.
pub struct SqliteSubmissionStore {
    pool: SqlitePool,
    claim_ttl: Duration,
}

impl SqliteSubmissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            claim_ttl: DEFAULT_CLAIM_TTL,
        }
    }

    pub fn with_claim_ttl(mut self, claim_ttl: Duration) -> Self {
        self.claim_ttl = claim_ttl;
        self
    }
}

fn to_domain(rows: Vec<SubmissionDbModel>) -> Result<Vec<Submission>> {
    rows.into_iter().map(SubmissionDbModel::into_domain).collect()
}

#[async_trait]
impl SubmissionStore for SqliteSubmissionStore {
    async fn fetch_one_approved(&self) -> Result<Option<Submission>> {
        let now = now_ms();
        let stale_before = now - self.claim_ttl.as_millis() as i64;
        let row = sqlx::query_as::<_, SubmissionDbModel>(
            r#"
            UPDATE submissions SET claimed_at = ?, claim_id = claim_id + 1
            WHERE id = (
                SELECT id FROM submissions
                WHERE status = 'APPROVED'
                  AND external_id IS NULL
                  AND (claimed_at IS NULL OR claimed_at < ?)
                ORDER BY id
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|model| {
            let claim = model.claim_id;
            model.into_domain().map(|mut submission| {
                submission.claim = Some(claim);
                submission
            })
        })
        .transpose()
    }

    async fn renew_claim(&self, submission: &Submission) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE submissions SET claimed_at = ?
            WHERE id = ?
              AND status = 'APPROVED'
              AND external_id IS NULL
              AND (? IS NULL OR claim_id = ?)
            "#,
        )
        .bind(now_ms())
        .bind(submission.id)
        .bind(submission.claim)
        .bind(submission.claim)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, id: i64) -> Result<Submission> {
        sqlx::query_as::<_, SubmissionDbModel>("SELECT * FROM submissions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("submission", id))?
            .into_domain()
    }

    async fn save(&self, submission: &mut Submission) -> Result<()> {
        let model = SubmissionDbModel::from_domain(submission)?;

        if submission.is_new() {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO submissions
                    (author_id, author_name, text, images, anonymous, group_id,
                     status, rejection_reason, external_id, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(model.author_id)
            .bind(&model.author_name)
            .bind(&model.text)
            .bind(&model.images)
            .bind(model.anonymous)
            .bind(model.group_id)
            .bind(&model.status)
            .bind(&model.rejection_reason)
            .bind(&model.external_id)
            .bind(model.created_at)
            .fetch_one(&self.pool)
            .await?;
            submission.id = id;
            return Ok(());
        }

        // A claim only survives saves that keep the row in APPROVED. A claimed
        // submission may not overwrite a row that is already finished.
        let result = sqlx::query(
            r#"
            INSERT INTO submissions
                (id, author_id, author_name, text, images, anonymous, group_id,
                 status, rejection_reason, external_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                author_id = excluded.author_id,
                author_name = excluded.author_name,
                text = excluded.text,
                images = excluded.images,
                anonymous = excluded.anonymous,
                group_id = excluded.group_id,
                rejection_reason = excluded.rejection_reason,
                external_id = excluded.external_id,
                claimed_at = CASE
                    WHEN excluded.status = 'APPROVED' AND submissions.status = 'APPROVED'
                    THEN submissions.claimed_at
                    ELSE NULL
                END,
                status = excluded.status
            WHERE ? IS NULL
               OR (submissions.status = 'APPROVED' AND submissions.external_id IS NULL)
            "#,
        )
        .bind(model.id)
        .bind(model.author_id)
        .bind(&model.author_name)
        .bind(&model.text)
        .bind(&model.images)
        .bind(model.anonymous)
        .bind(model.group_id)
        .bind(&model.status)
        .bind(&model.rejection_reason)
        .bind(&model.external_id)
        .bind(model.created_at)
        .bind(submission.claim)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::ClaimLost { id: submission.id });
        }
        if submission.status != SubmissionStatus::Approved {
            submission.claim = None;
        }
        Ok(())
    }

    async fn list_by_status(&self, status: SubmissionStatus) -> Result<Vec<Submission>> {
        let rows = sqlx::query_as::<_, SubmissionDbModel>(
            "SELECT * FROM submissions WHERE status = ? ORDER BY id",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        to_domain(rows)
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Submission>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT * FROM submissions WHERE id IN ({placeholders}) ORDER BY id");
        let mut query = sqlx::query_as::<_, SubmissionDbModel>(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        to_domain(query.fetch_all(&self.pool).await?)
    }
}

#[derive(Debug, Clone)]
struct MemoryRow {
    submission: Submission,
    claimed_at: Option<tokio::time::Instant>,
    claim_id: i64,
}

impl MemoryRow {
    fn is_claimable(&self) -> bool {
        self.submission.status == SubmissionStatus::Approved
            && self.submission.external_id.is_none()
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    rows: BTreeMap<i64, MemoryRow>,
    next_id: i64,
}

/// In-memory SubmissionStore with the same claim semantics as the SQLite one.
#[derive(Debug)]
pub struct MemorySubmissionStore {
    inner: Mutex<MemoryInner>,
    claim_ttl: Duration,
}

impl Default for MemorySubmissionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            claim_ttl: DEFAULT_CLAIM_TTL,
        }
    }

    pub fn with_claim_ttl(mut self, claim_ttl: Duration) -> Self {
        self.claim_ttl = claim_ttl;
        self
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn fetch_one_approved(&self) -> Result<Option<Submission>> {
        let now = tokio::time::Instant::now();
        let mut inner = self.inner.lock();
        let claim_ttl = self.claim_ttl;
        let row = inner.rows.values_mut().find(|row| {
            row.is_claimable()
                && row
                    .claimed_at
                    .is_none_or(|claimed| now.duration_since(claimed) > claim_ttl)
        });
        Ok(row.map(|row| {
            row.claimed_at = Some(now);
            row.claim_id += 1;
            let mut submission = row.submission.clone();
            submission.claim = Some(row.claim_id);
            submission
        }))
    }

    async fn renew_claim(&self, submission: &Submission) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(row) = inner.rows.get_mut(&submission.id) else {
            return Ok(false);
        };
        if !row.is_claimable() || submission.claim.is_some_and(|claim| claim != row.claim_id) {
            return Ok(false);
        }
        row.claimed_at = Some(tokio::time::Instant::now());
        Ok(true)
    }

    async fn get(&self, id: i64) -> Result<Submission> {
        self.inner
            .lock()
            .rows
            .get(&id)
            .map(|row| row.submission.clone())
            .ok_or_else(|| Error::not_found("submission", id))
    }

    async fn save(&self, submission: &mut Submission) -> Result<()> {
        let mut inner = self.inner.lock();
        if submission.is_new() {
            inner.next_id = inner.next_id.max(inner.rows.keys().last().copied().unwrap_or(0)) + 1;
            submission.id = inner.next_id;
        }
        let existing = inner.rows.get(&submission.id);
        if submission.claim.is_some() && existing.is_some_and(|row| !row.is_claimable()) {
            return Err(Error::ClaimLost { id: submission.id });
        }
        let claimed_at = existing.and_then(|row| {
            (row.submission.status == SubmissionStatus::Approved
                && submission.status == SubmissionStatus::Approved)
                .then_some(row.claimed_at)
                .flatten()
        });
        let claim_id = existing.map_or(0, |row| row.claim_id);

        let mut stored = submission.clone();
        stored.claim = None;
        inner.rows.insert(
            submission.id,
            MemoryRow {
                submission: stored,
                claimed_at,
                claim_id,
            },
        );
        if submission.status != SubmissionStatus::Approved {
            submission.claim = None;
        }
        Ok(())
    }

    async fn list_by_status(&self, status: SubmissionStatus) -> Result<Vec<Submission>> {
        Ok(self
            .inner
            .lock()
            .rows
            .values()
            .filter(|row| row.submission.status == status)
            .map(|row| row.submission.clone())
            .collect())
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Submission>> {
        let inner = self.inner.lock();
        let mut found: Vec<Submission> = ids
            .iter()
            .filter_map(|id| inner.rows.get(id).map(|row| row.submission.clone()))
            .collect();
        found.sort_by_key(|s| s.id);
        found.dedup_by_key(|s| s.id);
        Ok(found)
    }
}
