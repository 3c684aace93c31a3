//! Run and recommendation persistence.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use lattice_common::{Recommendation, RecommendationStatus, Run, RunStatus, ScoreFactors};
use lattice_recs::{RunFilter, RunStore};

#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

type RunRow = (
    Uuid,
    String,
    String,
    bool,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

type RecRow = (
    Uuid,
    Uuid,
    String,
    String,
    Option<String>,
    i32,
    Json<ScoreFactors>,
    String,
);

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn set_status_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        run_id: Uuid,
        ids: &[Uuid],
        status: RecommendationStatus,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            UPDATE recommendations
            SET status = $1
            WHERE run_id = $2 AND id = ANY($3)
            "#,
        )
        .bind(status.as_str())
        .bind(run_id)
        .bind(ids)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_recommendation(
        tx: &mut Transaction<'_, Postgres>,
        rec: &Recommendation,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recommendations
                (id, run_id, member_uid, member_name, office_hours_url, score, factors, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(rec.id)
        .bind(rec.run_id)
        .bind(&rec.member_uid)
        .bind(&rec.member_name)
        .bind(&rec.office_hours_url)
        .bind(rec.score as i32)
        .bind(Json(&rec.factors))
        .bind(rec.status.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Recommendations for a set of runs, grouped by run id, highest
    /// score first within each run.
    async fn recommendations_for(&self, run_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Recommendation>>> {
        let rows = sqlx::query_as::<_, RecRow>(
            r#"
            SELECT id, run_id, member_uid, member_name, office_hours_url, score, factors, status
            FROM recommendations
            WHERE run_id = ANY($1)
            ORDER BY score DESC
            "#,
        )
        .bind(run_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut out: HashMap<Uuid, Vec<Recommendation>> = HashMap::new();
        for row in rows {
            let rec = decode_recommendation(row)?;
            out.entry(rec.run_id).or_default().push(rec);
        }
        Ok(out)
    }
}

fn decode_recommendation(row: RecRow) -> Result<Recommendation> {
    let (id, run_id, member_uid, member_name, office_hours_url, score, Json(factors), status) = row;
    Ok(Recommendation {
        id,
        run_id,
        member_uid,
        member_name,
        office_hours_url,
        score: score.max(0) as u32,
        factors,
        status: status
            .parse::<RecommendationStatus>()
            .map_err(anyhow::Error::msg)?,
    })
}

fn decode_run(row: RunRow, recommendations: Vec<Recommendation>) -> Result<Run> {
    let (id, target_uid, status, is_example, created_at, sent_at) = row;
    Ok(Run {
        id,
        target_uid,
        status: status.parse::<RunStatus>().map_err(anyhow::Error::msg)?,
        is_example,
        created_at,
        sent_at,
        recommendations,
    })
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn insert_run(&self, run: &Run) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO runs (id, target_uid, status, is_example, created_at, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(run.id)
        .bind(&run.target_uid)
        .bind(run.status.as_str())
        .bind(run.is_example)
        .bind(run.created_at)
        .bind(run.sent_at)
        .execute(&mut *tx)
        .await?;

        for rec in &run.recommendations {
            Self::insert_recommendation(&mut tx, rec).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn run(&self, id: Uuid) -> Result<Option<Run>> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, target_uid, status, is_example, created_at, sent_at
            FROM runs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut recs = self.recommendations_for(&[id]).await?;
        Ok(Some(decode_run(row, recs.remove(&id).unwrap_or_default())?))
    }

    async fn runs(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, target_uid, status, is_example, created_at, sent_at
            FROM runs
            WHERE ($1::text IS NULL OR target_uid = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(&filter.target_uid)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        let run_ids: Vec<Uuid> = rows.iter().map(|r| r.0).collect();
        let mut recs = self.recommendations_for(&run_ids).await?;

        rows.into_iter()
            .map(|row| {
                let id = row.0;
                decode_run(row, recs.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn review_and_add(
        &self,
        run_id: Uuid,
        approved: &[Uuid],
        rejected: &[Uuid],
        fresh: &[Recommendation],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::set_status_in_tx(&mut tx, run_id, approved, RecommendationStatus::Approved).await?;
        Self::set_status_in_tx(&mut tx, run_id, rejected, RecommendationStatus::Rejected).await?;
        for rec in fresh {
            debug_assert_eq!(rec.run_id, run_id);
            Self::insert_recommendation(&mut tx, rec).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn review_and_mark_sent(
        &self,
        run_id: Uuid,
        approved: &[Uuid],
        is_example: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::set_status_in_tx(&mut tx, run_id, approved, RecommendationStatus::Approved).await?;
        sqlx::query(
            r#"
            UPDATE runs
            SET status = $1, is_example = $2, sent_at = $3
            WHERE id = $4
            "#,
        )
        .bind(RunStatus::Sent.as_str())
        .bind(is_example)
        .bind(at)
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_run_status(&self, id: Uuid, status: RunStatus) -> Result<()> {
        sqlx::query("UPDATE runs SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_run(&self, id: Uuid) -> Result<()> {
        // Recommendations go with it via ON DELETE CASCADE.
        sqlx::query("DELETE FROM runs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn last_non_example_sent(&self, target_uid: &str) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query_as::<_, (Option<DateTime<Utc>>,)>(
            r#"
            SELECT MAX(sent_at)
            FROM runs
            WHERE target_uid = $1 AND is_example = FALSE AND sent_at IS NOT NULL
            "#,
        )
        .bind(target_uid)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}
