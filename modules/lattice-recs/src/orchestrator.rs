//! The run state machine: create, review, backfill, send.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use lattice_common::{
    LatticeError, Member, Recommendation, RecommendationStatus, Run, RunStatus,
};
use lattice_engine::{score, ScoredCandidate, ScoringConfig};

use crate::corpus::{load_corpus, DEFAULT_PAGE_SIZE};
use crate::traits::{EmailItem, Mailer, MemberDirectory, RecommendationEmail, RunFilter, RunStore};

/// Cap on recommendations in `{approved, pending}` per run.
pub const MAX_ACTIVE_RECOMMENDATIONS: usize = 5;

/// The operator's own orgs never show up as recommendations.
const DEFAULT_SKIP_TEAM_NAMES: &[&str] = &["Lattice", "Lattice Foundation"];

/// Configuration used for every scheduled and on-demand run: category
/// toggles on, same-event matching off, operator orgs skipped.
pub fn default_scoring_config() -> ScoringConfig {
    ScoringConfig {
        skip_team_names: DEFAULT_SKIP_TEAM_NAMES
            .iter()
            .map(|s| s.to_string())
            .collect(),
        include_focus_areas: true,
        include_roles: true,
        include_funding_stages: true,
        include_same_event: false,
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Recommendation ids the caller approves as part of the send.
    pub approved: Vec<Uuid>,
    pub email: String,
    pub subject: String,
    pub is_example: bool,
}

pub struct RunOrchestrator {
    directory: Arc<dyn MemberDirectory>,
    runs: Arc<dyn RunStore>,
    mailer: Arc<dyn Mailer>,
}

impl RunOrchestrator {
    pub fn new(
        directory: Arc<dyn MemberDirectory>,
        runs: Arc<dyn RunStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            directory,
            runs,
            mailer,
        }
    }

    /// Score the full corpus against `target_uid` and open a run with the
    /// top candidates as pending recommendations. The target is resolved
    /// first so an unknown member fails before the corpus is paged in.
    pub async fn create_run(&self, target_uid: &str) -> Result<Run, LatticeError> {
        if self
            .directory
            .member_with_relations(target_uid)
            .await?
            .is_none()
        {
            return Err(LatticeError::MemberNotFound(target_uid.to_string()));
        }
        let corpus = load_corpus(self.directory.as_ref(), DEFAULT_PAGE_SIZE).await?;
        self.create_run_with_corpus(target_uid, &corpus).await
    }

    /// Same as [`create_run`](Self::create_run) against a corpus the caller
    /// already loaded. The batch jobs load once and call this per member.
    pub async fn create_run_with_corpus(
        &self,
        target_uid: &str,
        corpus: &[Member],
    ) -> Result<Run, LatticeError> {
        let target = find_member(corpus, target_uid)?;
        let now = Utc::now();
        let run_id = Uuid::new_v4();

        let ranked = score(target, corpus, &default_scoring_config(), now);
        let recommendations: Vec<Recommendation> = ranked
            .into_iter()
            .take(MAX_ACTIVE_RECOMMENDATIONS)
            .map(|c| to_recommendation(run_id, c))
            .collect();

        let run = Run {
            id: run_id,
            target_uid: target_uid.to_string(),
            status: RunStatus::Open,
            is_example: false,
            created_at: now,
            sent_at: None,
            recommendations,
        };
        self.runs.insert_run(&run).await?;

        info!(
            run = %run.id,
            target = %target_uid,
            recommendations = run.recommendations.len(),
            "Run created"
        );
        Ok(run)
    }

    /// Approve/reject the named recommendations, then backfill pending
    /// ones until the run holds 5 active again (fewer if the engine runs
    /// dry). Every member ever recommended in this run is excluded from
    /// the backfill pool, not just the freshly rejected ones.
    pub async fn generate_more(
        &self,
        run_id: Uuid,
        approved: &[Uuid],
        rejected: &[Uuid],
    ) -> Result<Run, LatticeError> {
        let run = self.require_open(run_id).await?;

        // The review is applied in memory first so the refill size
        // reflects it; review and backfill then land in one atomic
        // store write.
        let active = run
            .recommendations
            .iter()
            .filter(|r| {
                if rejected.contains(&r.id) {
                    false
                } else if approved.contains(&r.id) {
                    true
                } else {
                    r.status.is_active()
                }
            })
            .count();

        let fresh: Vec<Recommendation> = if active >= MAX_ACTIVE_RECOMMENDATIONS {
            Vec::new()
        } else {
            let corpus = load_corpus(self.directory.as_ref(), DEFAULT_PAGE_SIZE).await?;
            let target = find_member(&corpus, &run.target_uid)?;

            let mut config = default_scoring_config();
            config.skip_member_uids = run.recommended_uids();

            score(target, &corpus, &config, Utc::now())
                .into_iter()
                .take(MAX_ACTIVE_RECOMMENDATIONS - active)
                .map(|c| to_recommendation(run_id, c))
                .collect()
        };

        self.runs
            .review_and_add(run_id, approved, rejected, &fresh)
            .await?;
        if !fresh.is_empty() {
            info!(run = %run_id, added = fresh.len(), "Backfilled recommendations");
        }
        self.require_run(run_id).await
    }

    /// Administrative override; overwrites the status unconditionally.
    pub async fn update_status(&self, run_id: Uuid, status: RunStatus) -> Result<Run, LatticeError> {
        self.require_run(run_id).await?;
        self.runs.set_run_status(run_id, status).await?;
        self.require_run(run_id).await
    }

    /// Approve the named recommendations and move the run to `sent` as
    /// one atomic write, then dispatch the email. Dispatch is a side
    /// effect past the state machine: a failure surfaces as `Dispatch`
    /// without rolling the transition back, and is never retried here.
    pub async fn send(&self, run_id: Uuid, req: SendRequest) -> Result<Run, LatticeError> {
        self.require_open(run_id).await?;
        self.runs
            .review_and_mark_sent(run_id, &req.approved, req.is_example, Utc::now())
            .await?;

        let run = self.require_run(run_id).await?;
        let items: Vec<EmailItem> = run
            .recommendations
            .iter()
            .filter(|r| r.status == RecommendationStatus::Approved)
            .map(|r| EmailItem {
                member_uid: r.member_uid.clone(),
                name: r.member_name.clone(),
                office_hours_url: r.office_hours_url.clone(),
            })
            .collect();

        let email = RecommendationEmail {
            to: req.email,
            subject: req.subject,
            is_example: req.is_example,
            items,
        };
        self.mailer
            .send(&email)
            .await
            .map_err(|e| LatticeError::Dispatch(e.to_string()))?;

        info!(
            run = %run_id,
            target = %run.target_uid,
            approved = email.items.len(),
            is_example = req.is_example,
            "Recommendations sent"
        );
        Ok(run)
    }

    pub async fn runs(&self, filter: &RunFilter) -> Result<Vec<Run>, LatticeError> {
        Ok(self.runs.runs(filter).await?)
    }

    pub async fn run(&self, run_id: Uuid) -> Result<Run, LatticeError> {
        self.require_run(run_id).await
    }

    pub async fn delete_run(&self, run_id: Uuid) -> Result<(), LatticeError> {
        self.require_run(run_id).await?;
        self.runs.delete_run(run_id).await?;
        info!(run = %run_id, "Run deleted");
        Ok(())
    }

    async fn require_run(&self, run_id: Uuid) -> Result<Run, LatticeError> {
        self.runs
            .run(run_id)
            .await?
            .ok_or(LatticeError::RunNotFound(run_id))
    }

    async fn require_open(&self, run_id: Uuid) -> Result<Run, LatticeError> {
        let run = self.require_run(run_id).await?;
        if run.status != RunStatus::Open {
            return Err(LatticeError::InvalidState {
                run: run_id,
                status: run.status,
            });
        }
        Ok(run)
    }
}

fn find_member<'c>(corpus: &'c [Member], uid: &str) -> Result<&'c Member, LatticeError> {
    corpus
        .iter()
        .find(|m| m.uid == uid)
        .ok_or_else(|| LatticeError::MemberNotFound(uid.to_string()))
}

fn to_recommendation(run_id: Uuid, candidate: ScoredCandidate) -> Recommendation {
    Recommendation {
        id: Uuid::new_v4(),
        run_id,
        member_uid: candidate.member.uid,
        member_name: candidate.member.name,
        office_hours_url: candidate.member.office_hours_url,
        score: candidate.score,
        factors: candidate.factors,
        status: RecommendationStatus::Pending,
    }
}
