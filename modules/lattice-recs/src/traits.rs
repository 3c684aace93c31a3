//! Collaborator seams for the recommendation core.
//!
//! Implemented by the Postgres stores (production) and the in-memory
//! doubles in [`crate::testing`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use lattice_common::{Member, Recommendation, Run, RunStatus, Team};

/// Read side of the member directory, plus the one write this core owns:
/// flipping a member's example-sent flag.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// One member with every relation the engine reads. Team memberships
    /// come back with `team: None`; the corpus loader attaches teams.
    async fn member_with_relations(&self, uid: &str) -> Result<Option<Member>>;

    /// One stable-ordered page of members with relations.
    async fn members_page(&self, offset: u64, limit: u64) -> Result<Vec<Member>>;

    /// The full team catalog with focus areas, funding stage, technologies.
    async fn all_teams(&self) -> Result<Vec<Team>>;

    /// After a successful example send: `example_sent = true`,
    /// `subscribed = false`.
    async fn mark_example_sent(&self, uid: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub target_uid: Option<String>,
    pub status: Option<RunStatus>,
}

/// Every mutation here is one atomic step: all of a call's writes land
/// or none do, so a failed call never leaves a run half-updated.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a run together with its nested recommendations.
    async fn insert_run(&self, run: &Run) -> Result<()>;

    async fn run(&self, id: Uuid) -> Result<Option<Run>>;

    async fn runs(&self, filter: &RunFilter) -> Result<Vec<Run>>;

    /// Approve and reject the named recommendations and append `fresh`,
    /// all in one step.
    async fn review_and_add(
        &self,
        run_id: Uuid,
        approved: &[Uuid],
        rejected: &[Uuid],
        fresh: &[Recommendation],
    ) -> Result<()>;

    /// Approve the named recommendations and transition the run to
    /// `sent`, recording when and whether it was an example, in one step.
    async fn review_and_mark_sent(
        &self,
        run_id: Uuid,
        approved: &[Uuid],
        is_example: bool,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Administrative override; no transition guard.
    async fn set_run_status(&self, id: Uuid, status: RunStatus) -> Result<()>;

    /// Deletes the run and, transitively, its recommendations.
    async fn delete_run(&self, id: Uuid) -> Result<()>;

    /// When the most recent non-example run was sent to this member, if ever.
    async fn last_non_example_sent(&self, target_uid: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Payload handed to the notification dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationEmail {
    pub to: String,
    pub subject: String,
    pub is_example: bool,
    pub items: Vec<EmailItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailItem {
    pub member_uid: String,
    pub name: String,
    pub office_hours_url: Option<String>,
}

/// Outbound email dispatch. Not retried here; failures surface to the
/// caller (the orchestrator wraps them as `LatticeError::Dispatch`).
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &RecommendationEmail) -> Result<()>;
}
