//! The two scheduled batch procedures.
//!
//! Bodies are plain async methods: the cadence loop (or an operator
//! hitting the trigger endpoint) calls them, tests call them directly.
//! Every member is processed inside its own failure boundary: an error
//! is logged with the member uid, counted, and the batch moves on.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use lattice_common::Member;

use crate::corpus::{load_corpus, DEFAULT_PAGE_SIZE};
use crate::orchestrator::{RunOrchestrator, SendRequest};
use crate::traits::{MemberDirectory, RunStore};

pub const EXAMPLE_SUBJECT: &str = "A taste of your member recommendations";
pub const STANDARD_SUBJECT: &str = "Your member recommendations";

/// The bi-monthly job will not re-send to a member who already got a
/// non-example run inside this window.
pub const IDEMPOTENCY_WINDOW_DAYS: i64 = 14;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct JobSummary {
    pub considered: u32,
    pub sent: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl std::fmt::Display for JobSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "considered={} sent={} skipped={} failed={}",
            self.considered, self.sent, self.skipped, self.failed
        )
    }
}

enum MemberOutcome {
    Sent,
    Skipped(&'static str),
}

pub struct RecommendationJobs {
    orchestrator: Arc<RunOrchestrator>,
    directory: Arc<dyn MemberDirectory>,
    runs: Arc<dyn RunStore>,
    /// Global feature flag; both procedures are no-ops when false.
    enabled: bool,
}

impl RecommendationJobs {
    pub fn new(
        orchestrator: Arc<RunOrchestrator>,
        directory: Arc<dyn MemberDirectory>,
        runs: Arc<dyn RunStore>,
        enabled: bool,
    ) -> Self {
        Self {
            orchestrator,
            directory,
            runs,
            enabled,
        }
    }

    /// Daily procedure: one-time example email for subscribed members who
    /// haven't configured any category and haven't had their example yet.
    pub async fn run_example_job(&self) -> Result<JobSummary> {
        if !self.enabled {
            info!("Recommendations disabled, skipping example job");
            return Ok(JobSummary::default());
        }

        let corpus = load_corpus(self.directory.as_ref(), DEFAULT_PAGE_SIZE).await?;
        let mut summary = JobSummary::default();

        for member in &corpus {
            let Some(setting) = &member.notification_setting else {
                continue;
            };
            if !setting.subscribed {
                continue;
            }
            summary.considered += 1;

            if setting.has_any_category() {
                summary.skipped += 1;
                continue;
            }
            if setting.example_sent {
                summary.skipped += 1;
                continue;
            }

            match self.send_example(member, &corpus).await {
                Ok(MemberOutcome::Sent) => summary.sent += 1,
                Ok(MemberOutcome::Skipped(reason)) => {
                    info!(member = %member.uid, reason, "Example skipped");
                    summary.skipped += 1;
                }
                Err(e) => {
                    warn!(member = %member.uid, error = %e, "Example send failed, continuing");
                    summary.failed += 1;
                }
            }
        }

        info!("Example job complete. {summary}");
        Ok(summary)
    }

    async fn send_example(&self, member: &Member, corpus: &[Member]) -> Result<MemberOutcome> {
        let Some(email) = member.email.clone() else {
            return Ok(MemberOutcome::Skipped("no email address"));
        };

        let run = self
            .orchestrator
            .create_run_with_corpus(&member.uid, corpus)
            .await?;
        if run.recommendations.is_empty() {
            return Ok(MemberOutcome::Skipped("no qualifying candidates"));
        }

        let approved = run.recommendations.iter().map(|r| r.id).collect();
        self.orchestrator
            .send(
                run.id,
                SendRequest {
                    approved,
                    email,
                    subject: EXAMPLE_SUBJECT.to_string(),
                    is_example: true,
                },
            )
            .await?;

        self.directory.mark_example_sent(&member.uid).await?;
        Ok(MemberOutcome::Sent)
    }

    /// Semi-monthly procedure (1st and 15th): recurring recommendations
    /// for subscribed members who did configure at least one category.
    /// The idempotency window is anchored to the caller's `now`.
    pub async fn run_bimonthly_job(&self, now: DateTime<Utc>) -> Result<JobSummary> {
        if !self.enabled {
            info!("Recommendations disabled, skipping bi-monthly job");
            return Ok(JobSummary::default());
        }

        let corpus = load_corpus(self.directory.as_ref(), DEFAULT_PAGE_SIZE).await?;
        let mut summary = JobSummary::default();

        for member in &corpus {
            let Some(setting) = &member.notification_setting else {
                continue;
            };
            if !setting.subscribed || !setting.has_any_category() {
                continue;
            }
            summary.considered += 1;

            match self.send_recurring(member, &corpus, now).await {
                Ok(MemberOutcome::Sent) => summary.sent += 1,
                Ok(MemberOutcome::Skipped(reason)) => {
                    info!(member = %member.uid, reason, "Recommendation skipped");
                    summary.skipped += 1;
                }
                Err(e) => {
                    warn!(member = %member.uid, error = %e, "Recommendation send failed, continuing");
                    summary.failed += 1;
                }
            }
        }

        info!("Bi-monthly job complete. {summary}");
        Ok(summary)
    }

    async fn send_recurring(
        &self,
        member: &Member,
        corpus: &[Member],
        now: DateTime<Utc>,
    ) -> Result<MemberOutcome> {
        let Some(email) = member.email.clone() else {
            return Ok(MemberOutcome::Skipped("no email address"));
        };

        if let Some(sent_at) = self.runs.last_non_example_sent(&member.uid).await? {
            if now - sent_at < Duration::days(IDEMPOTENCY_WINDOW_DAYS) {
                return Ok(MemberOutcome::Skipped("sent within idempotency window"));
            }
        }

        let run = self
            .orchestrator
            .create_run_with_corpus(&member.uid, corpus)
            .await?;
        if run.recommendations.is_empty() {
            return Ok(MemberOutcome::Skipped("no qualifying candidates"));
        }

        let approved = run.recommendations.iter().map(|r| r.id).collect();
        self.orchestrator
            .send(
                run.id,
                SendRequest {
                    approved,
                    email,
                    subject: STANDARD_SUBJECT.to_string(),
                    is_example: false,
                },
            )
            .await?;

        Ok(MemberOutcome::Sent)
    }
}
