//! In-memory collaborators and fixtures shared by the crate's tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use lattice_common::{Member, Recommendation, RecommendationStatus, Run, RunStatus, Team};

use crate::traits::{Mailer, MemberDirectory, RecommendationEmail, RunFilter, RunStore};

// ---------------------------------------------------------------------------
// InMemoryDirectory
// ---------------------------------------------------------------------------

pub struct InMemoryDirectory {
    members: Mutex<Vec<Member>>,
    teams: Vec<Team>,
    page_calls: AtomicU64,
}

impl InMemoryDirectory {
    pub fn new(members: Vec<Member>, teams: Vec<Team>) -> Self {
        Self {
            members: Mutex::new(members),
            teams,
            page_calls: AtomicU64::new(0),
        }
    }

    /// How many pages the loader pulled (for paging assertions).
    pub fn page_calls(&self) -> u64 {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn member(&self, uid: &str) -> Option<Member> {
        self.members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.uid == uid)
            .cloned()
    }
}

#[async_trait]
impl MemberDirectory for InMemoryDirectory {
    async fn member_with_relations(&self, uid: &str) -> Result<Option<Member>> {
        Ok(self.member(uid))
    }

    async fn members_page(&self, offset: u64, limit: u64) -> Result<Vec<Member>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn all_teams(&self) -> Result<Vec<Team>> {
        Ok(self.teams.clone())
    }

    async fn mark_example_sent(&self, uid: &str) -> Result<()> {
        let mut members = self.members.lock().unwrap();
        let Some(member) = members.iter_mut().find(|m| m.uid == uid) else {
            bail!("no such member: {uid}");
        };
        let Some(setting) = member.notification_setting.as_mut() else {
            bail!("member {uid} has no notification setting");
        };
        setting.example_sent = true;
        setting.subscribed = false;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryRunStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: Mutex<HashMap<Uuid, Run>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn insert_run(&self, run: &Run) -> Result<()> {
        self.runs.lock().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    async fn run(&self, id: Uuid) -> Result<Option<Run>> {
        Ok(self.runs.lock().unwrap().get(&id).cloned())
    }

    async fn runs(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        let mut out: Vec<Run> = self
            .runs
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                filter
                    .target_uid
                    .as_ref()
                    .map_or(true, |t| r.target_uid == *t)
            })
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    // Combined writes mutate under a single lock hold, so a call's
    // effects are all-or-nothing here too.
    async fn review_and_add(
        &self,
        run_id: Uuid,
        approved: &[Uuid],
        rejected: &[Uuid],
        fresh: &[Recommendation],
    ) -> Result<()> {
        let mut runs = self.runs.lock().unwrap();
        let Some(run) = runs.get_mut(&run_id) else {
            bail!("no such run: {run_id}");
        };
        apply_statuses(run, approved, rejected);
        run.recommendations.extend_from_slice(fresh);
        Ok(())
    }

    async fn review_and_mark_sent(
        &self,
        run_id: Uuid,
        approved: &[Uuid],
        is_example: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut runs = self.runs.lock().unwrap();
        let Some(run) = runs.get_mut(&run_id) else {
            bail!("no such run: {run_id}");
        };
        apply_statuses(run, approved, &[]);
        run.status = RunStatus::Sent;
        run.is_example = is_example;
        run.sent_at = Some(at);
        Ok(())
    }

    async fn set_run_status(&self, id: Uuid, status: RunStatus) -> Result<()> {
        let mut runs = self.runs.lock().unwrap();
        let Some(run) = runs.get_mut(&id) else {
            bail!("no such run: {id}");
        };
        run.status = status;
        Ok(())
    }

    async fn delete_run(&self, id: Uuid) -> Result<()> {
        self.runs.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn last_non_example_sent(&self, target_uid: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.target_uid == target_uid && !r.is_example)
            .filter_map(|r| r.sent_at)
            .max())
    }
}

fn apply_statuses(run: &mut Run, approved: &[Uuid], rejected: &[Uuid]) {
    for rec in &mut run.recommendations {
        if approved.contains(&rec.id) {
            rec.status = RecommendationStatus::Approved;
        } else if rejected.contains(&rec.id) {
            rec.status = RecommendationStatus::Rejected;
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingMailer
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<RecommendationEmail>>,
    fail_to: Option<String>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails any send addressed to `recipient`; everything else records.
    pub fn failing_for(recipient: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_to: Some(recipient.to_string()),
        }
    }

    pub fn sent(&self) -> Vec<RecommendationEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &RecommendationEmail) -> Result<()> {
        if self.fail_to.as_deref() == Some(email.to.as_str()) {
            bail!("mailer rejected {}", email.to);
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub mod fixtures {
    use lattice_common::{Member, NotificationSetting, Team, TeamMembership};

    pub fn member(uid: &str) -> Member {
        Member {
            uid: uid.to_string(),
            name: format!("Member {uid}"),
            email: Some(format!("{uid}@example.com")),
            office_hours_url: None,
            joined_at: None,
            teams: vec![],
            interactions: vec![],
            events: vec![],
            experiences: vec![],
            notification_setting: None,
        }
    }

    /// Teams from this builder all share a focus area, funding stage, and
    /// technology, so members of any two distinct teams score 15 against
    /// each other under the default toggles.
    pub fn team(uid: &str) -> Team {
        Team {
            uid: uid.to_string(),
            name: format!("Team {uid}"),
            focus_areas: vec!["Storage".to_string()],
            funding_stage: Some("seed".to_string()),
            technologies: vec!["IPFS".to_string()],
            industry_tags: vec![],
        }
    }

    /// Membership carries only the team uid; the corpus loader is
    /// responsible for attaching the team itself.
    pub fn on_team(mut member: Member, team: &Team) -> Member {
        member.teams.push(TeamMembership {
            team_uid: team.uid.clone(),
            role: None,
            role_tags: vec![],
            is_lead: false,
            team: None,
        });
        member
    }

    pub fn subscriber(mut member: Member, with_categories: bool) -> Member {
        member.notification_setting = Some(NotificationSetting {
            member_uid: member.uid.clone(),
            subscribed: true,
            example_sent: false,
            focus_area: with_categories,
            ..Default::default()
        });
        member
    }
}
