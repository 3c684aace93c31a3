use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Open,
    Sent,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Open => "open",
            RunStatus::Sent => "sent",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RunStatus::Open),
            "sent" => Ok(RunStatus::Sent),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Pending,
    Approved,
    Rejected,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Pending => "pending",
            RecommendationStatus::Approved => "approved",
            RecommendationStatus::Rejected => "rejected",
        }
    }

    /// Active recommendations count toward the per-run cap.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RecommendationStatus::Pending | RecommendationStatus::Approved
        )
    }
}

impl std::fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecommendationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecommendationStatus::Pending),
            "approved" => Ok(RecommendationStatus::Approved),
            "rejected" => Ok(RecommendationStatus::Rejected),
            other => Err(format!("unknown recommendation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    OfficeHours,
    Other,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::OfficeHours => "office_hours",
            InteractionKind::Other => "other",
        }
    }
}

impl std::str::FromStr for InteractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "office_hours" => Ok(InteractionKind::OfficeHours),
            "other" => Ok(InteractionKind::Other),
            other => Err(format!("unknown interaction kind: {other}")),
        }
    }
}

// --- Directory types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub uid: String,
    pub name: String,
    pub focus_areas: Vec<String>,
    pub funding_stage: Option<String>,
    pub technologies: Vec<String>,
    pub industry_tags: Vec<String>,
}

/// One member's seat on a team. The `team` field is attached in memory by
/// the corpus loader from a single bulk team fetch; it is `None` straight
/// out of the member store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMembership {
    pub team_uid: String,
    pub role: Option<String>,
    pub role_tags: Vec<String>,
    pub is_lead: bool,
    pub team: Option<Team>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub with_member_uid: String,
    pub kind: InteractionKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAttendance {
    pub event_uid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub company: String,
    pub title: Option<String>,
}

/// Per-member notification preferences. `subscribed` is the master
/// recommendations-enabled flag; the six category toggles drive which
/// scheduled procedure a member falls under.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationSetting {
    pub member_uid: String,
    pub subscribed: bool,
    pub example_sent: bool,
    pub focus_area: bool,
    pub funding_stage: bool,
    pub role: bool,
    pub technology: bool,
    pub industry_tag: bool,
    pub keyword: bool,
}

impl NotificationSetting {
    pub fn has_any_category(&self) -> bool {
        self.focus_area
            || self.funding_stage
            || self.role
            || self.technology
            || self.industry_tag
            || self.keyword
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub uid: String,
    pub name: String,
    pub email: Option<String>,
    pub office_hours_url: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
    pub teams: Vec<TeamMembership>,
    pub interactions: Vec<Interaction>,
    pub events: Vec<EventAttendance>,
    pub experiences: Vec<Experience>,
    pub notification_setting: Option<NotificationSetting>,
}

// --- Scoring ---

/// Full factor breakdown behind one recommendation's score.
///
/// The first four are gates (0 or 1) multiplied into the total; the rest
/// are additive weights. Persisted alongside the recommendation so a
/// reviewer can see why a candidate ranked where it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub same_team: u32,
    pub previously_recommended: u32,
    pub booked_office_hours: u32,
    pub same_event: u32,
    pub team_focus_area: u32,
    pub team_funding_stage: u32,
    pub role_match: u32,
    pub team_technology: u32,
    pub has_office_hours: u32,
    pub join_date_score: u32,
}

impl ScoreFactors {
    /// product(gates) × sum(weights). Any closed gate zeroes the total.
    pub fn total(&self) -> u32 {
        self.same_team
            * self.previously_recommended
            * self.booked_office_hours
            * self.same_event
            * (self.team_focus_area
                + self.team_funding_stage
                + self.role_match
                + self.team_technology
                + self.has_office_hours
                + self.join_date_score)
    }
}

impl Default for ScoreFactors {
    fn default() -> Self {
        // Gates open, weights zero.
        Self {
            same_team: 1,
            previously_recommended: 1,
            booked_office_hours: 1,
            same_event: 1,
            team_focus_area: 0,
            team_funding_stage: 0,
            role_match: 0,
            team_technology: 0,
            has_office_hours: 0,
            join_date_score: 0,
        }
    }
}

// --- Run lifecycle ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub run_id: Uuid,
    pub member_uid: String,
    /// Denormalized at creation so review UIs and the outgoing email don't
    /// refetch the member.
    pub member_name: String,
    pub office_hours_url: Option<String>,
    pub score: u32,
    pub factors: ScoreFactors,
    pub status: RecommendationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub target_uid: String,
    pub status: RunStatus,
    pub is_example: bool,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub recommendations: Vec<Recommendation>,
}

impl Run {
    /// Recommendations in `{approved, pending}`, the set capped at 5.
    pub fn active_count(&self) -> usize {
        self.recommendations
            .iter()
            .filter(|r| r.status.is_active())
            .count()
    }

    /// Every member ever recommended in this run, regardless of status.
    /// Backfill must never re-surface any of them.
    pub fn recommended_uids(&self) -> Vec<String> {
        self.recommendations
            .iter()
            .map(|r| r.member_uid.clone())
            .collect()
    }
}
