//! Member directory reads, plus the one write this core owns.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use lattice_common::{
    EventAttendance, Experience, Interaction, Member, NotificationSetting, Team, TeamMembership,
};
use lattice_recs::MemberDirectory;

/// Member/team reads over Postgres. Relations for a page of members are
/// pulled with one `= ANY(uids)` query per relation table, not one query
/// per member.
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

type MemberRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<DateTime<Utc>>,
);

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn assemble(&self, rows: Vec<MemberRow>) -> Result<Vec<Member>> {
        let uids: Vec<String> = rows.iter().map(|r| r.0.clone()).collect();
        let mut relations = self.load_relations(&uids).await?;

        Ok(rows
            .into_iter()
            .map(|(uid, name, email, office_hours_url, joined_at)| {
                let rel = relations.remove(&uid).unwrap_or_default();
                Member {
                    uid,
                    name,
                    email,
                    office_hours_url,
                    joined_at,
                    teams: rel.teams,
                    interactions: rel.interactions,
                    events: rel.events,
                    experiences: rel.experiences,
                    notification_setting: rel.setting,
                }
            })
            .collect())
    }

    async fn load_relations(&self, uids: &[String]) -> Result<HashMap<String, Relations>> {
        let mut out: HashMap<String, Relations> = HashMap::new();

        let memberships = sqlx::query_as::<_, (String, String, Option<String>, Json<Vec<String>>, bool)>(
            r#"
            SELECT member_uid, team_uid, role, role_tags, is_lead
            FROM team_memberships
            WHERE member_uid = ANY($1)
            "#,
        )
        .bind(uids)
        .fetch_all(&self.pool)
        .await?;
        for (member_uid, team_uid, role, Json(role_tags), is_lead) in memberships {
            out.entry(member_uid).or_default().teams.push(TeamMembership {
                team_uid,
                role,
                role_tags,
                is_lead,
                team: None,
            });
        }

        let interactions = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(
            r#"
            SELECT member_uid, with_member_uid, kind, created_at
            FROM interactions
            WHERE member_uid = ANY($1)
            "#,
        )
        .bind(uids)
        .fetch_all(&self.pool)
        .await?;
        for (member_uid, with_member_uid, kind, created_at) in interactions {
            let kind = kind.parse().map_err(anyhow::Error::msg)?;
            out.entry(member_uid).or_default().interactions.push(Interaction {
                with_member_uid,
                kind,
                created_at,
            });
        }

        let events = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT member_uid, event_uid
            FROM event_attendance
            WHERE member_uid = ANY($1)
            "#,
        )
        .bind(uids)
        .fetch_all(&self.pool)
        .await?;
        for (member_uid, event_uid) in events {
            out.entry(member_uid)
                .or_default()
                .events
                .push(EventAttendance { event_uid });
        }

        let experiences = sqlx::query_as::<_, (String, String, Option<String>)>(
            r#"
            SELECT member_uid, company, title
            FROM experiences
            WHERE member_uid = ANY($1)
            "#,
        )
        .bind(uids)
        .fetch_all(&self.pool)
        .await?;
        for (member_uid, company, title) in experiences {
            out.entry(member_uid)
                .or_default()
                .experiences
                .push(Experience { company, title });
        }

        let settings = sqlx::query_as::<_, (String, bool, bool, bool, bool, bool, bool, bool, bool)>(
            r#"
            SELECT member_uid, subscribed, example_sent,
                   focus_area, funding_stage, role, technology, industry_tag, keyword
            FROM notification_settings
            WHERE member_uid = ANY($1)
            "#,
        )
        .bind(uids)
        .fetch_all(&self.pool)
        .await?;
        for (member_uid, subscribed, example_sent, focus_area, funding_stage, role, technology, industry_tag, keyword) in
            settings
        {
            out.entry(member_uid.clone()).or_default().setting = Some(NotificationSetting {
                member_uid: member_uid.clone(),
                subscribed,
                example_sent,
                focus_area,
                funding_stage,
                role,
                technology,
                industry_tag,
                keyword,
            });
        }

        Ok(out)
    }
}

#[derive(Default)]
struct Relations {
    teams: Vec<TeamMembership>,
    interactions: Vec<Interaction>,
    events: Vec<EventAttendance>,
    experiences: Vec<Experience>,
    setting: Option<NotificationSetting>,
}

#[async_trait]
impl MemberDirectory for PgDirectory {
    async fn member_with_relations(&self, uid: &str) -> Result<Option<Member>> {
        let row = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT uid, name, email, office_hours_url, joined_at
            FROM members
            WHERE uid = $1
            "#,
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut members = self.assemble(vec![row]).await?;
        Ok(members.pop())
    }

    async fn members_page(&self, offset: u64, limit: u64) -> Result<Vec<Member>> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT uid, name, email, office_hours_url, joined_at
            FROM members
            ORDER BY uid ASC
            OFFSET $1 LIMIT $2
            "#,
        )
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }

    async fn all_teams(&self) -> Result<Vec<Team>> {
        let rows = sqlx::query_as::<_, (
            String,
            String,
            Json<Vec<String>>,
            Option<String>,
            Json<Vec<String>>,
            Json<Vec<String>>,
        )>(
            r#"
            SELECT uid, name, focus_areas, funding_stage, technologies, industry_tags
            FROM teams
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(uid, name, Json(focus_areas), funding_stage, Json(technologies), Json(industry_tags))| Team {
                    uid,
                    name,
                    focus_areas,
                    funding_stage,
                    technologies,
                    industry_tags,
                },
            )
            .collect())
    }

    async fn mark_example_sent(&self, uid: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE notification_settings
            SET example_sent = TRUE, subscribed = FALSE
            WHERE member_uid = $1
            "#,
        )
        .bind(uid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("no notification setting for member {uid}");
        }
        Ok(())
    }
}
