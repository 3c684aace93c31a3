use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;

use lattice_common::{Member, ScoreFactors};

/// Scored candidates below this total are dropped from the output.
pub const MIN_SCORE: u32 = 15;

/// Engine configuration. Built once by the caller and passed in
/// explicitly; there is no package-level weight table.
///
/// Known quirk, preserved as observed behavior: `include_same_event`
/// keeps only candidates who share an event with the target, while the
/// `same_event` gate zeroes exactly those candidates. Enabling the
/// filter therefore yields an empty result set. Flagged to the domain
/// owner; do not "fix" without a contract change.
#[derive(Debug, Clone, Default)]
pub struct ScoringConfig {
    /// Org names never recommended; matched case-insensitively as
    /// substrings of experience company names and team names.
    pub skip_team_names: Vec<String>,
    pub skip_member_uids: Vec<String>,
    pub skip_member_names: Vec<String>,
    /// Industry tags excluded, case-insensitive substring match.
    pub skip_industry_tags: Vec<String>,
    pub include_focus_areas: bool,
    pub include_roles: bool,
    pub include_funding_stages: bool,
    pub include_same_event: bool,
}

/// One candidate that survived filtering and the score threshold.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub member: Member,
    pub factors: ScoreFactors,
    pub score: u32,
}

/// Rank `candidates` against `target`.
///
/// Filter → score → threshold → sort descending. Ties are deliberately
/// unstable: equal scores come back in random order, so a top-N prefix
/// rotates through tied candidates across runs.
pub fn score(
    target: &Member,
    candidates: &[Member],
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .filter(|c| !is_skipped_member(c, target, config))
        .filter(|c| !matches_skip_orgs(c, config))
        .filter(|c| !matches_skip_industries(c, config))
        .filter(|c| !config.include_same_event || shares_event(target, c))
        .filter_map(|c| {
            let factors = compute_factors(target, c, config, now);
            let total = factors.total();
            if total < MIN_SCORE {
                return None;
            }
            Some(ScoredCandidate {
                member: c.clone(),
                factors,
                score: total,
            })
        })
        .collect();

    // Shuffle, then stable-sort by score: descending, random tie order.
    scored.shuffle(&mut rand::rng());
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

fn compute_factors(
    target: &Member,
    candidate: &Member,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> ScoreFactors {
    let booked = has_office_hours_interaction(candidate, target, None);
    let recent = has_office_hours_interaction(candidate, target, Some(now - chrono::Duration::days(180)));

    ScoreFactors {
        same_team: gate(!shares_team(target, candidate)),
        previously_recommended: gate(!recent),
        booked_office_hours: gate(!booked),
        same_event: gate(!shares_event(target, candidate)),
        team_focus_area: weighted(config.include_focus_areas && shares_focus_area(target, candidate), 5),
        team_funding_stage: weighted(
            config.include_funding_stages && shares_funding_stage(target, candidate),
            5,
        ),
        role_match: weighted(config.include_roles && shares_role(target, candidate), 5),
        // Technology overlap scores regardless of any toggle.
        team_technology: weighted(shares_technology(target, candidate), 5),
        has_office_hours: weighted(candidate.office_hours_url.is_some(), 1),
        join_date_score: join_date_score(candidate.joined_at, now),
    }
}

fn gate(open: bool) -> u32 {
    if open {
        1
    } else {
        0
    }
}

fn weighted(hit: bool, weight: u32) -> u32 {
    if hit {
        weight
    } else {
        0
    }
}

// --- Filter predicates ---

fn is_skipped_member(candidate: &Member, target: &Member, config: &ScoringConfig) -> bool {
    candidate.uid == target.uid
        || config.skip_member_uids.iter().any(|u| *u == candidate.uid)
        || config.skip_member_names.iter().any(|n| *n == candidate.name)
}

fn matches_skip_orgs(candidate: &Member, config: &ScoringConfig) -> bool {
    if config.skip_team_names.is_empty() {
        return false;
    }
    let needles: Vec<String> = config.skip_team_names.iter().map(|s| s.to_lowercase()).collect();

    let company_hit = candidate.experiences.iter().any(|e| {
        let company = e.company.to_lowercase();
        needles.iter().any(|n| company.contains(n.as_str()))
    });
    let team_hit = candidate.teams.iter().filter_map(|m| m.team.as_ref()).any(|t| {
        let name = t.name.to_lowercase();
        needles.iter().any(|n| name.contains(n.as_str()))
    });

    company_hit || team_hit
}

fn matches_skip_industries(candidate: &Member, config: &ScoringConfig) -> bool {
    if config.skip_industry_tags.is_empty() {
        return false;
    }
    let needles: Vec<String> = config
        .skip_industry_tags
        .iter()
        .map(|s| s.to_lowercase())
        .collect();

    candidate
        .teams
        .iter()
        .filter_map(|m| m.team.as_ref())
        .flat_map(|t| t.industry_tags.iter())
        .any(|tag| {
            let tag = tag.to_lowercase();
            needles.iter().any(|n| tag.contains(n.as_str()))
        })
}

// --- Factor predicates ---

fn shares_team(a: &Member, b: &Member) -> bool {
    a.teams
        .iter()
        .any(|ma| b.teams.iter().any(|mb| ma.team_uid == mb.team_uid))
}

/// Does `candidate` have an office-hours interaction with `target`?
/// With `since`, only interactions recorded after that instant count.
fn has_office_hours_interaction(
    candidate: &Member,
    target: &Member,
    since: Option<DateTime<Utc>>,
) -> bool {
    candidate.interactions.iter().any(|i| {
        i.kind == lattice_common::InteractionKind::OfficeHours
            && i.with_member_uid == target.uid
            && since.map_or(true, |cutoff| i.created_at >= cutoff)
    })
}

fn shares_event(a: &Member, b: &Member) -> bool {
    a.events
        .iter()
        .any(|ea| b.events.iter().any(|eb| ea.event_uid == eb.event_uid))
}

fn shares_focus_area(a: &Member, b: &Member) -> bool {
    let a_areas = focus_areas(a);
    let b_areas = focus_areas(b);
    a_areas.iter().any(|x| b_areas.contains(x))
}

fn focus_areas(member: &Member) -> Vec<&str> {
    member
        .teams
        .iter()
        .filter_map(|m| m.team.as_ref())
        .flat_map(|t| t.focus_areas.iter().map(|s| s.as_str()))
        .collect()
}

fn shares_funding_stage(a: &Member, b: &Member) -> bool {
    let a_stages: Vec<&str> = a
        .teams
        .iter()
        .filter_map(|m| m.team.as_ref())
        .filter_map(|t| t.funding_stage.as_deref())
        .collect();
    b.teams
        .iter()
        .filter_map(|m| m.team.as_ref())
        .filter_map(|t| t.funding_stage.as_deref())
        .any(|s| a_stages.contains(&s))
}

fn shares_technology(a: &Member, b: &Member) -> bool {
    let a_tech = technologies(a);
    let b_tech = technologies(b);
    a_tech.iter().any(|x| b_tech.contains(x))
}

fn technologies(member: &Member) -> Vec<&str> {
    member
        .teams
        .iter()
        .filter_map(|m| m.team.as_ref())
        .flat_map(|t| t.technologies.iter().map(|s| s.as_str()))
        .collect()
}

/// Role names and role tags, compared case-insensitively.
fn shares_role(a: &Member, b: &Member) -> bool {
    let collect = |m: &Member| -> Vec<String> {
        m.teams
            .iter()
            .flat_map(|t| t.role.iter().cloned().chain(t.role_tags.iter().cloned()))
            .map(|r| r.to_lowercase())
            .collect()
    };
    let a_roles = collect(a);
    let b_roles = collect(b);
    a_roles.iter().any(|r| b_roles.contains(r))
}

/// 3 if joined under a month ago, 2 under three months, 1 under six.
/// Unset join date scores 0.
fn join_date_score(joined_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u32 {
    let Some(joined) = joined_at else {
        return 0;
    };
    let days = (now - joined).num_days();
    if days < 30 {
        3
    } else if days < 90 {
        2
    } else if days < 180 {
        1
    } else {
        0
    }
}
