//! Integration tests for the two scheduled job bodies, invoked directly
//! (no scheduler involved) against the in-memory collaborators.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use lattice_common::{Member, Run, RunStatus, Team};
use lattice_recs::jobs::{EXAMPLE_SUBJECT, STANDARD_SUBJECT};
use lattice_recs::testing::{fixtures, InMemoryDirectory, InMemoryRunStore, RecordingMailer};
use lattice_recs::{RecommendationJobs, RunOrchestrator, RunStore};

struct World {
    directory: Arc<InMemoryDirectory>,
    runs: Arc<InMemoryRunStore>,
    mailer: Arc<RecordingMailer>,
    jobs: RecommendationJobs,
}

/// `subscribers` become eligible members (with settings); a pool of five
/// plain candidates guarantees everyone has someone to be matched with.
fn world(subscribers: Vec<Member>, enabled: bool, mailer: RecordingMailer) -> World {
    let mut teams: Vec<Team> = Vec::new();
    let mut members: Vec<Member> = Vec::new();

    for (i, sub) in subscribers.into_iter().enumerate() {
        let team = fixtures::team(&format!("t-sub-{i}"));
        members.push(fixtures::on_team(sub, &team));
        teams.push(team);
    }
    for i in 0..5 {
        let team = fixtures::team(&format!("t-pool-{i}"));
        members.push(fixtures::on_team(
            fixtures::member(&format!("pool-{i}")),
            &team,
        ));
        teams.push(team);
    }

    let directory = Arc::new(InMemoryDirectory::new(members, teams));
    let runs = Arc::new(InMemoryRunStore::new());
    let mailer = Arc::new(mailer);
    let orchestrator = Arc::new(RunOrchestrator::new(
        directory.clone(),
        runs.clone(),
        mailer.clone(),
    ));
    let jobs = RecommendationJobs::new(orchestrator, directory.clone(), runs.clone(), enabled);
    World {
        directory,
        runs,
        mailer,
        jobs,
    }
}

#[tokio::test]
async fn example_job_sends_once_and_flips_flags() {
    let alice = fixtures::subscriber(fixtures::member("alice"), false);
    let w = world(vec![alice], true, RecordingMailer::new());

    let summary = w.jobs.run_example_job().await.unwrap();
    assert_eq!(summary.considered, 1);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failed, 0);

    let emails = w.mailer.sent();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "alice@example.com");
    assert_eq!(emails[0].subject, EXAMPLE_SUBJECT);
    assert!(emails[0].is_example);
    assert!(!emails[0].items.is_empty());

    let setting = w
        .directory
        .member("alice")
        .unwrap()
        .notification_setting
        .unwrap();
    assert!(setting.example_sent);
    assert!(!setting.subscribed, "example recipients are unsubscribed");

    // Unsubscribed now, so a second pass does nothing.
    let again = w.jobs.run_example_job().await.unwrap();
    assert_eq!(again.considered, 0);
    assert_eq!(w.mailer.sent().len(), 1);
}

#[tokio::test]
async fn example_job_skips_members_with_categories_configured() {
    let configured = fixtures::subscriber(fixtures::member("carl"), true);
    let w = world(vec![configured], true, RecordingMailer::new());

    let summary = w.jobs.run_example_job().await.unwrap();
    assert_eq!(summary.considered, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.sent, 0);
    assert!(w.mailer.sent().is_empty());
}

#[tokio::test]
async fn example_job_skips_members_already_sent() {
    let mut alice = fixtures::subscriber(fixtures::member("alice"), false);
    alice.notification_setting.as_mut().unwrap().example_sent = true;
    let w = world(vec![alice], true, RecordingMailer::new());

    let summary = w.jobs.run_example_job().await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.sent, 0);
}

#[tokio::test]
async fn example_job_skips_members_without_email() {
    let mut alice = fixtures::subscriber(fixtures::member("alice"), false);
    alice.email = None;
    let w = world(vec![alice], true, RecordingMailer::new());

    let summary = w.jobs.run_example_job().await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn disabled_flag_makes_both_jobs_noops() {
    let alice = fixtures::subscriber(fixtures::member("alice"), false);
    let bob = fixtures::subscriber(fixtures::member("bob"), true);
    let w = world(vec![alice, bob], false, RecordingMailer::new());

    let example = w.jobs.run_example_job().await.unwrap();
    let recurring = w.jobs.run_bimonthly_job(Utc::now()).await.unwrap();
    assert_eq!(example.considered, 0);
    assert_eq!(recurring.considered, 0);
    assert!(w.mailer.sent().is_empty());
}

#[tokio::test]
async fn example_job_isolates_per_member_failures() {
    let alice = fixtures::subscriber(fixtures::member("alice"), false);
    let bob = fixtures::subscriber(fixtures::member("bob"), false);
    let w = world(
        vec![alice, bob],
        true,
        RecordingMailer::failing_for("alice@example.com"),
    );

    let summary = w.jobs.run_example_job().await.unwrap();
    assert_eq!(summary.considered, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.sent, 1);

    let emails = w.mailer.sent();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "bob@example.com");

    // The failed member keeps their flags and stays eligible for retry.
    let setting = w
        .directory
        .member("alice")
        .unwrap()
        .notification_setting
        .unwrap();
    assert!(!setting.example_sent);
}

#[tokio::test]
async fn bimonthly_job_sends_to_configured_members() {
    let carol = fixtures::subscriber(fixtures::member("carol"), true);
    let w = world(vec![carol], true, RecordingMailer::new());

    let summary = w.jobs.run_bimonthly_job(Utc::now()).await.unwrap();
    assert_eq!(summary.sent, 1);

    let emails = w.mailer.sent();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].subject, STANDARD_SUBJECT);
    assert!(!emails[0].is_example);
}

#[tokio::test]
async fn bimonthly_job_is_idempotent_within_the_window() {
    let carol = fixtures::subscriber(fixtures::member("carol"), true);
    let w = world(vec![carol], true, RecordingMailer::new());

    let first = w.jobs.run_bimonthly_job(Utc::now()).await.unwrap();
    assert_eq!(first.sent, 1);

    let second = w.jobs.run_bimonthly_job(Utc::now()).await.unwrap();
    assert_eq!(second.sent, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(w.mailer.sent().len(), 1);
}

#[tokio::test]
async fn bimonthly_window_ignores_example_sends() {
    let carol = fixtures::subscriber(fixtures::member("carol"), true);
    let w = world(vec![carol], true, RecordingMailer::new());

    // A recent example run must not suppress the recurring send.
    let example_run = Run {
        id: Uuid::new_v4(),
        target_uid: "carol".to_string(),
        status: RunStatus::Open,
        is_example: false,
        created_at: Utc::now() - Duration::days(1),
        sent_at: None,
        recommendations: vec![],
    };
    w.runs.insert_run(&example_run).await.unwrap();
    w.runs
        .review_and_mark_sent(example_run.id, &[], true, Utc::now() - Duration::days(1))
        .await
        .unwrap();

    let summary = w.jobs.run_bimonthly_job(Utc::now()).await.unwrap();
    assert_eq!(summary.sent, 1);
}

#[tokio::test]
async fn bimonthly_window_is_anchored_to_the_given_clock() {
    let carol = fixtures::subscriber(fixtures::member("carol"), true);
    let w = world(vec![carol], true, RecordingMailer::new());

    let now = Utc::now();
    let prior = Run {
        id: Uuid::new_v4(),
        target_uid: "carol".to_string(),
        status: RunStatus::Open,
        is_example: false,
        created_at: now - Duration::days(13),
        sent_at: None,
        recommendations: vec![],
    };
    w.runs.insert_run(&prior).await.unwrap();
    w.runs
        .review_and_mark_sent(prior.id, &[], false, now - Duration::days(13))
        .await
        .unwrap();

    // 13 days after the last send: inside the window.
    let summary = w.jobs.run_bimonthly_job(now).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.sent, 0);

    // Two days later the window has lapsed.
    let summary = w.jobs.run_bimonthly_job(now + Duration::days(2)).await.unwrap();
    assert_eq!(summary.sent, 1);
}

#[tokio::test]
async fn bimonthly_job_skips_unconfigured_subscribers() {
    let alice = fixtures::subscriber(fixtures::member("alice"), false);
    let w = world(vec![alice], true, RecordingMailer::new());

    let summary = w.jobs.run_bimonthly_job(Utc::now()).await.unwrap();
    assert_eq!(summary.considered, 0);
    assert!(w.mailer.sent().is_empty());
}

#[tokio::test]
async fn job_with_no_qualifying_candidates_skips_cleanly() {
    // Lone subscriber, no candidate pool at all.
    let carol = fixtures::subscriber(fixtures::member("carol"), true);
    let team = fixtures::team("t-solo");
    let directory = Arc::new(InMemoryDirectory::new(
        vec![fixtures::on_team(carol, &team)],
        vec![team.clone()],
    ));
    let runs = Arc::new(InMemoryRunStore::new());
    let mailer = Arc::new(RecordingMailer::new());
    let orchestrator = Arc::new(RunOrchestrator::new(
        directory.clone(),
        runs.clone(),
        mailer.clone(),
    ));
    let jobs = RecommendationJobs::new(orchestrator, directory, runs, true);

    let summary = jobs.run_bimonthly_job(Utc::now()).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert!(mailer.sent().is_empty());
}
