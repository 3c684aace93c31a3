//! Integration tests for the Postgres stores.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use lattice_common::{
    InteractionKind, Recommendation, RecommendationStatus, Run, RunStatus, ScoreFactors,
};
use lattice_recs::{MemberDirectory, RunFilter, RunStore};
use lattice_store::{PgDirectory, PgRunStore};

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;

    sqlx::migrate!("../../migrations").run(&pool).await.ok()?;

    sqlx::query(
        "TRUNCATE recommendations, runs, notification_settings, experiences, \
         event_attendance, interactions, team_memberships, members, teams CASCADE",
    )
    .execute(&pool)
    .await
    .ok()?;

    Some(pool)
}

async fn seed_member(pool: &PgPool, uid: &str) {
    sqlx::query("INSERT INTO members (uid, name, email) VALUES ($1, $2, $3)")
        .bind(uid)
        .bind(format!("Member {uid}"))
        .bind(format!("{uid}@example.com"))
        .execute(pool)
        .await
        .unwrap();
}

fn rec(run_id: Uuid, member_uid: &str, score: u32) -> Recommendation {
    Recommendation {
        id: Uuid::new_v4(),
        run_id,
        member_uid: member_uid.to_string(),
        member_name: format!("Member {member_uid}"),
        office_hours_url: None,
        score,
        factors: ScoreFactors {
            team_technology: 5,
            team_focus_area: 5,
            team_funding_stage: 5,
            ..Default::default()
        },
        status: RecommendationStatus::Pending,
    }
}

#[tokio::test]
async fn run_roundtrip_and_lifecycle_updates() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PgRunStore::new(pool);

    let run_id = Uuid::new_v4();
    let run = Run {
        id: run_id,
        target_uid: "target".to_string(),
        status: RunStatus::Open,
        is_example: false,
        created_at: Utc::now(),
        sent_at: None,
        recommendations: vec![rec(run_id, "a", 19), rec(run_id, "b", 15)],
    };
    store.insert_run(&run).await.unwrap();

    let stored = store.run(run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Open);
    assert_eq!(stored.recommendations.len(), 2);
    // Highest score first.
    assert_eq!(stored.recommendations[0].member_uid, "a");
    assert_eq!(stored.recommendations[0].factors.team_technology, 5);

    // Reject "b" and backfill "c" in one write.
    let rejected = stored.recommendations[1].id;
    store
        .review_and_add(run_id, &[], &[rejected], &[rec(run_id, "c", 16)])
        .await
        .unwrap();

    let stored = store.run(run_id).await.unwrap().unwrap();
    assert_eq!(stored.recommendations.len(), 3);
    let by_uid = |uid: &str| {
        stored
            .recommendations
            .iter()
            .find(|r| r.member_uid == uid)
            .unwrap()
    };
    assert_eq!(by_uid("b").status, RecommendationStatus::Rejected);
    assert_eq!(by_uid("c").status, RecommendationStatus::Pending);

    let approved = by_uid("a").id;
    let sent_at = Utc::now();
    store
        .review_and_mark_sent(run_id, &[approved], false, sent_at)
        .await
        .unwrap();

    let stored = store.run(run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Sent);
    assert!(stored.sent_at.is_some());
    assert_eq!(
        stored.recommendations[0].status,
        RecommendationStatus::Approved
    );

    let last = store.last_non_example_sent("target").await.unwrap().unwrap();
    assert!((last - sent_at).abs() < Duration::seconds(1));

    store.delete_run(run_id).await.unwrap();
    assert!(store.run(run_id).await.unwrap().is_none());
}

#[tokio::test]
async fn runs_filter_and_example_window() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PgRunStore::new(pool);

    let open_id = Uuid::new_v4();
    let example_id = Uuid::new_v4();
    for (id, target) in [(open_id, "x"), (example_id, "x")] {
        let run = Run {
            id,
            target_uid: target.to_string(),
            status: RunStatus::Open,
            is_example: false,
            created_at: Utc::now(),
            sent_at: None,
            recommendations: vec![],
        };
        store.insert_run(&run).await.unwrap();
    }
    store
        .review_and_mark_sent(example_id, &[], true, Utc::now())
        .await
        .unwrap();

    let open = store
        .runs(&RunFilter {
            target_uid: Some("x".to_string()),
            status: Some(RunStatus::Open),
        })
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, open_id);

    // Example sends don't count toward the bi-monthly window.
    assert!(store.last_non_example_sent("x").await.unwrap().is_none());
}

#[tokio::test]
async fn directory_pages_members_and_assembles_relations() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let directory = PgDirectory::new(pool.clone());

    sqlx::query(
        r#"
        INSERT INTO teams (uid, name, focus_areas, funding_stage, technologies, industry_tags)
        VALUES ('t1', 'Drive Collective', '["Storage"]', 'seed', '["IPFS"]', '["infra"]')
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    for uid in ["m1", "m2", "m3"] {
        seed_member(&pool, uid).await;
    }
    sqlx::query(
        r#"
        INSERT INTO team_memberships (member_uid, team_uid, role, role_tags, is_lead)
        VALUES ('m1', 't1', 'Engineer', '["backend"]', TRUE)
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO interactions (member_uid, with_member_uid, kind, created_at) \
         VALUES ('m1', 'm2', 'office_hours', NOW())",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO event_attendance (member_uid, event_uid) VALUES ('m1', 'ev1')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO experiences (member_uid, company) VALUES ('m1', 'Drive Labs')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO notification_settings (member_uid, subscribed, focus_area) \
         VALUES ('m1', TRUE, TRUE)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let page = directory.members_page(0, 2).await.unwrap();
    assert_eq!(page.len(), 2);

    let m1 = directory.member_with_relations("m1").await.unwrap().unwrap();
    assert_eq!(m1.teams.len(), 1);
    assert_eq!(m1.teams[0].team_uid, "t1");
    assert!(m1.teams[0].team.is_none(), "teams attach in the loader, not here");
    assert_eq!(m1.teams[0].role_tags, vec!["backend".to_string()]);
    assert_eq!(m1.interactions[0].kind, InteractionKind::OfficeHours);
    assert_eq!(m1.events[0].event_uid, "ev1");
    assert_eq!(m1.experiences[0].company, "Drive Labs");
    let setting = m1.notification_setting.unwrap();
    assert!(setting.subscribed && setting.focus_area);

    let teams = directory.all_teams().await.unwrap();
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0].technologies, vec!["IPFS".to_string()]);

    directory.mark_example_sent("m1").await.unwrap();
    let m1 = directory.member_with_relations("m1").await.unwrap().unwrap();
    let setting = m1.notification_setting.unwrap();
    assert!(setting.example_sent);
    assert!(!setting.subscribed);

    assert!(directory
        .member_with_relations("ghost")
        .await
        .unwrap()
        .is_none());

    assert!(directory.mark_example_sent("m3").await.is_err());
}
