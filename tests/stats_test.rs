mod common;

use chrono::{Duration, Utc};
use common::json;
use improve_city::models::IssueStatus;

#[tokio::test]
async fn summary_respects_range() {
    let app = common::spawn_app().await;
    let now = Utc::now().naive_utc();

    common::insert_issue(&app, None, IssueStatus::Pending, now, None).await;
    common::insert_issue(&app, None, IssueStatus::InProgress, now - Duration::days(2), None).await;
    common::insert_issue(
        &app,
        None,
        IssueStatus::Resolved,
        now - Duration::days(3),
        Some(now - Duration::days(1)),
    )
    .await;
    common::insert_issue(&app, None, IssueStatus::Pending, now - Duration::days(20), None).await;

    let resp = app
        .client
        .get(app.url("/issues/stats"))
        .send()
        .await
        .unwrap();
    let (status, body) = json(resp).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["pending"], 1);
    assert_eq!(body["data"]["in_progress"], 1);
    assert_eq!(body["data"]["resolved"], 1);

    let resp = app
        .client
        .get(app.url("/issues/stats?range=all"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    assert_eq!(body["data"]["total"], 4);
    assert_eq!(body["data"]["pending"], 2);

    let resp = app
        .client
        .get(app.url("/issues/stats?range=1y"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn groupings_by_type_and_state() {
    let app = common::spawn_app().await;
    let (_, token) = common::register_citizen(&app, "stats").await;
    common::create_issue(&app, &token, "One", 12.90, 77.50).await;
    common::create_issue(&app, &token, "Two", 12.91, 77.51).await;
    let now = Utc::now().naive_utc();
    common::insert_issue(&app, None, IssueStatus::Pending, now, None).await;

    let resp = app
        .client
        .get(app.url("/issues/stats/by-type"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows[0]["type"], "Pothole");
    assert_eq!(rows[0]["count"], 2);
    assert_eq!(rows[1]["type"], "Garbage");

    let resp = app
        .client
        .get(app.url("/issues/stats/by-state"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    assert_eq!(body["data"][0]["state_code"], "KA");
    assert_eq!(body["data"][0]["count"], 3);
}

#[tokio::test]
async fn resolution_time_and_sla() {
    let app = common::spawn_app().await;
    let now = Utc::now().naive_utc();

    // Resolved in 10 hours and in 100 hours; default SLA is 48 hours.
    common::insert_issue(
        &app,
        None,
        IssueStatus::Resolved,
        now - Duration::hours(20),
        Some(now - Duration::hours(10)),
    )
    .await;
    common::insert_issue(
        &app,
        None,
        IssueStatus::Resolved,
        now - Duration::hours(110),
        Some(now - Duration::hours(10)),
    )
    .await;
    common::insert_issue(&app, None, IssueStatus::Pending, now, None).await;

    let resp = app
        .client
        .get(app.url("/issues/stats/avg-resolve-time"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    assert_eq!(body["data"]["resolved_count"], 2);
    let hours = body["data"]["avg_hours"].as_f64().unwrap();
    assert!((hours - 55.0).abs() < 0.01, "avg_hours = {}", hours);

    let resp = app
        .client
        .get(app.url("/issues/stats/sla"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    assert_eq!(body["data"]["sla_hours"], 48);
    assert_eq!(body["data"]["resolved_total"], 2);
    assert_eq!(body["data"]["within_sla"], 1);
    assert_eq!(body["data"]["compliance_pct"], 50.0);
}

#[tokio::test]
async fn sla_with_nothing_resolved_is_fully_compliant() {
    let app = common::spawn_app().await;
    let resp = app
        .client
        .get(app.url("/issues/stats/sla"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    assert_eq!(body["data"]["resolved_total"], 0);
    assert_eq!(body["data"]["compliance_pct"], 100.0);
}

#[tokio::test]
async fn trend_is_zero_filled() {
    let app = common::spawn_app().await;
    let now = Utc::now().naive_utc();
    common::insert_issue(&app, None, IssueStatus::Pending, now, None).await;

    let resp = app
        .client
        .get(app.url("/issues/stats/trend?days=5"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    let points = body["data"].as_array().unwrap();
    assert_eq!(points.len(), 5);
    assert_eq!(points[4]["created"], 1);
    assert!(points[..4].iter().all(|p| p["created"] == 0 && p["resolved"] == 0));

    let resp = app
        .client
        .get(app.url("/issues/stats/trend?days=91"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn contributors_and_recent_activity() {
    let app = common::spawn_app().await;
    let (busy_id, busy) = common::register_citizen(&app, "busy").await;
    let (_, quiet) = common::register_citizen(&app, "quiet").await;
    common::create_issue(&app, &busy, "First", 12.90, 77.50).await;
    let latest = common::create_issue(&app, &busy, "Second", 12.91, 77.51).await;
    common::create_issue(&app, &quiet, "Third", 12.92, 77.52).await;

    let resp = app
        .client
        .get(app.url("/issues/stats/top-contributors?limit=1"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["user_id"], busy_id);
    assert_eq!(rows[0]["count"], 2);

    let resp = app
        .client
        .get(app.url("/issues/stats/recent-activity?limit=2"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["kind"], "created");
    assert_eq!(rows[1]["issue_id"], latest);
}
