mod common;

use common::{issue_form, json};
use improve_city::models::UserRole;

// Smallest valid PNG header; enough for the magic-byte check.
const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

#[tokio::test]
async fn citizen_reports_issue_with_photo() {
    let app = common::spawn_app().await;
    let (user_id, token) = common::register_citizen(&app, "reporter").await;

    let photo = reqwest::multipart::Part::bytes(PNG.to_vec())
        .file_name("pothole.png")
        .mime_str("image/png")
        .unwrap();
    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(&token)
        .multipart(issue_form("Deep pothole on MG Road", "Pothole", 12.9716, 77.5946).part("files", photo))
        .send()
        .await
        .unwrap();
    let (status, body) = json(resp).await;
    assert_eq!(status, 201, "{}", body);

    let issue = &body["data"];
    assert_eq!(issue["status"], "pending");
    assert_eq!(issue["country"], "IN");
    assert_eq!(issue["state_code"], "KA");
    assert_eq!(issue["created_by_id"], user_id);
    assert!(issue["assigned_to_id"].is_null());
    let photos = issue["photos"].as_array().unwrap();
    assert_eq!(photos.len(), 1);
    assert!(photos[0].as_str().unwrap().ends_with(".png"));

    let id = issue["id"].as_i64().unwrap();
    let resp = app
        .client
        .get(app.url(&format!("/issues/{}/activity", id)))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    let kinds: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["created"]);

    let email = common::email_of(&app, user_id).await;
    let confirmation = async {
        for _ in 0..50 {
            if app
                .mails_to(&email)
                .iter()
                .any(|m| m.subject.contains("We received your report"))
            {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        false
    };
    assert!(confirmation.await);
}

#[tokio::test]
async fn anonymous_reports_follow_the_setting() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .post(app.url("/issues"))
        .multipart(issue_form("Overflowing bin", "Garbage", 19.0760, 72.8777))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    app.set_settings("allow_anonymous_reporting = TRUE").await;

    let resp = app
        .client
        .post(app.url("/issues"))
        .multipart(issue_form("Overflowing bin", "Garbage", 19.0760, 72.8777))
        .send()
        .await
        .unwrap();
    let (status, body) = json(resp).await;
    assert_eq!(status, 201, "{}", body);
    assert!(body["data"]["created_by_id"].is_null());
}

#[tokio::test]
async fn location_outside_india_is_rejected() {
    let app = common::spawn_app().await;
    let (_, token) = common::register_citizen(&app, "geo").await;

    // London
    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(&token)
        .multipart(issue_form("Somewhere else", "Pothole", 51.5074, -0.1278))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(&token)
        .multipart(
            reqwest::multipart::Form::new()
                .text("title", "Only latitude")
                .text("lat", "12.97"),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(&token)
        .multipart(issue_form("Wrong country", "Pothole", 12.9716, 77.5946).text("country", "US"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn nearby_report_of_same_category_is_flagged_as_duplicate() {
    let app = common::spawn_app().await;
    let (_, token) = common::register_citizen(&app, "dup").await;

    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(&token)
        .multipart(issue_form("Broken streetlight", "Streetlight", 12.9716, 77.5946))
        .send()
        .await
        .unwrap();
    let (status, first) = json(resp).await;
    assert_eq!(status, 201);
    let first_id = first["data"]["id"].as_i64().unwrap();

    // About 20 m north of the first report.
    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(&token)
        .multipart(issue_form("Streetlight not working", "Streetlight", 12.97178, 77.5946))
        .send()
        .await
        .unwrap();
    let (status, body) = json(resp).await;
    assert_eq!(status, 400);
    assert_eq!(body["duplicate"], true);
    assert_eq!(body["existing_issue_id"], first_id);
    assert!(body["message"].as_str().is_some());

    // A different category at the same spot is fine.
    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(&token)
        .multipart(issue_form("Garbage pile", "Garbage", 12.97178, 77.5946))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // So is an explicit bypass.
    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(&token)
        .multipart(
            issue_form("Streetlight not working", "Streetlight", 12.97178, 77.5946)
                .text("bypass_duplicate_check", "true"),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn mismatched_photo_is_rejected_before_insert() {
    let app = common::spawn_app().await;
    let (_, token) = common::register_citizen(&app, "upload").await;

    let fake = reqwest::multipart::Part::bytes(b"definitely not a png".to_vec())
        .file_name("fake.png")
        .mime_str("image/png")
        .unwrap();
    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(&token)
        .multipart(issue_form("Fake photo", "Pothole", 12.9716, 77.5946).part("files", fake))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = app.client.get(app.url("/issues")).send().await.unwrap();
    let (_, body) = json(resp).await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn oversized_photo_is_413() {
    let app = common::spawn_app().await;
    let (_, token) = common::register_citizen(&app, "big_photo").await;

    let mut data = PNG.to_vec();
    data.resize(2 * 1024 * 1024 + 1, 0);
    let photo = reqwest::multipart::Part::bytes(data)
        .file_name("huge.png")
        .mime_str("image/png")
        .unwrap();
    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(&token)
        .multipart(issue_form("Huge photo", "Pothole", 12.9716, 77.5946).part("files", photo))
        .send()
        .await
        .unwrap();
    let (status, body) = json(resp).await;
    assert_eq!(status, 413);
    assert_eq!(body["error"], "Image exceeds 2MB");

    let resp = app.client.get(app.url("/issues")).send().await.unwrap();
    let (_, body) = json(resp).await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn auto_assign_prefers_regional_staff() {
    let app = common::spawn_app().await;
    let (_, token) = common::register_citizen(&app, "auto").await;
    let (staff_id, _) = common::create_user_with_role(&app, "ka_staff", UserRole::Staff).await;
    let (_, _) = common::create_user_with_role(&app, "other_staff", UserRole::Staff).await;
    common::add_region(&app, staff_id, "KA").await;
    app.set_settings("auto_assign_issues = TRUE").await;

    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(&token)
        .multipart(issue_form("Water leak", "Water", 12.9716, 77.5946))
        .send()
        .await
        .unwrap();
    let (status, body) = json(resp).await;
    assert_eq!(status, 201);
    assert_eq!(body["data"]["assigned_to_id"], staff_id);

    let id = body["data"]["id"].as_i64().unwrap();
    let resp = app
        .client
        .get(app.url(&format!("/issues/{}/activity", id)))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    let kinds: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["created", "assigned"]);
}

/// Submit a Karnataka report and return who it was auto-assigned to.
async fn auto_assignee(app: &common::TestApp, token: &str, title: &str) -> serde_json::Value {
    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(token)
        .multipart(issue_form(title, "Water", 12.9716, 77.5946).text("bypass_duplicate_check", "true"))
        .send()
        .await
        .unwrap();
    let (status, body) = json(resp).await;
    assert_eq!(status, 201, "{}", body);
    body["data"]["assigned_to_id"].clone()
}

#[tokio::test]
async fn auto_assign_picks_least_loaded_regional_staff() {
    let app = common::spawn_app().await;
    let (_, token) = common::register_citizen(&app, "load").await;
    let (busy, _) = common::create_user_with_role(&app, "busy_staff", UserRole::Staff).await;
    let (idle, _) = common::create_user_with_role(&app, "idle_staff", UserRole::Staff).await;
    common::add_region(&app, busy, "KA").await;
    common::add_region(&app, idle, "KA").await;
    common::seed_open_issues(&app, busy, 3).await;
    common::seed_open_issues(&app, idle, 1).await;
    app.set_settings("auto_assign_issues = TRUE").await;

    assert_eq!(auto_assignee(&app, &token, "Burst main").await, idle);
}

#[tokio::test]
async fn auto_assign_tie_goes_to_lower_id() {
    let app = common::spawn_app().await;
    let (_, token) = common::register_citizen(&app, "tie").await;
    let (first, _) = common::create_user_with_role(&app, "first_staff", UserRole::Staff).await;
    let (second, _) = common::create_user_with_role(&app, "second_staff", UserRole::Staff).await;
    common::add_region(&app, second, "KA").await;
    common::add_region(&app, first, "KA").await;
    common::seed_open_issues(&app, first, 2).await;
    common::seed_open_issues(&app, second, 2).await;
    app.set_settings("auto_assign_issues = TRUE").await;

    assert!(first < second);
    assert_eq!(auto_assignee(&app, &token, "Broken lamp").await, first);
}

#[tokio::test]
async fn auto_assign_falls_back_to_admin_then_super_admin() {
    let app = common::spawn_app().await;
    let (_, token) = common::register_citizen(&app, "fallback").await;
    let (root, _) = common::create_user_with_role(&app, "root", UserRole::SuperAdmin).await;
    // Staff outside the issue's state never qualify.
    let (far_staff, _) = common::create_user_with_role(&app, "far_staff", UserRole::Staff).await;
    common::add_region(&app, far_staff, "DL").await;
    app.set_settings("auto_assign_issues = TRUE").await;

    assert_eq!(auto_assignee(&app, &token, "No admins yet").await, root);

    let (loaded, _) = common::create_user_with_role(&app, "loaded_admin", UserRole::Admin).await;
    let (fresh, _) = common::create_user_with_role(&app, "fresh_admin", UserRole::Admin).await;
    common::seed_open_issues(&app, loaded, 2).await;

    assert_eq!(auto_assignee(&app, &token, "Admins now").await, fresh);
}

#[tokio::test]
async fn list_filters_and_pagination() {
    let app = common::spawn_app().await;
    let (_, alice) = common::register_citizen(&app, "alice").await;
    let (_, bob) = common::register_citizen(&app, "bob").await;

    let a1 = common::create_issue(&app, &alice, "Alice first", 12.90, 77.50).await;
    let a2 = common::create_issue(&app, &alice, "Alice second", 12.95, 77.55).await;
    let _b1 = common::create_issue(&app, &bob, "Bob only", 28.61, 77.20).await;

    let resp = app
        .client
        .get(app.url("/issues?limit=2"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["limit"], 2);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);

    let resp = app
        .client
        .get(app.url("/issues?mine=true"))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    let ids: Vec<i64> = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![a2 as i64, a1 as i64]);

    let resp = app
        .client
        .get(app.url("/issues?mine=true"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = app
        .client
        .get(app.url(&format!("/issues?q=%23{}", a1)))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    assert_eq!(body["data"]["total"], 1);

    let resp = app
        .client
        .get(app.url("/issues?q=bob"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    assert_eq!(body["data"]["total"], 1);

    // Bounding box around Bengaluru only.
    let resp = app
        .client
        .get(app.url("/issues?bbox=77.0,12.5,78.0,13.5"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    assert_eq!(body["data"]["total"], 2);

    let resp = app
        .client
        .get(app.url("/issues?status=bogus"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = app
        .client
        .get(app.url("/issues?needs_attention=true"))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    assert_eq!(body["data"]["total"], 3);
}

#[tokio::test]
async fn related_lists_nearby_issues_nearest_first() {
    let app = common::spawn_app().await;
    let (_, token) = common::register_citizen(&app, "related").await;

    let center = common::create_issue(&app, &token, "Center", 12.9716, 77.5946).await;
    let near = common::create_issue(&app, &token, "Near", 12.9726, 77.5946).await;
    let farther = common::create_issue(&app, &token, "Farther", 12.9746, 77.5946).await;
    let _far = common::create_issue(&app, &token, "Far away", 13.0716, 77.5946).await;

    let resp = app
        .client
        .get(app.url(&format!("/issues/{}/related", center)))
        .send()
        .await
        .unwrap();
    let (status, body) = json(resp).await;
    assert_eq!(status, 200);
    let ids: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![near as i64, farther as i64]);
}

#[tokio::test]
async fn unknown_issue_is_not_found() {
    let app = common::spawn_app().await;
    let resp = app
        .client
        .get(app.url("/issues/999999"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
