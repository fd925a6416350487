mod common;

use common::{json, TEST_PASSWORD};
use sea_orm::EntityTrait;
use serde_json::Value;

#[tokio::test]
async fn register_sends_code_and_blocks_login_until_verified() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .post(app.url("/auth/register"))
        .json(&serde_json::json!({
            "name": "Asha",
            "email": "Asha@Example.com",
            "password": TEST_PASSWORD
        }))
        .send()
        .await
        .unwrap();
    let (status, body) = json(resp).await;
    assert_eq!(status, 201);
    assert_eq!(body["data"]["user"]["email"], "asha@example.com");
    assert_eq!(body["data"]["user"]["role"], "citizen");
    assert_eq!(body["data"]["user"]["is_verified"], false);
    assert!(body["data"]["access_token"].as_str().is_some());

    let mail = app
        .wait_for_mail("asha@example.com")
        .await
        .expect("verification mail");
    assert!(mail.body.contains("verification code"));

    let login = |email: &'static str| {
        app.client
            .post(app.url("/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": TEST_PASSWORD }))
            .send()
    };
    assert_eq!(login("asha@example.com").await.unwrap().status(), 403);

    let user_id = body["data"]["user"]["id"].as_i64().unwrap() as i32;
    let code = improve_city::models::User::find_by_id(user_id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap()
        .email_verify_code
        .expect("code stored");
    assert!(mail.body.contains(&code));

    let resp = app
        .client
        .post(app.url("/auth/verify-code"))
        .json(&serde_json::json!({ "email": "asha@example.com", "code": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let (status, body) = json(login("ASHA@example.com").await.unwrap()).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["user"]["is_verified"], true);
    assert!(body["data"]["user"]["last_login"].is_string());
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let app = common::spawn_app().await;

    let payload = serde_json::json!({
        "name": "Ravi",
        "email": "ravi@example.com",
        "password": TEST_PASSWORD
    });
    let resp = app
        .client
        .post(app.url("/auth/register"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = app
        .client
        .post(app.url("/auth/register"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    let (status, body) = json(resp).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Email already registered");
}

#[tokio::test]
async fn short_password_is_rejected() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .post(app.url("/auth/register"))
        .json(&serde_json::json!({
            "name": "Short",
            "email": "short@example.com",
            "password": "abc"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = common::spawn_app().await;
    let (user_id, _) =
        common::create_user_with_role(&app, "login", improve_city::models::UserRole::Citizen).await;
    let email = common::email_of(&app, user_id).await;

    let resp = app
        .client
        .post(app.url("/auth/login"))
        .json(&serde_json::json!({ "email": email, "password": "not_the_password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = app
        .client
        .post(app.url("/auth/login"))
        .json(&serde_json::json!({ "email": "nobody@example.com", "password": TEST_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn refresh_rotates_and_logout_revokes() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .post(app.url("/auth/register"))
        .json(&serde_json::json!({
            "name": "Rotor",
            "email": "rotor@example.com",
            "password": TEST_PASSWORD
        }))
        .send()
        .await
        .unwrap();
    let (_, body) = json(resp).await;
    let first = body["data"]["refresh_token"].as_str().unwrap().to_string();

    let resp = app
        .client
        .post(app.url("/auth/refresh"))
        .json(&serde_json::json!({ "refresh_token": first }))
        .send()
        .await
        .unwrap();
    let (status, body) = json(resp).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["token_type"], "bearer");
    let second = body["data"]["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    // The old token was consumed by the rotation.
    let resp = app
        .client
        .post(app.url("/auth/refresh"))
        .json(&serde_json::json!({ "refresh_token": first }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Access tokens are not accepted as refresh tokens.
    let access = body["data"]["access_token"].as_str().unwrap().to_string();
    let resp = app
        .client
        .post(app.url("/auth/refresh"))
        .json(&serde_json::json!({ "refresh_token": access }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = app
        .client
        .post(app.url("/auth/logout"))
        .bearer_auth(&access)
        .json(&serde_json::json!({ "refresh_token": second }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = app
        .client
        .post(app.url("/auth/refresh"))
        .json(&serde_json::json!({ "refresh_token": second }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn me_requires_a_token() {
    let app = common::spawn_app().await;

    let resp = app.client.get(app.url("/auth/me")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = app
        .client
        .get(app.url("/auth/me"))
        .bearer_auth("garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let (_, token) = common::register_citizen(&app, "me").await;
    let resp = app
        .client
        .get(app.url("/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["role"], "citizen");
}

#[tokio::test]
async fn forgot_and_reset_password() {
    let app = common::spawn_app().await;
    let (user_id, _) =
        common::create_user_with_role(&app, "reset", improve_city::models::UserRole::Citizen).await;
    let email = common::email_of(&app, user_id).await;

    // Unknown addresses get the same answer.
    let resp = app
        .client
        .post(app.url("/auth/forgot"))
        .json(&serde_json::json!({ "email": "ghost@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = app
        .client
        .post(app.url("/auth/forgot"))
        .json(&serde_json::json!({ "email": email }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let mail = app.wait_for_mail(&email).await.expect("reset mail");
    let token = mail
        .body
        .split("reset-password?token=")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .expect("token in link")
        .to_string();

    // A reset token cannot be used to verify an email.
    let resp = app
        .client
        .post(app.url("/auth/verify-email"))
        .json(&serde_json::json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = app
        .client
        .post(app.url("/auth/reset"))
        .json(&serde_json::json!({ "token": token, "password": "brand_new_password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = app
        .client
        .post(app.url("/auth/login"))
        .json(&serde_json::json!({ "email": email, "password": "brand_new_password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn deactivated_user_is_forbidden() {
    let app = common::spawn_app().await;
    let (user_id, token) = common::register_citizen(&app, "inactive").await;
    let (_, admin_token) =
        common::create_user_with_role(&app, "admin", improve_city::models::UserRole::Admin).await;

    let resp = app
        .client
        .put(app.url(&format!("/admin/users/{}", user_id)))
        .bearer_auth(&admin_token)
        .json(&serde_json::json!({ "is_active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = app
        .client
        .get(app.url("/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}
