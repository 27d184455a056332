mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::TimeDelta;
use common::{build_app, PASSWORD};
use moviedb::mailer::Message;
use serde_json::json;

#[tokio::test]
async fn integration_registration_sends_a_welcome_mail() {
    let app = build_app();
    let response = app.register("Alice Smith", "alice@example.com").await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    let user = &response.body["user"];
    assert_eq!(user["id"], 1);
    assert_eq!(user["email"], "alice@example.com");
    assert_eq!(user["activated"], false);
    assert!(user.get("password").is_none());

    app.latest_activation_token("alice@example.com", 1).await;
    assert!(matches!(
        app.mailer.sent_to("alice@example.com")[0],
        Message::Welcome { user_id: 1, .. }
    ));
}

#[tokio::test]
async fn integration_duplicate_email_is_a_validation_error() {
    let app = build_app();
    app.register("Alice", "alice@example.com").await;

    let again = app.register("Alice Again", "ALICE@example.com").await;
    assert_eq!(again.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        again.body["error"]["email"],
        "a user with this email address already exists"
    );
}

#[tokio::test]
async fn integration_registration_validates_every_field() {
    let app = build_app();
    let response = app
        .request(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({ "name": "", "email": "not-an-email", "password": "short" })),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors = &response.body["error"];
    assert_eq!(errors["name"], "must be provided");
    assert_eq!(errors["email"], "must be a valid email address");
    assert_eq!(errors["password"], "must be at least 8 bytes long");
}

#[tokio::test]
async fn integration_activation_token_is_single_use() {
    let app = build_app();
    app.register("Carol", "carol@example.com").await;
    let token = app.latest_activation_token("carol@example.com", 1).await;

    let activated = app.activate(&token).await;
    assert_eq!(activated.status, StatusCode::OK);
    assert_eq!(activated.body["user"]["activated"], true);

    let reused = app.activate(&token).await;
    assert_eq!(reused.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        reused.body["error"]["token"],
        "invalid or expired activation token"
    );
}

#[tokio::test]
async fn integration_activation_token_expires_after_three_days() {
    let app = build_app();
    app.register("Dave", "dave@example.com").await;
    let token = app.latest_activation_token("dave@example.com", 1).await;

    app.clock.advance(TimeDelta::days(3));

    let response = app.activate(&token).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.body["error"]["token"],
        "invalid or expired activation token"
    );
}

#[tokio::test]
async fn integration_activation_rejects_malformed_tokens() {
    let app = build_app();
    let response = app.activate("abc").await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["error"]["token"], "must be 26 bytes long");
}

#[tokio::test]
async fn integration_authorization_tokens_cannot_activate() {
    let app = build_app();
    app.register("Erin", "erin@example.com").await;

    let login = app.login("erin@example.com", PASSWORD).await;
    let auth_token = login.body["authentication_token"]["token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app.activate(&auth_token).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn integration_activation_tokens_cannot_authenticate() {
    let app = build_app();
    app.register("Frank", "frank@example.com").await;
    let activation = app.latest_activation_token("frank@example.com", 1).await;

    let response = app
        .request(Method::GET, "/v1/movies", Some(&activation), None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn integration_resending_activation_tokens() {
    let app = build_app();
    app.register("Grace", "grace@example.com").await;
    app.latest_activation_token("grace@example.com", 1).await;

    let resent = app
        .request(
            Method::POST,
            "/v1/tokens/activation",
            None,
            Some(json!({ "email": "grace@example.com" })),
        )
        .await;
    assert_eq!(resent.status, StatusCode::ACCEPTED);

    let token = app.latest_activation_token("grace@example.com", 2).await;
    assert_eq!(app.activate(&token).await.status, StatusCode::OK);

    let already = app
        .request(
            Method::POST,
            "/v1/tokens/activation",
            None,
            Some(json!({ "email": "grace@example.com" })),
        )
        .await;
    assert_eq!(already.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        already.body["error"]["email"],
        "user has already been activated"
    );

    let unknown = app
        .request(
            Method::POST,
            "/v1/tokens/activation",
            None,
            Some(json!({ "email": "nobody@example.com" })),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        unknown.body["error"]["email"],
        "no matching email address found"
    );
}

#[tokio::test]
async fn integration_wrong_credentials_are_unauthorized() {
    let app = build_app();
    app.register("Heidi", "heidi@example.com").await;

    for (email, password) in [
        ("heidi@example.com", "wrong-password"),
        ("nobody@example.com", PASSWORD),
    ] {
        let response = app.login(email, password).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.body["error"],
            "invalid authentication credentials"
        );
    }
}

#[tokio::test]
async fn integration_new_login_revokes_the_previous_token() {
    let app = build_app();
    let first = app.signed_in_user("ivan@example.com", &[]).await;

    let second = app.login("ivan@example.com", PASSWORD).await;
    assert_eq!(second.status, StatusCode::CREATED);
    let second = second.body["authentication_token"]["token"]
        .as_str()
        .unwrap()
        .to_string();

    let old = app.request(Method::GET, "/v1/movies", Some(&first), None).await;
    assert_eq!(old.status, StatusCode::UNAUTHORIZED);

    let new = app.request(Method::GET, "/v1/movies", Some(&second), None).await;
    assert_eq!(new.status, StatusCode::OK);
}

#[tokio::test]
async fn integration_authorization_token_expires_after_a_day() {
    let app = build_app();
    let token = app.signed_in_user("judy@example.com", &[]).await;

    app.clock.advance(TimeDelta::hours(23));
    let fresh = app.request(Method::GET, "/v1/movies", Some(&token), None).await;
    assert_eq!(fresh.status, StatusCode::OK);

    app.clock.advance(TimeDelta::hours(1));
    let expired = app.request(Method::GET, "/v1/movies", Some(&token), None).await;
    assert_eq!(expired.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn integration_oversized_and_malformed_bodies_are_rejected() {
    let app = build_app();

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/v1/users")
        .header("Content-Type", "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    assert_eq!(app.send(malformed).await.status, StatusCode::BAD_REQUEST);

    let huge_name = "x".repeat(2 * 1024 * 1024);
    let oversized = Request::builder()
        .method(Method::POST)
        .uri("/v1/users")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "name": huge_name, "email": "a@b.c", "password": PASSWORD }).to_string(),
        ))
        .unwrap();
    assert_eq!(app.send(oversized).await.status, StatusCode::BAD_REQUEST);
}
