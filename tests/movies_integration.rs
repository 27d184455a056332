mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Method, StatusCode};
use common::build_app;
use moviedb::models::permission::MOVIES_WRITE;
use moviedb::models::{Movie, Runtime};
use moviedb::store::{MemoryStore, MovieStore, StoreError};
use moviedb::utils::deadline::Deadline;
use serde_json::json;

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(3))
}

#[tokio::test]
async fn integration_healthcheck_reports_environment() {
    let app = build_app();
    let response = app.request(Method::GET, "/v1/healthcheck", None, None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "available");
    assert_eq!(response.body["environment"], "testing");
}

#[tokio::test]
async fn integration_anonymous_requests_are_unauthorized() {
    let app = build_app();
    let response = app.request(Method::GET, "/v1/movies", None, None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.body["error"],
        "you must be authenticated to access this resource"
    );
}

#[tokio::test]
async fn integration_bad_tokens_are_rejected() {
    let app = build_app();

    let garbage = app
        .request(Method::GET, "/v1/movies", Some("not-a-real-token"), None)
        .await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
    assert_eq!(garbage.headers[header::WWW_AUTHENTICATE], "Bearer");
    assert_eq!(
        garbage.body["error"],
        "invalid or missing authentication token"
    );

    let unknown = app
        .request(
            Method::GET,
            "/v1/movies",
            Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ"),
            None,
        )
        .await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);

    let basic = app
        .request_with_headers(
            Method::GET,
            "/v1/movies",
            None,
            &[("Authorization", "Basic YWxpY2U6c2VjcmV0")],
            None,
        )
        .await;
    assert_eq!(basic.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn integration_read_permission_does_not_allow_writes() {
    let app = build_app();
    let token = app.signed_in_user("reader@example.com", &[]).await;

    let list = app.request(Method::GET, "/v1/movies", Some(&token), None).await;
    assert_eq!(list.status, StatusCode::OK);

    let create = app
        .request(
            Method::POST,
            "/v1/movies",
            Some(&token),
            Some(json!({
                "title": "Moana",
                "year": 2016,
                "runtime": "107 mins",
                "genres": ["animation", "adventure"],
            })),
        )
        .await;
    assert_eq!(create.status, StatusCode::FORBIDDEN);
    assert_eq!(
        create.body["error"],
        "your user account doesn't have the necessary permissions to access this resource"
    );
}

#[tokio::test]
async fn integration_inactive_users_are_forbidden() {
    let app = build_app();
    app.register("Bob", "bob@example.com").await;

    let login = app.login("bob@example.com", common::PASSWORD).await;
    assert_eq!(login.status, StatusCode::CREATED);
    let token = login.body["authentication_token"]["token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app.request(Method::GET, "/v1/movies", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(
        response.body["error"],
        "your user account must be activated to access this resource"
    );
}

#[tokio::test]
async fn integration_create_show_and_delete_a_movie() {
    let app = build_app();
    let token = app
        .signed_in_user("writer@example.com", &[MOVIES_WRITE])
        .await;

    let created = app
        .request(
            Method::POST,
            "/v1/movies",
            Some(&token),
            Some(json!({
                "title": "Moana",
                "year": 2016,
                "runtime": "107 mins",
                "genres": ["animation", "adventure"],
            })),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.headers[header::LOCATION], "/v1/movies/1");
    assert_eq!(created.body["movie"]["id"], 1);
    assert_eq!(created.body["movie"]["version"], 1);
    assert_eq!(created.body["movie"]["runtime"], "107 mins");

    let shown = app
        .request(Method::GET, "/v1/movies/1", Some(&token), None)
        .await;
    assert_eq!(shown.status, StatusCode::OK);
    assert_eq!(shown.body["movie"]["title"], "Moana");

    let deleted = app
        .request(Method::DELETE, "/v1/movies/1", Some(&token), None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["message"], "movie successfully deleted");

    let again = app
        .request(Method::DELETE, "/v1/movies/1", Some(&token), None)
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
    assert_eq!(
        again.body["error"],
        "the requested resource could not be found"
    );
}

#[tokio::test]
async fn integration_invalid_ids_are_not_found() {
    let app = build_app();
    let token = app.signed_in_user("ids@example.com", &[]).await;

    for path in ["/v1/movies/0", "/v1/movies/-3", "/v1/movies/abc", "/v1/movies/99"] {
        let response = app.request(Method::GET, path, Some(&token), None).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{}", path);
    }
}

#[tokio::test]
async fn integration_invalid_movies_report_every_field() {
    let app = build_app();
    let token = app
        .signed_in_user("invalid@example.com", &[MOVIES_WRITE])
        .await;

    let response = app
        .request(
            Method::POST,
            "/v1/movies",
            Some(&token),
            Some(json!({
                "title": "",
                "year": 1500,
                "runtime": "-1 mins",
                "genres": ["drama", "drama"],
            })),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors = &response.body["error"];
    assert_eq!(errors["title"], "must be provided");
    assert_eq!(errors["year"], "must be greater than 1888");
    assert_eq!(errors["runtime"], "must be a positive integer");
    assert_eq!(errors["genres"], "must not contain duplicate values");
}

#[tokio::test]
async fn integration_malformed_bodies_are_bad_requests() {
    let app = build_app();
    let token = app
        .signed_in_user("malformed@example.com", &[MOVIES_WRITE])
        .await;

    let bad_runtime = app
        .request(
            Method::POST,
            "/v1/movies",
            Some(&token),
            Some(json!({ "title": "X", "year": 2000, "runtime": "107 minutes", "genres": ["a"] })),
        )
        .await;
    assert_eq!(bad_runtime.status, StatusCode::BAD_REQUEST);

    let unknown_field = app
        .request(
            Method::POST,
            "/v1/movies",
            Some(&token),
            Some(json!({ "title": "X", "rating": 5 })),
        )
        .await;
    assert_eq!(unknown_field.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn integration_inception_edit_conflict_scenario() {
    let app = build_app();
    let token = app
        .signed_in_user("editor@example.com", &[MOVIES_WRITE])
        .await;

    let created = app
        .request(
            Method::POST,
            "/v1/movies",
            Some(&token),
            Some(json!({
                "title": "Inception",
                "year": 2010,
                "runtime": "148 mins",
                "genres": ["scifi", "thriller"],
            })),
        )
        .await;
    assert_eq!(created.body["movie"]["version"], 1);

    // Another client bumps the version to 2.
    let first = app
        .request(
            Method::PATCH,
            "/v1/movies/1",
            Some(&token),
            Some(json!({ "runtime": "149 mins" })),
        )
        .await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["movie"]["version"], 2);

    // A client still holding version 1 is refused.
    let stale = app
        .request_with_headers(
            Method::PATCH,
            "/v1/movies/1",
            Some(&token),
            &[("X-Expected-Version", "1")],
            Some(json!({ "title": "Inception (stale)" })),
        )
        .await;
    assert_eq!(stale.status, StatusCode::CONFLICT);
    assert_eq!(
        stale.body["error"],
        "unable to update the record due to an edit conflict, please try again"
    );

    // Re-fetch and retry with the current version.
    let current = app
        .request(Method::GET, "/v1/movies/1", Some(&token), None)
        .await;
    assert_eq!(current.body["movie"]["version"], 2);

    let retried = app
        .request_with_headers(
            Method::PATCH,
            "/v1/movies/1",
            Some(&token),
            &[("X-Expected-Version", "2")],
            Some(json!({ "genres": ["scifi", "thriller", "action"] })),
        )
        .await;
    assert_eq!(retried.status, StatusCode::OK);
    assert_eq!(retried.body["movie"]["version"], 3);
    assert_eq!(retried.body["movie"]["runtime"], "149 mins");
}

#[tokio::test]
async fn integration_listing_filters_sorts_and_pages() {
    let app = build_app();
    let token = app
        .signed_in_user("lister@example.com", &[MOVIES_WRITE])
        .await;

    let movies = [
        ("Black Panther", 2018, 134, vec!["action", "adventure"]),
        ("Deadpool", 2016, 108, vec!["action", "comedy"]),
        ("The Breakfast Club", 1985, 96, vec!["drama"]),
        ("Moana", 2016, 107, vec!["animation", "adventure"]),
    ];
    for (title, year, runtime, genres) in movies {
        let created = app
            .request(
                Method::POST,
                "/v1/movies",
                Some(&token),
                Some(json!({
                    "title": title,
                    "year": year,
                    "runtime": format!("{} mins", runtime),
                    "genres": genres,
                })),
            )
            .await;
        assert_eq!(created.status, StatusCode::CREATED);
    }

    let all = app
        .request(Method::GET, "/v1/movies", Some(&token), None)
        .await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.body["movies"].as_array().unwrap().len(), 4);
    assert_eq!(all.body["movies"][0]["title"], "Black Panther");
    assert_eq!(all.body["metadata"]["total_records"], 4);

    let adventure = app
        .request(
            Method::GET,
            "/v1/movies?genres=adventure&sort=-year",
            Some(&token),
            None,
        )
        .await;
    let titles: Vec<_> = adventure.body["movies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Black Panther", "Moana"]);

    let search = app
        .request(
            Method::GET,
            "/v1/movies?title=breakfast%20club",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(search.body["movies"][0]["title"], "The Breakfast Club");
    assert_eq!(search.body["metadata"]["total_records"], 1);

    let paged = app
        .request(
            Method::GET,
            "/v1/movies?page=2&page_size=3&sort=year",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(paged.body["movies"].as_array().unwrap().len(), 1);
    assert_eq!(paged.body["movies"][0]["title"], "Black Panther");
    assert_eq!(paged.body["metadata"]["current_page"], 2);
    assert_eq!(paged.body["metadata"]["last_page"], 2);

    let empty = app
        .request(Method::GET, "/v1/movies?title=zzz", Some(&token), None)
        .await;
    assert_eq!(empty.status, StatusCode::OK);
    assert!(empty.body["movies"].as_array().unwrap().is_empty());
    assert_eq!(empty.body["metadata"], json!({}));
}

#[tokio::test]
async fn integration_listing_validates_query_parameters() {
    let app = build_app();
    let token = app.signed_in_user("query@example.com", &[]).await;

    let response = app
        .request(
            Method::GET,
            "/v1/movies?page=abc&page_size=500&sort=rating",
            Some(&token),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors = &response.body["error"];
    assert_eq!(errors["page"], "must be an integer value");
    assert_eq!(errors["page_size"], "must be a maximum of 100");
    assert_eq!(errors["sort"], "invalid sort value");
}

/// Updates racing on the same starting version: exactly one wins.
#[tokio::test]
async fn integration_concurrent_updates_have_a_single_winner() {
    let store = Arc::new(MemoryStore::new());
    let movie = store
        .insert_movie(
            deadline(),
            &Movie::new("Inception", 2010, Runtime(148), vec!["scifi".to_string()]),
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        let mut candidate = movie.clone();
        candidate.title = format!("Inception take {}", i);
        handles.push(tokio::spawn(async move {
            store.update_movie(deadline(), &candidate).await
        }));
    }

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(version) => {
                assert_eq!(version, 2);
                winners += 1;
            }
            Err(StoreError::EditConflict) => conflicts += 1,
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(store.get_movie(deadline(), movie.id).await.unwrap().version, 2);
}
