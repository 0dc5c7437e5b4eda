// tests/test_auth_api.rs


use axum::http::StatusCode;
use serde_json::json;
use test_helpers::*;
use tower::ServiceExt;

#[tokio::test]
async fn test_health_reports_version() {
    let state = create_test_state(&closed_url().await).await;
    let app = create_test_app(state);

    let response = app.oneshot(request("GET", "/api/health", None, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-api-version"));

    let body = read_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
    assert_eq!(body["model"], "scripted");
}

#[tokio::test]
async fn test_register_then_session() {
    let state = create_test_state(&closed_url().await).await;
    let app = create_test_app(state);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "email": "ada@example.com", "password": "hunter22" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let registered = read_json(response).await;
    assert_eq!(registered["user"]["userType"], "regular");
    assert_eq!(registered["user"]["email"], "ada@example.com");
    assert_eq!(registered["refreshToken"], "refresh-ada");
    let token = registered["token"].as_str().unwrap().to_string();

    let response = app
        .oneshot(request("GET", "/api/auth/session", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = read_json(response).await;
    assert_eq!(session["user"]["id"], registered["user"]["id"]);
}

#[tokio::test]
async fn test_register_rejects_bad_credentials_locally() {
    let state = create_test_state(&closed_url().await).await;
    let app = create_test_app(state);

    for body in [
        json!({ "email": "not-an-email", "password": "hunter22" }),
        json!({ "email": "ada@example.com", "password": "123" }),
    ] {
        let response = app
            .clone()
            .oneshot(request("POST", "/api/auth/register", None, Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["code"], "bad_request:auth");
    }
}

#[tokio::test]
async fn test_provider_errors_map_to_auth_codes() {
    let state = create_test_state(&closed_url().await).await;
    let app = create_test_app(state);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "wrong-password" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["code"], "bad_request:auth");

    let response = app
        .oneshot(request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "email": "taken@example.com", "password": "hunter22" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_guest_and_oauth_sign_in() {
    let state = create_test_state(&closed_url().await).await;
    let app = create_test_app(state);

    let response = app
        .clone()
        .oneshot(request("POST", "/api/auth/guest", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let guest = read_json(response).await;
    assert_eq!(guest["user"]["userType"], "guest");

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            "/api/auth/session",
            guest["token"].as_str(),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(read_json(response).await["user"]["userType"], "guest");

    let response = app
        .oneshot(request(
            "POST",
            "/api/auth/oauth",
            None,
            Some(json!({ "providerId": "google.com", "idToken": "google-jwt" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let oauth = read_json(response).await;
    assert_eq!(oauth["user"]["userType"], "regular");
    assert_eq!(oauth["user"]["email"], "google-com-user@example.com");
}

#[tokio::test]
async fn test_session_requires_valid_token() {
    let state = create_test_state(&closed_url().await).await;
    let app = create_test_app(state);

    let response = app
        .clone()
        .oneshot(request("GET", "/api/auth/session", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["code"], "unauthorized:auth");

    let response = app
        .oneshot(request("GET", "/api/auth/session", Some("forged"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
