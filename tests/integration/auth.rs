use actix_web::http::StatusCode;
use actix_web::test::TestRequest;

use crate::common::TestApp;

#[actix_rt::test]
async fn requests_without_a_valid_key_are_rejected() {
    let app = TestApp::new();

    let (status, body) = app
        .call(TestRequest::get().uri("/challenges/pending-announcements"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing or invalid API key");

    let (status, _) = app
        .call(
            TestRequest::post()
                .uri(&format!("/challenges/{}/mark-released", app.released))
                .insert_header(("Authorization", "Bearer not-the-key")),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!app.store.challenge(app.released).unwrap().state.is_released());
}

#[actix_rt::test]
async fn monitor_reports_cache_sizes() {
    let app = TestApp::new();
    app.fetch_input(app.released, "alice").await;

    let (status, body) = app.get("/monitor/cache").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["inputs"].is_array());
    assert!(body["standings"].is_array());
}
