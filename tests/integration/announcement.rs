use actix_web::http::StatusCode;
use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use challenge_engine::models::{Campaign, Challenge};

use crate::common::{TestApp, GUILD, OTHER_GUILD};

fn ids(body: &serde_json::Value) -> Vec<String> {
    body["challenges"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap().to_string())
        .collect()
}

#[actix_rt::test]
async fn due_challenge_is_pending_until_announced() {
    let app = TestApp::new();

    let (status, body) = app.get("/challenges/pending-announcements").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec![app.released.to_string()]);

    let entry = &body["challenges"][0];
    assert_eq!(entry["guild_id"], GUILD);
    assert_eq!(entry["order_position"], 1);
    assert_eq!(entry["announcement_channels"][0], "announcements");
    assert_eq!(entry["campaign"]["id"], app.campaign.id.to_string());
    assert_eq!(entry["campaign"]["release_cadence_hours"], 24);
    assert!(entry["released_at"].is_null());

    let (status, body) = app
        .post_empty(&format!("/challenges/{}/mark-announced", app.released))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = app.get("/challenges/pending-announcements").await;
    assert!(ids(&body).is_empty());
}

#[actix_rt::test]
async fn upcoming_window_is_honoured() {
    let app = TestApp::new();
    let soon = Campaign::new(
        OTHER_GUILD,
        "Starting soon",
        Utc::now() + TimeDelta::seconds(20),
        1,
        "admin",
    );
    app.store.add_campaign(soon.clone());
    let first = app
        .store
        .add_challenge(Challenge::new(soon.id, "Opening", 1, None));
    app.store
        .add_challenge(Challenge::new(soon.id, "Later", 2, None));

    let (status, body) = app.get("/challenges/upcoming-announcements").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec![first.to_string()]);
    let release_time: DateTime<Utc> = body["challenges"][0]["release_time"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(release_time, soon.start_time);

    let (_, body) = app.get("/challenges/upcoming-announcements?seconds=5").await;
    assert!(ids(&body).is_empty());

    let (status, _) = app.get("/challenges/upcoming-announcements?seconds=-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn mark_released_is_idempotent() {
    let app = TestApp::new();
    let uri = format!("/challenges/{}/mark-released", app.released);

    let (status, _) = app.post_empty(&uri).await;
    assert_eq!(status, StatusCode::OK);
    let first = app.store.challenge(app.released).unwrap().state;
    assert!(first.is_released());

    let (status, body) = app.post_empty(&uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(app.store.challenge(app.released).unwrap().state, first);
}

#[actix_rt::test]
async fn challenges_cannot_be_released_early() {
    let app = TestApp::new();

    for action in ["mark-released", "mark-announced"] {
        let (status, _) = app
            .post_empty(&format!("/challenges/{}/{action}", app.tomorrow))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{action}");
    }
    assert!(!app.store.challenge(app.tomorrow).unwrap().state.is_released());
}

#[actix_rt::test]
async fn announcing_records_both_timestamps() {
    let app = TestApp::new();

    let (status, _) = app
        .post_empty(&format!("/challenges/{}/mark-announced", app.released))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get(&format!("/challenges/{}", app.released)).await;
    assert_eq!(status, StatusCode::OK);
    let challenge = &body["challenge"];
    assert_eq!(challenge["is_released"], true);
    assert_eq!(challenge["is_announced"], true);
    assert!(challenge["released_at"].is_string());
    assert!(challenge["announced_at"].is_string());
    assert_eq!(challenge["title"], "Sum of two");
    assert_eq!(challenge["guild_id"], GUILD);
    assert_eq!(challenge["campaign"]["title"], "Autumn Campaign");
    assert_eq!(challenge["campaign"]["is_active"], true);
}

#[actix_rt::test]
async fn unknown_challenges_are_not_found() {
    let app = TestApp::new();
    let missing = Uuid::new_v4();

    for uri in [
        format!("/challenges/{missing}"),
        "/challenges/not-a-uuid".to_string(),
    ] {
        let (status, _) = app.get(&uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }

    let (status, body) = app
        .post_empty(&format!("/challenges/{missing}/mark-announced"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Challenge not found");
}
