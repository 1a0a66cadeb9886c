use std::time::Duration;

use actix_web::http::StatusCode;
use chrono::{TimeDelta, Utc};

use challenge_engine::models::Campaign;

use crate::common::{TestApp, GUILD, OTHER_GUILD};

#[actix_rt::test]
async fn guild_without_campaign_gets_empty_scoreboards() {
    let app = TestApp::new();

    let (status, body) = app
        .get(&format!("/challenges/scoreboard?guild_id={OTHER_GUILD}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["campaign"].is_null());
    assert_eq!(body["scoreboard"].as_array().unwrap().len(), 0);
    assert_eq!(body["total_submissions"], 0);
    assert_eq!(body["total_challenges"], 0);

    let (status, body) = app
        .get(&format!("/challenges/detailed-scoreboard?guild_id={OTHER_GUILD}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["campaign"].is_null());
    assert_eq!(
        body["detailed_scoreboard"]["challenges_breakdown"]
            .as_array()
            .unwrap()
            .len(),
        0
    );
}

#[actix_rt::test]
async fn scoreboard_ranks_first_successes() {
    let app = TestApp::new();
    app.fetch_input(app.released, "alice").await;
    app.fetch_input(app.released, "carol").await;

    app.submit(app.released, "carol", "wrong").await;
    app.submit(app.released, "alice", "7").await;
    app.submit(app.released, "bob", "7").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    app.submit(app.released, "carol", "7").await;

    let (status, body) = app
        .get(&format!("/challenges/scoreboard?guild_id={GUILD}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["campaign"]["id"], app.campaign.id.to_string());
    assert_eq!(body["campaign"]["name"], "Autumn Campaign");
    assert_eq!(body["campaign"]["num_challenges"], 2);
    assert!(body["campaign"]["end_date"].is_null());
    assert_eq!(
        body["campaign"]["start_date"],
        app.campaign.start_time.format("%B %d, %Y").to_string()
    );
    assert_eq!(body["total_submissions"], 4);
    assert_eq!(body["total_challenges"], 2);

    let ranking = body["scoreboard"].as_array().unwrap();
    assert_eq!(ranking.len(), 2);
    for entry in ranking {
        assert_eq!(entry["successful_submissions"], 1);
    }
    let top = ranking[0]["total_points"].as_i64().unwrap();
    let second = ranking[1]["total_points"].as_i64().unwrap();
    assert!(top >= second, "{top} < {second}");
    if top > second {
        assert_eq!(ranking[0]["squad_name"], "Red");
    } else {
        assert_eq!(ranking[0]["squad_name"], "Blue");
    }

    let (status, body) = app
        .get(&format!("/challenges/detailed-scoreboard?guild_id={GUILD}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let detailed = &body["detailed_scoreboard"];
    let breakdown = detailed["challenges_breakdown"].as_array().unwrap();
    assert_eq!(breakdown.len(), 1);
    assert_eq!(breakdown[0]["challenge_title"], "Sum of two");
    assert_eq!(breakdown[0]["submissions"].as_array().unwrap().len(), 2);
    let totals = detailed["squad_totals"].as_array().unwrap();
    assert_eq!(totals.len(), 2);
    assert!(totals.iter().all(|t| t["challenges_completed"] == 1));
}

#[actix_rt::test]
async fn cached_scoreboard_refreshes_after_a_win() {
    let app = TestApp::with_scoreboard_ttl(Duration::from_secs(60));
    let uri = format!("/challenges/scoreboard?guild_id={GUILD}");
    app.fetch_input(app.released, "alice").await;

    let (_, body) = app.get(&uri).await;
    assert_eq!(body["total_submissions"], 0);

    app.submit(app.released, "alice", "wrong").await;
    let (_, body) = app.get(&uri).await;
    assert_eq!(body["total_submissions"], 0);

    app.submit(app.released, "alice", "7").await;
    let (_, body) = app.get(&uri).await;
    assert_eq!(body["total_submissions"], 2);
    assert_eq!(body["scoreboard"][0]["squad_name"], "Red");
}

#[actix_rt::test]
async fn upcoming_campaign_is_the_next_to_start() {
    let app = TestApp::new();
    let uri = format!("/challenges/upcoming-campaign?guild_id={GUILD}");

    let (status, body) = app.get(&uri).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["campaign"].is_null());

    let later = Campaign::new(GUILD, "Spring", Utc::now() + TimeDelta::days(90), 24, "admin");
    let sooner = Campaign::new(GUILD, "Winter", Utc::now() + TimeDelta::days(30), 24, "admin");
    app.store.add_campaign(later);
    app.store.add_campaign(sooner.clone());

    let (_, body) = app.get(&uri).await;
    assert_eq!(body["campaign"]["id"], sooner.id.to_string());
    assert_eq!(body["campaign"]["name"], "Winter");
    assert_eq!(
        body["campaign"]["start_date"],
        sooner
            .start_time
            .format("%B %d, %Y at %I:%M %p UTC")
            .to_string()
    );

    let (_, body) = app
        .get(&format!("/challenges/scoreboard?guild_id={GUILD}"))
        .await;
    assert_eq!(body["campaign"]["name"], "Autumn Campaign");
}
