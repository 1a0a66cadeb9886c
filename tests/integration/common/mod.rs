use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::App;
use chrono::{TimeDelta, Utc};
use serde_json::Value;
use uuid::Uuid;

use challenge_engine::api;
use challenge_engine::models::{Campaign, Challenge};
use challenge_engine::store::{ChallengeStore, MemoryStore, SquadDirectory};
use challenge_engine::util::auth::{digest, ApiKeys};
use challenge_engine::util::script::{ScriptLimits, ScriptRunner};
use challenge_engine::AppState;

pub const API_KEY: &str = "integration-test-key";
pub const GUILD: &str = "guild-1";
pub const OTHER_GUILD: &str = "guild-2";

pub const GENERATOR: &str = r#"echo '{"input": "3 4", "result": "7"}'"#;

/// One guild with a campaign that started an hour ago on a daily cadence:
/// `released` is due, `tomorrow` is not. Squad Red has alice and bob,
/// squad Blue has carol, and dave belongs to no squad.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub campaign: Campaign,
    pub released: Uuid,
    pub tomorrow: Uuid,
    pub red: Uuid,
    pub blue: Uuid,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_scoreboard_ttl(Duration::ZERO)
    }

    pub fn with_scoreboard_ttl(ttl: Duration) -> Self {
        let store = Arc::new(MemoryStore::new());

        let mut campaign = Campaign::new(
            GUILD,
            "Autumn Campaign",
            Utc::now() - TimeDelta::hours(1),
            24,
            "admin",
        );
        campaign.announcement_channels = vec!["announcements".into()];
        store.add_campaign(campaign.clone());

        let released = store.add_challenge(Challenge::new(
            campaign.id,
            "Sum of two",
            1,
            Some(GENERATOR.to_string()),
        ));
        let tomorrow = store.add_challenge(Challenge::new(
            campaign.id,
            "Tomorrow",
            2,
            Some(GENERATOR.to_string()),
        ));

        let red = store.add_squad(GUILD, "Red");
        store.add_member(red, "alice");
        store.add_member(red, "bob");
        let blue = store.add_squad(GUILD, "Blue");
        store.add_member(blue, "carol");

        let challenges: Arc<dyn ChallengeStore> = store.clone();
        let squads: Arc<dyn SquadDirectory> = store.clone();
        let runner = ScriptRunner::new("sh", vec![], ScriptLimits::default());
        let state = AppState::new(
            challenges,
            squads,
            runner,
            ApiKeys::new([digest(API_KEY)]),
            ttl,
        );

        Self {
            store,
            state,
            campaign,
            released,
            tomorrow,
            red,
            blue,
        }
    }

    pub async fn call(&self, req: TestRequest) -> (StatusCode, Value) {
        let app =
            test::init_service(App::new().configure(|cfg| api::configure(cfg, &self.state))).await;
        let resp = test::call_service(&app, req.to_request()).await;
        let status = resp.status();
        let body = test::read_body(resp).await;
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&body).into_owned())
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(authorized(TestRequest::get().uri(uri))).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(authorized(TestRequest::post().uri(uri)).set_json(body))
            .await
    }

    pub async fn post_empty(&self, uri: &str) -> (StatusCode, Value) {
        self.call(authorized(TestRequest::post().uri(uri))).await
    }

    pub async fn submit(&self, challenge: Uuid, user: &str, solution: &str) -> (StatusCode, Value) {
        self.post(
            &format!("/challenges/{challenge}/submit-solution"),
            serde_json::json!({
                "guild_id": GUILD,
                "user_id": user,
                "username": format!("{user}#0001"),
                "submitted_solution": solution,
            }),
        )
        .await
    }

    pub async fn fetch_input(&self, challenge: Uuid, user: &str) -> (StatusCode, Value) {
        self.get(&format!(
            "/challenges/{challenge}/input?guild_id={GUILD}&user_id={user}"
        ))
        .await
    }
}

pub fn authorized(req: TestRequest) -> TestRequest {
    req.insert_header(("Authorization", format!("Bearer {API_KEY}")))
}
