pub mod announcement;
pub mod challenge;
pub mod monitor;
pub mod scoreboard;

use actix_web::web;
use serde::Serialize;

use crate::models::{Campaign, Challenge};
use crate::util::api_util::APIError;
use crate::AppState;

/// Registers shared state, extractor error handlers and every route.
pub fn configure(cfg: &mut web::ServiceConfig, state: &AppState) {
    cfg.app_data(web::Data::from(state.store.clone()))
        .app_data(web::Data::from(state.squads.clone()))
        .app_data(web::Data::from(state.cache.clone()))
        .app_data(web::Data::from(state.generator.clone()))
        .app_data(web::Data::from(state.arbiter.clone()))
        .app_data(web::Data::from(state.api_keys.clone()))
        .app_data(web::PathConfig::default().error_handler(|_, _| APIError::ChallengeNotFound.into()))
        .app_data(web::QueryConfig::default().error_handler(|_, _| APIError::InvalidQuery.into()))
        .app_data(web::JsonConfig::default().error_handler(|_, _| APIError::InvalidFormData.into()))
        .service(
            // Fixed paths first, "/{id}" would swallow them otherwise.
            web::scope("/challenges")
                .service(announcement::upcoming_announcements)
                .service(announcement::pending_announcements)
                .service(scoreboard::scoreboard)
                .service(scoreboard::detailed_scoreboard)
                .service(scoreboard::upcoming_campaign)
                .service(announcement::get_challenge)
                .service(announcement::mark_released)
                .service(announcement::mark_announced)
                .service(challenge::input_exists)
                .service(challenge::get_input)
                .service(challenge::submit_solution),
        )
        .service(web::scope("/monitor").service(monitor::cache_size));
}

// Column widths of the guild, user and username fields.
pub const GUILD_ID_MAX_CHARS: usize = 20;
pub const USER_ID_MAX_CHARS: usize = 20;
pub const USERNAME_MAX_CHARS: usize = 100;

/// Non-blank and no longer than `max_chars`.
pub fn bounded(value: &str, max_chars: usize) -> bool {
    !value.trim().is_empty() && value.chars().count() <= max_chars
}

#[derive(Debug, Serialize)]
pub struct CampaignBrief {
    pub id: uuid::Uuid,
    pub title: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub release_cadence_hours: i32,
}

impl From<&Campaign> for CampaignBrief {
    fn from(campaign: &Campaign) -> Self {
        Self {
            id: campaign.id,
            title: campaign.title.clone(),
            start_time: campaign.start_time,
            release_cadence_hours: campaign.release_cadence_hours,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChallengeBrief {
    pub id: uuid::Uuid,
    pub title: String,
}

impl From<&Challenge> for ChallengeBrief {
    fn from(challenge: &Challenge) -> Self {
        Self {
            id: challenge.id,
            title: challenge.title.clone(),
        }
    }
}
