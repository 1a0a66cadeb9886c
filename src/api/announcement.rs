use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::models::{ChallengeContext, ChallengeId, ReleaseState};
use crate::store::ChallengeStore;
use crate::util::api_util::*;
use crate::util::auth::ApiKey;
use crate::util::release::{self, Transition, DEFAULT_UPCOMING_WINDOW_SECS};

use super::CampaignBrief;

// A day is far more than any poller asks for.
const MAX_UPCOMING_WINDOW_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Serialize)]
struct AnnouncedChallenge {
    id: ChallengeId,
    title: String,
    description: String,
    guild_id: String,
    announcement_channels: Vec<String>,
    order_position: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    release_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    released_at: Option<Option<DateTime<Utc>>>,
    campaign: CampaignBrief,
}

impl AnnouncedChallenge {
    fn new(ctx: &ChallengeContext) -> Self {
        Self {
            id: ctx.challenge.id,
            title: ctx.challenge.title.clone(),
            description: ctx.challenge.description.clone(),
            guild_id: ctx.campaign.guild_id.clone(),
            announcement_channels: ctx.campaign.announcement_channels.clone(),
            order_position: ctx.challenge.order_position,
            release_time: None,
            released_at: None,
            campaign: CampaignBrief::from(&ctx.campaign),
        }
    }

    fn upcoming(ctx: &ChallengeContext) -> Self {
        Self {
            release_time: Some(ctx.release_time()),
            ..Self::new(ctx)
        }
    }

    fn pending(ctx: &ChallengeContext) -> Self {
        Self {
            released_at: Some(ctx.challenge.state.released_at()),
            ..Self::new(ctx)
        }
    }
}

#[derive(Debug, Serialize)]
struct ChallengeListResponse {
    challenges: Vec<AnnouncedChallenge>,
}

#[derive(Debug, Deserialize)]
struct UpcomingRequest {
    seconds: Option<i64>,
}

impl APIRequest for UpcomingRequest {
    fn ok(&self) -> bool {
        self.seconds
            .map_or(true, |s| (0..=MAX_UPCOMING_WINDOW_SECS).contains(&s))
    }
}

// [[API]]
// desp: Challenges whose release time falls within the next `seconds` (default 45)
// Method: GET
// URL: /challenges/upcoming-announcements
// Request Query: `UpcomingRequest`
// Response Body: `ChallengeListResponse`
#[get("/upcoming-announcements")]
async fn upcoming_announcements(
    _key: ApiKey,
    store: web::Data<dyn ChallengeStore>,
    query: web::Query<UpcomingRequest>,
) -> Result<impl Responder, APIError> {
    let location = "upcoming_announcements";
    query.sanity()?;

    let window = TimeDelta::seconds(query.seconds.unwrap_or(DEFAULT_UPCOMING_WINDOW_SECS));
    let challenges = release::upcoming_announcements(store.get_ref(), Utc::now(), window)
        .await
        .map_err(|e| e.set_location(location))?;

    debug!(
        "{} challenges release within the next {}s",
        challenges.len(),
        window.num_seconds()
    );

    Ok(HttpResponse::Ok().json(ChallengeListResponse {
        challenges: challenges.iter().map(AnnouncedChallenge::upcoming).collect(),
    }))
}

// [[API]]
// desp: Due challenges that have not been announced yet
// Method: GET
// URL: /challenges/pending-announcements
// Response Body: `ChallengeListResponse`
#[get("/pending-announcements")]
async fn pending_announcements(
    _key: ApiKey,
    store: web::Data<dyn ChallengeStore>,
) -> Result<impl Responder, APIError> {
    let location = "pending_announcements";

    let challenges = release::pending_announcements(store.get_ref(), Utc::now())
        .await
        .map_err(|e| e.set_location(location))?;

    info!("{} challenges pending announcement", challenges.len());

    Ok(HttpResponse::Ok().json(ChallengeListResponse {
        challenges: challenges.iter().map(AnnouncedChallenge::pending).collect(),
    }))
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    success: bool,
}

async fn transition(
    store: &dyn ChallengeStore,
    challenge_id: ChallengeId,
    transition: Transition,
    location: &'static str,
) -> Result<HttpResponse, APIError> {
    release::mark(store, challenge_id, transition, Utc::now())
        .await
        .map_err(|e| e.set_location(location))?;

    Ok(HttpResponse::Ok().json(SuccessResponse { success: true }))
}

// [[API]]
// desp: Mark a due challenge released; repeated calls succeed without change
// Method: POST
// URL: /challenges/{id}/mark-released
// Response Body: `SuccessResponse`
#[post("/{id}/mark-released")]
async fn mark_released(
    _key: ApiKey,
    store: web::Data<dyn ChallengeStore>,
    path: web::Path<ChallengeId>,
) -> Result<impl Responder, APIError> {
    transition(
        store.get_ref(),
        path.into_inner(),
        Transition::Release,
        "mark_released",
    )
    .await
}

// [[API]]
// desp: Mark a due challenge announced, releasing it first if needed
// Method: POST
// URL: /challenges/{id}/mark-announced
// Response Body: `SuccessResponse`
#[post("/{id}/mark-announced")]
async fn mark_announced(
    _key: ApiKey,
    store: web::Data<dyn ChallengeStore>,
    path: web::Path<ChallengeId>,
) -> Result<impl Responder, APIError> {
    transition(
        store.get_ref(),
        path.into_inner(),
        Transition::Announce,
        "mark_announced",
    )
    .await
}

#[derive(Debug, Serialize)]
struct CampaignDetail {
    #[serde(flatten)]
    brief: CampaignBrief,
    is_active: bool,
}

#[derive(Debug, Serialize)]
struct ChallengeDetail {
    id: ChallengeId,
    title: String,
    description: String,
    order_position: i32,
    is_released: bool,
    is_announced: bool,
    released_at: Option<DateTime<Utc>>,
    announced_at: Option<DateTime<Utc>>,
    release_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
    guild_id: String,
    announcement_channels: Vec<String>,
    campaign: CampaignDetail,
}

#[derive(Debug, Serialize)]
struct ChallengeDetailResponse {
    challenge: ChallengeDetail,
}

// [[API]]
// desp: A challenge with its campaign, release state and timestamps
// Method: GET
// URL: /challenges/{id}
// Response Body: `ChallengeDetailResponse`
#[get("/{id}")]
async fn get_challenge(
    _key: ApiKey,
    store: web::Data<dyn ChallengeStore>,
    path: web::Path<ChallengeId>,
) -> Result<impl Responder, APIError> {
    let location = "get_challenge";

    let ctx = store
        .challenge_context(path.into_inner())
        .await
        .map_err(|e| e.set_location(location))?
        .ok_or(APIError::ChallengeNotFound)?;

    let release_time = ctx.release_time();
    let ChallengeContext {
        challenge,
        campaign,
    } = ctx;
    let state: ReleaseState = challenge.state;

    Ok(HttpResponse::Ok().json(ChallengeDetailResponse {
        challenge: ChallengeDetail {
            id: challenge.id,
            title: challenge.title,
            description: challenge.description,
            order_position: challenge.order_position,
            is_released: state.is_released(),
            is_announced: state.is_announced(),
            released_at: state.released_at(),
            announced_at: state.announced_at(),
            release_time,
            created_at: challenge.created_at,
            guild_id: campaign.guild_id.clone(),
            announcement_channels: campaign.announcement_channels.clone(),
            campaign: CampaignDetail {
                brief: CampaignBrief::from(&campaign),
                is_active: campaign.is_active,
            },
        },
    }))
}
