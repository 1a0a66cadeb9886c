use std::sync::Arc;

use actix_web::{get, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::models::{Campaign, CampaignId};
use crate::store::ChallengeStore;
use crate::util::api_util::*;
use crate::util::auth::ApiKey;
use crate::util::cache::Cache;
use crate::util::scoreboard::{self as standings, DetailedScoreboard, SquadStanding, StandingsSnapshot};

use super::{bounded, GUILD_ID_MAX_CHARS};

#[derive(Debug, Deserialize)]
struct GuildQuery {
    guild_id: String,
}

impl APIRequest for GuildQuery {
    fn ok(&self) -> bool {
        bounded(&self.guild_id, GUILD_ID_MAX_CHARS)
    }
}

#[derive(Debug, Serialize)]
struct CampaignSummary {
    id: CampaignId,
    name: String,
    start_date: String,
    start_time: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    is_active: bool,
    guild_id: String,
    release_cadence_hours: i32,
    num_challenges: i64,
}

impl CampaignSummary {
    fn new(snapshot: &StandingsSnapshot) -> Self {
        let campaign = &snapshot.campaign;
        Self {
            id: campaign.id,
            name: campaign.title.clone(),
            start_date: campaign.start_time.format("%B %d, %Y").to_string(),
            start_time: campaign.start_time,
            end_date: None,
            is_active: campaign.is_active,
            guild_id: campaign.guild_id.clone(),
            release_cadence_hours: campaign.release_cadence_hours,
            num_challenges: snapshot.total_challenges,
        }
    }
}

#[derive(Debug, Serialize)]
struct ScoreboardResponse {
    campaign: Option<CampaignSummary>,
    scoreboard: Vec<SquadStanding>,
    total_submissions: i64,
    total_challenges: i64,
}

#[derive(Debug, Serialize)]
struct DetailedScoreboardResponse {
    campaign: Option<CampaignSummary>,
    detailed_scoreboard: DetailedScoreboard,
    total_submissions: i64,
    total_challenges: i64,
}

async fn current_standings(
    store: &dyn ChallengeStore,
    cache: &Cache,
    guild_id: &str,
    location: &'static str,
) -> Result<Option<Arc<StandingsSnapshot>>, APIError> {
    let Some(campaign) = store
        .current_campaign(guild_id, Utc::now())
        .await
        .map_err(|e| e.set_location(location))?
    else {
        return Ok(None);
    };

    cache
        .get_standings(campaign)
        .await
        .map(Some)
        .map_err(|e| e.set_location(location))
}

// [[API]]
// desp: Squad ranking of the guild's current campaign
// Method: GET
// URL: /challenges/scoreboard
// Request Query: `GuildQuery`
// Response Body: `ScoreboardResponse`
#[get("/scoreboard")]
async fn scoreboard(
    _key: ApiKey,
    store: web::Data<dyn ChallengeStore>,
    cache: web::Data<Cache>,
    query: web::Query<GuildQuery>,
) -> Result<impl Responder, APIError> {
    let location = "scoreboard";
    query.sanity()?;

    let response = match current_standings(store.get_ref(), &cache, &query.guild_id, location).await? {
        Some(snapshot) => {
            let ranking = standings::campaign_scoreboard(&snapshot.rows);
            info!(
                "Scoreboard of campaign {} has {} squads",
                snapshot.campaign.id,
                ranking.len()
            );
            ScoreboardResponse {
                campaign: Some(CampaignSummary::new(&snapshot)),
                scoreboard: ranking,
                total_submissions: snapshot.total_submissions,
                total_challenges: snapshot.total_challenges,
            }
        }
        None => ScoreboardResponse {
            campaign: None,
            scoreboard: Vec::new(),
            total_submissions: 0,
            total_challenges: 0,
        },
    };

    Ok(HttpResponse::Ok().json(response))
}

// [[API]]
// desp: Per-challenge winners and per-squad totals of the guild's current campaign
// Method: GET
// URL: /challenges/detailed-scoreboard
// Request Query: `GuildQuery`
// Response Body: `DetailedScoreboardResponse`
#[get("/detailed-scoreboard")]
async fn detailed_scoreboard(
    _key: ApiKey,
    store: web::Data<dyn ChallengeStore>,
    cache: web::Data<Cache>,
    query: web::Query<GuildQuery>,
) -> Result<impl Responder, APIError> {
    let location = "detailed_scoreboard";
    query.sanity()?;

    let response = match current_standings(store.get_ref(), &cache, &query.guild_id, location).await? {
        Some(snapshot) => DetailedScoreboardResponse {
            campaign: Some(CampaignSummary::new(&snapshot)),
            detailed_scoreboard: standings::detailed_scoreboard(&snapshot.rows),
            total_submissions: snapshot.total_submissions,
            total_challenges: snapshot.total_challenges,
        },
        None => DetailedScoreboardResponse {
            campaign: None,
            detailed_scoreboard: DetailedScoreboard::default(),
            total_submissions: 0,
            total_challenges: 0,
        },
    };

    Ok(HttpResponse::Ok().json(response))
}

#[derive(Debug, Serialize)]
struct UpcomingCampaign {
    id: CampaignId,
    name: String,
    start_date: String,
    start_time: DateTime<Utc>,
    description: String,
    guild_id: String,
}

impl From<Campaign> for UpcomingCampaign {
    fn from(campaign: Campaign) -> Self {
        Self {
            id: campaign.id,
            start_date: campaign
                .start_time
                .format("%B %d, %Y at %I:%M %p UTC")
                .to_string(),
            start_time: campaign.start_time,
            name: campaign.title,
            description: campaign.description,
            guild_id: campaign.guild_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct UpcomingCampaignResponse {
    campaign: Option<UpcomingCampaign>,
}

// [[API]]
// desp: The guild's next campaign that has not started yet, if any
// Method: GET
// URL: /challenges/upcoming-campaign
// Request Query: `GuildQuery`
// Response Body: `UpcomingCampaignResponse`
#[get("/upcoming-campaign")]
async fn upcoming_campaign(
    _key: ApiKey,
    store: web::Data<dyn ChallengeStore>,
    query: web::Query<GuildQuery>,
) -> Result<impl Responder, APIError> {
    let location = "upcoming_campaign";
    query.sanity()?;

    let campaign = store
        .upcoming_campaign(&query.guild_id, Utc::now())
        .await
        .map_err(|e| e.set_location(location))?;

    Ok(HttpResponse::Ok().json(UpcomingCampaignResponse {
        campaign: campaign.map(UpcomingCampaign::from),
    }))
}
