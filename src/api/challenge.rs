use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::models::{ChallengeContext, ChallengeId, Squad, SquadId};
use crate::store::{ChallengeStore, SquadDirectory};
use crate::util::api_util::*;
use crate::util::arbiter::{SubmissionArbiter, SubmissionRequest};
use crate::util::auth::ApiKey;
use crate::util::generator::InputGenerator;
use crate::util::release;

use super::{bounded, ChallengeBrief, GUILD_ID_MAX_CHARS, USERNAME_MAX_CHARS, USER_ID_MAX_CHARS};

const MAX_SOLUTION_BYTES: usize = 10_000;

#[derive(Debug, Deserialize)]
struct ParticipantQuery {
    guild_id: String,
    user_id: String,
}

impl APIRequest for ParticipantQuery {
    fn ok(&self) -> bool {
        bounded(&self.guild_id, GUILD_ID_MAX_CHARS) && bounded(&self.user_id, USER_ID_MAX_CHARS)
    }
}

async fn find_squad(
    squads: &dyn SquadDirectory,
    guild_id: &str,
    user_id: &str,
    location: &'static str,
) -> Result<Squad, APIError> {
    squads
        .user_squad(guild_id, user_id)
        .await
        .map_err(|e| e.set_location(location))?
        .ok_or(APIError::NotInSquad)
}

async fn find_challenge(
    store: &dyn ChallengeStore,
    challenge_id: ChallengeId,
    location: &'static str,
) -> Result<ChallengeContext, APIError> {
    store
        .challenge_context(challenge_id)
        .await
        .map_err(|e| e.set_location(location))?
        .ok_or(APIError::ChallengeNotFound)
}

#[derive(Debug, Serialize)]
struct InputExistsResponse {
    exists: bool,
}

// [[API]]
// desp: Whether the user's squad already has an input, never generating one
// Method: GET
// URL: /challenges/{id}/input-exists
// Request Query: `ParticipantQuery`
// Response Body: `InputExistsResponse`
#[get("/{id}/input-exists")]
async fn input_exists(
    _key: ApiKey,
    store: web::Data<dyn ChallengeStore>,
    squads: web::Data<dyn SquadDirectory>,
    generator: web::Data<InputGenerator>,
    path: web::Path<ChallengeId>,
    query: web::Query<ParticipantQuery>,
) -> Result<impl Responder, APIError> {
    let location = "input_exists";
    query.sanity()?;

    let squad = find_squad(squads.get_ref(), &query.guild_id, &query.user_id, location).await?;
    let ctx = find_challenge(store.get_ref(), path.into_inner(), location).await?;
    if ctx.campaign.guild_id != query.guild_id {
        return Err(APIError::GuildMismatch);
    }

    let exists = generator
        .input_exists(ctx.challenge.id, squad.id)
        .await
        .map_err(|e| e.set_location(location))?;

    Ok(HttpResponse::Ok().json(InputExistsResponse { exists }))
}

#[derive(Debug, Serialize)]
struct ChallengeSummary {
    id: ChallengeId,
    title: String,
    description: String,
    order_position: i32,
}

#[derive(Debug, Serialize)]
struct SquadBrief {
    id: SquadId,
    name: String,
}

impl From<&Squad> for SquadBrief {
    fn from(squad: &Squad) -> Self {
        Self {
            id: squad.id,
            name: squad.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct InputMetadata {
    has_existing_input: bool,
    generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct InputResponse {
    input_data: String,
    challenge: ChallengeSummary,
    squad: SquadBrief,
    metadata: InputMetadata,
}

// [[API]]
// desp: The squad's input for a released challenge, generated on first request
// Method: GET
// URL: /challenges/{id}/input
// Request Query: `ParticipantQuery`
// Response Body: `InputResponse`
#[get("/{id}/input")]
async fn get_input(
    _key: ApiKey,
    store: web::Data<dyn ChallengeStore>,
    squads: web::Data<dyn SquadDirectory>,
    generator: web::Data<InputGenerator>,
    path: web::Path<ChallengeId>,
    query: web::Query<ParticipantQuery>,
) -> Result<impl Responder, APIError> {
    let location = "get_input";
    query.sanity()?;

    let squad = find_squad(squads.get_ref(), &query.guild_id, &query.user_id, location).await?;
    let ctx = find_challenge(store.get_ref(), path.into_inner(), location).await?;
    let ctx = release::ensure_available(store.get_ref(), ctx, &query.guild_id, Utc::now())
        .await
        .map_err(|e| e.set_location(location))?;

    let challenge = ctx.challenge;
    let script = match challenge.input_generator_script.as_deref() {
        Some(script) if !script.trim().is_empty() => script,
        _ => {
            warn!("Challenge {} has no input generator script", challenge.id);
            return Err(APIError::NoInputGenerator);
        }
    };

    let input = generator
        .get_or_create_input(challenge.id, squad.id, script)
        .await
        .map_err(|e| e.set_location(location))?;

    info!(
        "Served input of challenge {} to user {} in squad {}",
        challenge.id, query.user_id, squad.id
    );

    Ok(HttpResponse::Ok().json(InputResponse {
        input_data: input.input_data.clone(),
        challenge: ChallengeSummary {
            id: challenge.id,
            title: challenge.title,
            description: challenge.description,
            order_position: challenge.order_position,
        },
        squad: SquadBrief::from(&squad),
        metadata: InputMetadata {
            has_existing_input: true,
            generated_at: input.created_at,
        },
    }))
}

#[derive(Debug, Deserialize)]
struct SubmitSolutionRequest {
    guild_id: String,
    user_id: String,
    username: String,
    submitted_solution: String,
}

impl APIRequest for SubmitSolutionRequest {
    fn ok(&self) -> bool {
        bounded(&self.guild_id, GUILD_ID_MAX_CHARS)
            && bounded(&self.user_id, USER_ID_MAX_CHARS)
            && bounded(&self.username, USERNAME_MAX_CHARS)
            && !self.submitted_solution.trim().is_empty()
            && self.submitted_solution.len() <= MAX_SOLUTION_BYTES
    }
}

#[derive(Debug, Serialize)]
struct SubmitSolutionResponse {
    is_correct: bool,
    is_first_success: bool,
    points_earned: Option<i32>,
    challenge: ChallengeBrief,
    squad: SquadBrief,
    submitted_at: DateTime<Utc>,
}

// [[API]]
// desp: Check a solution against the squad's frozen result and record the attempt
// Method: POST
// URL: /challenges/{id}/submit-solution
// Request Body: `SubmitSolutionRequest`
// Response Body: `SubmitSolutionResponse`
#[post("/{id}/submit-solution")]
async fn submit_solution(
    _key: ApiKey,
    store: web::Data<dyn ChallengeStore>,
    squads: web::Data<dyn SquadDirectory>,
    arbiter: web::Data<SubmissionArbiter>,
    path: web::Path<ChallengeId>,
    form: web::Json<SubmitSolutionRequest>,
) -> Result<impl Responder, APIError> {
    let location = "submit_solution";
    form.sanity()?;

    let squad = find_squad(squads.get_ref(), &form.guild_id, &form.user_id, location).await?;
    let ctx = find_challenge(store.get_ref(), path.into_inner(), location).await?;
    let now = Utc::now();
    let ctx = release::ensure_available(store.get_ref(), ctx, &form.guild_id, now)
        .await
        .map_err(|e| e.set_location(location))?;

    let submission = arbiter
        .submit(
            &ctx,
            &squad,
            SubmissionRequest {
                user_id: &form.user_id,
                username: &form.username,
                solution: &form.submitted_solution,
            },
            now,
        )
        .await
        .map_err(|e| e.set_location(location))?;

    info!(
        "Submission on challenge {} by user {} in squad {}: correct={}, first_success={}, points={:?}",
        ctx.challenge.id,
        form.user_id,
        squad.id,
        submission.is_correct,
        submission.is_first_success,
        submission.points_earned
    );

    Ok(HttpResponse::Ok().json(SubmitSolutionResponse {
        is_correct: submission.is_correct,
        is_first_success: submission.is_first_success,
        points_earned: submission.points_earned,
        challenge: ChallengeBrief::from(&ctx.challenge),
        squad: SquadBrief::from(&squad),
        submitted_at: submission.submitted_at,
    }))
}
