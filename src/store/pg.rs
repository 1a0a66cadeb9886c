use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::result::Error;
use diesel::sql_types::{BigInt, Bool, Int4, Nullable, Text, Timestamptz, Uuid as SqlUuid, Varchar};
use diesel_async::pooled_connection::bb8::PooledConnection;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use log::info;

use crate::models::*;
use crate::util::api_util::{log_server_error, APIError, ERROR_DB_CONNECTION, ERROR_DB_UNKNOWN};
use crate::util::ledger::{self, LedgerCredit};
use crate::{DbPool, Ext};

use super::{ChallengeStore, InputFuture, SquadDirectory, StandingsRows};

/// Takes the first-success slot of (challenge, squad) unless it is held.
const CLAIM_FIRST_SUCCESS: &str = r#"
    INSERT INTO challenge_submissions
        (id, challenge_id, squad_id, user_id, username, submitted_solution,
         is_correct, is_first_success, points_earned, submitted_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $9)
    ON CONFLICT (challenge_id, squad_id) WHERE is_first_success DO NOTHING
"#;

const LOCK_INPUT_KEY: &str = "SELECT pg_advisory_xact_lock($1)";

/// Advisory lock key of one (challenge, squad) input. Colliding keys only
/// serialise unrelated generations.
fn input_lock_key(challenge: ChallengeId, squad: SquadId) -> i64 {
    let (challenge_hi, challenge_lo) = challenge.as_u64_pair();
    let (squad_hi, squad_lo) = squad.as_u64_pair();
    (challenge_hi ^ challenge_lo ^ squad_hi.rotate_left(32) ^ squad_lo.rotate_left(16)) as i64
}

pub struct PgStore {
    pool: Arc<DbPool>,
}

impl PgStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    async fn connection(
        &self,
        location: &'static str,
    ) -> Result<PooledConnection<'_, AsyncPgConnection>, APIError> {
        self.pool
            .get()
            .await
            .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))
    }
}

fn into_contexts(rows: Vec<(ChallengeRow, Campaign)>) -> Result<Vec<ChallengeContext>, APIError> {
    rows.into_iter()
        .map(|(row, campaign)| {
            Ok(ChallengeContext {
                challenge: row.try_into()?,
                campaign,
            })
        })
        .collect()
}

#[async_trait]
impl ChallengeStore for PgStore {
    async fn challenge_context(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<Option<ChallengeContext>, APIError> {
        use crate::schema::{campaigns, challenges};
        let location = "challenge_context";
        let mut conn = self.connection(location).await?;

        match challenges::table
            .inner_join(campaigns::table)
            .filter(challenges::id.eq(challenge_id))
            .select((ChallengeRow::as_select(), Campaign::as_select()))
            .first::<(ChallengeRow, Campaign)>(&mut conn)
            .await
        {
            Ok(row) => Ok(into_contexts(vec![row])?.pop()),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(log_server_error(e, location, ERROR_DB_UNKNOWN)),
        }
    }

    async fn announcement_candidates(&self) -> Result<Vec<ChallengeContext>, APIError> {
        use crate::schema::{campaigns, challenges};
        let location = "announcement_candidates";
        let mut conn = self.connection(location).await?;

        let rows = challenges::table
            .inner_join(campaigns::table)
            .filter(campaigns::is_active.eq(true))
            .filter(challenges::release_state.lt(ReleaseState::ANNOUNCED))
            .order((campaigns::start_time, challenges::order_position))
            .select((ChallengeRow::as_select(), Campaign::as_select()))
            .load::<(ChallengeRow, Campaign)>(&mut conn)
            .await
            .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))?;

        into_contexts(rows)
    }

    async fn update_release_state(
        &self,
        challenge_id: ChallengeId,
        expected: i16,
        next: ReleaseState,
    ) -> Result<bool, APIError> {
        use crate::schema::challenges::dsl::*;
        let location = "update_release_state";
        let mut conn = self.connection(location).await?;

        let updated = diesel::update(
            challenges
                .filter(id.eq(challenge_id))
                .filter(release_state.eq(expected)),
        )
        .set((
            release_state.eq(next.code()),
            released_at.eq(next.released_at()),
            announced_at.eq(next.announced_at()),
            updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))?;

        Ok(updated == 1)
    }

    async fn current_campaign(
        &self,
        guild: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>, APIError> {
        use crate::schema::campaigns::dsl::*;
        let location = "current_campaign";
        let mut conn = self.connection(location).await?;

        // Active campaigns first, then whichever started most recently.
        campaigns
            .filter(guild_id.eq(guild))
            .filter(start_time.le(now))
            .order((is_active.desc(), start_time.desc(), created_at.desc()))
            .select(Campaign::as_select())
            .first::<Campaign>(&mut conn)
            .await
            .optional()
            .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))
    }

    async fn upcoming_campaign(
        &self,
        guild: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>, APIError> {
        use crate::schema::campaigns::dsl::*;
        let location = "upcoming_campaign";
        let mut conn = self.connection(location).await?;

        campaigns
            .filter(guild_id.eq(guild))
            .filter(is_active.eq(true))
            .filter(start_time.gt(now))
            .order(start_time.asc())
            .select(Campaign::as_select())
            .first::<Campaign>(&mut conn)
            .await
            .optional()
            .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))
    }

    async fn challenge_count(&self, campaign: CampaignId) -> Result<i64, APIError> {
        use crate::schema::challenges::dsl::*;
        let location = "challenge_count";
        let mut conn = self.connection(location).await?;

        challenges
            .filter(campaign_id.eq(campaign))
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))
    }

    async fn find_input(
        &self,
        challenge: ChallengeId,
        squad: SquadId,
    ) -> Result<Option<ChallengeInput>, APIError> {
        use crate::schema::challenge_inputs::dsl::*;
        let location = "find_input";
        let mut conn = self.connection(location).await?;

        match challenge_inputs
            .find((challenge, squad))
            .select(ChallengeInput::as_select())
            .first::<ChallengeInput>(&mut conn)
            .await
        {
            Ok(input) => Ok(Some(input)),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(log_server_error(e, location, ERROR_DB_UNKNOWN)),
        }
    }

    async fn freeze_input<'a>(
        &self,
        challenge: ChallengeId,
        squad: SquadId,
        generate: InputFuture<'a>,
    ) -> Result<ChallengeInput, APIError> {
        use crate::schema::challenge_inputs::dsl::*;
        let location = "freeze_input";
        let mut conn = self.connection(location).await?;

        // The transaction holds the key's advisory lock while the generator
        // runs, so only one process generates.
        conn.transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                diesel::sql_query(LOCK_INPUT_KEY)
                    .bind::<BigInt, _>(input_lock_key(challenge, squad))
                    .execute(conn)
                    .await?;

                if let Some(existing) = challenge_inputs
                    .find((challenge, squad))
                    .select(ChallengeInput::as_select())
                    .first::<ChallengeInput>(conn)
                    .await
                    .optional()?
                {
                    return Ok(existing);
                }

                let generated = generate.await?;
                let input = ChallengeInput {
                    challenge_id: challenge,
                    squad_id: squad,
                    input_data: generated.input,
                    result_data: generated.result,
                    created_at: Utc::now(),
                };

                let inserted = diesel::insert_into(challenge_inputs)
                    .values(&input)
                    .on_conflict((challenge_id, squad_id))
                    .do_nothing()
                    .execute(conn)
                    .await?;
                if inserted == 1 {
                    return Ok(input);
                }

                info!(
                    "Input for challenge {challenge}, squad {squad} was frozen concurrently; keeping the stored one"
                );
                Ok(challenge_inputs
                    .find((challenge, squad))
                    .select(ChallengeInput::as_select())
                    .first::<ChallengeInput>(conn)
                    .await?)
            })
        })
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))
    }

    async fn first_success_exists(
        &self,
        challenge: ChallengeId,
        squad: SquadId,
    ) -> Result<bool, APIError> {
        use crate::schema::challenge_submissions::dsl::*;
        let location = "first_success_exists";
        let mut conn = self.connection(location).await?;

        diesel::select(exists(
            challenge_submissions
                .filter(challenge_id.eq(challenge))
                .filter(squad_id.eq(squad))
                .filter(is_first_success.eq(true)),
        ))
        .get_result::<bool>(&mut conn)
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))
    }

    async fn record_submission(
        &self,
        submission: ChallengeSubmission,
        credits: &[LedgerCredit],
    ) -> Result<ChallengeSubmission, APIError> {
        use crate::schema::challenge_submissions::dsl::*;
        let location = "record_submission";
        let mut conn = self.connection(location).await?;
        let credits = credits.to_vec();

        conn.transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                if !submission.is_first_success {
                    diesel::insert_into(challenge_submissions)
                        .values(&submission)
                        .execute(conn)
                        .await?;
                    return Ok(submission);
                }

                let claimed = diesel::sql_query(CLAIM_FIRST_SUCCESS)
                    .bind::<SqlUuid, _>(submission.id)
                    .bind::<SqlUuid, _>(submission.challenge_id)
                    .bind::<SqlUuid, _>(submission.squad_id)
                    .bind::<Varchar, _>(&submission.user_id)
                    .bind::<Varchar, _>(&submission.username)
                    .bind::<Text, _>(&submission.submitted_solution)
                    .bind::<Bool, _>(submission.is_correct)
                    .bind::<Nullable<Int4>, _>(submission.points_earned)
                    .bind::<Timestamptz, _>(submission.submitted_at)
                    .execute(conn)
                    .await?;

                if claimed == 0 {
                    let demoted = submission.demote();
                    diesel::insert_into(challenge_submissions)
                        .values(&demoted)
                        .execute(conn)
                        .await?;
                    return Ok(demoted);
                }

                for credit in credits.iter().filter(|c| c.amount > 0) {
                    ledger::credit_user(credit, conn).await?;
                }
                Ok(submission)
            })
        })
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))
    }

    async fn standings(&self, campaign: CampaignId) -> Result<StandingsRows, APIError> {
        use crate::schema::{challenge_submissions, challenges, squads};
        let location = "standings";
        let mut conn = self.connection(location).await?;

        conn.build_transaction()
            .read_only()
            .repeatable_read()
            .run::<_, APIError, _>(|conn| {
                Box::pin(async move {
                    let rows = challenge_submissions::table
                        .inner_join(challenges::table)
                        .inner_join(squads::table)
                        .filter(challenges::campaign_id.eq(campaign))
                        .filter(challenge_submissions::is_first_success.eq(true))
                        .select((
                            challenges::id,
                            challenges::title,
                            squads::id,
                            squads::name,
                            challenge_submissions::points_earned,
                        ))
                        .load::<ScoreRow>(conn)
                        .await?;

                    let total_submissions = challenge_submissions::table
                        .inner_join(challenges::table)
                        .filter(challenges::campaign_id.eq(campaign))
                        .count()
                        .get_result::<i64>(conn)
                        .await?;

                    Ok(StandingsRows {
                        rows,
                        total_submissions,
                    })
                })
            })
            .await
            .map_err(|e| e.set_location(location).tap(APIError::log))
    }
}

#[async_trait]
impl SquadDirectory for PgStore {
    async fn user_squad(&self, guild: &str, user: &str) -> Result<Option<Squad>, APIError> {
        use crate::schema::{squad_memberships, squads};
        let location = "user_squad";
        let mut conn = self.connection(location).await?;

        squad_memberships::table
            .inner_join(squads::table)
            .filter(squad_memberships::user_id.eq(user))
            .filter(squads::guild_id.eq(guild))
            .filter(squads::is_active.eq(true))
            .select(Squad::as_select())
            .first::<Squad>(&mut conn)
            .await
            .optional()
            .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))
    }

    async fn squad_members(&self, squad: SquadId) -> Result<Vec<SquadMember>, APIError> {
        use crate::schema::squad_memberships::dsl::*;
        let location = "squad_members";
        let mut conn = self.connection(location).await?;

        let members = squad_memberships
            .filter(squad_id.eq(squad))
            .order(joined_at.asc())
            .select(user_id)
            .load::<String>(&mut conn)
            .await
            .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))?;

        Ok(members
            .into_iter()
            .map(|member| SquadMember { user_id: member })
            .collect())
    }
}
