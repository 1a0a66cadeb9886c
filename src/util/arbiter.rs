use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use crate::models::{ChallengeContext, ChallengeSubmission, Squad};
use crate::store::{ChallengeStore, SquadDirectory};

use super::api_util::APIError;
use super::cache::Cache;
use super::ledger::LedgerCredit;
use super::release;
use super::scoring;

/// Decides correctness and first-success ownership of submissions.
pub struct SubmissionArbiter {
    store: Arc<dyn ChallengeStore>,
    squads: Arc<dyn SquadDirectory>,
    cache: Arc<Cache>,
}

pub struct SubmissionRequest<'a> {
    pub user_id: &'a str,
    pub username: &'a str,
    pub solution: &'a str,
}

pub fn answers_match(expected: &str, submitted: &str) -> bool {
    expected.trim() == submitted.trim()
}

impl SubmissionArbiter {
    pub fn new(
        store: Arc<dyn ChallengeStore>,
        squads: Arc<dyn SquadDirectory>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            store,
            squads,
            cache,
        }
    }

    /// Records one attempt of `squad` on an available challenge. Every attempt
    /// is kept; only the first correct one per squad earns points.
    pub async fn submit(
        &self,
        ctx: &ChallengeContext,
        squad: &Squad,
        request: SubmissionRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<ChallengeSubmission, APIError> {
        let challenge = &ctx.challenge;

        let input = self
            .store
            .find_input(challenge.id, squad.id)
            .await?
            .ok_or(APIError::InputNotGenerated)?;

        let is_correct = answers_match(&input.result_data, request.solution);

        let mut submission = ChallengeSubmission {
            id: Uuid::new_v4(),
            challenge_id: challenge.id,
            squad_id: squad.id,
            user_id: request.user_id.to_string(),
            username: request.username.to_string(),
            submitted_solution: request.solution.to_string(),
            is_correct,
            is_first_success: false,
            points_earned: None,
            submitted_at: now,
        };
        let mut credits = Vec::new();

        if is_correct && !self.store.first_success_exists(challenge.id, squad.id).await? {
            let challenge_count = self.store.challenge_count(ctx.campaign.id).await?;
            let end = release::campaign_end(&ctx.campaign, challenge_count);
            let points = scoring::calculate_points(input.created_at, now, end);
            debug!(
                "Squad {} solved challenge {} worth {points} (input from {}, ends {end})",
                squad.id, challenge.id, input.created_at
            );

            submission.is_first_success = true;
            submission.points_earned = Some(points);

            if points > 0 {
                credits = self
                    .squads
                    .squad_members(squad.id)
                    .await?
                    .into_iter()
                    .map(|member| {
                        let username = if member.user_id == request.user_id {
                            request.username
                        } else {
                            &member.user_id
                        };
                        LedgerCredit::challenge_reward(
                            &ctx.campaign.guild_id,
                            &member.user_id,
                            username,
                            points,
                            &challenge.title,
                        )
                    })
                    .collect();
            }
        }

        let claimed = submission.is_first_success;
        let recorded = self.store.record_submission(submission, &credits).await?;

        if recorded.is_first_success {
            info!(
                "Squad {} earned {} points on challenge {}, credited {} members",
                squad.id,
                recorded.points_earned.unwrap_or(0),
                challenge.id,
                credits.len()
            );
            self.cache.invalidate_standings(ctx.campaign.id).await;
        } else if claimed {
            info!(
                "Squad {} already holds challenge {}, submission {} recorded without points",
                squad.id, challenge.id, recorded.id
            );
        } else {
            debug!(
                "Recorded submission {} (correct: {}) for squad {}",
                recorded.id, recorded.is_correct, squad.id
            );
        }

        Ok(recorded)
    }
}
