//! In-process store for local development and tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::derive::Display;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::*;
use crate::util::api_util::APIError;
use crate::util::ledger::LedgerCredit;
use crate::util::release::CADENCE_HOURS;

use super::{ChallengeStore, InputFuture, SquadDirectory, StandingsRows};

#[derive(Default)]
struct MemoryState {
    campaigns: HashMap<CampaignId, Campaign>,
    challenges: HashMap<ChallengeId, Challenge>,
    inputs: HashMap<(ChallengeId, SquadId), ChallengeInput>,
    submissions: Vec<ChallengeSubmission>,
    squads: HashMap<SquadId, Squad>,
    memberships: Vec<(SquadId, String)>,
    balances: HashMap<(String, String), i64>,
    credits: Vec<LedgerCredit>,
}

impl MemoryState {
    fn context(&self, challenge_id: ChallengeId) -> Option<ChallengeContext> {
        let challenge = self.challenges.get(&challenge_id)?;
        let campaign = self.campaigns.get(&challenge.campaign_id)?;
        Some(ChallengeContext {
            challenge: challenge.clone(),
            campaign: campaign.clone(),
        })
    }

    fn first_success_taken(&self, challenge_id: ChallengeId, squad_id: SquadId) -> bool {
        self.submissions.iter().any(|s| {
            s.challenge_id == challenge_id && s.squad_id == squad_id && s.is_first_success
        })
    }

    fn campaign_challenges(&self, campaign_id: CampaignId) -> impl Iterator<Item = &Challenge> {
        self.challenges
            .values()
            .filter(move |c| c.campaign_id == campaign_id)
    }
}

/// Every operation runs under one lock, so each is atomic with respect to
/// the others.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    // Held across a generator run, which the state lock cannot be.
    generating: tokio::sync::Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_campaign(&self, campaign: Campaign) -> CampaignId {
        let id = campaign.id;
        self.state().campaigns.insert(id, campaign);
        id
    }

    pub fn add_challenge(&self, challenge: Challenge) -> ChallengeId {
        let id = challenge.id;
        self.state().challenges.insert(id, challenge);
        id
    }

    pub fn add_squad(&self, guild_id: &str, name: &str) -> SquadId {
        let squad = Squad {
            id: Uuid::new_v4(),
            guild_id: guild_id.to_string(),
            name: name.to_string(),
        };
        let id = squad.id;
        self.state().squads.insert(id, squad);
        id
    }

    pub fn add_member(&self, squad_id: SquadId, user_id: &str) {
        self.state()
            .memberships
            .push((squad_id, user_id.to_string()));
    }

    pub fn add_input(&self, input: ChallengeInput) {
        self.state()
            .inputs
            .insert((input.challenge_id, input.squad_id), input);
    }

    pub fn challenge(&self, challenge_id: ChallengeId) -> Option<Challenge> {
        self.state().challenges.get(&challenge_id).cloned()
    }

    pub fn submissions(&self) -> Vec<ChallengeSubmission> {
        self.state().submissions.clone()
    }

    pub fn credits(&self) -> Vec<LedgerCredit> {
        self.state().credits.clone()
    }

    pub fn balance(&self, guild_id: &str, user_id: &str) -> i64 {
        self.state()
            .balances
            .get(&(guild_id.to_string(), user_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Builds a store from a JSON description of campaigns and squads.
    pub fn from_seed(json: &str) -> Result<Self, SeedError> {
        let seed: Seed = serde_json::from_str(json).map_err(SeedError::Json)?;
        if let Some(bad) = seed
            .campaigns
            .iter()
            .find(|c| !CADENCE_HOURS.contains(&c.release_cadence_hours))
        {
            return Err(SeedError::Cadence {
                title: bad.title.clone(),
                hours: bad.release_cadence_hours,
            });
        }

        let store = Self::new();
        for entry in seed.campaigns {
            let mut campaign = Campaign::new(
                entry.guild_id,
                entry.title,
                entry.start_time,
                entry.release_cadence_hours,
                "seed",
            );
            campaign.description = entry.description;
            campaign.announcement_channels = entry.announcement_channels;
            campaign.is_active = entry.is_active;
            let campaign_id = store.add_campaign(campaign);

            for (position, challenge) in (1..).zip(entry.challenges) {
                let mut row = Challenge::new(
                    campaign_id,
                    challenge.title,
                    position,
                    challenge.input_generator_script,
                );
                row.description = challenge.description;
                store.add_challenge(row);
            }
        }

        for squad in seed.squads {
            let squad_id = store.add_squad(&squad.guild_id, &squad.name);
            for member in squad.members {
                store.add_member(squad_id, &member);
            }
        }

        Ok(store)
    }
}

#[derive(Debug, Display)]
pub enum SeedError {
    #[display("{_0}")]
    Json(serde_json::Error),

    #[display("campaign {title:?} has release_cadence_hours {hours}, expected 1 to 168")]
    Cadence { title: String, hours: i32 },
}

impl std::error::Error for SeedError {}

#[derive(Deserialize)]
struct Seed {
    #[serde(default)]
    campaigns: Vec<SeedCampaign>,
    #[serde(default)]
    squads: Vec<SeedSquad>,
}

#[derive(Deserialize)]
struct SeedCampaign {
    guild_id: String,
    title: String,
    #[serde(default)]
    description: String,
    start_time: DateTime<Utc>,
    release_cadence_hours: i32,
    #[serde(default)]
    announcement_channels: Vec<String>,
    #[serde(default = "active")]
    is_active: bool,
    #[serde(default)]
    challenges: Vec<SeedChallenge>,
}

fn active() -> bool {
    true
}

#[derive(Deserialize)]
struct SeedChallenge {
    title: String,
    #[serde(default)]
    description: String,
    input_generator_script: Option<String>,
}

#[derive(Deserialize)]
struct SeedSquad {
    guild_id: String,
    name: String,
    #[serde(default)]
    members: Vec<String>,
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn challenge_context(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<Option<ChallengeContext>, APIError> {
        Ok(self.state().context(challenge_id))
    }

    async fn announcement_candidates(&self) -> Result<Vec<ChallengeContext>, APIError> {
        let state = self.state();
        Ok(state
            .challenges
            .values()
            .filter(|c| !c.state.is_announced())
            .filter_map(|c| state.context(c.id))
            .filter(|ctx| ctx.campaign.is_active)
            .collect())
    }

    async fn update_release_state(
        &self,
        challenge_id: ChallengeId,
        expected: i16,
        next: ReleaseState,
    ) -> Result<bool, APIError> {
        let mut state = self.state();
        match state.challenges.get_mut(&challenge_id) {
            Some(challenge) if challenge.state.code() == expected => {
                challenge.state = next;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(APIError::ChallengeNotFound),
        }
    }

    async fn current_campaign(
        &self,
        guild_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>, APIError> {
        let state = self.state();
        let started = || {
            state
                .campaigns
                .values()
                .filter(move |c| c.guild_id == guild_id && c.start_time <= now)
        };
        let latest = |c: &&Campaign| (c.start_time, c.created_at);

        Ok(started()
            .filter(|c| c.is_active)
            .max_by_key(latest)
            .or_else(|| started().max_by_key(latest))
            .cloned())
    }

    async fn upcoming_campaign(
        &self,
        guild_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>, APIError> {
        Ok(self
            .state()
            .campaigns
            .values()
            .filter(|c| c.guild_id == guild_id && c.is_active && c.start_time > now)
            .min_by_key(|c| c.start_time)
            .cloned())
    }

    async fn challenge_count(&self, campaign_id: CampaignId) -> Result<i64, APIError> {
        Ok(self.state().campaign_challenges(campaign_id).count() as i64)
    }

    async fn find_input(
        &self,
        challenge_id: ChallengeId,
        squad_id: SquadId,
    ) -> Result<Option<ChallengeInput>, APIError> {
        Ok(self.state().inputs.get(&(challenge_id, squad_id)).cloned())
    }

    async fn freeze_input<'a>(
        &self,
        challenge_id: ChallengeId,
        squad_id: SquadId,
        generate: InputFuture<'a>,
    ) -> Result<ChallengeInput, APIError> {
        let _generating = self.generating.lock().await;
        let key = (challenge_id, squad_id);
        if let Some(existing) = self.state().inputs.get(&key).cloned() {
            return Ok(existing);
        }

        let generated = generate.await?;
        Ok(self
            .state()
            .inputs
            .entry(key)
            .or_insert(ChallengeInput {
                challenge_id,
                squad_id,
                input_data: generated.input,
                result_data: generated.result,
                created_at: Utc::now(),
            })
            .clone())
    }

    async fn first_success_exists(
        &self,
        challenge_id: ChallengeId,
        squad_id: SquadId,
    ) -> Result<bool, APIError> {
        Ok(self.state().first_success_taken(challenge_id, squad_id))
    }

    async fn record_submission(
        &self,
        submission: ChallengeSubmission,
        credits: &[LedgerCredit],
    ) -> Result<ChallengeSubmission, APIError> {
        let mut state = self.state();

        let won = submission.is_first_success
            && !state.first_success_taken(submission.challenge_id, submission.squad_id);
        let submission = if submission.is_first_success && !won {
            submission.demote()
        } else {
            submission
        };

        if won {
            for credit in credits.iter().filter(|c| c.amount > 0) {
                *state
                    .balances
                    .entry((credit.guild_id.clone(), credit.user_id.clone()))
                    .or_default() += i64::from(credit.amount);
                state.credits.push(credit.clone());
            }
        }

        state.submissions.push(submission.clone());
        Ok(submission)
    }

    async fn standings(&self, campaign_id: CampaignId) -> Result<StandingsRows, APIError> {
        let state = self.state();
        let mut rows = Vec::new();
        let mut total_submissions = 0;

        for submission in &state.submissions {
            let Some(challenge) = state.challenges.get(&submission.challenge_id) else {
                continue;
            };
            if challenge.campaign_id != campaign_id {
                continue;
            }
            total_submissions += 1;
            if !submission.is_first_success {
                continue;
            }
            let Some(squad) = state.squads.get(&submission.squad_id) else {
                continue;
            };
            rows.push(ScoreRow {
                challenge_id: challenge.id,
                challenge_title: challenge.title.clone(),
                squad_id: squad.id,
                squad_name: squad.name.clone(),
                points_earned: submission.points_earned,
            });
        }

        Ok(StandingsRows {
            rows,
            total_submissions,
        })
    }
}

#[async_trait]
impl SquadDirectory for MemoryStore {
    async fn user_squad(&self, guild_id: &str, user_id: &str) -> Result<Option<Squad>, APIError> {
        let state = self.state();
        Ok(state
            .memberships
            .iter()
            .filter(|(_, member)| member == user_id)
            .filter_map(|(squad_id, _)| state.squads.get(squad_id))
            .find(|squad| squad.guild_id == guild_id)
            .cloned())
    }

    async fn squad_members(&self, squad_id: SquadId) -> Result<Vec<SquadMember>, APIError> {
        Ok(self
            .state()
            .memberships
            .iter()
            .filter(|(id, _)| *id == squad_id)
            .map(|(_, user_id)| SquadMember {
                user_id: user_id.clone(),
            })
            .collect())
    }
}
