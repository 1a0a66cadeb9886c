//! Persistence seam of the engine.
//!
//! Every contended write goes through a single atomic store operation so that
//! callers never have to pair an existence check with an insert.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    Campaign, CampaignId, ChallengeContext, ChallengeId, ChallengeInput, ChallengeSubmission,
    ReleaseState, ScoreRow, Squad, SquadId, SquadMember,
};
use crate::util::api_util::APIError;
use crate::util::ledger::LedgerCredit;
use crate::util::script::GeneratedInput;

pub mod memory;
pub mod pg;

pub use memory::{MemoryStore, SeedError};
pub use pg::PgStore;

/// Deferred generator run, only awaited when no input is stored yet.
pub type InputFuture<'a> = Pin<Box<dyn Future<Output = Result<GeneratedInput, APIError>> + Send + 'a>>;

/// First-success rows of a campaign and its attempt count, read together.
#[derive(Clone, Debug, Default)]
pub struct StandingsRows {
    pub rows: Vec<ScoreRow>,
    pub total_submissions: i64,
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn challenge_context(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<Option<ChallengeContext>, APIError>;

    /// Challenges of active campaigns that have not been announced yet.
    async fn announcement_candidates(&self) -> Result<Vec<ChallengeContext>, APIError>;

    /// Compare-and-set on the release state. Returns `false` when the stored
    /// state no longer has code `expected`.
    async fn update_release_state(
        &self,
        challenge_id: ChallengeId,
        expected: i16,
        next: ReleaseState,
    ) -> Result<bool, APIError>;

    async fn current_campaign(
        &self,
        guild_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>, APIError>;

    async fn upcoming_campaign(
        &self,
        guild_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>, APIError>;

    async fn challenge_count(&self, campaign_id: CampaignId) -> Result<i64, APIError>;

    async fn find_input(
        &self,
        challenge_id: ChallengeId,
        squad_id: SquadId,
    ) -> Result<Option<ChallengeInput>, APIError>;

    /// Returns the stored input of (challenge, squad), awaiting `generate`
    /// and storing its output only if there is none. Concurrent calls for one
    /// key await at most one `generate` between them, across processes
    /// sharing the store. A failed `generate` stores nothing.
    async fn freeze_input<'a>(
        &self,
        challenge_id: ChallengeId,
        squad_id: SquadId,
        generate: InputFuture<'a>,
    ) -> Result<ChallengeInput, APIError>;

    async fn first_success_exists(
        &self,
        challenge_id: ChallengeId,
        squad_id: SquadId,
    ) -> Result<bool, APIError>;

    /// Persists one attempt. A submission flagged as first success claims the
    /// slot atomically; if the slot is already held it is stored demoted and
    /// `credits` are dropped. Credits are applied in the same transaction as
    /// the winning row.
    async fn record_submission(
        &self,
        submission: ChallengeSubmission,
        credits: &[LedgerCredit],
    ) -> Result<ChallengeSubmission, APIError>;

    async fn standings(&self, campaign_id: CampaignId) -> Result<StandingsRows, APIError>;
}

/// Read-only view of the squad registry.
#[async_trait]
pub trait SquadDirectory: Send + Sync {
    async fn user_squad(&self, guild_id: &str, user_id: &str) -> Result<Option<Squad>, APIError>;

    async fn squad_members(&self, squad_id: SquadId) -> Result<Vec<SquadMember>, APIError>;
}
