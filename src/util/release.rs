//! Release clock: when a challenge becomes visible, and the guarded
//! Pending -> Released -> Announced transitions.

use std::ops::RangeInclusive;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};

use crate::models::{Campaign, Challenge, ChallengeContext, ChallengeId, ReleaseState};
use crate::store::ChallengeStore;

use super::api_util::{new_unlocated_server_error, APIError};

pub const DEFAULT_UPCOMING_WINDOW_SECS: i64 = 45;

/// Accepted `release_cadence_hours`, one hour to one week.
pub const CADENCE_HOURS: RangeInclusive<i32> = 1..=168;

// Three states give at most two concurrent moves to lose against.
const MAX_STATE_ATTEMPTS: usize = 3;

static ERROR_RELEASE_CONFLICT: &str = "release_state_conflict";

pub fn release_time(start_time: DateTime<Utc>, cadence_hours: i32, position: i32) -> DateTime<Utc> {
    let steps = i64::from(position.max(1) - 1);
    start_time + TimeDelta::hours(i64::from(cadence_hours) * steps)
}

pub fn due_for_release(release_time: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= release_time
}

/// End of the whole schedule, used as the scoring deadline.
pub fn campaign_end(campaign: &Campaign, challenge_count: i64) -> DateTime<Utc> {
    campaign.start_time
        + TimeDelta::hours(i64::from(campaign.release_cadence_hours) * challenge_count.max(0))
}

pub fn is_upcoming(release_time: DateTime<Utc>, now: DateTime<Utc>, window: TimeDelta) -> bool {
    now < release_time && release_time <= now + window
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Release,
    Announce,
}

/// Applies `transition` to `state`. Moving forward out of Pending needs the
/// release time to have passed; moves that are already done are no-ops.
pub fn next_state(
    state: ReleaseState,
    transition: Transition,
    due: bool,
    now: DateTime<Utc>,
) -> Result<ReleaseState, APIError> {
    match (state, transition) {
        (ReleaseState::Pending, _) if !due => Err(APIError::NotReleased),
        (state, Transition::Release) => Ok(state.release(now)),
        (state, Transition::Announce) => Ok(state.announce(now)),
    }
}

/// Moves the challenge forward, re-reading it whenever another writer got
/// there first.
pub async fn advance(
    store: &dyn ChallengeStore,
    mut ctx: ChallengeContext,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<ChallengeContext, APIError> {
    let challenge_id = ctx.challenge.id;

    for _ in 0..MAX_STATE_ATTEMPTS {
        let current = ctx.challenge.state;
        let next = next_state(current, transition, ctx.is_due(now), now)?;
        if next == current {
            debug!("Challenge {challenge_id} already past {transition:?}");
            return Ok(ctx);
        }

        if store
            .update_release_state(challenge_id, current.code(), next)
            .await?
        {
            info!(
                "Challenge {challenge_id} moved from state {} to {}",
                current.code(),
                next.code()
            );
            ctx.challenge.state = next;
            return Ok(ctx);
        }

        ctx = store
            .challenge_context(challenge_id)
            .await?
            .ok_or(APIError::ChallengeNotFound)?;
    }

    Err(new_unlocated_server_error(
        format!("release state of {challenge_id} kept changing"),
        ERROR_RELEASE_CONFLICT,
    ))
}

pub async fn mark(
    store: &dyn ChallengeStore,
    challenge_id: ChallengeId,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<Challenge, APIError> {
    let ctx = store
        .challenge_context(challenge_id)
        .await?
        .ok_or(APIError::ChallengeNotFound)?;

    advance(store, ctx, transition, now)
        .await
        .map(|ctx| ctx.challenge)
}

/// Due challenges that still wait for their announcement, oldest first.
pub async fn pending_announcements(
    store: &dyn ChallengeStore,
    now: DateTime<Utc>,
) -> Result<Vec<ChallengeContext>, APIError> {
    let mut pending: Vec<_> = store
        .announcement_candidates()
        .await?
        .into_iter()
        .filter(|ctx| !ctx.challenge.state.is_announced() && ctx.is_due(now))
        .collect();
    pending.sort_by_key(|ctx| (ctx.release_time(), ctx.challenge.order_position));
    Ok(pending)
}

pub async fn upcoming_announcements(
    store: &dyn ChallengeStore,
    now: DateTime<Utc>,
    window: TimeDelta,
) -> Result<Vec<ChallengeContext>, APIError> {
    let mut upcoming: Vec<_> = store
        .announcement_candidates()
        .await?
        .into_iter()
        .filter(|ctx| {
            ctx.challenge.state == ReleaseState::Pending
                && is_upcoming(ctx.release_time(), now, window)
        })
        .collect();
    upcoming.sort_by_key(|ctx| (ctx.release_time(), ctx.challenge.order_position));
    Ok(upcoming)
}

/// Gate for participant operations. A due challenge that the poller has not
/// released yet is released here.
pub async fn ensure_available(
    store: &dyn ChallengeStore,
    ctx: ChallengeContext,
    guild_id: &str,
    now: DateTime<Utc>,
) -> Result<ChallengeContext, APIError> {
    if ctx.campaign.guild_id != guild_id {
        return Err(APIError::GuildMismatch);
    }
    if ctx.challenge.state.is_released() {
        return Ok(ctx);
    }
    advance(store, ctx, Transition::Release, now).await
}
