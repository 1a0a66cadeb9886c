use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::models::{Campaign, ChallengeId, ScoreRow, SquadId};
use crate::store::ChallengeStore;

use super::api_util::APIError;

/// Everything a scoreboard is computed from, read at one point in time.
#[derive(Clone, Debug)]
pub struct StandingsSnapshot {
    pub campaign: Campaign,
    pub rows: Vec<ScoreRow>,
    pub total_submissions: i64,
    pub total_challenges: i64,
    pub time: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SquadStanding {
    pub squad_name: String,
    pub squad_id: SquadId,
    pub total_points: i64,
    pub successful_submissions: i64,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ChallengeWinner {
    pub squad_name: String,
    pub squad_id: SquadId,
    pub points_earned: i64,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ChallengeBreakdown {
    pub challenge_id: ChallengeId,
    pub challenge_title: String,
    pub submissions: Vec<ChallengeWinner>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SquadTotal {
    pub squad_name: String,
    pub squad_id: SquadId,
    pub total_points: i64,
    pub challenges_completed: i64,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct DetailedScoreboard {
    pub challenges_breakdown: Vec<ChallengeBreakdown>,
    pub squad_totals: Vec<SquadTotal>,
}

pub async fn fetch_standings(
    store: &dyn ChallengeStore,
    campaign: Campaign,
    now: DateTime<Utc>,
) -> Result<StandingsSnapshot, APIError> {
    let total_challenges = store.challenge_count(campaign.id).await?;
    let standings = store.standings(campaign.id).await?;
    debug!(
        "Loaded {} first successes for campaign {}",
        standings.rows.len(),
        campaign.id
    );

    Ok(StandingsSnapshot {
        campaign,
        rows: standings.rows,
        total_submissions: standings.total_submissions,
        total_challenges,
        time: now,
    })
}

/// Per-squad totals over first successes, best first.
pub fn campaign_scoreboard(rows: &[ScoreRow]) -> Vec<SquadStanding> {
    let mut by_squad: HashMap<SquadId, SquadStanding> = HashMap::new();
    for row in rows {
        let entry = by_squad.entry(row.squad_id).or_insert_with(|| SquadStanding {
            squad_name: row.squad_name.clone(),
            squad_id: row.squad_id,
            total_points: 0,
            successful_submissions: 0,
        });
        entry.total_points += i64::from(row.points_earned.unwrap_or(0));
        entry.successful_submissions += 1;
    }

    let mut standings: Vec<_> = by_squad.into_values().collect();
    standings.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.squad_name.cmp(&b.squad_name))
            .then_with(|| a.squad_id.cmp(&b.squad_id))
    });
    standings
}

/// Winners per challenge plus overall squad totals. Challenges are ordered by
/// title and kept apart by id, so two challenges sharing a title get one
/// entry each.
pub fn detailed_scoreboard(rows: &[ScoreRow]) -> DetailedScoreboard {
    let mut by_challenge: BTreeMap<(String, ChallengeId), Vec<ChallengeWinner>> = BTreeMap::new();
    for row in rows {
        by_challenge
            .entry((row.challenge_title.clone(), row.challenge_id))
            .or_default()
            .push(ChallengeWinner {
                squad_name: row.squad_name.clone(),
                squad_id: row.squad_id,
                points_earned: i64::from(row.points_earned.unwrap_or(0)),
            });
    }

    let challenges_breakdown = by_challenge
        .into_iter()
        .map(|((challenge_title, challenge_id), mut submissions)| {
            submissions.sort_by(|a, b| {
                b.points_earned
                    .cmp(&a.points_earned)
                    .then_with(|| a.squad_name.cmp(&b.squad_name))
            });
            ChallengeBreakdown {
                challenge_id,
                challenge_title,
                submissions,
            }
        })
        .collect();

    let squad_totals = campaign_scoreboard(rows)
        .into_iter()
        .map(|standing| SquadTotal {
            squad_name: standing.squad_name,
            squad_id: standing.squad_id,
            total_points: standing.total_points,
            challenges_completed: standing.successful_submissions,
        })
        .collect();

    DetailedScoreboard {
        challenges_breakdown,
        squad_totals,
    }
}
