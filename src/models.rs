use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::util::api_util::{new_unlocated_server_error, APIError};
use crate::util::release;

pub type CampaignId = Uuid;
pub type ChallengeId = Uuid;
pub type SquadId = Uuid;
pub type SubmissionId = Uuid;

#[derive(Queryable, Selectable, Clone, Debug, Serialize)]
#[diesel(table_name = crate::schema::campaigns)]
pub struct Campaign {
    pub id: CampaignId,
    pub guild_id: String,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub release_cadence_hours: i32,
    pub announcement_channels: Vec<String>,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(
        guild_id: impl Into<String>,
        title: impl Into<String>,
        start_time: DateTime<Utc>,
        release_cadence_hours: i32,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            guild_id: guild_id.into(),
            title: title.into(),
            description: String::new(),
            start_time,
            release_cadence_hours,
            announcement_channels: Vec::new(),
            is_active: true,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle of a challenge. Announcing implies releasing, so there is no
/// way to express "announced but not released".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReleaseState {
    Pending,
    Released {
        released_at: DateTime<Utc>,
    },
    Announced {
        released_at: DateTime<Utc>,
        announced_at: DateTime<Utc>,
    },
}

impl ReleaseState {
    pub const PENDING: i16 = 0;
    pub const RELEASED: i16 = 1;
    pub const ANNOUNCED: i16 = 2;

    pub fn code(&self) -> i16 {
        match self {
            ReleaseState::Pending => Self::PENDING,
            ReleaseState::Released { .. } => Self::RELEASED,
            ReleaseState::Announced { .. } => Self::ANNOUNCED,
        }
    }

    /// Rebuilds the state from its column form; `None` if the columns disagree.
    pub fn from_columns(
        code: i16,
        released_at: Option<DateTime<Utc>>,
        announced_at: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        match (code, released_at, announced_at) {
            (Self::PENDING, None, None) => Some(ReleaseState::Pending),
            (Self::RELEASED, Some(released_at), None) => {
                Some(ReleaseState::Released { released_at })
            }
            (Self::ANNOUNCED, Some(released_at), Some(announced_at)) => {
                Some(ReleaseState::Announced {
                    released_at,
                    announced_at,
                })
            }
            _ => None,
        }
    }

    pub fn is_released(&self) -> bool {
        !matches!(self, ReleaseState::Pending)
    }

    pub fn is_announced(&self) -> bool {
        matches!(self, ReleaseState::Announced { .. })
    }

    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ReleaseState::Pending => None,
            ReleaseState::Released { released_at }
            | ReleaseState::Announced { released_at, .. } => Some(*released_at),
        }
    }

    pub fn announced_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ReleaseState::Announced { announced_at, .. } => Some(*announced_at),
            _ => None,
        }
    }

    pub fn release(self, now: DateTime<Utc>) -> Self {
        match self {
            ReleaseState::Pending => ReleaseState::Released { released_at: now },
            other => other,
        }
    }

    pub fn announce(self, now: DateTime<Utc>) -> Self {
        match self {
            ReleaseState::Pending => ReleaseState::Announced {
                released_at: now,
                announced_at: now,
            },
            ReleaseState::Released { released_at } => ReleaseState::Announced {
                released_at,
                announced_at: now,
            },
            announced => announced,
        }
    }
}

#[derive(Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = crate::schema::challenges)]
pub struct ChallengeRow {
    pub id: ChallengeId,
    pub campaign_id: CampaignId,
    pub title: String,
    pub description: String,
    pub order_position: i32,
    pub points_value: i32,
    pub python_script: Option<String>,
    pub input_generator_script: Option<String>,
    pub solution_validator_script: Option<String>,
    pub release_state: i16,
    pub released_at: Option<DateTime<Utc>>,
    pub announced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub campaign_id: CampaignId,
    pub title: String,
    pub description: String,
    pub order_position: i32,
    pub points_value: i32,
    #[serde(skip)]
    pub python_script: Option<String>,
    #[serde(skip)]
    pub input_generator_script: Option<String>,
    #[serde(skip)]
    pub solution_validator_script: Option<String>,
    pub state: ReleaseState,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    pub fn new(
        campaign_id: CampaignId,
        title: impl Into<String>,
        order_position: i32,
        input_generator_script: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            title: title.into(),
            description: String::new(),
            order_position,
            points_value: 0,
            python_script: None,
            input_generator_script,
            solution_validator_script: None,
            state: ReleaseState::Pending,
            created_at: Utc::now(),
        }
    }
}

impl TryFrom<ChallengeRow> for Challenge {
    type Error = APIError;

    fn try_from(row: ChallengeRow) -> Result<Self, Self::Error> {
        let state = ReleaseState::from_columns(row.release_state, row.released_at, row.announced_at)
            .ok_or_else(|| {
                new_unlocated_server_error(
                    format!("challenge {} has release_state {}", row.id, row.release_state),
                    ERROR_INCONSISTENT_STATE,
                )
            })?;

        Ok(Self {
            id: row.id,
            campaign_id: row.campaign_id,
            title: row.title,
            description: row.description,
            order_position: row.order_position,
            points_value: row.points_value,
            python_script: row.python_script,
            input_generator_script: row.input_generator_script,
            solution_validator_script: row.solution_validator_script,
            state,
            created_at: row.created_at,
        })
    }
}

static ERROR_INCONSISTENT_STATE: &str = "inconsistent_release_state";

/// A challenge together with the campaign that schedules it.
#[derive(Clone, Debug)]
pub struct ChallengeContext {
    pub challenge: Challenge,
    pub campaign: Campaign,
}

impl ChallengeContext {
    pub fn release_time(&self) -> DateTime<Utc> {
        release::release_time(
            self.campaign.start_time,
            self.campaign.release_cadence_hours,
            self.challenge.order_position,
        )
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        release::due_for_release(self.release_time(), now)
    }
}

#[derive(Queryable, Selectable, Insertable, Clone, Debug, PartialEq, Eq)]
#[diesel(table_name = crate::schema::challenge_inputs)]
pub struct ChallengeInput {
    pub challenge_id: ChallengeId,
    pub squad_id: SquadId,
    pub input_data: String,
    pub result_data: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Insertable, Clone, Debug, Serialize)]
#[diesel(table_name = crate::schema::challenge_submissions)]
pub struct ChallengeSubmission {
    pub id: SubmissionId,
    pub challenge_id: ChallengeId,
    pub squad_id: SquadId,
    pub user_id: String,
    pub username: String,
    pub submitted_solution: String,
    pub is_correct: bool,
    pub is_first_success: bool,
    pub points_earned: Option<i32>,
    pub submitted_at: DateTime<Utc>,
}

impl ChallengeSubmission {
    /// Turns a would-be winner into an ordinary correct attempt.
    pub fn demote(self) -> Self {
        Self {
            is_first_success: false,
            points_earned: None,
            ..self
        }
    }
}

#[derive(Queryable, Selectable, Clone, Debug, Serialize, PartialEq, Eq)]
#[diesel(table_name = crate::schema::squads)]
pub struct Squad {
    pub id: SquadId,
    pub guild_id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SquadMember {
    pub user_id: String,
}

/// One first-success submission, flattened for scoreboard aggregation.
#[derive(Queryable, Clone, Debug, PartialEq, Eq)]
pub struct ScoreRow {
    pub challenge_id: ChallengeId,
    pub challenge_title: String,
    pub squad_id: SquadId,
    pub squad_name: String,
    pub points_earned: Option<i32>,
}
