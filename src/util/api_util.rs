use actix_web::{error, http::StatusCode, HttpResponse};
use derive_more::derive::Display;
use diesel::result::Error;
use log::error;
use std::fmt;

use crate::Ext;

pub trait APIRequest: Sized {
    fn ok(&self) -> bool;
    fn sanity(&self) -> Result<(), APIError> {
        if self.ok() {
            Ok(())
        } else {
            Err(APIError::InvalidFormData)
        }
    }
}

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum APIError {
    #[display("Invalid form data")]
    InvalidFormData,

    #[display("Invalid query")]
    InvalidQuery,

    #[display("Input has not been generated, request the input before submitting")]
    InputNotGenerated,

    #[display("Challenge not found")]
    ChallengeNotFound,

    #[display("Campaign not found")]
    CampaignNotFound,

    #[display("User is not a member of any squad in this guild")]
    NotInSquad,

    #[display("Challenge has no input generator configured")]
    NoInputGenerator,

    #[display("Challenge has not been released yet")]
    NotReleased,

    #[display("Challenge does not belong to this guild")]
    GuildMismatch,

    #[display("Missing or invalid API key")]
    Unauthorized,

    #[display("Input generation failed, ref[{refnum}]")]
    ScriptExecution { refnum: uuid::Uuid },

    #[display("Server error at {location}, ref[{refnum}]: {msg}")]
    ServerError {
        location: &'static str,
        msg: &'static str,
        refnum: uuid::Uuid,
    },
}

impl APIError {
    pub fn set_location(self, location: &'static str) -> Self {
        match self {
            APIError::ServerError {
                location: _,
                msg,
                refnum,
            } => APIError::ServerError {
                location,
                msg,
                refnum,
            },
            _ => self,
        }
    }

    pub fn log(&self) {
        if let APIError::ServerError {
            location,
            msg,
            refnum,
        } = self
        {
            error!("Server error at {location}, ref[{refnum}]: {msg}");
        }
    }
}

impl From<Error> for APIError {
    fn from(e: Error) -> Self {
        new_unlocated_server_error(e, "Transaction")
    }
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

impl error::ResponseError for APIError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            APIError::InvalidFormData | APIError::InvalidQuery | APIError::InputNotGenerated => {
                StatusCode::BAD_REQUEST
            }
            APIError::ChallengeNotFound
            | APIError::CampaignNotFound
            | APIError::NotInSquad
            | APIError::NoInputGenerator => StatusCode::NOT_FOUND,
            APIError::NotReleased | APIError::GuildMismatch => StatusCode::FORBIDDEN,
            APIError::Unauthorized => StatusCode::UNAUTHORIZED,
            APIError::ScriptExecution { .. } | APIError::ServerError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub fn log_server_error<E>(error: E, location: &'static str, msg: &'static str) -> APIError
where
    E: fmt::Display,
{
    new_unlocated_server_error(error, msg)
        .set_location(location)
        .tap(APIError::log)
}

pub fn new_unlocated_server_error<E>(error: E, msg: &'static str) -> APIError
where
    E: fmt::Display,
{
    let refnum = uuid::Uuid::new_v4();
    error!("Error [{refnum}]: {error}");
    APIError::ServerError {
        location: LOCATION_UNKNOWN,
        msg,
        refnum,
    }
}

pub static ERROR_DB_CONNECTION: &str = "db_connction_failed";
pub static ERROR_DB_UNKNOWN: &str = "database_unknown";
pub static ERROR_LEDGER: &str = "ledger_credit_failed";

pub static LOCATION_UNKNOWN: &str = "[unknown]";
