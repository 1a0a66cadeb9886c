use std::collections::HashSet;
use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use log::debug;
use sha2::{Digest, Sha256};

use super::api_util::{log_server_error, APIError};

static ERROR_NO_KEYS: &str = "api_keys_not_configured";

/// Digests of the keys that may call the service. Keys themselves are never
/// kept in memory or config.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    digests: HashSet<String>,
}

pub fn digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hex::encode(hasher.finalize().as_slice())
}

impl ApiKeys {
    pub fn new<I, S>(digests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            digests: digests
                .into_iter()
                .map(|d| d.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn accepts(&self, key: &str) -> bool {
        self.digests.contains(&digest(key))
    }
}

/// Proof that the request carried an accepted `Authorization: Bearer` key.
#[derive(Debug, Clone)]
pub struct ApiKey {
    /// Leading digest characters, enough to tell callers apart in logs.
    pub fingerprint: String,
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

fn authorize(req: &HttpRequest) -> Result<ApiKey, APIError> {
    let location = "authorize";
    let keys = req
        .app_data::<web::Data<ApiKeys>>()
        .ok_or_else(|| log_server_error("ApiKeys missing from app data", location, ERROR_NO_KEYS))?;

    let token = bearer_token(req).ok_or(APIError::Unauthorized)?;
    if !keys.accepts(token) {
        debug!("Rejected API key on {}", req.path());
        return Err(APIError::Unauthorized);
    }

    let mut fingerprint = digest(token);
    fingerprint.truncate(8);
    Ok(ApiKey { fingerprint })
}

impl FromRequest for ApiKey {
    type Error = APIError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authorize(req))
    }
}
