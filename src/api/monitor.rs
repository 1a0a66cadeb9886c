use actix_web::{get, web, HttpResponse, Responder};

use crate::util::api_util::*;
use crate::util::auth::ApiKey;
use crate::util::cache::Cache;

// [[API]]
// desp: Entry counts and weighted sizes of the input and scoreboard caches
// Method: GET
// URL: /monitor/cache
// Response Body: `CacheStatusResponse`
#[get("/cache")]
async fn cache_size(key: ApiKey, cache: web::Data<Cache>) -> Result<impl Responder, APIError> {
    log::debug!("Cache status requested by key {}", key.fingerprint);
    Ok(HttpResponse::Ok().json(cache.get_size()))
}
