use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::models::*;
use crate::store::ChallengeStore;

use super::api_util::APIError;
use super::auto_fetch::{AutoCache, Expiration};
use super::scoreboard::{fetch_standings, StandingsSnapshot};

/// Process-wide caches, built once at startup.
pub struct Cache {
    pub input_cache: AutoCache<(ChallengeId, SquadId), Arc<ChallengeInput>>,
    pub standings_cache: AutoCache<CampaignId, Arc<StandingsSnapshot>>,
    standings_expiry: Expiration,
    store: Arc<dyn ChallengeStore>,
}

#[derive(Debug, serde::Serialize)]
pub struct CacheStatusResponse {
    inputs: (u64, u64),
    standings: (u64, u64),
}

impl Cache {
    pub fn new(store: Arc<dyn ChallengeStore>, standings_ttl: Duration) -> Self {
        let standings_expiry = if standings_ttl.is_zero() {
            Expiration::AtOnce
        } else {
            Expiration::After(standings_ttl)
        };

        Self {
            input_cache: AutoCache::new(8192),
            standings_cache: AutoCache::new(64),
            standings_expiry,
            store,
        }
    }

    pub fn get_size(&self) -> CacheStatusResponse {
        CacheStatusResponse {
            inputs: self.input_cache.size(),
            standings: self.standings_cache.size(),
        }
    }

    pub async fn get_standings(&self, campaign: Campaign) -> Result<Arc<StandingsSnapshot>, APIError> {
        let store = self.store.clone();
        let expiry = self.standings_expiry;
        self.standings_cache
            .get_or_try_load(campaign.id, async move {
                let snapshot = fetch_standings(store.as_ref(), campaign, Utc::now()).await?;
                Ok::<_, APIError>((Arc::new(snapshot), expiry))
            })
            .await
    }

    pub async fn invalidate_standings(&self, campaign_id: CampaignId) {
        self.standings_cache.invalidate(&campaign_id).await
    }
}
