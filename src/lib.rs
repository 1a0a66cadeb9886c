pub mod api;
pub mod store;
pub mod util;

pub mod models;
pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use diesel_async::pooled_connection::bb8;
use diesel_async::AsyncPgConnection;

use store::{ChallengeStore, SquadDirectory};
use util::arbiter::SubmissionArbiter;
use util::auth::ApiKeys;
use util::cache::Cache;
use util::generator::InputGenerator;
use util::script::ScriptRunner;

pub type DbPool = bb8::Pool<AsyncPgConnection>;

pub trait Ext<R>: Sized {
    fn tap(self, f: impl FnOnce(&Self) -> R) -> Self {
        f(&self);
        self
    }
}

impl<T, R> Ext<R> for T {}

/// Services shared by every worker of the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChallengeStore>,
    pub squads: Arc<dyn SquadDirectory>,
    pub cache: Arc<Cache>,
    pub generator: Arc<InputGenerator>,
    pub arbiter: Arc<SubmissionArbiter>,
    pub api_keys: Arc<ApiKeys>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ChallengeStore>,
        squads: Arc<dyn SquadDirectory>,
        runner: ScriptRunner,
        api_keys: ApiKeys,
        scoreboard_ttl: Duration,
    ) -> Self {
        let cache = Arc::new(Cache::new(store.clone(), scoreboard_ttl));
        let generator = Arc::new(InputGenerator::new(store.clone(), cache.clone(), runner));
        let arbiter = Arc::new(SubmissionArbiter::new(
            store.clone(),
            squads.clone(),
            cache.clone(),
        ));

        Self {
            store,
            squads,
            cache,
            generator,
            arbiter,
            api_keys: Arc::new(api_keys),
        }
    }
}
