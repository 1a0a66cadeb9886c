extern crate diesel;
extern crate dotenv;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer};

use diesel_async::pooled_connection::{bb8::Pool, AsyncDieselConnectionManager};
use diesel_async::AsyncPgConnection;

use challenge_engine::api;
use challenge_engine::store::{ChallengeStore, MemoryStore, PgStore, SquadDirectory};
use challenge_engine::util::auth::ApiKeys;
use challenge_engine::util::config::{AppConfig, StorageBackend};
use challenge_engine::util::script::ScriptRunner;
use challenge_engine::{AppState, DbPool};

use log::{error, info, warn};

type Backend = (Arc<dyn ChallengeStore>, Arc<dyn SquadDirectory>);

async fn open_backend(storage: &StorageBackend) -> std::io::Result<Backend> {
    match storage {
        StorageBackend::Postgres { database_url } => {
            let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
            let pool: DbPool = Pool::builder()
                .build(manager)
                .await
                .map_err(|e| std::io::Error::other(format!("Failed to link to db: {e}")))?;
            let pg = Arc::new(PgStore::new(Arc::new(pool)));
            let squads: Arc<dyn SquadDirectory> = pg.clone();
            let store: Arc<dyn ChallengeStore> = pg;
            Ok((store, squads))
        }
        StorageBackend::Memory { seed_file } => {
            warn!("Using the in-memory store, nothing will be persisted.");
            let memory = match seed_file {
                Some(path) => {
                    let seed = std::fs::read_to_string(path)?;
                    let store = MemoryStore::from_seed(&seed).map_err(|e| {
                        std::io::Error::other(format!("Invalid seed {}: {e}", path.display()))
                    })?;
                    info!("Loaded seed data from {}", path.display());
                    store
                }
                None => MemoryStore::new(),
            };
            let memory = Arc::new(memory);
            let squads: Arc<dyn SquadDirectory> = memory.clone();
            let store: Arc<dyn ChallengeStore> = memory;
            Ok((store, squads))
        }
    }
}

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env().map_err(|e| {
        error!("Invalid configuration: {e}");
        std::io::Error::other(e)
    })?;

    let api_keys = ApiKeys::new(&config.api_key_digests);
    if api_keys.is_empty() {
        warn!("API_KEYS is empty, every request will be rejected.");
    }

    let (store, squads) = open_backend(&config.storage).await?;
    let runner = ScriptRunner::new(
        config.script_interpreter.clone(),
        config.script_args.clone(),
        config.script_limits.clone(),
    );
    info!("Input generators run as {} with {:?}", config.script_interpreter, runner.limits());
    let state = AppState::new(store, squads, runner, api_keys, config.scoreboard_ttl);

    let cors_origins = Arc::new(config.cors_origins.clone());

    info!("Listening on {}", config.bind_addr);

    HttpServer::new(move || {
        let origins = cors_origins.clone();
        App::new()
            .wrap(
                Cors::default()
                    .allowed_origin_fn(move |origin, _| {
                        origin
                            .to_str()
                            .is_ok_and(|origin| origins.iter().any(|allowed| allowed == origin))
                    })
                    .allow_any_header()
                    .allow_any_method(),
            )
            .wrap(actix_web::middleware::Logger::default())
            .configure(|cfg| api::configure(cfg, &state))
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
