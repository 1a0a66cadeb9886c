use std::sync::Arc;

use log::{debug, info};

use crate::models::{ChallengeId, ChallengeInput, SquadId};
use crate::store::ChallengeStore;

use super::api_util::APIError;
use super::auto_fetch::Expiration;
use super::cache::Cache;
use super::script::ScriptRunner;

/// Produces and freezes one (input, result) pair per challenge and squad.
pub struct InputGenerator {
    store: Arc<dyn ChallengeStore>,
    cache: Arc<Cache>,
    runner: ScriptRunner,
}

impl InputGenerator {
    pub fn new(store: Arc<dyn ChallengeStore>, cache: Arc<Cache>, runner: ScriptRunner) -> Self {
        Self {
            store,
            cache,
            runner,
        }
    }

    /// Never runs the generator.
    pub async fn input_exists(
        &self,
        challenge_id: ChallengeId,
        squad_id: SquadId,
    ) -> Result<bool, APIError> {
        Ok(self.existing_input(challenge_id, squad_id).await?.is_some())
    }

    pub async fn existing_input(
        &self,
        challenge_id: ChallengeId,
        squad_id: SquadId,
    ) -> Result<Option<Arc<ChallengeInput>>, APIError> {
        let key = (challenge_id, squad_id);
        if let Some(input) = self.cache.input_cache.get(&key).await {
            return Ok(Some(input));
        }

        match self.store.find_input(challenge_id, squad_id).await? {
            Some(input) => {
                let input = Arc::new(input);
                self.cache
                    .input_cache
                    .set(key, input.clone(), Expiration::Never)
                    .await;
                Ok(Some(input))
            }
            None => Ok(None),
        }
    }

    /// Returns the frozen input of the squad, running `script` only if none
    /// exists yet. Concurrent callers in this process share one load; the
    /// store keeps callers in other processes from running it again.
    pub async fn get_or_create_input(
        &self,
        challenge_id: ChallengeId,
        squad_id: SquadId,
        script: &str,
    ) -> Result<Arc<ChallengeInput>, APIError> {
        let store = self.store.clone();
        let runner = self.runner.clone();
        let script = script.to_owned();

        self.cache
            .input_cache
            .get_or_try_load((challenge_id, squad_id), async move {
                let generate = Box::pin(async move {
                    info!("Generating input for challenge {challenge_id}, squad {squad_id}");
                    Ok::<_, APIError>(runner.run(&script).await?)
                });

                let stored = store.freeze_input(challenge_id, squad_id, generate).await?;
                debug!("Input for challenge {challenge_id}, squad {squad_id} is frozen");

                Ok::<_, APIError>((Arc::new(stored), Expiration::Never))
            })
            .await
    }
}
