//! `PgStore` against a real database. Runs only when `TEST_DATABASE_URL`
//! points at a disposable database; the engine's tables there are dropped
//! and recreated from `migrations/` once per run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use diesel::prelude::*;
use diesel_async::pooled_connection::{bb8::Pool, AsyncDieselConnectionManager};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl, SimpleAsyncConnection};
use tokio::sync::OnceCell;
use uuid::Uuid;

use challenge_engine::models::{ChallengeId, ChallengeSubmission, ReleaseState, SquadId};
use challenge_engine::schema::{
    bytes_balances, bytes_transactions, campaigns, challenge_submissions, challenges,
    squad_memberships, squads,
};
use challenge_engine::store::{ChallengeStore, InputFuture, PgStore, SquadDirectory};
use challenge_engine::util::api_util::APIError;
use challenge_engine::util::ledger::{LedgerCredit, REASON_MAX_CHARS};
use challenge_engine::util::script::GeneratedInput;
use challenge_engine::DbPool;

const RESET: &str = "DROP TABLE IF EXISTS challenge_submissions, challenge_inputs, challenges, campaigns CASCADE;";

const MIGRATIONS: [&str; 3] = [
    include_str!("../../migrations/2025-08-01-000000_collaborator_tables/up.sql"),
    include_str!("../../migrations/2025-08-02-000000_create_campaigns/up.sql"),
    include_str!("../../migrations/2025-08-03-000000_create_challenge_inputs_and_submissions/up.sql"),
];

static MIGRATED: OnceCell<()> = OnceCell::const_new();

async fn migrate(url: &str) {
    let mut conn = AsyncPgConnection::establish(url)
        .await
        .expect("connect to TEST_DATABASE_URL");
    conn.batch_execute(RESET).await.expect("drop engine tables");
    for up in MIGRATIONS {
        conn.batch_execute(up).await.expect("apply migration");
    }
}

fn short_id(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &id[..16])
}

/// A campaign with one challenge and a two-member squad in a guild of its
/// own, so tests sharing the database never see each other's rows.
struct PgFixture {
    pool: Arc<DbPool>,
    store: Arc<PgStore>,
    guild: String,
    title: String,
    challenge: ChallengeId,
    squad: SquadId,
    members: [String; 2],
}

impl PgFixture {
    async fn connect(title: &str) -> Option<Self> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL is not set, skipping");
            return None;
        };
        MIGRATED.get_or_init(|| migrate(&url)).await;

        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(url);
        let pool = Arc::new(
            Pool::builder()
                .max_size(20)
                .build(manager)
                .await
                .expect("build pool"),
        );

        let guild = short_id("pg");
        let members = [short_id("u"), short_id("u")];
        let (campaign, challenge, squad) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let mut conn = pool.get().await.expect("connection");
        diesel::insert_into(campaigns::table)
            .values((
                campaigns::id.eq(campaign),
                campaigns::guild_id.eq(&guild),
                campaigns::title.eq("Postgres Campaign"),
                campaigns::start_time.eq(Utc::now() - TimeDelta::hours(1)),
                campaigns::release_cadence_hours.eq(24),
                campaigns::created_by.eq("tests"),
            ))
            .execute(&mut conn)
            .await
            .expect("insert campaign");
        diesel::insert_into(challenges::table)
            .values((
                challenges::id.eq(challenge),
                challenges::campaign_id.eq(campaign),
                challenges::title.eq(title),
                challenges::description.eq("Add the numbers"),
                challenges::order_position.eq(1),
            ))
            .execute(&mut conn)
            .await
            .expect("insert challenge");
        diesel::insert_into(squads::table)
            .values((
                squads::id.eq(squad),
                squads::guild_id.eq(&guild),
                squads::name.eq("Red"),
            ))
            .execute(&mut conn)
            .await
            .expect("insert squad");
        for member in &members {
            diesel::insert_into(squad_memberships::table)
                .values((
                    squad_memberships::squad_id.eq(squad),
                    squad_memberships::user_id.eq(member),
                    squad_memberships::guild_id.eq(&guild),
                ))
                .execute(&mut conn)
                .await
                .expect("insert membership");
        }
        drop(conn);

        Some(Self {
            store: Arc::new(PgStore::new(pool.clone())),
            pool,
            guild,
            title: title.to_string(),
            challenge,
            squad,
            members,
        })
    }

    fn submission(&self, user: &str, correct: bool) -> ChallengeSubmission {
        ChallengeSubmission {
            id: Uuid::new_v4(),
            challenge_id: self.challenge,
            squad_id: self.squad,
            user_id: user.to_string(),
            username: format!("{user}#0001"),
            submitted_solution: if correct { "7" } else { "8" }.to_string(),
            is_correct: correct,
            is_first_success: correct,
            points_earned: correct.then_some(4000),
            submitted_at: Utc::now(),
        }
    }

    fn credits(&self, amount: i32) -> Vec<LedgerCredit> {
        self.members
            .iter()
            .map(|member| {
                LedgerCredit::challenge_reward(&self.guild, member, member, amount, &self.title)
            })
            .collect()
    }

    async fn balance(&self, user: &str) -> Option<i32> {
        let mut conn = self.pool.get().await.expect("connection");
        bytes_balances::table
            .find((&self.guild, user))
            .select(bytes_balances::balance)
            .first::<i32>(&mut conn)
            .await
            .optional()
            .expect("read balance")
    }

    async fn ledger_reasons(&self) -> Vec<Option<String>> {
        let mut conn = self.pool.get().await.expect("connection");
        bytes_transactions::table
            .filter(bytes_transactions::guild_id.eq(&self.guild))
            .select(bytes_transactions::reason)
            .load::<Option<String>>(&mut conn)
            .await
            .expect("read ledger")
    }
}

fn generated(runs: Arc<AtomicUsize>, tag: usize) -> InputFuture<'static> {
    Box::pin(async move {
        runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, APIError>(GeneratedInput {
            input: format!("input-{tag}"),
            result: format!("result-{tag}"),
        })
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_first_successes_credit_once() {
    let Some(fx) = PgFixture::connect("Sum of two").await else {
        return;
    };
    let fx = Arc::new(fx);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let fx = fx.clone();
            tokio::spawn(async move {
                let user = fx.members[i % 2].clone();
                fx.store
                    .record_submission(fx.submission(&user, true), &fx.credits(4000))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        let recorded = task.await.unwrap();
        assert!(recorded.is_correct);
        assert_eq!(recorded.points_earned.is_some(), recorded.is_first_success);
        winners += usize::from(recorded.is_first_success);
    }
    assert_eq!(winners, 1);

    let mut conn = fx.pool.get().await.unwrap();
    let stored: Vec<bool> = challenge_submissions::table
        .filter(challenge_submissions::challenge_id.eq(fx.challenge))
        .select(challenge_submissions::is_first_success)
        .load(&mut conn)
        .await
        .unwrap();
    assert_eq!(stored.len(), 16);
    assert_eq!(stored.iter().filter(|first| **first).count(), 1);

    for member in &fx.members {
        assert_eq!(fx.balance(member).await, Some(4000));
    }
    assert_eq!(fx.ledger_reasons().await.len(), 2);
}

#[tokio::test]
async fn longest_title_still_credits_the_squad() {
    let title = "T".repeat(200);
    let Some(fx) = PgFixture::connect(&title).await else {
        return;
    };

    let recorded = fx
        .store
        .record_submission(fx.submission(&fx.members[0], true), &fx.credits(4000))
        .await
        .unwrap();
    assert!(recorded.is_first_success);

    let reasons = fx.ledger_reasons().await;
    assert_eq!(reasons.len(), 2);
    for reason in reasons {
        let reason = reason.unwrap();
        assert_eq!(reason.chars().count(), REASON_MAX_CHARS);
        assert!(reason.starts_with("Challenge completed: TTT"));
    }
    assert_eq!(fx.balance(&fx.members[1]).await, Some(4000));
}

#[tokio::test]
async fn wrong_answers_and_standings() {
    let Some(fx) = PgFixture::connect("Standings").await else {
        return;
    };

    let wrong = fx
        .store
        .record_submission(fx.submission(&fx.members[0], false), &[])
        .await
        .unwrap();
    assert!(!wrong.is_first_success);
    assert_eq!(wrong.points_earned, None);
    fx.store
        .record_submission(fx.submission(&fx.members[1], true), &fx.credits(3000))
        .await
        .unwrap();

    let ctx = fx.store.challenge_context(fx.challenge).await.unwrap().unwrap();
    let standings = fx.store.standings(ctx.campaign.id).await.unwrap();
    assert_eq!(standings.total_submissions, 2);
    assert_eq!(standings.rows.len(), 1);
    assert_eq!(standings.rows[0].squad_name, "Red");
    assert_eq!(standings.rows[0].challenge_title, "Standings");
    assert_eq!(standings.rows[0].points_earned, Some(4000));

    let squad = fx
        .store
        .user_squad(&fx.guild, &fx.members[1])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(squad.id, fx.squad);
    assert_eq!(fx.store.squad_members(fx.squad).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_freezes_generate_once() {
    let Some(fx) = PgFixture::connect("Frozen").await else {
        return;
    };
    let fx = Arc::new(fx);
    let runs = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..8)
        .map(|tag| {
            let fx = fx.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                fx.store
                    .freeze_input(fx.challenge, fx.squad, generated(runs, tag))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut inputs = Vec::new();
    for task in tasks {
        inputs.push(task.await.unwrap());
    }
    assert_eq!(AtomicUsize::load(&runs, Ordering::SeqCst), 1);
    assert!(inputs.windows(2).all(|w| w[0] == w[1]));

    let again = fx
        .store
        .freeze_input(fx.challenge, fx.squad, generated(runs.clone(), 99))
        .await
        .unwrap();
    assert_eq!(again, inputs[0]);
    assert_eq!(AtomicUsize::load(&runs, Ordering::SeqCst), 1);
    assert_eq!(
        fx.store.find_input(fx.challenge, fx.squad).await.unwrap(),
        Some(again)
    );
}

#[tokio::test]
async fn failed_generation_stores_nothing() {
    let Some(fx) = PgFixture::connect("Broken").await else {
        return;
    };

    let err = fx
        .store
        .freeze_input(
            fx.challenge,
            fx.squad,
            Box::pin(async { Err::<GeneratedInput, _>(APIError::NoInputGenerator) }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, APIError::NoInputGenerator));
    assert!(fx
        .store
        .find_input(fx.challenge, fx.squad)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn release_state_is_compare_and_set() {
    let Some(fx) = PgFixture::connect("Clockwork").await else {
        return;
    };
    let now = Utc::now();
    let released = ReleaseState::Pending.release(now);

    assert!(fx
        .store
        .update_release_state(fx.challenge, ReleaseState::PENDING, released)
        .await
        .unwrap());
    assert!(!fx
        .store
        .update_release_state(fx.challenge, ReleaseState::PENDING, released)
        .await
        .unwrap());

    let announced = released.announce(now + TimeDelta::seconds(5));
    assert!(fx
        .store
        .update_release_state(fx.challenge, ReleaseState::RELEASED, announced)
        .await
        .unwrap());

    let ctx = fx.store.challenge_context(fx.challenge).await.unwrap().unwrap();
    assert!(ctx.challenge.state.is_announced());
    assert_eq!(
        ctx.challenge.state.released_at().map(|t| t.timestamp_micros()),
        Some(now.timestamp_micros())
    );
}
