use chrono::Utc;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel_async::AsyncPgConnection;
use diesel_async::RunQueryDsl;
use log::debug;
use std::ops::DerefMut;

use super::api_util::{new_unlocated_server_error, APIError, ERROR_LEDGER};

pub static SYSTEM_GIVER_ID: &str = "SYSTEM";
pub static SYSTEM_GIVER_USERNAME: &str = "System";

/// Width of `bytes_transactions.reason`.
pub const REASON_MAX_CHARS: usize = 200;

/// One "credit user N points with reason" request for the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerCredit {
    pub guild_id: String,
    pub user_id: String,
    pub username: String,
    pub amount: i32,
    pub reason: String,
}

impl LedgerCredit {
    pub fn challenge_reward(
        guild_id: &str,
        user_id: &str,
        username: &str,
        amount: i32,
        challenge_title: &str,
    ) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            amount,
            reason: format!("Challenge completed: {challenge_title}")
                .chars()
                .take(REASON_MAX_CHARS)
                .collect(),
        }
    }
}

#[derive(Debug)]
pub enum LedgerError {
    NonPositiveAmount(i32),
    DieselError(DieselError),
}

impl From<DieselError> for LedgerError {
    fn from(err: DieselError) -> Self {
        LedgerError::DieselError(err)
    }
}

impl From<LedgerError> for APIError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::NonPositiveAmount(amount) => new_unlocated_server_error(
                format!("refusing ledger credit of {amount}"),
                ERROR_LEDGER,
            ),
            LedgerError::DieselError(error) => new_unlocated_server_error(error, ERROR_LEDGER),
        }
    }
}

/// Credits a user's balance and logs the system reward.
/// CAVEAT: Always used within a sql transaction!
pub async fn credit_user<C>(credit: &LedgerCredit, conn: &mut C) -> Result<i32, LedgerError>
where
    C: DerefMut<Target = AsyncPgConnection> + std::marker::Send,
{
    use crate::schema::bytes_balances::dsl as balance_dsl;
    use crate::schema::bytes_transactions::dsl as transaction_dsl;

    if credit.amount <= 0 {
        return Err(LedgerError::NonPositiveAmount(credit.amount));
    }

    let now = Utc::now();

    let new_balance = diesel::insert_into(balance_dsl::bytes_balances)
        .values((
            balance_dsl::guild_id.eq(&credit.guild_id),
            balance_dsl::user_id.eq(&credit.user_id),
            balance_dsl::balance.eq(credit.amount),
            balance_dsl::total_received.eq(credit.amount),
            balance_dsl::total_sent.eq(0),
            balance_dsl::created_at.eq(now),
            balance_dsl::updated_at.eq(now),
        ))
        .on_conflict((balance_dsl::guild_id, balance_dsl::user_id))
        .do_update()
        .set((
            balance_dsl::balance.eq(balance_dsl::balance + credit.amount),
            balance_dsl::total_received.eq(balance_dsl::total_received + credit.amount),
            balance_dsl::updated_at.eq(now),
        ))
        .returning(balance_dsl::balance)
        .get_result::<i32>(conn)
        .await?;

    diesel::insert_into(transaction_dsl::bytes_transactions)
        .values((
            transaction_dsl::id.eq(uuid::Uuid::new_v4()),
            transaction_dsl::guild_id.eq(&credit.guild_id),
            transaction_dsl::giver_id.eq(SYSTEM_GIVER_ID),
            transaction_dsl::giver_username.eq(SYSTEM_GIVER_USERNAME),
            transaction_dsl::receiver_id.eq(&credit.user_id),
            transaction_dsl::receiver_username.eq(&credit.username),
            transaction_dsl::amount.eq(credit.amount),
            transaction_dsl::reason.eq(Some(&credit.reason)),
            transaction_dsl::created_at.eq(now),
        ))
        .execute(conn)
        .await?;

    debug!(
        "Credited {} to {} in guild {}, balance now {new_balance}",
        credit.amount, credit.user_id, credit.guild_id
    );
    Ok(new_balance)
}
