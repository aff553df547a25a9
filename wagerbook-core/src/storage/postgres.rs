use super::{Store, StoreError, StoreTx};
use crate::entities::{
    Account, AccountId, Bet, GroupWager, GroupWagerOption, GroupWagerParticipant,
    GroupWagerState, LedgerEntry, MessageRef, NewBet, NewGroupWager, NewLedgerEntry, NewWager,
    VoteRecord, Wager,
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;

/// PostgreSQL-backed store. Row locks are `SELECT ... FOR UPDATE`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[derive(sqlx::FromRow)]
struct GroupWagerRow {
    id: i64,
    creator: AccountId,
    condition: String,
    min_participants: i32,
    voting_deadline: OffsetDateTime,
    state: GroupWagerState,
    winning_option: Option<i64>,
    voting_closed_at: Option<OffsetDateTime>,
    message_channel_id: Option<i64>,
    message_id: Option<i64>,
    created_at: OffsetDateTime,
}

impl GroupWagerRow {
    fn into_wager(self, options: Vec<GroupWagerOption>) -> GroupWager {
        let message_ref = match (self.message_channel_id, self.message_id) {
            (Some(channel_id), Some(message_id)) => Some(MessageRef {
                channel_id,
                message_id,
            }),
            _ => None,
        };
        GroupWager {
            id: self.id,
            creator: self.creator,
            condition: self.condition,
            options,
            min_participants: self.min_participants,
            voting_deadline: self.voting_deadline,
            state: self.state,
            winning_option: self.winning_option,
            voting_closed_at: self.voting_closed_at,
            message_ref,
            created_at: self.created_at,
        }
    }
}

const GROUP_WAGER_COLUMNS: &str = r#"
    id, creator, "condition", min_participants, voting_deadline, state,
    winning_option, voting_closed_at, message_channel_id, message_id, created_at
"#;

const WAGER_COLUMNS: &str = r#"
    id, proposer, target, stake, "condition", state, winner, created_at, updated_at
"#;

impl PgTx {
    /// Attach options to group wager rows with a single `ANY` query.
    async fn with_options(
        &mut self,
        rows: Vec<GroupWagerRow>,
    ) -> Result<Vec<GroupWager>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut options = sqlx::query_as::<_, GroupWagerOption>(
            r#"
            SELECT id, group_wager_id, text, sort_order, total_staked
            FROM group_wager_options
            WHERE group_wager_id = ANY($1)
            ORDER BY group_wager_id, sort_order
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let wagers = rows
            .into_iter()
            .map(|row| {
                let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut options)
                    .into_iter()
                    .partition(|o| o.group_wager_id == row.id);
                options = rest;
                row.into_wager(mine)
            })
            .collect();
        Ok(wagers)
    }

    async fn fetch_group_wager(
        &mut self,
        id: i64,
        for_update: bool,
    ) -> Result<Option<GroupWager>, StoreError> {
        let sql = format!(
            "SELECT {GROUP_WAGER_COLUMNS} FROM group_wagers WHERE id = $1{}",
            if for_update { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query_as::<_, GroupWagerRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        match row {
            Some(row) => Ok(self.with_options(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn fetch_wager(&mut self, id: i64, for_update: bool) -> Result<Option<Wager>, StoreError> {
        let sql = format!(
            "SELECT {WAGER_COLUMNS} FROM wagers WHERE id = $1{}",
            if for_update { " FOR UPDATE" } else { "" }
        );
        let wager = sqlx::query_as::<_, Wager>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(wager)
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_or_open_account(
        &mut self,
        id: AccountId,
        starting_balance: i64,
        now: OffsetDateTime,
    ) -> Result<(Account, bool), StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO accounts (id, balance, reserved, created_at)
            VALUES ($1, $2, 0, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(starting_balance)
        .bind(now)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, balance, reserved, created_at
            FROM accounts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok((account, inserted == 1))
    }

    async fn get_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, balance, reserved, created_at FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(account)
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET balance = $2, reserved = $3 WHERE id = $1")
            .bind(account.id)
            .bind(account.balance)
            .bind(account.reserved)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Inconsistent(format!(
                "account {} vanished during update",
                account.id
            )));
        }
        Ok(())
    }

    async fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries (account, delta, resulting_balance, kind, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, account, delta, resulting_balance, kind, created_at
            "#,
        )
        .bind(entry.account)
        .bind(entry.delta)
        .bind(entry.resulting_balance)
        .bind(entry.kind)
        .bind(entry.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(entry)
    }

    async fn entries_for(
        &mut self,
        account: AccountId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, account, delta, resulting_balance, kind, created_at
            FROM ledger_entries
            WHERE account = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(account)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(entries)
    }

    async fn entry_sum(&mut self, account: AccountId) -> Result<i64, StoreError> {
        let sum = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(delta), 0)::BIGINT FROM ledger_entries WHERE account = $1",
        )
        .bind(account)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(sum)
    }

    async fn top_accounts(&mut self, limit: i64) -> Result<Vec<Account>, StoreError> {
        let accounts = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, balance, reserved, created_at
            FROM accounts
            ORDER BY balance DESC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(accounts)
    }

    async fn insert_bet(&mut self, bet: NewBet) -> Result<Bet, StoreError> {
        let bet = sqlx::query_as::<_, Bet>(
            r#"
            INSERT INTO bets (account, stake, win_probability, won, payout, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, account, stake, win_probability, won, payout, created_at
            "#,
        )
        .bind(bet.account)
        .bind(bet.stake)
        .bind(bet.win_probability)
        .bind(bet.won)
        .bind(bet.payout)
        .bind(bet.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(bet)
    }

    async fn staked_since(
        &mut self,
        account: AccountId,
        since: OffsetDateTime,
    ) -> Result<i64, StoreError> {
        let sum = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(stake), 0)::BIGINT
            FROM bets
            WHERE account = $1 AND created_at >= $2
            "#,
        )
        .bind(account)
        .bind(since)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(sum)
    }

    async fn insert_wager(&mut self, wager: NewWager) -> Result<Wager, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO wagers (proposer, target, stake, "condition", state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'proposed', $5, $5)
            RETURNING {WAGER_COLUMNS}
            "#
        );
        let wager = sqlx::query_as::<_, Wager>(&sql)
            .bind(wager.proposer)
            .bind(wager.target)
            .bind(wager.stake)
            .bind(wager.condition)
            .bind(wager.created_at)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(wager)
    }

    async fn get_wager(&mut self, id: i64) -> Result<Option<Wager>, StoreError> {
        self.fetch_wager(id, false).await
    }

    async fn lock_wager(&mut self, id: i64) -> Result<Option<Wager>, StoreError> {
        self.fetch_wager(id, true).await
    }

    async fn update_wager(&mut self, wager: &Wager) -> Result<(), StoreError> {
        sqlx::query("UPDATE wagers SET state = $2, winner = $3, updated_at = $4 WHERE id = $1")
            .bind(wager.id)
            .bind(wager.state)
            .bind(wager.winner)
            .bind(wager.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn upsert_vote(&mut self, vote: &VoteRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO wager_votes (wager_id, voter, choice)
            VALUES ($1, $2, $3)
            ON CONFLICT (wager_id, voter) DO UPDATE SET choice = EXCLUDED.choice
            "#,
        )
        .bind(vote.wager_id)
        .bind(vote.voter)
        .bind(vote.choice)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn votes_for(&mut self, wager_id: i64) -> Result<Vec<VoteRecord>, StoreError> {
        let votes = sqlx::query_as::<_, VoteRecord>(
            "SELECT wager_id, voter, choice FROM wager_votes WHERE wager_id = $1 ORDER BY voter",
        )
        .bind(wager_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(votes)
    }

    async fn insert_group_wager(
        &mut self,
        wager: NewGroupWager,
    ) -> Result<GroupWager, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO group_wagers (creator, "condition", min_participants, voting_deadline, state, created_at)
            VALUES ($1, $2, $3, $4, 'active', $5)
            RETURNING {GROUP_WAGER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, GroupWagerRow>(&sql)
            .bind(wager.creator)
            .bind(&wager.condition)
            .bind(wager.min_participants)
            .bind(wager.voting_deadline)
            .bind(wager.created_at)
            .fetch_one(&mut *self.tx)
            .await?;

        let orders: Vec<i32> = (0..wager.option_texts.len() as i32).collect();
        let mut options = sqlx::query_as::<_, GroupWagerOption>(
            r#"
            INSERT INTO group_wager_options (group_wager_id, text, sort_order, total_staked)
            SELECT $1, data.text, data.sort_order, 0
            FROM UNNEST($2::TEXT[], $3::INT[]) AS data(text, sort_order)
            RETURNING id, group_wager_id, text, sort_order, total_staked
            "#,
        )
        .bind(row.id)
        .bind(&wager.option_texts)
        .bind(&orders)
        .fetch_all(&mut *self.tx)
        .await?;
        options.sort_by_key(|o| o.order);
        Ok(row.into_wager(options))
    }

    async fn get_group_wager(&mut self, id: i64) -> Result<Option<GroupWager>, StoreError> {
        self.fetch_group_wager(id, false).await
    }

    async fn lock_group_wager(&mut self, id: i64) -> Result<Option<GroupWager>, StoreError> {
        self.fetch_group_wager(id, true).await
    }

    async fn update_group_wager(&mut self, wager: &GroupWager) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE group_wagers
            SET state = $2, winning_option = $3, voting_closed_at = $4,
                message_channel_id = $5, message_id = $6
            WHERE id = $1
            "#,
        )
        .bind(wager.id)
        .bind(wager.state)
        .bind(wager.winning_option)
        .bind(wager.voting_closed_at)
        .bind(wager.message_ref.map(|m| m.channel_id))
        .bind(wager.message_ref.map(|m| m.message_id))
        .execute(&mut *self.tx)
        .await?;

        let ids: Vec<i64> = wager.options.iter().map(|o| o.id).collect();
        let totals: Vec<i64> = wager.options.iter().map(|o| o.total_staked).collect();
        sqlx::query(
            r#"
            UPDATE group_wager_options AS o
            SET total_staked = data.total
            FROM UNNEST($1::BIGINT[], $2::BIGINT[]) AS data(id, total)
            WHERE o.id = data.id
            "#,
        )
        .bind(&ids)
        .bind(&totals)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_participant(
        &mut self,
        group_wager_id: i64,
        account: AccountId,
    ) -> Result<Option<GroupWagerParticipant>, StoreError> {
        let participant = sqlx::query_as::<_, GroupWagerParticipant>(
            r#"
            SELECT group_wager_id, account, option_id, amount, payout
            FROM group_wager_participants
            WHERE group_wager_id = $1 AND account = $2
            "#,
        )
        .bind(group_wager_id)
        .bind(account)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(participant)
    }

    async fn upsert_participant(
        &mut self,
        participant: &GroupWagerParticipant,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO group_wager_participants (group_wager_id, account, option_id, amount, payout)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (group_wager_id, account)
            DO UPDATE SET option_id = EXCLUDED.option_id,
                          amount = EXCLUDED.amount,
                          payout = EXCLUDED.payout
            "#,
        )
        .bind(participant.group_wager_id)
        .bind(participant.account)
        .bind(participant.option_id)
        .bind(participant.amount)
        .bind(participant.payout)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn participants_for(
        &mut self,
        group_wager_id: i64,
    ) -> Result<Vec<GroupWagerParticipant>, StoreError> {
        let participants = sqlx::query_as::<_, GroupWagerParticipant>(
            r#"
            SELECT group_wager_id, account, option_id, amount, payout
            FROM group_wager_participants
            WHERE group_wager_id = $1
            ORDER BY account
            "#,
        )
        .bind(group_wager_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(participants)
    }

    async fn active_group_wagers(&mut self) -> Result<Vec<GroupWager>, StoreError> {
        let sql = format!(
            "SELECT {GROUP_WAGER_COLUMNS} FROM group_wagers WHERE state = 'active' ORDER BY id"
        );
        let rows = sqlx::query_as::<_, GroupWagerRow>(&sql)
            .fetch_all(&mut *self.tx)
            .await?;
        self.with_options(rows).await
    }

    async fn expired_open_group_wagers(
        &mut self,
        now: OffsetDateTime,
    ) -> Result<Vec<i64>, StoreError> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id FROM group_wagers
            WHERE state = 'active'
              AND voting_closed_at IS NULL
              AND voting_deadline < $1
            ORDER BY id
            "#,
        )
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::CommitFailed(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
