//! Balance mutations and their audit trail.
//!
//! Every call writes exactly one [`LedgerEntry`] and stages exactly one
//! `BalanceChanged` event, so replaying the entries of an account always
//! reproduces its balance. A [`Ledger`] only exists borrowed from a
//! [`UnitOfWork`](crate::uow::UnitOfWork); nothing here commits.

use crate::entities::{Account, AccountBalance, AccountId, EntryKind, LedgerEntry, NewLedgerEntry};
use crate::error::{EngineError, EngineResult};
use crate::events::{Event, StagedEvents};
use crate::storage::StoreTx;
use time::OffsetDateTime;

/// Result of one ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub entry: LedgerEntry,
    pub balance: AccountBalance,
}

/// How a single posting moves an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Movement {
    hold: i64,
    release: i64,
    delta: i64,
}

/// Apply `movement` to `account`, checking the reservation and funds rules.
fn moved(account: &Account, movement: Movement) -> EngineResult<Account> {
    if movement.hold < 0 || movement.release < 0 {
        return Err(EngineError::InvalidInput(
            "reservation amounts must not be negative".to_string(),
        ));
    }
    if movement.release > account.reserved {
        return Err(EngineError::InvalidState(format!(
            "account {} has {} reserved, cannot release {}",
            account.id, account.reserved, movement.release
        )));
    }

    let out_of_range = || EngineError::InvalidInput("amount out of range".to_string());
    let headroom = account
        .available()
        .checked_add(movement.release)
        .and_then(|free| free.checked_add(movement.delta))
        .ok_or_else(out_of_range)?;
    if movement.hold > headroom {
        return Err(EngineError::InsufficientFunds {
            available: account.available(),
            required: movement
                .hold
                .saturating_sub(movement.release.saturating_add(movement.delta)),
        });
    }

    let reserved = (account.reserved - movement.release)
        .checked_add(movement.hold)
        .ok_or_else(out_of_range)?;
    let balance = account
        .balance
        .checked_add(movement.delta)
        .ok_or_else(out_of_range)?;

    let available = balance - reserved;
    if available < 0 {
        return Err(EngineError::InsufficientFunds {
            available: account.available(),
            required: account.available() - available,
        });
    }

    Ok(Account {
        balance,
        reserved,
        ..account.clone()
    })
}

pub struct Ledger<'a> {
    tx: &'a mut dyn StoreTx,
    events: &'a mut StagedEvents,
    now: OffsetDateTime,
    starting_balance: i64,
}

impl<'a> Ledger<'a> {
    pub(crate) fn new(
        tx: &'a mut dyn StoreTx,
        events: &'a mut StagedEvents,
        now: OffsetDateTime,
        starting_balance: i64,
    ) -> Self {
        Self {
            tx,
            events,
            now,
            starting_balance,
        }
    }

    /// Lock (and open if needed) the account row.
    async fn open(&mut self, id: AccountId) -> EngineResult<Account> {
        let (account, created) = self
            .tx
            .lock_or_open_account(id, self.starting_balance, self.now)
            .await?;
        if created {
            tracing::info!(account = %id, starting_balance = self.starting_balance, "Account opened");
            if self.starting_balance != 0 {
                let entry = self
                    .tx
                    .append_entry(NewLedgerEntry {
                        account: id,
                        delta: self.starting_balance,
                        resulting_balance: account.balance,
                        kind: EntryKind::Grant,
                        created_at: self.now,
                    })
                    .await?;
                self.stage(&entry, &account);
            }
        }
        Ok(account)
    }

    fn stage(&mut self, entry: &LedgerEntry, account: &Account) {
        self.events.publish(Event::BalanceChanged {
            account: account.id,
            delta: entry.delta,
            balance: account.balance,
            available: account.available(),
            kind: entry.kind,
        });
    }

    async fn post(
        &mut self,
        id: AccountId,
        movement: Movement,
        kind: EntryKind,
    ) -> EngineResult<Posting> {
        let account = self.open(id).await?;
        let updated = moved(&account, movement)?;
        self.tx.update_account(&updated).await?;
        let entry = self
            .tx
            .append_entry(NewLedgerEntry {
                account: id,
                delta: movement.delta,
                resulting_balance: updated.balance,
                kind,
                created_at: self.now,
            })
            .await?;
        self.stage(&entry, &updated);
        tracing::debug!(
            account = %id,
            delta = movement.delta,
            hold = movement.hold,
            release = movement.release,
            kind = %kind,
            "Ledger posting"
        );
        Ok(Posting {
            entry,
            balance: updated.view(),
        })
    }

    /// Lock several accounts in ascending id order.
    ///
    /// Multi-account operations call this before touching any of them.
    pub async fn lock_accounts(&mut self, ids: &[AccountId]) -> EngineResult<()> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        for id in ids {
            self.open(id).await?;
        }
        Ok(())
    }

    pub async fn balance(&mut self, id: AccountId) -> EngineResult<AccountBalance> {
        Ok(self.open(id).await?.view())
    }

    /// Change the balance by `delta`.
    ///
    /// A negative delta fails with `InsufficientFunds` if it would take the
    /// available balance below zero.
    pub async fn apply(
        &mut self,
        id: AccountId,
        delta: i64,
        kind: EntryKind,
    ) -> EngineResult<Posting> {
        self.post(
            id,
            Movement {
                hold: 0,
                release: 0,
                delta,
            },
            kind,
        )
        .await
    }

    /// Reserve `amount` of the available balance.
    pub async fn hold(&mut self, id: AccountId, amount: i64) -> EngineResult<Posting> {
        self.post(
            id,
            Movement {
                hold: amount,
                release: 0,
                delta: 0,
            },
            EntryKind::ReservationHold,
        )
        .await
    }

    /// Return `amount` of a reservation to the available balance unchanged.
    pub async fn release(&mut self, id: AccountId, amount: i64) -> EngineResult<Posting> {
        self.post(
            id,
            Movement {
                hold: 0,
                release: amount,
                delta: 0,
            },
            EntryKind::ReservationRelease,
        )
        .await
    }

    /// Release a reservation and apply the outcome as a single entry.
    pub async fn settle(
        &mut self,
        id: AccountId,
        released: i64,
        delta: i64,
        kind: EntryKind,
    ) -> EngineResult<Posting> {
        self.post(
            id,
            Movement {
                hold: 0,
                release: released,
                delta,
            },
            kind,
        )
        .await
    }
}
