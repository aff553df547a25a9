//! Balance queries, transfers and administrative adjustments.

use crate::entities::{AccountBalance, AccountId, EntryKind, LedgerEntry};
use crate::error::{EngineError, EngineResult};
use crate::uow::UnitOfWorkFactory;
use kanau::processor::Processor;

/// Upper bound on rows returned by history and leaderboard reads.
pub const MAX_PAGE_SIZE: i64 = 100;

fn page_size(limit: i64) -> EngineResult<i64> {
    if limit <= 0 {
        return Err(EngineError::InvalidInput(
            "limit must be positive".to_string(),
        ));
    }
    Ok(limit.min(MAX_PAGE_SIZE))
}

#[derive(Clone)]
pub struct AccountService {
    uow: UnitOfWorkFactory,
}

impl AccountService {
    pub fn new(uow: UnitOfWorkFactory) -> Self {
        Self { uow }
    }
}

/// Balance of one account, opening it on first touch.
#[derive(Debug, Clone)]
pub struct GetBalance {
    pub account: AccountId,
}

impl Processor<GetBalance> for AccountService {
    type Output = AccountBalance;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "Accounts:GetBalance")]
    async fn process(&self, cmd: GetBalance) -> EngineResult<AccountBalance> {
        let mut uow = self.uow.begin().await?;
        let balance = uow.ledger().balance(cmd.account).await?;
        uow.commit().await?;
        Ok(balance)
    }
}

#[derive(Debug, Clone)]
pub struct Transfer {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub from: AccountBalance,
    pub to: AccountBalance,
}

impl Processor<Transfer> for AccountService {
    type Output = TransferReceipt;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "Accounts:Transfer")]
    async fn process(&self, cmd: Transfer) -> EngineResult<TransferReceipt> {
        if cmd.from == cmd.to {
            return Err(EngineError::InvalidInput(
                "cannot transfer to the same account".to_string(),
            ));
        }
        if cmd.amount <= 0 {
            return Err(EngineError::InvalidInput(
                "transfer amount must be positive".to_string(),
            ));
        }

        let mut uow = self.uow.begin().await?;
        let mut ledger = uow.ledger();
        ledger.lock_accounts(&[cmd.from, cmd.to]).await?;
        let from = ledger
            .apply(cmd.from, -cmd.amount, EntryKind::TransferOut)
            .await?;
        let to = ledger
            .apply(cmd.to, cmd.amount, EntryKind::TransferIn)
            .await?;
        uow.commit().await?;

        tracing::info!(from = %cmd.from, to = %cmd.to, amount = cmd.amount, "Transfer completed");
        Ok(TransferReceipt {
            from: from.balance,
            to: to.balance,
        })
    }
}

/// Administrative credit or debit. `admin` must be on the resolver list.
#[derive(Debug, Clone)]
pub struct Grant {
    pub admin: AccountId,
    pub account: AccountId,
    pub amount: i64,
}

impl Processor<Grant> for AccountService {
    type Output = AccountBalance;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "Accounts:Grant")]
    async fn process(&self, cmd: Grant) -> EngineResult<AccountBalance> {
        if cmd.amount == 0 {
            return Err(EngineError::InvalidInput(
                "adjustment amount must not be zero".to_string(),
            ));
        }
        let mut uow = self.uow.begin().await?;
        if !uow.config().is_resolver(cmd.admin) {
            return Err(EngineError::NotAuthorized(format!(
                "account {} may not adjust balances",
                cmd.admin
            )));
        }
        let posting = uow
            .ledger()
            .apply(cmd.account, cmd.amount, EntryKind::AdminAdjustment)
            .await?;
        uow.commit().await?;

        tracing::info!(admin = %cmd.admin, account = %cmd.account, amount = cmd.amount, "Balance adjusted");
        Ok(posting.balance)
    }
}

/// Newest-first ledger entries of one account.
#[derive(Debug, Clone)]
pub struct LedgerHistory {
    pub account: AccountId,
    pub limit: i64,
}

impl Processor<LedgerHistory> for AccountService {
    type Output = Vec<LedgerEntry>;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "Accounts:LedgerHistory")]
    async fn process(&self, cmd: LedgerHistory) -> EngineResult<Vec<LedgerEntry>> {
        let limit = page_size(cmd.limit)?;
        let mut uow = self.uow.begin().await?;
        let entries = uow.store().entries_for(cmd.account, limit).await?;
        uow.rollback().await?;
        Ok(entries)
    }
}

/// Accounts by balance, highest first.
#[derive(Debug, Clone)]
pub struct Leaderboard {
    pub limit: i64,
}

impl Processor<Leaderboard> for AccountService {
    type Output = Vec<AccountBalance>;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "Accounts:Leaderboard")]
    async fn process(&self, cmd: Leaderboard) -> EngineResult<Vec<AccountBalance>> {
        let limit = page_size(cmd.limit)?;
        let mut uow = self.uow.begin().await?;
        let accounts = uow.store().top_accounts(limit).await?;
        uow.rollback().await?;
        Ok(accounts.iter().map(|a| a.view()).collect())
    }
}

/// Compare the stored balance with the sum of the account's ledger entries.
#[derive(Debug, Clone)]
pub struct VerifyLedger {
    pub account: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAudit {
    pub account: AccountId,
    pub balance: i64,
    pub entry_sum: i64,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.entry_sum
    }
}

impl Processor<VerifyLedger> for AccountService {
    type Output = LedgerAudit;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "Accounts:VerifyLedger")]
    async fn process(&self, cmd: VerifyLedger) -> EngineResult<LedgerAudit> {
        let mut uow = self.uow.begin().await?;
        let account = uow
            .store()
            .get_account(cmd.account)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("account {}", cmd.account)))?;
        let entry_sum = uow.store().entry_sum(cmd.account).await?;
        uow.rollback().await?;

        let audit = LedgerAudit {
            account: cmd.account,
            balance: account.balance,
            entry_sum,
        };
        if !audit.is_consistent() {
            tracing::error!(
                account = %cmd.account,
                balance = audit.balance,
                entry_sum = audit.entry_sum,
                "Ledger does not replay to the stored balance"
            );
        }
        Ok(audit)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::testing::{Harness, RESOLVER};

    #[tokio::test]
    async fn test_transfer_moves_funds_between_accounts() {
        let harness = Harness::new();
        let accounts = harness.accounts();

        let receipt = accounts
            .process(Transfer {
                from: AccountId(2),
                to: AccountId(1),
                amount: 250,
            })
            .await
            .unwrap();
        assert_eq!(receipt.from.balance, 750);
        assert_eq!(receipt.to.balance, 1250);

        let err = accounts
            .process(Transfer {
                from: AccountId(2),
                to: AccountId(1),
                amount: 751,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientFunds {
                available: 750,
                required: 751
            }
        ));

        let err = accounts
            .process(Transfer {
                from: AccountId(1),
                to: AccountId(1),
                amount: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        harness.assert_replays(AccountId(1)).await;
        harness.assert_replays(AccountId(2)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposing_transfers_do_not_deadlock() {
        let harness = Harness::new();
        let accounts = harness.accounts();

        for _ in 0..50 {
            let forward = accounts.clone();
            let backward = accounts.clone();
            let (a, b) = tokio::time::timeout(std::time::Duration::from_secs(5), async {
                tokio::join!(
                    tokio::spawn(async move {
                        forward
                            .process(Transfer {
                                from: AccountId(1),
                                to: AccountId(2),
                                amount: 3,
                            })
                            .await
                    }),
                    tokio::spawn(async move {
                        backward
                            .process(Transfer {
                                from: AccountId(2),
                                to: AccountId(1),
                                amount: 5,
                            })
                            .await
                    }),
                )
            })
            .await
            .expect("opposing transfers deadlocked");
            a.unwrap().unwrap();
            b.unwrap().unwrap();
        }

        assert_eq!(harness.balance(AccountId(1)).await.unwrap().balance, 1100);
        assert_eq!(harness.balance(AccountId(2)).await.unwrap().balance, 900);
        harness.assert_replays(AccountId(1)).await;
        harness.assert_replays(AccountId(2)).await;
    }

    #[tokio::test]
    async fn test_grant_requires_admin_and_respects_available() {
        let harness = Harness::new();
        let accounts = harness.accounts();

        let err = accounts
            .process(Grant {
                admin: AccountId(5),
                account: AccountId(5),
                amount: 100,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAuthorized(_)));
        assert!(harness.balance(AccountId(5)).await.is_none());

        let balance = accounts
            .process(Grant {
                admin: RESOLVER,
                account: AccountId(5),
                amount: 100,
            })
            .await
            .unwrap();
        assert_eq!(balance.balance, 1100);

        let err = accounts
            .process(Grant {
                admin: RESOLVER,
                account: AccountId(5),
                amount: -1101,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));

        let audit = accounts
            .process(VerifyLedger {
                account: AccountId(5),
            })
            .await
            .unwrap();
        assert!(audit.is_consistent());
        assert_eq!(audit.entry_sum, 1100);
    }

    #[tokio::test]
    async fn test_history_and_leaderboard_ordering() {
        let harness = Harness::new();
        let accounts = harness.accounts();
        for (id, amount) in [(1, 10), (2, 300), (3, 300)] {
            accounts
                .process(Grant {
                    admin: RESOLVER,
                    account: AccountId(id),
                    amount,
                })
                .await
                .unwrap();
        }

        let board = accounts.process(Leaderboard { limit: 10 }).await.unwrap();
        let ids: Vec<i64> = board.iter().map(|b| b.account.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let history = accounts
            .process(LedgerHistory {
                account: AccountId(2),
                limit: 1,
            })
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, EntryKind::AdminAdjustment);
        assert_eq!(history[0].resulting_balance, 1300);

        let err = accounts.process(Leaderboard { limit: 0 }).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
