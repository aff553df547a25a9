//! Solo probability bets with a daily stake cap.

use crate::entities::{AccountId, EntryKind, NewBet};
use crate::error::{EngineError, EngineResult};
use crate::uow::UnitOfWorkFactory;
use crate::utils::daily_window::{DailyAllowance, last_reset_boundary};
use crate::utils::outcome::{OutcomeSource, is_win};
use crate::utils::payout::fair_odds_payout;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

#[derive(Clone)]
pub struct BettingEngine {
    uow: UnitOfWorkFactory,
    outcomes: Arc<dyn OutcomeSource>,
}

impl BettingEngine {
    pub fn new(uow: UnitOfWorkFactory, outcomes: Arc<dyn OutcomeSource>) -> Self {
        Self { uow, outcomes }
    }
}

/// Bet `stake` on an event the caller claims happens with `win_probability`.
#[derive(Debug, Clone)]
pub struct PlaceBet {
    pub account: AccountId,
    pub win_probability: Decimal,
    pub stake: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetOutcome {
    pub bet_id: i64,
    pub won: bool,
    /// Net winnings on a win, zero on a loss.
    pub payout: i64,
    pub new_balance: i64,
    pub available: i64,
}

impl Processor<PlaceBet> for BettingEngine {
    type Output = BetOutcome;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "Betting:PlaceBet")]
    async fn process(&self, cmd: PlaceBet) -> EngineResult<BetOutcome> {
        if cmd.stake <= 0 {
            return Err(EngineError::InvalidInput(
                "stake must be positive".to_string(),
            ));
        }
        if cmd.win_probability <= Decimal::ZERO || cmd.win_probability >= Decimal::ONE {
            return Err(EngineError::InvalidInput(
                "win probability must be strictly between 0 and 1".to_string(),
            ));
        }
        let probability = cmd.win_probability.to_f64().ok_or_else(|| {
            EngineError::InvalidInput("win probability is not representable".to_string())
        })?;

        let mut uow = self.uow.begin().await?;
        let now = uow.now();
        let cap = uow.config().daily_stake_cap;
        let reset_hour = uow.config().daily_reset_hour;

        let balance = uow.ledger().balance(cmd.account).await?;
        if cmd.stake > balance.available {
            return Err(EngineError::InsufficientFunds {
                available: balance.available,
                required: cmd.stake,
            });
        }

        let since = last_reset_boundary(now, reset_hour);
        let spent = uow.store().staked_since(cmd.account, since).await?;
        let allowance = DailyAllowance::new(cap, spent);
        if !allowance.permits(cmd.stake) {
            return Err(EngineError::DailyLimitExceeded {
                remaining: allowance.remaining,
            });
        }

        let won = is_win(self.outcomes.roll(), probability);
        let (payout, delta, kind) = if won {
            let payout = fair_odds_payout(cmd.stake, cmd.win_probability)
                .ok_or_else(|| EngineError::InvalidInput("payout out of range".to_string()))?;
            (payout, payout, EntryKind::BetWin)
        } else {
            (0, -cmd.stake, EntryKind::BetLoss)
        };

        let posting = uow.ledger().apply(cmd.account, delta, kind).await?;
        let bet = uow
            .store()
            .insert_bet(NewBet {
                account: cmd.account,
                stake: cmd.stake,
                win_probability: cmd.win_probability,
                won,
                payout,
                created_at: now,
            })
            .await?;
        uow.commit().await?;

        tracing::info!(
            bet_id = bet.id,
            account = %cmd.account,
            stake = cmd.stake,
            win_probability = %cmd.win_probability,
            won,
            payout,
            "Bet settled"
        );
        Ok(BetOutcome {
            bet_id: bet.id,
            won,
            payout,
            new_balance: posting.balance.balance,
            available: posting.balance.available,
        })
    }
}

/// How much of today's allowance is left, and whether `proposed_stake` fits.
#[derive(Debug, Clone)]
pub struct CheckDailyLimit {
    pub account: AccountId,
    pub proposed_stake: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyLimitStatus {
    pub cap: i64,
    pub spent: i64,
    pub remaining: i64,
    pub permitted: bool,
}

impl Processor<CheckDailyLimit> for BettingEngine {
    type Output = DailyLimitStatus;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "Betting:CheckDailyLimit")]
    async fn process(&self, cmd: CheckDailyLimit) -> EngineResult<DailyLimitStatus> {
        let mut uow = self.uow.begin().await?;
        let since = last_reset_boundary(uow.now(), uow.config().daily_reset_hour);
        let cap = uow.config().daily_stake_cap;
        let spent = uow.store().staked_since(cmd.account, since).await?;
        uow.rollback().await?;

        let allowance = DailyAllowance::new(cap, spent);
        Ok(DailyLimitStatus {
            cap: allowance.cap,
            spent: allowance.spent,
            remaining: allowance.remaining,
            permitted: allowance.permits(cmd.proposed_stake),
        })
    }
}
