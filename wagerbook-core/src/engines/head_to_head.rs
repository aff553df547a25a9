//! Two-party wagers settled by community vote.
//!
//! Both stakes are held while the wager is open. Once enough votes are in
//! and one side strictly leads, the loser's stake moves to the winner in the
//! same unit of work as the deciding vote.

use crate::entities::{
    AccountBalance, AccountId, EntryKind, NewWager, VoteRecord, VoteTally, Wager, WagerState,
};
use crate::error::{EngineError, EngineResult};
use crate::events::Event;
use crate::uow::{UnitOfWork, UnitOfWorkFactory};
use kanau::processor::Processor;

#[derive(Clone)]
pub struct HeadToHeadEngine {
    uow: UnitOfWorkFactory,
}

impl HeadToHeadEngine {
    pub fn new(uow: UnitOfWorkFactory) -> Self {
        Self { uow }
    }
}

async fn lock_existing(uow: &mut UnitOfWork, wager_id: i64) -> EngineResult<Wager> {
    uow.store()
        .lock_wager(wager_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("wager {wager_id}")))
}

fn require_state(wager: &Wager, expected: WagerState) -> EngineResult<()> {
    if wager.state != expected {
        return Err(EngineError::InvalidState(format!(
            "wager {} is {:?}, expected {:?}",
            wager.id, wager.state, expected
        )));
    }
    Ok(())
}

/// Persist a state change and stage its notification.
async fn transition(
    uow: &mut UnitOfWork,
    wager: &mut Wager,
    state: WagerState,
    winner: Option<AccountId>,
) -> EngineResult<()> {
    wager.state = state;
    wager.winner = winner;
    wager.updated_at = uow.now();
    uow.store().update_wager(wager).await?;
    uow.publish(Event::WagerStateChanged {
        wager_id: wager.id,
        state,
        winner,
    });
    tracing::info!(wager_id = wager.id, state = ?state, winner = ?winner, "Wager state changed");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ProposeWager {
    pub proposer: AccountId,
    pub target: AccountId,
    pub stake: i64,
    pub condition: String,
}

impl Processor<ProposeWager> for HeadToHeadEngine {
    type Output = Wager;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "HeadToHead:Propose")]
    async fn process(&self, cmd: ProposeWager) -> EngineResult<Wager> {
        if cmd.proposer == cmd.target {
            return Err(EngineError::InvalidInput(
                "cannot wager against yourself".to_string(),
            ));
        }
        if cmd.stake <= 0 {
            return Err(EngineError::InvalidInput(
                "stake must be positive".to_string(),
            ));
        }
        let condition = cmd.condition.trim();
        if condition.is_empty() {
            return Err(EngineError::InvalidInput(
                "condition must not be empty".to_string(),
            ));
        }

        let mut uow = self.uow.begin().await?;
        uow.ledger().hold(cmd.proposer, cmd.stake).await?;
        let now = uow.now();
        let wager = uow
            .store()
            .insert_wager(NewWager {
                proposer: cmd.proposer,
                target: cmd.target,
                stake: cmd.stake,
                condition: condition.to_string(),
                created_at: now,
            })
            .await?;
        uow.publish(Event::WagerStateChanged {
            wager_id: wager.id,
            state: wager.state,
            winner: None,
        });
        uow.commit().await?;

        tracing::info!(
            wager_id = wager.id,
            proposer = %cmd.proposer,
            target = %cmd.target,
            stake = cmd.stake,
            "Wager proposed"
        );
        Ok(wager)
    }
}

/// The target accepts (voting opens) or declines (stake returned).
#[derive(Debug, Clone)]
pub struct RespondToWager {
    pub wager_id: i64,
    pub responder: AccountId,
    pub accept: bool,
}

impl Processor<RespondToWager> for HeadToHeadEngine {
    type Output = Wager;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "HeadToHead:Respond")]
    async fn process(&self, cmd: RespondToWager) -> EngineResult<Wager> {
        let mut uow = self.uow.begin().await?;
        let mut wager = lock_existing(&mut uow, cmd.wager_id).await?;
        if cmd.responder != wager.target {
            return Err(EngineError::NotAuthorized(
                "only the challenged account can respond".to_string(),
            ));
        }
        require_state(&wager, WagerState::Proposed)?;

        if cmd.accept {
            uow.ledger().hold(wager.target, wager.stake).await?;
            transition(&mut uow, &mut wager, WagerState::Voting, None).await?;
        } else {
            uow.ledger().release(wager.proposer, wager.stake).await?;
            transition(&mut uow, &mut wager, WagerState::Declined, None).await?;
        }
        uow.commit().await?;
        Ok(wager)
    }
}

/// A vote for which side won. Voting again replaces the earlier vote.
#[derive(Debug, Clone)]
pub struct CastVote {
    pub wager_id: i64,
    pub voter: AccountId,
    pub choice: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WagerSettlement {
    pub winner: AccountId,
    pub loser: AccountId,
    /// Returned to the winner: both stakes.
    pub payout: i64,
    pub winner_balance: AccountBalance,
    pub loser_balance: AccountBalance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOutcome {
    pub wager: Wager,
    pub tally: VoteTally,
    pub settlement: Option<WagerSettlement>,
}

impl Processor<CastVote> for HeadToHeadEngine {
    type Output = VoteOutcome;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "HeadToHead:CastVote")]
    async fn process(&self, cmd: CastVote) -> EngineResult<VoteOutcome> {
        let mut uow = self.uow.begin().await?;
        let mut wager = lock_existing(&mut uow, cmd.wager_id).await?;
        if !wager.is_side(cmd.choice) {
            return Err(EngineError::InvalidInput(
                "vote must name the proposer or the target".to_string(),
            ));
        }
        require_state(&wager, WagerState::Voting)?;

        uow.store()
            .upsert_vote(&VoteRecord {
                wager_id: wager.id,
                voter: cmd.voter,
                choice: cmd.choice,
            })
            .await?;
        let votes = uow.store().votes_for(wager.id).await?;
        let tally = VoteTally::count(&wager, &votes);
        tracing::debug!(
            wager_id = wager.id,
            for_proposer = tally.for_proposer,
            for_target = tally.for_target,
            "Vote recorded"
        );

        let quorum = uow.config().head_to_head_vote_quorum;
        let settlement = match tally.majority(&wager, quorum) {
            Some(winner) => {
                let loser = wager.opponent_of(winner).ok_or_else(|| {
                    EngineError::InvalidState(format!("{winner} is not a side of wager {}", wager.id))
                })?;
                let mut ledger = uow.ledger();
                ledger.lock_accounts(&[winner, loser]).await?;
                let loser_posting = ledger
                    .settle(loser, wager.stake, -wager.stake, EntryKind::WagerLoss)
                    .await?;
                let winner_posting = ledger
                    .settle(winner, wager.stake, wager.stake, EntryKind::WagerWin)
                    .await?;
                transition(&mut uow, &mut wager, WagerState::Resolved, Some(winner)).await?;
                Some(WagerSettlement {
                    winner,
                    loser,
                    payout: wager.stake * 2,
                    winner_balance: winner_posting.balance,
                    loser_balance: loser_posting.balance,
                })
            }
            None => None,
        };
        uow.commit().await?;

        Ok(VoteOutcome {
            wager,
            tally,
            settlement,
        })
    }
}

/// Withdraw a proposal the target has not answered yet.
#[derive(Debug, Clone)]
pub struct CancelWager {
    pub wager_id: i64,
    pub requester: AccountId,
}

impl Processor<CancelWager> for HeadToHeadEngine {
    type Output = Wager;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "HeadToHead:Cancel")]
    async fn process(&self, cmd: CancelWager) -> EngineResult<Wager> {
        let mut uow = self.uow.begin().await?;
        let mut wager = lock_existing(&mut uow, cmd.wager_id).await?;
        if cmd.requester != wager.proposer {
            return Err(EngineError::NotAuthorized(
                "only the proposer can cancel".to_string(),
            ));
        }
        require_state(&wager, WagerState::Proposed)?;

        uow.ledger().release(wager.proposer, wager.stake).await?;
        transition(&mut uow, &mut wager, WagerState::Cancelled, None).await?;
        uow.commit().await?;
        Ok(wager)
    }
}

#[derive(Debug, Clone)]
pub struct GetWager {
    pub wager_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WagerView {
    pub wager: Wager,
    pub tally: VoteTally,
    pub votes: Vec<VoteRecord>,
}

impl Processor<GetWager> for HeadToHeadEngine {
    type Output = WagerView;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "HeadToHead:GetWager")]
    async fn process(&self, cmd: GetWager) -> EngineResult<WagerView> {
        let mut uow = self.uow.begin().await?;
        let wager = uow
            .store()
            .get_wager(cmd.wager_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("wager {}", cmd.wager_id)))?;
        let votes = uow.store().votes_for(wager.id).await?;
        uow.rollback().await?;

        let tally = VoteTally::count(&wager, &votes);
        Ok(WagerView {
            wager,
            tally,
            votes,
        })
    }
}
