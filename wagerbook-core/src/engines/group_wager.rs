//! Multi-option pooled wagers.
//!
//! Participants stake on one option each. When a resolver names the winning
//! option, the whole pot is shared among its backers in proportion to their
//! stakes, rounded down. Losing stakes are forfeited and the rounding dust
//! stays unallocated.

use crate::entities::{
    AccountBalance, AccountId, EntryKind, GroupWager, GroupWagerParticipant, GroupWagerState,
    MessageRef, NewGroupWager,
};
use crate::error::{EngineError, EngineResult};
use crate::events::Event;
use crate::uow::{UnitOfWork, UnitOfWorkFactory};
use crate::utils::payout::pooled_payout;
use kanau::processor::Processor;
use wagerbook_sdk::objects::OptionOdds;

#[derive(Clone)]
pub struct GroupWagerEngine {
    uow: UnitOfWorkFactory,
}

impl GroupWagerEngine {
    pub fn new(uow: UnitOfWorkFactory) -> Self {
        Self { uow }
    }
}

async fn lock_existing(uow: &mut UnitOfWork, group_wager_id: i64) -> EngineResult<GroupWager> {
    uow.store()
        .lock_group_wager(group_wager_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("group wager {group_wager_id}")))
}

fn require_active(wager: &GroupWager) -> EngineResult<()> {
    if wager.state != GroupWagerState::Active {
        return Err(EngineError::InvalidState(format!(
            "group wager {} is {:?}",
            wager.id, wager.state
        )));
    }
    Ok(())
}

fn state_changed(wager: &GroupWager, voting_closed: bool) -> Event {
    Event::GroupWagerStateChanged {
        group_wager_id: wager.id,
        state: wager.state,
        voting_closed,
        message_ref: wager.message_ref,
    }
}

#[derive(Debug, Clone)]
pub struct CreateGroupWager {
    pub creator: AccountId,
    pub condition: String,
    pub options: Vec<String>,
    pub voting_period: time::Duration,
    pub min_participants: i32,
}

impl Processor<CreateGroupWager> for GroupWagerEngine {
    type Output = GroupWager;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "GroupWager:Create")]
    async fn process(&self, cmd: CreateGroupWager) -> EngineResult<GroupWager> {
        let mut uow = self.uow.begin().await?;
        let limits = uow.config().group_wager.clone();

        let condition = cmd.condition.trim();
        if condition.is_empty() {
            return Err(EngineError::InvalidInput(
                "condition must not be empty".to_string(),
            ));
        }
        let (min_options, max_options) = limits.option_bounds();
        if cmd.options.len() < min_options || cmd.options.len() > max_options {
            return Err(EngineError::InvalidInput(format!(
                "a group wager needs between {min_options} and {max_options} options"
            )));
        }
        let option_texts: Vec<String> = cmd.options.iter().map(|t| t.trim().to_string()).collect();
        if option_texts.iter().any(|t| t.is_empty()) {
            return Err(EngineError::InvalidInput(
                "option text must not be empty".to_string(),
            ));
        }
        if cmd.voting_period < limits.min_voting_period
            || cmd.voting_period > limits.max_voting_period
        {
            return Err(EngineError::InvalidInput(format!(
                "voting period must be between {} and {}",
                limits.min_voting_period, limits.max_voting_period
            )));
        }
        if cmd.min_participants < 1 {
            return Err(EngineError::InvalidInput(
                "at least one participant is required".to_string(),
            ));
        }

        let now = uow.now();
        let wager = uow
            .store()
            .insert_group_wager(NewGroupWager {
                creator: cmd.creator,
                condition: condition.to_string(),
                option_texts,
                min_participants: cmd.min_participants,
                voting_deadline: now + cmd.voting_period,
                created_at: now,
            })
            .await?;
        uow.publish(state_changed(&wager, false));
        uow.commit().await?;

        tracing::info!(
            group_wager_id = wager.id,
            creator = %cmd.creator,
            options = wager.options.len(),
            voting_deadline = %wager.voting_deadline,
            "Group wager created"
        );
        Ok(wager)
    }
}

#[derive(Debug, Clone)]
pub struct PlaceGroupBet {
    pub group_wager_id: i64,
    pub account: AccountId,
    pub option_id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStakeReceipt {
    pub participant: GroupWagerParticipant,
    pub total_pot: i64,
    pub odds: Vec<OptionOdds>,
    pub balance: AccountBalance,
}

impl Processor<PlaceGroupBet> for GroupWagerEngine {
    type Output = GroupStakeReceipt;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "GroupWager:PlaceBet")]
    async fn process(&self, cmd: PlaceGroupBet) -> EngineResult<GroupStakeReceipt> {
        let mut uow = self.uow.begin().await?;
        let mut wager = lock_existing(&mut uow, cmd.group_wager_id).await?;
        if wager.option(cmd.option_id).is_none() {
            return Err(EngineError::NotFound(format!(
                "option {} on group wager {}",
                cmd.option_id, wager.id
            )));
        }
        require_active(&wager)?;
        if !wager.is_voting_open(uow.now()) {
            return Err(EngineError::InvalidState(format!(
                "voting on group wager {} has closed",
                wager.id
            )));
        }
        if cmd.amount <= 0 {
            return Err(EngineError::InvalidInput(
                "amount must be positive".to_string(),
            ));
        }

        let existing = uow.store().get_participant(wager.id, cmd.account).await?;
        if existing
            .as_ref()
            .is_some_and(|p| p.option_id != cmd.option_id)
        {
            return Err(EngineError::InvalidState(
                "already staked on a different option".to_string(),
            ));
        }

        // The hold bounds the stake by the available balance before any totals grow.
        let posting = uow.ledger().hold(cmd.account, cmd.amount).await?;
        let participant = match existing {
            Some(p) => GroupWagerParticipant {
                amount: p.amount.checked_add(cmd.amount).ok_or_else(|| {
                    EngineError::InvalidInput("stake total out of range".to_string())
                })?,
                ..p
            },
            None => GroupWagerParticipant {
                group_wager_id: wager.id,
                account: cmd.account,
                option_id: cmd.option_id,
                amount: cmd.amount,
                payout: None,
            },
        };
        uow.store().upsert_participant(&participant).await?;
        if let Some(option) = wager.option_mut(cmd.option_id) {
            option.total_staked += cmd.amount;
        }
        uow.store().update_group_wager(&wager).await?;

        let total_pot = wager.total_pot();
        uow.publish(Event::GroupWagerStaked {
            group_wager_id: wager.id,
            option_id: cmd.option_id,
            account: cmd.account,
            total_pot,
            message_ref: wager.message_ref,
        });
        uow.commit().await?;

        tracing::info!(
            group_wager_id = wager.id,
            account = %cmd.account,
            option_id = cmd.option_id,
            amount = cmd.amount,
            total_pot,
            "Group wager stake placed"
        );
        Ok(GroupStakeReceipt {
            participant,
            total_pot,
            odds: wager.odds(),
            balance: posting.balance,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResolveGroupWager {
    pub group_wager_id: i64,
    pub resolver: AccountId,
    pub winning_option_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantPayout {
    pub account: AccountId,
    pub option_id: i64,
    pub amount: i64,
    /// Credited on top of the released stake's principal; zero for losers.
    pub payout: i64,
    /// Change in balance: `payout - amount`.
    pub net: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupWagerSettlement {
    pub group_wager: GroupWager,
    pub payouts: Vec<ParticipantPayout>,
    pub total_pot: i64,
    /// Part of the pot lost to rounding down.
    pub dust: i64,
}

impl Processor<ResolveGroupWager> for GroupWagerEngine {
    type Output = GroupWagerSettlement;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "GroupWager:Resolve")]
    async fn process(&self, cmd: ResolveGroupWager) -> EngineResult<GroupWagerSettlement> {
        let mut uow = self.uow.begin().await?;
        if !uow.config().is_resolver(cmd.resolver) {
            return Err(EngineError::NotAuthorized(format!(
                "account {} may not resolve group wagers",
                cmd.resolver
            )));
        }
        let mut wager = lock_existing(&mut uow, cmd.group_wager_id).await?;
        require_active(&wager)?;
        let winning_total = wager
            .option(cmd.winning_option_id)
            .map(|o| o.total_staked)
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "option {} on group wager {}",
                    cmd.winning_option_id, wager.id
                ))
            })?;
        if winning_total <= 0 {
            return Err(EngineError::InvalidState(
                "nobody staked on the winning option; cancel instead".to_string(),
            ));
        }
        let participants = uow.store().participants_for(wager.id).await?;
        if participants.len() < wager.min_participants.max(1) as usize {
            return Err(EngineError::InvalidState(format!(
                "{} of {} required participants",
                participants.len(),
                wager.min_participants
            )));
        }

        let total_pot = wager.total_pot();
        let accounts: Vec<AccountId> = participants.iter().map(|p| p.account).collect();
        let mut payouts = Vec::with_capacity(participants.len());
        let mut settled = Vec::with_capacity(participants.len());
        {
            let mut ledger = uow.ledger();
            ledger.lock_accounts(&accounts).await?;
            for participant in participants {
                let (payout, kind) = if participant.option_id == cmd.winning_option_id {
                    let payout = pooled_payout(participant.amount, total_pot, winning_total);
                    (payout, EntryKind::GroupWagerPayout)
                } else {
                    (0, EntryKind::GroupWagerLoss)
                };
                let net = payout - participant.amount;
                ledger
                    .settle(participant.account, participant.amount, net, kind)
                    .await?;
                payouts.push(ParticipantPayout {
                    account: participant.account,
                    option_id: participant.option_id,
                    amount: participant.amount,
                    payout,
                    net,
                });
                settled.push(GroupWagerParticipant {
                    payout: Some(payout),
                    ..participant
                });
            }
        }
        for participant in &settled {
            uow.store().upsert_participant(participant).await?;
        }

        let paid: i64 = payouts.iter().map(|p| p.payout).sum();
        let dust = total_pot - paid;
        wager.state = GroupWagerState::Resolved;
        wager.winning_option = Some(cmd.winning_option_id);
        uow.store().update_group_wager(&wager).await?;
        uow.publish(state_changed(&wager, true));
        uow.commit().await?;

        tracing::info!(
            group_wager_id = wager.id,
            winning_option = cmd.winning_option_id,
            total_pot,
            dust,
            participants = payouts.len(),
            "Group wager resolved"
        );
        Ok(GroupWagerSettlement {
            group_wager: wager,
            payouts,
            total_pot,
            dust,
        })
    }
}

/// Abandon a wager and return every stake. Allowed for the creator or a resolver.
#[derive(Debug, Clone)]
pub struct CancelGroupWager {
    pub group_wager_id: i64,
    pub requester: AccountId,
}

impl Processor<CancelGroupWager> for GroupWagerEngine {
    type Output = GroupWager;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "GroupWager:Cancel")]
    async fn process(&self, cmd: CancelGroupWager) -> EngineResult<GroupWager> {
        let mut uow = self.uow.begin().await?;
        let mut wager = lock_existing(&mut uow, cmd.group_wager_id).await?;
        if cmd.requester != wager.creator && !uow.config().is_resolver(cmd.requester) {
            return Err(EngineError::NotAuthorized(
                "only the creator or a resolver can cancel".to_string(),
            ));
        }
        require_active(&wager)?;

        let participants = uow.store().participants_for(wager.id).await?;
        let accounts: Vec<AccountId> = participants.iter().map(|p| p.account).collect();
        {
            let mut ledger = uow.ledger();
            ledger.lock_accounts(&accounts).await?;
            for participant in &participants {
                ledger.release(participant.account, participant.amount).await?;
            }
        }

        wager.state = GroupWagerState::Cancelled;
        uow.store().update_group_wager(&wager).await?;
        uow.publish(state_changed(&wager, true));
        uow.commit().await?;

        tracing::info!(
            group_wager_id = wager.id,
            requester = %cmd.requester,
            refunded = participants.len(),
            "Group wager cancelled"
        );
        Ok(wager)
    }
}

/// Close voting on every wager whose deadline has passed.
///
/// Safe to run repeatedly: a wager is stamped once and later runs skip it.
#[derive(Debug, Clone, Default)]
pub struct TransitionExpiredWagers;

impl GroupWagerEngine {
    async fn close_voting(&self, group_wager_id: i64) -> EngineResult<bool> {
        let mut uow = self.uow.begin().await?;
        let mut wager = lock_existing(&mut uow, group_wager_id).await?;
        let now = uow.now();
        if !wager.is_awaiting_close(now) {
            return Ok(false);
        }
        wager.voting_closed_at = Some(now);
        uow.store().update_group_wager(&wager).await?;
        uow.publish(state_changed(&wager, true));
        uow.commit().await?;
        tracing::info!(group_wager_id, "Voting closed");
        Ok(true)
    }
}

impl Processor<TransitionExpiredWagers> for GroupWagerEngine {
    type Output = Vec<i64>;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "GroupWager:TransitionExpired")]
    async fn process(&self, _cmd: TransitionExpiredWagers) -> EngineResult<Vec<i64>> {
        let mut uow = self.uow.begin().await?;
        let now = uow.now();
        let candidates = uow.store().expired_open_group_wagers(now).await?;
        uow.rollback().await?;

        let mut closed = Vec::new();
        for id in candidates {
            match self.close_voting(id).await {
                Ok(true) => closed.push(id),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(group_wager_id = id, error = %e, "Failed to close voting, will retry next sweep");
                }
            }
        }
        tracing::debug!(closed = closed.len(), "Expiration sweep finished");
        Ok(closed)
    }
}

/// Remember where the presentation layer shows this wager.
#[derive(Debug, Clone)]
pub struct AttachMessage {
    pub group_wager_id: i64,
    pub message_ref: MessageRef,
}

impl Processor<AttachMessage> for GroupWagerEngine {
    type Output = GroupWager;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "GroupWager:AttachMessage")]
    async fn process(&self, cmd: AttachMessage) -> EngineResult<GroupWager> {
        let mut uow = self.uow.begin().await?;
        let mut wager = lock_existing(&mut uow, cmd.group_wager_id).await?;
        wager.message_ref = Some(cmd.message_ref);
        uow.store().update_group_wager(&wager).await?;
        uow.commit().await?;
        Ok(wager)
    }
}

#[derive(Debug, Clone)]
pub struct GetGroupWager {
    pub group_wager_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupWagerView {
    pub wager: GroupWager,
    pub participants: Vec<GroupWagerParticipant>,
    pub odds: Vec<OptionOdds>,
    pub total_pot: i64,
    pub voting_open: bool,
}

impl Processor<GetGroupWager> for GroupWagerEngine {
    type Output = GroupWagerView;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "GroupWager:Get")]
    async fn process(&self, cmd: GetGroupWager) -> EngineResult<GroupWagerView> {
        let mut uow = self.uow.begin().await?;
        let wager = uow
            .store()
            .get_group_wager(cmd.group_wager_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("group wager {}", cmd.group_wager_id)))?;
        let participants = uow.store().participants_for(wager.id).await?;
        let voting_open = wager.is_voting_open(uow.now());
        uow.rollback().await?;

        Ok(GroupWagerView {
            odds: wager.odds(),
            total_pot: wager.total_pot(),
            voting_open,
            participants,
            wager,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListActiveGroupWagers;

impl Processor<ListActiveGroupWagers> for GroupWagerEngine {
    type Output = Vec<GroupWager>;
    type Error = EngineError;

    #[tracing::instrument(skip_all, err, name = "GroupWager:ListActive")]
    async fn process(&self, _cmd: ListActiveGroupWagers) -> EngineResult<Vec<GroupWager>> {
        let mut uow = self.uow.begin().await?;
        let wagers = uow.store().active_group_wagers().await?;
        uow.rollback().await?;
        Ok(wagers)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::events::EventKind;
    use crate::storage::Store;
    use crate::testing::{Harness, RESOLVER, RecordingSubscriber, start_time};
    use std::sync::Arc;
    use time::Duration;

    const CREATOR: AccountId = AccountId(50);

    async fn create(engine: &GroupWagerEngine, options: &[&str], min_participants: i32) -> GroupWager {
        engine
            .process(CreateGroupWager {
                creator: CREATOR,
                condition: "who takes the cup".to_string(),
                options: options.iter().map(|o| o.to_string()).collect(),
                voting_period: Duration::hours(1),
                min_participants,
            })
            .await
            .unwrap()
    }

    async fn stake(
        engine: &GroupWagerEngine,
        wager: &GroupWager,
        account: i64,
        option_index: usize,
        amount: i64,
    ) -> EngineResult<GroupStakeReceipt> {
        engine
            .process(PlaceGroupBet {
                group_wager_id: wager.id,
                account: AccountId(account),
                option_id: wager.options[option_index].id,
                amount,
            })
            .await
    }

    #[tokio::test]
    async fn test_winner_takes_the_pot() {
        let harness = Harness::new();
        let engine = harness.group_wagers();
        let wager = create(&engine, &["A", "B"], 2).await;

        stake(&engine, &wager, 1, 0, 100).await.unwrap();
        let receipt = stake(&engine, &wager, 2, 1, 200).await.unwrap();
        assert_eq!(receipt.total_pot, 300);
        assert_eq!(receipt.odds[0].display_multiplier(), "3.00x");
        assert_eq!(receipt.odds[1].display_multiplier(), "1.50x");

        let settlement = engine
            .process(ResolveGroupWager {
                group_wager_id: wager.id,
                resolver: RESOLVER,
                winning_option_id: wager.options[0].id,
            })
            .await
            .unwrap();
        assert_eq!(settlement.total_pot, 300);
        assert_eq!(settlement.dust, 0);
        assert_eq!(settlement.group_wager.state, GroupWagerState::Resolved);
        let x = &settlement.payouts[0];
        assert_eq!((x.account, x.payout, x.net), (AccountId(1), 300, 200));
        let y = &settlement.payouts[1];
        assert_eq!((y.account, y.payout, y.net), (AccountId(2), 0, -200));

        let x = harness.balance(AccountId(1)).await.unwrap();
        let y = harness.balance(AccountId(2)).await.unwrap();
        assert_eq!((x.balance, x.reserved), (1200, 0));
        assert_eq!((y.balance, y.reserved), (800, 0));
        harness.assert_replays(AccountId(1)).await;
        harness.assert_replays(AccountId(2)).await;

        let view = engine
            .process(GetGroupWager {
                group_wager_id: wager.id,
            })
            .await
            .unwrap();
        assert_eq!(view.participants[0].payout, Some(300));
        assert_eq!(view.participants[1].payout, Some(0));
    }

    #[tokio::test]
    async fn test_rounding_dust_is_reported() {
        let harness = Harness::new();
        let engine = harness.group_wagers();
        let wager = create(&engine, &["A", "B"], 1).await;

        stake(&engine, &wager, 1, 0, 100).await.unwrap();
        stake(&engine, &wager, 2, 0, 50).await.unwrap();
        stake(&engine, &wager, 3, 1, 100).await.unwrap();

        let settlement = engine
            .process(ResolveGroupWager {
                group_wager_id: wager.id,
                resolver: RESOLVER,
                winning_option_id: wager.options[0].id,
            })
            .await
            .unwrap();
        let payouts: Vec<i64> = settlement.payouts.iter().map(|p| p.payout).collect();
        assert_eq!(payouts, vec![166, 83, 0]);
        assert_eq!(settlement.dust, 1);

        assert_eq!(harness.balance(AccountId(1)).await.unwrap().balance, 1066);
        assert_eq!(harness.balance(AccountId(2)).await.unwrap().balance, 1033);
        assert_eq!(harness.balance(AccountId(3)).await.unwrap().balance, 900);
    }

    #[tokio::test]
    async fn test_stake_rules() {
        let harness = Harness::new();
        let engine = harness.group_wagers();
        let wager = create(&engine, &["A", "B", "C"], 1).await;

        stake(&engine, &wager, 1, 0, 100).await.unwrap();
        let receipt = stake(&engine, &wager, 1, 0, 50).await.unwrap();
        assert_eq!(receipt.participant.amount, 150);
        assert_eq!(receipt.balance.reserved, 150);

        let err = stake(&engine, &wager, 1, 1, 10).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        let err = stake(&engine, &wager, 2, 1, 0).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        let err = stake(&engine, &wager, 2, 1, 5000).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));

        let err = engine
            .process(PlaceGroupBet {
                group_wager_id: wager.id,
                account: AccountId(2),
                option_id: 987_654,
                amount: 10,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        harness.clock.advance(Duration::hours(1) + Duration::seconds(1));
        let err = stake(&engine, &wager, 2, 1, 10).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_oversized_repeat_stake_is_rejected_for_funds() {
        let harness = Harness::new();
        let engine = harness.group_wagers();
        let wager = create(&engine, &["A", "B"], 1).await;

        stake(&engine, &wager, 1, 0, 10).await.unwrap();
        let err = stake(&engine, &wager, 1, 0, i64::MAX).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientFunds {
                available: 990,
                required: i64::MAX
            }
        ));

        let mut tx = harness.store.begin().await.unwrap();
        let participant = tx
            .get_participant(wager.id, AccountId(1))
            .await
            .unwrap()
            .unwrap();
        drop(tx);
        assert_eq!(participant.amount, 10);
        assert_eq!(harness.balance(AccountId(1)).await.unwrap().reserved, 10);
        harness.assert_replays(AccountId(1)).await;
    }

    #[tokio::test]
    async fn test_resolution_guards() {
        let harness = Harness::new();
        let engine = harness.group_wagers();
        let wager = create(&engine, &["A", "B", "C"], 2).await;
        stake(&engine, &wager, 1, 0, 100).await.unwrap();

        let resolve = |resolver, option_id| ResolveGroupWager {
            group_wager_id: wager.id,
            resolver,
            winning_option_id: option_id,
        };

        let err = engine.process(resolve(CREATOR, wager.options[0].id)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotAuthorized(_)));
        let err = engine.process(resolve(RESOLVER, wager.options[0].id)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        stake(&engine, &wager, 2, 1, 100).await.unwrap();
        let err = engine.process(resolve(RESOLVER, wager.options[2].id)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        let err = engine.process(resolve(RESOLVER, -1)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        // Resolution is allowed after the deadline.
        harness.clock.advance(Duration::days(1));
        engine.process(resolve(RESOLVER, wager.options[1].id)).await.unwrap();
        let err = engine.process(resolve(RESOLVER, wager.options[1].id)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_cancel_refunds_everyone() {
        let harness = Harness::new();
        let engine = harness.group_wagers();
        let wager = create(&engine, &["A", "B"], 1).await;
        stake(&engine, &wager, 1, 0, 100).await.unwrap();
        stake(&engine, &wager, 2, 1, 300).await.unwrap();

        let err = engine
            .process(CancelGroupWager {
                group_wager_id: wager.id,
                requester: AccountId(1),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAuthorized(_)));

        let cancelled = engine
            .process(CancelGroupWager {
                group_wager_id: wager.id,
                requester: CREATOR,
            })
            .await
            .unwrap();
        assert_eq!(cancelled.state, GroupWagerState::Cancelled);

        for id in [1, 2] {
            let balance = harness.balance(AccountId(id)).await.unwrap();
            assert_eq!((balance.balance, balance.reserved), (1000, 0));
            harness.assert_replays(AccountId(id)).await;
        }
        let active = engine.process(ListActiveGroupWagers).await.unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_creation_validation() {
        let harness = Harness::new();
        let engine = harness.group_wagers();
        let base = CreateGroupWager {
            creator: CREATOR,
            condition: "weather".to_string(),
            options: vec!["sun".to_string(), "rain".to_string()],
            voting_period: Duration::hours(1),
            min_participants: 1,
        };

        let cases = [
            CreateGroupWager {
                options: vec!["only".to_string()],
                ..base.clone()
            },
            CreateGroupWager {
                options: (0..11).map(|i| i.to_string()).collect(),
                ..base.clone()
            },
            CreateGroupWager {
                options: vec!["sun".to_string(), "  ".to_string()],
                ..base.clone()
            },
            CreateGroupWager {
                voting_period: Duration::seconds(5),
                ..base.clone()
            },
            CreateGroupWager {
                voting_period: Duration::days(8),
                ..base.clone()
            },
            CreateGroupWager {
                min_participants: 0,
                ..base.clone()
            },
            CreateGroupWager {
                condition: " ".to_string(),
                ..base.clone()
            },
        ];
        for cmd in cases {
            let err = engine.process(cmd).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidInput(_)));
        }

        let wager = engine.process(base).await.unwrap();
        assert_eq!(wager.options.len(), 2);
        assert_eq!(wager.options[1].text, "rain");
        assert_eq!(wager.voting_deadline, start_time() + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_expiration_sweep_is_idempotent() {
        let harness = Harness::new();
        let engine = harness.group_wagers();
        let wager = create(&engine, &["A", "B"], 1).await;
        engine
            .process(AttachMessage {
                group_wager_id: wager.id,
                message_ref: MessageRef {
                    channel_id: 7,
                    message_id: 8,
                },
            })
            .await
            .unwrap();

        let (recorder, mut seen) = RecordingSubscriber::only(&[EventKind::GroupWagerStateChanged]);
        harness.bus.subscribe(Arc::new(recorder));

        assert!(engine.process(TransitionExpiredWagers).await.unwrap().is_empty());

        harness.clock.advance(Duration::hours(2));
        let closed = engine.process(TransitionExpiredWagers).await.unwrap();
        assert_eq!(closed, vec![wager.id]);
        let again = engine.process(TransitionExpiredWagers).await.unwrap();
        assert!(again.is_empty());

        let event = seen.recv().await.unwrap();
        assert_eq!(
            event,
            Event::GroupWagerStateChanged {
                group_wager_id: wager.id,
                state: GroupWagerState::Active,
                voting_closed: true,
                message_ref: Some(MessageRef {
                    channel_id: 7,
                    message_id: 8
                }),
            }
        );

        let view = engine
            .process(GetGroupWager {
                group_wager_id: wager.id,
            })
            .await
            .unwrap();
        assert!(!view.voting_open);
        assert_eq!(view.wager.state, GroupWagerState::Active);
        assert!(view.wager.voting_closed_at.is_some());

        // A sentinel proves the second sweep staged nothing.
        engine
            .process(CancelGroupWager {
                group_wager_id: wager.id,
                requester: RESOLVER,
            })
            .await
            .unwrap();
        match seen.recv().await.unwrap() {
            Event::GroupWagerStateChanged { state, .. } => {
                assert_eq!(state, GroupWagerState::Cancelled)
            }
            other => unreachable!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_operations_notify_nobody() {
        let harness = Harness::new();
        let engine = harness.group_wagers();
        let wager = create(&engine, &["A", "B"], 1).await;

        let (recorder, mut seen) = RecordingSubscriber::all();
        harness.bus.subscribe(Arc::new(recorder));

        stake(&engine, &wager, 1, 0, 5000).await.unwrap_err();
        harness.store.fail_next_commit();
        let err = stake(&engine, &wager, 1, 0, 10).await.unwrap_err();
        assert_eq!(err.category(), wagerbook_sdk::objects::ErrorCategory::Transient);

        stake(&engine, &wager, 2, 1, 10).await.unwrap();
        let events = [
            seen.recv().await.unwrap(),
            seen.recv().await.unwrap(),
            seen.recv().await.unwrap(),
        ];
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::BalanceChanged,
                EventKind::BalanceChanged,
                EventKind::GroupWagerStaked
            ]
        );
        match &events[2] {
            Event::GroupWagerStaked {
                account, total_pot, ..
            } => {
                assert_eq!((*account, *total_pot), (AccountId(2), 10));
            }
            other => unreachable!("unexpected {other:?}"),
        }
        tokio::task::yield_now().await;
        assert!(seen.try_recv().is_err());
    }
}
