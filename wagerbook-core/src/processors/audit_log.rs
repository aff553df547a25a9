use crate::events::{Event, EventKind, Subscriber};
use async_trait::async_trait;
use tracing::info;

/// Writes every committed event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLog;

#[async_trait]
impl Subscriber for AuditLog {
    fn name(&self) -> &'static str {
        "audit_log"
    }

    fn interested_in(&self, _kind: EventKind) -> bool {
        true
    }

    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        match event {
            Event::BalanceChanged {
                account,
                delta,
                balance,
                available,
                kind,
            } => {
                info!(target: "audit", %account, delta, balance, available, %kind, "balance changed");
            }
            Event::WagerStateChanged {
                wager_id,
                state,
                winner,
            } => {
                info!(target: "audit", wager_id, ?state, ?winner, "wager state changed");
            }
            Event::GroupWagerStateChanged {
                group_wager_id,
                state,
                voting_closed,
                message_ref,
            } => {
                info!(
                    target: "audit",
                    group_wager_id,
                    ?state,
                    voting_closed,
                    ?message_ref,
                    "group wager state changed"
                );
            }
            Event::GroupWagerStaked {
                group_wager_id,
                option_id,
                account,
                total_pot,
                ..
            } => {
                info!(target: "audit", group_wager_id, option_id, %account, total_pot, "group wager staked");
            }
        }
        Ok(())
    }
}
