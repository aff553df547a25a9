use crate::entities::AccountId;
use crate::events::{Event, EventKind, Subscriber};
use crate::storage::SharedStore;
use async_trait::async_trait;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopHolder {
    pub account: AccountId,
    pub balance: i64,
}

/// Keeps the current top balance holder on a `watch` channel.
///
/// Presentation layers use it for things like a "richest member" role; the
/// value is recomputed from storage after every balance change.
pub struct TopHolderTracker {
    store: SharedStore,
    sender: watch::Sender<Option<TopHolder>>,
}

impl TopHolderTracker {
    pub fn new(store: SharedStore) -> (Self, watch::Receiver<Option<TopHolder>>) {
        let (sender, receiver) = watch::channel(None);
        (Self { store, sender }, receiver)
    }

    /// Re-read the top account and publish it if it changed.
    pub async fn refresh(&self) -> anyhow::Result<Option<TopHolder>> {
        let mut tx = self.store.begin().await?;
        let top = tx.top_accounts(1).await?;
        tx.rollback().await?;

        let holder = top.first().map(|a| TopHolder {
            account: a.id,
            balance: a.balance,
        });
        let changed = self.sender.send_if_modified(|current| {
            if *current == holder {
                false
            } else {
                *current = holder;
                true
            }
        });
        if changed {
            tracing::info!(holder = ?holder, "Top holder changed");
        }
        Ok(holder)
    }
}

#[async_trait]
impl Subscriber for TopHolderTracker {
    fn name(&self) -> &'static str {
        "top_holder"
    }

    fn interested_in(&self, kind: EventKind) -> bool {
        kind == EventKind::BalanceChanged
    }

    async fn handle(&self, _event: Event) -> anyhow::Result<()> {
        self.refresh().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::engines::{Grant, Transfer};
    use crate::testing::{Harness, RESOLVER};
    use kanau::processor::Processor;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_tracks_the_richest_account() {
        let harness = Harness::new();
        let (tracker, mut holder) = TopHolderTracker::new(Arc::new(harness.store.clone()));
        harness.bus.subscribe(Arc::new(tracker));
        let accounts = harness.accounts();

        accounts
            .process(Grant {
                admin: RESOLVER,
                account: AccountId(3),
                amount: 500,
            })
            .await
            .unwrap();
        holder
            .wait_for(|h| h.map(|h| h.balance) == Some(1500))
            .await
            .unwrap();
        assert_eq!(holder.borrow().unwrap().account, AccountId(3));

        accounts
            .process(Transfer {
                from: AccountId(3),
                to: AccountId(4),
                amount: 800,
            })
            .await
            .unwrap();
        let top = *holder
            .wait_for(|h| h.map(|h| h.account) == Some(AccountId(4)))
            .await
            .unwrap();
        assert_eq!(top.unwrap().balance, 1800);
    }
}
