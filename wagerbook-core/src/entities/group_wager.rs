use crate::entities::AccountId;
use crate::utils::payout::option_multiplier;
use wagerbook_sdk::objects::OptionOdds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "group_wager_state", rename_all = "snake_case")]
pub enum GroupWagerState {
    /// Open, or voting-closed but not yet resolved.
    Active,
    Resolved,
    Cancelled,
}

/// Where the presentation layer displays a group wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GroupWagerOption {
    pub id: i64,
    pub group_wager_id: i64,
    pub text: String,
    #[sqlx(rename = "sort_order")]
    pub order: i32,
    pub total_staked: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupWager {
    pub id: i64,
    pub creator: AccountId,
    pub condition: String,
    /// Sorted by `order`; fixed at creation.
    pub options: Vec<GroupWagerOption>,
    pub min_participants: i32,
    pub voting_deadline: time::OffsetDateTime,
    pub state: GroupWagerState,
    pub winning_option: Option<i64>,
    /// Set by the expiration sweep once the deadline has passed.
    pub voting_closed_at: Option<time::OffsetDateTime>,
    pub message_ref: Option<MessageRef>,
    pub created_at: time::OffsetDateTime,
}

impl GroupWager {
    pub fn total_pot(&self) -> i64 {
        self.options.iter().map(|o| o.total_staked).sum()
    }

    pub fn option(&self, option_id: i64) -> Option<&GroupWagerOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    pub fn option_mut(&mut self, option_id: i64) -> Option<&mut GroupWagerOption> {
        self.options.iter_mut().find(|o| o.id == option_id)
    }

    /// Stakes are accepted only while active, not swept, and not past the deadline.
    pub fn is_voting_open(&self, now: time::OffsetDateTime) -> bool {
        self.state == GroupWagerState::Active
            && self.voting_closed_at.is_none()
            && now <= self.voting_deadline
    }

    /// Expired by the clock but not yet stamped by the sweep.
    pub fn is_awaiting_close(&self, now: time::OffsetDateTime) -> bool {
        self.state == GroupWagerState::Active
            && self.voting_closed_at.is_none()
            && now > self.voting_deadline
    }

    pub fn multiplier(&self, option_id: i64) -> Option<rust_decimal::Decimal> {
        let option = self.option(option_id)?;
        option_multiplier(self.total_pot(), option.total_staked)
    }

    pub fn odds(&self) -> Vec<OptionOdds> {
        let pot = self.total_pot();
        self.options
            .iter()
            .map(|option| OptionOdds {
                option_id: option.id,
                text: option.text.clone(),
                total_staked: option.total_staked,
                multiplier: option_multiplier(pot, option.total_staked),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroupWager {
    pub creator: AccountId,
    pub condition: String,
    pub option_texts: Vec<String>,
    pub min_participants: i32,
    pub voting_deadline: time::OffsetDateTime,
    pub created_at: time::OffsetDateTime,
}

/// One account's stake on a group wager. `payout` is set on resolution.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GroupWagerParticipant {
    pub group_wager_id: i64,
    pub account: AccountId,
    pub option_id: i64,
    pub amount: i64,
    pub payout: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use time::{Duration, OffsetDateTime};

    fn option(id: i64, total_staked: i64) -> GroupWagerOption {
        GroupWagerOption {
            id,
            group_wager_id: 1,
            text: format!("option {id}"),
            order: id as i32,
            total_staked,
        }
    }

    fn wager(options: Vec<GroupWagerOption>) -> GroupWager {
        let now = OffsetDateTime::UNIX_EPOCH;
        GroupWager {
            id: 1,
            creator: AccountId(1),
            condition: "who wins the final".to_string(),
            options,
            min_participants: 2,
            voting_deadline: now + Duration::hours(1),
            state: GroupWagerState::Active,
            winning_option: None,
            voting_closed_at: None,
            message_ref: None,
            created_at: now,
        }
    }

    #[test]
    fn test_multiplier_is_pot_over_option_stake() {
        let wager = wager(vec![option(1, 100), option(2, 200), option(3, 0)]);
        assert_eq!(wager.total_pot(), 300);
        assert_eq!(wager.multiplier(1), Some(Decimal::from(3)));
        assert_eq!(wager.multiplier(2), Some(Decimal::new(15, 1)));
        assert_eq!(wager.multiplier(3), None);
        assert_eq!(wager.multiplier(42), None);

        let odds = wager.odds();
        assert_eq!(odds.len(), 3);
        assert_eq!(odds[0].display_multiplier(), "3.00x");
        assert_eq!(odds[2].multiplier, None);
    }

    #[test]
    fn test_voting_window() {
        let mut wager = wager(vec![option(1, 0), option(2, 0)]);
        let deadline = wager.voting_deadline;
        assert!(wager.is_voting_open(deadline));
        assert!(!wager.is_voting_open(deadline + Duration::seconds(1)));
        assert!(wager.is_awaiting_close(deadline + Duration::seconds(1)));

        wager.voting_closed_at = Some(deadline + Duration::seconds(1));
        assert!(!wager.is_voting_open(deadline - Duration::minutes(5)));
        assert!(!wager.is_awaiting_close(deadline + Duration::minutes(5)));
    }
}
