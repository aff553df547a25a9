use crate::entities::AccountId;

/// Lifecycle of a head-to-head wager.
///
/// `Proposed -> Voting | Declined | Cancelled`, `Voting -> Resolved`.
/// Acceptance opens voting in the same step, so there is no stored
/// "accepted" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "wager_state", rename_all = "snake_case")]
pub enum WagerState {
    Proposed,
    Voting,
    Declined,
    Resolved,
    Cancelled,
}

impl WagerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WagerState::Declined | WagerState::Resolved | WagerState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Wager {
    pub id: i64,
    pub proposer: AccountId,
    pub target: AccountId,
    pub stake: i64,
    pub condition: String,
    pub state: WagerState,
    pub winner: Option<AccountId>,
    pub created_at: time::OffsetDateTime,
    pub updated_at: time::OffsetDateTime,
}

impl Wager {
    pub fn is_side(&self, account: AccountId) -> bool {
        account == self.proposer || account == self.target
    }

    /// The other party of the wager, if `account` is one of them.
    pub fn opponent_of(&self, account: AccountId) -> Option<AccountId> {
        if account == self.proposer {
            Some(self.target)
        } else if account == self.target {
            Some(self.proposer)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWager {
    pub proposer: AccountId,
    pub target: AccountId,
    pub stake: i64,
    pub condition: String,
    pub created_at: time::OffsetDateTime,
}

/// A community vote on which side of a wager won. One per voter.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct VoteRecord {
    pub wager_id: i64,
    pub voter: AccountId,
    pub choice: AccountId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub for_proposer: u32,
    pub for_target: u32,
}

impl VoteTally {
    pub fn count(wager: &Wager, votes: &[VoteRecord]) -> Self {
        votes
            .iter()
            .filter(|vote| vote.wager_id == wager.id)
            .fold(VoteTally::default(), |mut tally, vote| {
                if vote.choice == wager.proposer {
                    tally.for_proposer += 1;
                } else if vote.choice == wager.target {
                    tally.for_target += 1;
                }
                tally
            })
    }

    pub fn total(&self) -> u32 {
        self.for_proposer + self.for_target
    }

    /// The side with strictly more votes; `None` on a tie.
    pub fn leader(&self, wager: &Wager) -> Option<AccountId> {
        match self.for_proposer.cmp(&self.for_target) {
            std::cmp::Ordering::Greater => Some(wager.proposer),
            std::cmp::Ordering::Less => Some(wager.target),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// The winner once `quorum` votes are in and one side strictly leads.
    pub fn majority(&self, wager: &Wager, quorum: u32) -> Option<AccountId> {
        if self.total() < quorum.max(1) {
            return None;
        }
        self.leader(wager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wager() -> Wager {
        let now = time::OffsetDateTime::UNIX_EPOCH;
        Wager {
            id: 1,
            proposer: AccountId(10),
            target: AccountId(20),
            stake: 50,
            condition: "it rains tomorrow".to_string(),
            state: WagerState::Voting,
            winner: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn vote(voter: i64, choice: i64) -> VoteRecord {
        VoteRecord {
            wager_id: 1,
            voter: AccountId(voter),
            choice: AccountId(choice),
        }
    }

    #[test]
    fn test_tally_counts_each_side() {
        let wager = wager();
        let votes = vec![vote(1, 10), vote(2, 20), vote(3, 10)];
        let tally = VoteTally::count(&wager, &votes);
        assert_eq!(tally.for_proposer, 2);
        assert_eq!(tally.for_target, 1);
        assert_eq!(tally.leader(&wager), Some(AccountId(10)));
    }

    #[test]
    fn test_majority_needs_quorum_and_strict_lead() {
        let wager = wager();
        let lead = VoteTally {
            for_proposer: 3,
            for_target: 2,
        };
        assert_eq!(lead.majority(&wager, 5), Some(AccountId(10)));
        assert_eq!(lead.majority(&wager, 6), None);

        let tie = VoteTally {
            for_proposer: 3,
            for_target: 3,
        };
        assert_eq!(tie.majority(&wager, 2), None);

        let early = VoteTally {
            for_proposer: 3,
            for_target: 1,
        };
        assert_eq!(early.majority(&wager, 5), None);
    }

    #[test]
    fn test_quorum_of_one_resolves_on_first_lead() {
        let wager = wager();
        let first = VoteTally {
            for_proposer: 0,
            for_target: 1,
        };
        assert_eq!(first.majority(&wager, 1), Some(AccountId(20)));
        assert_eq!(first.majority(&wager, 0), Some(AccountId(20)));
    }

    #[test]
    fn test_opponent_lookup() {
        let wager = wager();
        assert_eq!(wager.opponent_of(AccountId(10)), Some(AccountId(20)));
        assert_eq!(wager.opponent_of(AccountId(99)), None);
        assert!(!WagerState::Voting.is_terminal());
        assert!(WagerState::Declined.is_terminal());
    }
}
