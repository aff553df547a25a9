use serde::{Deserialize, Serialize};

/// Opaque caller identity. The core never authenticates it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct AccountId(pub i64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AccountId {
    fn from(value: i64) -> Self {
        AccountId(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Account {
    pub id: AccountId,
    /// Total funds, including those reserved by open wagers.
    pub balance: i64,
    /// Funds held by open wagers.
    pub reserved: i64,
    pub created_at: time::OffsetDateTime,
}

impl Account {
    pub fn available(&self) -> i64 {
        self.balance - self.reserved
    }

    pub fn view(&self) -> AccountBalance {
        AccountBalance {
            account: self.id,
            balance: self.balance,
            reserved: self.reserved,
            available: self.available(),
        }
    }
}

/// Balance snapshot returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountBalance {
    pub account: AccountId,
    pub balance: i64,
    pub reserved: i64,
    pub available: i64,
}
