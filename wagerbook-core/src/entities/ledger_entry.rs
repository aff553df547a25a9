use crate::entities::AccountId;

/// Why a ledger entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "entry_kind", rename_all = "snake_case")]
pub enum EntryKind {
    /// Starting balance credited when the account is opened.
    Grant,
    AdminAdjustment,
    BetWin,
    BetLoss,
    WagerWin,
    WagerLoss,
    TransferIn,
    TransferOut,
    GroupWagerPayout,
    GroupWagerLoss,
    ReservationHold,
    ReservationRelease,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntryKind::Grant => "grant",
            EntryKind::AdminAdjustment => "admin_adjustment",
            EntryKind::BetWin => "bet_win",
            EntryKind::BetLoss => "bet_loss",
            EntryKind::WagerWin => "wager_win",
            EntryKind::WagerLoss => "wager_loss",
            EntryKind::TransferIn => "transfer_in",
            EntryKind::TransferOut => "transfer_out",
            EntryKind::GroupWagerPayout => "group_wager_payout",
            EntryKind::GroupWagerLoss => "group_wager_loss",
            EntryKind::ReservationHold => "reservation_hold",
            EntryKind::ReservationRelease => "reservation_release",
        };
        f.write_str(name)
    }
}

/// One immutable row of the append-only ledger.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub account: AccountId,
    pub delta: i64,
    pub resulting_balance: i64,
    pub kind: EntryKind,
    pub created_at: time::OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub account: AccountId,
    pub delta: i64,
    pub resulting_balance: i64,
    pub kind: EntryKind,
    pub created_at: time::OffsetDateTime,
}
