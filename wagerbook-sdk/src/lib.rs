//! Plain objects shared with the presentation layer of Wagerbook, plus the
//! presentation-owned scratch cache.
//!
//! Nothing in here touches balances. The core converts its own types into
//! these objects so that chat front-ends can render them without depending
//! on the storage or engine crates.

pub mod objects;
pub mod session;
