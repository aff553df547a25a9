#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod engines;
pub mod entities;
pub mod error;
pub mod events;
pub mod ledger;
pub mod processors;
pub mod storage;
pub mod uow;
pub mod utils;

#[cfg(test)]
mod testing;

pub use error::{EngineError, EngineResult};
