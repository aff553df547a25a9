pub mod errors;
pub mod odds;

pub use errors::{ErrorCategory, ErrorPayload};
pub use odds::OptionOdds;
