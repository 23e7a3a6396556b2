pub mod claim_tokens;
pub mod create_schedule;
pub mod portfolio_stats;

pub use claim_tokens::*;
pub use create_schedule::*;
pub use portfolio_stats::*;
