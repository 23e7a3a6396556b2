pub mod claim;
pub mod schedule;
pub mod snapshot;

pub use claim::*;
pub use schedule::*;
pub use snapshot::*;
