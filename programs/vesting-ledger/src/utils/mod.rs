pub mod clock;
pub mod ids;
pub mod serde_fmt;
pub mod time;
