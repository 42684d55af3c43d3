pub mod core;
pub mod stats;

pub use self::core::*;
pub use self::stats::*;
