pub mod fmt;
pub mod fsutil;
pub mod id;

pub use fmt::*;
pub use fsutil::*;
pub use id::*;
