pub mod ai;
pub mod loader;
pub mod paths;
pub mod storages;
pub mod validate;

pub use ai::*;
pub use loader::*;
pub use paths::*;
pub use storages::*;
pub use validate::*;
