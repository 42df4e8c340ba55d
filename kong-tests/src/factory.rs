mod contexts;
mod providers;
mod repos;
mod vaults;

pub use contexts::*;
pub use providers::*;
pub use repos::*;
pub use vaults::*;
