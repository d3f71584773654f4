//! App RPC - Router, Types, and Context

mod context;
mod handlers;
mod identity;
mod store;
mod types;
mod usage;

pub use context::*;
pub use handlers::*;
pub use identity::*;
pub use store::*;
pub use types::*;
pub use usage::*;
