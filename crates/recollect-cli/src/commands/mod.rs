pub mod commit;
pub mod config;
pub mod context;
pub mod recent;
pub mod store;

pub use commit::CommitCommand;
pub use config::ConfigCommand;
pub use context::ContextCommand;
pub use recent::RecentCommand;
pub use store::StoreCommand;
