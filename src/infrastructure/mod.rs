pub mod auth;
pub mod config;
pub mod init;
pub mod logging;
pub mod middleware;
pub mod repository;
pub mod shutdown;
pub mod user_repository;

pub use config::AppConfig;
pub use repository::{AccountRepositoryTrait, InMemoryAccountRepository};
