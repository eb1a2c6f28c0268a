pub mod app_config;
pub mod categories;
pub mod config;
pub mod error;
pub mod failures;
pub mod items;
pub mod token;

pub use app_config::{AppConfig, Environment, SourceKind};
pub use categories::{load_categories, CategoriesFile};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::ConfigError;
pub use failures::{FailureKind, UnknownFailureKind};
pub use items::Item;
pub use token::{RetryToken, TokenError};
