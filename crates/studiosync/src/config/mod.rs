pub mod loader;
pub mod schema;
mod settings;

pub use loader::{load_config, load_config_from_str};
pub use schema::{
    BrowserConfig, Config, LessonsConfig, LogFormat, LoggingConfig, LoginConfig, ProgramsConfig,
    RegistryConfig, RetryConfig, SiteConfig, TimeoutsConfig,
};
