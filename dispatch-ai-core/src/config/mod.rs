pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, load, load_from_file};
pub use schema::Config;
pub use validation::validate_config;
