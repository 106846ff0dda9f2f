pub mod compose;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod registry;
pub mod schema;
pub mod schools;
pub mod slides;
pub mod templates;
pub mod tooling;

pub use compose::{load_compose, parse_compose, run_compose};
pub use config::{ServerConfig, Settings, UserConfig};
pub use error::{ApiError, SchemaError};
pub use http::{register_http_contracts, serve, AppState};
pub use registry::{Context, Registry};
pub use schema::register_schema;
pub use slides::{register_slide_generator, register_slides};
pub use tooling::register_tooling;

/// A registry with every contract that needs no external state: schema
/// transforms, slide helpers, logging and the HTTP host.
pub fn default_registry() -> Registry {
    let registry = Registry::new();
    register_tooling(&registry);
    register_schema(&registry);
    register_slides(&registry);
    register_http_contracts(&registry);
    registry
}
