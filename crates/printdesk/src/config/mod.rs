pub mod loader;
pub mod schema;

pub use loader::{
    apply_env_overrides, config_from_env, load_config, load_config_from_str, validate_config,
};
pub use schema::{
    Config, ConverterConfig, CounterIsolation, EmailConfig, PageCounterConfig, PipelineSettings,
    PortalConfig, PortalSelectors, PricingConfig,
};
