//! Client configuration.
//!
//! # Data Flow
//! ```text
//! client.toml
//!     → loader.rs (read + toml deserialize into ClientConfig)
//!     → validation.rs (every semantic problem, collected in one pass)
//!     → Client::from_config (policies, breaker, balancer, timeouts)
//! ```
//!
//! # Design Decisions
//! - Every section and field has a default, so an empty file is a valid config
//! - A loaded config is plain data; a client copies what it needs at build time
//! - Later changes go through the client's setters, not the config

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CircuitBreakerConfig, ClientConfig, EndpointConfig, LoadBalancerConfig, ObservabilityConfig,
    PanicPolicy, RedirectConfig, RetryConfig, Strategy, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
