//! ServiceModel client - Main Library
//!
//! Binary-side glue around the `servicemodel` workspace library.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, logging, runners)
//! - **servicemodel**: Channel lifecycle and factory caching (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use servicemodel_client::bin_common::{init_tracing, load_config_from_env};
//! use servicemodel_client::servicemodel::ChannelFactoryCacheManager;
//! ```

// Re-export workspace libraries for convenience
pub use servicemodel;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;
    pub mod runner;

    pub use cli::{load_config_from_env, parse_args, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
    pub use logging::{init_tracing, init_tracing_with_level};
    pub use runner::{BinaryRunner, RunConfig};
}
