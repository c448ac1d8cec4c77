//! Runtime initialization and lifecycle management.
//!
//! Builds every core component from an [`AppConfig`](crate::config::AppConfig), starts
//! the background tasks that maintain them, and stops those tasks on shutdown. The HTTP
//! server and the CLI both go through this entry point.
//!
//! ```no_run
//! use fxgate_core::{config::AppConfig, runtime::FxgateRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!
//!     let runtime = FxgateRuntime::builder()
//!         .with_config(config)
//!         .enable_health_checker()
//!         .build()?;
//!
//!     let block = runtime.gateway().block_number().await?;
//!     println!("latest block: {}", block.value);
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;

pub use builder::{FxgateRuntimeBuilder, RuntimeError};
pub use components::FxgateComponents;
pub use lifecycle::FxgateRuntime;
