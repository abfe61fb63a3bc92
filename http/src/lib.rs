//! # Jxn HTTP Transport
//!
//! A [`Transport`](jxn_core::environment::Transport) for the jxn client
//! runtime built on reqwest.
//!
//! ## Example
//!
//! ```no_run
//! use jxn_http::HttpTransport;
//! use jxn_runtime::{Client, ClientConfig, Environment};
//! use jxn_core::RequestSpec;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = HttpTransport::builder("https://example.com/")
//!         .timeout(Duration::from_secs(30))
//!         .build()?;
//!
//!     let client = Client::new(
//!         ClientConfig::from_env()?.with_request_uri("/ajax.php"),
//!         Environment::new(Arc::new(transport)),
//!     );
//!     client.execute(RequestSpec::function("ping")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - Form and multipart bodies, query strings for GET
//! - Redirects surface as 3xx responses instead of being followed
//! - Timeouts and connection failures map onto retryable transport errors

pub mod error;
pub mod transport;

// Re-export main types for convenience
pub use error::HttpError;
pub use transport::{HttpTransport, HttpTransportBuilder};
