//! Testing utilities (behind the `testing` feature flag).
//!
//! Enable with:
//!
//! ```toml
//! [dev-dependencies]
//! claude-query = { version = "*", features = ["testing"] }
//! ```
//!
//! # Components
//!
//! - [`MockTransport`]: in-memory transport implementing [`Transport`](crate::transport::Transport).
//! - [`ScenarioBuilder`]: fluent API for scripting a whole query stream.
//! - [`builders`]: convenience constructors for message types.

pub mod builders;
pub mod mock_transport;
pub mod scenario;

pub use builders::*;
pub use mock_transport::{MockFrame, MockTransport};
pub use scenario::ScenarioBuilder;
