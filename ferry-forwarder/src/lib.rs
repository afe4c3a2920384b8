//! Ferry backend forwarder
//!
//! Delivers one job's input to the remote execution backend and survives
//! the backend's transient overload. The worker only sees the [`Backend`]
//! trait; [`Forwarder`] is the production implementation.
//!
//! # Example
//!
//! ```no_run
//! use ferry_forwarder::Forwarder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let forwarder = Forwarder::from_env()?;
//!     forwarder.config().validate()?;
//!
//!     let response = forwarder
//!         .forward_action("run", br#"{"code":"print(1)"}"#, "sess-0a1b2c3")
//!         .await?;
//!
//!     println!("Backend answered {}", response.status);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
mod forwarder;
pub mod payload;
pub mod retry;
pub mod token;
pub mod transport;

pub use config::ForwarderConfig;
pub use error::{ForwardError, TokenError, TransportError};
pub use forwarder::{Forwarder, PingReport};
pub use token::{StaticTokenProvider, TokenProvider};
pub use transport::{ReqwestTransport, Transport};

use async_trait::async_trait;
use ferry_core::domain::operation::Operation;

/// Final backend answer handed back to the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Never empty; `application/json` when the backend sent none
    pub content_type: String,
}

impl ForwardResponse {
    /// A locally produced JSON response
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.as_bytes().to_vec(),
            content_type: "application/json".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Something that can execute an operation for a session
#[async_trait]
pub trait Backend: Send + Sync {
    async fn forward(
        &self,
        operation: Operation,
        body: &[u8],
        session_id: &str,
    ) -> Result<ForwardResponse, ForwardError>;
}
