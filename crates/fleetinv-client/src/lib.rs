//! fleetinv-client: HTTP client library
//!
//! [`HttpClient`] talks to the fleetinv daemon on behalf of agents and
//! operators. [`AgentEndpoint`] is the reverse direction: the daemon's
//! transport to an agent's callback address.
//!
//! # Examples
//!
//! ```no_run
//! use fleetinv_client::HttpClient;
//! use fleetinv_api::InventoryStatus;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new("http://localhost:7080")?.as_user("rhqadmin");
//!
//! for queued in client.queue(&[InventoryStatus::New]).await? {
//!     println!("{} ({} servers)", queued.platform.name, queued.servers.len());
//!     client.import_resources(vec![queued.platform.id]).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod error;
pub mod http;

pub use agent::AgentEndpoint;
pub use error::{ClientError, Result};
pub use http::HttpClient;
