//! Compute Engine REST API Client
//!
//! A Rust client library for the Compute Engine resources a Private Service
//! Connect port mapper manages: firewalls, port-mapping network endpoint
//! groups, backend services, forwarding rules and service attachments.
//!
//! # Example
//!
//! ```no_run
//! use gcp_client::{ClientConfig, GcpClient, GcpClientTrait, TokenSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new("my-project", "us-east1", "my-vpc", "my-subnet");
//! let client = GcpClient::new(config, TokenSource::fixed("ya29.token"))?;
//!
//! client.create_portmap_neg("db-psc-portmapper-neg").await?;
//! let endpoints = client.list_endpoints("db-psc-portmapper-neg").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Idempotent mutations**: every insert/patch/delete carries a `requestId`
//! - **Operation waits**: mutating calls return once the operation is DONE
//! - **Typed NotFound**: missing resources surface as `GcpError::NotFound`
//! - **Mocking**: `MockGcpClient` behind the `test-util` feature

pub mod auth;
pub mod client;
pub mod common;
pub mod config;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod gcp_trait;
pub mod util;
#[cfg(feature = "test-util")]
pub mod mock;

pub use auth::TokenSource;
pub use client::GcpClient;
pub use common::HttpClient;
pub use config::{parse_annotations, ClientConfig};
pub use error::GcpError;
pub use gcp_trait::GcpClientTrait;
pub use models::*;
pub use util::*;
#[cfg(feature = "test-util")]
pub use mock::{MockCall, MockGcpClient};
