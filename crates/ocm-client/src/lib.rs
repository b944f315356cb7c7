//! Open Cluster Management API Client
//!
//! A small, read-only client over the Kubernetes API for the collections the
//! dashboard surfaces. Items are returned as raw JSON so that callers decide
//! how forgiving to be about their shape.
//!
//! # Example
//!
//! ```no_run
//! use crds::ManagedCluster;
//! use ocm_client::{Collection, OcmClient, OcmClientTrait, WatchEvent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OcmClient::try_default().await?;
//! let clusters = Collection::of::<ManagedCluster>();
//!
//! // One full listing
//! let items = client.list(&clusters).await?;
//! println!("{} clusters", items.len());
//!
//! // Follow changes until the server ends the watch
//! let mut watch = client.watch(&clusters).await?;
//! while let Some(event) = watch.next().await {
//!     if let WatchEvent::Error(message) = event {
//!         eprintln!("watch error: {message}");
//!     }
//! }
//! watch.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Collections**: group/version/plural coordinates taken from any `kube::Resource`
//! - **Watch handles**: single-consumer event sequences with an explicit, idempotent close
//! - **Mocking**: `MockOcmClient` behind the `test-util` feature

pub mod client;
pub mod collection;
pub mod error;
#[path = "trait.rs"]
pub mod ocm_trait;
pub mod watch;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::OcmClient;
pub use collection::Collection;
pub use error::OcmError;
pub use ocm_trait::OcmClientTrait;
pub use watch::{WatchEvent, WatchHandle};
#[cfg(feature = "test-util")]
pub use mock::MockOcmClient;
