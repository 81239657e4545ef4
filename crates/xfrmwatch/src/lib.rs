//! Async XFRM (IPsec) event monitoring for Linux.
//!
//! This crate subscribes to the kernel's NETLINK_XFRM multicast groups and
//! turns SA and policy notifications into typed events: installs, updates,
//! deletes, lifetime expirations, and table flushes.
//!
//! # Features
//!
//! - `output` - text/JSON output formatting for monitor tools
//!
//! # Example
//!
//! ```ignore
//! use xfrmwatch::netlink::events::{EventStream, XfrmEvent};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> xfrmwatch::netlink::Result<()> {
//!     let mut stream = EventStream::builder()
//!         .sa(true)
//!         .policy(true)
//!         .build()?;
//!
//!     while let Some(event) = stream.try_next().await? {
//!         match event {
//!             XfrmEvent::NewSa(sa) => println!("new SA spi 0x{:08x}", sa.spi),
//!             XfrmEvent::DelSa { id, .. } => println!("del SA spi 0x{:08x}", id.spi),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Subscribing to XFRM multicast groups requires CAP_NET_ADMIN.

// Core modules (always available)
pub mod netlink;

// Feature-gated modules
#[cfg(feature = "output")]
pub mod output;

// Re-export common types at crate root for convenience
pub use netlink::{Error, EventStream, MonitorStats, Result, XfrmEvent, XfrmGroup};
