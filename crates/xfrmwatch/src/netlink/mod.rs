//! Async NETLINK_XFRM protocol implementation.
//!
//! This module provides everything needed to watch the kernel's IPsec
//! subsystem: a non-blocking multicast socket, netlink frame splitting,
//! XFRM payload decoding, and a high-level event stream.
//!
//! # Quick Start
//!
//! ```ignore
//! use xfrmwatch::netlink::events::{EventStream, XfrmEvent};
//! use tokio_stream::StreamExt;
//!
//! let mut stream = EventStream::builder()
//!     .sa(true)
//!     .policy(true)
//!     .build()?;
//!
//! while let Some(event) = stream.try_next().await? {
//!     match event {
//!         XfrmEvent::NewSa(sa) => println!("new SA spi 0x{:08x}", sa.spi),
//!         XfrmEvent::NewPolicy(p) => println!("new policy index {}", p.index),
//!         _ => {}
//!     }
//! }
//! ```

pub mod attr;
mod error;
pub mod events;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod message;
mod socket;
pub mod xfrm;

pub use attr::{AttrIter, NlAttr};
pub use error::{Error, Result};
pub use events::{EventStream, EventStreamBuilder, MonitorStats, XfrmEvent};
pub use message::{FrameIter, NLMSG_HDRLEN, NlMsgHdr};
pub use socket::{XfrmGroup, XfrmSocket};
