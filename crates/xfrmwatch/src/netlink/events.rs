//! High-level event stream API for XFRM (IPsec) monitoring.
//!
//! This module provides an ergonomic, strongly-typed interface for watching
//! kernel SA and policy changes: installs, updates, deletes, expirations,
//! and table flushes.
//!
//! # Example
//!
//! ```ignore
//! use xfrmwatch::netlink::events::{EventStream, XfrmEvent};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut stream = EventStream::builder()
//!         .sa(true)
//!         .policy(true)
//!         .build()?;
//!
//!     while let Some(event) = stream.try_next().await? {
//!         match event {
//!             XfrmEvent::NewSa(sa) => {
//!                 println!("new SA spi 0x{:08x}", sa.spi);
//!             }
//!             XfrmEvent::DelSa { id, .. } => {
//!                 println!("del SA spi 0x{:08x}", id.spi);
//!             }
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio_stream::Stream;
use tracing::{debug, warn};

use super::error::Result;
use super::message::FrameIter;
use super::socket::{XfrmGroup, XfrmSocket};
use super::xfrm::{
    IpsecProtocol, PolicyId, SaId, SaRecord, SpRecord, msg, parse_flush_sa,
};

/// XFRM events that can be received from the kernel.
#[derive(Debug, Clone)]
pub enum XfrmEvent {
    // SA events
    /// A new SA was installed.
    NewSa(SaRecord),
    /// An existing SA was updated.
    UpdSa(SaRecord),
    /// An SA dump response (seen when another process runs a GETSA dump).
    GetSa(SaRecord),
    /// An SA was deleted. The full state rides along when the kernel
    /// includes it.
    DelSa {
        /// Compact identifier of the deleted SA.
        id: SaId,
        /// Full SA state, if attached to the notification.
        sa: Option<SaRecord>,
    },
    /// An SA lifetime limit was reached.
    SaExpire {
        /// The expiring SA.
        sa: SaRecord,
        /// True for a hard expiration (SA removed), false for soft.
        hard: bool,
    },

    // Policy events
    /// A new policy was installed.
    NewPolicy(SpRecord),
    /// An existing policy was updated.
    UpdPolicy(SpRecord),
    /// A policy dump response.
    GetPolicy(SpRecord),
    /// A policy was deleted.
    DelPolicy {
        /// Compact identifier of the deleted policy.
        id: PolicyId,
        /// Full policy, if attached to the notification.
        policy: Option<SpRecord>,
    },

    // Table-wide events
    /// The SA table was flushed for one protocol.
    FlushSa {
        /// Protocol whose SAs were flushed.
        protocol: IpsecProtocol,
    },
    /// The policy table was flushed.
    FlushPolicy,

    /// A message type this library does not decode (ACQUIRE, POLEXPIRE,
    /// ALLOCSPI responses). Carries the raw type so nothing is silently
    /// dropped.
    Unknown(u16),
}

impl XfrmEvent {
    /// Returns true if this is an SA event.
    pub fn is_sa(&self) -> bool {
        matches!(
            self,
            XfrmEvent::NewSa(_)
                | XfrmEvent::UpdSa(_)
                | XfrmEvent::GetSa(_)
                | XfrmEvent::DelSa { .. }
                | XfrmEvent::SaExpire { .. }
                | XfrmEvent::FlushSa { .. }
        )
    }

    /// Returns true if this is a policy event.
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            XfrmEvent::NewPolicy(_)
                | XfrmEvent::UpdPolicy(_)
                | XfrmEvent::GetPolicy(_)
                | XfrmEvent::DelPolicy { .. }
                | XfrmEvent::FlushPolicy
        )
    }

    /// Returns a short action name for display/logging purposes.
    pub fn action(&self) -> &'static str {
        match self {
            XfrmEvent::NewSa(_) | XfrmEvent::NewPolicy(_) => "new",
            XfrmEvent::UpdSa(_) | XfrmEvent::UpdPolicy(_) => "upd",
            XfrmEvent::GetSa(_) | XfrmEvent::GetPolicy(_) => "get",
            XfrmEvent::DelSa { .. } | XfrmEvent::DelPolicy { .. } => "del",
            XfrmEvent::SaExpire { .. } => "expire",
            XfrmEvent::FlushSa { .. } | XfrmEvent::FlushPolicy => "flush",
            XfrmEvent::Unknown(_) => "unknown",
        }
    }

    /// Returns the inner SA record if this event carries one.
    pub fn as_sa(&self) -> Option<&SaRecord> {
        match self {
            XfrmEvent::NewSa(sa) | XfrmEvent::UpdSa(sa) | XfrmEvent::GetSa(sa) => Some(sa),
            XfrmEvent::DelSa { sa, .. } => sa.as_ref(),
            XfrmEvent::SaExpire { sa, .. } => Some(sa),
            _ => None,
        }
    }

    /// Returns the inner policy record if this event carries one.
    pub fn as_policy(&self) -> Option<&SpRecord> {
        match self {
            XfrmEvent::NewPolicy(p) | XfrmEvent::UpdPolicy(p) | XfrmEvent::GetPolicy(p) => Some(p),
            XfrmEvent::DelPolicy { policy, .. } => policy.as_ref(),
            _ => None,
        }
    }
}

/// Decode one netlink frame payload into an event.
///
/// Every XFRM message type maps to a variant; types outside the decoded set
/// become [`XfrmEvent::Unknown`]. Decode errors surface as `Err` so the
/// caller can count and skip the frame.
pub fn decode_event(msg_type: u16, payload: &[u8]) -> Result<XfrmEvent> {
    match msg_type {
        msg::XFRM_MSG_NEWSA => SaRecord::parse(payload).map(XfrmEvent::NewSa),
        msg::XFRM_MSG_UPDSA => SaRecord::parse(payload).map(XfrmEvent::UpdSa),
        msg::XFRM_MSG_GETSA => SaRecord::parse(payload).map(XfrmEvent::GetSa),
        msg::XFRM_MSG_DELSA => {
            SaRecord::parse_del(payload).map(|(id, sa)| XfrmEvent::DelSa { id, sa })
        }
        msg::XFRM_MSG_EXPIRE => {
            SaRecord::parse_expire(payload).map(|(sa, hard)| XfrmEvent::SaExpire { sa, hard })
        }
        msg::XFRM_MSG_NEWPOLICY => SpRecord::parse(payload).map(XfrmEvent::NewPolicy),
        msg::XFRM_MSG_UPDPOLICY => SpRecord::parse(payload).map(XfrmEvent::UpdPolicy),
        msg::XFRM_MSG_GETPOLICY => SpRecord::parse(payload).map(XfrmEvent::GetPolicy),
        msg::XFRM_MSG_DELPOLICY => {
            SpRecord::parse_del(payload).map(|(id, policy)| XfrmEvent::DelPolicy { id, policy })
        }
        msg::XFRM_MSG_FLUSHSA => parse_flush_sa(payload).map(|protocol| XfrmEvent::FlushSa {
            protocol,
        }),
        msg::XFRM_MSG_FLUSHPOLICY => Ok(XfrmEvent::FlushPolicy),
        other => Ok(XfrmEvent::Unknown(other)),
    }
}

/// Counters for frames the stream could not turn into events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Datagram tails dropped because of malformed netlink framing.
    pub malformed_frames: u64,
    /// Frames whose payload failed to decode.
    pub decode_errors: u64,
    /// Frames carrying a message type outside the decoded set.
    pub unknown_messages: u64,
}

impl MonitorStats {
    /// True if every counter is zero.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Builder for configuring an event stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventStreamBuilder {
    acquire: bool,
    expire: bool,
    sa: bool,
    policy: bool,
    report: bool,
}

impl EventStreamBuilder {
    /// Create a new builder with no subscriptions.
    ///
    /// Building with nothing selected subscribes to SA and policy groups,
    /// the useful default for a monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to SA add/delete/update notifications.
    pub fn sa(mut self, enabled: bool) -> Self {
        self.sa = enabled;
        self
    }

    /// Subscribe to policy add/delete/update notifications.
    pub fn policy(mut self, enabled: bool) -> Self {
        self.policy = enabled;
        self
    }

    /// Subscribe to SA acquisition requests.
    pub fn acquire(mut self, enabled: bool) -> Self {
        self.acquire = enabled;
        self
    }

    /// Subscribe to lifetime expirations.
    pub fn expire(mut self, enabled: bool) -> Self {
        self.expire = enabled;
        self
    }

    /// Subscribe to kernel reports.
    pub fn report(mut self, enabled: bool) -> Self {
        self.report = enabled;
        self
    }

    /// Subscribe to every group.
    pub fn all(self) -> Self {
        self.sa(true).policy(true).acquire(true).expire(true).report(true)
    }

    /// The nl_groups bitmask this configuration subscribes to.
    pub fn groups(&self) -> u32 {
        let mut groups = 0;
        if self.acquire {
            groups |= XfrmGroup::Acquire.bit();
        }
        if self.expire {
            groups |= XfrmGroup::Expire.bit();
        }
        if self.sa {
            groups |= XfrmGroup::Sa.bit();
        }
        if self.policy {
            groups |= XfrmGroup::Policy.bit();
        }
        if self.report {
            groups |= XfrmGroup::Report.bit();
        }
        if groups == 0 {
            groups = XfrmGroup::Sa.bit() | XfrmGroup::Policy.bit();
        }
        groups
    }

    /// Open the socket and build the event stream.
    pub fn build(self) -> Result<EventStream> {
        let groups = self.groups();
        let socket = XfrmSocket::open(groups)?;
        debug!(groups = format_args!("0x{:x}", groups), pid = socket.pid(), "xfrm monitor socket bound");

        Ok(EventStream {
            socket,
            pending_events: Vec::new(),
            stats: MonitorStats::default(),
        })
    }
}

/// A stream of XFRM events.
///
/// Implements the [`Stream`] trait from `tokio-stream`. Decode failures do
/// not end the stream: the offending frame is counted in [`MonitorStats`]
/// and skipped, and only socket errors are yielded as `Err`.
///
/// Use [`EventStream::builder()`] to configure which groups to subscribe to.
pub struct EventStream {
    socket: XfrmSocket,
    pending_events: Vec<XfrmEvent>,
    stats: MonitorStats,
}

impl EventStream {
    /// Create a builder for configuring the event stream.
    pub fn builder() -> EventStreamBuilder {
        EventStreamBuilder::new()
    }

    /// Get a reference to the underlying socket.
    pub fn socket(&self) -> &XfrmSocket {
        &self.socket
    }

    /// Counters for frames dropped so far.
    pub fn stats(&self) -> MonitorStats {
        self.stats
    }
}

impl Stream for EventStream {
    type Item = Result<XfrmEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // Return pending events first
        if let Some(event) = this.pending_events.pop() {
            return Poll::Ready(Some(Ok(event)));
        }

        // Poll for new data
        loop {
            match this.socket.poll_recv(cx) {
                Poll::Ready(Ok(data)) => {
                    let mut frames = FrameIter::new(&data);
                    for (header, payload) in frames.by_ref() {
                        match decode_event(header.nlmsg_type, payload) {
                            Ok(event) => {
                                if let XfrmEvent::Unknown(t) = event {
                                    this.stats.unknown_messages += 1;
                                    debug!(msg_type = t, "unrecognized xfrm message type");
                                }
                                this.pending_events.push(event);
                            }
                            Err(e) => {
                                // Drop the frame, keep the stream alive.
                                this.stats.decode_errors += 1;
                                warn!(
                                    msg_type = header.nlmsg_type,
                                    error = %e,
                                    "skipping undecodable xfrm frame"
                                );
                            }
                        }
                    }
                    if frames.dropped_trailing() {
                        this.stats.malformed_frames += 1;
                        warn!("dropped trailing bytes after malformed netlink frame");
                    }

                    // Reverse so we pop in arrival order
                    this.pending_events.reverse();

                    if let Some(event) = this.pending_events.pop() {
                        return Poll::Ready(Some(Ok(event)));
                    }

                    // Nothing decodable in this batch, keep polling
                    continue;
                }
                Poll::Ready(Err(e)) => {
                    if e.is_transient() {
                        continue;
                    }
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// EventStream is Unpin because all its fields are Unpin
impl Unpin for EventStream {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::fixtures::{push_attr, sample_sa_info, sample_sp_info};
    use crate::netlink::xfrm::{
        PolicyDirection, SaMode, XfrmAddress, XfrmUsersaId,
    };
    use std::net::Ipv4Addr;
    use zerocopy::IntoBytes;

    #[test]
    fn builder_defaults_to_sa_and_policy() {
        let builder = EventStreamBuilder::new();
        assert_eq!(builder.groups(), 0xC);
    }

    #[test]
    fn builder_chaining() {
        let builder = EventStreamBuilder::new().sa(true).expire(true);
        assert_eq!(builder.groups(), 0x2 | 0x4);

        let builder = EventStreamBuilder::new().all();
        assert_eq!(builder.groups(), 0x2f);
    }

    #[test]
    fn decodes_new_sa() {
        let info = sample_sa_info();
        let event = decode_event(msg::XFRM_MSG_NEWSA, info.as_bytes()).unwrap();
        match event {
            XfrmEvent::NewSa(sa) => {
                assert_eq!(sa.spi, 0x12345678);
                assert_eq!(sa.mode, SaMode::Tunnel);
            }
            other => panic!("expected NewSa, got {:?}", other),
        }
        assert_eq!(
            decode_event(msg::XFRM_MSG_NEWSA, info.as_bytes())
                .unwrap()
                .action(),
            "new"
        );
    }

    #[test]
    fn decodes_upd_and_get_sa() {
        let info = sample_sa_info();
        assert!(matches!(
            decode_event(msg::XFRM_MSG_UPDSA, info.as_bytes()).unwrap(),
            XfrmEvent::UpdSa(_)
        ));
        assert!(matches!(
            decode_event(msg::XFRM_MSG_GETSA, info.as_bytes()).unwrap(),
            XfrmEvent::GetSa(_)
        ));
    }

    #[test]
    fn decodes_del_sa() {
        let id = XfrmUsersaId {
            daddr: XfrmAddress::from_v4(Ipv4Addr::new(10, 0, 0, 2)),
            spi: 0xdeadbeefu32.to_be(),
            family: libc::AF_INET as u16,
            proto: 50,
            _pad: 0,
        };
        let event = decode_event(msg::XFRM_MSG_DELSA, id.as_bytes()).unwrap();
        match event {
            XfrmEvent::DelSa { id, sa } => {
                assert_eq!(id.spi, 0xdeadbeef);
                assert!(sa.is_none());
            }
            other => panic!("expected DelSa, got {:?}", other),
        }
    }

    #[test]
    fn decodes_policy_events() {
        let info = sample_sp_info();
        let event = decode_event(msg::XFRM_MSG_NEWPOLICY, info.as_bytes()).unwrap();
        match &event {
            XfrmEvent::NewPolicy(p) => {
                assert_eq!(p.direction, PolicyDirection::Out);
                assert_eq!(p.index, 16);
            }
            other => panic!("expected NewPolicy, got {:?}", other),
        }
        assert!(event.is_policy());
        assert!(!event.is_sa());

        assert!(matches!(
            decode_event(msg::XFRM_MSG_UPDPOLICY, info.as_bytes()).unwrap(),
            XfrmEvent::UpdPolicy(_)
        ));
    }

    #[test]
    fn decodes_flush_events() {
        let event = decode_event(msg::XFRM_MSG_FLUSHSA, &[50]).unwrap();
        assert!(matches!(
            event,
            XfrmEvent::FlushSa {
                protocol: IpsecProtocol::Esp
            }
        ));

        let event = decode_event(msg::XFRM_MSG_FLUSHPOLICY, &[]).unwrap();
        assert!(matches!(event, XfrmEvent::FlushPolicy));
        assert!(event.is_policy());
    }

    #[test]
    fn unrecognized_type_maps_to_unknown() {
        let event = decode_event(msg::XFRM_MSG_ACQUIRE, &[0; 16]).unwrap();
        assert!(matches!(event, XfrmEvent::Unknown(0x17)));
        assert_eq!(event.action(), "unknown");

        let event = decode_event(0xffff, &[]).unwrap();
        assert!(matches!(event, XfrmEvent::Unknown(0xffff)));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        assert!(decode_event(msg::XFRM_MSG_NEWSA, &[0; 10]).is_err());
        assert!(decode_event(msg::XFRM_MSG_DELSA, &[0; 10]).is_err());
        assert!(decode_event(msg::XFRM_MSG_NEWPOLICY, &[0; 10]).is_err());
    }

    #[test]
    fn event_accessors() {
        let info = sample_sa_info();
        let mut payload = info.as_bytes().to_vec();
        push_attr(&mut payload, 31, &9u32.to_ne_bytes()); // XFRMA_IF_ID

        let event = decode_event(msg::XFRM_MSG_NEWSA, &payload).unwrap();
        let sa = event.as_sa().unwrap();
        assert_eq!(sa.if_id, Some(9));
        assert!(event.as_policy().is_none());
    }

    #[test]
    fn stats_start_clean() {
        let stats = MonitorStats::default();
        assert!(stats.is_clean());
        let stats = MonitorStats {
            decode_errors: 1,
            ..Default::default()
        };
        assert!(!stats.is_clean());
    }

    #[test]
    fn event_stream_is_unpin() {
        fn assert_unpin<T: Unpin>() {}
        assert_unpin::<EventStream>();
    }
}
