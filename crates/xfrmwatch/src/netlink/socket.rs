//! Low-level async NETLINK_XFRM socket.

use std::os::unix::io::{AsRawFd, RawFd};
use std::task::{Context, Poll};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use super::error::Result;

/// Receive buffer capacity. XFRM notifications are small (an SA with two
/// algorithm attributes is well under 1 KiB) but a datagram may batch
/// several messages.
const RECV_BUF_CAPACITY: usize = 32768;

/// XFRM multicast groups (legacy nl_groups bitmask from linux/xfrm.h).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XfrmGroup {
    /// SA acquisition requests (XFRMGRP_ACQUIRE).
    Acquire,
    /// SA/policy lifetime expirations (XFRMGRP_EXPIRE).
    Expire,
    /// SA add/delete/update notifications (XFRMGRP_SA).
    Sa,
    /// Policy add/delete/update notifications (XFRMGRP_POLICY).
    Policy,
    /// Kernel reports (XFRMGRP_REPORT).
    Report,
}

impl XfrmGroup {
    /// The group's bit in the nl_groups bitmask.
    pub const fn bit(self) -> u32 {
        match self {
            XfrmGroup::Acquire => 0x1,
            XfrmGroup::Expire => 0x2,
            XfrmGroup::Sa => 0x4,
            XfrmGroup::Policy => 0x8,
            XfrmGroup::Report => 0x20,
        }
    }

    /// Bitmask covering every group.
    pub const fn all() -> u32 {
        XfrmGroup::Acquire.bit()
            | XfrmGroup::Expire.bit()
            | XfrmGroup::Sa.bit()
            | XfrmGroup::Policy.bit()
            | XfrmGroup::Report.bit()
    }
}

/// Async NETLINK_XFRM socket subscribed to a set of multicast groups.
pub struct XfrmSocket {
    /// The underlying async file descriptor.
    fd: AsyncFd<Socket>,
    /// Local port ID (assigned by kernel).
    pid: u32,
    /// Subscribed group bitmask.
    groups: u32,
}

impl XfrmSocket {
    /// Create a NETLINK_XFRM socket bound to the given multicast group
    /// bitmask (see [`XfrmGroup::bit`]).
    ///
    /// Subscribing to XFRM groups requires CAP_NET_ADMIN; without it the
    /// bind fails with EPERM.
    pub fn open(groups: u32) -> Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_XFRM)?;
        socket.set_non_blocking(true)?;

        // XFRM group ids all fit in the legacy 32-bit nl_groups field, so
        // the whole subscription is carried by the bind address.
        let mut addr = SocketAddr::new(0, groups);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        let fd = AsyncFd::new(socket)?;

        Ok(Self { fd, pid, groups })
    }

    /// Get the local port ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Get the subscribed group bitmask.
    pub fn groups(&self) -> u32 {
        self.groups
    }

    /// Receive one datagram, allocating an owned buffer.
    ///
    /// The returned bytes may contain several concatenated netlink frames.
    pub async fn recv(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(RECV_BUF_CAPACITY);

        loop {
            let mut guard = self.fd.ready(Interest::READABLE).await?;

            match guard.try_io(|inner| inner.get_ref().recv(&mut buf, 0)) {
                Ok(result) => {
                    let _n = result?;
                    return Ok(buf.to_vec());
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Poll for one datagram.
    ///
    /// Poll-based version of [`recv`](Self::recv) for `Stream`
    /// implementations.
    pub fn poll_recv(&self, cx: &mut Context<'_>) -> Poll<Result<Vec<u8>>> {
        let mut buf = BytesMut::with_capacity(RECV_BUF_CAPACITY);

        loop {
            let mut guard = match self.fd.poll_read_ready(cx) {
                Poll::Ready(Ok(guard)) => guard,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e.into())),
                Poll::Pending => return Poll::Pending,
            };

            match guard.try_io(|inner| inner.get_ref().recv(&mut buf, 0)) {
                Ok(result) => match result {
                    Ok(_n) => return Poll::Ready(Ok(buf.to_vec())),
                    Err(e) => return Poll::Ready(Err(e.into())),
                },
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsRawFd for XfrmSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_bits_match_kernel_contract() {
        assert_eq!(XfrmGroup::Acquire.bit(), 0x1);
        assert_eq!(XfrmGroup::Expire.bit(), 0x2);
        assert_eq!(XfrmGroup::Sa.bit(), 0x4);
        assert_eq!(XfrmGroup::Policy.bit(), 0x8);
        assert_eq!(XfrmGroup::Report.bit(), 0x20);
    }

    #[test]
    fn reference_subscription_is_sa_and_policy() {
        assert_eq!(XfrmGroup::Sa.bit() | XfrmGroup::Policy.bit(), 0xC);
    }

    #[test]
    fn all_covers_every_group() {
        assert_eq!(XfrmGroup::all(), 0x2f);
    }

    // Subscribing to groups needs CAP_NET_ADMIN, so only a groupless bind
    // is attempted here; an Err is fine on kernels without xfrm.
    #[tokio::test]
    async fn open_without_groups() {
        match XfrmSocket::open(0) {
            Ok(sock) => {
                assert_eq!(sock.groups(), 0);
                assert!(sock.as_raw_fd() >= 0);
                assert_ne!(sock.pid(), 0);
            }
            Err(e) => assert!(!e.is_decode()),
        }
    }
}
