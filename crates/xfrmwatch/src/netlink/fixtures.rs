//! Synthetic wire buffers for decoder tests.
//!
//! The library never encodes netlink messages in production, so the
//! encoders live here, compiled for tests only.

use std::net::Ipv4Addr;

use zerocopy::IntoBytes;

use super::attr::{NLA_HDRLEN, nla_align};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};
use super::xfrm::{XfrmAddress, XfrmId, XfrmSelector, XfrmUserpolicyInfo, XfrmUsersaInfo};

/// Encode one netlink frame: header with correct length, payload, padding.
pub(crate) fn raw_frame(msg_type: u16, payload: &[u8]) -> Vec<u8> {
    let msg_len = NLMSG_HDRLEN + payload.len();
    let header = NlMsgHdr {
        nlmsg_len: msg_len as u32,
        nlmsg_type: msg_type,
        nlmsg_flags: 0,
        nlmsg_seq: 0,
        nlmsg_pid: 0,
    };

    let mut buf = Vec::with_capacity(nlmsg_align(msg_len));
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(payload);
    buf.resize(nlmsg_align(msg_len), 0);
    buf
}

/// Append one TLV attribute: nlattr header, value, padding.
pub(crate) fn push_attr(buf: &mut Vec<u8>, attr_type: u16, value: &[u8]) {
    let len = NLA_HDRLEN + value.len();
    buf.extend_from_slice(&(len as u16).to_ne_bytes());
    buf.extend_from_slice(&attr_type.to_ne_bytes());
    buf.extend_from_slice(value);
    buf.resize(buf.len() + nla_align(len) - len, 0);
}

/// Encode an xfrm_algo value (64-byte name, key length in bits, key).
pub(crate) fn encode_algo(name: &str, key: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 64];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    buf.extend_from_slice(&((key.len() * 8) as u32).to_ne_bytes());
    buf.extend_from_slice(key);
    buf
}

/// Encode an xfrm_algo_auth value (name, key length, truncation length, key).
pub(crate) fn encode_algo_auth(name: &str, key: &[u8], trunc_len: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 64];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    buf.extend_from_slice(&((key.len() * 8) as u32).to_ne_bytes());
    buf.extend_from_slice(&trunc_len.to_ne_bytes());
    buf.extend_from_slice(key);
    buf
}

/// A tunnel-mode ESP SA between 10.0.0.1 and 10.0.0.2.
pub(crate) fn sample_sa_info() -> XfrmUsersaInfo {
    XfrmUsersaInfo {
        sel: XfrmSelector {
            daddr: XfrmAddress::from_v4(Ipv4Addr::new(10, 0, 0, 2)),
            saddr: XfrmAddress::from_v4(Ipv4Addr::new(10, 0, 0, 1)),
            family: libc::AF_INET as u16,
            prefixlen_d: 32,
            prefixlen_s: 32,
            ..Default::default()
        },
        id: XfrmId {
            daddr: XfrmAddress::from_v4(Ipv4Addr::new(10, 0, 0, 2)),
            spi: 0x12345678u32.to_be(),
            proto: 50,
            _pad: [0; 3],
        },
        saddr: XfrmAddress::from_v4(Ipv4Addr::new(10, 0, 0, 1)),
        reqid: 7,
        family: libc::AF_INET as u16,
        mode: 1,
        replay_window: 32,
        ..Default::default()
    }
}

/// An outbound allow policy for 192.0.2.0/24 -> 198.51.100.0/24.
pub(crate) fn sample_sp_info() -> XfrmUserpolicyInfo {
    XfrmUserpolicyInfo {
        sel: XfrmSelector {
            daddr: XfrmAddress::from_v4(Ipv4Addr::new(198, 51, 100, 0)),
            saddr: XfrmAddress::from_v4(Ipv4Addr::new(192, 0, 2, 0)),
            family: libc::AF_INET as u16,
            prefixlen_d: 24,
            prefixlen_s: 24,
            ..Default::default()
        },
        priority: 2080,
        index: 16,
        dir: 1,
        action: 0,
        ..Default::default()
    }
}
