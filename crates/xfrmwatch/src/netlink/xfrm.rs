//! XFRM wire structures and record decoding.
//!
//! Layouts mirror `linux/xfrm.h`. Notification payloads are a fixed-size
//! struct followed by TLV attributes; decoders copy everything out of the
//! receive buffer so records own their bytes.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::AttrIter;
use super::error::{Error, Result};

/// XFRM message types (linux/xfrm.h).
pub mod msg {
    pub const XFRM_MSG_NEWSA: u16 = 0x10;
    pub const XFRM_MSG_DELSA: u16 = 0x11;
    pub const XFRM_MSG_GETSA: u16 = 0x12;
    pub const XFRM_MSG_NEWPOLICY: u16 = 0x13;
    pub const XFRM_MSG_DELPOLICY: u16 = 0x14;
    pub const XFRM_MSG_GETPOLICY: u16 = 0x15;
    pub const XFRM_MSG_ALLOCSPI: u16 = 0x16;
    pub const XFRM_MSG_ACQUIRE: u16 = 0x17;
    pub const XFRM_MSG_EXPIRE: u16 = 0x18;
    pub const XFRM_MSG_UPDPOLICY: u16 = 0x19;
    pub const XFRM_MSG_UPDSA: u16 = 0x1a;
    pub const XFRM_MSG_POLEXPIRE: u16 = 0x1b;
    pub const XFRM_MSG_FLUSHSA: u16 = 0x1c;
    pub const XFRM_MSG_FLUSHPOLICY: u16 = 0x1d;
}

// XFRM attribute types
const XFRMA_ALG_AUTH: u16 = 1;
const XFRMA_ALG_CRYPT: u16 = 2;
const XFRMA_ALG_COMP: u16 = 3;
const XFRMA_ENCAP: u16 = 4;
const XFRMA_TMPL: u16 = 5;
const XFRMA_SA: u16 = 6;
const XFRMA_POLICY: u16 = 7;
const XFRMA_REPLAY_THRESH: u16 = 11;
const XFRMA_ALG_AEAD: u16 = 18;
const XFRMA_ALG_AUTH_TRUNC: u16 = 20;
const XFRMA_MARK: u16 = 21;
const XFRMA_IF_ID: u16 = 31;

// XFRM modes
const XFRM_MODE_TRANSPORT: u8 = 0;
const XFRM_MODE_TUNNEL: u8 = 1;
const XFRM_MODE_BEET: u8 = 4;

// XFRM protocols
const IPPROTO_ESP: u8 = 50;
const IPPROTO_AH: u8 = 51;
const IPPROTO_COMP: u8 = 108;

// Policy directions
const XFRM_POLICY_IN: u8 = 0;
const XFRM_POLICY_OUT: u8 = 1;
const XFRM_POLICY_FWD: u8 = 2;

// Policy actions
const XFRM_POLICY_ALLOW: u8 = 0;
const XFRM_POLICY_BLOCK: u8 = 1;

/// XFRM address (16 bytes, can hold IPv4 or IPv6).
///
/// The interpretation depends on the address family carried next to it in
/// the enclosing struct; rendering is a presentation concern.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmAddress {
    /// Raw address bytes (4 bytes used for IPv4, 16 for IPv6).
    pub bytes: [u8; 16],
}

impl XfrmAddress {
    /// Create from an IPv4 address.
    pub fn from_v4(addr: Ipv4Addr) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..4].copy_from_slice(&addr.octets());
        Self { bytes }
    }

    /// Create from an IPv6 address.
    pub fn from_v6(addr: Ipv6Addr) -> Self {
        Self {
            bytes: addr.octets(),
        }
    }

    /// Convert to an IP address based on the address family.
    ///
    /// Returns `None` for families other than AF_INET/AF_INET6.
    pub fn to_ip(&self, family: u16) -> Option<IpAddr> {
        match family as i32 {
            libc::AF_INET => Some(IpAddr::V4(Ipv4Addr::new(
                self.bytes[0],
                self.bytes[1],
                self.bytes[2],
                self.bytes[3],
            ))),
            libc::AF_INET6 => Some(IpAddr::V6(Ipv6Addr::from(self.bytes))),
            _ => None,
        }
    }
}

/// XFRM ID (identifies an SA by destination, SPI, and protocol).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmId {
    /// Destination address.
    pub daddr: XfrmAddress,
    /// Security Parameter Index (network byte order on the wire).
    pub spi: u32,
    /// IPsec protocol (ESP, AH, COMP).
    pub proto: u8,
    /// Padding.
    pub _pad: [u8; 3],
}

/// XFRM selector (traffic selector for policies/SAs).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmSelector {
    /// Destination address.
    pub daddr: XfrmAddress,
    /// Source address.
    pub saddr: XfrmAddress,
    /// Destination port (network byte order).
    pub dport: u16,
    /// Destination port mask.
    pub dport_mask: u16,
    /// Source port (network byte order).
    pub sport: u16,
    /// Source port mask.
    pub sport_mask: u16,
    /// Address family.
    pub family: u16,
    /// Destination prefix length.
    pub prefixlen_d: u8,
    /// Source prefix length.
    pub prefixlen_s: u8,
    /// IP protocol.
    pub proto: u8,
    /// Padding to align ifindex to 4 bytes.
    pub _pad: [u8; 3],
    /// Interface index.
    pub ifindex: i32,
    /// User ID.
    pub user: u32,
}

/// XFRM lifetime configuration.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmLifetimeCfg {
    pub soft_byte_limit: u64,
    pub hard_byte_limit: u64,
    pub soft_packet_limit: u64,
    pub hard_packet_limit: u64,
    pub soft_add_expires_seconds: u64,
    pub hard_add_expires_seconds: u64,
    pub soft_use_expires_seconds: u64,
    pub hard_use_expires_seconds: u64,
}

/// XFRM lifetime current values.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmLifetimeCur {
    /// Bytes processed.
    pub bytes: u64,
    /// Packets processed.
    pub packets: u64,
    /// Time added.
    pub add_time: u64,
    /// Time last used.
    pub use_time: u64,
}

/// XFRM statistics.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmStats {
    /// Replay window.
    pub replay_window: u32,
    /// Replay count.
    pub replay: u32,
    /// Integrity check failures.
    pub integrity_failed: u32,
}

/// xfrm_usersa_info: the fixed-size prefix of SA notifications.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUsersaInfo {
    /// Traffic selector.
    pub sel: XfrmSelector,
    /// SA identifier.
    pub id: XfrmId,
    /// Source address.
    pub saddr: XfrmAddress,
    /// Lifetime configuration.
    pub lft: XfrmLifetimeCfg,
    /// Current lifetime values.
    pub curlft: XfrmLifetimeCur,
    /// Statistics.
    pub stats: XfrmStats,
    /// Sequence number.
    pub seq: u32,
    /// Request ID.
    pub reqid: u32,
    /// Address family.
    pub family: u16,
    /// Mode (transport/tunnel/beet).
    pub mode: u8,
    /// Replay window size.
    pub replay_window: u8,
    /// Flags.
    pub flags: u8,
    /// Padding to the 8-byte-aligned struct size.
    pub _pad: [u8; 7],
}

/// xfrm_usersa_id: the fixed-size prefix of DELSA notifications.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUsersaId {
    /// Destination address.
    pub daddr: XfrmAddress,
    /// SPI (network byte order).
    pub spi: u32,
    /// Address family.
    pub family: u16,
    /// IPsec protocol.
    pub proto: u8,
    /// Padding.
    pub _pad: u8,
}

/// xfrm_user_expire: SA lifetime expiration notification.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUserExpire {
    /// The expiring SA.
    pub state: XfrmUsersaInfo,
    /// Non-zero for a hard expiration (SA removed), zero for soft.
    pub hard: u8,
    /// Padding.
    pub _pad: [u8; 7],
}

/// xfrm_userpolicy_info: the fixed-size prefix of policy notifications.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUserpolicyInfo {
    /// Traffic selector.
    pub sel: XfrmSelector,
    /// Lifetime configuration.
    pub lft: XfrmLifetimeCfg,
    /// Current lifetime values.
    pub curlft: XfrmLifetimeCur,
    /// Priority.
    pub priority: u32,
    /// Policy index.
    pub index: u32,
    /// Direction (in/out/fwd).
    pub dir: u8,
    /// Action (allow/block).
    pub action: u8,
    /// Flags.
    pub flags: u8,
    /// Share mode.
    pub share: u8,
    /// Padding to the 8-byte-aligned struct size.
    pub _pad: [u8; 4],
}

/// xfrm_userpolicy_id: the fixed-size prefix of DELPOLICY notifications.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUserpolicyId {
    /// Traffic selector.
    pub sel: XfrmSelector,
    /// Policy index.
    pub index: u32,
    /// Direction.
    pub dir: u8,
    /// Padding.
    pub _pad: [u8; 3],
}

/// xfrm_user_tmpl: one template entry in a policy's XFRMA_TMPL attribute.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUserTmpl {
    /// SA identifier (destination, SPI, protocol).
    pub id: XfrmId,
    /// Address family.
    pub family: u16,
    /// Padding.
    pub _pad1: [u8; 2],
    /// Source address.
    pub saddr: XfrmAddress,
    /// Request ID.
    pub reqid: u32,
    /// Mode.
    pub mode: u8,
    /// Share mode.
    pub share: u8,
    /// Non-zero if the template is optional.
    pub optional: u8,
    /// Padding.
    pub _pad2: u8,
    /// Allowed authentication algorithms bitmask.
    pub aalgos: u32,
    /// Allowed encryption algorithms bitmask.
    pub ealgos: u32,
    /// Allowed compression algorithms bitmask.
    pub calgos: u32,
}

/// XFRM encapsulation template (UDP encapsulation for NAT traversal).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmEncapTmpl {
    /// Encapsulation type.
    pub encap_type: u16,
    /// Source port (network byte order).
    pub encap_sport: u16,
    /// Destination port (network byte order).
    pub encap_dport: u16,
    /// Padding.
    pub _pad: u16,
    /// Original address.
    pub encap_oa: XfrmAddress,
}

/// XFRM mark.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmMark {
    /// Mark value.
    pub v: u32,
    /// Mark mask.
    pub m: u32,
}

/// IPsec protocol type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpsecProtocol {
    /// Encapsulating Security Payload.
    Esp,
    /// Authentication Header.
    Ah,
    /// IP Compression.
    Comp,
    /// Other protocol.
    Other(u8),
}

impl IpsecProtocol {
    /// Total lookup: every code maps to a variant, never fails.
    pub fn from_u8(val: u8) -> Self {
        match val {
            IPPROTO_ESP => Self::Esp,
            IPPROTO_AH => Self::Ah,
            IPPROTO_COMP => Self::Comp,
            other => Self::Other(other),
        }
    }

    /// Get the protocol number.
    pub fn number(&self) -> u8 {
        match self {
            Self::Esp => IPPROTO_ESP,
            Self::Ah => IPPROTO_AH,
            Self::Comp => IPPROTO_COMP,
            Self::Other(n) => *n,
        }
    }
}

impl std::fmt::Display for IpsecProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Esp => write!(f, "esp"),
            Self::Ah => write!(f, "ah"),
            Self::Comp => write!(f, "comp"),
            Self::Other(n) => write!(f, "unknown({})", n),
        }
    }
}

/// XFRM mode (transport, tunnel, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaMode {
    /// Transport mode.
    Transport,
    /// Tunnel mode.
    Tunnel,
    /// BEET mode.
    Beet,
    /// Other mode.
    Other(u8),
}

impl SaMode {
    /// Total lookup: every code maps to a variant, never fails.
    pub fn from_u8(val: u8) -> Self {
        match val {
            XFRM_MODE_TRANSPORT => Self::Transport,
            XFRM_MODE_TUNNEL => Self::Tunnel,
            XFRM_MODE_BEET => Self::Beet,
            other => Self::Other(other),
        }
    }
}

impl std::fmt::Display for SaMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Tunnel => write!(f, "tunnel"),
            Self::Beet => write!(f, "beet"),
            Self::Other(n) => write!(f, "unknown({})", n),
        }
    }
}

/// Policy direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDirection {
    /// Incoming traffic.
    In,
    /// Outgoing traffic.
    Out,
    /// Forwarded traffic.
    Forward,
    /// Unknown direction.
    Unknown(u8),
}

impl PolicyDirection {
    /// Total lookup: every code maps to a variant, never fails.
    pub fn from_u8(val: u8) -> Self {
        match val {
            XFRM_POLICY_IN => Self::In,
            XFRM_POLICY_OUT => Self::Out,
            XFRM_POLICY_FWD => Self::Forward,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for PolicyDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In => write!(f, "in"),
            Self::Out => write!(f, "out"),
            Self::Forward => write!(f, "fwd"),
            Self::Unknown(n) => write!(f, "unknown({})", n),
        }
    }
}

/// Policy action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    /// Allow traffic.
    Allow,
    /// Block traffic.
    Block,
    /// Unknown action.
    Unknown(u8),
}

impl PolicyAction {
    /// Total lookup: every code maps to a variant, never fails.
    pub fn from_u8(val: u8) -> Self {
        match val {
            XFRM_POLICY_ALLOW => Self::Allow,
            XFRM_POLICY_BLOCK => Self::Block,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Block => write!(f, "block"),
            Self::Unknown(n) => write!(f, "unknown({})", n),
        }
    }
}

/// A decoded XFRM algorithm (encryption or compression).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XfrmAlgo {
    /// Algorithm name.
    pub name: String,
    /// Key length in bits.
    pub key_len: u32,
    /// Key data (owned copy).
    pub key: Vec<u8>,
}

/// A decoded authentication algorithm with ICV truncation length.
///
/// `trunc_len` is zero when the kernel sent the legacy XFRMA_ALG_AUTH
/// attribute, which does not carry one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XfrmAlgoAuth {
    /// Algorithm name.
    pub name: String,
    /// Key length in bits.
    pub key_len: u32,
    /// Truncation length in bits (0 if not carried).
    pub trunc_len: u32,
    /// Key data (owned copy).
    pub key: Vec<u8>,
}

/// A decoded AEAD algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XfrmAlgoAead {
    /// Algorithm name.
    pub name: String,
    /// Key length in bits.
    pub key_len: u32,
    /// ICV length in bits.
    pub icv_len: u32,
    /// Key data (owned copy).
    pub key: Vec<u8>,
}

/// A traffic selector in decoded form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficSelector {
    /// Source address (raw, family-tagged by `family`).
    pub src: XfrmAddress,
    /// Destination address.
    pub dst: XfrmAddress,
    /// Address family of the selector addresses.
    pub family: u16,
    /// Source prefix length.
    pub src_prefix_len: u8,
    /// Destination prefix length.
    pub dst_prefix_len: u8,
    /// Source port (host order), if matched.
    pub src_port: Option<u16>,
    /// Destination port (host order), if matched.
    pub dst_port: Option<u16>,
    /// IP protocol (0 = any).
    pub proto: u8,
    /// Interface index (0 = any).
    pub ifindex: i32,
}

impl TrafficSelector {
    fn from_wire(sel: XfrmSelector) -> Self {
        let sport = sel.sport;
        let dport = sel.dport;
        Self {
            src: sel.saddr,
            dst: sel.daddr,
            family: sel.family,
            src_prefix_len: sel.prefixlen_s,
            dst_prefix_len: sel.prefixlen_d,
            src_port: if sport != 0 {
                Some(u16::from_be(sport))
            } else {
                None
            },
            dst_port: if dport != 0 {
                Some(u16::from_be(dport))
            } else {
                None
            },
            proto: sel.proto,
            ifindex: sel.ifindex,
        }
    }

    /// Source address as an IP address, if the family is known.
    pub fn src_ip(&self) -> Option<IpAddr> {
        self.src.to_ip(self.family)
    }

    /// Destination address as an IP address, if the family is known.
    pub fn dst_ip(&self) -> Option<IpAddr> {
        self.dst.to_ip(self.family)
    }
}

/// Compact SA identifier carried by delete notifications.
#[derive(Debug, Clone)]
pub struct SaId {
    /// Destination address.
    pub dst: XfrmAddress,
    /// Address family.
    pub family: u16,
    /// SPI (host order).
    pub spi: u32,
    /// IPsec protocol.
    pub protocol: IpsecProtocol,
}

impl SaId {
    /// Destination as an IP address, if the family is known.
    pub fn dst_ip(&self) -> Option<IpAddr> {
        self.dst.to_ip(self.family)
    }
}

/// A decoded Security Association.
#[derive(Debug, Clone)]
pub struct SaRecord {
    /// Address family of src/dst.
    pub family: u16,
    /// Source address (raw, family-tagged).
    pub src: XfrmAddress,
    /// Destination address.
    pub dst: XfrmAddress,
    /// SPI (host order).
    pub spi: u32,
    /// IPsec protocol.
    pub protocol: IpsecProtocol,
    /// Mode (transport/tunnel).
    pub mode: SaMode,
    /// Request ID.
    pub reqid: u32,
    /// Traffic selector.
    pub selector: TrafficSelector,
    /// Replay window size.
    pub replay_window: u8,
    /// Replay threshold (XFRMA_REPLAY_THRESH).
    pub replay_threshold: Option<u32>,
    /// SA flags.
    pub flags: u8,
    /// Bytes processed.
    pub bytes: u64,
    /// Packets processed.
    pub packets: u64,
    /// Authentication algorithm.
    pub auth: Option<XfrmAlgoAuth>,
    /// Encryption algorithm.
    pub enc: Option<XfrmAlgo>,
    /// AEAD algorithm.
    pub aead: Option<XfrmAlgoAead>,
    /// Compression algorithm.
    pub comp: Option<XfrmAlgo>,
    /// UDP encapsulation template.
    pub encap: Option<XfrmEncapTmpl>,
    /// Mark.
    pub mark: Option<XfrmMark>,
    /// Interface ID.
    pub if_id: Option<u32>,
}

impl SaRecord {
    /// Source as an IP address, if the family is known.
    pub fn src_ip(&self) -> Option<IpAddr> {
        self.src.to_ip(self.family)
    }

    /// Destination as an IP address, if the family is known.
    pub fn dst_ip(&self) -> Option<IpAddr> {
        self.dst.to_ip(self.family)
    }

    fn from_info(info: &XfrmUsersaInfo) -> Self {
        let id = info.id;
        let curlft = info.curlft;
        Self {
            family: info.family,
            src: info.saddr,
            dst: id.daddr,
            spi: u32::from_be(id.spi),
            protocol: IpsecProtocol::from_u8(id.proto),
            mode: SaMode::from_u8(info.mode),
            reqid: info.reqid,
            selector: TrafficSelector::from_wire(info.sel),
            replay_window: info.replay_window,
            replay_threshold: None,
            flags: info.flags,
            bytes: curlft.bytes,
            packets: curlft.packets,
            auth: None,
            enc: None,
            aead: None,
            comp: None,
            encap: None,
            mark: None,
            if_id: None,
        }
    }

    /// Decode an SA notification payload (xfrm_usersa_info + attributes).
    ///
    /// Used for NEWSA, UPDSA, and GETSA responses. A TLV whose declared
    /// length runs past the payload is a decode error; a structurally valid
    /// attribute with an undersized value just leaves its field unset.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (info, rest) =
            XfrmUsersaInfo::read_from_prefix(payload).map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<XfrmUsersaInfo>(),
                actual: payload.len(),
            })?;

        let mut sa = Self::from_info(&info);
        sa.apply_attrs(rest)?;
        Ok(sa)
    }

    /// Decode a DELSA payload (xfrm_usersa_id + attributes).
    ///
    /// The kernel attaches the full xfrm_usersa_info as XFRMA_SA; when
    /// present the returned record is populated from it, otherwise only the
    /// compact id is available.
    pub fn parse_del(payload: &[u8]) -> Result<(SaId, Option<Self>)> {
        let (id, rest) = XfrmUsersaId::read_from_prefix(payload).map_err(|_| Error::Truncated {
            expected: std::mem::size_of::<XfrmUsersaId>(),
            actual: payload.len(),
        })?;

        let sa_id = SaId {
            dst: id.daddr,
            family: id.family,
            spi: u32::from_be(id.spi),
            protocol: IpsecProtocol::from_u8(id.proto),
        };

        let mut sa = None;
        for attr in AttrIter::new(rest) {
            let (attr_type, data) = attr?;
            if attr_type == XFRMA_SA
                && let Ok((info, _)) = XfrmUsersaInfo::read_from_prefix(data)
            {
                sa = Some(Self::from_info(&info));
            }
        }

        Ok((sa_id, sa))
    }

    /// Decode an EXPIRE payload (xfrm_user_expire + attributes).
    ///
    /// Returns the expiring SA and whether the expiration was hard.
    pub fn parse_expire(payload: &[u8]) -> Result<(Self, bool)> {
        let (expire, rest) =
            XfrmUserExpire::read_from_prefix(payload).map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<XfrmUserExpire>(),
                actual: payload.len(),
            })?;

        let state = expire.state;
        let mut sa = Self::from_info(&state);
        sa.apply_attrs(rest)?;
        Ok((sa, expire.hard != 0))
    }

    fn apply_attrs(&mut self, attrs: &[u8]) -> Result<()> {
        for attr in AttrIter::new(attrs) {
            let (attr_type, data) = attr?;
            match attr_type {
                XFRMA_ALG_CRYPT => self.enc = parse_algo(data),
                XFRMA_ALG_COMP => self.comp = parse_algo(data),
                XFRMA_ALG_AUTH => {
                    // Legacy attribute without a truncation length; the
                    // AUTH_TRUNC form wins if both are present.
                    if self.auth.is_none() {
                        self.auth = parse_algo(data).map(|a| XfrmAlgoAuth {
                            name: a.name,
                            key_len: a.key_len,
                            trunc_len: 0,
                            key: a.key,
                        });
                    }
                }
                XFRMA_ALG_AUTH_TRUNC => self.auth = parse_algo_auth(data),
                XFRMA_ALG_AEAD => self.aead = parse_algo_aead(data),
                XFRMA_ENCAP => {
                    if let Ok((encap, _)) = XfrmEncapTmpl::read_from_prefix(data) {
                        self.encap = Some(encap);
                    }
                }
                XFRMA_REPLAY_THRESH => {
                    if data.len() >= 4 {
                        self.replay_threshold =
                            Some(u32::from_ne_bytes([data[0], data[1], data[2], data[3]]));
                    }
                }
                XFRMA_MARK => {
                    if let Ok((mark, _)) = XfrmMark::read_from_prefix(data) {
                        self.mark = Some(mark);
                    }
                }
                XFRMA_IF_ID => {
                    if data.len() >= 4 {
                        self.if_id = Some(u32::from_ne_bytes([data[0], data[1], data[2], data[3]]));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Compact policy identifier carried by delete notifications.
#[derive(Debug, Clone)]
pub struct PolicyId {
    /// Traffic selector.
    pub selector: TrafficSelector,
    /// Policy index.
    pub index: u32,
    /// Direction.
    pub direction: PolicyDirection,
}

/// One template entry from a policy's XFRMA_TMPL attribute.
#[derive(Debug, Clone)]
pub struct PolicyTemplate {
    /// IPsec protocol the template requires.
    pub protocol: IpsecProtocol,
    /// Mode.
    pub mode: SaMode,
    /// Request ID tying the template to SAs.
    pub reqid: u32,
    /// SPI (host order, 0 = any).
    pub spi: u32,
    /// True if the template may be skipped.
    pub optional: bool,
}

/// A decoded Security Policy.
#[derive(Debug, Clone)]
pub struct SpRecord {
    /// Traffic selector.
    pub selector: TrafficSelector,
    /// Policy direction.
    pub direction: PolicyDirection,
    /// Policy action.
    pub action: PolicyAction,
    /// Priority.
    pub priority: u32,
    /// Policy index.
    pub index: u32,
    /// Share mode.
    pub share: u8,
    /// Flags.
    pub flags: u8,
    /// Mark.
    pub mark: Option<XfrmMark>,
    /// Interface ID.
    pub if_id: Option<u32>,
    /// Templates from XFRMA_TMPL.
    pub templates: Vec<PolicyTemplate>,
}

impl SpRecord {
    fn from_info(info: &XfrmUserpolicyInfo) -> Self {
        Self {
            selector: TrafficSelector::from_wire(info.sel),
            direction: PolicyDirection::from_u8(info.dir),
            action: PolicyAction::from_u8(info.action),
            priority: info.priority,
            index: info.index,
            share: info.share,
            flags: info.flags,
            mark: None,
            if_id: None,
            templates: Vec::new(),
        }
    }

    /// Decode a policy notification payload (xfrm_userpolicy_info +
    /// attributes). Used for NEWPOLICY, UPDPOLICY, and GETPOLICY responses.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (info, rest) =
            XfrmUserpolicyInfo::read_from_prefix(payload).map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<XfrmUserpolicyInfo>(),
                actual: payload.len(),
            })?;

        let mut policy = Self::from_info(&info);
        policy.apply_attrs(rest)?;
        Ok(policy)
    }

    /// Decode a DELPOLICY payload (xfrm_userpolicy_id + attributes).
    ///
    /// The full xfrm_userpolicy_info rides along as XFRMA_POLICY when the
    /// kernel includes it.
    pub fn parse_del(payload: &[u8]) -> Result<(PolicyId, Option<Self>)> {
        let (id, rest) =
            XfrmUserpolicyId::read_from_prefix(payload).map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<XfrmUserpolicyId>(),
                actual: payload.len(),
            })?;

        let policy_id = PolicyId {
            selector: TrafficSelector::from_wire(id.sel),
            index: id.index,
            direction: PolicyDirection::from_u8(id.dir),
        };

        let mut policy = None;
        for attr in AttrIter::new(rest) {
            let (attr_type, data) = attr?;
            if attr_type == XFRMA_POLICY
                && let Ok((info, _)) = XfrmUserpolicyInfo::read_from_prefix(data)
            {
                policy = Some(Self::from_info(&info));
            }
        }

        Ok((policy_id, policy))
    }

    fn apply_attrs(&mut self, attrs: &[u8]) -> Result<()> {
        for attr in AttrIter::new(attrs) {
            let (attr_type, data) = attr?;
            match attr_type {
                XFRMA_TMPL => self.templates = parse_templates(data),
                XFRMA_MARK => {
                    if let Ok((mark, _)) = XfrmMark::read_from_prefix(data) {
                        self.mark = Some(mark);
                    }
                }
                XFRMA_IF_ID => {
                    if data.len() >= 4 {
                        self.if_id = Some(u32::from_ne_bytes([data[0], data[1], data[2], data[3]]));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Decode a FLUSHSA payload (xfrm_usersa_flush: a single protocol byte).
pub fn parse_flush_sa(payload: &[u8]) -> Result<IpsecProtocol> {
    if payload.is_empty() {
        return Err(Error::Truncated {
            expected: 1,
            actual: 0,
        });
    }
    Ok(IpsecProtocol::from_u8(payload[0]))
}

/// Parse an XFRMA_TMPL value: an array of xfrm_user_tmpl entries.
fn parse_templates(data: &[u8]) -> Vec<PolicyTemplate> {
    const TMPL_SIZE: usize = std::mem::size_of::<XfrmUserTmpl>();
    let mut templates = Vec::with_capacity(data.len() / TMPL_SIZE);
    let mut rest = data;
    while let Ok((tmpl, tail)) = XfrmUserTmpl::read_from_prefix(rest) {
        let id = tmpl.id;
        templates.push(PolicyTemplate {
            protocol: IpsecProtocol::from_u8(id.proto),
            mode: SaMode::from_u8(tmpl.mode),
            reqid: tmpl.reqid,
            spi: u32::from_be(id.spi),
            optional: tmpl.optional != 0,
        });
        rest = tail;
    }
    templates
}

/// Parse an xfrm_algo value: 64-byte name, key length in bits, key data.
fn parse_algo(data: &[u8]) -> Option<XfrmAlgo> {
    if data.len() < 68 {
        return None;
    }

    let name = parse_cstring(&data[..64]);
    let key_len = u32::from_ne_bytes([data[64], data[65], data[66], data[67]]);
    let key_bytes = (key_len as usize).div_ceil(8);
    let key = if data.len() >= 68 + key_bytes {
        data[68..68 + key_bytes].to_vec()
    } else {
        Vec::new()
    };

    Some(XfrmAlgo { name, key_len, key })
}

/// Parse an xfrm_algo_auth value: name, key length, truncation length, key.
fn parse_algo_auth(data: &[u8]) -> Option<XfrmAlgoAuth> {
    if data.len() < 72 {
        return None;
    }

    let name = parse_cstring(&data[..64]);
    let key_len = u32::from_ne_bytes([data[64], data[65], data[66], data[67]]);
    let trunc_len = u32::from_ne_bytes([data[68], data[69], data[70], data[71]]);
    let key_bytes = (key_len as usize).div_ceil(8);
    let key = if data.len() >= 72 + key_bytes {
        data[72..72 + key_bytes].to_vec()
    } else {
        Vec::new()
    };

    Some(XfrmAlgoAuth {
        name,
        key_len,
        trunc_len,
        key,
    })
}

/// Parse an xfrm_algo_aead value: name, key length, ICV length, key.
fn parse_algo_aead(data: &[u8]) -> Option<XfrmAlgoAead> {
    if data.len() < 72 {
        return None;
    }

    let name = parse_cstring(&data[..64]);
    let key_len = u32::from_ne_bytes([data[64], data[65], data[66], data[67]]);
    let icv_len = u32::from_ne_bytes([data[68], data[69], data[70], data[71]]);
    let key_bytes = (key_len as usize).div_ceil(8);
    let key = if data.len() >= 72 + key_bytes {
        data[72..72 + key_bytes].to_vec()
    } else {
        Vec::new()
    };

    Some(XfrmAlgoAead {
        name,
        key_len,
        icv_len,
        key,
    })
}

/// Parse a C string from a fixed-size buffer.
fn parse_cstring(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}
