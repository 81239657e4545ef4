//! Netlink message header and frame splitting.
//!
//! A single datagram from the kernel may carry several netlink messages
//! back to back, each aligned to 4 bytes. [`FrameIter`] walks them in
//! arrival order and stops at the first malformed header; whatever trailed
//! it is dropped and reported through [`FrameIter::dropped_trailing`] so
//! the caller can count it.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Netlink message header alignment.
pub const NLMSG_ALIGNTO: usize = 4;

/// Align a length to NLMSG_ALIGNTO boundary.
#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// Size of the netlink message header.
pub const NLMSG_HDRLEN: usize = nlmsg_align(std::mem::size_of::<NlMsgHdr>());

/// Netlink message header (mirrors struct nlmsghdr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    /// Length of message including header.
    pub nlmsg_len: u32,
    /// Message type.
    pub nlmsg_type: u16,
    /// Additional flags.
    pub nlmsg_flags: u16,
    /// Sequence number.
    pub nlmsg_seq: u32,
    /// Sending process port ID.
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nlmsg_len as usize).saturating_sub(NLMSG_HDRLEN)
    }

    /// Parse header from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Iterator over netlink frames in a receive buffer.
///
/// Yields `(header, payload)` for each well-formed frame. Iteration ends at
/// the first frame whose declared length is shorter than the header or runs
/// past the end of the buffer; that frame and anything after it is dropped.
pub struct FrameIter<'a> {
    data: &'a [u8],
    dropped_trailing: bool,
}

impl<'a> FrameIter<'a> {
    /// Create a new frame iterator over a receive buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            dropped_trailing: false,
        }
    }

    /// True if iteration stopped on a malformed frame and dropped trailing
    /// bytes. Valid once the iterator is exhausted.
    pub fn dropped_trailing(&self) -> bool {
        self.dropped_trailing
    }
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = (&'a NlMsgHdr, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        if self.data.len() < NLMSG_HDRLEN {
            // Trailing bytes too short to hold a header.
            self.dropped_trailing = true;
            self.data = &[];
            return None;
        }

        let header = match NlMsgHdr::from_bytes(self.data) {
            Ok(h) => h,
            Err(_) => {
                self.dropped_trailing = true;
                self.data = &[];
                return None;
            }
        };

        let msg_len = header.nlmsg_len as usize;
        if msg_len < NLMSG_HDRLEN || msg_len > self.data.len() {
            self.dropped_trailing = true;
            self.data = &[];
            return None;
        }

        let payload = &self.data[NLMSG_HDRLEN..msg_len];
        let aligned_len = nlmsg_align(msg_len);

        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some((header, payload))
    }
}
