//! Netlink attribute (nlattr) TLV handling.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4;

/// Netlink attribute header (mirrors struct nlattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

impl NlAttr {
    /// Create a new attribute header.
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nla_len as usize).saturating_sub(NLA_HDRLEN)
    }
}

/// Iterator over netlink attributes in a payload.
///
/// Each item is `Ok((type, value))` for a well-formed TLV. A TLV whose
/// declared length is shorter than the header or runs past the end of the
/// payload yields one `Err` and ends iteration; the whole attribute block
/// is considered undecodable past that point.
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Result<(u16, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < NLA_HDRLEN {
            // A few pad bytes at the end are normal; anything shorter than
            // a header cannot be a TLV.
            return None;
        }

        let attr = match NlAttr::ref_from_prefix(self.data) {
            Ok((a, _)) => *a,
            Err(_) => return None,
        };

        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN || len > self.data.len() {
            self.data = &[];
            return Some(Err(Error::InvalidAttribute(format!(
                "TLV type {} declares {} bytes past end of payload",
                attr.nla_type, len
            ))));
        }

        let payload = &self.data[NLA_HDRLEN..len];
        let aligned_len = nla_align(len);

        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Ok((attr.nla_type, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::fixtures::push_attr;

    #[test]
    fn walks_attributes_in_order() {
        let mut buf = Vec::new();
        push_attr(&mut buf, 1, &[0xaa; 6]);
        push_attr(&mut buf, 2, &[0xbb; 4]);
        push_attr(&mut buf, 31, &[1, 0, 0, 0]);

        let attrs: Vec<_> = AttrIter::new(&buf).map(|r| r.unwrap()).collect();
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[0], (1, &[0xaa; 6][..]));
        assert_eq!(attrs[1], (2, &[0xbb; 4][..]));
        assert_eq!(attrs[2].0, 31);
    }

    #[test]
    fn overlong_tlv_is_an_error() {
        let mut buf = Vec::new();
        push_attr(&mut buf, 1, &[0xaa; 4]);
        // Hand-craft a TLV claiming 64 bytes with only 4 present.
        buf.extend_from_slice(&64u16.to_ne_bytes());
        buf.extend_from_slice(&2u16.to_ne_bytes());
        buf.extend_from_slice(&[0; 4]);

        let mut iter = AttrIter::new(&buf);
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(
            iter.next(),
            Some(Err(Error::InvalidAttribute(_)))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn trailing_padding_is_ignored() {
        let mut buf = Vec::new();
        push_attr(&mut buf, 5, &[1, 2, 3]);
        buf.extend_from_slice(&[0, 0]); // stray pad, shorter than a header

        let attrs: Vec<_> = AttrIter::new(&buf).collect();
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn empty_payload() {
        assert!(AttrIter::new(&[]).next().is_none());
    }

    #[test]
    fn header_roundtrip() {
        let attr = NlAttr::new(7, 10);
        assert_eq!(attr.nla_len, 14);
        assert_eq!(attr.payload_len(), 10);
    }
}
