//! Error types for XFRM netlink operations.

use std::io;

/// Result type for XFRM netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while receiving or decoding XFRM events.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Message or struct was shorter than its fixed layout requires.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected minimum length.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// Invalid attribute encoding (TLV length past end of payload, etc.).
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),
}

impl Error {
    /// Check if this error is transient and the operation should be retried
    /// (interrupted system call, spurious wakeup).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    ///
    /// Opening an XFRM socket with multicast subscriptions requires
    /// CAP_NET_ADMIN, so this is the common setup failure.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Io(e) => matches!(e.raw_os_error(), Some(libc::EPERM | libc::EACCES)),
            _ => false,
        }
    }

    /// Check if this error invalidated a single frame rather than the socket.
    ///
    /// Decode-scope errors drop the offending frame; the receive loop keeps
    /// going. Everything else propagates.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Truncated { .. } | Self::InvalidAttribute(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        let eintr = Error::Io(io::Error::from_raw_os_error(libc::EINTR));
        assert!(eintr.is_transient());

        let eagain = Error::Io(io::Error::from_raw_os_error(libc::EAGAIN));
        assert!(eagain.is_transient());

        let econnreset = Error::Io(io::Error::from_raw_os_error(libc::ECONNRESET));
        assert!(!econnreset.is_transient());
    }

    #[test]
    fn permission_denied() {
        let eperm = Error::Io(io::Error::from_raw_os_error(libc::EPERM));
        assert!(eperm.is_permission_denied());

        let eacces = Error::Io(io::Error::from_raw_os_error(libc::EACCES));
        assert!(eacces.is_permission_denied());

        let enoent = Error::Io(io::Error::from_raw_os_error(libc::ENOENT));
        assert!(!enoent.is_permission_denied());
    }

    #[test]
    fn decode_scope() {
        let err = Error::Truncated {
            expected: 16,
            actual: 4,
        };
        assert!(err.is_decode());
        assert!(!err.is_transient());

        let err = Error::InvalidAttribute("bad TLV".into());
        assert!(err.is_decode());

        let err = Error::Io(io::Error::from_raw_os_error(libc::EBADF));
        assert!(!err.is_decode());
    }

    #[test]
    fn error_messages() {
        let err = Error::Truncated {
            expected: 16,
            actual: 7,
        };
        assert_eq!(
            err.to_string(),
            "message truncated: expected 16 bytes, got 7"
        );

        let err = Error::InvalidAttribute("TLV type 2 declares 64 bytes past end of payload".into());
        assert_eq!(
            err.to_string(),
            "invalid attribute: TLV type 2 declares 64 bytes past end of payload"
        );
    }
}
