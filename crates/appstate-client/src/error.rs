//! Client error types.

use appstate_core::CodecError;
use appstate_proto::ProtocolError;
use thiserror::Error;

use crate::channel::ChannelError;

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Data or admin operation issued before joining an application.
    #[error("not joined to an application")]
    NotJoined,

    /// Server rejected the command.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Request could not be delivered or the response not received.
    #[error("transport error: {0}")]
    Transport(#[from] ChannelError),

    /// Value could not be encoded or the stored bytes decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Server answered with a reply that does not fit the command.
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply {
        /// Command that was sent.
        command: &'static str,
        /// Debug rendering of the reply.
        reply: String,
    },
}

impl ClientError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors indicate a server fault or a client/server mismatch.
    /// Everything else is an outcome the caller can act on.
    pub fn is_fatal(&self) -> bool {
        match self {
            // Fatal: peers disagree about the protocol or the value type
            Self::UnexpectedReply { .. } | Self::Codec(_) => true,
            Self::Protocol(e) => matches!(e, ProtocolError::Internal { .. }),

            // Transient or caller-actionable
            Self::NotJoined | Self::Transport(_) => false,
        }
    }

    /// Protocol outcome carried by this error, if any.
    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the server reported no value under the key.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self.protocol(), Some(ProtocolError::KeyNotFound { .. }))
    }

    /// Whether the server rejected a compare-and-swap on a stale hash.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self.protocol(), Some(ProtocolError::VersionMismatch { .. }))
    }
}

#[cfg(test)]
mod tests {
    use appstate_proto::Access;

    use super::*;

    #[test]
    fn not_joined_is_transient() {
        assert!(!ClientError::NotJoined.is_fatal());
    }

    #[test]
    fn internal_is_fatal() {
        let err = ClientError::from(ProtocolError::Internal { reason: "disk".into() });
        assert!(err.is_fatal());
    }

    #[test]
    fn permission_denied_is_actionable() {
        let err = ClientError::from(ProtocolError::PermissionDenied { access: Access::Write });
        assert!(!err.is_fatal());
        assert_eq!(err.protocol(), Some(&ProtocolError::PermissionDenied { access: Access::Write }));
    }

    #[test]
    fn classifiers() {
        let missing = ClientError::from(ProtocolError::KeyNotFound { key: "k".into() });
        let stale = ClientError::from(ProtocolError::VersionMismatch { key: "k".into() });

        assert!(missing.is_key_not_found() && !missing.is_version_mismatch());
        assert!(stale.is_version_mismatch() && !stale.is_key_not_found());
    }

    #[test]
    fn error_display() {
        let err = ClientError::from(ProtocolError::SizeLimitExceeded { size: 5, limit: 4 });
        assert_eq!(err.to_string(), "value too large: 5 bytes exceeds limit of 4");
    }
}
