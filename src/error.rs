//! Error taxonomy shared by every layer of the stack (CBOR, COSE, EDHOC,
//! the access token, and the AS/RS acceptance logic).
//!
//! Cryptographic and structural failures are never recovered locally: the
//! caller is expected to fail the session or the request immediately and
//! retain no partial state.

use thiserror::Error;

/// One variant per failure mode named in the error handling design.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("malformed CBOR input")]
    MalformedCbor,
    #[error("malformed COSE structure")]
    MalformedCose,
    #[error("malformed EDHOC message")]
    MalformedEdhoc,
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("AEAD decryption failed")]
    DecryptionFailed,
    #[error("unknown peer identity")]
    UnknownPeer,
    #[error("unknown key identifier")]
    UnknownKid,
    #[error("access token expired")]
    TokenExpired,
    #[error("access token invalid")]
    TokenInvalid,
    #[error("message received in the wrong protocol state")]
    StateViolation,
    #[error("scope or audience policy rejected the request")]
    PolicyRejection,
}

pub type Result<T> = core::result::Result<T, Error>;

/// A fault this endpoint detected itself while processing an EDHOC message.
///
/// By the time this is returned the backing session has already moved to
/// `Failed` and had its secrets zeroed; `session_id` is kept around only so
/// the transport can address the `EDHOC-Error` message (`[0, session_id,
/// diagnostic]`, see [`crate::edhoc::messages::MessageError`]) it still owes
/// the peer.
#[derive(Debug, Error)]
#[error("EDHOC session {session_id:02x?} failed: {source}")]
pub struct OwnError {
    pub session_id: Vec<u8>,
    #[source]
    pub source: Error,
}

impl OwnError {
    pub fn new(session_id: impl Into<Vec<u8>>, source: Error) -> Self {
        Self {
            session_id: session_id.into(),
            source,
        }
    }
}

/// The outcome of handling an incoming EDHOC message: either a fault this
/// endpoint detected locally, or an `EDHOC-Error` message the peer sent in
/// place of the expected next message.
#[derive(Debug, Error)]
pub enum OwnOrPeerError {
    #[error(transparent)]
    Own(#[from] OwnError),
    #[error("peer aborted the exchange: {diagnostic}")]
    Peer { diagnostic: String },
}

impl OwnOrPeerError {
    pub fn own(session_id: impl Into<Vec<u8>>, source: Error) -> Self {
        OwnError::new(session_id, source).into()
    }
}
