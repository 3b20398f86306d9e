//! EDHOC (Ephemeral Diffie-Hellman Over COSE): the three-message,
//! signature-authenticated key exchange that bootstraps an OSCORE
//! security context between a client and a resource server.

pub mod kdf;
pub mod messages;
pub mod session;

pub use session::{Msg1Receiver, Msg1Sender, Msg2Receiver, Msg2Sender, Msg3Receiver, Msg3Sender, Msg3Verifier};
