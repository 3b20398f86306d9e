//! ACE-OAuth PoP tokens, EDHOC key exchange and OSCORE channel security
//! for constrained IoT devices.
//!
//! A client fetches a proof-of-possession access token from an
//! [`as_server::AuthorizationServer`], presents it to an
//! [`rs_server::ResourceServer`], runs [`edhoc`] to authenticate the PoP
//! key and derive shared key material, and the two sides then exchange
//! [`oscore`]-protected application messages. [`cose`] and [`cbor`]
//! underlie all three layers; [`token`] is the CWT carried between AS and
//! RS.

pub mod as_server;
pub mod cbor;
pub mod config;
pub mod cose;
pub mod edhoc;
pub mod error;
pub mod oscore;
pub mod rs_server;
pub mod token;

pub use config::Config;
pub use error::{Error, OwnError, OwnOrPeerError, Result};
