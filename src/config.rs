//! Crate-wide constants and the handful of values an embedder may want to
//! tune. Deliberately not fed from a file or environment variables: this
//! crate is a library meant to run on constrained devices, and where its
//! configuration comes from is a decision for the embedder's own
//! bootstrap code, not this crate's core.

/// How long an access token remains valid after issuance, in seconds.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 7_200;

/// Byte length of a freshly minted CWT ID.
pub const CTI_LEN: usize = 8;

/// Byte length of an EDHOC connection identifier this crate generates
/// (callers may supply their own of any length when initiating).
pub const CONNECTION_ID_LEN: usize = 2;

#[derive(Clone, Debug)]
pub struct Config {
    pub token_lifetime_secs: u64,
    pub issuer: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token_lifetime_secs: DEFAULT_TOKEN_LIFETIME_SECS,
            issuer: "ace-as".to_string(),
        }
    }
}
