//! Transcript hashing and the EDHOC key schedule.
//!
//! A single HKDF-SHA-256 instance, extracted once from the ephemeral-
//! ephemeral ECDH shared secret, is expanded repeatedly (with a distinct
//! `COSE_KDF_Context` each time) into `K_2`/`IV_2`, `K_3`/`IV_3`, and
//! finally `master_secret`/`master_salt` — mirroring how a single shared
//! secret seeds the whole exchange in the source material this was
//! generalized from.

use crate::cose;
use crate::error::Error;
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

pub type Result<T> = core::result::Result<T, Error>;

/// Fixed per the crate's one mandatory cipher suite.
pub const AES_CCM_ALG_ID: &str = "AES-CCM-16-64-128";
const IV_GENERATION_ALG_ID: &str = "IV-GENERATION";
/// Algorithm-id for the OSCORE master secret derivation — distinct from
/// `AES_CCM_ALG_ID` even though both eventually key the same AEAD; the two
/// derivations must not share a `COSE_KDF_Context`.
const OSCORE_MASTER_SECRET_ALG_ID: &str = "OSCORE Master Secret";
/// Algorithm-id for the OSCORE master salt derivation.
const OSCORE_MASTER_SALT_ALG_ID: &str = "OSCORE Master Salt";

pub const KEY_LEN_BITS: usize = 128;
pub const IV_LEN_BITS: usize = 104; // 13 bytes
pub const MASTER_SALT_LEN_BITS: usize = 64; // 8 bytes, resolving the Data Model's 7-vs-8-byte ambiguity in favor of the derivation call

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// TH_2 = SHA-256(message_1 || data_2), where `data_2` is the leading
/// fields of message_2 up to but not including ciphertext_2 (canonical
/// bytes as on the wire) — hashed before ciphertext_2 exists so it can be
/// used as the Sig_structure's external_aad for message_2.
pub fn th2(message_1: &[u8], data_2: &[u8]) -> [u8; 32] {
    sha256(&[message_1, data_2])
}

/// TH_3 = SHA-256(TH_2 || ciphertext_2).
pub fn th3(th_2: &[u8; 32], ciphertext_2_item: &[u8]) -> [u8; 32] {
    sha256(&[th_2, ciphertext_2_item])
}

/// TH_4 = SHA-256(TH_3 || ciphertext_3), the hash bound into the derived
/// OSCORE master secret and salt.
pub fn th4(th_3: &[u8; 32], ciphertext_3_item: &[u8]) -> [u8; 32] {
    sha256(&[th_3, ciphertext_3_item])
}

/// The key schedule derived from a single ephemeral-ephemeral ECDH shared
/// secret. `K_2`/`IV_2` and `K_3`/`IV_3` protect the two signature
/// messages; `master_secret`/`master_salt` seed the downstream OSCORE
/// security context.
pub struct KeySchedule {
    prk: Hkdf<Sha256>,
}

impl KeySchedule {
    /// `shared_secret` must be zeroized by the caller once this is built;
    /// HKDF-Extract only needs it transiently.
    pub fn new(shared_secret: &[u8]) -> Self {
        Self {
            prk: Hkdf::<Sha256>::new(None, shared_secret),
        }
    }

    fn expand<const N: usize>(&self, algorithm_id: &str, length_bits: usize, th: &[u8; 32]) -> Result<[u8; N]> {
        let context = cose::build_kdf_context(algorithm_id, length_bits, th).map_err(|_| Error::MalformedCose)?;
        let mut out = [0u8; N];
        self.prk.expand(&context, &mut out).map_err(|_| Error::MalformedEdhoc)?;
        Ok(out)
    }

    pub fn k2(&self, th_2: &[u8; 32]) -> Result<[u8; 16]> {
        self.expand(AES_CCM_ALG_ID, KEY_LEN_BITS, th_2)
    }

    pub fn iv2(&self, th_2: &[u8; 32]) -> Result<[u8; 13]> {
        self.expand(IV_GENERATION_ALG_ID, IV_LEN_BITS, th_2)
    }

    pub fn k3(&self, th_3: &[u8; 32]) -> Result<[u8; 16]> {
        self.expand(AES_CCM_ALG_ID, KEY_LEN_BITS, th_3)
    }

    pub fn iv3(&self, th_3: &[u8; 32]) -> Result<[u8; 13]> {
        self.expand(IV_GENERATION_ALG_ID, IV_LEN_BITS, th_3)
    }

    pub fn master_secret(&self, th_4: &[u8; 32]) -> Result<[u8; 16]> {
        self.expand(OSCORE_MASTER_SECRET_ALG_ID, KEY_LEN_BITS, th_4)
    }

    pub fn master_salt(&self, th_4: &[u8; 32]) -> Result<[u8; 8]> {
        self.expand(OSCORE_MASTER_SALT_ALG_ID, MASTER_SALT_LEN_BITS, th_4)
    }
}
