//! `COSE_Encrypt0` over AES-CCM-16-64-128: a 128-bit key, a 13-byte nonce
//! and an 8-byte (64-bit) authentication tag, matching the crate's one
//! mandatory cipher suite.
//!
//! Unlike a bare AEAD call, `encrypt`/`decrypt` here produce and consume
//! the full `COSE_Encrypt0` structure, `[protected, unprotected,
//! ciphertext]` (RFC 9052 §5.2) — the protected header bytes are folded
//! into the AAD via [`super::build_enc_structure`], the unprotected header
//! travels alongside the ciphertext untouched by the AEAD.

use super::Result;
use crate::cbor;
use crate::error::Error;
use aes::Aes128;
use ccm::aead::{Aead, Payload};
use ccm::consts::{U13, U8};
use ccm::{Ccm, KeyInit};

pub const KEY_LEN: usize = 16;
pub const NONCE_LEN: usize = 13;
pub const TAG_LEN: usize = 8;

type AesCcm = Ccm<Aes128, U8, U13>;

pub struct Encrypt0;

impl Encrypt0 {
    /// Encrypts `plaintext` and wraps the result as `[protected,
    /// unprotected, ciphertext]`. `protected` is folded into the AEAD's
    /// additional data along with `external_aad`; `unprotected` is an
    /// already-CBOR-encoded map (e.g. `{}` or a Partial IV header) carried
    /// alongside the ciphertext rather than authenticated by position.
    pub fn encrypt(
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        protected: &[u8],
        unprotected: &[u8],
        external_aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let aad = super::build_enc_structure(protected, external_aad)?;
        let cipher = AesCcm::new(key.into());
        let ciphertext = cipher
            .encrypt(nonce.into(), Payload { msg: plaintext, aad: &aad })
            .map_err(|_| Error::MalformedCose)?;
        Ok(cbor::encode_array(&[
            &cbor::encode_bstr(protected),
            unprotected,
            &cbor::encode_bstr(&ciphertext),
        ]))
    }

    /// Parses a `[protected, unprotected, ciphertext]` structure and
    /// decrypts it. `external_aad` is the caller's own transcript/context
    /// binding; the protected header is read back out of `serialized`
    /// itself rather than passed in, since it travels on the wire.
    pub fn decrypt(key: &[u8; KEY_LEN], nonce: &[u8; NONCE_LEN], external_aad: &[u8], serialized: &[u8]) -> Result<Vec<u8>> {
        let items = cbor::split_top_array(serialized)?;
        let [protected_item, _unprotected_item, ciphertext_item] = items.as_slice() else {
            return Err(Error::MalformedCose);
        };
        let protected = cbor::bstr_contents(protected_item)?;
        let ciphertext = cbor::bstr_contents(ciphertext_item)?;
        let aad = super::build_enc_structure(protected, external_aad)?;
        let cipher = AesCcm::new(key.into());
        cipher
            .decrypt(nonce.into(), Payload { msg: ciphertext, aad: &aad })
            .map_err(|_| Error::DecryptionFailed)
    }
}
