//! COSE primitives: `Sig_structure`/`Enc_structure`/`COSE_KDF_Context`
//! builders, `COSE_Sign1`, `COSE_Encrypt0` and `COSE_Key`.
//!
//! The builders below are a direct P-256 generalization of the teacher's
//! `cose.rs`: same tuple shapes, same "encode as array, CBOR-rewrite the
//! fixed-arity header maps into place" trick, just EC2 coordinates instead
//! of an OKP x-coordinate and a real AEAD instead of an AD-only stub.

pub mod encrypt0;
pub mod key;
pub mod sign1;

pub use encrypt0::Encrypt0;
pub use key::{CoseKey, KeyUse};
pub use sign1::Sign1;

use crate::cbor;
use crate::error::Error;
use serde_bytes::Bytes;

pub type Result<T> = core::result::Result<T, Error>;

/// COSE header label carrying a key identifier, `ID_CRED_x = {4: kid}`.
pub const LABEL_KID: i64 = 4;
/// COSE header label carrying an algorithm identifier.
pub const LABEL_ALG: i64 = 1;
/// COSE algorithm identifier for ECDSA with SHA-256 (the crate's one
/// mandatory signature algorithm).
pub const ALG_ES256: i64 = -7;

/// Builds `{1: -7}`, the `COSE_Sign1` protected header naming ES256 — used
/// for the access token's signature, which (unlike the EDHOC signatures)
/// carries a real algorithm header rather than a credential identifier.
pub fn build_protected_es256() -> Result<Vec<u8>> {
    let tuple = (LABEL_ALG, ALG_ES256);
    let mut bytes = cbor::encode(&tuple)?;
    cbor::array_to_map(&mut bytes)?;
    Ok(bytes)
}

/// Builds `{4: kid}`, CBOR-encoded as a map, identifying the long-term
/// authentication key used for a signature or MAC.
pub fn build_id_cred_x(kid: &[u8]) -> Result<Vec<u8>> {
    let tuple = (LABEL_KID, Bytes::new(kid));
    let mut bytes = cbor::encode(&tuple)?;
    cbor::array_to_map(&mut bytes)?;
    Ok(bytes)
}

/// Recovers `kid` from an `{4: kid}` header map.
pub fn get_kid(id_cred_x: &[u8]) -> Result<Vec<u8>> {
    let mut bytes = id_cred_x.to_vec();
    cbor::map_to_array(&mut bytes)?;
    let (_label, kid): (i64, serde_bytes::ByteBuf) = cbor::decode(&bytes)?;
    Ok(kid.into_vec())
}

/// `Sig_structure` for EDHOC's message_2/message_3 signatures: protected
/// header is `ID_CRED_x`, external_aad is the running transcript hash,
/// payload is the signer's raw `COSE_Key` credential.
pub fn build_sig_structure(id_cred_x: &[u8], th_i: &[u8], cred_x: &[u8]) -> Result<Vec<u8>> {
    let sig_structure = (
        "Signature1",
        Bytes::new(id_cred_x),
        Bytes::new(th_i),
        Bytes::new(cred_x),
    );
    cbor::encode(&sig_structure)
}

/// `Enc_structure = ["Encrypt0", protected_bstr, external_aad]`, the AAD
/// fed to the AEAD underlying every `COSE_Encrypt0`.
pub fn build_enc_structure(protected: &[u8], external_aad: &[u8]) -> Result<Vec<u8>> {
    cbor::encode(&("Encrypt0", Bytes::new(protected), Bytes::new(external_aad)))
}

/// `COSE_KDF_Context`, the HKDF-Expand `info` input, with PartyUInfo and
/// PartyVInfo set to the empty triple (EDHOC's key schedule carries no
/// separate U/V identity or nonce material at this layer).
///
/// `key_data_length` is in **bits**, per RFC 9053 §5.2 (`SuppPubInfo.keyDataLength`).
pub fn build_kdf_context(algorithm_id: &str, key_data_length_bits: usize, other: &[u8]) -> Result<Vec<u8>> {
    let supp_pub_info = (key_data_length_bits, Bytes::new(&[]), Bytes::new(other));
    let context = (algorithm_id, [(); 3], [(); 3], supp_pub_info);
    cbor::encode(&context)
}
