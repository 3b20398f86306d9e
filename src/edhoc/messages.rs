//! EDHOC wire messages.
//!
//! Every parse function hands back borrowed, byte-exact slices of the
//! input (via [`crate::cbor::split_top_array`]) rather than re-encoded
//! values: transcript hashing is defined over the bytes a peer actually
//! sent, and re-serializing a parsed value is not guaranteed to reproduce
//! them.

use crate::cbor;
use crate::error::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// The crate's one mandatory method: both parties authenticate with a
/// signature (no static-DH/MAC-only variants).
pub const METHOD_SIGNATURE_SIGNATURE: u64 = 0;
/// The crate's one mandatory cipher suite identifier on the wire.
pub const SUITE_P256_ES256_AES_CCM_16_64_128: u64 = 0;

pub const MSG1_TAG: u64 = 1;
pub const MSG2_TAG: u64 = 2;
pub const MSG3_TAG: u64 = 3;

/// `message_1 = [1, session_id_u, nonce_u, G_X]`
pub struct Message1<'a> {
    pub raw: &'a [u8],
    pub session_id_u: &'a [u8],
    pub nonce_u: &'a [u8],
    pub g_x: &'a [u8],
}

pub fn build_message_1(session_id_u: &[u8], nonce_u: &[u8], g_x_cose_key: &[u8]) -> Vec<u8> {
    cbor::encode_array(&[
        &cbor::encode_uint(MSG1_TAG),
        &cbor::encode_bstr(session_id_u),
        &cbor::encode_bstr(nonce_u),
        g_x_cose_key,
    ])
}

pub fn parse_message_1(bytes: &[u8]) -> Result<Message1<'_>> {
    let items = cbor::split_top_array(bytes)?;
    let [tag, session_id_u, nonce_u, g_x] = items.as_slice() else {
        return Err(Error::MalformedEdhoc);
    };
    if cbor::uint_value(tag)? != MSG1_TAG {
        return Err(Error::MalformedEdhoc);
    }
    Ok(Message1 {
        raw: bytes,
        session_id_u: cbor::bstr_contents(session_id_u)?,
        nonce_u: cbor::bstr_contents(nonce_u)?,
        g_x,
    })
}

/// `message_2 = [2, session_id_u, session_id_v, nonce_v, G_Y, CIPHERTEXT_2]`
pub struct Message2<'a> {
    pub session_id_u: &'a [u8],
    pub session_id_v: &'a [u8],
    pub nonce_v: &'a [u8],
    pub g_y: &'a [u8],
    /// The wire-byte prefix of this message up to (not including)
    /// `ciphertext_2` — `TH_2`'s `data_2` input.
    pub data_2: &'a [u8],
    pub ciphertext_2_item: &'a [u8],
    pub ciphertext_2: &'a [u8],
}

/// Builds the constant leading fields of message_2 (everything but
/// `ciphertext_2`) as a byte-exact array prefix — usable to compute TH_2
/// before `ciphertext_2` exists, and reused by [`build_message_2`] so the
/// two never drift apart.
pub fn build_message_2_data(session_id_u: &[u8], session_id_v: &[u8], nonce_v: &[u8], g_y_cose_key: &[u8]) -> Vec<u8> {
    cbor::encode_array_prefix(
        6,
        &[
            &cbor::encode_uint(MSG2_TAG),
            &cbor::encode_bstr(session_id_u),
            &cbor::encode_bstr(session_id_v),
            &cbor::encode_bstr(nonce_v),
            g_y_cose_key,
        ],
    )
}

pub fn build_message_2(
    session_id_u: &[u8],
    session_id_v: &[u8],
    nonce_v: &[u8],
    g_y_cose_key: &[u8],
    ciphertext_2: &[u8],
) -> Vec<u8> {
    let mut out = build_message_2_data(session_id_u, session_id_v, nonce_v, g_y_cose_key);
    out.extend_from_slice(&cbor::encode_bstr(ciphertext_2));
    out
}

pub fn parse_message_2(bytes: &[u8]) -> Result<Message2<'_>> {
    let items = cbor::split_top_array(bytes)?;
    let [tag, session_id_u, session_id_v, nonce_v, g_y, ciphertext_2_item] = items.as_slice() else {
        return Err(Error::MalformedEdhoc);
    };
    if cbor::uint_value(tag)? != MSG2_TAG {
        return Err(Error::MalformedEdhoc);
    }
    let data_2 = &bytes[..bytes.len() - ciphertext_2_item.len()];
    Ok(Message2 {
        session_id_u: cbor::bstr_contents(session_id_u)?,
        session_id_v: cbor::bstr_contents(session_id_v)?,
        nonce_v: cbor::bstr_contents(nonce_v)?,
        g_y,
        data_2,
        ciphertext_2_item,
        ciphertext_2: cbor::bstr_contents(ciphertext_2_item)?,
    })
}

/// `message_3 = [3, session_id_v, CIPHERTEXT_3]`
pub struct Message3<'a> {
    pub session_id_v: &'a [u8],
    pub ciphertext_3_item: &'a [u8],
    pub ciphertext_3: &'a [u8],
}

pub fn build_message_3(session_id_v: &[u8], ciphertext_3: &[u8]) -> Vec<u8> {
    cbor::encode_array(&[
        &cbor::encode_uint(MSG3_TAG),
        &cbor::encode_bstr(session_id_v),
        &cbor::encode_bstr(ciphertext_3),
    ])
}

pub fn parse_message_3(bytes: &[u8]) -> Result<Message3<'_>> {
    let items = cbor::split_top_array(bytes)?;
    let [tag, session_id_v, ciphertext_3_item] = items.as_slice() else {
        return Err(Error::MalformedEdhoc);
    };
    if cbor::uint_value(tag)? != MSG3_TAG {
        return Err(Error::MalformedEdhoc);
    }
    Ok(Message3 {
        session_id_v: cbor::bstr_contents(session_id_v)?,
        ciphertext_3_item,
        ciphertext_3: cbor::bstr_contents(ciphertext_3_item)?,
    })
}

/// The plaintext carried inside ciphertext_2/ciphertext_3:
/// `(ID_CRED_x, signature)`.
pub fn build_sign_plaintext(id_cred_x: &[u8], signature: &[u8; 64]) -> Vec<u8> {
    cbor::encode_array(&[&cbor::encode_bstr(id_cred_x), &cbor::encode_bstr(signature)])
}

pub fn parse_sign_plaintext(bytes: &[u8]) -> Result<(Vec<u8>, [u8; 64])> {
    let items = cbor::split_top_array(bytes)?;
    let [id_cred_x, signature] = items.as_slice() else {
        return Err(Error::MalformedEdhoc);
    };
    let id_cred_x = cbor::bstr_contents(id_cred_x)?.to_vec();
    let signature: [u8; 64] = cbor::bstr_contents(signature)?
        .try_into()
        .map_err(|_| Error::MalformedEdhoc)?;
    Ok((id_cred_x, signature))
}

/// `EDHOC-Error = [0, session_id, diagnostic]`, sent in place of the next
/// expected message when either party abandons the exchange.
pub const ERROR_MESSAGE_TAG: u64 = 0;

pub fn build_message_error(session_id: &[u8], diagnostic: &str) -> Vec<u8> {
    cbor::encode_array(&[
        &cbor::encode_uint(ERROR_MESSAGE_TAG),
        &cbor::encode_bstr(session_id),
        &cbor::encode(&diagnostic).expect("text string always encodes"),
    ])
}

/// Returns `Some((session_id, diagnostic))` if `bytes` is an `EDHOC-Error`
/// message, `None` if it looks like anything else (a normal next message).
/// Callers must check this before `parse_message_3`: both are 3-element
/// arrays, disambiguated only by the leading tag (0 vs 3).
pub fn try_parse_message_error(bytes: &[u8]) -> Option<(Vec<u8>, String)> {
    let items = cbor::split_top_array(bytes).ok()?;
    let [tag, session_id, diagnostic] = items.as_slice() else {
        return None;
    };
    if cbor::uint_value(tag).ok()? != ERROR_MESSAGE_TAG {
        return None;
    }
    let session_id = cbor::bstr_contents(session_id).ok()?.to_vec();
    let diagnostic: String = cbor::decode(diagnostic).ok()?;
    Some((session_id, diagnostic))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_g_x() -> Vec<u8> {
        cbor::encode_bstr(&[0xAB; 32])
    }

    #[test]
    fn message_1_round_trip() {
        let g_x = fake_g_x();
        let bytes = build_message_1(b"U1", b"nonce-u", &g_x);
        let parsed = parse_message_1(&bytes).unwrap();
        assert_eq!(parsed.session_id_u, b"U1");
        assert_eq!(parsed.nonce_u, b"nonce-u");
        assert_eq!(parsed.g_x, g_x.as_slice());
        assert_eq!(parsed.raw, bytes);
    }

    #[test]
    fn message_2_data_prefix_matches_full_message() {
        let g_y = fake_g_x();
        let data_2 = build_message_2_data(b"U1", b"V1", b"nonce-v", &g_y);
        let full = build_message_2(b"U1", b"V1", b"nonce-v", &g_y, b"ciphertext-2");
        assert_eq!(&full[..data_2.len()], data_2.as_slice());

        let parsed = parse_message_2(&full).unwrap();
        assert_eq!(parsed.session_id_u, b"U1");
        assert_eq!(parsed.session_id_v, b"V1");
        assert_eq!(parsed.nonce_v, b"nonce-v");
        assert_eq!(parsed.ciphertext_2, b"ciphertext-2");
        assert_eq!(parsed.data_2, data_2.as_slice());
    }

    #[test]
    fn message_3_round_trip() {
        let bytes = build_message_3(b"V1", b"ciphertext-3");
        let parsed = parse_message_3(&bytes).unwrap();
        assert_eq!(parsed.session_id_v, b"V1");
        assert_eq!(parsed.ciphertext_3, b"ciphertext-3");
    }

    #[test]
    fn sign_plaintext_round_trip() {
        let id_cred_x = crate::cose::build_id_cred_x(b"kid").unwrap();
        let signature = [0x42u8; 64];
        let bytes = build_sign_plaintext(&id_cred_x, &signature);
        let (decoded_id_cred_x, decoded_sig) = parse_sign_plaintext(&bytes).unwrap();
        assert_eq!(decoded_id_cred_x, id_cred_x);
        assert_eq!(decoded_sig, signature);
    }

    #[test]
    fn message_error_is_distinguishable_from_message_2() {
        let err = build_message_error(b"sess", "bad signature");
        let (session_id, diagnostic) = try_parse_message_error(&err).unwrap();
        assert_eq!(session_id, b"sess");
        assert_eq!(diagnostic, "bad signature");

        let msg2 = build_message_2(b"U1", b"V1", b"nonce-v", &fake_g_x(), b"ciphertext");
        assert!(try_parse_message_error(&msg2).is_none());
    }

    #[test]
    fn message_error_is_distinguishable_from_message_3() {
        let err = build_message_error(b"sess", "bad signature");
        let msg3 = build_message_3(b"V1", b"ciphertext-3");
        assert!(try_parse_message_error(&msg3).is_none());
        assert!(try_parse_message_error(&err).is_some());
    }
}
