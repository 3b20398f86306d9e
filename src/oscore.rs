//! OSCORE security context derivation (RFC 8613 §3.2) and per-message
//! AEAD framing (RFC 8613 §5.2-5.4), seeded from the `master_secret`/
//! `master_salt` an EDHOC exchange just produced.

use crate::cbor;
use crate::cose::Encrypt0;
use crate::error::Error;
use hkdf::Hkdf;
use sha2::Sha256;

pub type Result<T> = core::result::Result<T, Error>;

/// COSE Algorithms registry value for AES-CCM-16-64-128.
const ALG_AES_CCM_16_64_128: i64 = 10;
const KEY_LEN: usize = 16;
const NONCE_LEN: usize = 13;
/// COSE header label carrying a Partial IV (RFC 9052 §3.1).
const LABEL_PARTIAL_IV: i64 = 6;

/// A derived, live OSCORE security context. Holds both directions' keys
/// and tracks the sender sequence number and the highest sequence number
/// accepted from the peer.
pub struct OscoreContext {
    sender_id: Vec<u8>,
    recipient_id: Vec<u8>,
    sender_key: [u8; KEY_LEN],
    recipient_key: [u8; KEY_LEN],
    common_iv: [u8; NONCE_LEN],
    sender_seq: u64,
    highest_recipient_seq: Option<u64>,
}

impl OscoreContext {
    /// Derives sender/recipient keys and the common IV from a master
    /// secret and salt, per RFC 8613 §3.2. `id_context` is the optional
    /// OSCORE ID Context (empty when not used).
    pub fn derive(
        master_secret: &[u8],
        master_salt: &[u8],
        sender_id: &[u8],
        recipient_id: &[u8],
        id_context: &[u8],
    ) -> Result<Self> {
        let hkdf = Hkdf::<Sha256>::new(Some(master_salt), master_secret);

        let mut sender_key = [0u8; KEY_LEN];
        hkdf.expand(&info(sender_id, id_context, "Key", KEY_LEN)?, &mut sender_key)
            .map_err(|_| Error::MalformedCose)?;

        let mut recipient_key = [0u8; KEY_LEN];
        hkdf.expand(&info(recipient_id, id_context, "Key", KEY_LEN)?, &mut recipient_key)
            .map_err(|_| Error::MalformedCose)?;

        let mut common_iv = [0u8; NONCE_LEN];
        hkdf.expand(&info(&[], id_context, "IV", NONCE_LEN)?, &mut common_iv)
            .map_err(|_| Error::MalformedCose)?;

        Ok(Self {
            sender_id: sender_id.to_vec(),
            recipient_id: recipient_id.to_vec(),
            sender_key,
            recipient_key,
            common_iv,
            sender_seq: 0,
            highest_recipient_seq: None,
        })
    }

    pub fn sender_key(&self) -> &[u8; KEY_LEN] {
        &self.sender_key
    }

    pub fn recipient_key(&self) -> &[u8; KEY_LEN] {
        &self.recipient_key
    }

    pub fn common_iv(&self) -> &[u8; NONCE_LEN] {
        &self.common_iv
    }

    /// Encrypts a message with the next sender sequence number, returning
    /// the full `COSE_Encrypt0` structure with the Partial IV carried in
    /// the unprotected header (label 6) so the recipient can reconstruct
    /// the nonce from the message alone.
    pub fn encrypt(&mut self, external_aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let piv = self.sender_seq;
        self.sender_seq = self.sender_seq.checked_add(1).ok_or(Error::StateViolation)?;
        let nonce = build_nonce(&self.common_iv, &self.sender_id, piv);
        let unprotected = build_partial_iv_header(piv)?;
        Encrypt0::encrypt(&self.sender_key, &nonce, &[], &unprotected, external_aad, plaintext)
    }

    /// Decrypts a `COSE_Encrypt0` structure, recovering the Partial IV from
    /// its unprotected header. Rejects any Partial IV not strictly greater
    /// than the highest one accepted so far — a minimal anti-replay check
    /// rather than a full sliding window.
    pub fn decrypt(&mut self, external_aad: &[u8], serialized: &[u8]) -> Result<Vec<u8>> {
        let piv = extract_partial_iv(serialized)?;
        if let Some(highest) = self.highest_recipient_seq {
            if piv <= highest {
                tracing::warn!(piv, highest, "rejected replayed or out-of-order Partial IV");
                return Err(Error::StateViolation);
            }
        }
        let nonce = build_nonce(&self.common_iv, &self.recipient_id, piv);
        let plaintext = Encrypt0::decrypt(&self.recipient_key, &nonce, external_aad, serialized)?;
        self.highest_recipient_seq = Some(piv);
        Ok(plaintext)
    }
}

fn build_partial_iv_header(piv: u64) -> Result<Vec<u8>> {
    let full = piv.to_be_bytes();
    let first_nonzero = full.iter().position(|&b| b != 0).unwrap_or(7);
    let piv_bytes = &full[first_nonzero..];
    let pairs = vec![(
        cbor::encode(&LABEL_PARTIAL_IV).map_err(|_| Error::MalformedCose)?,
        cbor::encode(&serde_bytes::Bytes::new(piv_bytes)).map_err(|_| Error::MalformedCose)?,
    )];
    Ok(cbor::build_sorted_map(pairs))
}

fn extract_partial_iv(serialized: &[u8]) -> Result<u64> {
    let items = cbor::split_top_array(serialized).map_err(|_| Error::MalformedCose)?;
    let [_protected, unprotected, _ciphertext] = items.as_slice() else {
        return Err(Error::MalformedCose);
    };
    let map: std::collections::BTreeMap<i64, serde_cbor::Value> =
        cbor::decode(unprotected).map_err(|_| Error::MalformedCose)?;
    let piv_bytes = match map.get(&LABEL_PARTIAL_IV) {
        Some(serde_cbor::Value::Bytes(b)) => b,
        _ => return Err(Error::MalformedCose),
    };
    let start = 8usize.checked_sub(piv_bytes.len()).ok_or(Error::MalformedCose)?;
    let mut buf = [0u8; 8];
    buf[start..].copy_from_slice(piv_bytes);
    Ok(u64::from_be_bytes(buf))
}

fn info(id: &[u8], id_context: &[u8], kind: &str, length: usize) -> Result<Vec<u8>> {
    let tuple = (
        serde_bytes::Bytes::new(id),
        serde_bytes::Bytes::new(id_context),
        ALG_AES_CCM_16_64_128,
        kind,
        length as u64,
    );
    cbor::encode(&tuple)
}

fn build_nonce(common_iv: &[u8; NONCE_LEN], id_piv: &[u8], piv: u64) -> [u8; NONCE_LEN] {
    let mut buf = [0u8; NONCE_LEN];
    buf[0] = id_piv.len() as u8;
    let id_field_len = NONCE_LEN - 6; // 7 bytes
    let id_start = 1 + (id_field_len - id_piv.len().min(id_field_len));
    buf[id_start..1 + id_field_len].copy_from_slice(&id_piv[id_piv.len().saturating_sub(id_field_len)..]);
    let piv_bytes = piv.to_be_bytes();
    buf[NONCE_LEN - 5..].copy_from_slice(&piv_bytes[3..8]);
    for (b, iv) in buf.iter_mut().zip(common_iv.iter()) {
        *b ^= iv;
    }
    buf
}
