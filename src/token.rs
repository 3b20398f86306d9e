//! The self-contained access token: a CWT (RFC 8392) whose claim set
//! includes a `cnf` claim binding a client's proof-of-possession key,
//! wrapped in a `COSE_Sign1` the AS signs and the RS verifies.
//!
//! Mirrors `ace/cose/cwt.py`'s `encode`/`decode` pair, generalized from the
//! original's ECDSA/NIST256p-via-`ecdsa`-library plumbing to `p256`, and
//! fixes the original's noted shortcut of carrying `cti` as a hex string
//! instead of a raw byte string.

use crate::cbor;
use crate::cose::{self, CoseKey, Sign1};
use crate::error::Error;
use p256::ecdsa::{SigningKey, VerifyingKey};
use serde_bytes::Bytes;
use std::collections::BTreeMap;

pub type Result<T> = core::result::Result<T, Error>;

// RFC 8392 CWT Claims registry.
const CLAIM_ISS: i64 = 1;
const CLAIM_AUD: i64 = 3;
const CLAIM_EXP: i64 = 4;
const CLAIM_IAT: i64 = 6;
const CLAIM_CTI: i64 = 7;
// RFC 8747 confirmation claim.
const CLAIM_CNF: i64 = 8;
const CNF_COSE_KEY: i64 = 1;
// ACE-OAuth extension (draft-ietf-ace-oauth-authz).
const CLAIM_SCOPE: i64 = 9;

/// The claim set bound into an access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claims {
    pub iss: String,
    pub aud: String,
    pub scope: String,
    pub iat: u64,
    pub exp: u64,
    /// CWT ID: an opaque byte string, never textually hex-encoded.
    pub cti: Vec<u8>,
    /// The proof-of-possession key bound to this token.
    pub cnf: CoseKey,
}

impl Claims {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.exp
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let cnf_map = cbor::build_sorted_map(vec![(cbor::encode(&CNF_COSE_KEY)?, self.cnf.encode()?)]);
        let pairs = vec![
            (cbor::encode(&CLAIM_ISS)?, cbor::encode(&self.iss)?),
            (cbor::encode(&CLAIM_AUD)?, cbor::encode(&self.aud)?),
            (cbor::encode(&CLAIM_SCOPE)?, cbor::encode(&self.scope)?),
            (cbor::encode(&CLAIM_IAT)?, cbor::encode(&self.iat)?),
            (cbor::encode(&CLAIM_EXP)?, cbor::encode(&self.exp)?),
            (cbor::encode(&CLAIM_CTI)?, cbor::encode(&Bytes::new(&self.cti))?),
            (cbor::encode(&CLAIM_CNF)?, cnf_map),
        ];
        Ok(cbor::build_sorted_map(pairs))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let map: BTreeMap<i64, serde_cbor::Value> = cbor::decode(bytes)?;
        let get = |k: i64| map.get(&k).ok_or(Error::TokenInvalid);

        let as_text = |v: &serde_cbor::Value| -> Result<String> {
            match v {
                serde_cbor::Value::Text(s) => Ok(s.clone()),
                _ => Err(Error::TokenInvalid),
            }
        };
        let as_uint = |v: &serde_cbor::Value| -> Result<u64> {
            match v {
                serde_cbor::Value::Integer(i) if *i >= 0 => Ok(*i as u64),
                _ => Err(Error::TokenInvalid),
            }
        };
        let as_bytes = |v: &serde_cbor::Value| -> Result<Vec<u8>> {
            match v {
                serde_cbor::Value::Bytes(b) => Ok(b.clone()),
                _ => Err(Error::TokenInvalid),
            }
        };

        let cnf_value = get(CLAIM_CNF)?;
        let cnf_map = match cnf_value {
            serde_cbor::Value::Map(_) => serde_cbor::to_vec(cnf_value).map_err(|_| Error::TokenInvalid)?,
            _ => return Err(Error::TokenInvalid),
        };
        let cnf_map: BTreeMap<i64, serde_cbor::Value> = cbor::decode(&cnf_map)?;
        let cose_key_value = cnf_map.get(&CNF_COSE_KEY).ok_or(Error::TokenInvalid)?;
        let cose_key_bytes = serde_cbor::to_vec(cose_key_value).map_err(|_| Error::TokenInvalid)?;
        let cnf = CoseKey::decode(&cose_key_bytes)?;

        Ok(Self {
            iss: as_text(get(CLAIM_ISS)?)?,
            aud: as_text(get(CLAIM_AUD)?)?,
            scope: as_text(get(CLAIM_SCOPE)?)?,
            iat: as_uint(get(CLAIM_IAT)?)?,
            exp: as_uint(get(CLAIM_EXP)?)?,
            cti: as_bytes(get(CLAIM_CTI)?)?,
            cnf,
        })
    }
}

/// A signed, self-contained access token ready to hand to a client.
pub struct AccessToken {
    pub claims: Claims,
    protected: Vec<u8>,
    kid: Vec<u8>,
    signature: [u8; 64],
}

impl AccessToken {
    pub fn sign(claims: Claims, as_signing_key: &SigningKey, as_kid: &[u8]) -> Result<Self> {
        let protected = cose::build_protected_es256()?;
        let payload = claims.encode()?;
        let sig = Sign1::sign(as_signing_key, &protected, b"", &payload)?;
        Ok(Self {
            claims,
            protected,
            kid: as_kid.to_vec(),
            signature: sig.signature,
        })
    }

    /// `[protected, {4: kid}, payload, signature]`, i.e. a standard
    /// `COSE_Sign1` wire encoding (unlike EDHOC's detached-header variant,
    /// the unprotected header here really does travel unprotected kid-only).
    pub fn export(&self) -> Result<Vec<u8>> {
        let unprotected = cose::build_id_cred_x(&self.kid)?;
        let payload = self.claims.encode()?;
        Ok(cbor::encode_array(&[
            &cbor::encode_bstr(&self.protected),
            &unprotected,
            &cbor::encode_bstr(&payload),
            &cbor::encode_bstr(&self.signature),
        ]))
    }

    /// Verifies the signature and returns the claims, along with the `kid`
    /// naming the AS key the caller must resolve to have verified it.
    pub fn verify(bytes: &[u8], as_verifying_key: &VerifyingKey) -> Result<Claims> {
        let items = cbor::split_top_array(bytes)?;
        let [protected_item, unprotected_item, payload_item, signature_item] = items.as_slice() else {
            return Err(Error::TokenInvalid);
        };
        let protected = cbor::bstr_contents(protected_item)?;
        let payload = cbor::bstr_contents(payload_item)?;
        let signature: [u8; 64] = cbor::bstr_contents(signature_item)?
            .try_into()
            .map_err(|_| Error::TokenInvalid)?;
        let _kid = cose::get_kid(unprotected_item)?;

        Sign1 { signature }.verify(as_verifying_key, protected, b"", payload)?;
        Claims::decode(payload)
    }

    /// The `kid` naming which AS verifying key to resolve, read without
    /// verifying the signature — used by an RS that must look the key up
    /// before it can call [`Self::verify`].
    pub fn peek_kid(bytes: &[u8]) -> Result<Vec<u8>> {
        let items = cbor::split_top_array(bytes)?;
        let unprotected_item = items.get(1).ok_or(Error::TokenInvalid)?;
        cose::get_kid(unprotected_item)
    }
}
