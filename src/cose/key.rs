//! `COSE_Key` for the mandatory EC2/P-256 credential shape:
//! `{1: 2 (kty=EC2), -1: 1 (crv=P-256), -2: x, -3: y, 4: key_ops, [2: kid]}`.
//!
//! `key_ops` (COSE label 4, IANA COSE Key Operations registry) doubles as
//! this crate's tagged-variant discriminant between a long-term
//! EC2-signing credential and an ephemeral EC2-ECDH key: the former
//! carries `[verify]`, the latter `[deriveBits]`, so a decoder can tell
//! which a wire `CoseKey` is meant for without relying on call-site typing.

use super::Result;
use crate::cbor;
use crate::error::Error;
use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, FieldBytes, PublicKey};
use serde_bytes::Bytes;
use std::collections::BTreeMap;

pub const KTY_EC2: i64 = 2;
pub const CRV_P256: i64 = 1;

const LABEL_KTY: i64 = 1;
const LABEL_KID: i64 = 2;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
/// COSE Key Operations label (RFC 9053 §7.1).
const LABEL_KEY_OPS: i64 = 4;

/// COSE Key Operation values this crate's two key uses map to.
const KEY_OP_SIGN: i64 = 1;
const KEY_OP_VERIFY: i64 = 2;
const KEY_OP_DERIVE_BITS: i64 = 8;

/// Which of the two roles a `CoseKey` plays: a long-term identity key used
/// with `Sign1`, or an ephemeral key used only to derive an ECDH shared
/// secret. Carried on the wire via `key_ops` so a peer parsing a bare
/// `CoseKey` (e.g. `G_X`/`G_Y`) doesn't have to infer it from context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyUse {
    Signing,
    Ecdh,
}

impl KeyUse {
    fn key_ops(self) -> Vec<i64> {
        match self {
            KeyUse::Signing => vec![KEY_OP_VERIFY],
            KeyUse::Ecdh => vec![KEY_OP_DERIVE_BITS],
        }
    }

    fn from_key_ops(ops: &[i64]) -> Result<Self> {
        if ops.contains(&KEY_OP_DERIVE_BITS) {
            Ok(KeyUse::Ecdh)
        } else if ops.contains(&KEY_OP_VERIFY) || ops.contains(&KEY_OP_SIGN) {
            Ok(KeyUse::Signing)
        } else {
            Err(Error::MalformedCose)
        }
    }
}

/// A raw public EC2 credential: the `CRED_x` payload carried in EDHOC
/// signatures, the key object an AS hands a client or RS as `rs_cnf`/
/// `cnf`, or an ephemeral `G_X`/`G_Y`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoseKey {
    pub x: [u8; 32],
    pub y: [u8; 32],
    pub kid: Option<Vec<u8>>,
    pub key_use: KeyUse,
}

impl CoseKey {
    pub fn from_verifying_key(vk: &VerifyingKey, kid: Option<&[u8]>) -> Self {
        let point = vk.to_encoded_point(false);
        Self {
            x: (*point.x().expect("uncompressed point carries x")).into(),
            y: (*point.y().expect("uncompressed point carries y")).into(),
            kid: kid.map(|k| k.to_vec()),
            key_use: KeyUse::Signing,
        }
    }

    pub fn from_signing_key(sk: &SigningKey, kid: Option<&[u8]>) -> Self {
        Self::from_verifying_key(sk.verifying_key(), kid)
    }

    /// An ephemeral ECDH public key (`G_X`/`G_Y`), tagged `key_ops:
    /// [deriveBits]` rather than the signing credential's `[verify]`.
    pub fn from_ecdh_public_key(pk: &PublicKey, kid: Option<&[u8]>) -> Self {
        let point = pk.to_encoded_point(false);
        Self {
            x: (*point.x().expect("uncompressed point carries x")).into(),
            y: (*point.y().expect("uncompressed point carries y")).into(),
            kid: kid.map(|k| k.to_vec()),
            key_use: KeyUse::Ecdh,
        }
    }

    fn encoded_point(&self) -> EncodedPoint {
        EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&self.x),
            FieldBytes::from_slice(&self.y),
            false,
        )
    }

    /// Recovers a `VerifyingKey`. Fails if this key is tagged `Ecdh`: a
    /// signing credential and an ephemeral ECDH key are never
    /// interchangeable even though they share the same curve.
    pub fn to_verifying_key(&self) -> Result<VerifyingKey> {
        if self.key_use != KeyUse::Signing {
            return Err(Error::MalformedCose);
        }
        Ok(VerifyingKey::from(self.to_public_key()?))
    }

    /// Recovers a `PublicKey` for ECDH. Fails if this key is tagged
    /// `Signing`.
    pub fn to_ecdh_public_key(&self) -> Result<PublicKey> {
        if self.key_use != KeyUse::Ecdh {
            return Err(Error::MalformedCose);
        }
        self.to_public_key()
    }

    fn to_public_key(&self) -> Result<PublicKey> {
        Option::from(PublicKey::from_encoded_point(&self.encoded_point())).ok_or(Error::MalformedCose)
    }

    /// Canonical CBOR map encoding, per RFC 8949 §4.2.1 key ordering.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut pairs = vec![
            (cbor::encode(&LABEL_KTY)?, cbor::encode(&KTY_EC2)?),
            (cbor::encode(&LABEL_CRV)?, cbor::encode(&CRV_P256)?),
            (cbor::encode(&LABEL_X)?, cbor::encode(&Bytes::new(&self.x))?),
            (cbor::encode(&LABEL_Y)?, cbor::encode(&Bytes::new(&self.y))?),
            (cbor::encode(&LABEL_KEY_OPS)?, cbor::encode(&self.key_use.key_ops())?),
        ];
        if let Some(kid) = &self.kid {
            pairs.push((cbor::encode(&LABEL_KID)?, cbor::encode(&Bytes::new(kid))?));
        }
        Ok(cbor::build_sorted_map(pairs))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let map: BTreeMap<i64, serde_cbor::Value> = cbor::decode(bytes)?;

        let as_int = |v: &serde_cbor::Value| -> Result<i64> {
            match v {
                serde_cbor::Value::Integer(i) => Ok(*i as i64),
                _ => Err(Error::MalformedCose),
            }
        };
        let as_bytes = |v: &serde_cbor::Value| -> Result<Vec<u8>> {
            match v {
                serde_cbor::Value::Bytes(b) => Ok(b.clone()),
                _ => Err(Error::MalformedCose),
            }
        };
        let as_int_array = |v: &serde_cbor::Value| -> Result<Vec<i64>> {
            match v {
                serde_cbor::Value::Array(items) => items.iter().map(as_int).collect(),
                _ => Err(Error::MalformedCose),
            }
        };

        let kty = map.get(&LABEL_KTY).ok_or(Error::MalformedCose).and_then(as_int)?;
        if kty != KTY_EC2 {
            return Err(Error::MalformedCose);
        }
        let crv = map.get(&LABEL_CRV).ok_or(Error::MalformedCose).and_then(as_int)?;
        if crv != CRV_P256 {
            return Err(Error::MalformedCose);
        }
        let x = map.get(&LABEL_X).ok_or(Error::MalformedCose).and_then(as_bytes)?;
        let y = map.get(&LABEL_Y).ok_or(Error::MalformedCose).and_then(as_bytes)?;
        let kid = map.get(&LABEL_KID).map(as_bytes).transpose()?;
        let key_ops = map.get(&LABEL_KEY_OPS).ok_or(Error::MalformedCose).and_then(as_int_array)?;
        let key_use = KeyUse::from_key_ops(&key_ops)?;

        Ok(Self {
            x: x.try_into().map_err(|_| Error::MalformedCose)?,
            y: y.try_into().map_err(|_| Error::MalformedCose)?,
            kid,
            key_use,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;
    use p256::ecdh::EphemeralSecret;
    use rand_core::OsRng;

    #[test]
    fn round_trips_through_cbor() {
        let sk = SigningKey::random(&mut OsRng);
        let key = CoseKey::from_signing_key(&sk, Some(b"client-1"));
        let encoded = key.encode().unwrap();
        let decoded = CoseKey::decode(&encoded).unwrap();
        assert_eq!(key, decoded);
        assert_eq!(decoded.to_verifying_key().unwrap(), *sk.verifying_key());
    }

    #[test]
    fn ecdh_key_round_trips_and_is_tagged_distinctly() {
        let eph = EphemeralSecret::random(&mut OsRng);
        let key = CoseKey::from_ecdh_public_key(&eph.public_key(), None);
        let encoded = key.encode().unwrap();
        let decoded = CoseKey::decode(&encoded).unwrap();
        assert_eq!(decoded.key_use, KeyUse::Ecdh);
        assert!(decoded.to_verifying_key().is_err());
        assert!(decoded.to_ecdh_public_key().is_ok());
    }

    #[test]
    fn signing_key_rejects_ecdh_use() {
        let sk = SigningKey::random(&mut OsRng);
        let key = CoseKey::from_signing_key(&sk, Some(b"client-1"));
        assert!(key.to_ecdh_public_key().is_err());
    }
}
