//! Type-stated EDHOC session API.
//!
//! Each exchange step consumes the previous state and returns the next
//! one, so a message can't be generated or handled twice and the compiler
//! rejects any attempt to run the steps out of order — the same shape as
//! the teacher's `Msg1Sender`/`Msg1Receiver`/.../`Msg3Receiver` pair
//! walking through `examples/edhoc.rs`, generalized from X25519/Ed25519 to
//! the mandatory P-256 signature suite.
//!
//! Party U (initiator) already knows Party V's long-term `COSE_Key` out of
//! band (learned as `rs_cnf` when it fetched its access token), so its
//! path verifies in one step. Party V (responder) only learns the peer's
//! `kid` once ciphertext_3 is decrypted, so its path splits in two:
//! [`Msg3Receiver::parse_message_3`] decrypts and returns the claimed
//! `kid` for a credential-registry lookup, and [`Msg3Verifier::verify_message_3`]
//! finishes once the caller has resolved a verifying key for it.

use crate::cbor;
use crate::cose::{self, CoseKey, Encrypt0, Sign1};
use crate::edhoc::kdf::{self, KeySchedule};
use crate::edhoc::messages;
use crate::error::{Error, OwnOrPeerError};
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::SigningKey;
use p256::PublicKey;
use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

type Result<T> = core::result::Result<T, Error>;

fn hex_id(id: &[u8]) -> String {
    id.iter().map(|b| format!("{b:02x}")).collect()
}

fn random_id<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

fn encode_ecdh_point(pk: &PublicKey) -> Result<Vec<u8>> {
    CoseKey::from_ecdh_public_key(pk, None).encode()
}

fn decode_ecdh_point(cose_key_bytes: &[u8]) -> Result<PublicKey> {
    CoseKey::decode(cose_key_bytes)?.to_ecdh_public_key()
}

fn empty_unprotected() -> Vec<u8> {
    cbor::build_sorted_map(vec![])
}

fn into_own(session_id: &[u8], err: Error) -> OwnOrPeerError {
    OwnOrPeerError::own(session_id.to_vec(), err)
}

fn check_for_peer_error(bytes: &[u8]) -> core::result::Result<(), OwnOrPeerError> {
    if let Some((_session_id, diagnostic)) = messages::try_parse_message_error(bytes) {
        return Err(OwnOrPeerError::Peer { diagnostic });
    }
    Ok(())
}

// --- Party U (initiator) ---------------------------------------------

pub struct Msg1Sender {
    session_id_u: Vec<u8>,
    nonce_u: [u8; 8],
    kid_i: Vec<u8>,
    sk_i: SigningKey,
    x: EphemeralSecret,
}

impl Msg1Sender {
    pub fn new(session_id_u: impl Into<Vec<u8>>, kid_i: impl Into<Vec<u8>>, sk_i: SigningKey) -> Self {
        Self {
            session_id_u: session_id_u.into(),
            nonce_u: random_id(),
            kid_i: kid_i.into(),
            sk_i,
            x: EphemeralSecret::random(&mut OsRng),
        }
    }

    #[tracing::instrument(skip_all, fields(session_id_u = %hex_id(&self.session_id_u)))]
    pub fn generate_message_1(self) -> Result<(Vec<u8>, Msg2Receiver)> {
        let g_x = encode_ecdh_point(&self.x.public_key())?;
        let message_1 = messages::build_message_1(&self.session_id_u, &self.nonce_u, &g_x);
        tracing::debug!("sent message_1");
        let receiver = Msg2Receiver {
            session_id_u: self.session_id_u,
            kid_i: self.kid_i,
            sk_i: self.sk_i,
            x: self.x,
            message_1: message_1.clone(),
        };
        Ok((message_1, receiver))
    }
}

pub struct Msg2Receiver {
    session_id_u: Vec<u8>,
    kid_i: Vec<u8>,
    sk_i: SigningKey,
    x: EphemeralSecret,
    message_1: Vec<u8>,
}

impl Msg2Receiver {
    /// `v_cred`: Party V's long-term `COSE_Key`, already known to Party U
    /// out of band.
    #[tracing::instrument(skip_all, fields(session_id_u = %hex_id(&self.session_id_u)))]
    pub fn handle_message_2(self, message_2: &[u8], v_cred: &CoseKey) -> core::result::Result<Msg3Sender, OwnOrPeerError> {
        check_for_peer_error(message_2)?;
        let parsed = messages::parse_message_2(message_2).map_err(|e| into_own(&self.session_id_u, e))?;
        if parsed.session_id_u != self.session_id_u.as_slice() {
            return Err(into_own(&self.session_id_u, Error::MalformedEdhoc));
        }
        let session_id_v = parsed.session_id_v.to_vec();

        let g_y = decode_ecdh_point(parsed.g_y).map_err(|e| into_own(&self.session_id_u, e))?;
        let shared_secret = self.x.diffie_hellman(&g_y);
        let schedule = KeySchedule::new(shared_secret.raw_secret_bytes().as_slice());

        let th_2 = kdf::th2(&self.message_1, parsed.data_2);
        let k_2 = Zeroizing::new(schedule.k2(&th_2).map_err(|e| into_own(&self.session_id_u, e))?);
        let iv_2 = schedule.iv2(&th_2).map_err(|e| into_own(&self.session_id_u, e))?;
        let plaintext = Encrypt0::decrypt(&k_2, &iv_2, &th_2, parsed.ciphertext_2)
            .map_err(|e| into_own(&self.session_id_u, e))?;
        let (id_cred_v, signature) =
            messages::parse_sign_plaintext(&plaintext).map_err(|e| into_own(&self.session_id_u, e))?;

        let cred_v = v_cred.encode().map_err(|e| into_own(&self.session_id_u, e))?;
        let vk = v_cred.to_verifying_key().map_err(|e| into_own(&self.session_id_u, e))?;
        Sign1 { signature }
            .verify(&vk, &id_cred_v, &th_2, &cred_v)
            .map_err(|e| into_own(&self.session_id_u, e))?;

        let th_3 = kdf::th3(&th_2, parsed.ciphertext_2_item);
        tracing::debug!("verified message_2");
        Ok(Msg3Sender {
            session_id_u: self.session_id_u,
            session_id_v,
            kid_i: self.kid_i,
            sk_i: self.sk_i,
            schedule,
            th_3,
        })
    }
}

pub struct Msg3Sender {
    session_id_u: Vec<u8>,
    session_id_v: Vec<u8>,
    kid_i: Vec<u8>,
    sk_i: SigningKey,
    schedule: KeySchedule,
    th_3: [u8; 32],
}

impl Msg3Sender {
    pub fn session_id_u(&self) -> &[u8] {
        &self.session_id_u
    }

    pub fn session_id_v(&self) -> &[u8] {
        &self.session_id_v
    }

    #[tracing::instrument(skip_all, fields(session_id_u = %hex_id(&self.session_id_u)))]
    pub fn generate_message_3(self) -> Result<(Vec<u8>, [u8; 16], [u8; 8])> {
        let id_cred_i = cose::build_id_cred_x(&self.kid_i)?;
        let cred_i = CoseKey::from_signing_key(&self.sk_i, Some(&self.kid_i)).encode()?;
        let sig = Sign1::sign(&self.sk_i, &id_cred_i, &self.th_3, &cred_i)?;
        let plaintext = messages::build_sign_plaintext(&id_cred_i, &sig.signature);

        let k_3 = Zeroizing::new(self.schedule.k3(&self.th_3)?);
        let iv_3 = self.schedule.iv3(&self.th_3)?;
        let ciphertext_3 = Encrypt0::encrypt(&k_3, &iv_3, &[], &empty_unprotected(), &self.th_3, &plaintext)?;

        let message_3 = messages::build_message_3(&self.session_id_v, &ciphertext_3);
        let th_4 = kdf::th4(&self.th_3, &cbor::encode_bstr(&ciphertext_3));
        let master_secret = self.schedule.master_secret(&th_4)?;
        let master_salt = self.schedule.master_salt(&th_4)?;

        tracing::info!("derived OSCORE master secret and salt");
        Ok((message_3, master_secret, master_salt))
    }
}

// --- Party V (responder) ----------------------------------------------

pub struct Msg1Receiver {
    kid_v: Vec<u8>,
    sk_v: SigningKey,
    y: EphemeralSecret,
}

impl Msg1Receiver {
    pub fn new(kid_v: impl Into<Vec<u8>>, sk_v: SigningKey) -> Self {
        Self {
            kid_v: kid_v.into(),
            sk_v,
            y: EphemeralSecret::random(&mut OsRng),
        }
    }

    #[tracing::instrument(skip_all)]
    pub fn handle_message_1(self, message_1: &[u8]) -> core::result::Result<Msg2Sender, OwnOrPeerError> {
        let parsed = messages::parse_message_1(message_1).map_err(|e| into_own(b"", e))?;
        let session_id_u = parsed.session_id_u.to_vec();
        tracing::debug!(session_id_u = %hex_id(&session_id_u), "received message_1");

        let g_x = decode_ecdh_point(parsed.g_x).map_err(|e| into_own(&session_id_u, e))?;
        let shared_secret = self.y.diffie_hellman(&g_x);
        let schedule = KeySchedule::new(shared_secret.raw_secret_bytes().as_slice());

        let session_id_v: [u8; 2] = random_id();
        let nonce_v: [u8; 8] = random_id();
        let g_y_cose = encode_ecdh_point(&self.y.public_key()).map_err(|e| into_own(&session_id_u, e))?;
        let data_2 = messages::build_message_2_data(&session_id_u, &session_id_v, &nonce_v, &g_y_cose);
        let th_2 = kdf::th2(message_1, &data_2);

        Ok(Msg2Sender {
            session_id_u,
            session_id_v: session_id_v.to_vec(),
            nonce_v,
            kid_v: self.kid_v,
            sk_v: self.sk_v,
            schedule,
            th_2,
            g_y_cose,
        })
    }
}

pub struct Msg2Sender {
    session_id_u: Vec<u8>,
    session_id_v: Vec<u8>,
    nonce_v: [u8; 8],
    kid_v: Vec<u8>,
    sk_v: SigningKey,
    schedule: KeySchedule,
    th_2: [u8; 32],
    g_y_cose: Vec<u8>,
}

impl Msg2Sender {
    #[tracing::instrument(skip_all, fields(session_id_v = %hex_id(&self.session_id_v)))]
    pub fn generate_message_2(self) -> Result<(Vec<u8>, Msg3Receiver)> {
        let id_cred_v = cose::build_id_cred_x(&self.kid_v)?;
        let cred_v = CoseKey::from_signing_key(&self.sk_v, Some(&self.kid_v)).encode()?;
        let sig = Sign1::sign(&self.sk_v, &id_cred_v, &self.th_2, &cred_v)?;
        let plaintext = messages::build_sign_plaintext(&id_cred_v, &sig.signature);

        let k_2 = Zeroizing::new(self.schedule.k2(&self.th_2)?);
        let iv_2 = self.schedule.iv2(&self.th_2)?;
        let ciphertext_2 = Encrypt0::encrypt(&k_2, &iv_2, &[], &empty_unprotected(), &self.th_2, &plaintext)?;

        let message_2 = messages::build_message_2(
            &self.session_id_u,
            &self.session_id_v,
            &self.nonce_v,
            &self.g_y_cose,
            &ciphertext_2,
        );
        let ciphertext_2_item = cbor::encode_bstr(&ciphertext_2);
        let th_3 = kdf::th3(&self.th_2, &ciphertext_2_item);
        tracing::debug!("sent message_2");

        Ok((
            message_2,
            Msg3Receiver {
                session_id_u: self.session_id_u,
                session_id_v: self.session_id_v,
                schedule: self.schedule,
                th_3,
            },
        ))
    }
}

pub struct Msg3Receiver {
    session_id_u: Vec<u8>,
    session_id_v: Vec<u8>,
    schedule: KeySchedule,
    th_3: [u8; 32],
}

impl Msg3Receiver {
    /// Decrypts ciphertext_3 and returns the peer's claimed `kid` for a
    /// credential-registry lookup, without yet verifying the signature.
    #[tracing::instrument(skip_all, fields(session_id_v = %hex_id(&self.session_id_v)))]
    pub fn parse_message_3(self, message_3: &[u8]) -> core::result::Result<(Msg3Verifier, Vec<u8>), OwnOrPeerError> {
        check_for_peer_error(message_3)?;
        let parsed = messages::parse_message_3(message_3).map_err(|e| into_own(&self.session_id_v, e))?;
        if parsed.session_id_v != self.session_id_v.as_slice() {
            return Err(into_own(&self.session_id_v, Error::MalformedEdhoc));
        }

        let k_3 = Zeroizing::new(self.schedule.k3(&self.th_3).map_err(|e| into_own(&self.session_id_v, e))?);
        let iv_3 = self.schedule.iv3(&self.th_3).map_err(|e| into_own(&self.session_id_v, e))?;
        let plaintext = Encrypt0::decrypt(&k_3, &iv_3, &self.th_3, parsed.ciphertext_3)
            .map_err(|e| into_own(&self.session_id_v, e))?;
        let (id_cred_i, signature) =
            messages::parse_sign_plaintext(&plaintext).map_err(|e| into_own(&self.session_id_v, e))?;
        let kid_i = cose::get_kid(&id_cred_i).map_err(|e| into_own(&self.session_id_v, e))?;

        let th_4 = kdf::th4(&self.th_3, parsed.ciphertext_3_item);
        tracing::debug!(kid_i = %hex_id(&kid_i), "received message_3, awaiting credential resolution");
        Ok((
            Msg3Verifier {
                session_id_u: self.session_id_u,
                session_id_v: self.session_id_v,
                schedule: self.schedule,
                th_3: self.th_3,
                th_4,
                id_cred_i,
                signature,
            },
            kid_i,
        ))
    }
}

pub struct Msg3Verifier {
    session_id_u: Vec<u8>,
    session_id_v: Vec<u8>,
    schedule: KeySchedule,
    th_3: [u8; 32],
    th_4: [u8; 32],
    id_cred_i: Vec<u8>,
    signature: [u8; 64],
}

impl Msg3Verifier {
    pub fn session_id_u(&self) -> &[u8] {
        &self.session_id_u
    }

    pub fn session_id_v(&self) -> &[u8] {
        &self.session_id_v
    }

    #[tracing::instrument(skip_all, fields(session_id_v = %hex_id(&self.session_id_v)))]
    pub fn verify_message_3(self, u_cred: &CoseKey) -> core::result::Result<([u8; 16], [u8; 8]), OwnOrPeerError> {
        let cred_i = u_cred.encode().map_err(|e| into_own(&self.session_id_v, e))?;
        let vk = u_cred.to_verifying_key().map_err(|e| into_own(&self.session_id_v, e))?;
        Sign1 { signature: self.signature }
            .verify(&vk, &self.id_cred_i, &self.th_3, &cred_i)
            .map_err(|e| {
                tracing::warn!("message_3 signature verification failed");
                into_own(&self.session_id_v, e)
            })?;

        let master_secret = self.schedule.master_secret(&self.th_4).map_err(|e| into_own(&self.session_id_v, e))?;
        let master_salt = self.schedule.master_salt(&self.th_4).map_err(|e| into_own(&self.session_id_v, e))?;
        tracing::info!("verified message_3, derived OSCORE master secret and salt");
        Ok((master_secret, master_salt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;

    #[test]
    fn full_handshake_derives_matching_oscore_context() {
        let u_sk = SigningKey::random(&mut OsRng);
        let v_sk = SigningKey::random(&mut OsRng);
        let u_cred = CoseKey::from_signing_key(&u_sk, Some(b"client"));
        let v_cred = CoseKey::from_signing_key(&v_sk, Some(b"server"));

        let u_sender = Msg1Sender::new(b"U1".to_vec(), b"client".to_vec(), u_sk);
        let (message_1, u_msg2_receiver) = u_sender.generate_message_1().unwrap();

        let v_receiver = Msg1Receiver::new(b"server".to_vec(), v_sk);
        let v_msg2_sender = v_receiver.handle_message_1(&message_1).unwrap();
        let (message_2, v_msg3_receiver) = v_msg2_sender.generate_message_2().unwrap();

        let u_msg3_sender = u_msg2_receiver.handle_message_2(&message_2, &v_cred).unwrap();
        let session_id_u = u_msg3_sender.session_id_u().to_vec();
        let session_id_v = u_msg3_sender.session_id_v().to_vec();
        let (message_3, u_master_secret, u_master_salt) = u_msg3_sender.generate_message_3().unwrap();

        let (v_msg3_verifier, kid_i) = v_msg3_receiver.parse_message_3(&message_3).unwrap();
        assert_eq!(kid_i, b"client");
        assert_eq!(v_msg3_verifier.session_id_u(), session_id_u.as_slice());
        assert_eq!(v_msg3_verifier.session_id_v(), session_id_v.as_slice());
        let (v_master_secret, v_master_salt) = v_msg3_verifier.verify_message_3(&u_cred).unwrap();

        assert_eq!(u_master_secret, v_master_secret);
        assert_eq!(u_master_salt, v_master_salt);
    }

    #[test]
    fn tampered_message_2_is_rejected() {
        let u_sk = SigningKey::random(&mut OsRng);
        let v_sk = SigningKey::random(&mut OsRng);
        let v_cred = CoseKey::from_signing_key(&v_sk, Some(b"server"));

        let u_sender = Msg1Sender::new(b"U1".to_vec(), b"client".to_vec(), u_sk);
        let (message_1, u_msg2_receiver) = u_sender.generate_message_1().unwrap();

        let v_receiver = Msg1Receiver::new(b"server".to_vec(), v_sk);
        let v_msg2_sender = v_receiver.handle_message_1(&message_1).unwrap();
        let (mut message_2, _v_msg3_receiver) = v_msg2_sender.generate_message_2().unwrap();
        *message_2.last_mut().unwrap() ^= 0xFF;

        assert!(u_msg2_receiver.handle_message_2(&message_2, &v_cred).is_err());
    }

    #[test]
    fn tampered_message_3_is_rejected() {
        let u_sk = SigningKey::random(&mut OsRng);
        let v_sk = SigningKey::random(&mut OsRng);
        let v_cred = CoseKey::from_signing_key(&v_sk, Some(b"server"));

        let u_sender = Msg1Sender::new(b"U1".to_vec(), b"client".to_vec(), u_sk);
        let (message_1, u_msg2_receiver) = u_sender.generate_message_1().unwrap();

        let v_receiver = Msg1Receiver::new(b"server".to_vec(), v_sk);
        let v_msg2_sender = v_receiver.handle_message_1(&message_1).unwrap();
        let (message_2, v_msg3_receiver) = v_msg2_sender.generate_message_2().unwrap();

        let u_msg3_sender = u_msg2_receiver.handle_message_2(&message_2, &v_cred).unwrap();
        let (mut message_3, _master_secret, _master_salt) = u_msg3_sender.generate_message_3().unwrap();
        *message_3.last_mut().unwrap() ^= 0xFF;

        assert!(v_msg3_receiver.parse_message_3(&message_3).is_err());
    }
}
