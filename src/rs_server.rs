//! Resource Server core: access token acceptance, the EDHOC session it
//! bootstraps, and policy enforcement on the resulting OSCORE-protected
//! requests — generalizing `rs/__init__.py`'s `TemperatureServer` into a
//! resource-agnostic acceptance/session layer a concrete resource handler
//! sits on top of.

use crate::config::Config;
use crate::cose::CoseKey;
use crate::edhoc::{Msg1Receiver, Msg3Verifier};
use crate::error::Error;
use crate::oscore::OscoreContext;
use crate::token::AccessToken;
use p256::ecdsa::{SigningKey, VerifyingKey};
use std::collections::HashMap;
use std::sync::RwLock;

pub type Result<T> = core::result::Result<T, Error>;

fn hex_kid(kid: &[u8]) -> String {
    kid.iter().map(|b| format!("{b:02x}")).collect()
}

struct AcceptedToken {
    pop_key: CoseKey,
    scope: String,
    exp: u64,
}

pub struct ResourceServer {
    config: Config,
    as_verifying_key: VerifyingKey,
    rs_signing_key: SigningKey,
    rs_kid: Vec<u8>,
    audience: String,
    /// Keyed by the client's `kid` (taken from the token's `cnf` key),
    /// populated once a token has been accepted and cleared once its
    /// session is established or it expires.
    accepted_tokens: RwLock<HashMap<Vec<u8>, AcceptedToken>>,
    /// Established OSCORE contexts, keyed by the same client `kid`.
    sessions: RwLock<HashMap<Vec<u8>, OscoreContext>>,
}

impl ResourceServer {
    pub fn new(
        config: Config,
        as_verifying_key: VerifyingKey,
        rs_signing_key: SigningKey,
        rs_kid: impl Into<Vec<u8>>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            config,
            as_verifying_key,
            rs_signing_key,
            rs_kid: rs_kid.into(),
            audience: audience.into(),
            accepted_tokens: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn rs_credential(&self) -> CoseKey {
        CoseKey::from_signing_key(&self.rs_signing_key, Some(&self.rs_kid))
    }

    /// Verifies a token's signature, audience and expiry, and remembers
    /// the bound PoP key and scope under the client's `kid` so a
    /// subsequent EDHOC exchange can be tied back to it.
    #[tracing::instrument(skip_all)]
    pub fn accept_token(&self, token_bytes: &[u8], now: u64) -> Result<Vec<u8>> {
        let claims = AccessToken::verify(token_bytes, &self.as_verifying_key)?;
        if claims.is_expired(now) {
            tracing::warn!("rejected expired access token");
            return Err(Error::TokenExpired);
        }
        if claims.aud != self.audience {
            tracing::warn!(aud = %claims.aud, "rejected access token for a different audience");
            return Err(Error::PolicyRejection);
        }
        let kid = claims.cnf.kid.clone().ok_or(Error::TokenInvalid)?;
        self.accepted_tokens.write().unwrap().insert(
            kid.clone(),
            AcceptedToken {
                pop_key: claims.cnf,
                scope: claims.scope,
                exp: claims.exp,
            },
        );
        tracing::info!(kid = %hex_kid(&kid), "accepted access token, awaiting EDHOC");
        Ok(kid)
    }

    fn resolve_pop_key(&self, kid: &[u8]) -> Result<CoseKey> {
        self.accepted_tokens
            .read()
            .unwrap()
            .get(kid)
            .map(|t| t.pop_key.clone())
            .ok_or(Error::UnknownKid)
    }

    /// Starts the responder side of an EDHOC exchange for an accepted token.
    pub fn begin_edhoc(&self) -> Msg1Receiver {
        Msg1Receiver::new(self.rs_kid.clone(), self.rs_signing_key.clone())
    }

    /// Resolves the verifying key for a peer `kid` a [`Msg3Verifier`]
    /// needs, rejecting peers with no accepted token.
    pub fn resolve_peer_credential(&self, kid: &[u8]) -> Result<CoseKey> {
        self.resolve_pop_key(kid)
    }

    /// Finishes verification and installs the resulting OSCORE context
    /// under the client's `kid`.
    #[tracing::instrument(skip_all, fields(kid = %hex_kid(client_kid)))]
    pub fn establish_session(
        &self,
        client_kid: &[u8],
        verifier: Msg3Verifier,
    ) -> core::result::Result<(), crate::error::OwnOrPeerError> {
        let pop_key = self
            .resolve_pop_key(client_kid)
            .map_err(|e| crate::error::OwnOrPeerError::own(client_kid.to_vec(), e))?;
        let session_id_u = verifier.session_id_u().to_vec();
        let session_id_v = verifier.session_id_v().to_vec();
        let (master_secret, master_salt) = verifier.verify_message_3(&pop_key)?;
        // RS is responder V: its own Sender-ID is session_id_v, the peer's
        // Recipient-ID is session_id_u — the two EDHOC session IDs swapped.
        let ctx = OscoreContext::derive(&master_secret, &master_salt, &session_id_v, &session_id_u, &[])
            .map_err(|e| crate::error::OwnOrPeerError::own(client_kid.to_vec(), e))?;
        self.sessions.write().unwrap().insert(client_kid.to_vec(), ctx);
        tracing::info!("OSCORE session established");
        Ok(())
    }

    /// Checks that an established session's bound scope covers
    /// `required_scope`, per the ACE access-token scope the client
    /// authenticated with.
    pub fn check_scope(&self, client_kid: &[u8], required_scope: &str) -> Result<()> {
        let tokens = self.accepted_tokens.read().unwrap();
        let token = tokens.get(client_kid).ok_or(Error::UnknownKid)?;
        if token.scope.split_whitespace().any(|s| s == required_scope) {
            Ok(())
        } else {
            Err(Error::PolicyRejection)
        }
    }

    /// Decrypts an incoming OSCORE-protected request from an established session.
    pub fn decrypt_request(&self, client_kid: &[u8], aad: &[u8], serialized: &[u8]) -> Result<Vec<u8>> {
        let mut sessions = self.sessions.write().unwrap();
        let ctx = sessions.get_mut(client_kid).ok_or(Error::StateViolation)?;
        ctx.decrypt(aad, serialized)
    }

    /// Encrypts an OSCORE-protected response for an established session.
    pub fn encrypt_response(&self, client_kid: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut sessions = self.sessions.write().unwrap();
        let ctx = sessions.get_mut(client_kid).ok_or(Error::StateViolation)?;
        ctx.encrypt(aad, plaintext)
    }

    pub fn token_lifetime_secs(&self) -> u64 {
        self.config.token_lifetime_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cose::CoseKey;
    use crate::edhoc::Msg1Sender;
    use crate::token::{AccessToken, Claims};
    use p256::ecdsa::SigningKey;
    use rand_core::OsRng;

    #[test]
    fn accepts_token_then_completes_edhoc_and_exchanges_protected_data() {
        let as_sk = SigningKey::random(&mut OsRng);
        let rs_sk = SigningKey::random(&mut OsRng);
        let client_sk = SigningKey::random(&mut OsRng);

        let rs = ResourceServer::new(Config::default(), *as_sk.verifying_key(), rs_sk, b"rs_1".to_vec(), "temperature-rs".into());

        let claims = Claims {
            iss: "ace.as-server.example".into(),
            aud: "temperature-rs".into(),
            scope: "read write".into(),
            iat: 0,
            exp: 1_000_000,
            cti: vec![1, 2, 3],
            cnf: CoseKey::from_signing_key(&client_sk, Some(b"client_1")),
        };
        let token = AccessToken::sign(claims, &as_sk, b"as_1").unwrap().export().unwrap();

        let client_kid = rs.accept_token(&token, 10).unwrap();
        assert_eq!(client_kid, b"client_1");
        rs.check_scope(&client_kid, "read").unwrap();
        assert!(rs.check_scope(&client_kid, "admin").is_err());

        let client_cred = CoseKey::from_signing_key(&client_sk, Some(b"client_1"));
        let u_sender = Msg1Sender::new(b"U1".to_vec(), b"client_1".to_vec(), client_sk);
        let (message_1, u_msg2_receiver) = u_sender.generate_message_1().unwrap();

        let v_receiver = rs.begin_edhoc();
        let v_msg2_sender = v_receiver.handle_message_1(&message_1).unwrap();
        let rs_cred = rs.rs_credential();
        let (message_2, v_msg3_receiver) = v_msg2_sender.generate_message_2().unwrap();

        let u_msg3_sender = u_msg2_receiver.handle_message_2(&message_2, &rs_cred).unwrap();
        let session_id_u = u_msg3_sender.session_id_u().to_vec();
        let session_id_v = u_msg3_sender.session_id_v().to_vec();
        let (message_3, client_master_secret, client_master_salt) = u_msg3_sender.generate_message_3().unwrap();

        let (verifier, kid_i) = v_msg3_receiver.parse_message_3(&message_3).unwrap();
        assert_eq!(kid_i, client_kid);
        rs.establish_session(&client_kid, verifier).unwrap();

        let serialized = {
            // Party U is initiator: its Sender-ID is session_id_u, the
            // RS's Recipient-ID is session_id_v.
            let mut ctx = OscoreContext::derive(&client_master_secret, &client_master_salt, &session_id_u, &session_id_v, &[]).unwrap();
            ctx.encrypt(b"", b"GET /temperature").unwrap()
        };
        let plaintext = rs.decrypt_request(&client_kid, b"", &serialized).unwrap();
        assert_eq!(plaintext, b"GET /temperature");

        let _ = client_cred;
    }

    #[test]
    fn expired_token_is_rejected_before_any_edhoc_state_is_created() {
        let as_sk = SigningKey::random(&mut OsRng);
        let rs_sk = SigningKey::random(&mut OsRng);
        let client_sk = SigningKey::random(&mut OsRng);

        let rs = ResourceServer::new(Config::default(), *as_sk.verifying_key(), rs_sk, b"rs_1".to_vec(), "temperature-rs".into());

        let claims = Claims {
            iss: "ace.as-server.example".into(),
            aud: "temperature-rs".into(),
            scope: "read".into(),
            iat: 0,
            exp: 1_000,
            cti: vec![4, 5, 6],
            cnf: CoseKey::from_signing_key(&client_sk, Some(b"client_2")),
        };
        let token = AccessToken::sign(claims, &as_sk, b"as_1").unwrap().export().unwrap();

        let result = rs.accept_token(&token, 2_000);
        assert!(matches!(result, Err(Error::TokenExpired)));
        assert!(rs.resolve_peer_credential(b"client_2").is_err());
    }
}
