//! Authorization Server core: client credential checks, PoP-key-bound
//! token issuance, and introspection — the transport-agnostic logic behind
//! `as/__init__.py`'s `/token` and `/introspect` handlers, with the client/
//! key/token registries it delegates to folded in as `RwLock`-guarded maps
//! rather than separate modules, since none of the three need more than
//! insert/lookup/remove.

use crate::config::Config;
use crate::cose::CoseKey;
use crate::error::Error;
use crate::token::{AccessToken, Claims};
use p256::ecdsa::SigningKey;
use rand_core::{OsRng, RngCore};
use std::collections::HashMap;
use std::sync::RwLock;

pub type Result<T> = core::result::Result<T, Error>;

fn hex_cti(cti: &[u8]) -> String {
    cti.iter().map(|b| format!("{b:02x}")).collect()
}

/// A registered client able to request tokens.
struct Client {
    client_secret: Vec<u8>,
}

/// A token request, already authenticated as coming from `client_id`.
pub struct TokenRequest {
    pub client_id: String,
    pub client_secret: Vec<u8>,
    pub audience: String,
    pub scope: String,
    pub pop_key: CoseKey,
}

/// Claims an introspection caller learns about a still-valid token.
pub struct Introspection {
    pub active: bool,
    pub scope: String,
    pub aud: String,
    pub iss: String,
    pub exp: u64,
    pub iat: u64,
    pub cnf: CoseKey,
}

pub struct AuthorizationServer {
    config: Config,
    signing_key: SigningKey,
    as_kid: Vec<u8>,
    clients: RwLock<HashMap<String, Client>>,
    /// cti (hex-free, raw bytes) -> claims, kept so `/introspect` can serve
    /// even referential tokens without re-parsing a signed blob.
    issued_tokens: RwLock<HashMap<Vec<u8>, Claims>>,
}

impl AuthorizationServer {
    pub fn new(config: Config, signing_key: SigningKey, as_kid: impl Into<Vec<u8>>) -> Self {
        Self {
            config,
            signing_key,
            as_kid: as_kid.into(),
            clients: RwLock::new(HashMap::new()),
            issued_tokens: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_client(&self, client_id: impl Into<String>, client_secret: impl Into<Vec<u8>>) {
        self.clients.write().unwrap().insert(
            client_id.into(),
            Client {
                client_secret: client_secret.into(),
            },
        );
    }

    /// Debug-only: lists registered client IDs. Mirrors `AuthorizationServer.clients`
    /// in the original, which the original itself flags as debug-only.
    pub fn list_clients(&self) -> Vec<String> {
        self.clients.read().unwrap().keys().cloned().collect()
    }

    fn verify_client(&self, client_id: &str, client_secret: &[u8]) -> bool {
        self.clients
            .read()
            .unwrap()
            .get(client_id)
            .is_some_and(|c| c.client_secret == client_secret)
    }

    /// Issues a PoP-bound access token, returning the signed CWT bytes and
    /// the RS's own `COSE_Key` (`rs_cnf`) the client needs to start EDHOC.
    #[tracing::instrument(skip_all, fields(client_id = %request.client_id, aud = %request.audience))]
    pub fn issue_token(&self, request: TokenRequest, now: u64, rs_cnf: &CoseKey) -> Result<(Vec<u8>, CoseKey)> {
        if !self.verify_client(&request.client_id, &request.client_secret) {
            tracing::warn!(client_id = %request.client_id, "rejected token request from unknown or unauthenticated client");
            return Err(Error::PolicyRejection);
        }

        let mut cti = vec![0u8; crate::config::CTI_LEN];
        OsRng.fill_bytes(&mut cti);

        let claims = Claims {
            iss: self.config.issuer.clone(),
            aud: request.audience,
            scope: request.scope,
            iat: now,
            exp: now + self.config.token_lifetime_secs,
            cti: cti.clone(),
            cnf: request.pop_key,
        };

        self.issued_tokens.write().unwrap().insert(cti.clone(), claims.clone());
        let token = AccessToken::sign(claims, &self.signing_key, &self.as_kid)?;
        tracing::info!(cti = %hex_cti(&cti), "issued access token");
        Ok((token.export()?, rs_cnf.clone()))
    }

    #[tracing::instrument(skip_all)]
    pub fn introspect(&self, cti: &[u8], now: u64) -> Option<Introspection> {
        let tokens = self.issued_tokens.read().unwrap();
        let claims = tokens.get(cti)?;
        let active = !claims.is_expired(now);
        tracing::debug!(cti = %hex_cti(cti), active, "introspected token");
        Some(Introspection {
            active,
            scope: claims.scope.clone(),
            aud: claims.aud.clone(),
            iss: claims.iss.clone(),
            exp: claims.exp,
            iat: claims.iat,
            cnf: claims.cnf.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;
    use rand_core::OsRng;

    #[test]
    fn issues_and_introspects_a_token() {
        let as_server = AuthorizationServer::new(Config::default(), SigningKey::random(&mut OsRng), b"as_key_1".to_vec());
        as_server.register_client("ace_client_1", b"ace_client_1_secret_123456".to_vec());
        assert_eq!(as_server.list_clients(), vec!["ace_client_1".to_string()]);

        let client_pop_sk = SigningKey::random(&mut OsRng);
        let rs_cnf = CoseKey::from_signing_key(&SigningKey::random(&mut OsRng), Some(b"rs_pub_key"));

        let request = TokenRequest {
            client_id: "ace_client_1".into(),
            client_secret: b"ace_client_1_secret_123456".to_vec(),
            audience: "temperature-rs".into(),
            scope: "read".into(),
            pop_key: CoseKey::from_signing_key(&client_pop_sk, Some(b"ace_client_1")),
        };

        let (token_bytes, returned_rs_cnf) = as_server.issue_token(request, 1_000, &rs_cnf).unwrap();
        assert_eq!(returned_rs_cnf, rs_cnf);

        let claims = AccessToken::verify(&token_bytes, as_server.signing_key.verifying_key()).unwrap();
        let introspection = as_server.introspect(&claims.cti, 1_500).unwrap();
        assert!(introspection.active);
        assert_eq!(introspection.scope, "read");
    }

    #[test]
    fn rejects_unknown_client() {
        let as_server = AuthorizationServer::new(Config::default(), SigningKey::random(&mut OsRng), b"as_key_1".to_vec());
        let rs_cnf = CoseKey::from_signing_key(&SigningKey::random(&mut OsRng), Some(b"rs_pub_key"));
        let request = TokenRequest {
            client_id: "nobody".into(),
            client_secret: b"wrong".to_vec(),
            audience: "temperature-rs".into(),
            scope: "read".into(),
            pop_key: CoseKey::from_signing_key(&SigningKey::random(&mut OsRng), None),
        };
        assert!(as_server.issue_token(request, 1_000, &rs_cnf).is_err());
    }
}
