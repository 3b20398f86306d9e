//! `COSE_Sign1` over the EDHOC `Signature1` structure, ECDSA P-256/SHA-256.

use super::Result;
use crate::error::Error;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};

/// A detached-payload signature: `CRED_x` (the signer's raw `COSE_Key`) is
/// the payload, `ID_CRED_x` is the protected header, and the running
/// transcript hash is the external AAD. Callers hold `payload`/`protected`
/// themselves since both are already present elsewhere in the message;
/// this type only carries the signature bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sign1 {
    pub signature: [u8; 64],
}

impl Sign1 {
    pub fn sign(sk: &SigningKey, id_cred_x: &[u8], th_i: &[u8], cred_x: &[u8]) -> Result<Self> {
        let tbs = super::build_sig_structure(id_cred_x, th_i, cred_x)?;
        let signature: Signature = sk.sign(&tbs);
        Ok(Self {
            signature: signature.to_bytes().into(),
        })
    }

    pub fn verify(&self, vk: &VerifyingKey, id_cred_x: &[u8], th_i: &[u8], cred_x: &[u8]) -> Result<()> {
        let tbs = super::build_sig_structure(id_cred_x, th_i, cred_x)?;
        let signature = Signature::from_slice(&self.signature).map_err(|_| Error::MalformedCose)?;
        vk.verify(&tbs, &signature).map_err(|_| Error::SignatureInvalid)
    }
}
