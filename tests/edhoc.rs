//! End-to-end integration tests exercising the public API across crate
//! boundaries: full EDHOC handshakes feeding into OSCORE-protected
//! exchanges, ported from `ace/tests/test_edhoc.py`'s scenario coverage
//! (matching contexts, cross-party encryption, independent multi-client
//! sessions) onto this crate's type-stated session API.

use ace_oscore::cose::CoseKey;
use ace_oscore::edhoc::{Msg1Receiver, Msg1Sender};
use ace_oscore::oscore::OscoreContext;
use p256::ecdsa::SigningKey;
use rand_core::OsRng;

struct Handshake {
    client_master_secret: [u8; 16],
    client_master_salt: [u8; 8],
    server_master_secret: [u8; 16],
    server_master_salt: [u8; 8],
}

fn run_handshake(client_kid: &[u8], server_kid: &[u8]) -> Handshake {
    let client_sk = SigningKey::random(&mut OsRng);
    let server_sk = SigningKey::random(&mut OsRng);
    let client_cred = CoseKey::from_signing_key(&client_sk, Some(client_kid));
    let server_cred = CoseKey::from_signing_key(&server_sk, Some(server_kid));

    let sender = Msg1Sender::new(b"U1".to_vec(), client_kid.to_vec(), client_sk);
    let (message_1, msg2_receiver) = sender.generate_message_1().unwrap();

    let receiver = Msg1Receiver::new(server_kid.to_vec(), server_sk);
    let msg2_sender = receiver.handle_message_1(&message_1).unwrap();
    let (message_2, msg3_receiver) = msg2_sender.generate_message_2().unwrap();

    let msg3_sender = msg2_receiver.handle_message_2(&message_2, &server_cred).unwrap();
    let (message_3, client_master_secret, client_master_salt) = msg3_sender.generate_message_3().unwrap();

    let (verifier, kid) = msg3_receiver.parse_message_3(&message_3).unwrap();
    assert_eq!(kid, client_kid);
    let (server_master_secret, server_master_salt) = verifier.verify_message_3(&client_cred).unwrap();

    Handshake {
        client_master_secret,
        client_master_salt,
        server_master_secret,
        server_master_salt,
    }
}

#[test]
fn both_parties_derive_the_same_oscore_context() {
    let h = run_handshake(b"client", b"server");
    assert_eq!(h.client_master_secret, h.server_master_secret);
    assert_eq!(h.client_master_salt, h.server_master_salt);
}

#[test]
fn derived_context_encrypts_both_directions() {
    let h = run_handshake(b"client", b"server");
    let mut client_ctx =
        OscoreContext::derive(&h.client_master_secret, &h.client_master_salt, b"client", b"server", &[]).unwrap();
    let mut server_ctx =
        OscoreContext::derive(&h.server_master_secret, &h.server_master_salt, b"server", b"client", &[]).unwrap();

    let request = client_ctx.encrypt(b"", b"hello from client").unwrap();
    let request_pt = server_ctx.decrypt(b"", &request).unwrap();
    assert_eq!(request_pt, b"hello from client");

    let response = server_ctx.encrypt(b"", b"hello from server").unwrap();
    let response_pt = client_ctx.decrypt(b"", &response).unwrap();
    assert_eq!(response_pt, b"hello from server");
}

#[test]
fn multiple_clients_get_independent_contexts() {
    let a = run_handshake(b"client-a", b"server");
    let b = run_handshake(b"client-b", b"server");
    assert_ne!(a.client_master_secret, b.client_master_secret);
    assert_ne!(a.client_master_salt, b.client_master_salt);
}

#[test]
fn rfc8613_sender_recipient_key_test_vector() {
    let master_secret = hex_literal::hex!("0102030405060708090a0b0c0d0e0f10");
    let master_salt = hex_literal::hex!("9e7ca92223786340");

    let ctx = OscoreContext::derive(&master_secret, &master_salt, b"", &hex_literal::hex!("01"), &[]).unwrap();

    assert_eq!(ctx.sender_key(), &hex_literal::hex!("7230aab3b549d94c9224aacc744e93ab"));
    assert_eq!(ctx.recipient_key(), &hex_literal::hex!("e534a26a64aa3982e988e31f1e401e65"));
}

#[test]
fn wrong_server_credential_is_rejected_by_client() {
    let client_sk = SigningKey::random(&mut OsRng);
    let server_sk = SigningKey::random(&mut OsRng);

    let sender = Msg1Sender::new(b"U1".to_vec(), b"client".to_vec(), client_sk);
    let (message_1, msg2_receiver) = sender.generate_message_1().unwrap();

    let receiver = Msg1Receiver::new(b"server".to_vec(), server_sk);
    let msg2_sender = receiver.handle_message_1(&message_1).unwrap();
    let (message_2, _msg3_receiver) = msg2_sender.generate_message_2().unwrap();

    // An unrelated credential, not the one the server actually signed with.
    let wrong_server_cred = CoseKey::from_signing_key(&SigningKey::random(&mut OsRng), Some(b"server"));
    assert!(msg2_receiver.handle_message_2(&message_2, &wrong_server_cred).is_err());
}
