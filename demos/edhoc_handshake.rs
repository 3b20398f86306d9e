//! Runs a full EDHOC exchange between two in-process parties and prints
//! the resulting OSCORE master secret/salt each side derived, so a reader
//! can see by eye that both sides land on the same key material.
//!
//! Ported from the teacher's `examples/edhoc.rs`, generalized from its
//! X25519/Ed25519 pair to this crate's mandatory P-256 signature suite.

use ace_oscore::cose::CoseKey;
use ace_oscore::edhoc::Msg1Sender;
use p256::ecdsa::SigningKey;
use rand_core::OsRng;

fn main() {
    tracing_subscriber::fmt::init();

    let u_sk = SigningKey::random(&mut OsRng);
    let v_sk = SigningKey::random(&mut OsRng);
    let u_cred = CoseKey::from_signing_key(&u_sk, Some(b"party-u"));
    let v_cred = CoseKey::from_signing_key(&v_sk, Some(b"party-v"));

    let u_sender = Msg1Sender::new(b"U1".to_vec(), b"party-u".to_vec(), u_sk);
    let (message_1, u_msg2_receiver) = u_sender.generate_message_1().expect("party U builds message_1");
    println!("message_1: {}", hex::encode(&message_1));

    let v_receiver = ace_oscore::edhoc::Msg1Receiver::new(b"party-v".to_vec(), v_sk);
    let v_msg2_sender = v_receiver
        .handle_message_1(&message_1)
        .expect("party V accepts message_1");
    let (message_2, v_msg3_receiver) = v_msg2_sender.generate_message_2().expect("party V builds message_2");
    println!("message_2: {}", hex::encode(&message_2));

    let u_msg3_sender = u_msg2_receiver
        .handle_message_2(&message_2, &v_cred)
        .expect("party U accepts message_2");
    let (message_3, u_master_secret, u_master_salt) =
        u_msg3_sender.generate_message_3().expect("party U builds message_3");
    println!("message_3: {}", hex::encode(&message_3));

    let (v_verifier, kid_u) = v_msg3_receiver
        .parse_message_3(&message_3)
        .expect("party V decrypts message_3");
    assert_eq!(kid_u, b"party-u");
    let (v_master_secret, v_master_salt) = v_verifier
        .verify_message_3(&u_cred)
        .expect("party V verifies message_3");

    println!("U master secret: {}", hex::encode(u_master_secret));
    println!("V master secret: {}", hex::encode(v_master_secret));
    println!("U master salt:   {}", hex::encode(u_master_salt));
    println!("V master salt:   {}", hex::encode(v_master_salt));

    assert_eq!(u_master_secret, v_master_secret);
    assert_eq!(u_master_salt, v_master_salt);
    println!("OSCORE context established, both sides agree.");
}
