//! Full handshake flows (Type 1 and Type 2) against a scripted panel,
//! including key activation order and the post-handshake heartbeat.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use itv2_gateway::config::IntegrationConfig;
use itv2_gateway::crypto::{digit_key, hex_key, random_bytes, FrameCipher, SCHEME_TYPE1, SCHEME_TYPE2};
use itv2_gateway::protocol::{
    Command, CommandResponse, Message, OpenSession, RequestAccess, ResponseCode,
};
use itv2_gateway::session::Session;

use common::{session_pair, Panel};

const IAC_HEX: &str = "00112233445566778899aabbccddeeff";
const IAC_DIGITS: &str = "12345678";
const IIN_DIGITS: &str = "87654321";

fn type1_secrets() -> IntegrationConfig {
    IntegrationConfig {
        access_code_type1: Some(IAC_DIGITS.into()),
        identification_number: Some(IIN_DIGITS.into()),
        ..Default::default()
    }
}

fn type2_secrets() -> IntegrationConfig {
    IntegrationConfig {
        access_code_type2: Some(IAC_HEX.into()),
        ..Default::default()
    }
}

fn panel_open_session(scheme: u8) -> OpenSession {
    OpenSession {
        device_type: 0x10,
        encryption: scheme,
        protocol_version: 0x0201,
        software_version: 0x0145,
        device_id: [0xCA, 0xFE, 0x00, 0x01],
    }
}

/// Drive phases A and B: panel opens, server responds and mirrors.
async fn run_capability_exchange(panel: &mut Panel, scheme: u8) {
    panel
        .send_message(&Message::OpenSession(panel_open_session(scheme)))
        .await;

    // Phase A: server answers the panel's OpenSession.
    let env = panel.read_envelope().await.expect("phase A response");
    let Message::CommandResponse(response) = env.message else {
        panic!("expected CommandResponse, got {:?}", env.message);
    };
    assert_eq!(response.request, Command::OpenSession.as_u16());
    assert_eq!(response.code, ResponseCode::Success);
    panel.ack().await;

    // Phase B: server mirrors capabilities, allocating an app sequence.
    let env = panel.read_envelope().await.expect("phase B mirror");
    assert!(env.app_seq.is_some(), "mirrored OpenSession carries app_seq");
    let Message::OpenSession(mirror) = env.message else {
        panic!("expected OpenSession, got {:?}", env.message);
    };
    assert_eq!(mirror.encryption, scheme);
    panel
        .send_message(&Message::CommandResponse(CommandResponse {
            request: Command::OpenSession.as_u16(),
            code: ResponseCode::Success,
        }))
        .await;
    let ack = panel.read_frame().await.expect("phase B ack");
    assert_eq!(ack.command, None);
}

#[tokio::test]
async fn type2_handshake_and_heartbeat() {
    let (session, mut panel, mut events) = session_pair(type2_secrets());
    let runner = tokio::spawn(Arc::clone(&session).run());

    run_capability_exchange(&mut panel, SCHEME_TYPE2).await;

    let iac = FrameCipher::new(hex_key(IAC_HEX, "iac").unwrap());

    // Phase C: panel announces its initializer; the server's reply must
    // already be encrypted with AES-ECB(IAC, initializer).
    let initializer: [u8; 16] = random_bytes();
    let mut outbound_key = [0u8; 16];
    outbound_key.copy_from_slice(&iac.encrypt(&initializer));
    panel
        .send_message(&Message::RequestAccess(RequestAccess {
            initializer: initializer.to_vec(),
        }))
        .await;
    panel.recv_cipher = Some(FrameCipher::new(outbound_key));

    let env = panel.read_envelope().await.expect("phase C response");
    let Message::CommandResponse(response) = env.message else {
        panic!("expected CommandResponse, got {:?}", env.message);
    };
    assert_eq!(response.request, Command::RequestAccess.as_u16());
    assert_eq!(response.code, ResponseCode::Success);
    panel.ack().await;

    // Phase D: the wire carries the 16-byte pre-image of the inbound key.
    let env = panel.read_envelope().await.expect("phase D request");
    let Message::RequestAccess(access) = env.message else {
        panic!("expected RequestAccess, got {:?}", env.message);
    };
    assert_eq!(access.initializer.len(), 16);
    let mut inbound_key = [0u8; 16];
    inbound_key.copy_from_slice(&iac.encrypt(&access.initializer));
    panel.send_cipher = Some(FrameCipher::new(inbound_key));

    panel
        .send_message(&Message::CommandResponse(CommandResponse {
            request: Command::RequestAccess.as_u16(),
            code: ResponseCode::Success,
        }))
        .await;
    let ack = panel.read_frame().await.expect("phase D ack");
    assert_eq!(ack.command, None);

    // Heartbeat: the version probe arrives encrypted within a few seconds.
    let frame = timeout(Duration::from_secs(4), panel.read_frame())
        .await
        .expect("no version probe")
        .expect("stream closed");
    assert_eq!(frame.command, Some(Command::SoftwareVersionRequest.as_u16()));
    panel
        .send_message(&Message::CommandResponse(CommandResponse {
            request: Command::SoftwareVersionRequest.as_u16(),
            code: ResponseCode::Success,
        }))
        .await;
    let ack = panel.read_frame().await.expect("probe ack");
    assert_eq!(ack.command, None);

    // Then a connection poll on the configured cadence.
    let frame = timeout(Duration::from_secs(4), panel.read_frame())
        .await
        .expect("no poll")
        .expect("stream closed");
    assert_eq!(frame.command, Some(Command::ConnectionPoll.as_u16()));
    panel.ack().await;

    // The handshake messages were published upward in order.
    let first = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event timeout")
        .expect("channel closed");
    assert!(matches!(first.message, Message::OpenSession(_)));

    session.shutdown();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn type1_handshake_interleaved_keying() {
    let (session, mut panel, _events) = session_pair(type1_secrets());
    let runner = tokio::spawn(Arc::clone(&session).run());

    run_capability_exchange(&mut panel, SCHEME_TYPE1).await;

    let iac = FrameCipher::new(digit_key(IAC_DIGITS, "iac").unwrap());
    let iin = FrameCipher::new(digit_key(IIN_DIGITS, "iin").unwrap());

    // Phase C: 48-byte initializer; even plaintext bytes repeat the check
    // run, odd bytes carry the session key the server must derive.
    let check: [u8; 16] = random_bytes();
    let session_key: [u8; 16] = random_bytes();
    let mut material = [0u8; 32];
    for i in 0..16 {
        material[2 * i] = check[i];
        material[2 * i + 1] = session_key[i];
    }
    let mut initializer = Vec::with_capacity(48);
    initializer.extend_from_slice(&check);
    initializer.extend_from_slice(&iin.encrypt(&material));

    panel
        .send_message(&Message::RequestAccess(RequestAccess { initializer }))
        .await;
    panel.recv_cipher = Some(FrameCipher::new(session_key));

    // Phase C response comes back encrypted with exactly that key.
    let env = panel.read_envelope().await.expect("phase C response");
    let Message::CommandResponse(response) = env.message else {
        panic!("expected CommandResponse, got {:?}", env.message);
    };
    assert_eq!(response.code, ResponseCode::Success);
    panel.ack().await;

    // Phase D: decrypt the ciphertext half with the IAC key, verify the
    // interleaved check bytes, extract the inbound key.
    let env = panel.read_envelope().await.expect("phase D request");
    let Message::RequestAccess(access) = env.message else {
        panic!("expected RequestAccess, got {:?}", env.message);
    };
    assert_eq!(access.initializer.len(), 48);
    let plain = iac.decrypt(&access.initializer[16..]).unwrap();
    let mut inbound_key = [0u8; 16];
    for i in 0..16 {
        assert_eq!(plain[2 * i], access.initializer[i], "check byte {i}");
        inbound_key[i] = plain[2 * i + 1];
    }
    panel.send_cipher = Some(FrameCipher::new(inbound_key));

    panel
        .send_message(&Message::CommandResponse(CommandResponse {
            request: Command::RequestAccess.as_u16(),
            code: ResponseCode::Success,
        }))
        .await;
    let ack = panel.read_frame().await.expect("phase D ack");
    assert_eq!(ack.command, None);

    // Both directions now encrypted: the version probe decrypts cleanly.
    let frame = timeout(Duration::from_secs(4), panel.read_frame())
        .await
        .expect("no version probe")
        .expect("stream closed");
    assert_eq!(frame.command, Some(Command::SoftwareVersionRequest.as_u16()));

    session.shutdown();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn unsupported_scheme_tears_down_session() {
    let (session, mut panel, _events) = session_pair(type2_secrets());
    let runner = tokio::spawn(Arc::clone(&session).run());

    panel
        .send_message(&Message::OpenSession(panel_open_session(0x07)))
        .await;

    // The session terminates cleanly instead of answering.
    runner.await.unwrap().unwrap();
    drop(session);
    assert!(panel.read_frame().await.is_none());
}

#[tokio::test]
async fn type1_request_without_secrets_tears_down_session() {
    // Panel asks for Type 1 but only Type 2 is configured.
    let (session, mut panel, _events) = session_pair(type2_secrets());
    let runner = tokio::spawn(Arc::clone(&session).run());

    panel
        .send_message(&Message::OpenSession(panel_open_session(SCHEME_TYPE1)))
        .await;

    runner.await.unwrap().unwrap();
    drop(session);
    assert!(panel.read_frame().await.is_none());
}

#[tokio::test]
async fn bad_initializer_aborts_handshake() {
    let (session, mut panel, _events) = session_pair(type2_secrets());
    let runner = tokio::spawn(Arc::clone(&session).run());

    run_capability_exchange(&mut panel, SCHEME_TYPE2).await;

    // Wrong length: Type 2 wants exactly 16 bytes.
    panel
        .send_message(&Message::RequestAccess(RequestAccess {
            initializer: vec![0x00; 7],
        }))
        .await;

    runner.await.unwrap().unwrap();
    drop(session);
    assert!(panel.read_frame().await.is_none());
}

/// Sessions stay usable pre-handshake: plaintext polls round-trip before
/// any OpenSession was seen (observed lenient panel behaviour).
#[tokio::test]
async fn plaintext_traffic_before_handshake() {
    let (session, mut panel, _events) = session_pair(type2_secrets());
    let runner = tokio::spawn(Arc::clone(&session).run());

    panel
        .send_frame(Some(Command::ConnectionPoll.as_u16()), Vec::new())
        .await;
    let ack = panel.read_frame().await.expect("ack");
    assert_eq!(ack.command, None);

    session.shutdown();
    runner.await.unwrap().unwrap();
}

/// The reader half is claimed exactly once.
#[tokio::test]
async fn session_runs_once() {
    let (session, _panel, _events) = session_pair(type2_secrets());
    let runner = tokio::spawn(Arc::clone(&session).run());
    tokio::task::yield_now().await;

    let second: Arc<Session> = Arc::clone(&session);
    assert!(second.run().await.is_err());

    session.shutdown();
    runner.await.unwrap().unwrap();
}
