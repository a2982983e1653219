//! End-to-end exercises of the multiplexed transport against an
//! in-process TLS stub server.

use std::sync::Arc;

use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::PrivatePkcs8KeyDer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use pep_protocol::consts::*;
use pep_protocol::{pack, proto, unpack, Config, Connection, Error, FrameHeader, Message, RootCa};

struct TestCa {
    ca_pem: String,
    ca_key: KeyPair,
    ca_cert: rcgen::Certificate,
}

fn test_ca() -> TestCa {
    let ca_key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name.push(DnType::CommonName, "PEP test CA");
    let ca_cert = params.self_signed(&ca_key).unwrap();
    TestCa {
        ca_pem: ca_cert.pem(),
        ca_key,
        ca_cert,
    }
}

fn acceptor(ca: &TestCa, name: &str) -> TlsAcceptor {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
    params.distinguished_name.push(DnType::CommonName, name);
    let cert = params.signed_by(&key, &ca.ca_cert, &ca.ca_key).unwrap();

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(
            vec![cert.der().clone()],
            PrivatePkcs8KeyDer::from(key.serialize_der()).into(),
        )
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

async fn read_frame<S: AsyncRead + Unpin>(s: &mut S) -> std::io::Result<(FrameHeader, Vec<u8>)> {
    let mut hdr = [0u8; FRAME_HEADER_SIZE];
    s.read_exact(&mut hdr).await?;
    let header = FrameHeader::unpack(hdr);
    let mut data = vec![0u8; header.size as usize];
    s.read_exact(&mut data).await?;
    Ok((header, data))
}

async fn write_frame<S: AsyncWrite + Unpin>(
    s: &mut S,
    stream_id: u32,
    flags: u32,
    data: &[u8],
) -> std::io::Result<()> {
    let mut header = FrameHeader {
        size: data.len() as u32,
        flags_and_stream_id: flags,
    };
    header.set_stream_id(stream_id);
    s.write_all(&header.pack()).await?;
    s.write_all(data).await?;
    s.flush().await
}

/// Accept one TLS connection and run `handler` on it.
async fn serve_one<F, Fut>(listener: TcpListener, tls: TlsAcceptor, handler: F)
where
    F: FnOnce(TlsStream<TcpStream>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let stream = tls.accept(tcp).await.unwrap();
        handler(stream).await;
    });
}

fn client_config(ca: &TestCa, addr: &str, cn: &str) -> Config {
    Config {
        addr: addr.to_string(),
        root_ca: RootCa::Pem(ca.ca_pem.clone()),
        expected_server_cn: Some(cn.to_string()),
        timeout: None,
        patient: false,
    }
}

/// Answer every PingRequest that arrives, on its own stream.
async fn pong_forever(mut stream: TlsStream<TcpStream>) {
    while let Ok((header, data)) = read_frame(&mut stream).await {
        if data.is_empty() {
            continue; // keep-alive or a bare CLOSE
        }
        if let Ok(Message::PingRequest(ping)) = unpack(&data) {
            let reply = pack(&Message::PingResponse(proto::PingResponse { id: ping.id }));
            write_frame(
                &mut stream,
                header.stream_id(),
                FLAG_RESPONSE | FLAG_PAYLOAD | FLAG_CLOSE,
                &reply,
            )
            .await
            .unwrap();
        }
    }
}

#[tokio::test]
async fn ping_pong() {
    let ca = test_ca();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    serve_one(listener, acceptor(&ca, "StorageFacility"), pong_forever).await;

    let conn = Connection::connect(client_config(&ca, &addr, "StorageFacility"))
        .await
        .unwrap();
    conn.ping().await.unwrap();
    conn.close().await;
    assert!(conn.closed().await);
}

#[tokio::test]
async fn wildcard_common_name_is_accepted() {
    let ca = test_ca();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    serve_one(listener, acceptor(&ca, "whatever.example"), pong_forever).await;

    let conn = Connection::connect(client_config(&ca, &addr, "*"))
        .await
        .unwrap();
    conn.ping().await.unwrap();
    conn.close().await;
}

#[tokio::test]
async fn wrong_common_name_is_rejected() {
    let ca = test_ca();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    serve_one(listener, acceptor(&ca, "NotTheServerYouExpect"), pong_forever).await;

    let result = Connection::connect(client_config(&ca, &addr, "StorageFacility")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn keep_alives_and_unknown_stream_closes_are_discarded() {
    let ca = test_ca();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    serve_one(
        listener,
        acceptor(&ca, "StorageFacility"),
        |mut stream| async move {
            let (header, data) = read_frame(&mut stream).await.unwrap();
            let Ok(Message::PingRequest(ping)) = unpack(&data) else {
                panic!("expected a ping");
            };

            // Keep-alive: size 0, stream 0.
            write_frame(&mut stream, 0, 0, &[]).await.unwrap();
            // A close for a stream the client never opened.
            write_frame(&mut stream, 999, FLAG_RESPONSE | FLAG_CLOSE, &[])
                .await
                .unwrap();

            // A pong inside a signed envelope, unwrapped transparently.
            let pong = pack(&Message::PingResponse(proto::PingResponse { id: ping.id }));
            let signed = pack(&Message::SignedPingResponse(proto::SignedPingResponse {
                data: pong,
                signature: None,
            }));
            write_frame(
                &mut stream,
                header.stream_id(),
                FLAG_RESPONSE | FLAG_PAYLOAD | FLAG_CLOSE,
                &signed,
            )
            .await
            .unwrap();

            // Drain the client's trailing CLOSE.
            let _ = read_frame(&mut stream).await;
        },
    )
    .await;

    let conn = Connection::connect(client_config(&ca, &addr, "StorageFacility"))
        .await
        .unwrap();
    conn.ping().await.unwrap();
    conn.close().await;
}

#[tokio::test]
async fn server_initiated_version_request_is_answered() {
    let ca = test_ca();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let (tx, rx) = tokio::sync::oneshot::channel();
    serve_one(
        listener,
        acceptor(&ca, "AccessManager"),
        |mut stream| async move {
            // RESPONSE clear: a request from the server to the client.
            let req = pack(&Message::VersionRequest(proto::VersionRequest {}));
            write_frame(&mut stream, 7, FLAG_PAYLOAD, &req).await.unwrap();

            loop {
                let (header, data) = read_frame(&mut stream).await.unwrap();
                if header.stream_id() != 7 {
                    continue;
                }
                assert!(header.is_response());
                assert!(header.has_payload());
                assert!(header.close());
                let Ok(Message::VersionResponse(version)) = unpack(&data) else {
                    panic!("expected a VersionResponse");
                };
                tx.send(version).unwrap();
                return;
            }
        },
    )
    .await;

    let conn = Connection::connect(client_config(&ca, &addr, "AccessManager"))
        .await
        .unwrap();
    let version = rx.await.unwrap();
    assert_eq!(version.protocol_checksum.len(), PROTOCOL_CHECKSUM_LEN);
    assert!(version
        .protocol_checksum
        .starts_with(&format!("{MANUAL_PROTOCOL_CHECKSUM_COMPONENT:02x}")));
    conn.close().await;
}

#[tokio::test]
async fn patient_connect_reconnects_on_first_activity() {
    let ca = test_ca();
    // Find a free port, then leave it unbound while the client dials.
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let mut config = client_config(&ca, &addr.to_string(), "StorageFacility");
    config.patient = true;
    let conn = Connection::connect(config).await.unwrap();

    // Now the server comes up; the first request triggers the dial.
    let listener = TcpListener::bind(addr).await.unwrap();
    serve_one(listener, acceptor(&ca, "StorageFacility"), pong_forever).await;

    conn.ping().await.unwrap();
    conn.close().await;
}

#[tokio::test]
async fn second_consecutive_failure_surfaces() {
    let ca = test_ca();
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap().to_string();
    drop(probe);

    let mut config = client_config(&ca, &addr, "StorageFacility");
    config.patient = true;
    let conn = Connection::connect(config).await.unwrap();

    // Nobody ever listens: the silent reconnect fails too and the error
    // surfaces as a transport error.
    let err = conn.ping().await.unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err}");
}

#[tokio::test]
async fn concurrent_requests_share_one_connection() {
    let ca = test_ca();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    serve_one(listener, acceptor(&ca, "StorageFacility"), pong_forever).await;

    let conn = Connection::connect(client_config(&ca, &addr, "StorageFacility"))
        .await
        .unwrap();
    let (a, b, c) = tokio::join!(conn.ping(), conn.ping(), conn.ping());
    a.unwrap();
    b.unwrap();
    c.unwrap();
    conn.close().await;
}

#[tokio::test]
async fn response_anomalies_are_collected() {
    let ca = test_ca();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    serve_one(
        listener,
        acceptor(&ca, "StorageFacility"),
        |mut stream| async move {
            let (header, data) = read_frame(&mut stream).await.unwrap();
            let Ok(Message::PingRequest(ping)) = unpack(&data) else {
                panic!("expected a ping");
            };
            let reply = pack(&Message::PingResponse(proto::PingResponse { id: ping.id }));
            // Two payload frames; the second one also lacks RESPONSE.
            write_frame(&mut stream, header.stream_id(), FLAG_RESPONSE | FLAG_PAYLOAD, &reply)
                .await
                .unwrap();
            write_frame(&mut stream, header.stream_id(), FLAG_PAYLOAD | FLAG_CLOSE, &reply)
                .await
                .unwrap();
            let _ = read_frame(&mut stream).await;
        },
    )
    .await;

    let conn = Connection::connect(client_config(&ca, &addr, "StorageFacility"))
        .await
        .unwrap();
    let err = conn.ping().await.unwrap_err();
    let text = err.to_string();
    assert!(text.contains("second message with a PAYLOAD flag"), "{text}");
    assert!(text.contains("without RESPONSE flag"), "{text}");
    conn.close().await;
}

#[tokio::test]
async fn server_error_envelope_is_surfaced() {
    let ca = test_ca();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    serve_one(
        listener,
        acceptor(&ca, "StorageFacility"),
        |mut stream| async move {
            let (header, _) = read_frame(&mut stream).await.unwrap();
            let envelope = pack(&Message::Error(proto::Error {
                description: "no such file".into(),
            }));
            write_frame(
                &mut stream,
                header.stream_id(),
                FLAG_RESPONSE | FLAG_ERROR | FLAG_CLOSE,
                &envelope,
            )
            .await
            .unwrap();
            let _ = read_frame(&mut stream).await;
        },
    )
    .await;

    let conn = Connection::connect(client_config(&ca, &addr, "StorageFacility"))
        .await
        .unwrap();
    let err = conn.ping().await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    assert!(err.to_string().contains("no such file"), "{err}");
    conn.close().await;
}
