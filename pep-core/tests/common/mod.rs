//! In-process TLS stub servers speaking the PEP frame protocol.
#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;

use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::PrivatePkcs8KeyDer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use pep_protocol::consts::{FLAG_CLOSE, FLAG_PAYLOAD, FLAG_RESPONSE, FRAME_HEADER_SIZE};
use pep_protocol::{pack, proto, FrameHeader, Message};

pub struct TestCa {
    pub ca_pem: String,
    ca_key: KeyPair,
    ca_cert: rcgen::Certificate,
}

pub fn test_ca() -> TestCa {
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

impl TestCa {
    fn acceptor(&self, name: &str) -> TlsAcceptor {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key).unwrap();

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(
                vec![cert.der().clone()],
                PrivatePkcs8KeyDer::from(key.serialize_der()).into(),
            )
            .unwrap();
        TlsAcceptor::from(Arc::new(config))
    }

    /// A certificate chain for an enrolling client, expiring at the given
    /// date.
    pub fn issue_client_chain(
        &self,
        user: &str,
        not_after: (i32, u8, u8),
    ) -> proto::X509CertificateChain {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, user);
        params.not_after = rcgen::date_time_ymd(not_after.0, not_after.1, not_after.2);
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key).unwrap();
        proto::X509CertificateChain {
            certificate: vec![proto::X509Certificate {
                data: cert.der().to_vec(),
            }],
        }
    }
}

/// Spawn a stub service; `handler` runs once per accepted connection.
pub async fn spawn_service<F, Fut>(ca: &TestCa, name: &str, handler: F) -> String
where
    F: Fn(TlsStream<TcpStream>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let tls = ca.acceptor(name);
    tokio::spawn(async move {
        loop {
            let Ok((tcp, _)) = listener.accept().await else {
                return;
            };
            let tls = tls.clone();
            if let Ok(stream) = tls.accept(tcp).await {
                tokio::spawn(handler(stream));
            }
        }
    });
    addr
}

/// A service that accepts connections and silently reads frames forever.
pub async fn spawn_idle_service(ca: &TestCa, name: &str) -> String {
    spawn_service(ca, name, |mut stream| async move {
        while read_frame(&mut stream).await.is_ok() {}
    })
    .await
}

pub async fn read_frame<S: AsyncRead + Unpin>(
    s: &mut S,
) -> std::io::Result<(FrameHeader, Vec<u8>)> {
    let mut hdr = [0u8; FRAME_HEADER_SIZE];
    s.read_exact(&mut hdr).await?;
    let header = FrameHeader::unpack(hdr);
    let mut data = vec![0u8; header.size as usize];
    s.read_exact(&mut data).await?;
    Ok((header, data))
}

pub async fn write_frame<S: AsyncWrite + Unpin>(
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

/// Reply on a stream with a single RESPONSE+PAYLOAD+CLOSE frame.
pub async fn reply<S: AsyncWrite + Unpin>(
    s: &mut S,
    stream_id: u32,
    msg: &Message,
) -> std::io::Result<()> {
    write_frame(
        s,
        stream_id,
        FLAG_RESPONSE | FLAG_PAYLOAD | FLAG_CLOSE,
        &pack(msg),
    )
    .await
}
