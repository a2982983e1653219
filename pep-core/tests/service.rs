//! Miscellaneous service calls: checksum chains, metrics, version.

mod common;

use pep_core::{
    list_checksum_chains, query_checksum_chain, retrieve_metrics, CertifiedSigningPrivateKey,
    ClientConfig, SigningCertificateChain, SigningPrivateKey, TranscryptorConnection,
};
use pep_protocol::transport::RootCa;
use pep_protocol::{message, open_signed, proto, unpack, Message};

use common::{read_frame, reply, spawn_service, test_ca};

#[tokio::test]
async fn checksum_chains_metrics_and_version() {
    let ca = test_ca();
    let addr = spawn_service(&ca, "Transcryptor", |mut stream| async move {
        while let Ok((header, data)) = read_frame(&mut stream).await {
            if data.is_empty() {
                continue;
            }
            let Ok(msg) = unpack(&data) else {
                continue;
            };
            let response = match &msg {
                Message::SignedChecksumChainNamesRequest(_) => {
                    assert!(matches!(
                        open_signed(&msg),
                        Ok(Message::ChecksumChainNamesRequest(_))
                    ));
                    Message::ChecksumChainNamesResponse(proto::ChecksumChainNamesResponse {
                        names: vec!["data".into(), "pseudonyms".into()],
                    })
                }
                Message::SignedChecksumChainRequest(_) => {
                    let Ok(Message::ChecksumChainRequest(req)) = open_signed(&msg) else {
                        panic!("envelope does not wrap a ChecksumChainRequest");
                    };
                    assert_eq!(req.name, "data");
                    // Full chain when no checkpoint is given.
                    assert!(req.checkpoint.is_empty());
                    Message::ChecksumChainResponse(proto::ChecksumChainResponse {
                        xorred_checksums: vec![0xde, 0xad],
                        checkpoint: vec![0x02],
                    })
                }
                Message::SignedMetricsRequest(_) => {
                    Message::MetricsResponse(proto::MetricsResponse {
                        metrics: b"pep_up 1\n".to_vec(),
                    })
                }
                Message::VersionRequest(_) => {
                    Message::VersionResponse(message::current_version_response())
                }
                _ => continue,
            };
            reply(&mut stream, header.stream_id(), &response).await.unwrap();
        }
    })
    .await;

    let ts = TranscryptorConnection::connect(&ClientConfig {
        addr,
        root_ca: RootCa::Pem(ca.ca_pem.clone()),
        timeout: None,
        patient: false,
    })
    .await
    .unwrap();

    let sk = CertifiedSigningPrivateKey {
        private_key: SigningPrivateKey::generate().unwrap(),
        certificate_chain: SigningCertificateChain::default(),
    };

    let names = list_checksum_chains(&sk, ts.conn()).await.unwrap();
    assert_eq!(names, vec!["data".to_string(), "pseudonyms".to_string()]);

    let (xorred, checkpoint) = query_checksum_chain(&sk, ts.conn(), "data", None)
        .await
        .unwrap();
    assert_eq!(xorred, vec![0xde, 0xad]);
    assert_eq!(checkpoint, vec![0x02]);

    let metrics = retrieve_metrics(&sk, ts.conn()).await.unwrap();
    assert_eq!(metrics, b"pep_up 1\n");

    let version = ts.conn().version().await.unwrap();
    assert_eq!(version.protocol_checksum.len(), 20);

    ts.close().await;
}
