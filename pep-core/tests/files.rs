//! File upload/download against a stub StorageFacility: paged AES-GCM
//! encryption, the multi-writer CLOSE barrier and enumeration.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

use pep_core::file::PAGE_SIZE;
use pep_core::{
    CertifiedSigningPrivateKey, ClientConfig, Error, FileCreationInfo, Metadata,
    SigningCertificateChain, SigningPrivateKey, SignedTicket, StorageFacilityConnection, Triple,
};
use pep_protocol::consts::{FLAG_CLOSE, FLAG_PAYLOAD, FLAG_RESPONSE};
use pep_protocol::transport::RootCa;
use pep_protocol::{open_signed, pack, proto, unpack, Message};

use common::{read_frame, reply, spawn_service, test_ca, write_frame, TestCa};

#[derive(Default)]
struct SfState {
    stored: HashMap<String, Vec<proto::DataPayloadPage>>,
    store_close_frames: usize,
    enumerate_entries: Vec<proto::DataEnumerationEntry2>,
}

async fn handle_sf(mut stream: TlsStream<TcpStream>, state: Arc<Mutex<SfState>>) {
    loop {
        let Ok((header, data)) = read_frame(&mut stream).await else {
            return;
        };
        if data.is_empty() {
            continue;
        }
        let Ok(msg) = unpack(&data) else {
            continue;
        };
        match msg {
            Message::SignedDataStoreRequest2(_) => {
                let Ok(Message::DataStoreRequest2(req)) = open_signed(&msg) else {
                    panic!("signed envelope does not wrap a DataStoreRequest2");
                };
                let sid = header.stream_id();
                let n = req.entries.len();

                let mut by_index: HashMap<u32, Vec<proto::DataPayloadPage>> = HashMap::new();
                loop {
                    let (page_header, page_data) = read_frame(&mut stream).await.unwrap();
                    if page_header.stream_id() != sid {
                        continue;
                    }
                    if !page_data.is_empty() {
                        let Ok(Message::DataPayloadPage(page)) = unpack(&page_data) else {
                            panic!("unexpected frame during store");
                        };
                        by_index.entry(page.index).or_default().push(page);
                    }
                    if page_header.close() {
                        state.lock().unwrap().store_close_frames += 1;
                        break;
                    }
                }

                let ids: Vec<Vec<u8>> =
                    (0..n).map(|i| format!("file-{i}").into_bytes()).collect();
                {
                    let mut st = state.lock().unwrap();
                    for i in 0..n {
                        st.stored.insert(
                            format!("file-{i}"),
                            by_index.remove(&(i as u32)).unwrap_or_default(),
                        );
                    }
                }
                reply(
                    &mut stream,
                    sid,
                    &Message::DataStoreResponse2(proto::DataStoreResponse2 { ids }),
                )
                .await
                .unwrap();
            }

            Message::SignedDataReadRequest2(_) => {
                let Ok(Message::DataReadRequest2(req)) = open_signed(&msg) else {
                    panic!("signed envelope does not wrap a DataReadRequest2");
                };
                let sid = header.stream_id();
                for id in &req.ids {
                    let id = String::from_utf8_lossy(id).into_owned();
                    let pages = state
                        .lock()
                        .unwrap()
                        .stored
                        .get(&id)
                        .cloned()
                        .unwrap_or_default();
                    let last = pages.len().saturating_sub(1);
                    for (i, page) in pages.into_iter().enumerate() {
                        let flags = if i == last {
                            FLAG_RESPONSE | FLAG_PAYLOAD | FLAG_CLOSE
                        } else {
                            FLAG_RESPONSE | FLAG_PAYLOAD
                        };
                        write_frame(
                            &mut stream,
                            sid,
                            flags,
                            &pack(&Message::DataPayloadPage(page)),
                        )
                        .await
                        .unwrap();
                    }
                }
            }

            Message::SignedDataEnumerationRequest2(_) => {
                let entries = state.lock().unwrap().enumerate_entries.clone();
                reply(
                    &mut stream,
                    header.stream_id(),
                    &Message::DataEnumerationResponse2(proto::DataEnumerationResponse2 {
                        entries,
                        has_more: false,
                    }),
                )
                .await
                .unwrap();
            }

            _ => {}
        }
    }
}

struct Fixture {
    sf: StorageFacilityConnection,
    state: Arc<Mutex<SfState>>,
    sk: CertifiedSigningPrivateKey,
    pp: Triple,
    ticket: Arc<SignedTicket>,
}

async fn fixture(ca: &TestCa) -> Fixture {
    let state = Arc::new(Mutex::new(SfState::default()));
    let handler_state = state.clone();
    let addr = spawn_service(ca, "StorageFacility", move |stream| {
        handle_sf(stream, handler_state.clone())
    })
    .await;

    let sf = StorageFacilityConnection::connect(&ClientConfig {
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

    let mut rng = rand::thread_rng();
    let master = RistrettoPoint::mul_base(&Scalar::random(&mut rng));
    let pp = Triple::encrypt(&RistrettoPoint::random(&mut rng), &master, &mut rng).unwrap();
    let ticket = make_ticket(&["Canary", "ParticipantInfo"], &[pp], &["read", "write"]);

    Fixture {
        sf,
        state,
        sk,
        pp,
        ticket,
    }
}

fn make_ticket(columns: &[&str], pps: &[Triple], modes: &[&str]) -> Arc<SignedTicket> {
    let inner = proto::Ticket2 {
        modes: modes.iter().map(|m| m.to_string()).collect(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        pseudonyms: pps
            .iter()
            .map(|pp| proto::LocalPseudonyms {
                access_manager: Some(pp.to_proto()),
                storage_facility: Some(pp.to_proto()),
                polymorphic: Some(pp.to_proto()),
            })
            .collect(),
        timestamp: None,
    };
    Arc::new(SignedTicket::from_packed(proto::SignedTicket2 {
        data: pack(&Message::Ticket2(inner)),
        signature: None,
    }))
}

fn creation_info(fx: &Fixture, column: &str, key: [u8; 32]) -> FileCreationInfo {
    let mut rng = rand::thread_rng();
    let master = RistrettoPoint::mul_base(&Scalar::random(&mut rng));
    FileCreationInfo {
        metadata: Metadata::new(column),
        polymorphic_pseudonym: fx.pp,
        column: column.to_string(),
        encrypted_key: Triple::encrypt(&RistrettoPoint::random(&mut rng), &master, &mut rng)
            .unwrap(),
        key,
    }
}

#[tokio::test]
async fn five_mebibyte_round_trip() {
    let ca = test_ca();
    let fx = fixture(&ca).await;

    let key = [0x11u8; 32];
    let info = creation_info(&fx, "Canary", key);
    let metadata = info.metadata.clone();

    let mut writers = fx.sf.create(&fx.sk, &fx.ticket, &[info]).await.unwrap();
    assert_eq!(writers.len(), 1);
    let mut writer = writers.pop().unwrap();

    let payload = vec![0xABu8; 5 * 1024 * 1024];
    assert_eq!(writer.write(&payload).await.unwrap(), payload.len());
    writer.close().await.unwrap();
    // Closing again is fine; the final page is sent only once.
    writer.close().await.unwrap();

    let id = writer.identifier().await.unwrap();
    assert_eq!(id, "file-0");
    // The identifier is delivered exactly once.
    assert!(writer.identifier().await.is_err());

    {
        let st = fx.state.lock().unwrap();
        let pages = &st.stored["file-0"];
        assert_eq!(pages.len(), 7);
        for page in &pages[..6] {
            assert_eq!(page.payload_data.len(), PAGE_SIZE);
        }
        assert_eq!(
            pages[6].payload_data.len(),
            5 * 1024 * 1024 - 6 * PAGE_SIZE
        );
        for (expected, page) in pages.iter().enumerate() {
            assert_eq!(page.page_number, expected as u64);
            assert_eq!(page.index, 0);
            assert_eq!(page.crypto_nonce.len(), 16);
            assert_eq!(page.crypto_mac.len(), 16);
        }
        assert_eq!(st.store_close_frames, 1);
    }

    let mut reader = fx
        .sf
        .open(&fx.sk, &fx.ticket, &id, &key, &metadata, payload.len() as u64)
        .await
        .unwrap();
    let read_back = reader.read_to_end().await.unwrap();
    assert_eq!(read_back, payload);
    reader.close().await.unwrap();
}

#[tokio::test]
async fn concurrent_two_file_upload_closes_once() {
    let ca = test_ca();
    let fx = fixture(&ca).await;

    let key_a = [0x21u8; 32];
    let key_b = [0x22u8; 32];
    let info_a = creation_info(&fx, "Canary", key_a);
    let info_b = creation_info(&fx, "ParticipantInfo", key_b);
    let (metadata_a, metadata_b) = (info_a.metadata.clone(), info_b.metadata.clone());

    let mut writers = fx
        .sf
        .create(&fx.sk, &fx.ticket, &[info_a, info_b])
        .await
        .unwrap();
    let mut writer_b = writers.pop().unwrap();
    let mut writer_a = writers.pop().unwrap();

    writer_a.write(b"hello").await.unwrap();
    writer_b.write(b"world").await.unwrap();

    // Close in reverse order: the last close sends the only CLOSE frame.
    writer_b.close().await.unwrap();
    writer_a.close().await.unwrap();

    assert_eq!(writer_a.identifier().await.unwrap(), "file-0");
    assert_eq!(writer_b.identifier().await.unwrap(), "file-1");

    {
        let st = fx.state.lock().unwrap();
        assert_eq!(st.store_close_frames, 1);
        assert_eq!(st.stored["file-0"].len(), 1);
        assert_eq!(st.stored["file-1"].len(), 1);
    }

    // Both files decrypt to what their writer wrote.
    let mut reader_a = fx
        .sf
        .open(&fx.sk, &fx.ticket, "file-0", &key_a, &metadata_a, 5)
        .await
        .unwrap();
    assert_eq!(reader_a.read_to_end().await.unwrap(), b"hello");
    reader_a.close().await.unwrap();

    let mut reader_b = fx
        .sf
        .open(&fx.sk, &fx.ticket, "file-1", &key_b, &metadata_b, 5)
        .await
        .unwrap();
    assert_eq!(reader_b.read_to_end().await.unwrap(), b"world");
    reader_b.close().await.unwrap();
}

#[tokio::test]
async fn open_surfaces_key_mismatch_up_front() {
    let ca = test_ca();
    let fx = fixture(&ca).await;

    let key = [0x33u8; 32];
    let info = creation_info(&fx, "Canary", key);
    let metadata = info.metadata.clone();

    let mut writers = fx.sf.create(&fx.sk, &fx.ticket, &[info]).await.unwrap();
    let mut writer = writers.pop().unwrap();
    writer.write(b"guarded").await.unwrap();
    writer.close().await.unwrap();
    let id = writer.identifier().await.unwrap();

    // The priming read runs during open: a wrong key fails immediately.
    let wrong_key = [0x44u8; 32];
    let result = fx
        .sf
        .open(&fx.sk, &fx.ticket, &id, &wrong_key, &metadata, 7)
        .await;
    assert!(matches!(result, Err(Error::Crypto(_))));
}

#[tokio::test]
async fn unknown_column_or_pseudonym_is_a_caller_error() {
    let ca = test_ca();
    let fx = fixture(&ca).await;

    let mut info = creation_info(&fx, "Canary", [0u8; 32]);
    info.column = "NotInTicket".into();
    let err = fx
        .sf
        .create(&fx.sk, &fx.ticket, &[info])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not in provided ticket"), "{err}");

    let mut rng = rand::thread_rng();
    let master = RistrettoPoint::mul_base(&Scalar::random(&mut rng));
    let mut info = creation_info(&fx, "Canary", [0u8; 32]);
    info.polymorphic_pseudonym =
        Triple::encrypt(&RistrettoPoint::random(&mut rng), &master, &mut rng).unwrap();
    let err = fx
        .sf
        .create(&fx.sk, &fx.ticket, &[info])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not in provided ticket"), "{err}");
}

#[tokio::test]
async fn enumeration_resolves_against_the_ticket() {
    let ca = test_ca();
    let fx = fixture(&ca).await;

    let mut rng = rand::thread_rng();
    let master = RistrettoPoint::mul_base(&Scalar::random(&mut rng));
    let enc_key = Triple::encrypt(&RistrettoPoint::random(&mut rng), &master, &mut rng).unwrap();

    fx.state.lock().unwrap().enumerate_entries = vec![proto::DataEnumerationEntry2 {
        id: b"file-7".to_vec(),
        metadata: Some(Metadata::new("Canary").to_proto()),
        polymorphic_key: Some(enc_key.to_proto()),
        file_size: 42,
        column_index: 0,
        pseudonym_index: 0,
    }];

    let files = fx.sf.enumerate(&fx.sk, &fx.ticket).await.unwrap();
    assert_eq!(files.len(), 1);
    let info = &files[0];
    assert_eq!(info.identifier, "file-7");
    assert_eq!(info.column, "Canary");
    assert_eq!(info.file_size, 42);
    assert_eq!(info.encrypted_key, Some(enc_key));
    assert_eq!(info.polymorphic_pseudonym(), Some(&fx.pp));
    assert!(Arc::ptr_eq(&info.ticket, &fx.ticket));
}

#[tokio::test]
async fn out_of_range_indices_fail_without_partial_results() {
    let ca = test_ca();
    let fx = fixture(&ca).await;

    let mut rng = rand::thread_rng();
    let master = RistrettoPoint::mul_base(&Scalar::random(&mut rng));
    let enc_key = Triple::encrypt(&RistrettoPoint::random(&mut rng), &master, &mut rng).unwrap();

    let good = proto::DataEnumerationEntry2 {
        id: b"good".to_vec(),
        metadata: Some(Metadata::new("Canary").to_proto()),
        polymorphic_key: Some(enc_key.to_proto()),
        file_size: 1,
        column_index: 0,
        pseudonym_index: 0,
    };
    let mut bad = good.clone();
    bad.id = b"bad".to_vec();
    bad.column_index = 5;

    fx.state.lock().unwrap().enumerate_entries = vec![good, bad];

    let err = fx.sf.enumerate(&fx.sk, &fx.ticket).await.unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange(_)), "{err}");
}
