//! Uploading and downloading files from the StorageFacility.
//!
//! Files are split into pages of [`PAGE_SIZE`] bytes, each encrypted with
//! AES-256-GCM under a per-file key and a fresh 16-byte nonce. The
//! additional authenticated data depends on the metadata's encryption
//! scheme: the serialised metadata itself (V1) or the big-endian page
//! number (V2, V3).
//!
//! One store stream carries the interleaved page frames of all files in a
//! single store request; the `index` field of each page tells them apart.
//! Closing is a barrier: the last [`FileWriter`] to close sends the only
//! CLOSE-flagged frame, awaits the single response carrying all assigned
//! identifiers, and fans them out to the writers.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use prost::Message as _;
use rand::RngCore;
use tokio::sync::oneshot;
use tokio::sync::Mutex;

use pep_protocol::{pack, proto, Message, Stream};

use crate::metadata::{EncryptionScheme, Metadata};
use crate::ticket::{LocalPseudonyms, SignedTicket};
use crate::triple::Triple;
use crate::Error;

/// Size of a plaintext page. Fixed for wire compatibility.
pub const PAGE_SIZE: usize = 1024 * 1024 * 8 / 10;

/// Size of the GCM authentication tag appended to each page.
pub const TAG_SIZE: usize = 16;

/// Size of the GCM nonce. Sixteen bytes, deliberately non-standard; the
/// AEAD is instantiated with a widened nonce to match.
pub const NONCE_SIZE: usize = 16;

/// Size of the per-file symmetric key.
pub const KEY_SIZE: usize = 32;

type PageCipher = AesGcm<Aes256, U16>;

/// Information about a file returned by an enumeration request.
///
/// Which fields are set varies by the source of the record: enumeration
/// fills everything, history yields identifiers and indices only.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// StorageFacility primary key.
    pub identifier: String,

    /// Metadata, when the source request carries it.
    pub metadata: Option<Metadata>,

    /// Polymorphic encryption key of the file's payload.
    pub encrypted_key: Option<Triple>,

    /// Total file size in bytes.
    pub file_size: u64,

    /// The ticket under which this record was obtained.
    pub ticket: Arc<SignedTicket>,

    /// Local pseudonyms of the participant the file belongs to.
    pub pseudonyms: Option<LocalPseudonyms>,

    /// Column the file is stored under.
    pub column: String,
}

impl FileInfo {
    /// The polymorphic pseudonym of the participant, when resolved.
    pub fn polymorphic_pseudonym(&self) -> Option<&Triple> {
        self.pseudonyms.as_ref().map(|lp| &lp.polymorphic)
    }
}

pub(crate) fn page_cipher(key: &[u8; KEY_SIZE]) -> Result<PageCipher, Error> {
    PageCipher::new_from_slice(key).map_err(|err| Error::Crypto(format!("page cipher: {err}")))
}

fn compute_additional_data(metadata: &Metadata, page_number: u64) -> Vec<u8> {
    match metadata.encryption_scheme {
        EncryptionScheme::V1 => metadata.to_proto().encode_to_vec(),
        EncryptionScheme::V2 | EncryptionScheme::V3 => page_number.to_be_bytes().to_vec(),
    }
}

/// Reads one file off a read stream, page by page.
pub struct FileReader {
    stream: Stream,
    cipher: PageCipher,
    metadata: Metadata,

    buffer: Vec<u8>,
    pos: usize,
    to_read: i64,
}

impl std::fmt::Debug for FileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReader")
            .field("stream", &self.stream)
            .field("to_read", &self.to_read)
            .finish()
    }
}

impl FileReader {
    pub(crate) fn new(
        stream: Stream,
        key: &[u8; KEY_SIZE],
        metadata: Metadata,
        file_size: u64,
    ) -> Result<FileReader, Error> {
        Ok(FileReader {
            stream,
            cipher: page_cipher(key)?,
            metadata,
            buffer: Vec::new(),
            pos: 0,
            to_read: file_size as i64,
        })
    }

    /// Read at most one page's worth of bytes into `out`. Returns 0 at
    /// end of file (or when `out` is empty, which merely primes the
    /// internal buffer and surfaces errors up-front).
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        while self.pos >= self.buffer.len() {
            if self.to_read <= 0 {
                return Ok(0);
            }
            let msg = self.stream.receive_and_parse().await?;
            let Message::DataPayloadPage(page) = msg else {
                return Err(Error::UnexpectedResponse {
                    context: "read file",
                    got: msg.name(),
                });
            };

            if page.crypto_nonce.len() != NONCE_SIZE {
                return Err(Error::Crypto(format!(
                    "page nonce has length {}, not {NONCE_SIZE}",
                    page.crypto_nonce.len()
                )));
            }

            let ad = compute_additional_data(&self.metadata, page.page_number);
            let mut ciphertext = page.payload_data;
            ciphertext.extend_from_slice(&page.crypto_mac);

            let plaintext = self
                .cipher
                .decrypt(
                    Nonce::<U16>::from_slice(&page.crypto_nonce),
                    Payload {
                        msg: &ciphertext,
                        aad: &ad,
                    },
                )
                .map_err(|_| {
                    Error::Crypto(format!(
                        "authentication of page {} failed",
                        page.page_number
                    ))
                })?;

            self.to_read -= plaintext.len() as i64;
            self.buffer = plaintext;
            self.pos = 0;
        }

        let n = (self.buffer.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    /// Read the remainder of the file into a buffer.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    /// Close the underlying stream.
    pub async fn close(mut self) -> Result<(), Error> {
        self.stream.close().await.map_err(Error::from)
    }
}

/// State shared between the file writers on the same store stream.
struct StreamWriter {
    stream: Mutex<Stream>,

    /// Writers that have not sent their final page yet. The decrement in
    /// [`StreamWriter::send`] is the linearisation point of the CLOSE
    /// barrier.
    unfinished: AtomicI32,

    feedback: StdMutex<Vec<Option<oneshot::Sender<String>>>>,
}

impl StreamWriter {
    async fn send(&self, buf: Vec<u8>, last: bool) -> Result<(), Error> {
        if !last {
            return self
                .stream
                .lock()
                .await
                .send_data(buf)
                .await
                .map_err(Error::from);
        }

        // Record that we finished and check whether the CLOSE is ours to
        // send.
        let unfinished = self.unfinished.fetch_sub(1, Ordering::SeqCst) - 1;

        if unfinished < 0 {
            return Err(Error::protocol(
                "too many 'final' messages were sent over this stream",
            ));
        }

        let mut stream = self.stream.lock().await;
        if unfinished > 0 {
            return stream.send_data(buf).await.map_err(Error::from);
        }

        // The honour is ours.
        stream.send_last_data(buf).await?;

        let msg = stream.receive_and_parse().await?;
        let Message::DataStoreResponse2(resp) = msg else {
            return Err(Error::UnexpectedResponse {
                context: "store files",
                got: msg.name(),
            });
        };

        {
            let mut feedback = self.feedback.lock().unwrap();
            if resp.ids.len() != feedback.len() {
                return Err(Error::protocol(format!(
                    "storage facility returned {} identifiers for {} files",
                    resp.ids.len(),
                    feedback.len()
                )));
            }
            for (sender, id) in feedback.iter_mut().zip(resp.ids) {
                if let Some(tx) = sender.take() {
                    let _ = tx.send(String::from_utf8_lossy(&id).into_owned());
                }
            }
        }

        stream.close().await.map_err(Error::from)
    }
}

/// Writes one file onto a shared store stream.
pub struct FileWriter {
    sw: Arc<StreamWriter>,
    cipher: PageCipher,
    metadata: Metadata,

    /// Index of the associated store entry; tags every page.
    index: u32,

    buffer: Vec<u8>,
    used: usize,
    page_no: u64,
    closed: bool,

    identifier: Option<oneshot::Receiver<String>>,
}

impl std::fmt::Debug for FileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWriter")
            .field("index", &self.index)
            .field("page_no", &self.page_no)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Create the writers for one store stream: one per file, sharing the
/// stream and the CLOSE barrier.
pub(crate) fn new_file_writers(
    stream: Stream,
    keys: &[[u8; KEY_SIZE]],
    metadatas: &[Metadata],
) -> Result<Vec<FileWriter>, Error> {
    if keys.len() != metadatas.len() {
        return Err(Error::protocol("one key per file metadata is required"));
    }
    let n = keys.len();

    let mut senders = Vec::with_capacity(n);
    let mut receivers = Vec::with_capacity(n);
    for _ in 0..n {
        let (tx, rx) = oneshot::channel();
        senders.push(Some(tx));
        receivers.push(rx);
    }

    let sw = Arc::new(StreamWriter {
        stream: Mutex::new(stream),
        unfinished: AtomicI32::new(n as i32),
        feedback: StdMutex::new(senders),
    });

    keys.iter()
        .zip(metadatas)
        .zip(receivers)
        .enumerate()
        .map(|(index, ((key, metadata), rx))| {
            Ok(FileWriter {
                sw: sw.clone(),
                cipher: page_cipher(key)?,
                metadata: metadata.clone(),
                index: index as u32,
                buffer: vec![0u8; PAGE_SIZE],
                used: 0,
                page_no: 0,
                closed: false,
                identifier: Some(rx),
            })
        })
        .collect()
}

impl FileWriter {
    /// Buffer `data`, emitting an encrypted page frame for every full
    /// page.
    pub async fn write(&mut self, mut data: &[u8]) -> Result<usize, Error> {
        let mut written = 0;
        while !data.is_empty() {
            let to_copy = data.len().min(PAGE_SIZE - self.used);
            self.buffer[self.used..self.used + to_copy].copy_from_slice(&data[..to_copy]);
            self.used += to_copy;
            written += to_copy;
            data = &data[to_copy..];

            if self.used == PAGE_SIZE {
                self.emit_page(false).await?;
                self.page_no += 1;
                self.used = 0;
            }
        }
        Ok(written)
    }

    /// Emit the final (possibly short or empty) page and join the CLOSE
    /// barrier. Idempotent.
    pub async fn close(&mut self) -> Result<(), Error> {
        if !self.closed {
            self.closed = true;
            self.emit_page(true).await?;
        }
        Ok(())
    }

    /// The StorageFacility primary key of the file. Delivered once all
    /// writers on the stream have closed.
    pub async fn identifier(&mut self) -> Result<String, Error> {
        let rx = self
            .identifier
            .take()
            .ok_or_else(|| Error::protocol("file identifier was already taken"))?;
        rx.await
            .map_err(|_| Error::protocol("store stream ended before identifiers were delivered"))
    }

    async fn emit_page(&mut self, last: bool) -> Result<(), Error> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ad = compute_additional_data(&self.metadata, self.page_no);
        let sealed = self
            .cipher
            .encrypt(
                Nonce::<U16>::from_slice(&nonce),
                Payload {
                    msg: &self.buffer[..self.used],
                    aad: &ad,
                },
            )
            .map_err(|err| Error::Crypto(format!("page encryption failed: {err}")))?;

        let split = sealed.len() - TAG_SIZE;
        let page = proto::DataPayloadPage {
            payload_data: sealed[..split].to_vec(),
            crypto_nonce: nonce.to_vec(),
            crypto_mac: sealed[split..].to_vec(),
            page_number: self.page_no,
            index: self.index,
        };

        let buf = pack(&Message::DataPayloadPage(page));
        self.sw.send(buf, last).await
    }
}
