//! The multiplexed TLS connection used to talk to a PEP server.
//!
//! A [`Connection`] owns one TLS socket and a table of open [`Stream`]s.
//! A single background reader task dispatches incoming frames to the
//! per-stream inboxes; all writes go through one write mutex so frames
//! are never interleaved. When a send for a brand-new stream fails, the
//! connection silently reconnects once: all other streams are torn down
//! (their frames can no longer be trusted), the socket is redialled and
//! the send is retried.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use rand::Rng;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::consts::*;
use crate::frame::FrameHeader;
use crate::message::{self, Message};
use crate::proto;
use crate::Error;

/// Root certificate to pin the server against. Exactly one form is given.
#[derive(Debug, Clone)]
pub enum RootCa {
    /// Path to a PEM file.
    File(PathBuf),
    /// Inline PEM.
    Pem(String),
    /// An already-parsed DER certificate.
    Der(CertificateDer<'static>),
}

/// Configuration of a client connection.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server to connect to, as `host:port`.
    pub addr: String,

    /// Root certificate the server certificate must chain to.
    pub root_ca: RootCa,

    /// If `None`, the server certificate is checked against the host in
    /// `addr`. If set to `"*"`, any server common name is accepted (when
    /// signed by the CA, of course). Otherwise the certificate is checked
    /// against the expected common name.
    pub expected_server_cn: Option<String>,

    /// Deadline put on every write. The default is no deadline.
    pub timeout: Option<Duration>,

    /// If set, [`Connection::connect`] succeeds even though the server is
    /// down; the client reconnects on the first activity.
    pub patient: bool,
}

impl Config {
    /// A configuration with defaults for everything but the address and
    /// root certificate.
    pub fn new(addr: impl Into<String>, root_ca: RootCa) -> Self {
        Config {
            addr: addr.into(),
            root_ca,
            expected_server_cn: None,
            timeout: None,
            patient: false,
        }
    }
}

/// A halfway-parsed message received over a stream. Depending on the
/// context the data is a packed protocol message or not.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    /// The frame payload.
    pub data: Vec<u8>,

    /// ERROR flag.
    pub is_error: bool,

    /// PAYLOAD flag.
    pub has_payload: bool,

    /// CLOSE flag.
    pub close: bool,

    /// RESPONSE flag.
    pub is_response: bool,
}

impl RawMessage {
    /// Parse the data as a protocol message.
    pub fn parse(&self) -> Result<Message, Error> {
        message::unpack(&self.data)
    }

    fn header(&self, stream_id: u32) -> FrameHeader {
        let mut h = FrameHeader {
            size: self.data.len() as u32,
            flags_and_stream_id: 0,
        };
        h.set_stream_id(stream_id);
        h.set_is_response(self.is_response);
        h.set_close(self.close);
        h.set_is_error(self.is_error);
        h.set_has_payload(self.has_payload);
        h
    }
}

#[derive(Debug, Default)]
struct StreamQueue {
    buf: VecDeque<RawMessage>,
    closed: bool,
    reader_running: bool,
}

/// Inbox shared between the reader task and one [`Stream`] handle.
#[derive(Debug, Default)]
struct StreamShared {
    queue: StdMutex<StreamQueue>,
    incoming: Notify,
}

impl StreamShared {
    fn new(reader_running: bool) -> Self {
        StreamShared {
            queue: StdMutex::new(StreamQueue {
                buf: VecDeque::new(),
                closed: false,
                reader_running,
            }),
            incoming: Notify::new(),
        }
    }

    fn push(&self, msg: RawMessage) {
        self.queue.lock().unwrap().buf.push_back(msg);
        self.incoming.notify_waiters();
    }

    fn close_local(&self) {
        self.queue.lock().unwrap().closed = true;
        self.incoming.notify_waiters();
    }

    fn set_reader_running(&self, v: bool) {
        self.queue.lock().unwrap().reader_running = v;
        if !v {
            self.incoming.notify_waiters();
        }
    }
}

type Socket = WriteHalf<TlsStream<TcpStream>>;

struct State {
    next_stream_id: u32,
    streams: HashMap<u32, Arc<StreamShared>>,
    reader: Option<JoinHandle<()>>,
    reader_running: bool,
    closed: bool,
    peer_certificates: Vec<CertificateDer<'static>>,
}

struct Inner {
    addr: String,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    timeout: Option<Duration>,
    label: String,

    /// Guards the stream table, stream id allocation and the reader task.
    state: Mutex<State>,

    /// Serialises all writes to the socket; frames are never interleaved.
    write: Mutex<Option<Socket>>,
}

/// A client connection to a PEP server.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.inner.addr)
            .field("label", &self.inner.label)
            .finish()
    }
}

impl Connection {
    /// Connect as a client to the given PEP server.
    ///
    /// With [`Config::patient`] set this succeeds even when the dial
    /// fails; the first send then triggers the reconnect.
    pub async fn connect(config: Config) -> Result<Connection, Error> {
        let roots = load_root_store(&config.root_ca)?;
        let (client_config, server_name) = tls_client_config(&config, roots)?;

        let label = match config.expected_server_cn.as_deref() {
            Some("*") | None => config.addr.clone(),
            Some(cn) => cn.to_string(),
        };

        let inner = Arc::new(Inner {
            addr: config.addr,
            server_name,
            connector: TlsConnector::from(Arc::new(client_config)),
            timeout: config.timeout,
            label,
            state: Mutex::new(State {
                next_stream_id: 1,
                streams: HashMap::new(),
                reader: None,
                reader_running: false,
                closed: false,
                peer_certificates: Vec::new(),
            }),
            write: Mutex::new(None),
        });

        let conn = Connection { inner };
        if let Err(err) = conn.ensure_connected().await {
            if !config.patient {
                return Err(err);
            }
            debug!(server = %conn.inner.label, error = %err, "initial dial failed, waiting for activity");
        }
        Ok(conn)
    }

    /// Whether [`Connection::close`] was called on this side.
    pub async fn closed(&self) -> bool {
        self.inner.state.lock().await.closed
    }

    /// Close the connection and tear down all streams. Idempotent.
    pub async fn close(&self) {
        let mut state = self.inner.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        let mut write = self.inner.write.lock().await;
        if let Some(reader) = close_streams(&mut state, &mut write) {
            reader.abort();
        }
    }

    /// Send a message and expect a single reply.
    ///
    /// All anomalies seen while draining the stream (missing RESPONSE
    /// flag, duplicate CLOSE, second PAYLOAD, server error envelopes) are
    /// collected and joined into one error.
    pub async fn request(&self, msg: Message) -> Result<Message, Error> {
        let mut stream = self.request_stream(msg).await?;

        let mut errs: Vec<String> = Vec::new();
        let mut resp: Option<Message> = None;
        let mut saw_close = false;

        loop {
            let raw = match stream.receive().await {
                Ok(raw) => raw,
                Err(Error::Closed) => break,
                Err(err) => {
                    errs.push(format!("receive: {err}"));
                    break;
                }
            };

            if !raw.is_response {
                errs.push("received response without RESPONSE flag".into());
            }

            if raw.close {
                if saw_close {
                    errs.push("received more than one message with CLOSE flag".into());
                }
                saw_close = true;
            }

            let mut errstr = String::new();

            if raw.is_error {
                errstr = match raw.parse() {
                    Ok(Message::Error(e)) => format!("received Error: {}", e.description),
                    Ok(_) => "reply with ERROR flag set which is not an Error object".into(),
                    Err(err) => {
                        format!("reply with ERROR flag set which could not be parsed: {err}")
                    }
                };
            } else if !raw.has_payload {
                if !raw.data.is_empty() {
                    errstr = "received reply without PAYLOAD flag, but with data".into();
                } else if !raw.close {
                    errstr = "received reply without data and no PAYLOAD, ERROR or CLOSE flag".into();
                }
                // No data and a CLOSE flag: that's fine.
            } else if resp.is_some() {
                // If a second payload message is valid, use request_stream instead.
                errstr = "unexpected second message with a PAYLOAD flag".into();
            } else {
                match raw.parse() {
                    Ok(msg) => resp = Some(msg),
                    Err(err) => errstr = err.to_string(),
                }
            }

            if !errstr.is_empty() {
                errs.push(errstr);
            }
        }

        // Makes sure we send a closing message.
        let _ = stream.close().await;

        if resp.is_none() {
            errs.push("got no response with PAYLOAD flag".into());
        }
        match resp {
            Some(msg) if errs.is_empty() => Ok(msg),
            _ => Err(Error::Protocol(errs.join("\n"))),
        }
    }

    /// Send a message and expect one or more replies in a stream.
    pub async fn request_stream(&self, msg: Message) -> Result<Stream, Error> {
        let data = message::pack(&msg);
        self.new_stream(RawMessage {
            data,
            ..Default::default()
        })
        .await
    }

    /// Sends a ping and waits for the matching pong.
    pub async fn ping(&self) -> Result<(), Error> {
        let id: u64 = rand::thread_rng().gen();
        let resp = self
            .request(Message::PingRequest(proto::PingRequest { id }))
            .await?;
        let pong = match resp {
            Message::PingResponse(pong) => pong,
            Message::SignedPingResponse(_) => match message::open_signed(&resp)? {
                Message::PingResponse(pong) => pong,
                _ => return Err(Error::Protocol("ping: wrong signed response type".into())),
            },
            _ => return Err(Error::Protocol("ping: wrong response type".into())),
        };
        if pong.id != id {
            return Err(Error::Protocol("ping: wrong response id".into()));
        }
        Ok(())
    }

    /// Requests version information on the running server's software.
    pub async fn version(&self) -> Result<proto::VersionResponse, Error> {
        match self
            .request(Message::VersionRequest(proto::VersionRequest {}))
            .await?
        {
            Message::VersionResponse(resp) => Ok(resp),
            _ => Err(Error::Protocol("version: wrong response type".into())),
        }
    }

    /// TLS peer certificates of the connection, if connected.
    pub async fn peer_certificates(&self) -> Vec<CertificateDer<'static>> {
        if self.ensure_connected().await.is_err() {
            return Vec::new();
        }
        self.inner.state.lock().await.peer_certificates.clone()
    }

    async fn ensure_connected(&self) -> Result<(), Error> {
        let mut state = self.inner.state.lock().await;
        let mut write = self.inner.write.lock().await;
        if write.is_some() {
            return Ok(());
        }
        connect_locked(&self.inner, &mut state, &mut write).await
    }

    /// Start a new stream by sending the given frame. On a send failure
    /// the reconnect protocol runs, once.
    async fn new_stream(&self, msg: RawMessage) -> Result<Stream, Error> {
        let inner = &self.inner;
        let (id, shared) = {
            let mut state = inner.state.lock().await;
            let id = state.next_stream_id;
            state.next_stream_id += 1;
            let shared = Arc::new(StreamShared::new(state.reader_running));
            state.streams.insert(id, shared.clone());
            (id, shared)
        };

        let mut first_try = true;
        loop {
            let err = match send_raw(inner, id, &msg).await {
                Ok(()) => break,
                Err(err) => err,
            };

            if !first_try {
                shared.close_local();
                inner.state.lock().await.streams.remove(&id);
                return Err(err);
            }
            first_try = false;

            // Silent reconnect: deregister this stream, tear down all
            // others (their frames cannot be trusted any more), then put
            // this stream back, join the old reader and redial.
            let mut state = inner.state.lock().await;
            let mut write = inner.write.lock().await;
            state.streams.remove(&id);
            let old_reader = close_streams(&mut state, &mut write);
            state.streams.insert(id, shared.clone());
            if let Some(reader) = old_reader {
                reader.abort();
                let _ = reader.await;
            }
            if let Err(err) = connect_locked(inner, &mut state, &mut write).await {
                drop(write);
                state.streams.remove(&id);
                shared.close_local();
                return Err(err);
            }
        }

        Ok(Stream {
            id,
            conn: inner.clone(),
            shared,
            close_flag_sent: false,
            responding: false,
        })
    }
}

/// Represents one stream over the TLS connection.
///
/// The stream holds a back-reference to its connection for sending; it
/// never owns the connection.
pub struct Stream {
    id: u32,
    conn: Arc<Inner>,
    shared: Arc<StreamShared>,

    // Whether a CLOSE flag was sent by close or send_last_data.
    close_flag_sent: bool,

    /// If set, the RESPONSE flag is included on every frame sent.
    pub responding: bool,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").field("id", &self.id).finish()
    }
}

impl Stream {
    /// The 28-bit stream id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Wait for a raw frame. Returns [`Error::Closed`] when the stream is
    /// closed and the inbox is drained.
    pub async fn receive(&mut self) -> Result<RawMessage, Error> {
        loop {
            let mut notified = std::pin::pin!(self.shared.incoming.notified());
            {
                let mut queue = self.shared.queue.lock().unwrap();
                if let Some(msg) = queue.buf.pop_front() {
                    return Ok(msg);
                }
                if queue.closed || !queue.reader_running {
                    return Err(Error::Closed);
                }
                // Register for wakeups while still holding the lock, so a
                // push between unlock and poll cannot be missed.
                notified.as_mut().enable();
            }
            notified.await;
        }
    }

    /// Receive a frame and parse it. A frame with the ERROR flag set is
    /// returned as [`Error::Message`] with the server's description.
    pub async fn receive_and_parse(&mut self) -> Result<Message, Error> {
        let raw = self.receive().await?;
        let msg = raw.parse()?;
        if raw.is_error {
            return match msg {
                Message::Error(err) => Err(Error::Message(err.description)),
                _ => Err(Error::Protocol(
                    "frame with ERROR flag does not carry an Error envelope".into(),
                )),
            };
        }
        Ok(msg)
    }

    /// Send a payload frame over the stream.
    pub async fn send_data(&mut self, data: Vec<u8>) -> Result<(), Error> {
        send_raw(
            &self.conn,
            self.id,
            &RawMessage {
                data,
                has_payload: true,
                is_response: self.responding,
                ..Default::default()
            },
        )
        .await
    }

    /// Send a payload frame with the CLOSE flag. Does not fully close the
    /// stream: call [`Stream::close`] afterwards to do so.
    pub async fn send_last_data(&mut self, data: Vec<u8>) -> Result<(), Error> {
        if self.close_flag_sent {
            return Err(Error::Protocol("close flag already sent".into()));
        }
        self.close_flag_sent = true;
        send_raw(
            &self.conn,
            self.id,
            &RawMessage {
                data,
                has_payload: true,
                is_response: self.responding,
                close: true,
                ..Default::default()
            },
        )
        .await
    }

    /// Close the stream, sending exactly one CLOSE frame over its
    /// lifetime. Idempotent.
    pub async fn close(&mut self) -> Result<(), Error> {
        let mut result = Ok(());
        if !self.close_flag_sent {
            self.close_flag_sent = true;
            result = send_raw(
                &self.conn,
                self.id,
                &RawMessage {
                    is_response: self.responding,
                    close: true,
                    ..Default::default()
                },
            )
            .await;
        }
        self.shared.close_local();
        self.conn.state.lock().await.streams.remove(&self.id);
        result
    }
}

/// Close the socket and all streams. Assumes both locks are held. Returns
/// the reader task handle for the caller to join or abort.
///
/// This also runs before an automatic reconnect, as no frame may be
/// trusted across a reconnect.
fn close_streams(state: &mut State, write: &mut Option<Socket>) -> Option<JoinHandle<()>> {
    *write = None;
    state.reader_running = false;
    for shared in state.streams.values() {
        shared.close_local();
    }
    state.streams.clear();
    state.reader.take()
}

/// Dial TLS and spawn a fresh reader task. Assumes both locks are held.
async fn connect_locked(
    inner: &Arc<Inner>,
    state: &mut State,
    write: &mut Option<Socket>,
) -> Result<(), Error> {
    let tcp = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(&inner.addr))
        .await
        .map_err(|_| Error::DeadlineExceeded)??;
    let tls = inner
        .connector
        .connect(inner.server_name.clone(), tcp)
        .await?;

    state.peer_certificates = tls
        .get_ref()
        .1
        .peer_certificates()
        .unwrap_or_default()
        .iter()
        .map(|cert| cert.clone().into_owned())
        .collect();

    let (read_half, write_half) = tokio::io::split(tls);
    *write = Some(write_half);

    // A receiver believing there is no reader while there is one is
    // harmless, hence no per-stream locking subtleties here.
    for shared in state.streams.values() {
        shared.set_reader_running(true);
    }
    state.reader_running = true;
    state.reader = Some(tokio::spawn(run_reader(inner.clone(), read_half)));
    Ok(())
}

/// Send a raw frame over the socket, under the write mutex.
async fn send_raw(inner: &Arc<Inner>, stream_id: u32, msg: &RawMessage) -> Result<(), Error> {
    let header = msg.header(stream_id).pack();
    let mut guard = inner.write.lock().await;
    let socket = guard.as_mut().ok_or_else(|| {
        Error::Transport(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "not connected (yet?)",
        ))
    })?;

    let write = async {
        socket.write_all(&header).await?;
        socket.write_all(&msg.data).await?;
        socket.flush().await
    };
    match inner.timeout {
        Some(deadline) => tokio::time::timeout(deadline, write)
            .await
            .map_err(|_| Error::DeadlineExceeded)??,
        None => write.await?,
    }
    Ok(())
}

/// The background reader: reads frames sequentially and dispatches them
/// to the stream inboxes until the socket fails or the connection closes.
async fn run_reader(inner: Arc<Inner>, mut socket: ReadHalf<TlsStream<TcpStream>>) {
    loop {
        let mut header_buf = [0u8; FRAME_HEADER_SIZE];
        if let Err(err) = socket.read_exact(&mut header_buf).await {
            if !inner.state.lock().await.closed {
                warn!(server = %inner.label, error = %err, "reader: header read failed");
            }
            break;
        }
        let header = FrameHeader::unpack(header_buf);

        let mut data = vec![0u8; header.size as usize];
        if let Err(err) = socket.read_exact(&mut data).await {
            if !inner.state.lock().await.closed {
                warn!(server = %inner.label, error = %err, "reader: payload read failed");
            }
            break;
        }

        if header.is_keep_alive() {
            continue;
        }

        let msg = RawMessage {
            data,
            is_error: header.is_error(),
            close: header.close(),
            has_payload: header.has_payload(),
            is_response: header.is_response(),
        };

        if header.is_request() {
            handle_incoming_request(&inner, header, msg);
            continue;
        }

        let shared = {
            let state = inner.state.lock().await;
            state.streams.get(&header.stream_id()).cloned()
        };
        let Some(shared) = shared else {
            if header.size == 0 && header.close() {
                // A close for a stream we probably already closed
                // ourselves; no need to worry about it.
                continue;
            }
            debug!(server = %inner.label, header = %header, "response for unknown (or closed) stream");
            continue;
        };

        let closes = msg.close;
        shared.push(msg);
        if closes {
            shared.close_local();
            inner.state.lock().await.streams.remove(&header.stream_id());
        }
    }

    // Reader is gone: wake every receiver so it observes EOF.
    let mut state = inner.state.lock().await;
    state.reader_running = false;
    for shared in state.streams.values() {
        shared.set_reader_running(false);
    }
}

/// The only server-initiated request the client answers is
/// `VersionRequest`; everything else is logged and dropped.
fn handle_incoming_request(inner: &Arc<Inner>, header: FrameHeader, msg: RawMessage) {
    let parsed = match msg.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            debug!(server = %inner.label, header = %header, "incoming raw packet of unknown type");
            return;
        }
    };

    if matches!(parsed, Message::VersionRequest(_)) && msg.has_payload {
        let data = message::pack(&Message::VersionResponse(
            message::current_version_response(),
        ));
        let inner = inner.clone();
        let stream_id = header.stream_id();
        tokio::spawn(async move {
            let reply = RawMessage {
                data,
                has_payload: true,
                is_response: true,
                close: true,
                ..Default::default()
            };
            if let Err(err) = send_raw(&inner, stream_id, &reply).await {
                debug!(server = %inner.label, error = %err, "failed to send VersionResponse");
            }
        });
        return;
    }

    debug!(
        server = %inner.label,
        name = parsed.name(),
        header = %header,
        "unexpected incoming request",
    );
}

fn load_root_store(root_ca: &RootCa) -> Result<RootCertStore, Error> {
    let mut roots = RootCertStore::empty();
    match root_ca {
        RootCa::Der(cert) => {
            roots.add(cert.clone())?;
        }
        RootCa::File(path) => {
            let pem = std::fs::read(path)?;
            add_pem_certs(&mut roots, &pem)?;
        }
        RootCa::Pem(pem) => {
            add_pem_certs(&mut roots, pem.as_bytes())?;
        }
    }
    if roots.is_empty() {
        return Err(Error::Config("found no certificate in root CA".into()));
    }
    Ok(roots)
}

fn add_pem_certs(roots: &mut RootCertStore, mut pem: &[u8]) -> Result<(), Error> {
    for cert in rustls_pemfile::certs(&mut pem) {
        roots.add(cert?)?;
    }
    Ok(())
}

fn tls_client_config(
    config: &Config,
    roots: RootCertStore,
) -> Result<(ClientConfig, ServerName<'static>), Error> {
    let host = config
        .addr
        .rsplit_once(':')
        .map(|(host, _port)| host)
        .ok_or_else(|| Error::Config(format!("address {} is not host:port", config.addr)))?;

    let server_name_of = |name: &str| {
        ServerName::try_from(name.to_string())
            .map_err(|err| Error::Config(format!("invalid server name {name}: {err}")))
    };

    match config.expected_server_cn.as_deref() {
        // Accept any common name signed by the CA: chain verification
        // runs, the name check is waived.
        Some("*") => {
            let inner = WebPkiServerVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|err| Error::Config(err.to_string()))?;
            let client_config = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AnyServerName { inner }))
                .with_no_client_auth();
            Ok((client_config, server_name_of(host)?))
        }
        cn => {
            let name = server_name_of(cn.unwrap_or(host))?;
            let client_config = ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();
            Ok((client_config, name))
        }
    }
}

/// Verifies the presented chain against the pinned CA for server
/// authentication but accepts any server name.
#[derive(Debug)]
struct AnyServerName {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for AnyServerName {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(verified) => Ok(verified),
            Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName)) => {
                Ok(ServerCertVerified::assertion())
            }
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            Err(err) => Err(err),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
