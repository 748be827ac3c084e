#![deny(unsafe_code)]
//! TLS client session over a byte stream
//!
//! This module provides `SecureSocket`, a TLS client built on `rustls` that
//! runs over any [`ByteStream`]. It owns the certificate material, the session
//! state and the socket it wraps.
//!
//! # I/O binding
//!
//! rustls exchanges records through `std::io::Read`/`Write`. Each pump call
//! borrows the socket through a short-lived `StreamIo` adapter, so no
//! long-lived reference to the socket is held by the session.
//!
//! # Blocking behavior
//!
//! The handshake runs in blocking mode bounded by
//! `SessionConfig::receive_timeout_ms`; afterwards the socket is switched to
//! non-blocking and `send`/`receive` report `Error::WouldBlock` when no
//! progress is possible.

use std::io::{self, Read, Write};
use std::sync::Arc;

use hal_abstractions::network::ByteStream;
use log::{debug, info, warn};
use rustls::client::ClientConnection;
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, IoState, RootCertStore};

use super::config::{SessionConfig, SocketConfig};
use super::error::{Error, HandshakeError, TransportError};
use super::socket::RawSocket;

/// Encrypted byte-stream contract consumed by the async adapter
pub trait SecureTransport {
    /// Load certificate material and build the session configuration
    ///
    /// `client_identity` is PEM holding the client certificate chain followed
    /// by its private key; `None` disables client authentication.
    fn setup(&mut self, client_identity: Option<&[u8]>, trusted_roots: &[u8])
        -> Result<(), Error>;

    /// Open the socket and run the handshake
    fn connect(&mut self, host: &str, port: u16) -> Result<(), Error>;

    /// Encrypt and write application bytes; returns how many were accepted
    fn send(&mut self, buf: &[u8]) -> Result<usize, Error>;

    /// Read decrypted application bytes
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error>;

    /// Close the session and the socket. Calling it again is a no-op.
    fn close(&mut self);

    /// Diagnostic code of the most recent error, `0` when none
    fn last_error(&self) -> i32;

    /// Close and drop the session configuration
    fn release(&mut self) {
        self.close();
    }
}

/// What a single `read_tls` pump produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inbound {
    Data,
    Idle,
    Eof,
}

/// Borrow of a `ByteStream` presented as `std::io::Read + Write`
///
/// Socket idleness surfaces as `WouldBlock` and peer close as EOF. Any other
/// socket error is kept in `fault` so it can be reported with its original
/// kind once rustls hands the `io::Error` back.
struct StreamIo<'a, T: ByteStream> {
    stream: &'a mut T,
    fault: Option<TransportError>,
}

impl<'a, T: ByteStream> StreamIo<'a, T> {
    fn new(stream: &'a mut T) -> Self {
        Self {
            stream,
            fault: None,
        }
    }

    fn fail(&mut self, err: TransportError) -> io::Error {
        self.fault = Some(err);
        io::Error::new(io_kind(err), err)
    }

    fn error(&self, err: &io::Error) -> Error {
        match self.fault {
            Some(fault) => fault.into(),
            None => {
                warn!("TLS record I/O failed: {}", err);
                TransportError::Io.into()
            }
        }
    }
}

impl<T: ByteStream> Read for StreamIo<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.receive(buf) {
            Ok(0) => Err(io::ErrorKind::WouldBlock.into()),
            Ok(n) => Ok(n),
            Err(TransportError::Closed) => Ok(0),
            Err(e) => Err(self.fail(e)),
        }
    }
}

impl<T: ByteStream> Write for StreamIo<'_, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stream.send(buf) {
            Ok(0) if !buf.is_empty() => Err(io::ErrorKind::WouldBlock.into()),
            Ok(n) => Ok(n),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn io_kind(err: TransportError) -> io::ErrorKind {
    match embedded_io::Error::kind(&err) {
        embedded_io::ErrorKind::ConnectionRefused => io::ErrorKind::ConnectionRefused,
        embedded_io::ErrorKind::TimedOut => io::ErrorKind::TimedOut,
        embedded_io::ErrorKind::NotConnected => io::ErrorKind::NotConnected,
        embedded_io::ErrorKind::BrokenPipe => io::ErrorKind::BrokenPipe,
        _ => io::ErrorKind::Other,
    }
}

/// Write pending TLS records to the socket
///
/// Returns `Error::WouldBlock` if records remain queued because the socket
/// stopped accepting bytes.
fn flush_tls<T: ByteStream>(session: &mut ClientConnection, socket: &mut T) -> Result<(), Error> {
    let mut io = StreamIo::new(socket);
    while session.wants_write() {
        match session.write_tls(&mut io) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(Error::WouldBlock),
            Err(e) => return Err(io.error(&e)),
        }
    }
    Ok(())
}

/// Pull one batch of TLS records from the socket into the session
fn read_tls<T: ByteStream>(
    session: &mut ClientConnection,
    socket: &mut T,
) -> Result<Inbound, Error> {
    let mut io = StreamIo::new(socket);
    match session.read_tls(&mut io) {
        Ok(0) => Ok(Inbound::Eof),
        Ok(_) => Ok(Inbound::Data),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Inbound::Idle),
        Err(e) => Err(io.error(&e)),
    }
}

/// Process received records; on failure the alert rustls queued is flushed
fn process<T: ByteStream>(
    session: &mut ClientConnection,
    socket: &mut T,
) -> Result<IoState, Error> {
    match session.process_new_packets() {
        Ok(state) => Ok(state),
        Err(err) => {
            warn!("TLS protocol error: {}", err);
            let handshaking = session.is_handshaking();
            let _ = flush_tls(session, socket);
            Err(classify(&err, handshaking))
        }
    }
}

fn classify(err: &rustls::Error, handshaking: bool) -> Error {
    match err {
        rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented => {
            HandshakeError::CertificateRejected.into()
        }
        rustls::Error::AlertReceived(_) => HandshakeError::AlertReceived.into(),
        _ if handshaking => HandshakeError::Rejected.into(),
        _ => TransportError::Io.into(),
    }
}

/// Drive the handshake until it completes or would block
///
/// Returns `true` once complete, `false` while it is still in progress.
fn handshake<T: ByteStream>(session: &mut ClientConnection, socket: &mut T) -> Result<bool, Error> {
    loop {
        match flush_tls(session, socket) {
            Ok(()) => {}
            Err(Error::WouldBlock) => return Ok(false),
            Err(e) => return Err(e),
        }

        if !session.is_handshaking() {
            return Ok(true);
        }

        match read_tls(session, socket)? {
            Inbound::Data => {
                process(session, socket)?;
            }
            Inbound::Idle => return Ok(false),
            Inbound::Eof => {
                warn!("Server closed the connection during the handshake");
                return Err(HandshakeError::Rejected.into());
            }
        }
    }
}

/// Crypto provider restricted to the configured cipher suite allow-list
fn restricted_provider(session_config: &SessionConfig) -> CryptoProvider {
    let base = ring::default_provider();
    let cipher_suites = base
        .cipher_suites
        .iter()
        .copied()
        .filter(|suite| session_config.cipher_suites.contains(&suite.suite()))
        .collect();
    CryptoProvider {
        cipher_suites,
        ..base
    }
}

fn load_roots(pem: &[u8]) -> Result<RootCertStore, HandshakeError> {
    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_slice_iter(pem) {
        let cert = cert.map_err(|e| {
            warn!("Trusted root PEM invalid: {}", e);
            HandshakeError::RootCertificate
        })?;
        roots.add(cert).map_err(|e| {
            warn!("Trusted root rejected: {}", e);
            HandshakeError::RootCertificate
        })?;
    }

    if roots.is_empty() {
        warn!("No trusted root certificates supplied");
        return Err(HandshakeError::NoTrustedRoots);
    }
    debug!("Loaded {} trusted root(s)", roots.len());
    Ok(roots)
}

type ClientIdentity = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

fn load_identity(pem: &[u8]) -> Result<ClientIdentity, HandshakeError> {
    let chain = CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            warn!("Client certificate PEM invalid: {}", e);
            HandshakeError::ClientCertificate
        })?;
    if chain.is_empty() {
        warn!("Client certificate PEM holds no certificate");
        return Err(HandshakeError::ClientCertificate);
    }

    let key = PrivateKeyDer::from_pem_slice(pem).map_err(|e| {
        warn!("Client private key invalid: {}", e);
        HandshakeError::PrivateKey
    })?;
    Ok((chain, key))
}

/// TLS client session over a byte stream
///
/// # Example
///
/// ```no_run
/// use iot_transport::network::{SecureSocket, SessionConfig, SocketConfig};
///
/// static ROOTS: &[u8] = b"-----BEGIN CERTIFICATE-----\n...";
///
/// let mut tls = SecureSocket::new(SocketConfig::default(), SessionConfig::default());
/// tls.setup(None, ROOTS).unwrap();
/// tls.connect("broker.example.com", 8883).unwrap();
/// tls.send(b"hello").unwrap();
/// ```
pub struct SecureSocket<T: ByteStream = RawSocket> {
    socket: T,
    session_config: SessionConfig,
    tls_config: Option<Arc<ClientConfig>>,
    session: Option<ClientConnection>,
    last_error: Option<Error>,
}

impl SecureSocket<RawSocket> {
    /// Create an unconfigured session over a new TCP socket
    pub fn new(socket_config: SocketConfig, session_config: SessionConfig) -> Self {
        Self::with_socket(RawSocket::new(socket_config), session_config)
    }
}

impl<T: ByteStream> SecureSocket<T> {
    /// Create an unconfigured session over `socket`
    pub fn with_socket(socket: T, session_config: SessionConfig) -> Self {
        Self {
            socket,
            session_config,
            tls_config: None,
            session: None,
            last_error: None,
        }
    }

    /// Build the client configuration from PEM certificate material
    ///
    /// Replaces any earlier configuration. Takes effect on the next
    /// `connect`.
    ///
    /// # Errors
    ///
    /// - `RandomSource` if the crypto provider cannot produce random bytes
    /// - `RootCertificate` / `NoTrustedRoots` for unusable trusted roots
    /// - `ClientCertificate` / `PrivateKey` for an unusable client identity
    /// - `Configuration` if the version/suite combination or the credentials
    ///   are rejected
    pub fn setup(
        &mut self,
        client_identity: Option<&[u8]>,
        trusted_roots: &[u8],
    ) -> Result<(), Error> {
        self.tls_config = None;
        let result = self.build_config(client_identity, trusted_roots);
        match result {
            Ok(config) => {
                self.tls_config = Some(Arc::new(config));
                info!("TLS configuration ready");
                Ok(())
            }
            Err(err) => self.record(Err(err.into())),
        }
    }

    fn build_config(
        &self,
        client_identity: Option<&[u8]>,
        trusted_roots: &[u8],
    ) -> Result<ClientConfig, HandshakeError> {
        let provider = restricted_provider(&self.session_config);

        let mut seed = [0u8; 32];
        provider.secure_random.fill(&mut seed).map_err(|_| {
            warn!("Random source unavailable");
            HandshakeError::RandomSource
        })?;

        let roots = load_roots(trusted_roots)?;
        let identity = client_identity.map(load_identity).transpose()?;

        let versions = self.session_config.min_version.protocol_versions();
        let builder = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(&versions)
            .map_err(|e| {
                warn!("Protocol versions rejected: {}", e);
                HandshakeError::Configuration
            })?
            .with_root_certificates(roots);

        match identity {
            Some((chain, key)) => {
                debug!("Client authentication enabled ({} cert(s))", chain.len());
                builder.with_client_auth_cert(chain, key).map_err(|e| {
                    warn!("Client credentials rejected: {}", e);
                    HandshakeError::Configuration
                })
            }
            None => Ok(builder.with_no_client_auth()),
        }
    }

    /// Connect to `host:port` and run the handshake
    ///
    /// The host name is used for both SNI and certificate validation. A
    /// handshake that cannot finish without waiting past the receive timeout
    /// is left in progress and completes during later `send`/`receive` calls.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), Error> {
        let result = self.open_session(host, port);
        self.record(result)
    }

    fn open_session(&mut self, host: &str, port: u16) -> Result<(), Error> {
        let config = self.tls_config.clone().ok_or_else(|| {
            warn!("Connect attempted before TLS setup");
            HandshakeError::NotSetUp
        })?;
        let server_name = ServerName::try_from(host.to_owned()).map_err(|_| {
            warn!("Invalid server name: {:?}", host);
            HandshakeError::ServerName
        })?;

        self.close();
        self.socket
            .set_blocking(true, self.session_config.receive_timeout_ms)?;
        self.socket.connect(host, port)?;

        info!("Starting TLS handshake with {}:{}", host, port);
        match self.start_session(config, server_name) {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err(err) => {
                warn!("TLS handshake failed: {}", err);
                self.socket.close();
                Err(err)
            }
        }
    }

    /// Create the session on the connected socket and run the handshake
    fn start_session(
        &mut self,
        config: Arc<ClientConfig>,
        server_name: ServerName<'static>,
    ) -> Result<ClientConnection, Error> {
        let mut session = ClientConnection::new(config, server_name).map_err(|e| {
            warn!("TLS session creation failed: {}", e);
            HandshakeError::Configuration
        })?;

        let complete = handshake(&mut session, &mut self.socket)?;
        self.socket.set_blocking(false, 0)?;

        if complete {
            info!("TLS handshake completed");
        } else {
            debug!("TLS handshake still in progress");
        }
        Ok(session)
    }

    /// Whether a session exists and the socket is still connected
    pub fn is_connected(&self) -> bool {
        self.session.is_some() && self.socket.is_connected()
    }

    /// Whether the handshake is still running
    pub fn is_handshaking(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.is_handshaking())
    }

    /// Encrypt `buf` and push as much of the result as the socket accepts
    ///
    /// Returns the number of plaintext bytes taken. `Error::WouldBlock` means
    /// nothing was taken because earlier records are still waiting for the
    /// socket.
    pub fn send(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let result = self.write_plaintext(buf);
        self.record(result)
    }

    fn write_plaintext(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let session = self.session.as_mut().ok_or(TransportError::NotConnected)?;
        if buf.is_empty() {
            return Ok(0);
        }

        flush_tls(session, &mut self.socket)?;

        let accepted = session.writer().write(buf).map_err(|e| {
            warn!("TLS write failed: {}", e);
            Error::from(TransportError::Io)
        })?;

        match flush_tls(session, &mut self.socket) {
            Ok(()) | Err(Error::WouldBlock) => {}
            Err(e) => return Err(e),
        }

        match accepted {
            0 => Err(Error::WouldBlock),
            n => Ok(n),
        }
    }

    /// Read decrypted bytes into `buf`
    ///
    /// `Error::WouldBlock` means nothing is available yet;
    /// `Error::Transport(TransportError::Closed)` means the server ended the
    /// session (close_notify or EOF).
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let result = self.read_plaintext(buf);
        self.record(result)
    }

    fn read_plaintext(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let session = self.session.as_mut().ok_or(TransportError::NotConnected)?;
        if buf.is_empty() {
            return Ok(0);
        }

        match flush_tls(session, &mut self.socket) {
            Ok(()) | Err(Error::WouldBlock) => {}
            Err(e) => return Err(e),
        }

        let mut eof = false;
        if session.wants_read() {
            eof = read_tls(session, &mut self.socket)? == Inbound::Eof;
            process(session, &mut self.socket)?;
            // Handshake completion and key updates produce records of their own
            match flush_tls(session, &mut self.socket) {
                Ok(()) | Err(Error::WouldBlock) => {}
                Err(e) => return Err(e),
            }
        }

        match session.reader().read(buf) {
            Ok(0) => {
                info!("TLS session closed by server");
                Err(TransportError::Closed.into())
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if eof {
                    Err(TransportError::Closed.into())
                } else {
                    Err(Error::WouldBlock)
                }
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                info!("Server closed the connection without close_notify");
                Err(TransportError::Closed.into())
            }
            Err(e) => {
                warn!("TLS read failed: {}", e);
                Err(TransportError::Io.into())
            }
        }
    }

    /// Receive repeatedly while the session holds decrypted bytes
    ///
    /// Stops when `buf` is full, nothing more is buffered, or a call fails.
    /// An error is only returned when nothing was read.
    pub fn receive_all(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut total = 0;
        while total < buf.len() {
            match self.receive(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if total == 0 => return Err(e),
                Err(_) => break,
            }
            match self.buffered_plaintext() {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    self.last_error = Some(err);
                    break;
                }
            }
        }
        Ok(total)
    }

    fn buffered_plaintext(&mut self) -> Result<usize, Error> {
        match self.session.as_mut() {
            Some(session) => Ok(process(session, &mut self.socket)?.plaintext_bytes_to_read()),
            None => Ok(0),
        }
    }

    /// Send close_notify when connected and release the session and socket
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if self.socket.is_connected() {
                session.send_close_notify();
                if let Err(e) = flush_tls(&mut session, &mut self.socket) {
                    debug!("close_notify not delivered: {}", e);
                }
            }
            info!("TLS session closed");
        }
        self.socket.close();
    }

    /// Close and forget the certificate configuration
    pub fn release(&mut self) {
        self.close();
        self.tls_config = None;
    }

    /// Diagnostic code of the most recently recorded error (`0` = none)
    ///
    /// The error is logged as well.
    pub fn last_error(&self) -> i32 {
        match self.last_error {
            Some(err) => {
                warn!("Last TLS error: {} (code {:#x})", err, err.code());
                err.code()
            }
            None => 0,
        }
    }

    /// Typed form of [`last_error`](Self::last_error)
    pub fn last_error_detail(&self) -> Option<Error> {
        self.last_error
    }

    fn record<R>(&mut self, result: Result<R, Error>) -> Result<R, Error> {
        if let Err(err) = &result {
            if *err != Error::WouldBlock {
                self.last_error = Some(*err);
            }
        }
        result
    }
}

impl<T: ByteStream> SecureTransport for SecureSocket<T> {
    fn setup(
        &mut self,
        client_identity: Option<&[u8]>,
        trusted_roots: &[u8],
    ) -> Result<(), Error> {
        SecureSocket::setup(self, client_identity, trusted_roots)
    }

    fn connect(&mut self, host: &str, port: u16) -> Result<(), Error> {
        SecureSocket::connect(self, host, port)
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize, Error> {
        SecureSocket::send(self, buf)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        SecureSocket::receive(self, buf)
    }

    fn close(&mut self) {
        SecureSocket::close(self)
    }

    fn last_error(&self) -> i32 {
        SecureSocket::last_error(self)
    }

    fn release(&mut self) {
        SecureSocket::release(self)
    }
}

impl<T: ByteStream> Drop for SecureSocket<T> {
    fn drop(&mut self) {
        self.close();
    }
}
