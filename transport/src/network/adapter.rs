#![deny(unsafe_code)]
//! Callback-driven, poll-based transport adapter
//!
//! `AsyncIoAdapter` is the face the messaging client sees. It owns a
//! [`SecureTransport`], an outbound queue and a three-state machine:
//!
//! ```text
//! Closed --open ok--> Open --fault--> Error
//!    ^                  |               |
//!    +------close-------+-------close---+
//! ```
//!
//! All progress happens in [`AsyncIoAdapter::dowork`], which the control loop
//! calls repeatedly. Each call first forwards whatever bytes are readable, then
//! pushes the unsent remainder of the queue head. Results reach the client
//! through its [`IoEvents`] implementation.
//!
//! # Delivery guarantees
//!
//! - Send completions fire in enqueue order, exactly once per accepted message.
//! - A message is dequeued before its completion callback runs.
//! - `on_error` fires once, on the first transition into `Error`.
//! - Messages still queued at `close` or drop complete with
//!   `SendResult::Cancelled`.
//!
//! Callbacks run while the adapter is mutably borrowed; a client that wants to
//! react by sending does so on its next loop iteration.

use log::{debug, error, info, warn};

use super::config::{
    AdapterConfig, HOSTNAME_MAX_LEN, MESSAGE_CAPACITY, QUEUE_DEPTH, RECEIVE_CHUNK,
};
use super::error::{Error, HandshakeError, QueueError};
use super::options::{OptionSet, OPTION_CLIENT_CERTIFICATE};
use super::queue::OutboundQueue;
use super::tls::{SecureSocket, SecureTransport};

/// Outcome delivered with each send completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Every byte was accepted by the TLS session
    Ok,
    /// The transport failed while sending this message
    Error,
    /// The adapter was closed or dropped before the message went out
    Cancelled,
}

/// Adapter connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; `open` is allowed
    Closed,
    /// Connected; sends and receives flow through `dowork`
    Open,
    /// Unrecoverable fault; only `close` or drop leave this state
    Error,
}

/// Client callbacks
///
/// Never invoked concurrently. Each message passed to
/// [`AsyncIoAdapter::send_async`] carries a `SendContext` that comes back
/// through `on_send_complete`.
pub trait IoEvents {
    type SendContext;

    /// Result of `open`, delivered before `open` returns
    fn on_open_complete(&mut self, result: Result<(), Error>);

    /// Decrypted bytes read during `dowork`; never empty
    fn on_bytes_received(&mut self, bytes: &[u8]);

    fn on_send_complete(&mut self, context: Self::SendContext, result: SendResult);

    /// The adapter entered the `Error` state
    fn on_error(&mut self);
}

/// Async I/O adapter over a TLS session
///
/// `DEPTH` bounds the number of queued messages and `CAPACITY` the size of a
/// single message.
///
/// # Example
///
/// ```no_run
/// use iot_transport::network::{AdapterConfig, AsyncIoAdapter, Error, IoEvents, SendResult};
///
/// struct Client;
///
/// impl IoEvents for Client {
///     type SendContext = u16;
///     fn on_open_complete(&mut self, _result: Result<(), Error>) {}
///     fn on_bytes_received(&mut self, _bytes: &[u8]) {}
///     fn on_send_complete(&mut self, _packet_id: u16, _result: SendResult) {}
///     fn on_error(&mut self) {}
/// }
///
/// let config = AdapterConfig {
///     hostname: "broker.example.com",
///     trusted_roots: b"-----BEGIN CERTIFICATE-----\n...",
///     ..AdapterConfig::default()
/// };
/// let mut adapter: AsyncIoAdapter<Client> = AsyncIoAdapter::create(config).unwrap();
/// adapter.open(Client).unwrap();
/// adapter.send_async(b"\x10\x00", 1).unwrap();
/// loop {
///     adapter.dowork();
/// }
/// ```
pub struct AsyncIoAdapter<
    E,
    S = SecureSocket,
    const DEPTH: usize = QUEUE_DEPTH,
    const CAPACITY: usize = MESSAGE_CAPACITY,
> where
    E: IoEvents,
    S: SecureTransport,
{
    config: AdapterConfig,
    secure: S,
    queue: OutboundQueue<E::SendContext, DEPTH, CAPACITY>,
    events: Option<E>,
    options: OptionSet,
    state: ConnectionState,
    fault: Option<Error>,
}

impl<E, const DEPTH: usize, const CAPACITY: usize> AsyncIoAdapter<E, SecureSocket, DEPTH, CAPACITY>
where
    E: IoEvents,
{
    /// Create a closed adapter owning a fresh TLS socket
    ///
    /// # Errors
    ///
    /// `HandshakeError::ServerName` if the host name is empty or longer than
    /// 253 bytes.
    pub fn create(config: AdapterConfig) -> Result<Self, Error> {
        let secure = SecureSocket::new(config.socket.clone(), config.session.clone());
        Self::from_parts(config, secure)
    }
}

impl<E, S, const DEPTH: usize, const CAPACITY: usize> AsyncIoAdapter<E, S, DEPTH, CAPACITY>
where
    E: IoEvents,
    S: SecureTransport,
{
    pub(crate) fn from_parts(config: AdapterConfig, secure: S) -> Result<Self, Error> {
        if config.hostname.is_empty() || config.hostname.len() > HOSTNAME_MAX_LEN {
            warn!("Rejected host name of {} bytes", config.hostname.len());
            return Err(HandshakeError::ServerName.into());
        }

        debug!(
            "Adapter created for {}:{} (queue {} x {} bytes)",
            config.hostname, config.port, DEPTH, CAPACITY
        );
        Ok(Self {
            config,
            secure,
            queue: OutboundQueue::new(),
            events: None,
            options: OptionSet::default(),
            state: ConnectionState::Closed,
            fault: None,
        })
    }

    /// Set up TLS and connect, reporting the result through `events`
    ///
    /// Runs synchronously: `on_open_complete` has been called exactly once by
    /// the time this returns. On failure the adapter stays `Closed`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` if the adapter is not `Closed`; `events` is then
    /// dropped without being called and the registered callbacks are kept.
    /// Otherwise the setup or connect failure.
    pub fn open(&mut self, events: E) -> Result<(), Error> {
        if self.state != ConnectionState::Closed {
            warn!("Open rejected: adapter is {:?}", self.state);
            return Err(Error::InvalidState);
        }

        self.events = Some(events);
        self.fault = None;

        info!(
            "Opening secure connection to {}:{}",
            self.config.hostname, self.config.port
        );
        let result = self.establish();
        match result {
            Ok(()) => {
                self.state = ConnectionState::Open;
                info!("Adapter open");
            }
            Err(err) => {
                warn!("Open failed: {}", err);
                self.fault = Some(err);
                self.secure.close();
            }
        }

        if let Some(events) = self.events.as_mut() {
            events.on_open_complete(result);
        }
        result
    }

    fn establish(&mut self) -> Result<(), Error> {
        self.secure.setup(
            self.options.client_certificate(),
            self.config.trusted_roots,
        )?;
        self.secure.connect(self.config.hostname, self.config.port)
    }

    /// Close the transport and cancel queued messages
    ///
    /// Allowed from `Open` and `Error`. `on_close_complete` runs once the
    /// adapter is `Closed`.
    pub fn close<F: FnOnce()>(&mut self, on_close_complete: F) -> Result<(), Error> {
        if self.state == ConnectionState::Closed {
            warn!("Close rejected: adapter already closed");
            return Err(Error::InvalidState);
        }

        self.secure.close();
        self.cancel_pending();
        self.state = ConnectionState::Closed;
        info!("Adapter closed");

        on_close_complete();
        Ok(())
    }

    /// Queue a copy of `buffer` and try to send it right away
    ///
    /// The result reports only whether the message was queued; its delivery
    /// is reported through `on_send_complete`. A rejected message is never
    /// called back.
    ///
    /// # Errors
    ///
    /// - `QueueError::EmptyMessage` for an empty buffer
    /// - `Error::InvalidState` unless `Open` with callbacks registered
    /// - `QueueError::MessageTooLarge` / `QueueError::Full` from the queue
    pub fn send_async(&mut self, buffer: &[u8], context: E::SendContext) -> Result<(), Error> {
        if buffer.is_empty() {
            return Err(QueueError::EmptyMessage.into());
        }
        if self.state != ConnectionState::Open || self.events.is_none() {
            warn!("Send rejected: adapter is {:?}", self.state);
            return Err(Error::InvalidState);
        }

        self.queue.push(buffer, context).map_err(|e| {
            warn!("Send rejected: {}", e);
            Error::from(e)
        })?;
        debug!(
            "Queued {} bytes ({} message(s) pending)",
            buffer.len(),
            self.queue.len()
        );

        self.send_step();
        Ok(())
    }

    /// Make progress: forward readable bytes, then push the queue head
    ///
    /// Does nothing unless the adapter is `Open`.
    pub fn dowork(&mut self) {
        if self.state != ConnectionState::Open {
            return;
        }

        self.receive_step();
        if self.state == ConnectionState::Open {
            self.send_step();
        }
    }

    fn receive_step(&mut self) {
        let mut chunk = [0u8; RECEIVE_CHUNK];
        loop {
            match self.secure.receive(&mut chunk) {
                Ok(0) | Err(Error::WouldBlock) => break,
                Ok(n) => {
                    if let Some(events) = self.events.as_mut() {
                        events.on_bytes_received(&chunk[..n]);
                    }
                }
                Err(err) => {
                    if err.is_remote_close() {
                        info!("Connection closed by server");
                    }
                    self.enter_error(err);
                    break;
                }
            }
        }
    }

    fn send_step(&mut self) {
        let Some(head) = self.queue.front_mut() else {
            return;
        };

        match self.secure.send(head.unsent()) {
            Ok(n) => {
                let remaining = head.advance(n);
                if remaining > 0 {
                    debug!("Partial write: {} bytes sent, {} remaining", n, remaining);
                    return;
                }
                if let Some(message) = self.queue.pop_front() {
                    debug!("Message of {} bytes sent", message.len());
                    if let Some(events) = self.events.as_mut() {
                        events.on_send_complete(message.into_context(), SendResult::Ok);
                    }
                }
            }
            Err(Error::WouldBlock) => {}
            Err(err) => {
                warn!("Send failed: {}", err);
                if let Some(message) = self.queue.pop_front() {
                    if let Some(events) = self.events.as_mut() {
                        events.on_send_complete(message.into_context(), SendResult::Error);
                    }
                }
                self.enter_error(err);
            }
        }
    }

    fn enter_error(&mut self, err: Error) {
        if self.state == ConnectionState::Error {
            return;
        }

        error!(
            "Transport fault: {} (TLS code {:#x})",
            err,
            self.secure.last_error()
        );
        self.state = ConnectionState::Error;
        self.fault = Some(err);
        if let Some(events) = self.events.as_mut() {
            events.on_error();
        }
    }

    fn cancel_pending(&mut self) {
        if !self.queue.is_empty() {
            debug!("Cancelling {} queued message(s)", self.queue.len());
        }
        while let Some(message) = self.queue.pop_front() {
            if let Some(events) = self.events.as_mut() {
                events.on_send_complete(message.into_context(), SendResult::Cancelled);
            }
        }
    }

    /// Store a named option
    ///
    /// `x509certificate` takes client-certificate PEM (chain followed by the
    /// private key) and is applied on the next `open`. Unrecognized names are
    /// accepted and ignored.
    pub fn set_option(&mut self, name: &str, value: &[u8]) -> Result<(), Error> {
        if name != OPTION_CLIENT_CERTIFICATE {
            debug!("Ignoring unrecognized option {:?}", name);
            return Ok(());
        }
        if value.is_empty() {
            warn!("Empty value for option {}", name);
            return Err(HandshakeError::ClientCertificate.into());
        }

        self.options.set_client_certificate(value);
        debug!("Client certificate option set ({} bytes)", value.len());
        Ok(())
    }

    /// Snapshot of the stored options
    pub fn retrieve_options(&self) -> OptionSet {
        self.options.clone()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of queued messages, including a partially sent head
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Unsent bytes of the queue head
    pub fn head_remaining(&self) -> usize {
        self.queue.head_remaining()
    }

    /// Fault that caused the last failed open or the `Error` state
    pub fn last_error(&self) -> Option<Error> {
        self.fault
    }

    /// Diagnostic code recorded by the TLS layer (`0` = none)
    pub fn diagnostic_code(&self) -> i32 {
        self.secure.last_error()
    }

    /// Registered callbacks
    pub fn events(&self) -> Option<&E> {
        self.events.as_ref()
    }

    /// Tear the adapter down; equivalent to dropping it
    pub fn destroy(self) {
        debug!("Adapter destroyed");
    }
}

impl<E, S, const DEPTH: usize, const CAPACITY: usize> Drop for AsyncIoAdapter<E, S, DEPTH, CAPACITY>
where
    E: IoEvents,
    S: SecureTransport,
{
    fn drop(&mut self) {
        if self.state != ConnectionState::Closed {
            self.secure.close();
            self.state = ConnectionState::Closed;
        }
        self.cancel_pending();
        self.secure.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::error::TransportError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct Script {
        setup_result: Option<Error>,
        connect_result: Option<Error>,
        sends: VecDeque<Result<usize, Error>>,
        receives: VecDeque<Result<Vec<u8>, Error>>,
        setups: Vec<Option<Vec<u8>>>,
        written: Vec<u8>,
        connected: bool,
        closes: usize,
        releases: usize,
        error_code: i32,
    }

    /// Transport that plays back scripted results; unscripted sends accept
    /// everything and unscripted receives would block
    struct ScriptedTransport(Rc<RefCell<Script>>);

    impl SecureTransport for ScriptedTransport {
        fn setup(
            &mut self,
            client_identity: Option<&[u8]>,
            _trusted_roots: &[u8],
        ) -> Result<(), Error> {
            let mut script = self.0.borrow_mut();
            script.setups.push(client_identity.map(<[u8]>::to_vec));
            script.setup_result.map_or(Ok(()), Err)
        }

        fn connect(&mut self, _host: &str, _port: u16) -> Result<(), Error> {
            let mut script = self.0.borrow_mut();
            match script.connect_result {
                Some(err) => Err(err),
                None => {
                    script.connected = true;
                    Ok(())
                }
            }
        }

        fn send(&mut self, buf: &[u8]) -> Result<usize, Error> {
            let mut script = self.0.borrow_mut();
            let n = match script.sends.pop_front() {
                Some(Ok(n)) => n.min(buf.len()),
                Some(Err(err)) => return Err(err),
                None => buf.len(),
            };
            script.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
            let mut script = self.0.borrow_mut();
            match script.receives.pop_front() {
                Some(Ok(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        script.receives.push_front(Ok(bytes.split_off(n)));
                    }
                    Ok(n)
                }
                Some(Err(err)) => Err(err),
                None => Err(Error::WouldBlock),
            }
        }

        fn close(&mut self) {
            let mut script = self.0.borrow_mut();
            script.connected = false;
            script.closes += 1;
        }

        fn last_error(&self) -> i32 {
            self.0.borrow().error_code
        }

        fn release(&mut self) {
            self.close();
            self.0.borrow_mut().releases += 1;
        }
    }

    #[derive(Debug, Default)]
    struct Log {
        opened: Vec<Result<(), Error>>,
        received: Vec<Vec<u8>>,
        completed: Vec<(u32, SendResult)>,
        errors: usize,
    }

    struct Recorder(Rc<RefCell<Log>>);

    impl IoEvents for Recorder {
        type SendContext = u32;

        fn on_open_complete(&mut self, result: Result<(), Error>) {
            self.0.borrow_mut().opened.push(result);
        }

        fn on_bytes_received(&mut self, bytes: &[u8]) {
            self.0.borrow_mut().received.push(bytes.to_vec());
        }

        fn on_send_complete(&mut self, context: u32, result: SendResult) {
            self.0.borrow_mut().completed.push((context, result));
        }

        fn on_error(&mut self) {
            self.0.borrow_mut().errors += 1;
        }
    }

    type TestAdapter = AsyncIoAdapter<Recorder, ScriptedTransport, 4, 16>;

    fn config() -> AdapterConfig {
        AdapterConfig {
            hostname: "broker.test",
            ..AdapterConfig::default()
        }
    }

    fn closed_adapter() -> (TestAdapter, Rc<RefCell<Script>>, Rc<RefCell<Log>>) {
        let script = Rc::new(RefCell::new(Script::default()));
        let adapter = TestAdapter::from_parts(config(), ScriptedTransport(script.clone())).unwrap();
        (adapter, script, Rc::default())
    }

    fn open_adapter() -> (TestAdapter, Rc<RefCell<Script>>, Rc<RefCell<Log>>) {
        let (mut adapter, script, log) = closed_adapter();
        adapter.open(Recorder(log.clone())).unwrap();
        (adapter, script, log)
    }

    fn block_sends(script: &Rc<RefCell<Script>>, count: usize) {
        let mut script = script.borrow_mut();
        for _ in 0..count {
            script.sends.push_back(Err(Error::WouldBlock));
        }
    }

    #[test]
    fn test_completions_follow_enqueue_order() {
        let (mut adapter, script, log) = open_adapter();
        block_sends(&script, 3);

        adapter.send_async(b"first", 1).unwrap();
        adapter.send_async(b"second", 2).unwrap();
        adapter.send_async(b"third", 3).unwrap();
        assert_eq!(adapter.queued(), 3);
        assert!(log.borrow().completed.is_empty());

        for _ in 0..3 {
            adapter.dowork();
        }

        assert_eq!(
            log.borrow().completed,
            [(1, SendResult::Ok), (2, SendResult::Ok), (3, SendResult::Ok)]
        );
        assert_eq!(adapter.queued(), 0);
        assert_eq!(script.borrow().written, b"firstsecondthird");
    }

    #[test]
    fn test_rejected_sends_never_call_back() {
        let (mut adapter, _script, log) = closed_adapter();
        assert_eq!(adapter.send_async(b"early", 1), Err(Error::InvalidState));

        adapter.open(Recorder(log.clone())).unwrap();
        assert_eq!(
            adapter.send_async(b"", 2),
            Err(Error::Queue(QueueError::EmptyMessage))
        );

        assert_eq!(adapter.queued(), 0);
        assert!(log.borrow().completed.is_empty());
    }

    #[test]
    fn test_partial_write_completes_once() {
        let (mut adapter, script, log) = open_adapter();
        script.borrow_mut().sends.extend([Err(Error::WouldBlock), Ok(4), Ok(6)]);

        adapter.send_async(b"0123456789", 7).unwrap();
        assert_eq!(adapter.head_remaining(), 10);

        adapter.dowork();
        assert_eq!(adapter.head_remaining(), 6);
        assert_eq!(adapter.queued(), 1);
        assert!(log.borrow().completed.is_empty());

        adapter.dowork();
        assert_eq!(log.borrow().completed, [(7, SendResult::Ok)]);
        assert_eq!(adapter.queued(), 0);
        assert_eq!(script.borrow().written, b"0123456789");
    }

    #[test]
    fn test_hard_write_failure_enters_error_once() {
        let (mut adapter, script, log) = open_adapter();
        let fault = Error::Transport(TransportError::Io);
        script.borrow_mut().sends.push_back(Err(fault));

        assert_eq!(adapter.send_async(b"abc", 1), Ok(()));
        assert_eq!(adapter.state(), ConnectionState::Error);
        assert_eq!(adapter.last_error(), Some(fault));
        assert_eq!(log.borrow().completed, [(1, SendResult::Error)]);
        assert_eq!(log.borrow().errors, 1);

        adapter.enter_error(Error::Transport(TransportError::Closed));
        adapter.dowork();
        assert_eq!(log.borrow().errors, 1);
        assert_eq!(adapter.last_error(), Some(fault));
        assert_eq!(adapter.send_async(b"more", 2), Err(Error::InvalidState));
    }

    #[test]
    fn test_idle_receives_leave_state_alone() {
        let (mut adapter, script, log) = open_adapter();
        script
            .borrow_mut()
            .receives
            .extend([Ok(Vec::new()), Ok(Vec::new()), Err(Error::WouldBlock)]);

        for _ in 0..4 {
            adapter.dowork();
        }

        assert!(log.borrow().received.is_empty());
        assert_eq!(adapter.state(), ConnectionState::Open);
        assert_eq!(log.borrow().errors, 0);
    }

    #[test]
    fn test_received_bytes_forwarded_in_chunks() {
        let (mut adapter, script, log) = open_adapter();
        script.borrow_mut().receives.push_back(Ok(vec![0xAB; 300]));

        adapter.dowork();

        let log = log.borrow();
        let sizes: Vec<_> = log.received.iter().map(Vec::len).collect();
        assert_eq!(sizes, [RECEIVE_CHUNK, 300 - RECEIVE_CHUNK]);
    }

    #[test]
    fn test_remote_close_enters_error() {
        let (mut adapter, script, log) = open_adapter();
        let closed = Error::Transport(TransportError::Closed);
        script.borrow_mut().receives.push_back(Err(closed));

        adapter.dowork();

        assert_eq!(adapter.state(), ConnectionState::Error);
        assert_eq!(adapter.last_error(), Some(closed));
        assert_eq!(log.borrow().errors, 1);
    }

    #[test]
    fn test_diagnostic_code_comes_from_tls_layer() {
        let (mut adapter, script, _log) = open_adapter();
        assert_eq!(adapter.diagnostic_code(), 0);

        let rejected = Error::Handshake(HandshakeError::AlertReceived);
        {
            let mut script = script.borrow_mut();
            script.error_code = rejected.code();
            script.receives.push_back(Err(rejected));
        }
        adapter.dowork();

        assert_eq!(adapter.state(), ConnectionState::Error);
        assert_eq!(adapter.diagnostic_code(), rejected.code());
    }

    #[test]
    fn test_open_twice_keeps_first_callbacks() {
        let (mut adapter, script, log) = open_adapter();
        let other = Rc::new(RefCell::new(Log::default()));

        assert_eq!(
            adapter.open(Recorder(other.clone())),
            Err(Error::InvalidState)
        );
        assert_eq!(adapter.state(), ConnectionState::Open);
        assert!(other.borrow().opened.is_empty());

        script.borrow_mut().receives.push_back(Ok(b"hi".to_vec()));
        adapter.dowork();
        assert_eq!(log.borrow().received, [b"hi".to_vec()]);
        assert!(other.borrow().received.is_empty());
        assert_eq!(log.borrow().opened, [Ok(())]);
    }

    #[test]
    fn test_open_failure_reported_through_callback() {
        let (mut adapter, script, log) = closed_adapter();
        let refused = Error::Transport(TransportError::Connect);
        script.borrow_mut().connect_result = Some(refused);

        assert_eq!(adapter.open(Recorder(log.clone())), Err(refused));
        assert_eq!(log.borrow().opened, [Err(refused)]);
        assert_eq!(adapter.state(), ConnectionState::Closed);
        assert_eq!(adapter.last_error(), Some(refused));

        script.borrow_mut().connect_result = None;
        assert_eq!(adapter.open(Recorder(log.clone())), Ok(()));
        assert_eq!(adapter.state(), ConnectionState::Open);
        assert_eq!(adapter.last_error(), None);
    }

    #[test]
    fn test_setup_failure_skips_connect() {
        let (mut adapter, script, log) = closed_adapter();
        let bad_cert = Error::Handshake(HandshakeError::ClientCertificate);
        script.borrow_mut().setup_result = Some(bad_cert);

        assert_eq!(adapter.open(Recorder(log.clone())), Err(bad_cert));
        assert!(!script.borrow().connected);
        assert_eq!(log.borrow().opened, [Err(bad_cert)]);
    }

    #[test]
    fn test_close_cancels_pending() {
        let (mut adapter, script, log) = open_adapter();
        block_sends(&script, 2);
        adapter.send_async(b"one", 1).unwrap();
        adapter.send_async(b"two", 2).unwrap();

        let mut closed = 0;
        adapter.close(|| closed += 1).unwrap();

        assert_eq!(closed, 1);
        assert_eq!(adapter.state(), ConnectionState::Closed);
        assert_eq!(
            log.borrow().completed,
            [(1, SendResult::Cancelled), (2, SendResult::Cancelled)]
        );
        assert!(!script.borrow().connected);

        assert_eq!(adapter.close(|| closed += 1), Err(Error::InvalidState));
        assert_eq!(closed, 1);
    }

    #[test]
    fn test_close_from_error_state() {
        let (mut adapter, script, _log) = open_adapter();
        script
            .borrow_mut()
            .receives
            .push_back(Err(Error::Transport(TransportError::Io)));
        adapter.dowork();
        assert_eq!(adapter.state(), ConnectionState::Error);

        assert_eq!(adapter.close(|| {}), Ok(()));
        assert_eq!(adapter.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_destroy_cancels_pending() {
        let (mut adapter, script, log) = open_adapter();
        block_sends(&script, 1);
        adapter.send_async(b"late", 5).unwrap();

        adapter.destroy();

        assert_eq!(log.borrow().completed, [(5, SendResult::Cancelled)]);
        assert_eq!(script.borrow().releases, 1);
        assert!(!script.borrow().connected);
    }

    #[test]
    fn test_client_certificate_option_forwarded() {
        let (mut adapter, script, log) = closed_adapter();
        assert_eq!(adapter.set_option(OPTION_CLIENT_CERTIFICATE, b"PEM"), Ok(()));
        assert_eq!(adapter.set_option("keepalive", b"60"), Ok(()));
        assert_eq!(
            adapter.set_option(OPTION_CLIENT_CERTIFICATE, b""),
            Err(Error::Handshake(HandshakeError::ClientCertificate))
        );

        let options = adapter.retrieve_options();
        assert_eq!(options.client_certificate(), Some(&b"PEM"[..]));

        adapter.open(Recorder(log)).unwrap();
        assert_eq!(script.borrow().setups, [Some(b"PEM".to_vec())]);
    }

    #[test]
    fn test_hostname_validated() {
        let script = Rc::new(RefCell::new(Script::default()));
        let empty = AdapterConfig {
            hostname: "",
            ..AdapterConfig::default()
        };
        assert!(matches!(
            TestAdapter::from_parts(empty, ScriptedTransport(script.clone())),
            Err(Error::Handshake(HandshakeError::ServerName))
        ));

        let long: &'static str = Box::leak("a".repeat(HOSTNAME_MAX_LEN + 1).into_boxed_str());
        let too_long = AdapterConfig {
            hostname: long,
            ..AdapterConfig::default()
        };
        assert!(matches!(
            TestAdapter::from_parts(too_long, ScriptedTransport(script)),
            Err(Error::Handshake(HandshakeError::ServerName))
        ));
    }

    #[test]
    fn test_queue_limits() {
        let (mut adapter, script, log) = open_adapter();
        block_sends(&script, 8);

        assert_eq!(
            adapter.send_async(&[0u8; 17], 1),
            Err(Error::Queue(QueueError::MessageTooLarge))
        );
        for id in 0..4 {
            adapter.send_async(b"x", id).unwrap();
        }
        assert_eq!(
            adapter.send_async(b"x", 9),
            Err(Error::Queue(QueueError::Full))
        );
        assert_eq!(adapter.queued(), 4);
        assert!(log.borrow().completed.is_empty());
    }
}
