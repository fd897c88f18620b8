//! Async device session over a serial link.
//!
//! `serialport` I/O is blocking, so the session follows the usual split: the
//! async side owns lifecycle (`start`/`stop`) and a dedicated blocking worker
//! on `tokio::task::spawn_blocking` owns the port, pumping bytes through the
//! frame codec and delivering decoded measurements over a bounded mpsc
//! channel. The port read timeout doubles as the worker's poll interval, so a
//! stop request is observed within one timeout — including under
//! backpressure, where delivery retries in poll-interval steps instead of
//! parking on the full channel.
//!
//! Connecting is two-phase. The instrument only starts streaming after
//! receiving the fixed start frame, and some units ignore writes on a port
//! that was just opened; the first phase therefore opens a transient port,
//! waits for it to settle, writes the start frame, and closes it again. A
//! failure here is a warning, not an error: the device may already be
//! streaming. The second phase opens the durable port the worker reads from,
//! and failure there is fatal.

use bytes::BytesMut;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};

use crate::config::Settings;
use crate::error::{AppResult, CalError};
use crate::protocol::frame::{self, try_extract_frame};
use crate::protocol::measurement::{decode_payload, Measurement};

/// Settle time after opening the transient handshake port.
const HANDSHAKE_SETTLE: Duration = Duration::from_secs(1);
/// Settle time between closing the handshake port and the durable open.
const POST_HANDSHAKE_DELAY: Duration = Duration::from_millis(300);
/// Read chunk size of the poll loop.
const READ_CHUNK: usize = 64;

/// Lifecycle state of a [`DeviceSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No connection; the initial and final state.
    Disconnected,
    /// Handshake and durable open in progress.
    Connecting,
    /// Worker running, measurements flowing.
    Streaming,
    /// A fatal fault occurred; reported before returning to `Disconnected`.
    Faulted,
}

/// Lock-free state cell shared between the session and its worker.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn store(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn load(&self) -> SessionState {
        match self.0.load(Ordering::SeqCst) {
            0 => SessionState::Disconnected,
            1 => SessionState::Connecting,
            2 => SessionState::Streaming,
            _ => SessionState::Faulted,
        }
    }
}

/// Connection parameters for one streaming session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Serial port device path.
    pub port: String,
    /// Baud rate.
    pub baud: u32,
    /// Port read timeout; also bounds how quickly `stop` takes effect.
    pub read_timeout: Duration,
    /// Event channel capacity.
    pub channel_capacity: usize,
}

impl SessionConfig {
    /// A config for `port` at `baud` with default timing and capacity.
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
            read_timeout: Duration::from_millis(200),
            channel_capacity: 256,
        }
    }
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            port: settings.port.clone(),
            baud: settings.baud,
            read_timeout: Duration::from_millis(settings.read_timeout_ms),
            channel_capacity: settings.channel_capacity,
        }
    }
}

/// Events delivered by a streaming session, in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    /// A decoded measurement.
    Measurement(Measurement),
    /// A fatal fault; the session transitions to `Disconnected` after this.
    Fault(CalError),
}

/// Owns the serial connection to one STMP-960.
///
/// After a successful [`start`](Self::start) the returned receiver yields
/// [`SessionEvent`]s until [`stop`](Self::stop) is called, the receiver is
/// dropped, or a fatal fault occurs. `stop` joins the worker, so no event is
/// delivered after it returns.
#[derive(Debug)]
pub struct DeviceSession {
    shared: Arc<StateCell>,
    stop: Arc<AtomicBool>,
    worker: Option<tokio::task::JoinHandle<()>>,
}

impl Default for DeviceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceSession {
    /// Creates a disconnected session.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(StateCell::new(SessionState::Disconnected)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.load()
    }

    /// Performs the start handshake, opens the durable port, and spawns the
    /// poll worker. Returns the event receiver.
    ///
    /// Fails with [`CalError::SessionBusy`] if already streaming; a durable
    /// open failure returns the underlying error with the session back in
    /// `Disconnected`.
    pub async fn start(&mut self, config: SessionConfig) -> AppResult<mpsc::Receiver<SessionEvent>> {
        if let Some(worker) = &self.worker {
            if !worker.is_finished() {
                return Err(CalError::SessionBusy);
            }
            // The worker already exited on its own (fault or dropped
            // receiver); reap the handle so a reconnect is possible without
            // an intervening stop().
            self.worker = None;
        }
        self.shared.store(SessionState::Connecting);

        // Phase one: transient port, start frame, close. Best effort.
        let kick = config.clone();
        match tokio::task::spawn_blocking(move || send_start_frame(&kick)).await {
            Ok(Ok(())) => debug!(port = %config.port, "start frame sent"),
            Ok(Err(err)) => {
                warn!(port = %config.port, %err, "start frame handshake failed; device may already be streaming");
            }
            Err(err) => warn!(%err, "start frame task failed"),
        }
        tokio::time::sleep(POST_HANDSHAKE_DELAY).await;

        // Phase two: the durable port the worker reads from.
        let durable = config.clone();
        let port = match tokio::task::spawn_blocking(move || open_port(&durable)).await {
            Ok(Ok(port)) => port,
            Ok(Err(err)) => {
                self.shared.store(SessionState::Disconnected);
                return Err(err);
            }
            Err(err) => {
                self.shared.store(SessionState::Disconnected);
                return Err(CalError::Instrument(format!("serial open task failed: {err}")));
            }
        };

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let shared = Arc::clone(&self.shared);
        shared.store(SessionState::Streaming);
        info!(port = %config.port, baud = config.baud, "session streaming");
        let poll_interval = config.read_timeout;
        self.worker = Some(tokio::task::spawn_blocking(move || {
            poll_loop(port, &tx, &stop, &shared, poll_interval);
        }));
        Ok(rx)
    }

    /// Stops streaming, joins the worker, and releases the port. Idempotent;
    /// after it returns no further event is delivered.
    pub async fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                warn!(%err, "session worker join failed");
            }
        }
        self.shared.store(SessionState::Disconnected);
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        // The worker also exits on its own once the receiver is dropped.
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn open_port(config: &SessionConfig) -> AppResult<Box<dyn SerialPort>> {
    Ok(serialport::new(&config.port, config.baud)
        .timeout(config.read_timeout)
        .open()?)
}

fn send_start_frame(config: &SessionConfig) -> AppResult<()> {
    let mut port = serialport::new(&config.port, config.baud)
        .timeout(HANDSHAKE_SETTLE)
        .open()?;
    // Writes issued immediately after open are ignored by some units.
    std::thread::sleep(HANDSHAKE_SETTLE);
    port.write_all(&frame::START_FRAME)?;
    port.flush()?;
    Ok(())
}

/// Outcome of pushing one event at the worker's channel.
#[derive(Debug, PartialEq, Eq)]
enum Delivery {
    Sent,
    /// The receiver was dropped; nobody is left to deliver to.
    Closed,
    /// A stop request arrived while waiting for channel capacity.
    Stopped,
}

/// Delivers `event` without parking the worker indefinitely: on a full
/// channel it sleeps one `retry_interval` and re-checks `stop` between
/// attempts, so a stop request is honored even when the consumer has stopped
/// draining events.
fn deliver(
    tx: &mpsc::Sender<SessionEvent>,
    mut event: SessionEvent,
    stop: &AtomicBool,
    retry_interval: Duration,
) -> Delivery {
    loop {
        match tx.try_send(event) {
            Ok(()) => return Delivery::Sent,
            Err(TrySendError::Closed(_)) => return Delivery::Closed,
            Err(TrySendError::Full(returned)) => {
                if stop.load(Ordering::SeqCst) {
                    return Delivery::Stopped;
                }
                std::thread::sleep(retry_interval);
                event = returned;
            }
        }
    }
}

fn poll_loop(
    mut port: Box<dyn SerialPort>,
    tx: &mpsc::Sender<SessionEvent>,
    stop: &AtomicBool,
    shared: &StateCell,
    poll_interval: Duration,
) {
    let mut acc = BytesMut::with_capacity(READ_CHUNK * 4);
    let mut chunk = [0u8; READ_CHUNK];

    while !stop.load(Ordering::SeqCst) {
        match port.read(&mut chunk) {
            Ok(0) => {
                fault(tx, shared, stop, poll_interval, CalError::SerialUnexpectedEof);
                return;
            }
            Ok(n) => {
                acc.extend_from_slice(&chunk[..n]);
                while let Some(payload) = try_extract_frame(&mut acc) {
                    match decode_payload(&payload) {
                        Some(measurement) => {
                            let event = SessionEvent::Measurement(measurement);
                            match deliver(tx, event, stop, poll_interval) {
                                Delivery::Sent => {}
                                Delivery::Closed | Delivery::Stopped => {
                                    shared.store(SessionState::Disconnected);
                                    return;
                                }
                            }
                        }
                        None => trace!("skipping payload with unknown header"),
                    }
                }
            }
            // The timeout is the poll interval; loop around and re-check stop.
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(err) => {
                fault(tx, shared, stop, poll_interval, CalError::Io(err));
                return;
            }
        }
    }
    shared.store(SessionState::Disconnected);
}

fn fault(
    tx: &mpsc::Sender<SessionEvent>,
    shared: &StateCell,
    stop: &AtomicBool,
    poll_interval: Duration,
    err: CalError,
) {
    error!(%err, "session fault");
    shared.store(SessionState::Faulted);
    // The fault is reported before the state settles to Disconnected.
    let _ = deliver(tx, SessionEvent::Fault(err), stop, poll_interval);
    shared.store(SessionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_cell_roundtrips_every_state() {
        let cell = StateCell::new(SessionState::Disconnected);
        for state in [
            SessionState::Connecting,
            SessionState::Streaming,
            SessionState::Faulted,
            SessionState::Disconnected,
        ] {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
    }

    #[test]
    fn new_session_is_disconnected() {
        let session = DeviceSession::new();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn stop_without_start_is_idempotent() {
        let mut session = DeviceSession::new();
        session.stop().await;
        session.stop().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    fn dummy_event() -> SessionEvent {
        SessionEvent::Fault(CalError::SerialUnexpectedEof)
    }

    #[test]
    fn delivery_aborts_on_stop_when_channel_full() {
        let (tx, _rx) = mpsc::channel(1);
        tx.try_send(dummy_event()).unwrap();
        let stop = AtomicBool::new(true);

        let outcome = deliver(&tx, dummy_event(), &stop, Duration::from_millis(1));
        assert_eq!(outcome, Delivery::Stopped);
    }

    #[test]
    fn delivery_retries_until_capacity_frees() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.try_send(dummy_event()).unwrap();
        let stop = AtomicBool::new(false);

        let drainer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            rx.try_recv().ok();
            rx
        });
        let outcome = deliver(&tx, dummy_event(), &stop, Duration::from_millis(2));
        assert_eq!(outcome, Delivery::Sent);
        drainer.join().unwrap();
    }

    #[test]
    fn delivery_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let stop = AtomicBool::new(false);
        let outcome = deliver(&tx, dummy_event(), &stop, Duration::from_millis(1));
        assert_eq!(outcome, Delivery::Closed);
    }

    #[tokio::test]
    async fn running_worker_reports_busy() {
        let mut session = DeviceSession::new();
        session.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&session.stop);
        session.worker = Some(tokio::task::spawn_blocking(move || {
            while !stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(2));
            }
        }));

        let err = session
            .start(SessionConfig::new("/dev/null/not-a-port", 9600))
            .await
            .unwrap_err();
        assert!(matches!(err, CalError::SessionBusy));
        session.stop().await;
    }

    #[tokio::test]
    async fn finished_worker_does_not_block_restart() {
        let mut session = DeviceSession::new();
        let worker = tokio::task::spawn_blocking(|| {});
        while !worker.is_finished() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        session.worker = Some(worker);

        // The dead worker must be reaped so the restart reaches the port
        // open, which then fails on the bogus path rather than as busy.
        let err = session
            .start(SessionConfig::new("/dev/null/not-a-port", 9600))
            .await
            .unwrap_err();
        assert!(!matches!(err, CalError::SessionBusy));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn start_on_bogus_port_fails_and_disconnects() {
        let mut session = DeviceSession::new();
        let config = SessionConfig::new("/dev/null/not-a-port", 9600);
        let result = session.start(config).await;
        assert!(result.is_err());
        assert_eq!(session.state(), SessionState::Disconnected);

        // The failed start must not leave the session busy.
        let config = SessionConfig::new("/dev/null/not-a-port", 9600);
        assert!(session.start(config).await.is_err());
    }
}
