//! Command Dispatcher
//!
//! One [`Connection`] owns one ordered transport and pipelines every command
//! dispatched on it.
//!
//! ## Pipeline
//!
//! ```text
//! dispatch() ──encode──▶ ┌──────────── DispatchState (Mutex) ────────────┐
//!                        │ seq counter, auto_flush, open                 │
//!                        │ queued: [entry, entry]  queued_bytes: [frames]│
//!                        │ in_flight: [entry, entry, entry]              │
//!                        └──────┬───────────────────────────▲────────────┘
//!                    flush      │ frames                    │ pop_front
//!                               ▼                           │
//!                        Writer Task ──▶ transport ──▶ Reader Task
//!                                                      parse + decode
//! ```
//!
//! ## State Machine
//!
//! - **Open, auto-flush** (default): each dispatch is written immediately.
//! - **Open, manual flush**: dispatches accumulate until
//!   [`Connection::flush_commands`] or a dispatch made after auto-flush is
//!   turned back on.
//! - **Closed**: [`Connection::is_open`] is false, new dispatches get a stream
//!   that fails with [`CommandError::Closed`], flushing does nothing.
//!
//! ## Ordering
//!
//! Sequence numbers are assigned and entries appended inside one critical
//! section, and a flush moves entries to the in-flight queue in the same
//! critical section that hands their bytes to the writer. The reader task is
//! the only consumer of the in-flight queue, so replies are matched strictly
//! first-in first-out. Decoding runs outside the lock.

use crate::codec::{Codec, CodecError};
use crate::command::{Command, CommandArgs, DecodeError, OutputDecoder, ProtocolKeyword};
use crate::connection::stream::ResultStream;
use crate::protocol::parser::MAX_BULK_SIZE;
use crate::protocol::{RespParser, RespValue};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

/// Initial read buffer capacity
pub const INITIAL_BUFFER_SIZE: usize = 4096;

/// Largest amount of unparsed reply data held before the connection fails
pub const MAX_REPLY_BUFFER: usize = MAX_BULK_SIZE + 64 * 1024;

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Flush after every dispatch (default: true)
    pub auto_flush: bool,

    /// Initial capacity of the read buffer
    pub initial_buffer_size: usize,

    /// Limit for buffered, not yet complete reply data
    pub max_reply_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            auto_flush: true,
            initial_buffer_size: INITIAL_BUFFER_SIZE,
            max_reply_buffer: MAX_REPLY_BUFFER,
        }
    }
}

/// Counters for one connection.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Commands accepted into the queue
    pub commands_dispatched: AtomicU64,
    /// Non-empty flushes handed to the writer
    pub flushes: AtomicU64,
    /// Reply frames received
    pub replies_received: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command_dispatched(&self) {
        self.commands_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flushed(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reply_received(&self) {
        self.replies_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// A queued or in-flight command with its decoder and result channel.
trait PendingEntry: Send {
    fn sequence(&self) -> u64;

    /// True while the entry holds the queue head for pushed frames.
    fn is_push(&self) -> bool;

    /// Feeds one reply frame. Returns true when the command is complete.
    fn on_reply(&mut self, reply: RespValue) -> bool;

    fn fail(self: Box<Self>, error: CommandError);
}

struct Entry<O: OutputDecoder> {
    sequence: u64,
    output: O,
    tx: mpsc::UnboundedSender<Result<O::Item, CommandError>>,
    /// At least one frame has been routed here
    started: bool,
    /// An error was delivered; later frames are decoded and discarded
    failed: bool,
}

impl<O: OutputDecoder> Entry<O> {
    fn new(
        sequence: u64,
        output: O,
        tx: mpsc::UnboundedSender<Result<O::Item, CommandError>>,
    ) -> Self {
        Self {
            sequence,
            output,
            tx,
            started: false,
            failed: false,
        }
    }

    fn deliver_error(&mut self, error: CommandError) {
        if !self.failed {
            self.failed = true;
            let _ = self.tx.send(Err(error));
        }
    }
}

impl<O: OutputDecoder> PendingEntry for Entry<O> {
    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn is_push(&self) -> bool {
        self.started && !self.failed && self.output.is_push()
    }

    fn on_reply(&mut self, reply: RespValue) -> bool {
        // An error before anything else is the command's entire reply.
        if !self.started {
            if let RespValue::Error(message) = reply {
                self.deliver_error(CommandError::Server(message));
                return true;
            }
        }
        self.started = true;

        let server_error = match &reply {
            RespValue::Error(message) => Some(message.clone()),
            _ => None,
        };

        // Failed and cancelled entries keep decoding so they still leave the
        // pipeline exactly when their replies are consumed.
        match self.output.decode(reply) {
            Ok(decoded) => {
                if let Some(message) = server_error {
                    self.deliver_error(CommandError::Server(message));
                } else if !self.failed && !self.tx.is_closed() {
                    for value in decoded.values {
                        if self.tx.send(Ok(value)).is_err() {
                            break;
                        }
                    }
                }
                decoded.complete
            }
            Err(e) => {
                if !self.failed {
                    debug!(seq = self.sequence, error = %e, "Reply decode failed");
                }
                match server_error {
                    Some(message) => self.deliver_error(CommandError::Server(message)),
                    None => self.deliver_error(CommandError::Decode(e)),
                }
                self.output.is_complete()
            }
        }
    }

    fn fail(self: Box<Self>, error: CommandError) {
        if !self.failed {
            let _ = self.tx.send(Err(error));
        }
    }
}

/// Mutable state shared by all callers of one connection.
struct DispatchState {
    open: bool,
    auto_flush: bool,
    next_sequence: u64,
    /// Dispatched, not yet handed to the writer
    queued: Vec<Box<dyn PendingEntry>>,
    /// Encoded frames of `queued`, in the same order
    queued_bytes: BytesMut,
    /// Written, waiting for replies
    in_flight: VecDeque<Box<dyn PendingEntry>>,
    writer_tx: Option<mpsc::UnboundedSender<Bytes>>,
}

struct Shared {
    state: Mutex<DispatchState>,
    shutdown_tx: watch::Sender<bool>,
    stats: Arc<ConnectionStats>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue<O: OutputDecoder>(
        &self,
        keyword: &str,
        frame: BytesMut,
        output: O,
    ) -> ResultStream<O::Item> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        let entry = Box::new(Entry::new(sequence, output, tx));

        if !state.open {
            drop(state);
            trace!(seq = sequence, keyword, "Dispatch on closed connection");
            entry.fail(CommandError::Closed);
            return ResultStream::new(sequence, rx);
        }

        state.queued.push(entry);
        state.queued_bytes.unsplit(frame);
        self.stats.command_dispatched();
        trace!(
            seq = sequence,
            keyword,
            queued = state.queued.len(),
            "Command enqueued"
        );

        if state.auto_flush {
            self.flush_locked(&mut state);
        }

        ResultStream::new(sequence, rx)
    }

    fn flush(&self) {
        let mut state = self.lock();
        self.flush_locked(&mut state);
    }

    fn flush_locked(&self, state: &mut DispatchState) {
        if !state.open || state.queued.is_empty() {
            return;
        }

        let frames = state.queued_bytes.split().freeze();
        let bytes = frames.len();
        let sent = state
            .writer_tx
            .as_ref()
            .map(|tx| tx.send(frames).is_ok())
            .unwrap_or(false);

        if !sent {
            warn!("Writer task is gone, failing pending commands");
            self.fail_locked(state, CommandError::Closed);
            return;
        }

        let commands = state.queued.len();
        let DispatchState {
            queued, in_flight, ..
        } = state;
        in_flight.extend(queued.drain(..));

        self.stats.flushed();
        debug!(commands, bytes, "Flushed commands");
    }

    fn fail_all(&self, error: CommandError) {
        let mut state = self.lock();
        self.fail_locked(&mut state, error);
    }

    fn fail_locked(&self, state: &mut DispatchState, error: CommandError) {
        let was_open = state.open;
        state.open = false;
        state.writer_tx = None;
        state.queued_bytes.clear();

        let failed = state.queued.len() + state.in_flight.len();
        for entry in state.in_flight.drain(..).chain(state.queued.drain(..)) {
            entry.fail(error.clone());
        }

        self.shutdown_tx.send_replace(true);

        if was_open || failed > 0 {
            debug!(error = %error, failed, "Connection closed");
        }
    }
}

/// A pipelining connection to a Redis-compatible server.
///
/// The connection can be shared between tasks (wrap it in an `Arc`); every
/// caller's commands go through the same ordered queue.
///
/// # Example
///
/// ```ignore
/// use flashkv_client::codec::StringCodec;
/// use flashkv_client::command::{CommandArgs, CommandType, IntegerOutput};
/// use flashkv_client::connection::{Connection, ConnectionConfig};
///
/// let conn = Connection::connect("127.0.0.1:6379", StringCodec::utf8(), ConnectionConfig::default()).await?;
///
/// conn.set_auto_flush_commands(false);
/// let args = CommandArgs::new().add_key("news").add_value("hello");
/// let published = conn.dispatch_with_args(CommandType::Publish, IntegerOutput, args)?;
/// conn.flush_commands();
///
/// let receivers = published.single().await?;
/// ```
pub struct Connection<C: Codec> {
    codec: Arc<C>,
    shared: Arc<Shared>,
}

impl<C: Codec> Connection<C> {
    /// Wraps an established transport and starts the reader and writer tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<T>(io: T, codec: C, config: ConnectionConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_shared_codec(io, Arc::new(codec), config)
    }

    /// Like [`new`](Self::new), sharing an existing codec.
    pub fn with_shared_codec<T>(io: T, codec: Arc<C>, config: ConnectionConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            state: Mutex::new(DispatchState {
                open: true,
                auto_flush: config.auto_flush,
                next_sequence: 0,
                queued: Vec::new(),
                queued_bytes: BytesMut::new(),
                in_flight: VecDeque::new(),
                writer_tx: Some(writer_tx),
            }),
            shutdown_tx,
            stats: Arc::new(ConnectionStats::new()),
        });

        tokio::spawn(write_loop(Arc::clone(&shared), writer, writer_rx));
        tokio::spawn(read_loop(Arc::clone(&shared), reader, shutdown_rx, config));

        Self { codec, shared }
    }

    /// Opens a TCP connection.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        codec: C,
        config: ConnectionConfig,
    ) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "Connected");
        Ok(Self::new(stream, codec, config))
    }

    /// The codec used for keys and values.
    pub fn codec(&self) -> &Arc<C> {
        &self.codec
    }

    /// Dispatches a command without arguments.
    pub fn dispatch<O: OutputDecoder>(
        &self,
        keyword: impl ProtocolKeyword,
        output: O,
    ) -> Result<ResultStream<O::Item>, CommandError> {
        self.dispatch_command(Command::new(keyword, output))
    }

    /// Dispatches a command with arguments.
    pub fn dispatch_with_args<O: OutputDecoder>(
        &self,
        keyword: impl ProtocolKeyword,
        output: O,
        args: CommandArgs<C>,
    ) -> Result<ResultStream<O::Item>, CommandError> {
        self.dispatch_command(Command::with_args(keyword, output, args))
    }

    /// Encodes and enqueues `command`.
    ///
    /// Fails only when the arguments cannot be encoded, in which case nothing
    /// is enqueued. Every later failure is delivered through the stream.
    pub fn dispatch_command<O: OutputDecoder>(
        &self,
        command: Command<C, O>,
    ) -> Result<ResultStream<O::Item>, CommandError> {
        let frame = command.encode(&self.codec)?;
        let keyword = command.keyword();
        Ok(self
            .shared
            .enqueue(&keyword, frame, command.into_output()))
    }

    /// Hands every queued command to the transport. Does not wait for replies.
    pub fn flush_commands(&self) {
        self.shared.flush();
    }

    /// Turns flushing after every dispatch on or off.
    ///
    /// Turning it back on does not flush by itself; the next dispatch does.
    pub fn set_auto_flush_commands(&self, enabled: bool) {
        self.shared.lock().auto_flush = enabled;
        debug!(enabled, "Auto-flush changed");
    }

    pub fn is_auto_flush(&self) -> bool {
        self.shared.lock().auto_flush
    }

    /// True while new commands can be transmitted.
    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// Number of dispatched commands not yet flushed.
    pub fn queued_commands(&self) -> usize {
        self.shared.lock().queued.len()
    }

    /// Number of flushed commands still waiting for their first reply.
    pub fn in_flight_commands(&self) -> usize {
        self.shared.lock().in_flight.len()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.shared.stats)
    }

    /// Closes the connection and fails every unfinished command.
    pub fn close(&self) {
        self.shared.fail_all(CommandError::Closed);
    }
}

impl<C: Codec> Drop for Connection<C> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Writes frames handed over by flushes, batching whatever is ready.
async fn write_loop<W>(shared: Arc<Shared>, mut writer: W, mut rx: mpsc::UnboundedReceiver<Bytes>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frames) = rx.recv().await {
        let mut written = frames.len();
        let mut result = writer.write_all(&frames).await;

        while result.is_ok() {
            match rx.try_recv() {
                Ok(more) => {
                    written += more.len();
                    result = writer.write_all(&more).await;
                }
                Err(_) => break,
            }
        }

        if result.is_ok() {
            result = writer.flush().await;
        }

        if let Err(e) = result {
            warn!(error = %e, "Transport write failed");
            shared.fail_all(CommandError::Io(e.to_string()));
            return;
        }

        shared.stats.bytes_written(written);
        trace!(bytes = written, "Wrote frames");
    }

    let _ = writer.shutdown().await;
}

/// Reads replies and routes each one to the head of the in-flight queue.
async fn read_loop<R>(
    shared: Arc<Shared>,
    mut reader: R,
    mut shutdown_rx: watch::Receiver<bool>,
    config: ConnectionConfig,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(config.initial_buffer_size);
    let mut parser = RespParser::new();
    // The entry being decoded; it stays here across frames until complete.
    let mut current: Option<Box<dyn PendingEntry>> = None;

    let error = loop {
        // Nothing buffered may be routed once the queues have been failed.
        if *shutdown_rx.borrow() {
            break CommandError::Closed;
        }

        if let Err(e) = route_replies(&shared, &mut parser, &mut buffer, &mut current) {
            warn!(error = %e, "Reply stream corrupt");
            break e;
        }

        if buffer.len() > config.max_reply_buffer {
            warn!(size = buffer.len(), "Reply buffer limit exceeded");
            break CommandError::Protocol("reply buffer limit exceeded".to_string());
        }

        tokio::select! {
            _ = shutdown_rx.changed() => break CommandError::Closed,
            read = reader.read_buf(&mut buffer) => match read {
                Ok(0) => {
                    debug!(buffered = buffer.len(), "Server closed the connection");
                    break CommandError::Closed;
                }
                Ok(n) => {
                    shared.stats.bytes_read(n);
                    trace!(bytes = n, "Read data");
                }
                Err(e) => {
                    warn!(error = %e, "Transport read failed");
                    break CommandError::Io(e.to_string());
                }
            }
        }
    };

    if let Some(entry) = current.take() {
        entry.fail(error.clone());
    }
    shared.fail_all(error);
}

fn route_replies(
    shared: &Shared,
    parser: &mut RespParser,
    buffer: &mut BytesMut,
    current: &mut Option<Box<dyn PendingEntry>>,
) -> Result<(), CommandError> {
    while let Some((reply, consumed)) = parser
        .parse(buffer)
        .map_err(|e| CommandError::Protocol(e.to_string()))?
    {
        let _ = buffer.split_to(consumed);
        shared.stats.reply_received();

        // While a subscription holds the head, error replies answer the
        // commands queued behind it.
        if reply.is_error() && current.as_ref().is_some_and(|entry| entry.is_push()) {
            let waiting = shared.lock().in_flight.pop_front();
            if let Some(mut entry) = waiting {
                entry.on_reply(reply);
                trace!(seq = entry.sequence(), "Command rejected behind subscription");
                continue;
            }
        }

        let mut entry = match current.take() {
            Some(entry) => entry,
            None => shared.lock().in_flight.pop_front().ok_or_else(|| {
                CommandError::Protocol("reply without a pending command".to_string())
            })?,
        };

        if entry.on_reply(reply) {
            trace!(seq = entry.sequence(), "Command complete");
        } else {
            *current = Some(entry);
        }
    }
    Ok(())
}

/// Errors delivered through a command's result stream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// The arguments could not be encoded; the command was not enqueued
    #[error("encode error: {0}")]
    Encode(#[from] CodecError),

    /// The output decoder rejected the reply
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The server answered with an error reply
    #[error("server error: {0}")]
    Server(String),

    /// The connection is closed or closed before the reply arrived
    #[error("connection closed")]
    Closed,

    /// The transport failed
    #[error("I/O error: {0}")]
    Io(String),

    /// The reply stream is not valid RESP or does not match the queue
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The command completed without producing a value
    #[error("command completed without a value")]
    NoValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Charset, StringCodec};
    use crate::command::{CommandType, Decoded, IntegerOutput, PushOutput, StatusOutput};
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn connect(config: ConnectionConfig) -> (Connection<StringCodec>, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (Connection::new(client, StringCodec::utf8(), config), server)
    }

    fn manual_flush() -> ConnectionConfig {
        ConnectionConfig {
            auto_flush: false,
            ..ConnectionConfig::default()
        }
    }

    async fn expect_frames(server: &mut DuplexStream, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        timeout(WAIT, server.read_exact(&mut buf))
            .await
            .expect("timed out waiting for frames")
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&buf), String::from_utf8_lossy(expected));
    }

    async fn expect_silence(server: &mut DuplexStream) {
        let mut buf = [0u8; 1];
        assert!(
            timeout(Duration::from_millis(100), server.read(&mut buf))
                .await
                .is_err(),
            "transport received bytes"
        );
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let pong = conn.ping().unwrap();
        expect_frames(&mut server, b"*1\r\n$4\r\nPING\r\n").await;
        server.write_all(b"+PONG\r\n").await.unwrap();

        assert_eq!(pong.single().await.unwrap(), "PONG");
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn test_exact_wire_bytes_with_mock_transport() {
        let mock = tokio_test::io::Builder::new()
            .write(b"*3\r\n$7\r\nPUBLISH\r\n$4\r\nnews\r\n$5\r\ncaf\xc3\xa9\r\n")
            .read(b":2\r\n")
            .build();
        let conn = Connection::new(mock, StringCodec::utf8(), ConnectionConfig::default());

        let receivers = conn.publish("news", "café").unwrap();
        assert_eq!(receivers.single().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fifo_with_fragmented_replies() {
        let (conn, mut server) = connect(manual_flush());

        let set = conn.set("k", "v").unwrap();
        let get = conn.get("k").unwrap();
        let incr = conn.incr("n").unwrap();
        assert!(set.sequence() < get.sequence() && get.sequence() < incr.sequence());
        assert_eq!(conn.queued_commands(), 3);

        conn.flush_commands();
        assert_eq!(conn.queued_commands(), 0);
        expect_frames(
            &mut server,
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n\
              *2\r\n$3\r\nGET\r\n$1\r\nk\r\n\
              *2\r\n$4\r\nINCR\r\n$1\r\nn\r\n",
        )
        .await;

        // Dribble the replies one byte at a time.
        for byte in b"+OK\r\n$1\r\nv\r\n:7\r\n" {
            server.write_all(&[*byte]).await.unwrap();
            tokio::task::yield_now().await;
        }

        assert_eq!(set.single().await.unwrap(), "OK");
        assert_eq!(get.single().await.unwrap(), Some("v".to_string()));
        assert_eq!(incr.single().await.unwrap(), 7);
        assert_eq!(conn.stats().flushes.load(Ordering::Relaxed), 1);
        assert_eq!(conn.stats().replies_received.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_no_bytes_until_flush() {
        let (conn, mut server) = connect(manual_flush());
        assert!(!conn.is_auto_flush());

        let first = conn.ping().unwrap();
        let second = conn.ping().unwrap();
        expect_silence(&mut server).await;
        assert_eq!(conn.stats().bytes_written.load(Ordering::Relaxed), 0);

        conn.flush_commands();
        expect_frames(&mut server, b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n").await;
        server.write_all(b"+PONG\r\n+PONG\r\n").await.unwrap();

        assert_eq!(first.single().await.unwrap(), "PONG");
        assert_eq!(second.single().await.unwrap(), "PONG");
    }

    #[tokio::test]
    async fn test_reenabling_auto_flush_sends_backlog_on_next_dispatch() {
        let (conn, mut server) = connect(manual_flush());

        let queued = conn.ping().unwrap();
        conn.set_auto_flush_commands(true);
        expect_silence(&mut server).await;

        let echoed = conn.echo("hi").unwrap();
        expect_frames(
            &mut server,
            b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n",
        )
        .await;
        server.write_all(b"+PONG\r\n$2\r\nhi\r\n").await.unwrap();

        assert_eq!(queued.single().await.unwrap(), "PONG");
        assert_eq!(echoed.single().await.unwrap(), Some("hi".to_string()));
    }

    #[tokio::test]
    async fn test_flush_with_empty_queue_is_noop() {
        let (conn, mut server) = connect(manual_flush());
        conn.flush_commands();
        expect_silence(&mut server).await;
        assert_eq!(conn.stats().flushes.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_cancelled_stream_keeps_siblings_in_order() {
        let (conn, mut server) = connect(manual_flush());

        let first = conn.get("a").unwrap();
        let mut second = conn.get("b").unwrap();
        let third = conn.get("c").unwrap();
        conn.flush_commands();
        second.cancel();

        expect_frames(
            &mut server,
            b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n*2\r\n$3\r\nGET\r\n$1\r\nb\r\n*2\r\n$3\r\nGET\r\n$1\r\nc\r\n",
        )
        .await;
        server
            .write_all(b"$2\r\nva\r\n$2\r\nvb\r\n$2\r\nvc\r\n")
            .await
            .unwrap();

        assert_eq!(first.single().await.unwrap(), Some("va".to_string()));
        assert_eq!(third.single().await.unwrap(), Some("vc".to_string()));
        assert!(second.try_next().is_none());
    }

    #[tokio::test]
    async fn test_dropped_stream_keeps_siblings_in_order() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let first = conn.incr("a").unwrap();
        drop(conn.incr("b").unwrap());
        let third = conn.incr("c").unwrap();

        server.write_all(b":1\r\n:2\r\n:3\r\n").await.unwrap();
        assert_eq!(first.single().await.unwrap(), 1);
        assert_eq!(third.single().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_decode_error_is_isolated() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let wrong = conn.dispatch(CommandType::Ping, IntegerOutput).unwrap();
        let right = conn.dispatch(CommandType::Ping, StatusOutput).unwrap();
        server.write_all(b"+PONG\r\n+PONG\r\n").await.unwrap();

        assert_eq!(
            wrong.single().await,
            Err(CommandError::Decode(DecodeError::UnexpectedType {
                expected: "integer",
                found: "simple string",
            }))
        );
        assert_eq!(right.single().await.unwrap(), "PONG");
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn test_server_error_is_isolated() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let failing = conn.incr("text").unwrap();
        let next = conn.incr("n").unwrap();
        server
            .write_all(b"-ERR value is not an integer\r\n:1\r\n")
            .await
            .unwrap();

        assert_eq!(
            failing.single().await,
            Err(CommandError::Server("ERR value is not an integer".to_string()))
        );
        assert_eq!(next.single().await.unwrap(), 1);
    }

    /// Sums two integer frames into one value.
    #[derive(Default)]
    struct TwoFrames {
        seen: usize,
        total: i64,
    }

    impl OutputDecoder for TwoFrames {
        type Item = i64;

        fn decode(&mut self, reply: RespValue) -> Result<Decoded<i64>, DecodeError> {
            self.seen += 1;
            match reply {
                RespValue::Integer(n) => {
                    self.total += n;
                    if self.seen == 2 {
                        Ok(Decoded::done(self.total))
                    } else {
                        Ok(Decoded::more(Vec::new()))
                    }
                }
                RespValue::SimpleString(s) => Err(DecodeError::Invalid(s)),
                other => Err(DecodeError::Invalid(other.to_string())),
            }
        }

        fn is_complete(&self) -> bool {
            self.seen >= 2
        }
    }

    #[tokio::test]
    async fn test_multi_frame_decoder() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let pair = conn.dispatch("PAIR", TwoFrames::default()).unwrap();
        server.write_all(b":40\r\n:2\r\n").await.unwrap();

        assert_eq!(pair.single().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_decode_error_consumes_remaining_frames() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let mut pair = conn.dispatch("PAIR", TwoFrames::default()).unwrap();
        let next = conn.dispatch(CommandType::Ping, IntegerOutput).unwrap();
        server.write_all(b"+bad\r\n:2\r\n:99\r\n").await.unwrap();

        assert_eq!(
            pair.next().await,
            Some(Err(CommandError::Decode(DecodeError::Invalid("bad".to_string()))))
        );
        assert_eq!(pair.next().await, None);
        assert_eq!(next.single().await.unwrap(), 99);
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn test_server_error_inside_multi_frame_reply() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let mut partial = conn.dispatch("PAIR", TwoFrames::default()).unwrap();
        let rejected = conn.dispatch("PAIR", TwoFrames::default()).unwrap();
        let next = conn.dispatch(CommandType::Ping, IntegerOutput).unwrap();
        server
            .write_all(b":1\r\n-ERR partial\r\n-ERR rejected\r\n:7\r\n")
            .await
            .unwrap();

        assert_eq!(
            partial.next().await,
            Some(Err(CommandError::Server("ERR partial".to_string())))
        );
        assert_eq!(partial.next().await, None);
        assert_eq!(
            rejected.single().await,
            Err(CommandError::Server("ERR rejected".to_string()))
        );
        assert_eq!(next.single().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_error_behind_subscription_goes_to_rejected_command() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let mut messages = conn.subscribe(["news"]).unwrap();
        let get = conn.get("k").unwrap();
        server
            .write_all(
                b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n\
                  -ERR Can't execute 'get'\r\n\
                  *3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n",
            )
            .await
            .unwrap();

        assert_eq!(
            get.single().await,
            Err(CommandError::Server("ERR Can't execute 'get'".to_string()))
        );

        let confirm = messages.next().await.unwrap().unwrap();
        assert_eq!(confirm.into_array().unwrap()[0], RespValue::bulk_string("subscribe"));
        let message = messages.next().await.unwrap().unwrap();
        assert_eq!(message.into_array().unwrap()[2], RespValue::bulk_string("hello"));
        assert!(conn.is_open());
        assert_eq!(conn.in_flight_commands(), 0);
    }

    #[tokio::test]
    async fn test_close_skips_buffered_replies() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let mut messages = conn.subscribe(["news"]).unwrap();
        server
            .write_all(b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n")
            .await
            .unwrap();
        assert!(messages.next().await.unwrap().is_ok());

        // Arrives together with the shutdown signal.
        server
            .write_all(b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n")
            .await
            .unwrap();
        conn.close();

        assert_eq!(messages.next().await, Some(Err(CommandError::Closed)));
        assert_eq!(messages.next().await, None);
    }

    #[tokio::test]
    async fn test_encode_error_leaves_queue_untouched() {
        let (client, _server) = tokio::io::duplex(1024);
        let conn = Connection::new(client, StringCodec::new(Charset::Latin1), manual_flush());

        let err = conn.set("price", "5€").unwrap_err();
        assert!(matches!(err, CommandError::Encode(CodecError::Unmappable { ch: '€', .. })));
        assert_eq!(conn.queued_commands(), 0);

        let ok = conn.set("price", "5£").unwrap();
        assert_eq!(ok.sequence(), 0);
        assert_eq!(conn.queued_commands(), 1);
    }

    #[tokio::test]
    async fn test_server_disconnect_fails_in_flight() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let waiting = conn.ping().unwrap();
        expect_frames(&mut server, b"*1\r\n$4\r\nPING\r\n").await;
        drop(server);

        assert_eq!(waiting.single().await, Err(CommandError::Closed));
        assert!(!conn.is_open());

        let late = conn.ping().unwrap();
        assert_eq!(late.single().await, Err(CommandError::Closed));
        conn.flush_commands();
    }

    #[tokio::test]
    async fn test_close_fails_queued_and_in_flight() {
        let (conn, mut server) = connect(manual_flush());

        let sent = conn.ping().unwrap();
        conn.flush_commands();
        expect_frames(&mut server, b"*1\r\n$4\r\nPING\r\n").await;
        let queued = conn.ping().unwrap();

        conn.close();
        assert!(!conn.is_open());
        assert_eq!(sent.single().await, Err(CommandError::Closed));
        assert_eq!(queued.single().await, Err(CommandError::Closed));

        // The writer shuts its half down.
        let mut rest = Vec::new();
        timeout(WAIT, server.read_to_end(&mut rest)).await.unwrap().unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_write_error_fails_queued_and_in_flight() {
        let mock = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))
            .wait(Duration::from_secs(60))
            .build();
        let conn = Connection::new(mock, StringCodec::utf8(), manual_flush());

        let first = conn.ping().unwrap();
        let second = conn.incr("hits").unwrap();
        conn.flush_commands();
        let queued = conn.get("k").unwrap();
        assert_eq!(conn.in_flight_commands(), 2);
        assert_eq!(conn.queued_commands(), 1);

        let reset = CommandError::Io("connection reset".to_string());
        assert_eq!(first.single().await, Err(reset.clone()));
        assert_eq!(second.single().await, Err(reset.clone()));
        assert_eq!(queued.single().await, Err(reset));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_reply_buffer_limit() {
        let (conn, mut server) = connect(ConnectionConfig {
            max_reply_buffer: 16,
            ..ConnectionConfig::default()
        });

        let big = conn.get("big").unwrap();
        let behind = conn.ping().unwrap();
        server.write_all(b"$100\r\n").await.unwrap();
        server.write_all(&[b'x'; 20]).await.unwrap();

        let limit = CommandError::Protocol("reply buffer limit exceeded".to_string());
        assert_eq!(timeout(WAIT, big.single()).await.unwrap(), Err(limit.clone()));
        assert_eq!(behind.single().await, Err(limit));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_corrupt_reply_fails_everything() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let first = conn.ping().unwrap();
        let second = conn.ping().unwrap();
        server.write_all(b"?garbage\r\n").await.unwrap();

        assert!(matches!(first.single().await, Err(CommandError::Protocol(_))));
        assert!(matches!(second.single().await, Err(CommandError::Protocol(_))));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_unsolicited_reply_is_protocol_error() {
        let (conn, mut server) = connect(ConnectionConfig::default());
        server.write_all(b"+OK\r\n").await.unwrap();

        timeout(WAIT, async {
            while conn.is_open() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_push_stream_holds_the_head_of_the_queue() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let mut messages = conn.subscribe(["news"]).unwrap();
        let behind = conn.ping().unwrap();
        server
            .write_all(
                b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n\
                  *3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n",
            )
            .await
            .unwrap();

        let confirm = messages.next().await.unwrap().unwrap();
        assert_eq!(confirm.into_array().unwrap()[0], RespValue::bulk_string("subscribe"));
        let message = messages.next().await.unwrap().unwrap();
        assert_eq!(message.into_array().unwrap()[2], RespValue::bulk_string("hello"));

        conn.close();
        assert_eq!(messages.next().await, Some(Err(CommandError::Closed)));
        assert_eq!(behind.single().await, Err(CommandError::Closed));
    }

    #[tokio::test]
    async fn test_concurrent_callers_get_their_own_replies() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let conn = Arc::new(Connection::new(
            client,
            StringCodec::utf8(),
            ConnectionConfig::default(),
        ));

        // Answers every command with its arrival index.
        tokio::spawn(async move {
            let mut buf = BytesMut::new();
            let mut parser = RespParser::new();
            let mut index = 0i64;
            loop {
                while let Ok(Some((_, consumed))) = parser.parse(&buf) {
                    let _ = buf.split_to(consumed);
                    let reply = RespValue::Integer(index).serialize();
                    index += 1;
                    if server.write_all(&reply).await.is_err() {
                        return;
                    }
                }
                match server.read_buf(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        });

        let mut callers = Vec::new();
        for caller in 0..8 {
            let conn = Arc::clone(&conn);
            callers.push(tokio::spawn(async move {
                let streams: Vec<_> = (0..50)
                    .map(|i| conn.incr(format!("counter:{caller}:{i}")).unwrap())
                    .collect();
                for stream in streams {
                    let sequence = stream.sequence() as i64;
                    assert_eq!(stream.single().await.unwrap(), sequence);
                }
            }));
        }

        for caller in callers {
            timeout(WAIT, caller).await.unwrap().unwrap();
        }
        assert_eq!(conn.stats().commands_dispatched.load(Ordering::Relaxed), 400);
    }

    #[tokio::test]
    async fn test_collect_multi_value_stream() {
        let (conn, mut server) = connect(ConnectionConfig::default());

        let values = conn
            .dispatch_with_args(
                CommandType::Mget,
                crate::command::ValueStreamOutput::new(Arc::clone(conn.codec())),
                CommandArgs::new().add_keys(["a", "b", "c"]),
            )
            .unwrap();
        server
            .write_all(b"*3\r\n$1\r\n1\r\n$-1\r\n$1\r\n3\r\n")
            .await
            .unwrap();

        assert_eq!(
            values.collect().await.unwrap(),
            vec![Some("1".to_string()), None, Some("3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_raw_keyword_dispatch() {
        let (conn, mut server) = connect(ConnectionConfig::default());
        let raw = conn.dispatch("TIME", crate::command::RawOutput).unwrap();

        expect_frames(&mut server, b"*1\r\n$4\r\nTIME\r\n").await;
        server
            .write_all(b"*2\r\n$10\r\n1700000000\r\n$1\r\n5\r\n")
            .await
            .unwrap();

        let reply = raw.single().await.unwrap();
        assert_eq!(reply.into_array().unwrap().len(), 2);
    }

    #[test]
    fn test_blocking_adapter() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (conn, mut server) = runtime.block_on(async { connect(ConnectionConfig::default()) });

        let pong = runtime.block_on(async { conn.ping().unwrap() });
        runtime.spawn(async move {
            let mut frame = [0u8; 14];
            server.read_exact(&mut frame).await.unwrap();
            server.write_all(b"+PONG\r\n").await.unwrap();
            // Keep the transport open until the test finishes.
            tokio::time::sleep(WAIT).await;
        });

        assert_eq!(pong.blocking_single().unwrap(), "PONG");
        drop(conn);
    }

    #[tokio::test]
    async fn test_push_output_type() {
        // Compile-time check that PushOutput items flow through dispatch.
        let (conn, _server) = connect(manual_flush());
        let stream: ResultStream<RespValue> = conn.dispatch(CommandType::Subscribe, PushOutput).unwrap();
        assert_eq!(stream.sequence(), 0);
    }
}
