//! Connection Channel (§4.D): one TCP connection's full lifecycle --
//! handshake, per-command send, background reader loop, ping heartbeat,
//! fatal-failure notification. Grounded on `sqlx-core`'s
//! `mysql/connection/mod.rs` and `mysql/stream.rs`, reworked from
//! `async fn` + a single task polling a socket into a blocking
//! `std::thread` reader plus a `Mutex`/`Condvar` handoff, since this core has
//! no async runtime (§5 "Implementation substrate").

mod descriptor;

pub use descriptor::ConnectionDescriptor;

use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::command::{Command, InitDatabaseCommand, Outcome, PingCommand, QuitCommand};
use crate::config::ChannelConfig;
use crate::counters::{self, Counters};
use crate::error::{protocol_err, Error, Result};
use crate::io::{PacketReader, PacketWriter, SequenceCounter};
use crate::protocol::{
    scramble_native_password, Capabilities, HandshakeResponse41, HandshakeV10, ResponsePacket,
    ServerStatus,
};

/// Invoked exactly once, the instant a channel transitions to `Broken` for
/// any reason other than an explicit `close()` (§4.D "Any -> Broken",
/// §9 "Cyclic references"). Carries the connection id so the pool can match
/// it back to a slot without the channel ever holding a pointer to the pool.
pub type BrokenCallback = Box<dyn Fn(u32) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Ready,
    Broken,
    Closed,
}

struct SlotState {
    command: Option<Box<dyn Command>>,
    result: Option<Result<Outcome>>,
}

struct Inner {
    command_lock: Mutex<()>,
    phase: Mutex<Phase>,
    slot: Mutex<SlotState>,
    cond: Condvar,
    writer: Mutex<PacketWriter<TcpStream>>,
    control: TcpStream,
    #[allow(dead_code)]
    counters: Arc<Counters>,
    descriptor: ConnectionDescriptor,
    status: Mutex<ServerStatus>,
    last_command_at: Mutex<Instant>,
    on_broken: Mutex<Option<BrokenCallback>>,
    notified: AtomicBool,
    shutdown: AtomicBool,
}

impl Inner {
    fn mark_broken(&self) {
        {
            let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(*phase, Phase::Broken | Phase::Closed) {
                return;
            }
            *phase = Phase::Broken;
        }

        {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            if slot.command.is_some() {
                slot.command = None;
                slot.result = Some(Err(Error::illegal_state(
                    "channel broken while a command was in flight",
                )));
            }
        }
        self.cond.notify_all();

        log::warn!(
            "mysql channel (connection_id={}) marked Broken",
            self.descriptor.connection_id
        );

        if !self.notified.swap(true, Ordering::SeqCst) {
            let callback = self
                .on_broken
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(callback) = callback {
                callback(self.descriptor.connection_id);
            }
        }
    }
}

/// A single TCP connection to a MySQL server, past its handshake and ready
/// to carry one command at a time. Cheap to clone -- clones share the same
/// underlying socket and reader thread (§3 "Pooled connection": the pool
/// owns the channel, acquirers hold a lease to this handle).
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    /// Dials `config.host:config.port`, performs the MySQL handshake, and
    /// spawns the background reader thread (plus a heartbeat thread if
    /// configured). Returns a channel already in `Ready` state.
    pub fn connect(config: &ChannelConfig, on_broken: BrokenCallback) -> Result<Channel> {
        use std::net::ToSocketAddrs;
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                Error::InvalidParameter(
                    format!("cannot resolve {}:{}", config.host, config.port).into(),
                )
            })?;

        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)?;
        stream.set_nodelay(true).ok();

        let counters = counters::counters_for(&config.host, config.database.as_deref().unwrap_or(""));

        // One rolling sequence counter shared by both halves of the socket
        // for this connection's entire life (§3 "Packet"; grounded on the
        // teacher's single `MySqlStream::seq_no` field, `mysql/stream.rs:26`).
        let sequence = SequenceCounter::new();
        let mut reader = PacketReader::new(stream.try_clone()?, counters.clone(), sequence.clone());
        let mut writer = PacketWriter::new(stream.try_clone()?, counters.clone(), sequence);
        let control = stream.try_clone()?;

        log::debug!("connecting to {}:{}", config.host, config.port);

        let handshake_packet = reader
            .read_packet()?
            .ok_or_else(|| Error::illegal_state("connection closed during handshake"))?;
        let handshake = HandshakeV10::decode(&handshake_packet.payload)?;
        handshake.auth_plugin.require_native_password()?;

        let resolved = Capabilities::resolve(handshake.server_capabilities, config.desired_capabilities())
            .ok_or_else(|| {
                Error::illegal_state(
                    "server is missing one of the required capabilities \
                     (PROTOCOL_41, PLUGIN_AUTH, SECURE_CONNECTION)",
                )
            })?;

        let scramble = scramble_native_password(&config.password, &handshake.auth_seed);
        let response = HandshakeResponse41 {
            capabilities: resolved,
            max_packet_size: crate::io::MAX_PAYLOAD_LEN as u32,
            charset: config.charset,
            username: &config.username,
            auth_response: &scramble,
            database: config.database.as_deref(),
            auth_plugin_name: handshake.auth_plugin.name(),
            connect_attrs: &[],
        };
        let mut payload = Vec::new();
        response.encode(&mut payload);

        // The reader already advanced the shared counter past the Handshake
        // V10 packet it just consumed, so the writer picks up the next id in
        // the same sequence with no explicit hand-off required.
        writer.write_packet(&payload)?;

        let reply = reader
            .read_packet()?
            .ok_or_else(|| Error::illegal_state("connection closed while awaiting handshake reply"))?;
        let status = match ResponsePacket::classify(&reply, resolved)? {
            ResponsePacket::Ok(ok) => ok.status,
            ResponsePacket::Error(err) => return Err(err.into_error()),
            other => {
                return Err(protocol_err!(
                    "expected an OK or Error packet to end the handshake, got {:?}",
                    other
                ))
            }
        };

        let descriptor = ConnectionDescriptor {
            connection_id: handshake.connection_id,
            server_version: handshake.server_version,
            server_default_charset: handshake.server_default_charset,
            capabilities: resolved,
            session_charset: config.charset,
            database: config.database.clone().map(Into::into),
        };

        log::debug!(
            "mysql handshake complete: connection_id={}, server_version={}",
            descriptor.connection_id,
            descriptor.server_version
        );

        let inner = Arc::new(Inner {
            command_lock: Mutex::new(()),
            phase: Mutex::new(Phase::Ready),
            slot: Mutex::new(SlotState {
                command: None,
                result: None,
            }),
            cond: Condvar::new(),
            writer: Mutex::new(writer),
            control,
            counters,
            descriptor,
            status: Mutex::new(status),
            last_command_at: Mutex::new(Instant::now()),
            on_broken: Mutex::new(Some(on_broken)),
            notified: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });

        let reader_inner = inner.clone();
        thread::Builder::new()
            .name(format!("naivemysql-reader-{}", inner.descriptor.connection_id))
            .spawn(move || reader_loop(reader_inner, reader))
            .map_err(|err| Error::illegal_state(format!("failed to spawn reader thread: {}", err)))?;

        if let Some(period) = config.ping_period {
            let heartbeat_inner = inner.clone();
            let capabilities = resolved;
            thread::Builder::new()
                .name(format!("naivemysql-heartbeat-{}", heartbeat_inner.descriptor.connection_id))
                .spawn(move || heartbeat_loop(heartbeat_inner, capabilities, period))
                .map_err(|err| Error::illegal_state(format!("failed to spawn heartbeat thread: {}", err)))?;
        }

        Ok(Channel { inner })
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.inner.descriptor
    }

    pub fn connection_id(&self) -> u32 {
        self.inner.descriptor.connection_id
    }

    pub fn status(&self) -> ServerStatus {
        *self.inner.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            *self.inner.phase.lock().unwrap_or_else(|e| e.into_inner()),
            Phase::Ready
        )
    }

    pub fn is_broken(&self) -> bool {
        matches!(
            *self.inner.phase.lock().unwrap_or_else(|e| e.into_inner()),
            Phase::Broken
        )
    }

    /// True while a command is installed and has not yet reached `finish`.
    /// Used by the pool's leak sweeper (§4.E "Leak sweeper") to decide
    /// whether force-reclaiming a leased slot also means the underlying
    /// stream is in an indeterminate state and must be broken.
    pub(crate) fn has_outstanding_command(&self) -> bool {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .command
            .is_some()
    }

    /// Forces this channel into `Broken`, as the leak sweeper does when it
    /// force-reclaims a lease whose command is still executing (§4.E "Leak
    /// sweeper"). Idempotent and safe to call from any thread.
    pub(crate) fn mark_broken(&self) {
        self.inner.mark_broken();
    }

    /// Installs `command` as the channel's sole outstanding command, writes
    /// its request bytes, and blocks the caller up to `timeout` for the
    /// reader thread to drive it to completion (§4.D "Submit-and-wait
    /// contract").
    pub fn submit(&self, command: impl Command + 'static, timeout: Duration) -> Result<Outcome> {
        // Serializes with every other submitter on this channel, including
        // the heartbeat thread -- this *is* the single-command latch
        // (§5 "serialization is enforced by a per-channel single-command
        // latch, not by broad locking").
        let _single = self
            .inner
            .command_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        {
            let phase = self.inner.phase.lock().unwrap_or_else(|e| e.into_inner());
            if !matches!(*phase, Phase::Ready) {
                return Err(Error::illegal_state("channel is not Ready"));
            }
        }

        {
            let slot = self.inner.slot.lock().unwrap_or_else(|e| e.into_inner());
            if slot.command.is_some() {
                return Err(Error::illegal_state(
                    "a previous command is still outstanding on this channel",
                ));
            }
        }

        let boxed: Box<dyn Command> = Box::new(command);
        let request = boxed.request();

        {
            let mut slot = self.inner.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.command = Some(boxed);
            slot.result = None;
        }

        {
            let mut writer = self
                .inner
                .writer
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            // Realigns the shared sequence counter to 0 for this new command
            // exchange; the reader thread picks up the same counter with no
            // separate reset of its own (§3 "resets per new command").
            writer.reset_sequence();
            if let Err(err) = writer.write_packet(&request) {
                drop(writer);
                self.inner.slot.lock().unwrap_or_else(|e| e.into_inner()).command = None;
                self.inner.mark_broken();
                return Err(err);
            }
        }

        *self
            .inner
            .last_command_at
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Instant::now();

        let deadline = Instant::now() + timeout;
        let mut slot = self.inner.slot.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(result) = slot.result.take() {
                if let Ok(outcome) = &result {
                    let status = match outcome {
                        Outcome::Done { status, .. } => Some(*status),
                        Outcome::ResultSet { status, .. } => Some(*status),
                        Outcome::Quit => None,
                    };
                    if let Some(status) = status {
                        *self.inner.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
                    }
                }
                return result;
            }

            let now = Instant::now();
            if now >= deadline {
                // The channel is deliberately NOT broken here -- the owning
                // Pool issues a sibling-channel KILL and breaks this channel
                // itself (§4.D "Submit-and-wait contract").
                return Err(Error::Timeout);
            }

            let (guard, _timed_out) = self
                .inner
                .cond
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            slot = guard;
        }
    }

    /// `USE <schema>` (§4.C "InitDatabaseCommand specifics"). Never called
    /// automatically by the pool; callers opt in explicitly.
    pub fn use_database(&self, schema: &str, timeout: Duration) -> Result<Outcome> {
        self.submit(
            InitDatabaseCommand::new(schema, self.inner.descriptor.capabilities),
            timeout,
        )
    }

    /// Idempotent. Best-effort `COM_QUIT` if the channel is still `Ready`,
    /// then shuts the socket down and stops the background threads
    /// (§4.C "QuitCommand specifics", §4.E "Pool close").
    pub fn close(&self) {
        let was_ready = {
            let mut phase = self.inner.phase.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(*phase, Phase::Closed) {
                return;
            }
            let was_ready = matches!(*phase, Phase::Ready);
            *phase = Phase::Closed;
            was_ready
        };

        if was_ready {
            let _single = self
                .inner
                .command_lock
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let mut writer = self
                .inner
                .writer
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            writer.reset_sequence();
            let _ = writer.write_packet(&QuitCommand.request());
        }

        self.inner.shutdown.store(true, Ordering::SeqCst);
        let _ = self.inner.control.shutdown(Shutdown::Both);
        self.inner.cond.notify_all();

        log::debug!(
            "mysql channel (connection_id={}) closed",
            self.inner.descriptor.connection_id
        );
    }
}

fn reader_loop(inner: Arc<Inner>, mut reader: PacketReader<TcpStream>) {
    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            return;
        }

        // The writer resets the shared `SequenceCounter` at the start of
        // every new command exchange (`submit`); the reader's own clone of
        // that counter follows along automatically, so there is nothing to
        // realign here.
        let packet = match reader.read_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                inner.mark_broken();
                return;
            }
            Err(_err) => {
                inner.mark_broken();
                return;
            }
        };

        let mut slot = inner.slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.command.take() {
            Some(mut command) => match command.accept(&packet) {
                Ok(true) => {
                    let outcome = command.finish();
                    slot.result = Some(outcome);
                    drop(slot);
                    inner.cond.notify_all();
                }
                Ok(false) => {
                    slot.command = Some(command);
                }
                Err(err) => {
                    slot.result = Some(Err(err));
                    drop(slot);
                    inner.cond.notify_all();
                    inner.mark_broken();
                    return;
                }
            },
            None => {
                // An unsolicited packet with no current command (§4.D "Any ->
                // Broken").
                drop(slot);
                inner.mark_broken();
                return;
            }
        }
    }
}

fn heartbeat_loop(inner: Arc<Inner>, capabilities: Capabilities, period: Duration) {
    let poll_interval = period.min(Duration::from_millis(200)).max(Duration::from_millis(10));
    loop {
        thread::sleep(poll_interval);

        if inner.shutdown.load(Ordering::SeqCst) {
            return;
        }
        match *inner.phase.lock().unwrap_or_else(|e| e.into_inner()) {
            Phase::Closed | Phase::Broken => return,
            Phase::Ready => {}
        }

        let idle = Instant::now().duration_since(
            *inner
                .last_command_at
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        );
        if idle < period {
            continue;
        }

        let channel = Channel { inner: inner.clone() };
        log::debug!(
            "mysql channel (connection_id={}) heartbeat",
            inner.descriptor.connection_id
        );
        if channel
            .submit(PingCommand::new(capabilities), Duration::from_secs(5))
            .is_err()
        {
            return; // the failed ping already broke the channel
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::QueryCommand;
    use crate::io::BufMutExt;
    use crate::protocol::TypeId;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// A minimal hand-rolled MySQL-speaking server: one handshake, then a
    /// caller-supplied script of responses to whatever comes next. The
    /// fake-server style used here is standard for driver-level integration
    /// tests that need to exercise the wire protocol without a real server.
    struct FakeServer {
        listener: TcpListener,
    }

    impl FakeServer {
        fn bind() -> Self {
            FakeServer {
                listener: TcpListener::bind("127.0.0.1:0").unwrap(),
            }
        }

        fn addr(&self) -> std::net::SocketAddr {
            self.listener.local_addr().unwrap()
        }

        fn accept(&self) -> TcpStream {
            self.listener.accept().unwrap().0
        }
    }

    fn write_packet(stream: &mut TcpStream, sequence_id: u8, payload: &[u8]) {
        let mut framed = Vec::with_capacity(4 + payload.len());
        framed.push((payload.len() & 0xFF) as u8);
        framed.push(((payload.len() >> 8) & 0xFF) as u8);
        framed.push(((payload.len() >> 16) & 0xFF) as u8);
        framed.push(sequence_id);
        framed.extend_from_slice(payload);
        stream.write_all(&framed).unwrap();
    }

    fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).unwrap();
        let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).unwrap();
        (header[3], payload)
    }

    fn handshake_payload() -> Vec<u8> {
        let mut payload = Vec::new();
        payload.put_u8(10);
        payload.put_str_nul("8.0.18");
        payload.put_u32(7);
        payload.put_bytes(b"01234567");
        payload.put_u8(0);
        payload.put_u16((Capabilities::required().bits() & 0xFFFF) as u16);
        payload.put_u8(45);
        payload.put_u16(2);
        payload.put_u16(((Capabilities::required().bits() >> 16) & 0xFFFF) as u16);
        payload.put_u8(21);
        payload.put_bytes(&[0u8; 10]);
        payload.put_bytes(b"890123456789\0");
        payload.put_str_nul("mysql_native_password");
        payload
    }

    fn run_fake_handshake(stream: &mut TcpStream) {
        write_packet(stream, 0, &handshake_payload());
        let (_seq, _response) = read_packet(stream);
        let mut ok = Vec::new();
        ok.put_u8(0x00);
        ok.put_uint_lenenc(0);
        ok.put_uint_lenenc(0);
        ok.put_u16(2);
        ok.put_u16(0);
        write_packet(stream, 2, &ok);
    }

    #[test]
    fn connect_performs_a_full_handshake() {
        let server = FakeServer::bind();
        let addr = server.addr();

        let handle = thread::spawn(move || {
            let mut stream = server.accept();
            run_fake_handshake(&mut stream);
            stream
        });

        let config = ChannelConfig::new(addr.ip().to_string(), addr.port())
            .username("root")
            .ping_period(None);
        let channel = Channel::connect(&config, Box::new(|_| {})).unwrap();

        assert!(channel.is_ready());
        assert_eq!(channel.connection_id(), 7);
        assert_eq!(channel.descriptor().server_version.as_ref(), "8.0.18");

        channel.close();
        handle.join().unwrap();
    }

    #[test]
    fn submit_rejects_concurrent_use_of_a_broken_channel() {
        let server = FakeServer::bind();
        let addr = server.addr();

        let handle = thread::spawn(move || {
            let mut stream = server.accept();
            run_fake_handshake(&mut stream);
            drop(stream); // close immediately: next read on the channel sees EOF
        });

        let config = ChannelConfig::new(addr.ip().to_string(), addr.port()).ping_period(None);
        let channel = Channel::connect(&config, Box::new(|_| {})).unwrap();
        handle.join().unwrap();

        // give the reader thread a moment to observe the close and mark Broken
        let deadline = Instant::now() + Duration::from_secs(2);
        while channel.is_ready() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let result = channel.submit(
            QueryCommand::new("SELECT 1", Capabilities::PROTOCOL_41),
            Duration::from_millis(500),
        );
        assert!(matches!(result, Err(Error::IllegalState(_))));
    }

    #[test]
    fn broken_callback_fires_exactly_once() {
        let server = FakeServer::bind();
        let addr = server.addr();

        let handle = thread::spawn(move || {
            let mut stream = server.accept();
            run_fake_handshake(&mut stream);
            drop(stream);
        });

        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = calls.clone();
        let config = ChannelConfig::new(addr.ip().to_string(), addr.port()).ping_period(None);
        let channel = Channel::connect(
            &config,
            Box::new(move |_conn_id| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        handle.join().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        channel.mark_broken();
        channel.mark_broken();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn select_round_trips_through_a_live_channel() {
        let server = FakeServer::bind();
        let addr = server.addr();

        let handle = thread::spawn(move || {
            let mut stream = server.accept();
            run_fake_handshake(&mut stream);

            let (_seq, query) = read_packet(&mut stream);
            assert_eq!(&query[1..], b"SELECT 1 AS n");

            // The client's COM_QUERY reset the shared counter and sent at
            // seq 0, so the server's replies continue at seq 1 (§3 "Packet").
            let mut count = Vec::new();
            count.put_uint_lenenc(1);
            write_packet(&mut stream, 1, &count);

            let mut def = Vec::new();
            def.put_str_lenenc("def");
            def.put_str_lenenc("test");
            def.put_str_lenenc("t");
            def.put_str_lenenc("t");
            def.put_str_lenenc("n");
            def.put_str_lenenc("n");
            def.put_uint_lenenc(0x0c);
            def.put_u16(45);
            def.put_u32(20);
            def.put_u8(TypeId::VAR_STRING.0);
            def.put_u16(0);
            def.put_u8(0);
            write_packet(&mut stream, 2, &def);

            write_packet(&mut stream, 3, &[0xFE, 0x00, 0x00, 0x02, 0x00]);

            let mut row = Vec::new();
            row.put_str_lenenc("1");
            write_packet(&mut stream, 4, &row);

            write_packet(&mut stream, 5, &[0xFE, 0x00, 0x00, 0x02, 0x00]);
        });

        let config = ChannelConfig::new(addr.ip().to_string(), addr.port()).ping_period(None);
        let channel = Channel::connect(&config, Box::new(|_| {})).unwrap();

        let outcome = channel
            .submit(
                QueryCommand::new("SELECT 1 AS n", channel.descriptor().capabilities),
                Duration::from_secs(2),
            )
            .unwrap();

        match outcome {
            Outcome::ResultSet { columns, rows, .. } => {
                assert_eq!(columns.len(), 1);
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].columns[0].as_deref(), Some(b"1".as_slice()));
            }
            _ => panic!("expected a result set"),
        }

        channel.close();
        handle.join().unwrap();
    }
}
