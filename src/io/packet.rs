use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::counters::Counters;
use crate::error::{protocol_err, Result};

/// Maximum payload a single packet may carry; §4.A.
pub const MAX_PAYLOAD_LEN: usize = 0x00FF_FFFF;

/// The one rolling sequence id shared by a command exchange's reader and
/// writer halves (§3 "Packet": "a peer increments the sequence identifier
/// for each packet in the same command exchange"). Grounded directly on the
/// teacher's `MySqlStream::seq_no` field (`mysql/stream.rs:26`), which both
/// `write` (`stream.rs:119-120`, stamp-then-increment) and `read`
/// (`stream.rs:140`, `self.seq_no = header.get_u8()?.wrapping_add(1)`) share
/// -- there is exactly one counter per connection, not one per direction.
#[derive(Clone)]
pub struct SequenceCounter(Arc<AtomicU8>);

impl SequenceCounter {
    pub fn new() -> Self {
        SequenceCounter(Arc::new(AtomicU8::new(0)))
    }

    /// Realigns both halves of the exchange to 0 at the start of a new
    /// command (§3 "resets per new command"). Since reader and writer share
    /// this counter, one call from either side is enough.
    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    /// Writer side: returns the id to stamp the next outbound packet with,
    /// then advances past it.
    fn take_for_write(&self) -> u8 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    /// Reader side: validates `observed` against the expected id, then
    /// advances the counter to `observed.wrapping_add(1)` -- mirroring the
    /// teacher's `self.seq_no = header.get_u8()?.wrapping_add(1)`.
    fn check_and_advance(&self, observed: u8) -> Result<()> {
        let expected = self.0.load(Ordering::SeqCst);
        if observed != expected {
            return Err(protocol_err!(
                "packet sequence id out of order: expected {}, got {}",
                expected, observed
            ));
        }
        self.0.store(observed.wrapping_add(1), Ordering::SeqCst);
        Ok(())
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        SequenceCounter::new()
    }
}

/// A single framed MySQL packet: a rolling sequence id plus an immutable
/// payload. The read cursor (§3 "Packet") lives on the `&[u8]` slices
/// borrowed from `payload` by callers, not on this struct itself -- this
/// type just owns the bytes and the id.
#[derive(Debug, Clone)]
pub struct Packet {
    pub sequence_id: u8,
    pub payload: Box<[u8]>,
}

impl Packet {
    pub fn first_byte(&self) -> Option<u8> {
        self.payload.first().copied()
    }
}

/// Reads length-prefixed packets off a socket stream, buffering reads and
/// recording byte-level instrumentation. On EOF mid-header or mid-payload,
/// returns `Ok(None)` (closed), never a partial packet.
pub struct PacketReader<R> {
    inner: io::BufReader<R>,
    counters: Arc<Counters>,
    sequence: SequenceCounter,
}

impl<R: Read> PacketReader<R> {
    pub fn new(inner: R, counters: Arc<Counters>, sequence: SequenceCounter) -> Self {
        PacketReader {
            inner: io::BufReader::with_capacity(8 * 1024, inner),
            counters,
            sequence,
        }
    }

    /// Reads one full packet, or `Ok(None)` if the stream closed cleanly
    /// before a full header/payload arrived.
    pub fn read_packet(&mut self) -> Result<Option<Packet>> {
        let mut header = [0u8; 4];
        if !self.fill_exact(&mut header)? {
            return Ok(None);
        }

        let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let sequence_id = header[3];

        self.sequence.check_and_advance(sequence_id)?;

        let mut payload = vec![0u8; len];
        if len > 0 && !self.fill_exact(&mut payload)? {
            return Ok(None);
        }

        Ok(Some(Packet {
            sequence_id,
            payload: payload.into_boxed_slice(),
        }))
    }

    /// Fills `buf` completely, returning `Ok(false)` on a clean EOF before
    /// any byte of this call was read, and an error on any other failure
    /// (including an EOF that arrives mid-way through `buf`).
    fn fill_exact(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(protocol_err!("connection closed mid-packet"));
            }
            self.counters.io.record_read(n);
            filled += n;
        }
        Ok(true)
    }
}

/// Symmetrical writer: frames a payload with a 3-byte length and 1-byte
/// sequence id, then flushes.
pub struct PacketWriter<W> {
    inner: W,
    counters: Arc<Counters>,
    sequence: SequenceCounter,
}

impl<W: Write> PacketWriter<W> {
    pub fn new(inner: W, counters: Arc<Counters>, sequence: SequenceCounter) -> Self {
        PacketWriter {
            inner,
            counters,
            sequence,
        }
    }

    /// Realigns the shared counter to 0 at the start of a new command
    /// exchange. Equivalent to calling `reset` on the paired `PacketReader`'s
    /// `SequenceCounter` -- both hold a clone of the same counter.
    pub fn reset_sequence(&mut self) {
        self.sequence.reset();
    }

    pub fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(protocol_err!(
                "payload of {} bytes exceeds the maximum single-packet size of {} bytes; \
                 splitting across continuation packets is not supported",
                payload.len(),
                MAX_PAYLOAD_LEN
            ));
        }

        let sequence_id = self.sequence.take_for_write();

        let mut framed = Vec::with_capacity(4 + payload.len());
        framed.push((payload.len() & 0xFF) as u8);
        framed.push(((payload.len() >> 8) & 0xFF) as u8);
        framed.push(((payload.len() >> 16) & 0xFF) as u8);
        framed.push(sequence_id);
        framed.extend_from_slice(payload);

        self.inner.write_all(&framed)?;
        self.inner.flush()?;

        self.counters.io.record_write(framed.len());

        Ok(())
    }
}
