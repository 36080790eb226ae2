//! End-to-end pool tests against a hand-rolled fake MySQL server on a
//! loopback `TcpListener` -- no external MySQL server required. Mirrors the
//! fake-server style used by the crate's own unit tests, but drives
//! everything through the public `naivemysql` API only.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use naivemysql::protocol::Capabilities;
use naivemysql::{ChannelConfig, Outcome, Pool, PoolConfig};

fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
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

fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_str_nul(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn put_str_lenenc(buf: &mut Vec<u8>, s: &str) {
    buf.push(s.len() as u8);
    buf.extend_from_slice(s.as_bytes());
}

fn put_uint_lenenc(buf: &mut Vec<u8>, v: u64) {
    buf.push(v as u8);
}

fn handshake_payload(connection_id: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    put_u8(&mut payload, 10);
    put_str_nul(&mut payload, "8.0.18");
    put_u32(&mut payload, connection_id);
    payload.extend_from_slice(b"01234567");
    put_u8(&mut payload, 0);
    put_u16(&mut payload, (Capabilities::required().bits() & 0xFFFF) as u16);
    put_u8(&mut payload, 45);
    put_u16(&mut payload, 2);
    put_u16(&mut payload, ((Capabilities::required().bits() >> 16) & 0xFFFF) as u16);
    put_u8(&mut payload, 21);
    payload.extend_from_slice(&[0u8; 10]);
    payload.extend_from_slice(b"890123456789\0");
    put_str_nul(&mut payload, "mysql_native_password");
    payload
}

fn ok_payload() -> Vec<u8> {
    let mut ok = Vec::new();
    put_u8(&mut ok, 0x00);
    put_uint_lenenc(&mut ok, 0);
    put_uint_lenenc(&mut ok, 0);
    put_u16(&mut ok, 2);
    put_u16(&mut ok, 0);
    ok
}

fn run_handshake(stream: &mut TcpStream, connection_id: u32) {
    write_packet(stream, 0, &handshake_payload(connection_id));
    let (_seq, _response) = read_packet(stream);
    write_packet(stream, 2, &ok_payload());
}

#[test]
fn acquire_execute_and_release_round_trips_a_select() {
    let (listener, addr) = bind();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        run_handshake(&mut stream, 11);

        let (_seq, query) = read_packet(&mut stream);
        assert_eq!(&query[1..], b"SELECT 1 AS n");

        // The client's COM_QUERY reset the shared counter and sent at seq 0,
        // so the server's replies continue at seq 1 (§3 "Packet").
        let mut count = Vec::new();
        put_uint_lenenc(&mut count, 1);
        write_packet(&mut stream, 1, &count);

        let mut def = Vec::new();
        put_str_lenenc(&mut def, "def");
        put_str_lenenc(&mut def, "test");
        put_str_lenenc(&mut def, "t");
        put_str_lenenc(&mut def, "t");
        put_str_lenenc(&mut def, "n");
        put_str_lenenc(&mut def, "n");
        put_uint_lenenc(&mut def, 0x0c);
        put_u16(&mut def, 45);
        put_u32(&mut def, 20);
        put_u8(&mut def, 0xfd); // VAR_STRING
        put_u16(&mut def, 0);
        put_u8(&mut def, 0);
        write_packet(&mut stream, 2, &def);

        write_packet(&mut stream, 3, &[0xFE, 0x00, 0x00, 0x02, 0x00]);

        let mut row = Vec::new();
        put_str_lenenc(&mut row, "1");
        write_packet(&mut stream, 4, &row);

        write_packet(&mut stream, 5, &[0xFE, 0x00, 0x00, 0x02, 0x00]);
    });

    let channel_config = ChannelConfig::new(addr.ip().to_string(), addr.port())
        .username("root")
        .ping_period(None);
    let pool_config = PoolConfig::new(1).query_timeout(Duration::from_secs(2));
    let pool = Pool::new(channel_config, pool_config).unwrap();

    let lease = pool.acquire().unwrap();
    let outcome = pool.execute(&lease, "SELECT 1 AS n").unwrap();
    match outcome {
        Outcome::ResultSet { columns, rows, .. } => {
            assert_eq!(columns.len(), 1);
            assert_eq!(columns[0].name(), "n");
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].columns[0].as_deref(), Some(b"1".as_slice()));
        }
        _ => panic!("expected a result set"),
    }
    lease.release();

    handle.join().unwrap();
    pool.close();
}

#[test]
fn a_query_that_never_answers_times_out_and_kills_on_a_sibling() {
    let (listener, addr) = bind();

    let kills_seen: std::sync::Arc<std::sync::Mutex<Vec<String>>> =
        std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let kills_seen_server = kills_seen.clone();

    thread::spawn(move || {
        // Two connections come in: the one the stuck query runs on, and the
        // sibling the pool uses to issue the KILL.
        for i in 0u32..2 {
            let (mut stream, _) = listener.accept().unwrap();
            let kills_seen = kills_seen_server.clone();
            thread::spawn(move || {
                run_handshake(&mut stream, 50 + i);
                loop {
                    let mut header = [0u8; 4];
                    if stream.read_exact(&mut header).is_err() {
                        return;
                    }
                    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
                    let mut payload = vec![0u8; len];
                    if stream.read_exact(&mut payload).is_err() {
                        return;
                    }
                    let text = String::from_utf8_lossy(&payload[1..]).into_owned();
                    if text.starts_with("KILL ") {
                        kills_seen.lock().unwrap().push(text);
                        write_packet(&mut stream, header[3].wrapping_add(1), &ok_payload());
                    }
                    // SELECT SLEEP(...) on the first connection is
                    // deliberately never answered -- that's the point.
                }
            });
        }
    });

    let channel_config = ChannelConfig::new(addr.ip().to_string(), addr.port())
        .username("root")
        .ping_period(None);
    let pool_config = PoolConfig::new(2)
        .acquire_timeout(Duration::from_secs(2))
        .query_timeout(Duration::from_millis(200));
    let pool = Pool::new(channel_config, pool_config).unwrap();

    let lease = pool.acquire().unwrap();
    let connection_id = lease.channel().connection_id();
    let result = pool.execute(&lease, "SELECT SLEEP(100)");
    assert!(matches!(result, Err(naivemysql::Error::Timeout)));
    assert!(lease.channel().is_broken());
    lease.release();

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if kills_seen
            .lock()
            .unwrap()
            .iter()
            .any(|k| k == &format!("KILL {}", connection_id))
        {
            break;
        }
        assert!(Instant::now() < deadline, "no KILL observed on the sibling channel");
        thread::sleep(Duration::from_millis(10));
    }

    pool.close();
}

#[test]
fn a_lease_that_is_never_released_is_reclaimed_by_the_leak_sweeper() {
    let (listener, addr) = bind();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        run_handshake(&mut stream, 60);
        loop {
            let mut header = [0u8; 4];
            if stream.read_exact(&mut header).is_err() {
                return;
            }
            let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
            let mut payload = vec![0u8; len];
            if stream.read_exact(&mut payload).is_err() {
                return;
            }
            write_packet(&mut stream, header[3].wrapping_add(1), &ok_payload());
        }
    });

    let channel_config = ChannelConfig::new(addr.ip().to_string(), addr.port())
        .username("root")
        .ping_period(None);
    let pool_config = PoolConfig::new(1)
        .acquire_timeout(Duration::from_millis(500))
        .max_occupancy(Duration::from_millis(50))
        .query_timeout(Duration::from_millis(500));
    let pool = Pool::new(channel_config, pool_config).unwrap();

    let lease = pool.acquire().unwrap();
    std::mem::forget(lease);

    let reclaimed = pool.acquire();
    assert!(reclaimed.is_ok(), "leak sweeper never freed the slot for reuse");
    assert!(pool.counters().pool.leak_count.load(std::sync::atomic::Ordering::Relaxed) >= 1);

    pool.close();
}
