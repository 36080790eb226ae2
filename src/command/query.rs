use crate::command::{op, Command, Outcome};
use crate::error::{protocol_err, Error, Result};
use crate::io::Packet;
use crate::protocol::{Capabilities, ColumnCount, ColumnDefinition, ResponsePacket, TextRow};

enum Phase {
    /// Waiting for the first response packet, which decides everything.
    AwaitingFirst,
    /// Consuming column-definition packets; `received` counts how many of
    /// `expected` have arrived so far.
    ReadingColumns {
        expected: u64,
        received: u64,
        defs: Vec<ColumnDefinition>,
    },
    /// Column definitions are complete and the terminating EOF for that
    /// phase has arrived; now consuming row packets until the final EOF (or
    /// an `ErrPacket` at the row position).
    ReadingRows {
        columns: Vec<ColumnDefinition>,
        rows: Vec<TextRow>,
    },
    Done,
}

/// `QueryCommand` (§4.C "QueryCommand specifics"). Request is `0x03` + the
/// SQL text; the first response packet decides whether this is a DML/DDL OK,
/// a server error, a rejected LOCAL INFILE request, or the start of a text
/// result-set.
pub struct QueryCommand {
    sql: Box<str>,
    capabilities: Capabilities,
    phase: Phase,
    outcome: Option<Result<Outcome>>,
}

impl QueryCommand {
    pub fn new(sql: impl Into<Box<str>>, capabilities: Capabilities) -> Self {
        QueryCommand {
            sql: sql.into(),
            capabilities,
            phase: Phase::AwaitingFirst,
            outcome: None,
        }
    }
}

impl Command for QueryCommand {
    fn request(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.sql.len());
        buf.push(op::QUERY);
        buf.extend_from_slice(self.sql.as_bytes());
        buf
    }

    fn accept(&mut self, packet: &Packet) -> Result<bool> {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::AwaitingFirst => self.accept_first(packet),

            Phase::ReadingColumns {
                expected,
                received,
                mut defs,
            } => {
                if received < expected {
                    let def = ColumnDefinition::decode(&packet.payload)?;
                    defs.push(def);
                    // `received == expected` now means "next packet must be
                    // the post-columns EOF" -- still the same phase variant.
                    self.phase = Phase::ReadingColumns {
                        expected,
                        received: received + 1,
                        defs,
                    };
                    Ok(false)
                } else {
                    match ResponsePacket::classify(packet, self.capabilities)? {
                        ResponsePacket::Eof => {
                            self.phase = Phase::ReadingRows {
                                columns: defs,
                                rows: Vec::new(),
                            };
                            Ok(false)
                        }
                        other => Err(protocol_err!(
                            "expected EOF after column definitions, got {:?}",
                            other
                        )),
                    }
                }
            }

            Phase::ReadingRows { columns, mut rows } => {
                match ResponsePacket::classify(packet, self.capabilities) {
                    Ok(ResponsePacket::Eof) => {
                        let status = crate::protocol::EofPacket::decode(&packet.payload)?.status;
                        self.outcome = Some(Ok(Outcome::ResultSet {
                            columns,
                            rows,
                            status,
                        }));
                        Ok(true)
                    }
                    Ok(ResponsePacket::Error(err)) => {
                        self.outcome = Some(Err(err.into_error()));
                        Ok(true)
                    }
                    _ => {
                        let row = TextRow::decode(&packet.payload, columns.len())?;
                        rows.push(row);
                        self.phase = Phase::ReadingRows { columns, rows };
                        Ok(false)
                    }
                }
            }

            Phase::Done => Err(protocol_err!(
                "received a packet after QueryCommand already completed"
            )),
        }
    }

    fn finish(self: Box<Self>) -> Result<Outcome> {
        self.outcome
            .unwrap_or_else(|| Err(Error::illegal_state("query completed without an outcome")))
    }
}

impl QueryCommand {
    fn accept_first(&mut self, packet: &Packet) -> Result<bool> {
        match ResponsePacket::classify(packet, self.capabilities)? {
            ResponsePacket::Ok(ok) => {
                self.outcome = Some(Ok(Outcome::Done {
                    affected_rows: ok.affected_rows,
                    last_insert_id: ok.last_insert_id,
                    status: ok.status,
                }));
                Ok(true)
            }
            ResponsePacket::Error(err) => {
                self.outcome = Some(Err(err.into_error()));
                Ok(true)
            }
            ResponsePacket::LocalInfile => Err(Error::UnsupportedFeature("LOCAL INFILE")),
            ResponsePacket::Eof => Err(protocol_err!(
                "unexpected EOF as the first response to a query"
            )),
            ResponsePacket::Other => {
                let count = ColumnCount::decode(&packet.payload)?.columns;
                if count == 0 {
                    self.phase = Phase::ReadingRows {
                        columns: Vec::new(),
                        rows: Vec::new(),
                    };
                } else {
                    self.phase = Phase::ReadingColumns {
                        expected: count,
                        received: 0,
                        defs: Vec::with_capacity(count as usize),
                    };
                }
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::BufMutExt;

    fn ok_packet(affected_rows: u64) -> Packet {
        let mut payload = Vec::new();
        payload.put_u8(0x00);
        payload.put_uint_lenenc(affected_rows);
        payload.put_uint_lenenc(0);
        payload.put_u16(2);
        payload.put_u16(0);
        Packet {
            sequence_id: 1,
            payload: payload.into_boxed_slice(),
        }
    }

    fn eof_packet() -> Packet {
        Packet {
            sequence_id: 0,
            payload: vec![0xFE, 0x00, 0x00, 0x02, 0x00].into_boxed_slice(),
        }
    }

    fn column_count_packet(n: u64) -> Packet {
        let mut payload = Vec::new();
        payload.put_uint_lenenc(n);
        Packet {
            sequence_id: 1,
            payload: payload.into_boxed_slice(),
        }
    }

    fn column_def_packet(name: &str) -> Packet {
        let mut payload = Vec::new();
        payload.put_str_lenenc("def");
        payload.put_str_lenenc("test");
        payload.put_str_lenenc("t");
        payload.put_str_lenenc("t");
        payload.put_str_lenenc(name);
        payload.put_str_lenenc(name);
        payload.put_uint_lenenc(0x0c);
        payload.put_u16(45);
        payload.put_u32(20);
        payload.put_u8(crate::protocol::TypeId::VAR_STRING.0);
        payload.put_u16(0);
        payload.put_u8(0);
        Packet {
            sequence_id: 2,
            payload: payload.into_boxed_slice(),
        }
    }

    fn row_packet(value: &str) -> Packet {
        let mut payload = Vec::new();
        payload.put_str_lenenc(value);
        Packet {
            sequence_id: 4,
            payload: payload.into_boxed_slice(),
        }
    }

    #[test]
    fn update_completes_on_a_single_ok() {
        let mut cmd = QueryCommand::new("UPDATE t SET x=1", Capabilities::PROTOCOL_41);
        assert!(cmd.accept(&ok_packet(3)).unwrap());
        match Box::new(cmd).finish().unwrap() {
            Outcome::Done { affected_rows, .. } => assert_eq!(affected_rows, 3),
            _ => panic!("expected Outcome::Done"),
        }
    }

    #[test]
    fn select_yields_a_full_result_set_after_two_eofs() {
        let mut cmd = QueryCommand::new("SELECT 1 AS n", Capabilities::PROTOCOL_41);

        assert!(!cmd.accept(&column_count_packet(1)).unwrap());
        assert!(!cmd.accept(&column_def_packet("n")).unwrap());
        assert!(!cmd.accept(&eof_packet()).unwrap());
        assert!(!cmd.accept(&row_packet("1")).unwrap());
        assert!(cmd.accept(&eof_packet()).unwrap());

        match Box::new(cmd).finish().unwrap() {
            Outcome::ResultSet { columns, rows, .. } => {
                assert_eq!(columns.len(), 1);
                assert_eq!(columns[0].name(), "n");
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].columns[0].as_deref(), Some(b"1".as_slice()));
            }
            _ => panic!("expected Outcome::ResultSet"),
        }
    }

    #[test]
    fn error_at_row_position_terminates_the_result_set() {
        let mut cmd = QueryCommand::new("SELECT 1", Capabilities::PROTOCOL_41);
        assert!(!cmd.accept(&column_count_packet(1)).unwrap());
        assert!(!cmd.accept(&column_def_packet("n")).unwrap());
        assert!(!cmd.accept(&eof_packet()).unwrap());

        let err_packet = Packet {
            sequence_id: 4,
            payload: b"\xff\x19\x04#42000boom".to_vec().into_boxed_slice(),
        };
        assert!(cmd.accept(&err_packet).unwrap());
        assert!(matches!(
            Box::new(cmd).finish(),
            Err(Error::MysqlError { code: 1049, .. })
        ));
    }

    #[test]
    fn a_packet_after_completion_is_a_protocol_error() {
        let mut cmd = QueryCommand::new("PING-like", Capabilities::PROTOCOL_41);
        assert!(cmd.accept(&ok_packet(0)).unwrap());
        assert!(cmd.accept(&ok_packet(0)).is_err());
    }
}
