use crate::command::{op, Command, Outcome};
use crate::error::{protocol_err, Error, Result};
use crate::io::Packet;
use crate::protocol::{Capabilities, OkPacket, ResponsePacket};

/// `PingCommand` (§4.C): `COM_PING`, an empty body, a single OK response and
/// nothing else.
pub struct PingCommand {
    capabilities: Capabilities,
    outcome: Option<Result<Outcome>>,
}

impl PingCommand {
    pub fn new(capabilities: Capabilities) -> Self {
        PingCommand {
            capabilities,
            outcome: None,
        }
    }
}

impl Command for PingCommand {
    fn request(&self) -> Vec<u8> {
        vec![op::PING]
    }

    fn accept(&mut self, packet: &Packet) -> Result<bool> {
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
            other => Err(protocol_err!(
                "PING expected an OK packet, got {:?}",
                other
            )),
        }
    }

    fn finish(self: Box<Self>) -> Result<Outcome> {
        self.outcome
            .unwrap_or_else(|| Err(Error::illegal_state("PING completed without a response")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_request_is_a_single_byte() {
        let cmd = PingCommand::new(Capabilities::empty());
        assert_eq!(cmd.request(), vec![op::PING]);
    }

    #[test]
    fn ping_completes_on_first_ok_packet() {
        let mut cmd = PingCommand::new(Capabilities::PROTOCOL_41);
        let packet = Packet {
            sequence_id: 1,
            payload: vec![0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00].into_boxed_slice(),
        };
        assert!(cmd.accept(&packet).unwrap());
        match Box::new(cmd).finish().unwrap() {
            Outcome::Done { affected_rows, .. } => assert_eq!(affected_rows, 0),
            _ => panic!("expected Outcome::Done"),
        }
    }
}
