use crate::command::{op, Command, Outcome};
use crate::error::{protocol_err, Error, Result};
use crate::io::{BufMutExt, Packet};
use crate::protocol::{Capabilities, ResponsePacket};

/// `KillCommand` (§4.C "KillCommand specifics"): `KILL <connId>` sent as a
/// plain `COM_QUERY`, issued on a sibling channel; its own completion is
/// independent of the channel it targets.
pub struct KillCommand {
    connection_id: u32,
    capabilities: Capabilities,
    outcome: Option<Result<Outcome>>,
}

impl KillCommand {
    pub fn new(connection_id: u32, capabilities: Capabilities) -> Self {
        KillCommand {
            connection_id,
            capabilities,
            outcome: None,
        }
    }
}

impl Command for KillCommand {
    fn request(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_u8(op::QUERY);
        buf.put_str(&format!("KILL {}", self.connection_id));
        buf
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
                "KILL expected an OK or Error packet, got {:?}",
                other
            )),
        }
    }

    fn finish(self: Box<Self>) -> Result<Outcome> {
        self.outcome
            .unwrap_or_else(|| Err(Error::illegal_state("KILL completed without a response")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_the_connection_id() {
        let cmd = KillCommand::new(42, Capabilities::empty());
        assert_eq!(cmd.request(), b"\x03KILL 42");
    }
}
