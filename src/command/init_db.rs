use crate::command::{op, Command, Outcome};
use crate::error::{protocol_err, Error, Result};
use crate::io::{BufMutExt, Packet};
use crate::protocol::{Capabilities, ResponsePacket};

/// `InitDatabaseCommand` (§4.C "InitDatabaseCommand specifics"):
/// `COM_INIT_DB` (`USE <schema>`). A single OK or Error response, no
/// result-set phase. The pool never issues this automatically -- callers
/// opt in via `Channel::use_database`.
pub struct InitDatabaseCommand {
    schema: Box<str>,
    capabilities: Capabilities,
    outcome: Option<Result<Outcome>>,
}

impl InitDatabaseCommand {
    pub fn new(schema: impl Into<Box<str>>, capabilities: Capabilities) -> Self {
        InitDatabaseCommand {
            schema: schema.into(),
            capabilities,
            outcome: None,
        }
    }
}

impl Command for InitDatabaseCommand {
    fn request(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.schema.len());
        buf.put_u8(op::INIT_DB);
        buf.put_str(&self.schema);
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
                "USE expected an OK or Error packet, got {:?}",
                other
            )),
        }
    }

    fn finish(self: Box<Self>) -> Result<Outcome> {
        self.outcome
            .unwrap_or_else(|| Err(Error::illegal_state("USE completed without a response")))
    }
}
