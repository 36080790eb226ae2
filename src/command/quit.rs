use crate::command::{op, Command, Outcome};
use crate::error::{protocol_err, Result};
use crate::io::Packet;

/// `QuitCommand` (§4.C "QuitCommand specifics"): `COM_QUIT`, an empty body.
/// The server closes the socket without responding -- the channel treats
/// this command as complete the instant the request bytes are flushed and
/// never waits on the reader thread for it, so `accept` is never actually
/// invoked in practice.
pub struct QuitCommand;

impl Command for QuitCommand {
    fn request(&self) -> Vec<u8> {
        vec![op::QUIT]
    }

    fn accept(&mut self, _packet: &Packet) -> Result<bool> {
        Err(protocol_err!(
            "QuitCommand does not expect a server response"
        ))
    }

    fn finish(self: Box<Self>) -> Result<Outcome> {
        Ok(Outcome::Quit)
    }
}
