use crate::Result;
use crate::callbacks::Callback;
use crate::llm::Message;
use async_trait::async_trait;
use std::io::Write;

/// Writes a markdown transcript of the conversation, one section per turn.
///
/// Only messages that were not logged before are written. If the history no
/// longer starts with what was already logged, the whole history is written
/// again under a marker.
pub struct MessageLogger<W: Write + Send> {
    logged: Vec<u64>,
    writer: W,
    turn: u32,
}

impl<W: Write + Send> MessageLogger<W> {
    pub fn new(title: &str, mut writer: W) -> Result<Box<Self>> {
        write!(writer, "# {}\n\n", title)?;
        writer.flush()?;

        Ok(Box::new(Self {
            logged: Vec::new(),
            writer,
            turn: 1,
        }))
    }

    fn write_turn(&mut self, messages: &[Message]) -> Result<()> {
        write!(self.writer, "## Turn {}\n\n", self.turn)?;
        for message in messages.iter().filter(|m| !matches!(m, Message::System(_))) {
            write!(self.writer, "{}", message)?;
        }
        Ok(())
    }

    fn extends_logged(&self, hashes: &[u64]) -> bool {
        hashes.starts_with(&self.logged)
    }
}

#[async_trait]
impl<W: Write + Send> Callback for MessageLogger<W> {
    async fn call(&mut self, messages: Vec<Message>) -> Result<Vec<Message>> {
        let hashes = messages.iter().map(Message::get_hash).collect::<Vec<_>>();

        if self.extends_logged(&hashes) {
            self.write_turn(&messages[self.logged.len()..])?;
        } else {
            write!(self.writer, "_history rewritten_\n\n")?;
            self.write_turn(&messages)?;
        }
        self.writer.flush()?;

        self.turn += 1;
        self.logged = hashes;

        Ok(messages)
    }
}
