//! MIDI output destinations.
//!
//! The scheduler only needs somewhere to put 3-byte messages. `MidirSink`
//! talks to a real port via ALSA/CoreMIDI; the channel and recording sinks
//! are for embedding and tests.

use std::sync::{Arc, Mutex};

use midir::{MidiOutput, MidiOutputConnection};
use tokio::sync::mpsc;
use tracing::info;

/// Control Change 123.
pub const ALL_NOTES_OFF: u8 = 123;

/// Error type for MIDI operations
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("Failed to initialize MIDI: {0}")]
    InitFailed(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Receiver of outgoing MIDI messages.
pub trait MidiSink: Send {
    fn send(&mut self, message: [u8; 3]) -> Result<(), MidiError>;
}

impl<S: MidiSink + ?Sized> MidiSink for Box<S> {
    fn send(&mut self, message: [u8; 3]) -> Result<(), MidiError> {
        (**self).send(message)
    }
}

/// CC123 for channels 0..16, in channel order.
pub fn all_notes_off_messages() -> impl Iterator<Item = [u8; 3]> {
    (0..16u8).map(|channel| [0xB0 | channel, ALL_NOTES_OFF, 0])
}

/// Information about a discovered MIDI port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiPortInfo {
    /// Port index (for midir connection)
    pub index: usize,
    pub name: String,
}

/// List available MIDI output ports
pub fn list_output_ports(client_name: &str) -> Result<Vec<MidiPortInfo>, MidiError> {
    let midi_out =
        MidiOutput::new(client_name).map_err(|e| MidiError::InitFailed(e.to_string()))?;

    let ports: Vec<MidiPortInfo> = midi_out
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(i, port)| {
            midi_out
                .port_name(port)
                .ok()
                .map(|name| MidiPortInfo { index: i, name })
        })
        .collect();

    Ok(ports)
}

/// Output connection opened through midir.
pub struct MidirSink {
    connection: Option<MidiOutputConnection>,
    pub port_name: String,
    pub messages_sent: u64,
}

impl MidirSink {
    /// Open the first output port whose name contains `port_pattern`.
    /// An empty pattern picks the first port.
    pub fn open(port_pattern: &str, client_name: &str) -> Result<Self, MidiError> {
        let midi_out =
            MidiOutput::new(client_name).map_err(|e| MidiError::InitFailed(e.to_string()))?;

        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|n| n.contains(port_pattern))
                    .unwrap_or(false)
            })
            .ok_or_else(|| MidiError::PortNotFound(port_pattern.to_string()))?;

        let port_name = midi_out
            .port_name(port)
            .map_err(|e| MidiError::ConnectionFailed(e.to_string()))?;

        let connection = midi_out
            .connect(port, &format!("{client_name}-output"))
            .map_err(|e| MidiError::ConnectionFailed(e.to_string()))?;

        info!(port = %port_name, "opened MIDI output");

        Ok(Self {
            connection: Some(connection),
            port_name,
            messages_sent: 0,
        })
    }

    pub fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
            info!(port = %self.port_name, "closed MIDI output");
        }
    }
}

impl MidiSink for MidirSink {
    fn send(&mut self, message: [u8; 3]) -> Result<(), MidiError> {
        let Some(conn) = self.connection.as_mut() else {
            return Err(MidiError::SendFailed("Connection closed".to_string()));
        };
        conn.send(&message)
            .map_err(|e| MidiError::SendFailed(e.to_string()))?;
        self.messages_sent += 1;
        Ok(())
    }
}

impl Drop for MidirSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Forwards messages into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<[u8; 3]>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<[u8; 3]>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MidiSink for ChannelSink {
    fn send(&mut self, message: [u8; 3]) -> Result<(), MidiError> {
        self.tx
            .send(message)
            .map_err(|_| MidiError::SendFailed("receiver dropped".to_string()))
    }
}

/// Keeps every message. Clones share one log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<[u8; 3]>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<[u8; 3]> {
        match self.log.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.log.lock() {
            Ok(mut log) => log.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl MidiSink for RecordingSink {
    fn send(&mut self, message: [u8; 3]) -> Result<(), MidiError> {
        match self.log.lock() {
            Ok(mut log) => log.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_notes_off_covers_every_channel() {
        let messages: Vec<_> = all_notes_off_messages().collect();
        assert_eq!(messages.len(), 16);
        assert_eq!(messages[0], [0xB0, 123, 0]);
        assert_eq!(messages[15], [0xBF, 123, 0]);
    }

    #[test]
    fn recording_sink_clones_share_log() {
        let sink = RecordingSink::new();
        let mut writer = sink.clone();
        writer.send([0x90, 60, 100]).unwrap();
        writer.send([0x80, 60, 0]).unwrap();
        assert_eq!(sink.messages(), vec![[0x90, 60, 100], [0x80, 60, 0]]);
        sink.clear();
        assert!(writer.messages().is_empty());
    }

    #[test]
    fn channel_sink_forwards_and_reports_closed_receiver() {
        let (mut sink, mut rx) = ChannelSink::new();
        sink.send([0xB0, 7, 100]).unwrap();
        assert_eq!(tokio_test::block_on(rx.recv()), Some([0xB0, 7, 100]));
        drop(rx);
        assert!(matches!(
            sink.send([0xB0, 7, 0]),
            Err(MidiError::SendFailed(_))
        ));
    }
}
