use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use tracing::{debug, info, trace, warn};

use crate::message::MidiMessage;
use crate::sink::OutputSink;
use crate::{Channel, Millis};

const CLIENT_NAME: &str = "polytune";
/// Upper bound on a single dispatcher sleep.
const MAX_WAIT_SECS: f64 = 60.0;

/// Enumerate available output port names.
pub fn list_output_ports() -> anyhow::Result<Vec<String>> {
    let output = MidiOutput::new(CLIENT_NAME).context("initialise midir for enumeration")?;
    let mut names = Vec::new();
    for (index, port) in output.ports().into_iter().enumerate() {
        let name = output
            .port_name(&port)
            .unwrap_or_else(|_| format!("Port {index}"));
        names.push(name);
    }
    Ok(names)
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    due: Millis,
    seq: u64,
    bytes: [u8; 3],
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .total_cmp(&other.due)
            .then(self.seq.cmp(&other.seq))
    }
}

enum Command {
    At(Pending),
    Now(Vec<[u8; 3]>),
    Clear,
    /// Send what is left at its due time, then stop.
    Finish,
    /// Silence everything and stop.
    Shutdown,
}

/// Output sink writing to a `midir` port.
///
/// Timed messages are held by a dispatcher thread and sent when due.
pub struct MidirSink {
    name: Arc<str>,
    epoch: Instant,
    seq: u64,
    tx: Sender<Command>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MidirSink {
    /// Open an output port by index.
    pub fn open_index(port_index: usize) -> anyhow::Result<Self> {
        let output = MidiOutput::new(CLIENT_NAME).context("initialise midir for output")?;
        let ports: Vec<MidiOutputPort> = output.ports();
        let Some(port) = ports.get(port_index) else {
            anyhow::bail!("midi port index out of range");
        };
        let name = output
            .port_name(port)
            .unwrap_or_else(|_| format!("Port {port_index}"));
        let connection = output
            .connect(port, "polytune-out")
            .map_err(|err| anyhow::anyhow!("failed to open MIDI output: {err}"))?;
        Self::spawn(name, connection)
    }

    /// Open the first output port whose name contains `needle`.
    pub fn open_named(needle: &str) -> anyhow::Result<Self> {
        let ports = list_output_ports()?;
        let index = ports
            .iter()
            .position(|name| name.contains(needle))
            .with_context(|| format!("no MIDI output port matching {needle:?}"))?;
        Self::open_index(index)
    }

    fn spawn(name: String, connection: MidiOutputConnection) -> anyhow::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let epoch = Instant::now();
        let handle = thread::Builder::new()
            .name("polytune-midi-out".into())
            .spawn(move || {
                let mut connection = connection;
                dispatch(|bytes| write(&mut connection, bytes), &rx, epoch);
                connection.close();
            })?;
        info!(port = %name, "opened MIDI output");
        Ok(Self {
            name: name.into(),
            epoch,
            seq: 0,
            tx,
            thread: Some(handle),
        })
    }

    /// Name of the connected port.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for every queued message to be sent, then close the port.
    pub fn finish(mut self) -> anyhow::Result<()> {
        let _ = self.tx.send(Command::Finish);
        if let Some(handle) = self.thread.take() {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("MIDI dispatcher thread panicked"))?;
        }
        Ok(())
    }

    fn at(&mut self, due: Millis, message: MidiMessage) {
        self.seq += 1;
        let pending = Pending {
            due,
            seq: self.seq,
            bytes: message.to_bytes(),
        };
        if self.tx.send(Command::At(pending)).is_err() {
            warn!("MIDI dispatcher stopped, dropping message");
        }
    }

    fn now_send(&self, messages: impl IntoIterator<Item = MidiMessage>) {
        let bytes = messages.into_iter().map(|m| m.to_bytes()).collect();
        if self.tx.send(Command::Now(bytes)).is_err() {
            warn!("MIDI dispatcher stopped, dropping message");
        }
    }
}

impl OutputSink for MidirSink {
    fn now(&self) -> Millis {
        millis_since(self.epoch)
    }

    fn set_pitch_bend_range(&mut self, channel: Channel, semitones: u8, cents: u8) {
        self.now_send(MidiMessage::pitch_bend_range(channel, semitones, cents));
    }

    fn set_pitch_bend(&mut self, channel: Channel, value: f64, time: Millis) {
        self.at(time, MidiMessage::pitch_bend(channel, value));
    }

    fn note_on(&mut self, channel: Channel, note: u8, velocity: u8, time: Millis) {
        self.at(
            time,
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            },
        );
    }

    fn note_off(&mut self, channel: Channel, note: u8, velocity: u8, time: Millis) {
        self.at(
            time,
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            },
        );
    }

    fn clear(&mut self) {
        let _ = self.tx.send(Command::Clear);
    }

    fn all_notes_off(&mut self) {
        self.now_send((0..16).map(MidiMessage::all_notes_off));
    }
}

impl Drop for MidirSink {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn millis_since(epoch: Instant) -> Millis {
    epoch.elapsed().as_secs_f64() * 1000.0
}

fn write(connection: &mut MidiOutputConnection, bytes: &[u8; 3]) {
    trace!(?bytes, "midi out");
    if let Err(err) = connection.send(bytes) {
        warn!(%err, "failed to send MIDI message");
    }
}

/// Run the timed queue until `Finish` drains it, `Shutdown` arrives or the
/// sender goes away.
fn dispatch(mut send: impl FnMut(&[u8; 3]), rx: &Receiver<Command>, epoch: Instant) {
    let mut queue: BinaryHeap<Reverse<Pending>> = BinaryHeap::new();
    let mut finishing = false;
    loop {
        let next_due = queue.peek().map(|Reverse(next)| next.due);
        let command = match next_due {
            Some(due) => {
                let wait = due - millis_since(epoch);
                if wait <= 0.0 {
                    if let Some(Reverse(pending)) = queue.pop() {
                        send(&pending.bytes);
                    }
                    continue;
                }
                rx.recv_timeout(Duration::from_secs_f64((wait / 1000.0).min(MAX_WAIT_SECS)))
            }
            None if finishing => break,
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match command {
            Ok(Command::At(pending)) => queue.push(Reverse(pending)),
            Ok(Command::Now(messages)) => {
                for bytes in &messages {
                    send(bytes);
                }
            }
            Ok(Command::Clear) => {
                debug!(dropped = queue.len(), "cleared pending MIDI output");
                queue.clear();
            }
            Ok(Command::Finish) => finishing = true,
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                for channel in 0..16 {
                    send(&MidiMessage::all_notes_off(channel).to_bytes());
                }
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}
