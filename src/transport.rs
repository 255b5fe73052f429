use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use crate::circuit::{Circuit, WireId};
use crate::error::{Error, Result};
use crate::garble::{GarbledTable, WireLabel};

/// Address the evaluator listens on.
pub const EVALUATOR_BIND: &str = "0.0.0.0:4080";

/// Address the garbler connects to.
pub const GARBLER_CONNECT: &str = "localhost:4080";

/// Upper bound on a single frame; anything larger is a malformed envelope.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Everything the two parties say to each other.
///
/// Group elements travel as big-endian byte strings, so the wire format is
/// fully specified by this enum plus the bincode standard encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Garbler → evaluator: a circuit with its garbled tables and the p-bits
    /// of its output wires.
    Circuit {
        /// The circuit specification (gate list and party wires).
        circuit: Circuit,
        /// Garbled table per gate, keyed by the gate's output wire.
        tables: HashMap<WireId, GarbledTable>,
        /// p-bits of the output wires, needed to unmask results.
        p_bits_out: BTreeMap<WireId, u8>,
    },
    /// Generic acknowledgement.
    Ack,
    /// Garbler → evaluator: the labels of the garbler's own input wires.
    GarblerInputs(HashMap<WireId, WireLabel>),
    /// Evaluator → garbler: request the label transfer for one input wire.
    OtRequest(WireId),
    /// Garbler → evaluator: both labels in the clear. Only sent when
    /// oblivious transfer is disabled for testing.
    LabelPair {
        /// Label carrying clear bit 0.
        zero: WireLabel,
        /// Label carrying clear bit 1.
        one: WireLabel,
    },
    /// Sender → chooser: group parameters for one oblivious transfer.
    OtGroup {
        /// Prime modulus, big-endian.
        prime: Vec<u8>,
        /// Group generator, big-endian.
        generator: Vec<u8>,
    },
    /// Sender → chooser: the public commitment `C`.
    OtCommit {
        /// Group element, big-endian.
        c: Vec<u8>,
    },
    /// Chooser → sender: the chooser's blinded public value.
    OtChoice {
        /// Group element, big-endian.
        h: Vec<u8>,
    },
    /// Sender → chooser: the masked message pair.
    OtTransfer {
        /// Sender's ephemeral public value `g^k`, big-endian.
        c1: Vec<u8>,
        /// Mask of the first message.
        e0: Vec<u8>,
        /// Mask of the second message.
        e1: Vec<u8>,
    },
    /// Evaluator → garbler: clear output bits per output wire.
    Evaluation(BTreeMap<WireId, u8>),
}

impl Message {
    /// Short name used in unexpected-message errors.
    pub fn label(&self) -> &'static str {
        match self {
            Message::Circuit { .. } => "Circuit",
            Message::Ack => "Ack",
            Message::GarblerInputs(_) => "GarblerInputs",
            Message::OtRequest(_) => "OtRequest",
            Message::LabelPair { .. } => "LabelPair",
            Message::OtGroup { .. } => "OtGroup",
            Message::OtCommit { .. } => "OtCommit",
            Message::OtChoice { .. } => "OtChoice",
            Message::OtTransfer { .. } => "OtTransfer",
            Message::Evaluation(_) => "Evaluation",
        }
    }
}

/// Error for a message that breaks the expected request/reply order.
pub fn unexpected(expected: &str, got: &Message) -> Error {
    Error::Transport(format!("expected {expected}, got {}", got.label()))
}

/// One side of an established connection, exchanging framed [`Message`]s.
///
/// Frames are a `u32` big-endian length followed by the bincode-encoded
/// message. TCP preserves order, the prefix preserves boundaries.
#[derive(Debug)]
pub struct Channel {
    stream: TcpStream,
}

impl Channel {
    /// Connect to a listening peer.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Channel { stream })
    }

    fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Channel { stream })
    }

    /// Send one message.
    pub fn send(&mut self, msg: &Message) -> Result<()> {
        let body = bincode::serde::encode_to_vec(msg, bincode::config::standard())
            .map_err(|e| Error::Transport(format!("encode: {e}")))?;
        let len = u32::try_from(body.len())
            .ok()
            .filter(|&l| l <= MAX_FRAME_LEN)
            .ok_or_else(|| Error::Transport(format!("frame of {} bytes too large", body.len())))?;
        self.stream.write_all(&len.to_be_bytes())?;
        self.stream.write_all(&body)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Receive one message, blocking until a full frame arrives.
    pub fn receive(&mut self) -> Result<Message> {
        let mut len_bytes = [0u8; 4];
        self.stream.read_exact(&mut len_bytes)?;
        let len = u32::from_be_bytes(len_bytes);
        if len > MAX_FRAME_LEN {
            return Err(Error::Transport(format!("frame of {len} bytes too large")));
        }
        let mut body = vec![0u8; len as usize];
        self.stream.read_exact(&mut body)?;

        let (msg, used) =
            bincode::serde::decode_from_slice(&body, bincode::config::standard())
                .map_err(|e| Error::Transport(format!("decode: {e}")))?;
        if used != body.len() {
            return Err(Error::Transport("trailing bytes in frame".to_string()));
        }
        Ok(msg)
    }

    /// Send a message and wait for the peer's reply.
    pub fn send_wait(&mut self, msg: &Message) -> Result<Message> {
        self.send(msg)?;
        self.receive()
    }
}

/// Accepts evaluator-side connections.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind the listening socket.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Ok(Listener {
            inner: TcpListener::bind(addr)?,
        })
    }

    /// The bound address, useful when binding port 0 in tests.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Block until a garbler connects.
    pub fn accept(&self) -> Result<(Channel, SocketAddr)> {
        let (stream, peer) = self.inner.accept()?;
        Ok((Channel::from_stream(stream)?, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_message_roundtrip_over_tcp() {
        let listener = Listener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut channel, _) = listener.accept().unwrap();
            let msg = channel.receive().unwrap();
            assert!(matches!(msg, Message::OtRequest(42)));
            channel.send(&Message::Ack).unwrap();
            // Boundaries hold across back-to-back frames.
            channel.send(&Message::OtCommit { c: vec![1, 2, 3] }).unwrap();
        });

        let mut channel = Channel::connect(addr).unwrap();
        let reply = channel.send_wait(&Message::OtRequest(42)).unwrap();
        assert!(matches!(reply, Message::Ack));
        let next = channel.receive().unwrap();
        match next {
            Message::OtCommit { c } => assert_eq!(c, vec![1, 2, 3]),
            other => panic!("unexpected {}", other.label()),
        }
        server.join().unwrap();
    }

    #[test]
    fn test_disconnect_maps_to_clean_eof() {
        let listener = Listener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (channel, _) = listener.accept().unwrap();
            drop(channel);
        });

        let mut channel = Channel::connect(addr).unwrap();
        server.join().unwrap();
        assert!(matches!(channel.receive(), Err(Error::Disconnected)));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let listener = Listener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut channel, _) = listener.accept().unwrap();
            // A length prefix far beyond the cap, no body.
            channel
                .stream
                .write_all(&u32::MAX.to_be_bytes())
                .unwrap();
        });

        let mut channel = Channel::connect(addr).unwrap();
        server.join().unwrap();
        assert!(matches!(channel.receive(), Err(Error::Transport(_))));
    }
}
