use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::net::ToSocketAddrs;
use std::path::Path;

use crate::circuit::{Circuit, CircuitFile, WireId};
use crate::error::{Error, Result};
use crate::evaluate::evaluate;
use crate::garble::{GarbledCircuit, GarbledTable, WireLabel};
use crate::ot;
use crate::transport::{Channel, Listener, Message, unexpected};

/// One evaluated line of a circuit's truth table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruthRow {
    /// The garbler's input bits, in `alice` wire order.
    pub alice_bits: Vec<u8>,
    /// The evaluator's input bits, in `bob` wire order.
    pub bob_bits: Vec<u8>,
    /// Clear output bit per output wire.
    pub outputs: BTreeMap<WireId, u8>,
}

/// A circuit together with its garbling, ready to run.
#[derive(Debug)]
struct CircuitEntry {
    circuit: Circuit,
    garbling: GarbledCircuit,
}

/// The garbler. Creates the garbled circuits, drives the protocol, and
/// prints the evaluated truth tables.
///
/// For printing, Alice enumerates all input combinations in lexicographic
/// order over the concatenated alice||bob bits (Alice holding the high bits)
/// and assumes Bob enumerates his own bits the same way; the protocol itself
/// never tells her Bob's inputs.
#[derive(Debug)]
pub struct Alice {
    name: String,
    entries: Vec<CircuitEntry>,
    channel: Channel,
    ot_enabled: bool,
}

impl Alice {
    /// Load and garble the circuit file, then connect to the evaluator.
    pub fn connect<P: AsRef<Path>, A: ToSocketAddrs>(
        circuit_path: P,
        addr: A,
        ot_enabled: bool,
    ) -> Result<Self> {
        let file = CircuitFile::load(circuit_path)?;
        let mut entries = Vec::with_capacity(file.circuits.len());
        for circuit in file.circuits {
            let garbling = GarbledCircuit::garble(&circuit)?;
            entries.push(CircuitEntry { circuit, garbling });
        }
        let channel = Channel::connect(addr)?;
        info!("connected to the evaluator");
        Ok(Alice {
            name: file.name,
            entries,
            channel,
            ot_enabled,
        })
    }

    /// Name of the loaded circuit collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the protocol for every circuit and print each truth table.
    pub fn run(&mut self) -> Result<()> {
        let results = self.run_circuits()?;
        for (circuit, rows) in self.entries.iter().map(|e| &e.circuit).zip(&results) {
            print_truth_table(circuit, rows);
        }
        Ok(())
    }

    /// Run the protocol for every circuit, returning the evaluated rows in
    /// circuit order instead of printing them.
    pub fn run_circuits(&mut self) -> Result<Vec<Vec<TruthRow>>> {
        let mut results = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            debug!("sending circuit {}", entry.circuit.id);
            let reply = self.channel.send_wait(&Message::Circuit {
                circuit: entry.circuit.clone(),
                tables: entry.garbling.tables().clone(),
                p_bits_out: entry.garbling.output_p_bits(&entry.circuit),
            })?;
            if !matches!(reply, Message::Ack) {
                return Err(unexpected("Ack", &reply));
            }
            results.push(run_circuit(&mut self.channel, entry, self.ot_enabled)?);
        }
        Ok(results)
    }
}

/// Evaluate one garbled circuit for every input combination.
fn run_circuit(
    channel: &mut Channel,
    entry: &CircuitEntry,
    ot_enabled: bool,
) -> Result<Vec<TruthRow>> {
    let circuit = &entry.circuit;
    let a_wires = &circuit.alice;
    let b_wires = &circuit.bob;
    let total = a_wires.len() + b_wires.len();

    // Label pairs Bob may request; restricted to his wires so a request for
    // anything else cannot leak other keys.
    let mut transferable: HashMap<WireId, (WireLabel, WireLabel)> = HashMap::new();
    for &w in b_wires {
        transferable.insert(w, entry.garbling.label_pair(w)?);
    }

    let mut rows = Vec::with_capacity(1 << total);
    for combo in 0..(1usize << total) {
        let bit_at = |i: usize| ((combo >> (total - 1 - i)) & 1) as u8;
        let alice_bits: Vec<u8> = (0..a_wires.len()).map(bit_at).collect();
        let bob_bits: Vec<u8> = (a_wires.len()..total).map(bit_at).collect();

        let mut inputs = HashMap::new();
        for (&w, &bit) in a_wires.iter().zip(&alice_bits) {
            inputs.insert(w, entry.garbling.garbler_input(w, bit)?);
        }
        debug!("sending garbler inputs");
        channel.send(&Message::GarblerInputs(inputs))?;

        for _ in 0..b_wires.len() {
            let w = match channel.receive()? {
                Message::OtRequest(w) => w,
                other => return Err(unexpected("OtRequest", &other)),
            };
            debug!("received transfer request for wire {w}");
            let (zero, one) = transferable
                .get(&w)
                .ok_or_else(|| Error::Ot(format!("wire {w} is not an evaluator input")))?;
            if ot_enabled {
                ot::send(channel, &zero.to_bytes(), &one.to_bytes())?;
            } else {
                channel.send(&Message::LabelPair {
                    zero: *zero,
                    one: *one,
                })?;
            }
        }

        let outputs = match channel.receive()? {
            Message::Evaluation(outputs) => outputs,
            other => return Err(unexpected("Evaluation", &other)),
        };
        rows.push(TruthRow {
            alice_bits,
            bob_bits,
            outputs,
        });
    }
    Ok(rows)
}

/// Print the evaluated truth table of one circuit.
fn print_truth_table(circuit: &Circuit, rows: &[TruthRow]) {
    println!("======== {} ========", circuit.id);
    for row in rows {
        let alice = join_bits(&row.alice_bits);
        let bob = join_bits(&row.bob_bits);
        let outs: Vec<String> = circuit
            .out
            .iter()
            .map(|w| {
                row.outputs
                    .get(w)
                    .map_or_else(|| "?".to_string(), |b| b.to_string())
            })
            .collect();
        println!(
            "  Alice{:?} = {alice}  Bob{:?} = {bob}  Outputs{:?} = {}",
            circuit.alice,
            circuit.bob,
            circuit.out,
            outs.join(" ")
        );
    }
    println!();
}

fn join_bits(bits: &[u8]) -> String {
    bits.iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The evaluator. Listens for a garbler, receives garbled circuits, obtains
/// its input labels (through oblivious transfer unless disabled), evaluates,
/// and returns the clear outputs.
#[derive(Debug)]
pub struct Bob {
    ot_enabled: bool,
}

impl Bob {
    /// Create an evaluator.
    pub fn new(ot_enabled: bool) -> Self {
        Bob { ot_enabled }
    }

    /// Accept garblers forever, serving one connection at a time.
    ///
    /// A failed session is logged and does not stop the listener.
    pub fn listen<A: ToSocketAddrs>(&self, addr: A) -> Result<()> {
        let listener = Listener::bind(addr)?;
        info!("start listening");
        loop {
            match listener.accept() {
                Ok((mut channel, peer)) => {
                    info!("garbler connected from {peer}");
                    match self.serve(&mut channel) {
                        Ok(()) => info!("garbler disconnected"),
                        Err(e) => warn!("session aborted: {e}"),
                    }
                }
                Err(e) => warn!("accept failed: {e}"),
            }
        }
    }

    /// Serve one connection until the garbler disconnects.
    pub fn serve(&self, channel: &mut Channel) -> Result<()> {
        loop {
            let (circuit, tables, p_bits_out) = match channel.receive() {
                Ok(Message::Circuit {
                    circuit,
                    tables,
                    p_bits_out,
                }) => (circuit, tables, p_bits_out),
                Ok(other) => return Err(unexpected("Circuit", &other)),
                Err(Error::Disconnected) => return Ok(()),
                Err(e) => return Err(e),
            };
            circuit.validate()?;
            println!("Received {}", circuit.id);
            channel.send(&Message::Ack)?;
            self.evaluate_circuit(channel, &circuit, &tables, &p_bits_out)?;
        }
    }

    /// Evaluate one circuit for every input combination, mirroring the
    /// garbler's enumeration (Bob's bits are the low bits).
    fn evaluate_circuit(
        &self,
        channel: &mut Channel,
        circuit: &Circuit,
        tables: &HashMap<WireId, GarbledTable>,
        p_bits_out: &BTreeMap<WireId, u8>,
    ) -> Result<()> {
        let total = circuit.alice.len() + circuit.bob.len();
        let b_count = circuit.bob.len();

        for combo in 0..(1usize << total) {
            let mut labels = match channel.receive()? {
                Message::GarblerInputs(inputs) => inputs,
                other => return Err(unexpected("GarblerInputs", &other)),
            };
            debug!("received garbler inputs");

            for (i, &w) in circuit.bob.iter().enumerate() {
                let bit = ((combo >> (b_count - 1 - i)) & 1) as u8;
                debug!("requesting transfer for wire {w}");
                channel.send(&Message::OtRequest(w))?;
                let label = if self.ot_enabled {
                    let bytes = ot::receive(channel, bit)?;
                    WireLabel::from_bytes(&bytes)
                        .ok_or_else(|| Error::Ot("transferred label is malformed".to_string()))?
                } else {
                    match channel.receive()? {
                        Message::LabelPair { zero, one } => {
                            if bit == 0 {
                                zero
                            } else {
                                one
                            }
                        }
                        other => return Err(unexpected("LabelPair", &other)),
                    }
                };
                labels.insert(w, label);
            }

            let outputs = evaluate(circuit, tables, p_bits_out, &labels)?;
            debug!("sending evaluation result");
            channel.send(&Message::Evaluation(outputs))?;
        }
        Ok(())
    }
}
