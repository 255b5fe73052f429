use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use crate::error::{Error, Result};

/// Identifier of a circuit wire.
pub type WireId = u32;

/// Boolean operator computed by a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateKind {
    /// Logical OR of two inputs
    Or,
    /// Logical AND of two inputs
    And,
    /// Exclusive OR of two inputs
    Xor,
    /// Negated OR of two inputs
    Nor,
    /// Negated AND of two inputs
    Nand,
    /// Negated exclusive OR of two inputs
    Xnor,
    /// Negation of a single input
    Not,
}

impl GateKind {
    /// Number of input wires this operator consumes.
    pub fn arity(self) -> usize {
        match self {
            GateKind::Not => 1,
            _ => 2,
        }
    }

    /// Apply the operator to clear input bits.
    ///
    /// `bits` must hold exactly [`GateKind::arity`] values in `{0, 1}`.
    pub fn apply(self, bits: &[u8]) -> u8 {
        match self {
            GateKind::Or => bits[0] | bits[1],
            GateKind::And => bits[0] & bits[1],
            GateKind::Xor => bits[0] ^ bits[1],
            GateKind::Nor => 1 - (bits[0] | bits[1]),
            GateKind::Nand => 1 - (bits[0] & bits[1]),
            GateKind::Xnor => 1 - (bits[0] ^ bits[1]),
            GateKind::Not => 1 - bits[0],
        }
    }
}

impl std::fmt::Display for GateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GateKind::Or => "OR",
            GateKind::And => "AND",
            GateKind::Xor => "XOR",
            GateKind::Nor => "NOR",
            GateKind::Nand => "NAND",
            GateKind::Xnor => "XNOR",
            GateKind::Not => "NOT",
        };
        f.write_str(name)
    }
}

/// One gate of a circuit. The gate's output wire carries the gate's own `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    /// Output wire id of the gate.
    pub id: WireId,
    /// Boolean operator of the gate.
    #[serde(rename = "type")]
    pub kind: GateKind,
    /// Input wire ids, in operator order.
    #[serde(rename = "in")]
    pub inputs: Vec<WireId>,
}

/// A Boolean circuit as exchanged between the parties.
///
/// Gates are listed in topological order: every gate input is either a
/// declared party input or the id of an earlier gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Circuit {
    /// Human-readable circuit identifier.
    pub id: String,
    /// Garbler-owned input wires.
    #[serde(default)]
    pub alice: Vec<WireId>,
    /// Evaluator-owned input wires.
    #[serde(default)]
    pub bob: Vec<WireId>,
    /// Output wires; each must be some gate's id.
    pub out: Vec<WireId>,
    /// Gate list in evaluation order.
    pub gates: Vec<Gate>,
}

impl Circuit {
    /// All wire ids referenced by the circuit: gate outputs plus gate inputs.
    pub fn wires(&self) -> BTreeSet<WireId> {
        let mut wires = BTreeSet::new();
        for gate in &self.gates {
            wires.insert(gate.id);
            wires.extend(gate.inputs.iter().copied());
        }
        wires
    }

    /// Check the structural invariants of the circuit.
    ///
    /// Verifies gate arities, topological order, that party inputs are not
    /// gate outputs, that every declared party input feeds some gate, and
    /// that every declared output is produced by a gate.
    pub fn validate(&self) -> Result<()> {
        let mut known: BTreeSet<WireId> = BTreeSet::new();
        for &w in self.alice.iter().chain(&self.bob) {
            if !known.insert(w) {
                return Err(Error::Config(format!(
                    "circuit {}: input wire {w} declared twice",
                    self.id
                )));
            }
        }

        // External input wires are exactly the wires some gate reads without
        // any gate producing them, so a declared input no gate reads has no
        // place in the circuit (and would never get keys or a p-bit).
        let consumed: BTreeSet<WireId> = self
            .gates
            .iter()
            .flat_map(|gate| gate.inputs.iter().copied())
            .collect();
        for &w in self.alice.iter().chain(&self.bob) {
            if !consumed.contains(&w) {
                return Err(Error::Config(format!(
                    "circuit {}: input wire {w} is declared but never read by a gate",
                    self.id
                )));
            }
        }

        let mut gate_ids: BTreeSet<WireId> = BTreeSet::new();
        for gate in &self.gates {
            if gate.inputs.len() != gate.kind.arity() {
                return Err(Error::Config(format!(
                    "circuit {}: gate {} ({}) expects {} inputs, got {}",
                    self.id,
                    gate.id,
                    gate.kind,
                    gate.kind.arity(),
                    gate.inputs.len()
                )));
            }
            for &input in &gate.inputs {
                if !known.contains(&input) {
                    return Err(Error::Config(format!(
                        "circuit {}: gate {} reads wire {input} before it is defined",
                        self.id, gate.id
                    )));
                }
            }
            if !known.insert(gate.id) || !gate_ids.insert(gate.id) {
                return Err(Error::Config(format!(
                    "circuit {}: wire {} defined twice",
                    self.id, gate.id
                )));
            }
        }

        for &w in &self.out {
            if !gate_ids.contains(&w) {
                return Err(Error::Config(format!(
                    "circuit {}: output wire {w} is not produced by any gate",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Evaluate the circuit on clear bits, without any garbling.
    ///
    /// `inputs` maps every party input wire to its bit. Used as ground truth
    /// when checking garbled evaluation.
    pub fn eval_plain(&self, inputs: &HashMap<WireId, u8>) -> Result<BTreeMap<WireId, u8>> {
        let mut values: HashMap<WireId, u8> = inputs.clone();
        for gate in &self.gates {
            let mut bits = [0u8; 2];
            for (slot, &input) in bits.iter_mut().zip(&gate.inputs) {
                *slot = *values.get(&input).ok_or_else(|| {
                    Error::Config(format!(
                        "circuit {}: no value for wire {input}",
                        self.id
                    ))
                })?;
            }
            values.insert(gate.id, gate.kind.apply(&bits[..gate.inputs.len()]));
        }
        Ok(self.out.iter().map(|&w| (w, values[&w])).collect())
    }
}

/// Top-level shape of a circuit file: a name plus one or more circuits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitFile {
    /// Name of the circuit collection.
    pub name: String,
    /// Circuits evaluated in order by the protocol.
    pub circuits: Vec<Circuit>,
}

impl CircuitFile {
    /// Load and validate a circuit file from JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_json(&data)
    }

    /// Parse and validate a circuit file from a JSON string.
    pub fn from_json(data: &str) -> Result<Self> {
        let file: CircuitFile =
            serde_json::from_str(data).map_err(|e| Error::Config(e.to_string()))?;
        for circuit in &file.circuits {
            circuit.validate()?;
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn and_circuit() -> Circuit {
        Circuit {
            id: "and".to_string(),
            alice: vec![1],
            bob: vec![2],
            out: vec![3],
            gates: vec![Gate {
                id: 3,
                kind: GateKind::And,
                inputs: vec![1, 2],
            }],
        }
    }

    #[test]
    fn test_gate_kind_truth_tables() {
        let cases: [(GateKind, [u8; 4]); 6] = [
            (GateKind::Or, [0, 1, 1, 1]),
            (GateKind::And, [0, 0, 0, 1]),
            (GateKind::Xor, [0, 1, 1, 0]),
            (GateKind::Nor, [1, 0, 0, 0]),
            (GateKind::Nand, [1, 1, 1, 0]),
            (GateKind::Xnor, [1, 0, 0, 1]),
        ];
        for (kind, expected) in cases {
            for a in 0..2u8 {
                for b in 0..2u8 {
                    assert_eq!(
                        kind.apply(&[a, b]),
                        expected[(a * 2 + b) as usize],
                        "{kind}({a}, {b})"
                    );
                }
            }
        }
        assert_eq!(GateKind::Not.apply(&[0]), 1);
        assert_eq!(GateKind::Not.apply(&[1]), 0);
    }

    #[test]
    fn test_parse_circuit_file() {
        let json = r#"{
            "name": "demo",
            "circuits": [{
                "id": "and",
                "alice": [1], "bob": [2], "out": [3],
                "gates": [{"id": 3, "type": "AND", "in": [1, 2]}]
            }]
        }"#;
        let file = CircuitFile::from_json(json).unwrap();
        assert_eq!(file.name, "demo");
        assert_eq!(file.circuits.len(), 1);
        assert_eq!(file.circuits[0].gates[0].kind, GateKind::And);
    }

    #[test]
    fn test_load_circuit_file_from_disk() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmp,
            r#"{{"name": "t", "circuits": [{{"id": "not", "alice": [1], "out": [2],
                 "gates": [{{"id": 2, "type": "NOT", "in": [1]}}]}}]}}"#
        )
        .unwrap();
        tmp.flush().unwrap();
        let file = CircuitFile::load(tmp.path()).unwrap();
        assert_eq!(file.circuits[0].bob, Vec::<WireId>::new());
    }

    #[test]
    fn test_unknown_gate_type_rejected() {
        let json = r#"{"name": "t", "circuits": [{
            "id": "bad", "alice": [1], "bob": [2], "out": [3],
            "gates": [{"id": 3, "type": "MUX", "in": [1, 2]}]}]}"#;
        assert!(matches!(
            CircuitFile::from_json(json),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        // Three inputs on a two-input gate; both party wires stay consumed
        // so only the arity check can fire.
        let mut circuit = and_circuit();
        circuit.gates[0].inputs = vec![1, 2, 2];
        assert!(matches!(circuit.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_non_topological_order_rejected() {
        let circuit = Circuit {
            id: "loop".to_string(),
            alice: vec![1],
            bob: vec![2],
            out: vec![4],
            gates: vec![
                Gate {
                    id: 4,
                    kind: GateKind::And,
                    inputs: vec![1, 3],
                },
                Gate {
                    id: 3,
                    kind: GateKind::Xor,
                    inputs: vec![1, 2],
                },
            ],
        };
        assert!(matches!(circuit.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_output_must_be_gate() {
        let mut circuit = and_circuit();
        circuit.out = vec![7];
        assert!(matches!(circuit.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_unread_party_input_rejected() {
        let mut circuit = and_circuit();
        circuit.bob.push(9);
        assert!(matches!(circuit.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_plain_evaluation() {
        let circuit = and_circuit();
        for (a, b) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            let inputs = HashMap::from([(1, a), (2, b)]);
            let outputs = circuit.eval_plain(&inputs).unwrap();
            assert_eq!(outputs[&3], a & b);
        }
    }

    #[test]
    fn test_wire_enumeration() {
        let circuit = and_circuit();
        let wires: Vec<WireId> = circuit.wires().into_iter().collect();
        assert_eq!(wires, vec![1, 2, 3]);
    }
}
