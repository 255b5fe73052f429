use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::cipher::{self, WireKey};
use crate::circuit::{Circuit, Gate, GateKind, WireId};
use crate::error::{Error, Result};

/// A wire value as the evaluator holds it: the key for the clear bit plus the
/// p-bit-masked bit that selects garbled-table rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireLabel {
    /// Key representing the (hidden) clear bit on the wire.
    pub key: WireKey,
    /// Clear bit XOR the wire's p-bit.
    pub encr_bit: u8,
}

/// Serialized size of a label: 32 key bytes plus the masked bit.
const LABEL_LEN: usize = 33;

impl WireLabel {
    /// Fixed-length byte encoding: `key(32) || encr_bit(1)`.
    ///
    /// Both labels of a pair encode to the same length, which the oblivious
    /// transfer relies on.
    pub fn to_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LABEL_LEN);
        out.extend_from_slice(self.key.as_bytes());
        out.push(self.encr_bit);
        out
    }

    /// Decode a label produced by [`WireLabel::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != LABEL_LEN || bytes[32] > 1 {
            return None;
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[..32]);
        Some(WireLabel {
            key: WireKey::new(key),
            encr_bit: bytes[32],
        })
    }
}

/// Encrypted truth table of one gate.
///
/// Row index *is* the tuple of input encrypted bits (`e_a * 2 + e_b` for
/// two-input gates, `e_in` for NOT), so rows are stored in canonical order
/// without leaking anything: the index is masked by p-bits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarbledTable {
    rows: Vec<Vec<u8>>,
}

impl GarbledTable {
    /// Number of rows (`2^arity`).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table holds no rows. Never true for a built table.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Ciphertext row for a tuple of encrypted input bits.
    pub fn row(&self, index: usize) -> Option<&[u8]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    #[cfg(test)]
    pub(crate) fn row_mut(&mut self, index: usize) -> &mut Vec<u8> {
        &mut self.rows[index]
    }
}

/// A circuit after garbling: per-wire key pairs and p-bits, and the encrypted
/// truth table of every gate.
///
/// The key and p-bit maps are the garbler's session secret; only the tables
/// and the output p-bits ever leave this struct toward the evaluator.
#[derive(Debug)]
pub struct GarbledCircuit {
    keys: HashMap<WireId, (WireKey, WireKey)>,
    p_bits: HashMap<WireId, u8>,
    tables: HashMap<WireId, GarbledTable>,
}

impl GarbledCircuit {
    /// Garble a circuit with freshly drawn p-bits and keys.
    pub fn garble(circuit: &Circuit) -> Result<Self> {
        let mut rng = ChaCha20Rng::from_os_rng();
        let p_bits = circuit
            .wires()
            .into_iter()
            .map(|w| (w, rng.random_range(0..=1u8)))
            .collect();
        Self::build(circuit, p_bits, &mut rng)
    }

    /// Garble with caller-supplied p-bits, for deterministic testing.
    ///
    /// `p_bits` must assign a bit to every wire of the circuit.
    pub fn garble_with_p_bits(circuit: &Circuit, p_bits: HashMap<WireId, u8>) -> Result<Self> {
        let mut rng = ChaCha20Rng::from_os_rng();
        Self::build(circuit, p_bits, &mut rng)
    }

    fn build(
        circuit: &Circuit,
        p_bits: HashMap<WireId, u8>,
        rng: &mut ChaCha20Rng,
    ) -> Result<Self> {
        circuit.validate()?;
        let wires = circuit.wires();
        for &w in &wires {
            match p_bits.get(&w) {
                Some(0 | 1) => {}
                Some(_) => {
                    return Err(Error::Config(format!("p-bit for wire {w} is not a bit")));
                }
                None => return Err(Error::Config(format!("no p-bit for wire {w}"))),
            }
        }

        let mut keys = HashMap::new();
        for &w in &wires {
            let zero = WireKey::random(rng);
            let mut one = WireKey::random(rng);
            while one == zero {
                one = WireKey::random(rng);
            }
            keys.insert(w, (zero, one));
        }

        let mut tables = HashMap::new();
        for gate in &circuit.gates {
            tables.insert(gate.id, garble_gate(gate, &keys, &p_bits)?);
        }

        Ok(GarbledCircuit {
            keys,
            p_bits,
            tables,
        })
    }

    /// Key pair of every wire.
    pub fn keys(&self) -> &HashMap<WireId, (WireKey, WireKey)> {
        &self.keys
    }

    /// p-bit of every wire.
    pub fn p_bits(&self) -> &HashMap<WireId, u8> {
        &self.p_bits
    }

    /// Garbled table of every gate, keyed by the gate's output wire.
    pub fn tables(&self) -> &HashMap<WireId, GarbledTable> {
        &self.tables
    }

    /// p-bits of the circuit's output wires, sent to the evaluator so it can
    /// unmask its results.
    pub fn output_p_bits(&self, circuit: &Circuit) -> BTreeMap<WireId, u8> {
        circuit
            .out
            .iter()
            .filter_map(|w| self.p_bits.get(w).map(|&p| (*w, p)))
            .collect()
    }

    /// Label the garbler commits to for one of its own input wires.
    pub fn garbler_input(&self, wire: WireId, bit: u8) -> Result<WireLabel> {
        let (label_zero, label_one) = self.label_pair(wire)?;
        Ok(if bit == 0 { label_zero } else { label_one })
    }

    /// Both labels of a wire, in (bit 0, bit 1) order. The evaluator obtains
    /// exactly one of these per input wire through oblivious transfer.
    pub fn label_pair(&self, wire: WireId) -> Result<(WireLabel, WireLabel)> {
        let (key_zero, key_one) = self
            .keys
            .get(&wire)
            .ok_or_else(|| Error::Config(format!("unknown wire {wire}")))?;
        let p = self.p_bits[&wire];
        Ok((
            WireLabel {
                key: *key_zero,
                encr_bit: p,
            },
            WireLabel {
                key: *key_one,
                encr_bit: 1 ^ p,
            },
        ))
    }

    /// Print p-bits and a clear rendering of every garbled table.
    ///
    /// Debugging view only: it reveals which clear bits back each row, which
    /// the real tables hide.
    pub fn print_tables(&self, circuit: &Circuit) {
        println!("======== {} ========", circuit.id);
        let mut p_bits: Vec<_> = self.p_bits.iter().collect();
        p_bits.sort();
        let rendered: Vec<String> = p_bits.iter().map(|(w, p)| format!("{w}: {p}")).collect();
        println!("P-BITS: {{{}}}", rendered.join(", "));

        for gate in &circuit.gates {
            println!("GATE: {}, TYPE: {}", gate.id, gate.kind);
            match gate.kind {
                GateKind::Not => {
                    let inp = gate.inputs[0];
                    for encr_in in 0..2u8 {
                        let bit_in = encr_in ^ self.p_bits[&inp];
                        let bit_out = gate.kind.apply(&[bit_in]);
                        let encr_out = bit_out ^ self.p_bits[&gate.id];
                        println!(
                            "[{encr_in}]: [{inp}, {bit_in}]([{}, {bit_out}], {encr_out})",
                            gate.id
                        );
                    }
                }
                _ => {
                    let (in_a, in_b) = (gate.inputs[0], gate.inputs[1]);
                    for encr_a in 0..2u8 {
                        for encr_b in 0..2u8 {
                            let bit_a = encr_a ^ self.p_bits[&in_a];
                            let bit_b = encr_b ^ self.p_bits[&in_b];
                            let bit_out = gate.kind.apply(&[bit_a, bit_b]);
                            let encr_out = bit_out ^ self.p_bits[&gate.id];
                            println!(
                                "[{encr_a}, {encr_b}]: [{in_a}, {bit_a}][{in_b}, {bit_b}]([{}, {bit_out}], {encr_out})",
                                gate.id
                            );
                        }
                    }
                }
            }
        }
        println!();
    }
}

/// Build the garbled table of one gate.
///
/// Each row holds the output label for one tuple of input encrypted bits,
/// encrypted under the matching input keys: the second input's key is the
/// inner layer, the first input's key the outer one. Evaluation mirrors this
/// order.
fn garble_gate(
    gate: &Gate,
    keys: &HashMap<WireId, (WireKey, WireKey)>,
    p_bits: &HashMap<WireId, u8>,
) -> Result<GarbledTable> {
    fn key_for<'a>(
        keys: &'a HashMap<WireId, (WireKey, WireKey)>,
        wire: WireId,
        bit: u8,
    ) -> Result<&'a WireKey> {
        let pair = keys
            .get(&wire)
            .ok_or_else(|| Error::Config(format!("no keys for wire {wire}")))?;
        Ok(if bit == 0 { &pair.0 } else { &pair.1 })
    }
    let out = gate.id;
    let mut rows = Vec::with_capacity(1 << gate.kind.arity());

    match gate.kind {
        GateKind::Not => {
            let inp = gate.inputs[0];
            for encr_in in 0..2u8 {
                let bit_in = encr_in ^ p_bits[&inp];
                let bit_out = gate.kind.apply(&[bit_in]);
                let encr_out = bit_out ^ p_bits[&out];
                let payload = WireLabel {
                    key: *key_for(keys, out, bit_out)?,
                    encr_bit: encr_out,
                }
                .to_bytes();
                rows.push(cipher::encrypt(key_for(keys, inp, bit_in)?, &payload));
            }
        }
        _ => {
            let (in_a, in_b) = (gate.inputs[0], gate.inputs[1]);
            for encr_a in 0..2u8 {
                for encr_b in 0..2u8 {
                    let bit_a = encr_a ^ p_bits[&in_a];
                    let bit_b = encr_b ^ p_bits[&in_b];
                    let bit_out = gate.kind.apply(&[bit_a, bit_b]);
                    let encr_out = bit_out ^ p_bits[&out];
                    let payload = WireLabel {
                        key: *key_for(keys, out, bit_out)?,
                        encr_bit: encr_out,
                    }
                    .to_bytes();
                    let inner = cipher::encrypt(key_for(keys, in_b, bit_b)?, &payload);
                    rows.push(cipher::encrypt(key_for(keys, in_a, bit_a)?, &inner));
                }
            }
        }
    }
    Ok(GarbledTable { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Gate;

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

    fn not_circuit() -> Circuit {
        Circuit {
            id: "not".to_string(),
            alice: vec![1],
            bob: vec![],
            out: vec![2],
            gates: vec![Gate {
                id: 2,
                kind: GateKind::Not,
                inputs: vec![1],
            }],
        }
    }

    #[test]
    fn test_label_byte_roundtrip() {
        let label = WireLabel {
            key: WireKey::new([7u8; 32]),
            encr_bit: 1,
        };
        let bytes = label.to_bytes();
        assert_eq!(bytes.len(), LABEL_LEN);
        assert_eq!(WireLabel::from_bytes(&bytes).unwrap(), label);
        assert!(WireLabel::from_bytes(&bytes[..32]).is_none());

        let mut bad_bit = bytes.clone();
        bad_bit[32] = 2;
        assert!(WireLabel::from_bytes(&bad_bit).is_none());
    }

    #[test]
    fn test_table_sizes() {
        let garbled = GarbledCircuit::garble(&and_circuit()).unwrap();
        assert_eq!(garbled.tables()[&3].len(), 4);

        let garbled = GarbledCircuit::garble(&not_circuit()).unwrap();
        assert_eq!(garbled.tables()[&2].len(), 2);
    }

    #[test]
    fn test_key_pairs_distinct() {
        let garbled = GarbledCircuit::garble(&and_circuit()).unwrap();
        for (wire, (zero, one)) in garbled.keys() {
            assert_ne!(zero, one, "keys for wire {wire} must differ");
        }
    }

    #[test]
    fn test_missing_p_bit_rejected() {
        let p_bits = HashMap::from([(1, 0u8), (2, 1u8)]);
        assert!(matches!(
            GarbledCircuit::garble_with_p_bits(&and_circuit(), p_bits),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_label_pair_carries_masked_bits() {
        let p_bits = HashMap::from([(1, 1u8), (2, 0u8), (3, 1u8)]);
        let garbled = GarbledCircuit::garble_with_p_bits(&and_circuit(), p_bits).unwrap();
        let (zero, one) = garbled.label_pair(1).unwrap();
        assert_eq!(zero.encr_bit, 1);
        assert_eq!(one.encr_bit, 0);
        assert_eq!(garbled.garbler_input(1, 0).unwrap(), zero);
        assert_eq!(garbled.garbler_input(1, 1).unwrap(), one);
    }

    #[test]
    fn test_exactly_one_row_decrypts() {
        // Point-and-permute: holding one label per input wire, exactly one of
        // the four rows must decrypt, and it must contain the output label
        // for the gate's clear result.
        let circuit = and_circuit();
        let garbled = GarbledCircuit::garble(&circuit).unwrap();
        let table = &garbled.tables()[&3];

        for bit_a in 0..2u8 {
            for bit_b in 0..2u8 {
                let label_a = garbled.garbler_input(1, bit_a).unwrap();
                let label_b = garbled.garbler_input(2, bit_b).unwrap();

                let mut decrypted = Vec::new();
                for row in 0..4 {
                    let Ok(inner) = cipher::decrypt(&label_a.key, table.row(row).unwrap()) else {
                        continue;
                    };
                    let Ok(payload) = cipher::decrypt(&label_b.key, &inner) else {
                        continue;
                    };
                    decrypted.push((row, WireLabel::from_bytes(&payload).unwrap()));
                }

                assert_eq!(decrypted.len(), 1, "inputs ({bit_a}, {bit_b})");
                let (row, label) = &decrypted[0];
                assert_eq!(
                    *row,
                    (label_a.encr_bit * 2 + label_b.encr_bit) as usize,
                    "the decryptable row is the one the masked bits select"
                );
                let expected = garbled.garbler_input(3, bit_a & bit_b).unwrap();
                assert_eq!(label, &expected);
            }
        }
    }
}
