use std::collections::{BTreeMap, HashMap};

use crate::cipher;
use crate::circuit::{Circuit, WireId};
use crate::error::{Error, Result};
use crate::garble::{GarbledTable, WireLabel};

/// Evaluate a garbled circuit.
///
/// `inputs` must hold a label for every party input wire (the garbler's own
/// labels plus the ones obtained through oblivious transfer). Gates are
/// processed in list order; each gate's masked input bits select exactly one
/// table row, which is decrypted with the first input's key (outer layer)
/// then the second input's key (inner layer). Output bits are unmasked with
/// `p_bits_out`.
///
/// Any row that fails authenticated decryption means the labels and tables do
/// not match, and evaluation aborts with [`Error::Evaluation`] naming the
/// gate.
pub fn evaluate(
    circuit: &Circuit,
    tables: &HashMap<WireId, GarbledTable>,
    p_bits_out: &BTreeMap<WireId, u8>,
    inputs: &HashMap<WireId, WireLabel>,
) -> Result<BTreeMap<WireId, u8>> {
    let mut labels: HashMap<WireId, WireLabel> = inputs.clone();

    for gate in &circuit.gates {
        let corrupted = || Error::Evaluation { gate: gate.id };
        let table = tables.get(&gate.id).ok_or_else(corrupted)?;

        let payload = if gate.inputs.len() == 1 {
            let input = labels.get(&gate.inputs[0]).ok_or_else(corrupted)?;
            let row = table.row(input.encr_bit as usize).ok_or_else(corrupted)?;
            cipher::decrypt(&input.key, row).map_err(|_| corrupted())?
        } else {
            let label_a = labels.get(&gate.inputs[0]).ok_or_else(corrupted)?;
            let label_b = labels.get(&gate.inputs[1]).ok_or_else(corrupted)?;
            let row = table
                .row((label_a.encr_bit * 2 + label_b.encr_bit) as usize)
                .ok_or_else(corrupted)?;
            let inner = cipher::decrypt(&label_a.key, row).map_err(|_| corrupted())?;
            cipher::decrypt(&label_b.key, &inner).map_err(|_| corrupted())?
        };

        let label = WireLabel::from_bytes(&payload).ok_or_else(corrupted)?;
        labels.insert(gate.id, label);
    }

    let mut outputs = BTreeMap::new();
    for &w in &circuit.out {
        let label = labels.get(&w).ok_or(Error::Evaluation { gate: w })?;
        let p = p_bits_out
            .get(&w)
            .ok_or_else(|| Error::Config(format!("no output p-bit for wire {w}")))?;
        outputs.insert(w, label.encr_bit ^ p);
    }
    Ok(outputs)
}
