use log::debug;
use num_bigint::BigUint;
use sha3::Shake256;
use sha3::digest::{ExtendableOutput, Update, XofReader};

use crate::error::{Error, Result};
use crate::group::PrimeGroup;
use crate::transport::{Channel, Message, unexpected};

/// Width of the per-transfer prime modulus.
///
/// Enough for protocol correctness, nowhere near enough for cryptographic
/// hardness: the generator search factors `P-1`, which caps practical widths
/// far below a secure size. Demo parameter.
pub const OT_PRIME_BITS: u64 = 64;

/// SHAKE-256 of a group element's big-endian bytes, squeezed to `len` bytes.
fn ot_hash(element: &BigUint, len: usize) -> Vec<u8> {
    let mut hasher = Shake256::default();
    hasher.update(&element.to_bytes_be());
    let mut out = vec![0u8; len];
    hasher.finalize_xof().read(&mut out);
    out
}

/// Byte-wise XOR of two equal-length slices.
fn xor_bytes(a: &[u8], b: &[u8]) -> Vec<u8> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}

/// Sender half of one 1-out-of-2 transfer, holding the commitment `C`.
///
/// The chooser can know the discrete log of at most one of `h_0 = recv` and
/// `h_1 = C * h_0^{-1}`, so at most one mask is removable on its side.
#[derive(Debug)]
pub struct SenderSession {
    group: PrimeGroup,
    c: BigUint,
}

impl SenderSession {
    /// Start a transfer over `group`, sampling the commitment.
    pub fn new(group: PrimeGroup) -> Self {
        let mut rng = rand::rng();
        let c = group.gen_pow(&group.rand_element(&mut rng));
        SenderSession { group, c }
    }

    /// The group this transfer runs over.
    pub fn group(&self) -> &PrimeGroup {
        &self.group
    }

    /// The commitment `C` shipped to the chooser.
    pub fn commitment(&self) -> &BigUint {
        &self.c
    }

    /// Mask both messages against the chooser's public value.
    ///
    /// Returns `(c1, e0, e1)` where `c1 = g^k` and
    /// `e_i = m_i XOR H(h_i^k, |m_i|)`. The received value is taken as `h_0`;
    /// `h_1` is derived as `C * h_0^{-1}`, matching the chooser's convention
    /// of sending the element at its own choice position.
    pub fn transfer(
        &self,
        h0: &BigUint,
        m0: &[u8],
        m1: &[u8],
    ) -> Result<(BigUint, Vec<u8>, Vec<u8>)> {
        if m0.len() != m1.len() {
            return Err(Error::Ot(format!(
                "message sizes differ: {} vs {}",
                m0.len(),
                m1.len()
            )));
        }
        if h0 < &BigUint::from(1u32) || h0 >= self.group.prime() {
            return Err(Error::Ot("chooser value outside the group".to_string()));
        }

        let h1 = self.group.mul(&self.c, &self.group.inv(h0));
        let mut rng = rand::rng();
        let k = self.group.rand_element(&mut rng);
        let c1 = self.group.gen_pow(&k);
        let e0 = xor_bytes(m0, &ot_hash(&self.group.pow(h0, &k), m0.len()));
        let e1 = xor_bytes(m1, &ot_hash(&self.group.pow(&h1, &k), m1.len()));
        Ok((c1, e0, e1))
    }
}

/// Chooser half of one 1-out-of-2 transfer.
#[derive(Debug)]
pub struct ChooserSession {
    group: PrimeGroup,
    x: BigUint,
    h: [BigUint; 2],
}

impl ChooserSession {
    /// Blind against the sender's commitment `c`.
    ///
    /// Samples `x` and forms the pair `[g^x, c * g^{-x}]`; whichever element
    /// is sent, the sender cannot tell the two apart (both are uniform), and
    /// only `g^x` has a discrete log known to the chooser.
    pub fn new(group: PrimeGroup, c: &BigUint) -> Result<Self> {
        if c < &BigUint::from(1u32) || c >= group.prime() {
            return Err(Error::Ot("commitment outside the group".to_string()));
        }
        let mut rng = rand::rng();
        let x = group.rand_element(&mut rng);
        let x_pow = group.gen_pow(&x);
        let masked = group.mul(c, &group.inv(&x_pow));
        Ok(ChooserSession {
            group,
            x,
            h: [x_pow, masked],
        })
    }

    /// The public value to send for choice `bit`: `h[bit]`.
    pub fn choice(&self, bit: u8) -> &BigUint {
        &self.h[usize::from(bit != 0)]
    }

    /// Unmask the chosen ciphertext: `e_b XOR H(c1^x, |e_b|)`.
    pub fn recover(&self, c1: &BigUint, chosen: &[u8]) -> Vec<u8> {
        xor_bytes(chosen, &ot_hash(&self.group.pow(c1, &self.x), chosen.len()))
    }
}

/// Run the sender (garbler) side of one transfer over the channel.
///
/// Generates a fresh group, ships its parameters, then follows the
/// commit/choice/transfer exchange. `m0` and `m1` must be equally long.
pub fn send(channel: &mut Channel, m0: &[u8], m1: &[u8]) -> Result<()> {
    debug!("ot sender: protocol started");
    if m0.len() != m1.len() {
        return Err(Error::Ot(format!(
            "message sizes differ: {} vs {}",
            m0.len(),
            m1.len()
        )));
    }

    let group = PrimeGroup::generate(OT_PRIME_BITS);
    let reply = channel.send_wait(&Message::OtGroup {
        prime: group.prime().to_bytes_be(),
        generator: group.generator().to_bytes_be(),
    })?;
    if !matches!(reply, Message::Ack) {
        return Err(unexpected("Ack", &reply));
    }

    let session = SenderSession::new(group);
    let reply = channel.send_wait(&Message::OtCommit {
        c: session.commitment().to_bytes_be(),
    })?;
    let h0 = match reply {
        Message::OtChoice { h } => BigUint::from_bytes_be(&h),
        other => return Err(unexpected("OtChoice", &other)),
    };

    let (c1, e0, e1) = session.transfer(&h0, m0, m1)?;
    channel.send(&Message::OtTransfer {
        c1: c1.to_bytes_be(),
        e0,
        e1,
    })?;
    debug!("ot sender: protocol ended");
    Ok(())
}

/// Run the chooser (evaluator) side of one transfer, returning `m_bit`.
pub fn receive(channel: &mut Channel, bit: u8) -> Result<Vec<u8>> {
    debug!("ot chooser: protocol started");
    let group = match channel.receive()? {
        Message::OtGroup { prime, generator } => PrimeGroup::from_parts(
            BigUint::from_bytes_be(&prime),
            BigUint::from_bytes_be(&generator),
        )?,
        other => return Err(unexpected("OtGroup", &other)),
    };
    channel.send(&Message::Ack)?;

    let c = match channel.receive()? {
        Message::OtCommit { c } => BigUint::from_bytes_be(&c),
        other => return Err(unexpected("OtCommit", &other)),
    };
    let session = ChooserSession::new(group, &c)?;
    channel.send(&Message::OtChoice {
        h: session.choice(bit).to_bytes_be(),
    })?;

    let (c1, e0, e1) = match channel.receive()? {
        Message::OtTransfer { c1, e0, e1 } => (BigUint::from_bytes_be(&c1), e0, e1),
        other => return Err(unexpected("OtTransfer", &other)),
    };
    if e0.len() != e1.len() {
        return Err(Error::Ot(format!(
            "masked sizes differ: {} vs {}",
            e0.len(),
            e1.len()
        )));
    }

    let chosen = if bit == 0 { e0 } else { e1 };
    let message = session.recover(&c1, &chosen);
    debug!("ot chooser: protocol ended");
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_transfer(m0: &[u8], m1: &[u8], bit: u8) -> Vec<u8> {
        let group = PrimeGroup::generate(OT_PRIME_BITS);
        let sender = SenderSession::new(group.clone());
        let chooser = ChooserSession::new(group, sender.commitment()).unwrap();

        let (c1, e0, e1) = sender.transfer(chooser.choice(bit), m0, m1).unwrap();
        let chosen = if bit == 0 { e0 } else { e1 };
        chooser.recover(&c1, &chosen)
    }

    #[test]
    fn test_roundtrip_both_choices() {
        let m0 = vec![0x00u8; 16];
        let m1 = vec![0xFFu8; 16];
        assert_eq!(run_transfer(&m0, &m1, 0), m0);
        assert_eq!(run_transfer(&m0, &m1, 1), m1);
    }

    #[test]
    fn test_unchosen_message_stays_masked() {
        let m0 = vec![0x00u8; 16];
        let m1 = vec![0xFFu8; 16];

        let group = PrimeGroup::generate(OT_PRIME_BITS);
        let sender = SenderSession::new(group.clone());
        let chooser = ChooserSession::new(group, sender.commitment()).unwrap();
        let (c1, e0, e1) = sender.transfer(chooser.choice(1), &m0, &m1).unwrap();

        assert_eq!(chooser.recover(&c1, &e1), m1);
        assert_ne!(chooser.recover(&c1, &e0), m0);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let group = PrimeGroup::generate(OT_PRIME_BITS);
        let sender = SenderSession::new(group.clone());
        let chooser = ChooserSession::new(group, sender.commitment()).unwrap();
        let result = sender.transfer(chooser.choice(0), &[0u8; 4], &[0u8; 8]);
        assert!(matches!(result, Err(Error::Ot(_))));
    }

    #[test]
    fn test_choice_values_lie_in_group() {
        // Both possible chooser messages are valid group elements; the wire
        // carries nothing that distinguishes bit 0 from bit 1.
        let group = PrimeGroup::generate(OT_PRIME_BITS);
        let sender = SenderSession::new(group.clone());
        let chooser = ChooserSession::new(group.clone(), sender.commitment()).unwrap();
        for bit in 0..2u8 {
            let h = chooser.choice(bit);
            assert!(*h >= BigUint::from(1u32) && h < group.prime());
        }
    }

    #[test]
    fn test_out_of_group_values_rejected() {
        let group = PrimeGroup::generate(OT_PRIME_BITS);
        let sender = SenderSession::new(group.clone());
        let zero = BigUint::from(0u32);
        assert!(sender.transfer(&zero, &[1u8; 4], &[2u8; 4]).is_err());
        assert!(ChooserSession::new(group.clone(), &zero).is_err());
        assert!(ChooserSession::new(group.clone(), group.prime()).is_err());
    }

    #[test]
    fn test_ot_hash_length_and_determinism() {
        let x = BigUint::from(0xDEADBEEFu32);
        let a = ot_hash(&x, 33);
        let b = ot_hash(&x, 33);
        assert_eq!(a.len(), 33);
        assert_eq!(a, b);
        assert_ne!(ot_hash(&x, 16), ot_hash(&BigUint::from(1u32), 16));
    }
}
