use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::RngCore;
use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// Primes below 100, used for cheap trial division before Miller-Rabin.
const SMALL_PRIMES: [u32; 25] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

/// Miller-Rabin witness rounds. Error probability is at most 4^-ROUNDS.
const MILLER_RABIN_ROUNDS: usize = 32;

/// Upper bound on the modulus size accepted from a peer.
const MAX_PRIME_BITS: u64 = 4096;

/// Cyclic multiplicative group modulo a prime, with a fixed generator.
///
/// Elements are integers in `[1, P-1]`. The group parameters are public; the
/// oblivious-transfer sender generates a fresh group per transfer and ships
/// `(P, g)` to the chooser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimeGroup {
    prime: BigUint,
    generator: BigUint,
    prime_m1: BigUint,
}

impl PrimeGroup {
    /// Generate a group with a fresh random prime of `num_bits` bits.
    ///
    /// The default width used by the OT layer keeps the protocol correct but
    /// is far too small for cryptographic hardness; see [`crate::ot`].
    pub fn generate(num_bits: u64) -> Self {
        let mut rng = rand::rng();
        let prime = gen_prime(num_bits, &mut rng);
        let generator = find_generator(&prime, &mut rng);
        let prime_m1 = &prime - 1u32;
        PrimeGroup {
            prime,
            generator,
            prime_m1,
        }
    }

    /// Rebuild a group from parameters received over the wire.
    ///
    /// The parameters come from the untrusted peer, so they are checked:
    /// `P` must be a prime of acceptable size and `g` an element of
    /// `[2, P-1]`.
    pub fn from_parts(prime: BigUint, generator: BigUint) -> Result<Self> {
        if prime.bits() > MAX_PRIME_BITS {
            return Err(Error::Ot(format!(
                "modulus of {} bits exceeds the {MAX_PRIME_BITS}-bit limit",
                prime.bits()
            )));
        }
        if !is_prime(&prime) {
            return Err(Error::Ot("modulus is not prime".to_string()));
        }
        let prime_m1 = &prime - 1u32;
        if generator <= BigUint::one() || generator > prime_m1 {
            return Err(Error::Ot("generator outside [2, P-1]".to_string()));
        }
        Ok(PrimeGroup {
            prime,
            generator,
            prime_m1,
        })
    }

    /// The prime modulus `P`.
    pub fn prime(&self) -> &BigUint {
        &self.prime
    }

    /// The group generator `g`.
    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    /// Uniform random element of `[1, P-1]`.
    pub fn rand_element<R: RngCore>(&self, rng: &mut R) -> BigUint {
        random_below(&self.prime_m1, rng) + 1u32
    }

    /// `x^e mod P`.
    pub fn pow(&self, x: &BigUint, e: &BigUint) -> BigUint {
        x.modpow(e, &self.prime)
    }

    /// `g^e mod P`.
    pub fn gen_pow(&self, e: &BigUint) -> BigUint {
        self.generator.modpow(e, &self.prime)
    }

    /// `x * y mod P`.
    pub fn mul(&self, x: &BigUint, y: &BigUint) -> BigUint {
        (x * y) % &self.prime
    }

    /// Multiplicative inverse `x^{P-2} mod P` (Fermat; valid since `P` is prime).
    pub fn inv(&self, x: &BigUint) -> BigUint {
        x.modpow(&(&self.prime_m1 - 1u32), &self.prime)
    }
}

/// Uniform random integer in `[0, bound)` by rejection sampling.
fn random_below<R: RngCore>(bound: &BigUint, rng: &mut R) -> BigUint {
    let bits = bound.bits();
    let nbytes = bits.div_ceil(8) as usize;
    let top_mask = if bits % 8 == 0 {
        0xff
    } else {
        ((1u16 << (bits % 8)) - 1) as u8
    };
    loop {
        let mut buf = vec![0u8; nbytes];
        rng.fill_bytes(&mut buf);
        buf[0] &= top_mask;
        let candidate = BigUint::from_bytes_be(&buf);
        if candidate < *bound {
            return candidate;
        }
    }
}

/// Miller-Rabin primality test with trial division for small factors.
fn is_prime(n: &BigUint) -> bool {
    for &p in &SMALL_PRIMES {
        let p = BigUint::from(p);
        if *n == p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }
    if *n < BigUint::from(2u32) {
        return false;
    }

    let mut rng = rand::rng();
    let one = BigUint::one();
    let n_m1 = n - &one;
    let s = n_m1.trailing_zeros().unwrap_or(0);
    let d = &n_m1 >> s;

    'witness: for _ in 0..MILLER_RABIN_ROUNDS {
        let a = random_below(&(n - 3u32), &mut rng) + 2u32;
        let mut x = a.modpow(&d, n);
        if x == one || x == n_m1 {
            continue;
        }
        for _ in 1..s {
            x = (&x * &x) % n;
            if x == n_m1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Random prime of exactly `num_bits` bits: draw a random odd candidate of
/// that width and advance to the next prime.
fn gen_prime<R: RngCore>(num_bits: u64, rng: &mut R) -> BigUint {
    debug_assert!(num_bits >= 4, "prime width too small to form a group");
    let mut bytes = vec![0u8; num_bits.div_ceil(8) as usize];
    rng.fill_bytes(&mut bytes);

    let mut candidate = BigUint::from_bytes_be(&bytes);
    candidate &= (BigUint::one() << num_bits as usize) - 1u32;
    candidate |= BigUint::one() << (num_bits - 1) as usize;
    candidate |= BigUint::one();
    while !is_prime(&candidate) {
        candidate += 2u32;
    }
    candidate
}

/// Distinct prime factors of `n`, smallest first.
fn distinct_prime_factors(mut n: BigUint) -> Vec<BigUint> {
    let one = BigUint::one();
    let mut factors = BTreeSet::new();

    for &p in &SMALL_PRIMES {
        let p = BigUint::from(p);
        if (&n % &p).is_zero() {
            while (&n % &p).is_zero() {
                n /= &p;
            }
            factors.insert(p);
        }
    }

    let mut pending = Vec::new();
    if n > one {
        pending.push(n);
    }
    while let Some(m) = pending.pop() {
        if is_prime(&m) {
            factors.insert(m);
            continue;
        }
        let d = pollard_rho(&m);
        pending.push(&m / &d);
        pending.push(d);
    }
    factors.into_iter().collect()
}

/// Pollard's rho cycle-finding factorization step.
///
/// `n` must be odd, composite, and free of factors below 100 (guaranteed by
/// the trial division in [`distinct_prime_factors`]).
fn pollard_rho(n: &BigUint) -> BigUint {
    let mut rng = rand::rng();
    let one = BigUint::one();
    loop {
        let c = random_below(&(n - &one), &mut rng) + &one;
        let mut x = random_below(&(n - &one), &mut rng) + &one;
        let mut y = x.clone();
        loop {
            x = (&x * &x + &c) % n;
            y = (&y * &y + &c) % n;
            y = (&y * &y + &c) % n;
            let diff = if x > y { &x - &y } else { &y - &x };
            if diff.is_zero() {
                // Degenerate cycle; restart with a new polynomial.
                break;
            }
            let d = diff.gcd(n);
            if d > one {
                if &d < n {
                    return d;
                }
                break;
            }
        }
    }
}

/// Sample a generator of the full group `Z_P^*`.
///
/// A candidate `c` is accepted only if `c^{(P-1)/q} != 1 mod P` for *every*
/// prime factor `q` of `P-1`; skipping any factor can accept an element of a
/// proper subgroup.
fn find_generator<R: RngCore>(prime: &BigUint, rng: &mut R) -> BigUint {
    let one = BigUint::one();
    let prime_m1 = prime - &one;
    let factors = distinct_prime_factors(prime_m1.clone());
    loop {
        let candidate = random_below(&prime_m1, rng) + &one;
        if factors
            .iter()
            .all(|q| candidate.modpow(&(&prime_m1 / q), prime) != one)
        {
            return candidate;
        }
    }
}
