//! Arithmetic in the multiplicative group of a 32-bit prime field.
//!
//! # Warning
//!
//! 32-bit primes are trivially small for discrete logarithms. This group exists
//! to exercise the shape of the key exchange, not to protect it.

use rand::Rng;

/// Smallest prime accepted as a modulus (leaves room for a secret in `2..=p-2`).
pub const MIN_PRIME: u32 = 5;

/// Range from which prime candidates are drawn (top bit set).
const PRIME_CANDIDATES: std::ops::Range<u64> = (1 << 31)..(1 << 32);

/// Range from which generator candidates are drawn.
const GENERATOR_CANDIDATES: std::ops::Range<u64> = 0xFF..0x1FE;

/// Computes `base^exponent mod modulus`.
pub fn mod_pow(base: u64, mut exponent: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let modulus = modulus as u128;
    let mut base = base as u128 % modulus;
    let mut result = 1u128;
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result * base % modulus;
        }
        base = base * base % modulus;
        exponent >>= 1;
    }
    result as u64
}

/// Trial division primality test.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut divisor = 3u64;
    while divisor * divisor <= n {
        if n % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

/// Returns the largest prime less than or equal to `n` (or `None` if `n < 2`).
pub fn descend_to_prime(mut n: u64) -> Option<u64> {
    while n >= 2 {
        if is_prime(n) {
            return Some(n);
        }
        n -= 1;
    }
    None
}

fn random_prime_below(rng: &mut impl Rng, candidates: std::ops::Range<u64>) -> u32 {
    // Every candidate range starts above 2, so a prime is always found
    let candidate = rng.gen_range(candidates);
    descend_to_prime(candidate).unwrap_or(2) as u32
}

/// Draws a random prime modulus, descending from a candidate in `[2^31, 2^32)`.
pub fn random_prime(rng: &mut impl Rng) -> u32 {
    random_prime_below(rng, PRIME_CANDIDATES)
}

/// Draws a random small prime generator, descending from a candidate in `[0xFF, 0x1FE)`.
pub fn random_generator(rng: &mut impl Rng) -> u32 {
    random_prime_below(rng, GENERATOR_CANDIDATES)
}

/// Draws a secret exponent in `2..=prime-2`.
///
/// `prime` must be at least [MIN_PRIME].
pub fn random_exponent(rng: &mut impl Rng, prime: u32) -> u64 {
    rng.gen_range(2..=(prime as u64 - 2))
}

/// Returns `true` if `value` is a usable group element (`1 < value < prime`).
pub fn is_element(value: u32, prime: u32) -> bool {
    value > 1 && value < prime
}
