//! # Byte-wise Shamir Sharing
//!
//! Each byte of the secret is the constant term of its own random
//! polynomial over GF(2^8) (AES reduction polynomial `0x11B`). Holder `i`
//! receives the evaluations at `x = i`, with `i` starting at 1.
//!
//! Identity and role checks live in [`crate::threshold`]; this layer is
//! polynomial arithmetic only.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShamirError {
    #[error("threshold {0} is below the minimum of 2")]
    ThresholdTooLow(usize),

    #[error("{total} shares cannot meet a threshold of {threshold}")]
    InsufficientShares { threshold: usize, total: usize },

    #[error("{0} shares exceed the 255 evaluation points of GF(256)")]
    TooManyShares(usize),

    #[error("refusing to share an empty secret")]
    EmptySecret,

    #[error("interpolation needs at least 2 points, got {0}")]
    NotEnoughShares(usize),

    #[error("share is {got} bytes, expected {expected}")]
    InconsistentShareLengths { expected: usize, got: usize },

    #[error("evaluation point {0} is zero or repeated")]
    DuplicateShareIndex(u8),
}

// ---------------------------------------------------------------------------
// Field element
// ---------------------------------------------------------------------------

/// An element of GF(2^8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gf256(u8);

impl Gf256 {
    const ZERO: Self = Gf256(0);
    const ONE: Self = Gf256(1);

    /// `a^254 = a^-1` for non-zero `a`. Zero maps to zero.
    fn inverse(self) -> Self {
        let mut result = Self::ONE;
        let mut base = self;
        let mut exp = 254u8;
        while exp > 0 {
            if exp & 1 == 1 {
                result = result * base;
            }
            base = base * base;
            exp >>= 1;
        }
        result
    }
}

impl Add for Gf256 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Gf256(self.0 ^ rhs.0)
    }
}

impl Mul for Gf256 {
    type Output = Self;

    /// Shift-and-add with reduction after every doubling. Constant-time in
    /// the operands: always eight rounds, no table lookups.
    fn mul(self, rhs: Self) -> Self {
        let (mut a, mut b, mut product) = (self.0, rhs.0, 0u8);
        for _ in 0..8 {
            product ^= a & 0u8.wrapping_sub(b & 1);
            let carry = 0u8.wrapping_sub(a >> 7);
            a = (a << 1) ^ (carry & 0x1B);
            b >>= 1;
        }
        Gf256(product)
    }
}

impl Div for Gf256 {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        self * rhs.inverse()
    }
}

/// Horner evaluation; `coefficients[0]` is the constant term.
fn evaluate(coefficients: &[Gf256], x: Gf256) -> Gf256 {
    coefficients
        .iter()
        .rev()
        .fold(Gf256::ZERO, |acc, &c| acc * x + c)
}

/// Lagrange basis weights at `x = 0` for distinct non-zero points.
/// In characteristic 2, `0 - x_j = x_j` and `x_i - x_j = x_i + x_j`.
fn weights_at_zero(points: &[Gf256]) -> Vec<Gf256> {
    points
        .iter()
        .enumerate()
        .map(|(i, &xi)| {
            let (num, den) = points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .fold((Gf256::ONE, Gf256::ONE), |(n, d), (_, &xj)| {
                    (n * xj, d * (xi + xj))
                });
            num / den
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Shares
// ---------------------------------------------------------------------------

/// Threshold and share count for one split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShamirConfig {
    pub threshold: usize,
    pub total_shares: usize,
}

impl ShamirConfig {
    pub fn new(threshold: usize, total_shares: usize) -> Result<Self, ShamirError> {
        match (threshold, total_shares) {
            (t, _) if t < 2 => Err(ShamirError::ThresholdTooLow(t)),
            (t, n) if n < t => Err(ShamirError::InsufficientShares {
                threshold: t,
                total: n,
            }),
            (_, n) if n > u8::MAX as usize => Err(ShamirError::TooManyShares(n)),
            (threshold, total_shares) => Ok(Self {
                threshold,
                total_shares,
            }),
        }
    }
}

/// The evaluations of every byte polynomial at `x = index`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub index: u8,
    pub data: Vec<u8>,
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

/// Split `secret` into `config.total_shares` shares at `x = 1..=n`.
pub fn split_secret(secret: &[u8], config: &ShamirConfig) -> Result<Vec<Share>, ShamirError> {
    if secret.is_empty() {
        return Err(ShamirError::EmptySecret);
    }

    let points: Vec<u8> = (1..=config.total_shares as u8).collect();
    let mut data = vec![Vec::with_capacity(secret.len()); points.len()];
    let mut random = vec![0u8; config.threshold - 1];
    let mut coefficients = vec![Gf256::ZERO; config.threshold];

    for &byte in secret {
        OsRng.fill_bytes(&mut random);
        coefficients[0] = Gf256(byte);
        for (slot, &r) in coefficients[1..].iter_mut().zip(&random) {
            *slot = Gf256(r);
        }
        for (column, &x) in data.iter_mut().zip(&points) {
            column.push(evaluate(&coefficients, Gf256(x)).0);
        }
    }

    random.fill(0);
    coefficients.fill(Gf256::ZERO);
    Ok(points
        .into_iter()
        .zip(data)
        .map(|(index, data)| Share { index, data })
        .collect())
}

/// Interpolate the secret from `shares`.
///
/// Below the split threshold the result is a wrong secret, not an error.
/// The caller owns the count check.
pub fn recover_secret(shares: &[Share]) -> Result<Vec<u8>, ShamirError> {
    let Some(first) = shares.first().filter(|_| shares.len() >= 2) else {
        return Err(ShamirError::NotEnoughShares(shares.len()));
    };
    let len = first.data.len();

    let mut seen = [false; 256];
    for share in shares {
        if share.data.len() != len {
            return Err(ShamirError::InconsistentShareLengths {
                expected: len,
                got: share.data.len(),
            });
        }
        if share.index == 0 || std::mem::replace(&mut seen[share.index as usize], true) {
            return Err(ShamirError::DuplicateShareIndex(share.index));
        }
    }

    let points: Vec<Gf256> = shares.iter().map(|s| Gf256(s.index)).collect();
    let weights = weights_at_zero(&points);
    Ok((0..len)
        .map(|k| {
            shares
                .iter()
                .zip(&weights)
                .fold(Gf256::ZERO, |acc, (s, &w)| acc + Gf256(s.data[k]) * w)
                .0
        })
        .collect())
}
