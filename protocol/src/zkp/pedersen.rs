//! # Scalar Pedersen Commitments
//!
//! In-circuit commitments `c = v·g + r·h` over the BN254 scalar field. The
//! generators are derived by hashing fixed labels, so every prover and
//! verifier in a deployment agrees on them without a ceremony.
//!
//! These commitments are perfectly hiding. They are **not** binding on
//! their own (anyone can solve for `r` given `v`), which is why the range
//! circuit also binds a public context (the transaction commitment) into
//! every proof.

use ark_bn254::Fr;

use crate::crypto::hash::hash_to_field;

const G_LABEL: &[u8] = b"shroud 2026 pedersen generator g";
const H_LABEL: &[u8] = b"shroud 2026 pedersen generator h";

/// The two scalar generators baked into the range circuit as constants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PedersenParams {
    pub g_scalar: Fr,
    pub h_scalar: Fr,
}

impl PedersenParams {
    /// Deterministic generators shared by every party.
    pub fn standard() -> Self {
        Self {
            g_scalar: hash_to_field(G_LABEL),
            h_scalar: hash_to_field(H_LABEL),
        }
    }
}

impl Default for PedersenParams {
    fn default() -> Self {
        Self::standard()
    }
}

/// `value·g + blinding·h`.
pub fn commit(params: &PedersenParams, value: u64, blinding: Fr) -> Fr {
    Fr::from(value) * params.g_scalar + blinding * params.h_scalar
}
