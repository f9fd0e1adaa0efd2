//! # Range Proof R1CS Circuit
//!
//! Statement proved inside Groth16:
//!
//! ```text
//! "I know (v, b, r_v, r_b) such that:
//!     1. v·g + r_v·h = C_v
//!     2. b·g + r_b·h = C_b
//!     3. b − v ∈ [0, 2^64)      (v ≤ b)
//!     4. v − 1 ∈ [0, 2^64)      (v > 0)"
//! ```
//!
//! Both range checks use the bit-decomposition gadget: [`RANGE_BITS`]
//! boolean witnesses recomposed and compared against the difference.
//! Because `2^64` is far below the field modulus, a satisfied system means
//! the difference is a genuine non-negative integer.
//!
//! ## Public inputs (in order)
//!
//! | index | value |
//! |-------|-------|
//! | 0     | value commitment `C_v` |
//! | 1     | bound commitment `C_b` |
//! | 2     | context scalar (hash of the transaction commitment) |
//!
//! The context is squared once so it lands in a multiplication gate; a
//! public input with no constraint would not be bound by the proof.

use ark_bn254::Fr;
use ark_ff::PrimeField;
use ark_r1cs_std::{
    alloc::AllocVar,
    boolean::Boolean,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use super::pedersen::PedersenParams;
use crate::config::RANGE_BITS;

// ---------------------------------------------------------------------------
// Circuit definition
// ---------------------------------------------------------------------------

/// Groth16 circuit for `0 < value ≤ bound` over two hidden commitments.
///
/// Witness slots are `Option` so the same struct drives key generation.
#[derive(Clone)]
pub struct RangeProofCircuit {
    pub g_scalar: Fr,
    pub h_scalar: Fr,

    // private
    pub value: Option<Fr>,
    pub bound: Option<Fr>,
    pub value_blinding: Option<Fr>,
    pub bound_blinding: Option<Fr>,

    // public
    pub value_commitment: Option<Fr>,
    pub bound_commitment: Option<Fr>,
    pub context: Option<Fr>,
}

/// Everything the prover knows about one statement.
#[derive(Clone, Debug)]
pub struct RangeWitness {
    pub value: u64,
    pub bound: u64,
    pub value_blinding: Fr,
    pub bound_blinding: Fr,
    pub value_commitment: Fr,
    pub bound_commitment: Fr,
    pub context: Fr,
}

impl RangeProofCircuit {
    pub fn new(params: &PedersenParams, witness: &RangeWitness) -> Self {
        Self {
            g_scalar: params.g_scalar,
            h_scalar: params.h_scalar,
            value: Some(Fr::from(witness.value)),
            bound: Some(Fr::from(witness.bound)),
            value_blinding: Some(witness.value_blinding),
            bound_blinding: Some(witness.bound_blinding),
            value_commitment: Some(witness.value_commitment),
            bound_commitment: Some(witness.bound_commitment),
            context: Some(witness.context),
        }
    }

    /// Witness-free circuit for CRS generation.
    pub fn blank(params: &PedersenParams) -> Self {
        Self {
            g_scalar: params.g_scalar,
            h_scalar: params.h_scalar,
            value: None,
            bound: None,
            value_blinding: None,
            bound_blinding: None,
            value_commitment: None,
            bound_commitment: None,
            context: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Constraint synthesizer
// ---------------------------------------------------------------------------

impl ConstraintSynthesizer<Fr> for RangeProofCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let value_commitment_var =
            FpVar::<Fr>::new_input(ark_relations::ns!(cs, "value_commitment"), || {
                self.value_commitment.ok_or(SynthesisError::AssignmentMissing)
            })?;
        let bound_commitment_var =
            FpVar::<Fr>::new_input(ark_relations::ns!(cs, "bound_commitment"), || {
                self.bound_commitment.ok_or(SynthesisError::AssignmentMissing)
            })?;
        let context_var = FpVar::<Fr>::new_input(ark_relations::ns!(cs, "context"), || {
            self.context.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let value_var = FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "value"), || {
            self.value.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let bound_var = FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "bound"), || {
            self.bound.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let value_blinding_var =
            FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "value_blinding"), || {
                self.value_blinding.ok_or(SynthesisError::AssignmentMissing)
            })?;
        let bound_blinding_var =
            FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "bound_blinding"), || {
                self.bound_blinding.ok_or(SynthesisError::AssignmentMissing)
            })?;

        let g_var = FpVar::<Fr>::new_constant(ark_relations::ns!(cs, "g_scalar"), self.g_scalar)?;
        let h_var = FpVar::<Fr>::new_constant(ark_relations::ns!(cs, "h_scalar"), self.h_scalar)?;

        // Commitment openings.
        (&value_var * &g_var + &value_blinding_var * &h_var).enforce_equal(&value_commitment_var)?;
        (&bound_var * &g_var + &bound_blinding_var * &h_var).enforce_equal(&bound_commitment_var)?;

        // v ≤ b
        let headroom_var = &bound_var - &value_var;
        let headroom_bits = difference_bits(self.bound, self.value);
        enforce_u64(cs.clone(), &headroom_var, headroom_bits)?;

        // v > 0
        let one = FpVar::<Fr>::one();
        let floor_var = &value_var - &one;
        let floor_bits = difference_bits(self.value, Some(Fr::from(1u64)));
        enforce_u64(cs.clone(), &floor_var, floor_bits)?;

        let _context_square = &context_var * &context_var;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Enforce `target ∈ [0, 2^RANGE_BITS)` by recomposing boolean witnesses.
fn enforce_u64(
    cs: ConstraintSystemRef<Fr>,
    target: &FpVar<Fr>,
    bits: Option<Vec<bool>>,
) -> Result<(), SynthesisError> {
    let mut reconstructed = FpVar::<Fr>::zero();
    let mut power_of_two = FpVar::<Fr>::one();
    let two = FpVar::<Fr>::constant(Fr::from(2u64));

    for i in 0..RANGE_BITS {
        let bit = Boolean::<Fr>::new_witness(ark_relations::ns!(cs, "range_bit"), || {
            bits.as_ref()
                .map(|bits| bits[i])
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        reconstructed += FpVar::<Fr>::from(bit) * &power_of_two;
        power_of_two *= &two;
    }

    reconstructed.enforce_equal(target)
}

/// Little-endian bits of `a − b` (mod r), truncated to [`RANGE_BITS`].
/// `None` in key-generation mode.
fn difference_bits(a: Option<Fr>, b: Option<Fr>) -> Option<Vec<bool>> {
    let delta = a? - b?;
    let bigint = delta.into_bigint();
    Some(
        bigint
            .0
            .iter()
            .flat_map(|limb| (0..64).map(move |i| (limb >> i) & 1 == 1))
            .take(RANGE_BITS)
            .collect(),
    )
}

/// Public input vector in allocation order.
pub fn public_inputs(value_commitment: Fr, bound_commitment: Fr, context: Fr) -> Vec<Fr> {
    vec![value_commitment, bound_commitment, context]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zkp::pedersen::commit;
    use ark_ff::UniformRand;
    use ark_relations::r1cs::ConstraintSystem;
    use ark_std::rand::{rngs::StdRng, SeedableRng};

    fn witness(value: u64, bound: u64) -> RangeWitness {
        let mut rng = StdRng::seed_from_u64(42);
        let params = PedersenParams::standard();
        let value_blinding = Fr::rand(&mut rng);
        let bound_blinding = Fr::rand(&mut rng);
        RangeWitness {
            value,
            bound,
            value_blinding,
            bound_blinding,
            value_commitment: commit(&params, value, value_blinding),
            bound_commitment: commit(&params, bound, bound_blinding),
            context: Fr::from(7u64),
        }
    }

    fn satisfied(witness: &RangeWitness) -> bool {
        let params = PedersenParams::standard();
        let cs = ConstraintSystem::<Fr>::new_ref();
        RangeProofCircuit::new(&params, witness)
            .generate_constraints(cs.clone())
            .unwrap();
        cs.is_satisfied().unwrap()
    }

    #[test]
    fn value_inside_bound_satisfies() {
        assert!(satisfied(&witness(250, 1_000)));
    }

    #[test]
    fn value_equal_to_bound_satisfies() {
        assert!(satisfied(&witness(1_000, 1_000)));
    }

    #[test]
    fn value_above_bound_unsatisfied() {
        assert!(!satisfied(&witness(1_001, 1_000)));
    }

    #[test]
    fn zero_value_unsatisfied() {
        assert!(!satisfied(&witness(0, 1_000)));
    }

    #[test]
    fn extreme_values_satisfy() {
        assert!(satisfied(&witness(u64::MAX, u64::MAX)));
        assert!(satisfied(&witness(1, u64::MAX)));
    }

    #[test]
    fn wrong_commitment_unsatisfied() {
        let mut w = witness(10, 20);
        w.value_commitment += Fr::from(1u64);
        assert!(!satisfied(&w));
    }

    #[test]
    fn circuit_stays_compact() {
        let params = PedersenParams::standard();
        let cs = ConstraintSystem::<Fr>::new_ref();
        RangeProofCircuit::new(&params, &witness(5, 9))
            .generate_constraints(cs.clone())
            .unwrap();
        let n = cs.num_constraints();
        assert!(n >= 2 * RANGE_BITS, "expected both decompositions, got {n}");
        assert!(n < 400, "circuit grew unexpectedly: {n}");
    }
}
