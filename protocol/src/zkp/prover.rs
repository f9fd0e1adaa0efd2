//! # Groth16 Range Proof Generation
//!
//! 1. **Setup**: [`RangeProofProver::setup`] runs the circuit-specific CRS
//!    generation once and returns both halves. In production the CRS comes
//!    from an MPC ceremony instead.
//! 2. **Prove**: commit to value and bound under fresh blindings, fill a
//!    [`RangeProofCircuit`], run `Groth16::prove`, and pack the two
//!    commitments with the proof into one [`RangeProof`] blob.
//!
//! Statements outside `(0, bound]` are refused before the prover runs:
//! ark-groth16 does not report unsatisfied systems gracefully.

use ark_bn254::{Bn254, Fr};
use ark_ff::UniformRand;
use ark_groth16::{Groth16, ProvingKey};
use ark_serialize::CanonicalSerialize;
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, Rng};
use rand::rngs::OsRng;
use tracing::debug;

use super::circuit::{RangeProofCircuit, RangeWitness};
use super::pedersen::{commit, PedersenParams};
use super::verifier::RangeProofVerifier;
use super::{RangeProof, RangeProver};
use crate::crypto::hash::hash_to_field;
use crate::error::{CoreError, CoreResult};

/// Holds the Groth16 proving key for the range circuit.
#[derive(Clone)]
pub struct RangeProofProver {
    pk: ProvingKey<Bn254>,
    params: PedersenParams,
}

impl RangeProofProver {
    /// Generate a CRS for the range circuit.
    pub fn setup<R: Rng + CryptoRng>(rng: &mut R) -> CoreResult<(Self, RangeProofVerifier)> {
        let params = PedersenParams::standard();
        let (pk, vk) =
            Groth16::<Bn254>::circuit_specific_setup(RangeProofCircuit::blank(&params), rng)
                .map_err(|e| CoreError::InvalidState(format!("range circuit setup failed: {e}")))?;

        let verifier = RangeProofVerifier::from_vk(vk);
        Ok((Self { pk, params }, verifier))
    }

    pub fn pedersen_params(&self) -> &PedersenParams {
        &self.params
    }
}

impl RangeProver for RangeProofProver {
    fn prove(&self, value: u64, bound: u64, context: &[u8]) -> CoreResult<RangeProof> {
        if value == 0 || value > bound {
            return Err(CoreError::MalformedInput(
                "amount must lie in (0, bound]".into(),
            ));
        }

        let mut rng = OsRng;
        let value_blinding = Fr::rand(&mut rng);
        let bound_blinding = Fr::rand(&mut rng);
        let witness = RangeWitness {
            value,
            bound,
            value_blinding,
            bound_blinding,
            value_commitment: commit(&self.params, value, value_blinding),
            bound_commitment: commit(&self.params, bound, bound_blinding),
            context: hash_to_field(context),
        };

        let proof = Groth16::<Bn254>::prove(
            &self.pk,
            RangeProofCircuit::new(&self.params, &witness),
            &mut rng,
        )
        .map_err(|e| CoreError::InvalidState(format!("range proof generation failed: {e}")))?;

        let mut bytes = Vec::new();
        witness
            .value_commitment
            .serialize_compressed(&mut bytes)
            .and_then(|_| witness.bound_commitment.serialize_compressed(&mut bytes))
            .and_then(|_| proof.serialize_compressed(&mut bytes))
            .map_err(|e| CoreError::InvalidState(format!("range proof serialization failed: {e}")))?;

        debug!(size = bytes.len(), "range proof generated");
        Ok(RangeProof::from_bytes(bytes))
    }
}
