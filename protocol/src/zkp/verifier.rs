//! # Groth16 Range Proof Verification
//!
//! Every consortium member holds a [`RangeProofVerifier`]. Verification is
//! three pairings plus a small MSM, independent of the circuit size.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, Proof, VerifyingKey};
use ark_serialize::CanonicalDeserialize;
use ark_snark::SNARK;
use tracing::debug;

use super::circuit::public_inputs;
use super::{RangeProof, RangeVerifier};
use crate::crypto::hash::hash_to_field;

/// Holds the Groth16 verification key for the range circuit.
#[derive(Clone)]
pub struct RangeProofVerifier {
    vk: VerifyingKey<Bn254>,
}

impl RangeProofVerifier {
    pub(crate) fn from_vk(vk: VerifyingKey<Bn254>) -> Self {
        Self { vk }
    }
}

/// Split a blob into `(C_v, C_b, proof)`. Trailing bytes are rejected.
fn unpack(blob: &[u8]) -> Option<(Fr, Fr, Proof<Bn254>)> {
    let mut reader = blob;
    let value_commitment = Fr::deserialize_compressed(&mut reader).ok()?;
    let bound_commitment = Fr::deserialize_compressed(&mut reader).ok()?;
    let proof = Proof::<Bn254>::deserialize_compressed(&mut reader).ok()?;
    reader
        .is_empty()
        .then_some((value_commitment, bound_commitment, proof))
}

impl RangeVerifier for RangeProofVerifier {
    fn verify(&self, proof: &RangeProof, context: &[u8]) -> bool {
        let Some((value_commitment, bound_commitment, ark_proof)) = unpack(proof.as_bytes()) else {
            debug!(size = proof.len(), "range proof blob did not decode");
            return false;
        };

        let inputs = public_inputs(value_commitment, bound_commitment, hash_to_field(context));
        Groth16::<Bn254>::verify(&self.vk, &inputs, &ark_proof).unwrap_or(false)
    }
}
