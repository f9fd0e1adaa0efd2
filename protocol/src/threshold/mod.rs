//! # Threshold Access Controller
//!
//! Splits an escrow key under a constrained access structure: every
//! *mandatory* holder plus exactly `alternate_threshold` of the *alternate*
//! holders. The reference structure is two mandatory holders and one of
//! three alternates, i.e. a 3-of-5 polynomial.
//!
//! A 3-of-5 polynomial alone would happily reconstruct from three
//! alternates. [`reconstruct`] therefore runs a policy gate first, and the
//! gate works on *signed* [`ShareSubmission`]s: each holder signs the share
//! it presents, so a share can only count for the role of the key that
//! signed it. Interpolation runs only after the gate passes.
//!
//! Reconstruction is pure: no state is read or written, so it can run in
//! parallel with anything else.

pub mod shamir;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{ALTERNATE_HOLDERS, DOMAIN_SHARE_SUBMISSION, MANDATORY_HOLDERS};
use crate::crypto::hash::{domain_separated_hash_multi, sha256};
use crate::crypto::keys::{ShroudKeypair, ShroudPublicKey, ShroudSignature};
use crate::error::{CoreError, CoreResult};
use crate::types::PartyId;

use shamir::{recover_secret, split_secret, ShamirConfig, Share};

// ---------------------------------------------------------------------------
// Access policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HolderRole {
    Mandatory,
    Alternate,
}

/// One registered share holder and the evaluation point it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareHolder {
    pub party: PartyId,
    pub role: HolderRole,
    pub public_key: ShroudPublicKey,
    pub index: u8,
}

/// Who may hold a share and which combinations unlock the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    id: Uuid,
    holders: Vec<ShareHolder>,
    alternate_threshold: usize,
}

impl AccessPolicy {
    /// Mandatory holders get indices `1..=m`, alternates follow.
    pub fn new(
        mandatory: Vec<(PartyId, ShroudPublicKey)>,
        alternates: Vec<(PartyId, ShroudPublicKey)>,
        alternate_threshold: usize,
    ) -> CoreResult<Self> {
        if mandatory.is_empty() {
            return Err(CoreError::MalformedInput(
                "access policy needs at least one mandatory holder".into(),
            ));
        }
        if alternate_threshold == 0 || alternate_threshold > alternates.len() {
            return Err(CoreError::MalformedInput(format!(
                "alternate threshold {alternate_threshold} outside 1..={}",
                alternates.len()
            )));
        }

        let total = mandatory.len() + alternates.len();
        ShamirConfig::new(mandatory.len() + alternate_threshold, total)?;

        let mut seen = HashSet::new();
        let mut holders = Vec::with_capacity(total);
        let roles = mandatory
            .into_iter()
            .map(|h| (h, HolderRole::Mandatory))
            .chain(alternates.into_iter().map(|h| (h, HolderRole::Alternate)));

        for (i, ((party, public_key), role)) in roles.enumerate() {
            if !seen.insert(party.clone()) {
                return Err(CoreError::MalformedInput(format!(
                    "party {party} listed twice in access policy"
                )));
            }
            holders.push(ShareHolder {
                party,
                role,
                public_key,
                index: (i + 1) as u8,
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            holders,
            alternate_threshold,
        })
    }

    /// The reference escrow structure: both mandatory holders and one of
    /// the three alternates.
    pub fn escrow(
        mandatory: Vec<(PartyId, ShroudPublicKey)>,
        alternates: Vec<(PartyId, ShroudPublicKey)>,
    ) -> CoreResult<Self> {
        if mandatory.len() != MANDATORY_HOLDERS || alternates.len() != ALTERNATE_HOLDERS {
            return Err(CoreError::MalformedInput(format!(
                "escrow policy needs {MANDATORY_HOLDERS} mandatory and {ALTERNATE_HOLDERS} alternate holders, got {} and {}",
                mandatory.len(),
                alternates.len()
            )));
        }
        Self::new(mandatory, alternates, 1)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn holders(&self) -> &[ShareHolder] {
        &self.holders
    }

    pub fn holder(&self, party: &PartyId) -> Option<&ShareHolder> {
        self.holders.iter().find(|h| &h.party == party)
    }

    pub fn mandatory(&self) -> impl Iterator<Item = &ShareHolder> {
        self.holders
            .iter()
            .filter(|h| h.role == HolderRole::Mandatory)
    }

    pub fn alternates(&self) -> impl Iterator<Item = &ShareHolder> {
        self.holders
            .iter()
            .filter(|h| h.role == HolderRole::Alternate)
    }

    pub fn alternate_threshold(&self) -> usize {
        self.alternate_threshold
    }

    /// Polynomial threshold: `|mandatory| + alternate_threshold`.
    pub fn threshold(&self) -> usize {
        self.mandatory().count() + self.alternate_threshold
    }

    fn shamir_config(&self) -> CoreResult<ShamirConfig> {
        Ok(ShamirConfig::new(self.threshold(), self.holders.len())?)
    }
}

// ---------------------------------------------------------------------------
// Shares and submissions
// ---------------------------------------------------------------------------

/// A share addressed to one holder of one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdShare {
    pub policy_id: Uuid,
    pub holder: PartyId,
    pub role: HolderRole,
    pub share: Share,
}

/// A share presented for reconstruction, signed by its holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareSubmission {
    pub share: ThresholdShare,
    pub signature: ShroudSignature,
}

impl ShareSubmission {
    /// Sign `share` with the holder's key.
    pub fn sign(share: ThresholdShare, holder_key: &ShroudKeypair) -> Self {
        let message = submission_message(&share);
        Self {
            signature: holder_key.sign(&message),
            share,
        }
    }
}

fn submission_message(share: &ThresholdShare) -> [u8; 32] {
    let share_digest = sha256(&share.share.data);
    domain_separated_hash_multi(
        DOMAIN_SHARE_SUBMISSION,
        &[
            share.policy_id.as_bytes(),
            share.holder.as_str().as_bytes(),
            &[share.share.index],
            share_digest.as_bytes(),
        ],
    )
}

// ---------------------------------------------------------------------------
// Split / gate / reconstruct
// ---------------------------------------------------------------------------

/// Split `secret` into one share per policy holder.
pub fn split(secret: &[u8], policy: &AccessPolicy) -> CoreResult<Vec<ThresholdShare>> {
    let raw = split_secret(secret, &policy.shamir_config()?)?;

    let shares = policy
        .holders
        .iter()
        .zip(raw)
        .map(|(holder, share)| ThresholdShare {
            policy_id: policy.id,
            holder: holder.party.clone(),
            role: holder.role,
            share,
        })
        .collect::<Vec<_>>();

    debug!(
        policy = %policy.id,
        shares = shares.len(),
        threshold = policy.threshold(),
        "secret split"
    );
    Ok(shares)
}

/// The policy gate. Accepts iff every submission is authentic for its
/// holder, every mandatory holder is present, and exactly
/// `alternate_threshold` alternates are present.
pub fn check_access(policy: &AccessPolicy, submissions: &[ShareSubmission]) -> CoreResult<()> {
    let violation = |reason: String| {
        warn!(policy = %policy.id, %reason, "share set rejected");
        Err(CoreError::AccessStructureViolation(reason))
    };

    let mut presented = HashSet::new();
    let mut mandatory_present = 0usize;
    let mut alternates_present = 0usize;

    for submission in submissions {
        let share = &submission.share;
        if share.policy_id != policy.id {
            return violation(format!("share from foreign policy {}", share.policy_id));
        }
        let Some(holder) = policy.holder(&share.holder) else {
            return violation(format!("{} is not a registered holder", share.holder));
        };
        if holder.index != share.share.index || holder.role != share.role {
            return violation(format!("{} presented a share outside its role", holder.party));
        }
        if !holder
            .public_key
            .verify(&submission_message(share), &submission.signature)
        {
            return violation(format!("signature from {} does not verify", holder.party));
        }
        if !presented.insert(holder.index) {
            return violation(format!("{} presented twice", holder.party));
        }
        match holder.role {
            HolderRole::Mandatory => mandatory_present += 1,
            HolderRole::Alternate => alternates_present += 1,
        }
    }

    let mandatory_required = policy.mandatory().count();
    if mandatory_present != mandatory_required {
        return violation(format!(
            "{mandatory_present} of {mandatory_required} mandatory holders present"
        ));
    }
    if alternates_present != policy.alternate_threshold {
        return violation(format!(
            "{alternates_present} alternates present, exactly {} required",
            policy.alternate_threshold
        ));
    }
    Ok(())
}

/// Gate, then interpolate. Returns the exact original secret.
pub fn reconstruct(policy: &AccessPolicy, submissions: &[ShareSubmission]) -> CoreResult<Vec<u8>> {
    check_access(policy, submissions)?;

    let shares: Vec<Share> = submissions.iter().map(|s| s.share.share.clone()).collect();
    Ok(recover_secret(&shares)?)
}
