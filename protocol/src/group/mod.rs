//! # Group Signature Authority
//!
//! Anonymous attestation for consortium votes, built as a roster scheme
//! with a trusted opener:
//!
//! 1. [`GroupAuthority::setup`] enrolls every member and hands each a
//!    [`MemberSecret`] (a 32-byte seed). The opener receives an
//!    [`OpenerKey`].
//! 2. For every voting round the authority publishes a [`Roster`]: one
//!    one-time Ed25519 *pseudonym* key per enrolled member, derived from the
//!    member seed and the round number, sorted by key. Each entry carries the
//!    member id sealed under the opener key (AES-GCM, random nonce).
//! 3. A member signs with its pseudonym key for that round. A verifier only
//!    checks "this key is on the round's roster and the signature is valid"
//!    and so learns nothing beyond "some enrolled member".
//! 4. The opener decrypts the sealed identity of a signature. Every opening
//!    is recorded on the audit sink.
//!
//! Pseudonyms are deterministic per `(member, round)`, so two votes in one
//! round with the same pseudonym come from the same member. Pseudonyms in
//! different rounds are unlinkable without the opener key.
//!
//! Revocation drops the member from rosters published afterwards. Rosters
//! already published, and signatures made against them, stay valid;
//! [`GroupAuthority::is_active_pseudonym`] is how a ballot drops them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::collab::AuditSink;
use crate::config::{AES_KEY_LENGTH, DOMAIN_GROUP_SIGNATURE, DOMAIN_PSEUDONYM};
use crate::crypto::encryption::{generate_key, open as aes_open, seal};
use crate::crypto::hash::domain_separated_hash_multi;
use crate::crypto::keys::{ShroudKeypair, ShroudPublicKey, ShroudSignature};
use crate::error::{CoreError, CoreResult};
use crate::types::MemberId;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Voting round identifier. Each ballot gets its own round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub u64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round-{}", self.0)
    }
}

/// A member's signing secret.
#[derive(Clone)]
pub struct MemberSecret {
    member: MemberId,
    seed: [u8; 32],
}

impl MemberSecret {
    pub fn member(&self) -> &MemberId {
        &self.member
    }

    fn pseudonym(&self, round: RoundId) -> ShroudKeypair {
        pseudonym_keypair(&self.seed, round)
    }
}

impl fmt::Debug for MemberSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberSecret({}, <redacted>)", self.member)
    }
}

/// The opener's decryption key for sealed identities.
pub struct OpenerKey([u8; AES_KEY_LENGTH]);

impl fmt::Debug for OpenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OpenerKey(<redacted>)")
    }
}

fn pseudonym_keypair(seed: &[u8; 32], round: RoundId) -> ShroudKeypair {
    let derived =
        domain_separated_hash_multi(DOMAIN_PSEUDONYM, &[seed, &round.0.to_be_bytes()]);
    ShroudKeypair::from_seed(&derived)
}

fn identity_aad(round: RoundId, pseudonym: &ShroudPublicKey) -> Vec<u8> {
    let mut aad = round.0.to_be_bytes().to_vec();
    aad.extend_from_slice(pseudonym.as_bytes());
    aad
}

fn signing_message(round: RoundId, message: &[u8]) -> [u8; 32] {
    domain_separated_hash_multi(DOMAIN_GROUP_SIGNATURE, &[&round.0.to_be_bytes(), message])
}

// ---------------------------------------------------------------------------
// Rosters and signatures
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub pseudonym: ShroudPublicKey,
    pub sealed_identity: Vec<u8>,
}

/// The published pseudonym set for one round, sorted by key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Roster {
    pub round: RoundId,
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, pseudonym: &ShroudPublicKey) -> Option<&RosterEntry> {
        self.entries
            .binary_search_by(|e| e.pseudonym.cmp(pseudonym))
            .ok()
            .map(|i| &self.entries[i])
    }
}

/// Anonymous signature: a pseudonym signature plus the opening tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSignature {
    pub round: RoundId,
    pub pseudonym: ShroudPublicKey,
    pub sealed_identity: Vec<u8>,
    pub signature: ShroudSignature,
}

/// Sign `message` as an anonymous member of `roster`.
pub fn sign(message: &[u8], secret: &MemberSecret, roster: &Roster) -> CoreResult<GroupSignature> {
    let keypair = secret.pseudonym(roster.round);
    let pseudonym = keypair.public_key();
    let entry = roster.entry(&pseudonym).ok_or_else(|| {
        CoreError::GroupSignature(format!("signer is not on the roster for {}", roster.round))
    })?;

    Ok(GroupSignature {
        round: roster.round,
        pseudonym,
        sealed_identity: entry.sealed_identity.clone(),
        signature: keypair.sign(&signing_message(roster.round, message)),
    })
}

/// Reveal the signer. Every attempt is reported to `audit`.
pub fn open(
    signature: &GroupSignature,
    opener: &OpenerKey,
    audit: &dyn AuditSink,
    at: DateTime<Utc>,
) -> CoreResult<MemberId> {
    let aad = identity_aad(signature.round, &signature.pseudonym);
    let opened = aes_open(&opener.0, &signature.sealed_identity, &aad)
        .map_err(CoreError::from)
        .and_then(|bytes| {
            String::from_utf8(bytes)
                .map(MemberId::new)
                .map_err(|_| CoreError::GroupSignature("sealed identity is not UTF-8".into()))
        });

    match &opened {
        Ok(member) => {
            info!(round = %signature.round, %member, "group signature opened");
            audit.record(
                "group_signature_opened",
                json!({
                    "round": signature.round.0,
                    "pseudonym": signature.pseudonym.to_hex(),
                    "member": member.as_str(),
                }),
                at,
            );
        }
        Err(e) => {
            warn!(round = %signature.round, error = %e, "group signature opening failed");
            audit.record(
                "group_signature_open_failed",
                json!({
                    "round": signature.round.0,
                    "pseudonym": signature.pseudonym.to_hex(),
                    "error": e.to_string(),
                }),
                at,
            );
        }
    }
    opened
}

// ---------------------------------------------------------------------------
// Authority
// ---------------------------------------------------------------------------

struct Enrollment {
    seed: [u8; 32],
    revoked: bool,
}

/// Issues member secrets and publishes per-round rosters.
pub struct GroupAuthority {
    opener_key: [u8; AES_KEY_LENGTH],
    enrolled: RwLock<BTreeMap<MemberId, Enrollment>>,
    rosters: RwLock<HashMap<RoundId, Arc<Roster>>>,
}

impl GroupAuthority {
    /// One-time setup for the initial membership.
    pub fn setup(members: &[MemberId]) -> CoreResult<(Self, Vec<MemberSecret>, OpenerKey)> {
        if members.is_empty() {
            return Err(CoreError::MalformedInput("group needs at least one member".into()));
        }

        let opener_key = generate_key();
        let authority = Self {
            opener_key,
            enrolled: RwLock::new(BTreeMap::new()),
            rosters: RwLock::new(HashMap::new()),
        };
        let secrets = members
            .iter()
            .map(|m| authority.enroll(m.clone()))
            .collect::<CoreResult<Vec<_>>>()?;

        info!(members = secrets.len(), "group authority set up");
        Ok((authority, secrets, OpenerKey(opener_key)))
    }

    /// Enroll an additional member.
    pub fn enroll(&self, member: MemberId) -> CoreResult<MemberSecret> {
        let mut enrolled = self.enrolled.write();
        if enrolled.contains_key(&member) {
            return Err(CoreError::MalformedInput(format!("{member} already enrolled")));
        }
        let seed = generate_key();
        enrolled.insert(
            member.clone(),
            Enrollment {
                seed,
                revoked: false,
            },
        );
        Ok(MemberSecret { member, seed })
    }

    /// Publish (or fetch) the roster for `round`.
    pub fn open_round(&self, round: RoundId) -> CoreResult<Arc<Roster>> {
        if let Some(existing) = self.rosters.read().get(&round) {
            return Ok(existing.clone());
        }

        let mut entries = {
            let enrolled = self.enrolled.read();
            enrolled
                .iter()
                .filter(|(_, e)| !e.revoked)
                .map(|(member, e)| {
                    let pseudonym = pseudonym_keypair(&e.seed, round).public_key();
                    let sealed_identity = seal(
                        &self.opener_key,
                        member.as_str().as_bytes(),
                        &identity_aad(round, &pseudonym),
                    )?;
                    Ok(RosterEntry {
                        pseudonym,
                        sealed_identity,
                    })
                })
                .collect::<CoreResult<Vec<_>>>()?
        };
        entries.sort_by(|a, b| a.pseudonym.cmp(&b.pseudonym));

        let roster = Arc::new(Roster { round, entries });
        let mut rosters = self.rosters.write();
        let published = rosters.entry(round).or_insert(roster).clone();
        debug!(%round, size = published.len(), "roster published");
        Ok(published)
    }

    pub fn roster(&self, round: RoundId) -> Option<Arc<Roster>> {
        self.rosters.read().get(&round).cloned()
    }

    /// Accept iff the signer's pseudonym is on the published roster for the
    /// signature's round and the Ed25519 signature is valid.
    pub fn verify(&self, message: &[u8], signature: &GroupSignature) -> bool {
        let Some(roster) = self.roster(signature.round) else {
            return false;
        };
        let Some(entry) = roster.entry(&signature.pseudonym) else {
            return false;
        };
        entry.sealed_identity == signature.sealed_identity
            && signature
                .pseudonym
                .verify(&signing_message(signature.round, message), &signature.signature)
    }

    /// Exclude `member` from every roster published from now on.
    pub fn revoke(&self, member: &MemberId) -> CoreResult<()> {
        self.set_revoked(member, true)?;
        info!(%member, "group membership revoked");
        Ok(())
    }

    /// Undo a revocation.
    pub fn reinstate(&self, member: &MemberId) -> CoreResult<()> {
        self.set_revoked(member, false)?;
        info!(%member, "group membership reinstated");
        Ok(())
    }

    fn set_revoked(&self, member: &MemberId, revoked: bool) -> CoreResult<()> {
        let mut enrolled = self.enrolled.write();
        let entry = enrolled
            .get_mut(member)
            .ok_or_else(|| CoreError::NotFound(format!("group member {member}")))?;
        entry.revoked = revoked;
        Ok(())
    }

    pub fn is_enrolled(&self, member: &MemberId) -> bool {
        self.enrolled
            .read()
            .get(member)
            .map(|e| !e.revoked)
            .unwrap_or(false)
    }

    /// Whether `pseudonym` belongs to a member who is not revoked right now.
    /// Unlike [`verify`](Self::verify) this tracks revocations made after
    /// the round's roster was published.
    pub fn is_active_pseudonym(&self, round: RoundId, pseudonym: &ShroudPublicKey) -> bool {
        self.enrolled
            .read()
            .values()
            .filter(|e| !e.revoked)
            .any(|e| pseudonym_keypair(&e.seed, round).public_key() == *pseudonym)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MemoryAuditLog;

    fn members(n: usize) -> Vec<MemberId> {
        (0..n).map(|i| MemberId::new(format!("bank-{i:02}"))).collect()
    }

    #[test]
    fn member_signature_verifies_and_opens() {
        let (authority, secrets, opener) = GroupAuthority::setup(&members(4)).unwrap();
        let roster = authority.open_round(RoundId(1)).unwrap();
        let sig = sign(b"approve batch-1", &secrets[2], &roster).unwrap();

        assert!(authority.verify(b"approve batch-1", &sig));
        assert!(!authority.verify(b"approve batch-2", &sig));

        let audit = MemoryAuditLog::new();
        let member = open(&sig, &opener, &audit, Utc::now()).unwrap();
        assert_eq!(member, MemberId::new("bank-02"));
        assert_eq!(audit.events_of("group_signature_opened").len(), 1);
    }

    #[test]
    fn roster_hides_enrollment_order() {
        let (authority, _, _) = GroupAuthority::setup(&members(6)).unwrap();
        let roster = authority.open_round(RoundId(9)).unwrap();
        let keys: Vec<_> = roster.entries().iter().map(|e| e.pseudonym).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(roster.len(), 6);
    }

    #[test]
    fn pseudonyms_change_every_round() {
        let (authority, secrets, _) = GroupAuthority::setup(&members(2)).unwrap();
        let r1 = authority.open_round(RoundId(1)).unwrap();
        let r2 = authority.open_round(RoundId(2)).unwrap();
        let a = sign(b"m", &secrets[0], &r1).unwrap();
        let b = sign(b"m", &secrets[0], &r2).unwrap();
        assert_ne!(a.pseudonym, b.pseudonym);
        assert_ne!(a.sealed_identity, b.sealed_identity);
    }

    #[test]
    fn same_round_pseudonym_is_stable() {
        let (authority, secrets, _) = GroupAuthority::setup(&members(2)).unwrap();
        let roster = authority.open_round(RoundId(5)).unwrap();
        let a = sign(b"approve", &secrets[1], &roster).unwrap();
        let b = sign(b"reject", &secrets[1], &roster).unwrap();
        assert_eq!(a.pseudonym, b.pseudonym);
    }

    #[test]
    fn open_round_is_idempotent() {
        let (authority, _, _) = GroupAuthority::setup(&members(3)).unwrap();
        let a = authority.open_round(RoundId(1)).unwrap();
        let b = authority.open_round(RoundId(1)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn revocation_blocks_future_rounds_only() {
        let (authority, secrets, _) = GroupAuthority::setup(&members(3)).unwrap();
        let before = authority.open_round(RoundId(1)).unwrap();
        let past = sign(b"m", &secrets[0], &before).unwrap();

        authority.revoke(secrets[0].member()).unwrap();
        let after = authority.open_round(RoundId(2)).unwrap();

        assert_eq!(after.len(), 2);
        assert!(sign(b"m", &secrets[0], &after).is_err());
        assert!(authority.verify(b"m", &past));

        authority.reinstate(secrets[0].member()).unwrap();
        let again = authority.open_round(RoundId(3)).unwrap();
        assert!(sign(b"m", &secrets[0], &again).is_ok());
    }

    #[test]
    fn revoked_member_pseudonym_is_inactive_in_open_round() {
        let (authority, secrets, _) = GroupAuthority::setup(&members(3)).unwrap();
        let roster = authority.open_round(RoundId(4)).unwrap();
        let sig = sign(b"m", &secrets[1], &roster).unwrap();
        assert!(authority.is_active_pseudonym(RoundId(4), &sig.pseudonym));
        assert!(!authority.is_active_pseudonym(RoundId(5), &sig.pseudonym));

        authority.revoke(secrets[1].member()).unwrap();
        assert!(authority.verify(b"m", &sig));
        assert!(!authority.is_active_pseudonym(RoundId(4), &sig.pseudonym));

        authority.reinstate(secrets[1].member()).unwrap();
        assert!(authority.is_active_pseudonym(RoundId(4), &sig.pseudonym));
    }

    #[test]
    fn forged_opening_tag_rejected() {
        let (authority, secrets, _) = GroupAuthority::setup(&members(2)).unwrap();
        let roster = authority.open_round(RoundId(1)).unwrap();
        let mut sig = sign(b"m", &secrets[0], &roster).unwrap();
        sig.sealed_identity = roster.entries()[0].sealed_identity.clone();
        if roster.entries()[0].pseudonym != sig.pseudonym {
            assert!(!authority.verify(b"m", &sig));
        }
    }

    #[test]
    fn outsider_cannot_sign() {
        let (authority, _, _) = GroupAuthority::setup(&members(2)).unwrap();
        let (_, outsiders, _) = GroupAuthority::setup(&members(2)).unwrap();
        let roster = authority.open_round(RoundId(1)).unwrap();
        assert!(sign(b"m", &outsiders[0], &roster).is_err());
    }

    #[test]
    fn wrong_opener_key_fails_and_is_audited() {
        let (authority, secrets, _) = GroupAuthority::setup(&members(2)).unwrap();
        let (_, _, other_opener) = GroupAuthority::setup(&members(1)).unwrap();
        let roster = authority.open_round(RoundId(1)).unwrap();
        let sig = sign(b"m", &secrets[0], &roster).unwrap();

        let audit = MemoryAuditLog::new();
        assert!(open(&sig, &other_opener, &audit, Utc::now()).is_err());
        assert_eq!(audit.events_of("group_signature_open_failed").len(), 1);
    }

    #[test]
    fn unknown_round_does_not_verify() {
        let (authority, secrets, _) = GroupAuthority::setup(&members(2)).unwrap();
        let roster = authority.open_round(RoundId(1)).unwrap();
        let mut sig = sign(b"m", &secrets[0], &roster).unwrap();
        sig.round = RoundId(77);
        assert!(!authority.verify(b"m", &sig));
    }
}
