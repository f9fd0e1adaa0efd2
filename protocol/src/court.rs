//! # Court-Access Orchestrator
//!
//! Lawful access to one transaction's private payload.
//!
//! At submission time the payload is sealed under a fresh AES-256-GCM key
//! and the key is split under the escrow [`AccessPolicy`]; only shares leave
//! the orchestrator. Later a judge obtains a [`CourtAccessGrant`] naming the
//! transaction and the one alternate authority that will join the mandatory
//! holders. The grant is inert from `expires_at` on: no decryption succeeds
//! after that instant, whatever shares are presented.
//!
//! Every grant request and every decrypt attempt is audited with its full
//! parameters, except the reconstructed key and the plaintext.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collab::{AuditSink, Clock, CredentialVerifier, JudgeCredential};
use crate::config::ProtocolConfig;
use crate::consensus::ConsensusEngine;
use crate::crypto::encryption::{generate_key, open_checked, seal};
use crate::error::{CoreError, CoreResult};
use crate::threshold::{reconstruct, split, AccessPolicy, HolderRole, ShareSubmission, ThresholdShare};
use crate::types::{AccountId, Digest, PartyId};

/// Read access to the freeze set.
pub trait FreezeStatus: Send + Sync {
    fn is_frozen(&self, account: &AccountId) -> bool;
}

impl FreezeStatus for ConsensusEngine {
    fn is_frozen(&self, account: &AccountId) -> bool {
        ConsensusEngine::is_frozen(self, account)
    }
}

/// A sealed private payload and the policy its key was split under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowedPayload {
    pub transaction: Digest,
    pub subject: AccountId,
    pub policy: AccessPolicy,
    pub ciphertext: Vec<u8>,
}

impl EscrowedPayload {
    fn aad(transaction: &Digest, subject: &AccountId) -> Vec<u8> {
        let mut aad = transaction.as_bytes().to_vec();
        aad.extend_from_slice(subject.as_str().as_bytes());
        aad
    }
}

/// Time-boxed authorization to decrypt one transaction's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtAccessGrant {
    pub id: Uuid,
    pub transaction: Digest,
    pub judge: PartyId,
    pub alternate: PartyId,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CourtAccessGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub struct CourtAccessOrchestrator {
    grant_ttl: chrono::Duration,
    requires_frozen_subject: bool,
    credentials: Arc<dyn CredentialVerifier>,
    freeze: Arc<dyn FreezeStatus>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    payloads: DashMap<Digest, EscrowedPayload>,
    grants: DashMap<Uuid, CourtAccessGrant>,
}

impl CourtAccessOrchestrator {
    pub fn new(
        config: &ProtocolConfig,
        credentials: Arc<dyn CredentialVerifier>,
        freeze: Arc<dyn FreezeStatus>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            grant_ttl: config.court_grant_ttl(),
            requires_frozen_subject: config.court_requires_frozen_subject,
            credentials,
            freeze,
            audit,
            clock,
            payloads: DashMap::new(),
            grants: DashMap::new(),
        }
    }

    /// Seal `plaintext` for `transaction` and split its key under `policy`.
    /// Returns one share per holder, to be handed out.
    pub fn escrow_payload(
        &self,
        transaction: Digest,
        subject: AccountId,
        plaintext: &[u8],
        policy: AccessPolicy,
    ) -> CoreResult<Vec<ThresholdShare>> {
        if self.payloads.contains_key(&transaction) {
            return Err(CoreError::InvalidState(format!(
                "payload for {transaction} already escrowed"
            )));
        }
        let key = generate_key();
        let ciphertext = seal(&key, plaintext, &EscrowedPayload::aad(&transaction, &subject))?;
        let shares = split(&key, &policy)?;

        self.audit.record(
            "payload_escrowed",
            json!({
                "transaction": transaction.to_hex(),
                "subject": subject.as_str(),
                "policy": policy.id().to_string(),
                "holders": policy.holders().iter().map(|h| h.party.as_str()).collect::<Vec<_>>(),
            }),
            self.clock.now(),
        );
        self.payloads.insert(
            transaction,
            EscrowedPayload {
                transaction,
                subject,
                policy,
                ciphertext,
            },
        );
        Ok(shares)
    }

    pub fn payload(&self, transaction: &Digest) -> Option<EscrowedPayload> {
        self.payloads.get(transaction).map(|p| p.clone())
    }

    /// Validate the judge and issue a grant expiring `grant_ttl` from now.
    pub fn request_grant(
        &self,
        transaction: Digest,
        credential: &JudgeCredential,
        alternate: PartyId,
    ) -> CoreResult<CourtAccessGrant> {
        let now = self.clock.now();
        let refuse = |error: CoreError| {
            self.audit.record(
                "court_grant_refused",
                json!({
                    "transaction": transaction.to_hex(),
                    "judge": credential.judge.as_str(),
                    "alternate": alternate.as_str(),
                    "reason": error.to_string(),
                }),
                now,
            );
            warn!(%transaction, judge = %credential.judge, error = %error, "court grant refused");
            Err(error)
        };

        let Some(payload) = self.payload(&transaction) else {
            return refuse(CoreError::NotFound(format!("escrowed payload for {transaction}")));
        };
        let Some(judge) = self.credentials.verify(credential, &transaction) else {
            return refuse(CoreError::AccessStructureViolation(format!(
                "credential of {} does not authorize access to {transaction}",
                credential.judge
            )));
        };
        let is_alternate = payload
            .policy
            .holder(&alternate)
            .map(|h| h.role == HolderRole::Alternate)
            .unwrap_or(false);
        if !is_alternate {
            return refuse(CoreError::AccessStructureViolation(format!(
                "{alternate} is not an alternate holder"
            )));
        }
        if self.requires_frozen_subject && !self.freeze.is_frozen(&payload.subject) {
            return refuse(CoreError::InvalidState(format!(
                "subject account {} is not frozen",
                payload.subject
            )));
        }

        let grant = CourtAccessGrant {
            id: Uuid::new_v4(),
            transaction,
            judge,
            alternate,
            granted_at: now,
            expires_at: now + self.grant_ttl,
        };
        self.grants.insert(grant.id, grant.clone());
        self.audit.record(
            "court_grant_issued",
            json!({
                "grant": grant.id.to_string(),
                "transaction": transaction.to_hex(),
                "judge": grant.judge.as_str(),
                "alternate": grant.alternate.as_str(),
                "expires_at": grant.expires_at.to_rfc3339(),
            }),
            now,
        );
        info!(grant = %grant.id, %transaction, expires_at = %grant.expires_at, "court grant issued");
        Ok(grant)
    }

    /// Reconstruct the payload key from `shares` and decrypt.
    pub fn decrypt(
        &self,
        grant: &CourtAccessGrant,
        shares: &[ShareSubmission],
    ) -> CoreResult<Vec<u8>> {
        let now = self.clock.now();
        let result = self.try_decrypt(grant, shares, now);

        let holders: Vec<&str> = shares.iter().map(|s| s.share.holder.as_str()).collect();
        let mut data = json!({
            "grant": grant.id.to_string(),
            "transaction": grant.transaction.to_hex(),
            "judge": grant.judge.as_str(),
            "alternate": grant.alternate.as_str(),
            "holders": holders,
            "success": result.is_ok(),
        });
        if let Err(e) = &result {
            data["reason"] = json!(e.to_string());
            data["error_kind"] = json!(e.kind());
            warn!(grant = %grant.id, error = %e, "court decrypt refused");
        } else {
            info!(grant = %grant.id, transaction = %grant.transaction, "court decrypt succeeded");
        }
        self.audit.record("court_decrypt_attempt", data, now);
        result
    }

    fn try_decrypt(
        &self,
        presented: &CourtAccessGrant,
        shares: &[ShareSubmission],
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<u8>> {
        // only the issued copy counts; a caller cannot extend its own grant
        let grant = self
            .grants
            .get(&presented.id)
            .map(|g| g.clone())
            .ok_or_else(|| CoreError::NotFound(format!("grant {}", presented.id)))?;
        if &grant != presented {
            return Err(CoreError::AccessStructureViolation(format!(
                "grant {} does not match the issued grant",
                grant.id
            )));
        }
        if grant.is_expired(now) {
            return Err(CoreError::GrantExpired {
                grant: grant.id,
                expires_at: grant.expires_at,
            });
        }

        let payload = self
            .payload(&grant.transaction)
            .ok_or_else(|| CoreError::NotFound(format!("escrowed payload for {}", grant.transaction)))?;
        if let Some(stranger) = shares.iter().find(|s| {
            s.share.role == HolderRole::Alternate && s.share.holder != grant.alternate
        }) {
            return Err(CoreError::AccessStructureViolation(format!(
                "{} is not the alternate named in the grant",
                stranger.share.holder
            )));
        }

        let key = reconstruct(&payload.policy, shares)?;
        let plaintext = open_checked(
            &key,
            &payload.ciphertext,
            &EscrowedPayload::aad(&payload.transaction, &payload.subject),
        )?;
        Ok(plaintext)
    }
}
