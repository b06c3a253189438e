// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery acknowledgements.
//!
//! Raw acks are mapped onto [`DeliveryStatus`] and applied to every stored
//! row carrying the provider message id, under the configured
//! [`StatusPolicy`]. Writes are compare-and-set on the previous status so
//! concurrent acks for the same message never regress it.

use std::sync::Arc;

use tracing::{debug, warn};

use zapline_config::StatusPolicy;
use zapline_core::types::{DeliveryStatus, Message, RawStatus};
use zapline_core::{ConversationStore, ZaplineError};
use zapline_prometheus::recording;

/// Compare-and-set attempts per row before the update is abandoned.
const CAS_ATTEMPTS: usize = 3;

/// Map a raw provider acknowledgement onto the canonical status.
///
/// Returns `None` for an empty label, which callers treat as a no-op.
pub fn normalize_status(raw: &RawStatus) -> Option<DeliveryStatus> {
    match raw {
        RawStatus::Ack(code) => Some(match *code {
            i64::MIN..=-1 => DeliveryStatus::Error,
            0 => DeliveryStatus::Pending,
            1 => DeliveryStatus::Sent,
            2 => DeliveryStatus::Delivered,
            3 => DeliveryStatus::Read,
            _ => DeliveryStatus::Played,
        }),
        RawStatus::Label(label) => {
            let label = label.trim();
            if label.is_empty() {
                return None;
            }
            Some(match label.to_lowercase().as_str() {
                "pending" | "pendente" | "queued" | "enqueued" => DeliveryStatus::Pending,
                "sent" | "server_ack" | "enviado" | "enviada" => DeliveryStatus::Sent,
                "delivered" | "delivery_ack" | "received" | "entregue" | "recebido"
                | "recebida" => DeliveryStatus::Delivered,
                "read" | "seen" | "lido" | "lida" | "visualizado" | "visualizada" => {
                    DeliveryStatus::Read
                }
                "played" | "reproduzido" | "reproduzida" | "ouvido" => DeliveryStatus::Played,
                "error" | "failed" | "erro" | "falhou" | "falha" => DeliveryStatus::Error,
                _ => DeliveryStatus::Other(label.to_string()),
            })
        }
    }
}

/// Whether `incoming` should replace `current` under `policy`.
///
/// Under [`StatusPolicy::MaxRank`] ranked statuses only move forward and
/// `error` is terminal. Unranked provider labels are recorded verbatim over
/// anything but `error`, and any ranked status replaces them.
pub fn should_apply(
    policy: StatusPolicy,
    current: &DeliveryStatus,
    incoming: &DeliveryStatus,
) -> bool {
    if current == incoming {
        return false;
    }
    match policy {
        StatusPolicy::LastWrite => true,
        StatusPolicy::MaxRank => match (current, incoming) {
            (DeliveryStatus::Error, _) => false,
            (_, DeliveryStatus::Error) => true,
            (_, DeliveryStatus::Other(_)) | (DeliveryStatus::Other(_), _) => true,
            (current, incoming) => incoming.rank() > current.rank(),
        },
    }
}

/// Applies normalized acknowledgements to stored messages.
pub struct StatusReconciler {
    store: Arc<dyn ConversationStore>,
    policy: StatusPolicy,
    tenant_fallback: bool,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn ConversationStore>, policy: StatusPolicy, tenant_fallback: bool) -> Self {
        Self {
            store,
            policy,
            tenant_fallback,
        }
    }

    pub fn policy(&self) -> StatusPolicy {
        self.policy
    }

    async fn candidates(
        &self,
        tenant_id: &str,
        provider_message_id: &str,
    ) -> Result<Vec<Message>, ZaplineError> {
        let scoped = self
            .store
            .find_messages_for_status(Some(tenant_id), provider_message_id)
            .await?;
        if !scoped.is_empty() || !self.tenant_fallback {
            return Ok(scoped);
        }
        let unscoped = self
            .store
            .find_messages_for_status(None, provider_message_id)
            .await?;
        if !unscoped.is_empty() {
            warn!(
                tenant = %tenant_id,
                provider_message_id,
                "status matched only outside the tenant scope"
            );
        }
        Ok(unscoped)
    }

    /// Apply `raw` to every row carrying `provider_message_id`.
    ///
    /// Returns the first row whose status changed, or `None` when the id is
    /// unknown, the label is empty, or no row needed an update.
    pub async fn apply_status(
        &self,
        tenant_id: &str,
        provider_message_id: &str,
        raw: &RawStatus,
    ) -> Result<Option<Message>, ZaplineError> {
        let Some(incoming) = normalize_status(raw) else {
            recording::record_status_update("no_op");
            return Ok(None);
        };

        let rows = self.candidates(tenant_id, provider_message_id).await?;
        if rows.is_empty() {
            debug!(tenant = %tenant_id, provider_message_id, "status for unknown message");
            recording::record_status_update("unmatched");
            return Ok(None);
        }

        let mut first_updated = None;
        for row in rows {
            if let Some(updated) = self.apply_to_row(tenant_id, row, &incoming).await? {
                first_updated.get_or_insert(updated);
            }
        }

        recording::record_status_update(if first_updated.is_some() {
            "applied"
        } else {
            "stale"
        });
        Ok(first_updated)
    }

    async fn apply_to_row(
        &self,
        tenant_id: &str,
        mut row: Message,
        incoming: &DeliveryStatus,
    ) -> Result<Option<Message>, ZaplineError> {
        for _ in 0..CAS_ATTEMPTS {
            if !should_apply(self.policy, &row.status, incoming) {
                return Ok(None);
            }
            if self
                .store
                .set_message_status(&row.id, &row.status, incoming)
                .await?
            {
                debug!(
                    message_id = %row.id,
                    from = %row.status,
                    to = %incoming,
                    "message status updated"
                );
                row.status = incoming.clone();
                return Ok(Some(row));
            }

            // Lost the race: re-read the row and decide again.
            let pid = row.provider_message_id.clone().unwrap_or_default();
            let scope = (!self.tenant_fallback).then_some(tenant_id);
            match self
                .store
                .find_messages_for_status(scope, &pid)
                .await?
                .into_iter()
                .find(|m| m.id == row.id)
            {
                Some(fresh) => row = fresh,
                None => return Ok(None),
            }
        }
        warn!(message_id = %row.id, "status update abandoned after repeated conflicts");
        Ok(None)
    }
}
