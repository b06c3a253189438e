// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message ingestion for Zapline.
//!
//! Raw provider webhooks are split into elements ([`envelope`]), normalized
//! into canonical events ([`normalize`]), matched to a contact and its single
//! open conversation ([`resolver`]), and stored through the
//! [`IngestionCoordinator`]. Status acknowledgements are reconciled by
//! [`status`]; local sends go out through [`outbound`].

pub mod backfill;
pub mod coordinator;
pub mod envelope;
pub mod events;
pub mod normalize;
pub mod outbound;
pub mod resolver;
pub mod status;
pub mod tenants;

pub use coordinator::{DeliveryReport, IngestOutcome, IngestSource, IngestionCoordinator};
pub use normalize::{NormalizeContext, normalize};
pub use outbound::{DispatchHandle, GroupTargetCache, OutboundDispatcher};
pub use resolver::{ConversationResolver, Resolution};
pub use status::{StatusReconciler, normalize_status, should_apply};
pub use tenants::TenantDirectory;
