// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant settings looked up on the ingestion path.

use std::collections::HashMap;

use zapline_config::{TenantConfig, ZaplineConfig};
use zapline_core::phone;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantSettings {
    /// Canonical key of the tenant's connected number.
    pub own_number: Option<String>,
    /// Department new conversations are assigned to.
    pub department_id: Option<String>,
}

/// Settings of every declared tenant. Undeclared tenants get defaults.
#[derive(Debug, Clone, Default)]
pub struct TenantDirectory {
    tenants: HashMap<String, TenantSettings>,
}

impl TenantDirectory {
    pub fn new(tenants: &[TenantConfig]) -> Self {
        let tenants = tenants
            .iter()
            .map(|t| {
                let own_number = t
                    .own_number
                    .as_deref()
                    .map(phone::normalize)
                    .filter(|n| !n.is_empty());
                (
                    t.id.clone(),
                    TenantSettings {
                        own_number,
                        department_id: t.department_id.clone(),
                    },
                )
            })
            .collect();
        Self { tenants }
    }

    pub fn from_config(config: &ZaplineConfig) -> Self {
        Self::new(&config.tenants)
    }

    pub fn own_number(&self, tenant_id: &str) -> Option<&str> {
        self.tenants.get(tenant_id)?.own_number.as_deref()
    }

    pub fn department(&self, tenant_id: &str) -> Option<&str> {
        self.tenants.get(tenant_id)?.department_id.as_deref()
    }

    pub fn is_declared(&self, tenant_id: &str) -> bool {
        self.tenants.contains_key(tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_numbers_are_canonicalized() {
        let dir = TenantDirectory::new(&[
            TenantConfig {
                id: "acme".into(),
                own_number: Some("+55 34 91111-2222".into()),
                department_id: Some("sales".into()),
            },
            TenantConfig {
                id: "bare".into(),
                own_number: None,
                department_id: None,
            },
        ]);
        assert_eq!(dir.own_number("acme"), Some("5534911112222"));
        assert_eq!(dir.department("acme"), Some("sales"));
        assert!(dir.is_declared("bare"));
        assert_eq!(dir.own_number("bare"), None);
        assert!(!dir.is_declared("ghost"));
        assert_eq!(dir.department("ghost"), None);
    }
}
