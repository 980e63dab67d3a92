//! Enforcement configuration and validation.

/// Configuration for the enforcement layer.
#[derive(Debug, Clone)]
pub struct EnforcementConfig {
    /// Whether unauthenticated retrieval of machine-readable twin
    /// descriptions is permitted. When disabled, such requests are denied
    /// instead of bypassing policy checks.
    pub wot_integration_enabled: bool,

    /// Namespaces whose authorized modify commands get leaf-level
    /// inspection logging before being forwarded.
    pub inspected_namespaces: Vec<String>,

    /// Mailbox capacity of each per-entity enforcement unit.
    pub mailbox_capacity: usize,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            wot_integration_enabled: false,
            inspected_namespaces: Vec::new(),
            mailbox_capacity: 64,
        }
    }
}

impl EnforcementConfig {
    /// Validate the configuration at startup.
    pub fn validate(&self) -> Result<(), String> {
        if self.mailbox_capacity == 0 {
            return Err("mailbox_capacity must be > 0".to_string());
        }
        if self.inspected_namespaces.iter().any(|ns| ns.is_empty()) {
            return Err("inspected_namespaces must not contain empty entries".to_string());
        }
        Ok(())
    }

    /// Whether the namespace is under inspection logging.
    pub fn inspects(&self, namespace: &str) -> bool {
        self.inspected_namespaces.iter().any(|ns| ns == namespace)
    }
}
