use actionhub_core::DEFAULT_ADMIN_ROLE;

/// Server-level configuration for the invocation pipeline.
///
/// Controls the administrator role and the concurrency cap on inbound calls.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Role that bypasses ownership and role checks.
    pub admin_role: String,
    /// Maximum number of concurrent inbound invocations before load shedding.
    /// Sub-invocations issued during population are not counted.
    pub max_concurrent_invocations: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            admin_role: DEFAULT_ADMIN_ROLE.to_string(),
            max_concurrent_invocations: 1000,
        }
    }
}
