use serde::{Deserialize, Serialize};

/// Policy knobs consumed by the resolution pipeline's extension stages.
/// Parsed and carried today; the stages they feed are pass-through.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OptionsConfig {
    /// Client subnet to attach to outgoing queries (EDNS0 option 8).
    #[serde(default)]
    pub edns0_subnet: String,

    /// Lower TTL clamp for answers; 0 leaves answers untouched.
    #[serde(default)]
    pub ttl_min: u32,

    /// Upper TTL clamp for answers; 0 leaves answers untouched.
    #[serde(default)]
    pub ttl_max: u32,

    /// Domains answered with a refusal instead of being resolved.
    #[serde(default)]
    pub block_domains: Vec<String>,
}
