//! Store configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the typed registry layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root prefix every fabric key lives under. One cluster per prefix.
    pub root_prefix: String,
}

impl StoreConfig {
    /// Config rooted at the given prefix.
    pub fn new(root_prefix: &str) -> Self {
        Self {
            root_prefix: root_prefix.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("weftfs")
    }
}
