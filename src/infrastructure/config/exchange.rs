//! Exchange selection.

use serde::Deserialize;

/// Supported venues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    /// In-memory simulator; no network access.
    #[default]
    Paper,
    /// Bybit v5 linear perpetuals.
    Bybit,
}

/// `[exchange]` table. API keys come from `BYBIT_API_KEY` and
/// `BYBIT_API_SECRET`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default)]
    pub kind: ExchangeKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "https://api.bybit.com".into()
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            kind: ExchangeKind::default(),
            base_url: default_base_url(),
        }
    }
}
