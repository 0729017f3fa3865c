//! Risk and account protection configuration.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::risk::RiskParams;
use crate::domain::ProtectionLimits;

/// `[risk]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Fraction of balance risked per trade (e.g., 0.01 = 1%).
    #[serde(default = "default_risk_per_trade_pct")]
    pub risk_per_trade_pct: Decimal,
    /// Starting balance used when no state snapshot exists.
    #[serde(default = "default_reference_account_size")]
    pub reference_account_size_usdt: Decimal,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// Stop distance as a fraction of price for strategies without a stop policy.
    #[serde(default = "default_stop_distance_pct")]
    pub default_stop_distance_pct: Decimal,
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: Decimal,
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    /// Pause after a losing streak.
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
    /// Pause after the daily loss limit; trading then continues in limited mode.
    #[serde(default = "default_daily_loss_cooldown_minutes")]
    pub daily_loss_cooldown_minutes: u32,
    #[serde(default = "default_limited_mode_duration_minutes")]
    pub limited_mode_duration_minutes: u32,
    /// Recovery, as a fraction of the reference balance, that ends limited mode.
    #[serde(default = "default_limited_mode_recovery_pct")]
    pub limited_mode_recovery_pct: Decimal,
    /// Closed trades per UTC day; 0 means unlimited.
    #[serde(default)]
    pub max_daily_trades: u32,
    #[serde(default = "default_global_drawdown_pct")]
    pub global_drawdown_pct: Decimal,
}

fn default_risk_per_trade_pct() -> Decimal {
    Decimal::new(1, 2) // 1%
}

fn default_reference_account_size() -> Decimal {
    Decimal::from(10_000)
}

const fn default_leverage() -> u32 {
    1
}

fn default_stop_distance_pct() -> Decimal {
    Decimal::new(3, 3) // 0.3%
}

fn default_max_daily_loss_pct() -> Decimal {
    Decimal::new(3, 2)
}

const fn default_max_consecutive_losses() -> u32 {
    3
}

const fn default_cooldown_minutes() -> u32 {
    60
}

const fn default_daily_loss_cooldown_minutes() -> u32 {
    240
}

const fn default_limited_mode_duration_minutes() -> u32 {
    720
}

fn default_limited_mode_recovery_pct() -> Decimal {
    Decimal::new(1, 2)
}

fn default_global_drawdown_pct() -> Decimal {
    Decimal::new(20, 2)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade_pct: default_risk_per_trade_pct(),
            reference_account_size_usdt: default_reference_account_size(),
            leverage: default_leverage(),
            default_stop_distance_pct: default_stop_distance_pct(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_consecutive_losses: default_max_consecutive_losses(),
            cooldown_minutes: default_cooldown_minutes(),
            daily_loss_cooldown_minutes: default_daily_loss_cooldown_minutes(),
            limited_mode_duration_minutes: default_limited_mode_duration_minutes(),
            limited_mode_recovery_pct: default_limited_mode_recovery_pct(),
            max_daily_trades: 0,
            global_drawdown_pct: default_global_drawdown_pct(),
        }
    }
}

impl RiskConfig {
    #[must_use]
    pub fn risk_params(&self) -> RiskParams {
        RiskParams {
            risk_per_trade_pct: self.risk_per_trade_pct,
            leverage: self.leverage,
            default_stop_distance_pct: self.default_stop_distance_pct,
        }
    }

    #[must_use]
    pub fn protection_limits(&self) -> ProtectionLimits {
        ProtectionLimits {
            max_daily_loss_pct: self.max_daily_loss_pct,
            max_consecutive_losses: self.max_consecutive_losses,
            cooldown: minutes(self.cooldown_minutes),
            daily_loss_cooldown: minutes(self.daily_loss_cooldown_minutes),
            limited_duration: minutes(self.limited_mode_duration_minutes),
            limited_recovery_pct: self.limited_mode_recovery_pct,
            max_daily_trades: self.max_daily_trades,
            global_drawdown_pct: self.global_drawdown_pct,
        }
    }
}

fn minutes(value: u32) -> chrono::Duration {
    chrono::Duration::minutes(i64::from(value))
}
