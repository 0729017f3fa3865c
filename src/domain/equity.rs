//! Account equity and trading-mode protection.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether new entries are admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EquityMode {
    Normal,
    /// Entries refused until `until`; lifts on its own, into `Limited` when
    /// `then` is set.
    Cooldown {
        until: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        then: Option<LimitedTerms>,
    },
    /// Entries admitted after a daily-loss cooldown; the daily-loss guard is
    /// not re-armed until the account recovers or the period ends.
    Limited(LimitedTerms),
    /// Entries refused until an operator resumes trading.
    Halted { reason: String },
}

impl EquityMode {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Cooldown { .. } => "cooldown",
            Self::Limited(_) => "limited",
            Self::Halted { .. } => "halted",
        }
    }
}

/// How a `Limited` period ends: at `until`, or once the balance reaches
/// `exit_balance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitedTerms {
    pub until: DateTime<Utc>,
    pub exit_balance: Decimal,
}

/// Per-UTC-day trading statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub trading_day: NaiveDate,
    pub daily_pnl: Decimal,
    pub daily_trades: u32,
    pub consecutive_losses: u32,
}

impl SessionStats {
    fn fresh(day: NaiveDate) -> Self {
        Self {
            trading_day: day,
            daily_pnl: Decimal::ZERO,
            daily_trades: 0,
            consecutive_losses: 0,
        }
    }
}

/// Thresholds that move the account out of `Normal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionLimits {
    /// Fraction of the starting balance that may be lost in one UTC day.
    pub max_daily_loss_pct: Decimal,
    /// Losing trades in a row before a cooldown. Zero disables the check.
    pub max_consecutive_losses: u32,
    /// Pause after a losing streak.
    pub cooldown: Duration,
    /// Pause after the daily loss limit, followed by `Limited`.
    pub daily_loss_cooldown: Duration,
    pub limited_duration: Duration,
    /// Gain, as a fraction of the starting balance, that ends `Limited` early.
    pub limited_recovery_pct: Decimal,
    /// Closed trades per UTC day before entries are refused. Zero disables the check.
    pub max_daily_trades: u32,
    /// Peak-to-trough fraction that halts trading.
    pub global_drawdown_pct: Decimal,
}

impl Default for ProtectionLimits {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: Decimal::new(3, 2),
            max_consecutive_losses: 3,
            cooldown: Duration::minutes(60),
            daily_loss_cooldown: Duration::minutes(240),
            limited_duration: Duration::minutes(720),
            limited_recovery_pct: Decimal::new(1, 2),
            max_daily_trades: 0,
            global_drawdown_pct: Decimal::new(20, 2),
        }
    }
}

/// Account-level state. There is exactly one per store.
///
/// `balance == starting_balance + cumulative_pnl` at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityState {
    pub starting_balance: Decimal,
    pub balance: Decimal,
    pub cumulative_pnl: Decimal,
    pub peak_balance: Decimal,
    pub max_drawdown_pct: Decimal,
    pub mode: EquityMode,
    pub session: SessionStats,
}

impl EquityState {
    #[must_use]
    pub fn new(starting_balance: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            starting_balance,
            balance: starting_balance,
            cumulative_pnl: Decimal::ZERO,
            peak_balance: starting_balance,
            max_drawdown_pct: Decimal::ZERO,
            mode: EquityMode::Normal,
            session: SessionStats::fresh(now.date_naive()),
        }
    }

    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.balance == self.starting_balance + self.cumulative_pnl
    }

    /// Resolve expired timers and report whether entries are admitted.
    pub fn admits_entries(&mut self, now: DateTime<Utc>) -> bool {
        if let EquityMode::Cooldown { until, then } = &self.mode {
            if now >= *until {
                self.mode = then.clone().map_or(EquityMode::Normal, EquityMode::Limited);
            }
        }
        if let EquityMode::Limited(terms) = &self.mode {
            if now >= terms.until {
                self.mode = EquityMode::Normal;
            }
        }
        matches!(self.mode, EquityMode::Normal | EquityMode::Limited(_))
    }

    /// True once today's closed trades reach `limits.max_daily_trades`.
    #[must_use]
    pub fn daily_trades_exhausted(&self, now: DateTime<Utc>, limits: &ProtectionLimits) -> bool {
        limits.max_daily_trades > 0
            && self.session.trading_day == now.date_naive()
            && self.session.daily_trades >= limits.max_daily_trades
    }

    /// Fold a realized trade into balance, session stats and mode.
    pub fn apply_trade(&mut self, pnl: Decimal, closed_at: DateTime<Utc>, limits: &ProtectionLimits) {
        let day = closed_at.date_naive();
        if day != self.session.trading_day {
            self.session = SessionStats::fresh(day);
        }

        self.cumulative_pnl += pnl;
        self.balance = self.starting_balance + self.cumulative_pnl;
        self.session.daily_pnl += pnl;
        self.session.daily_trades += 1;
        if pnl < Decimal::ZERO {
            self.session.consecutive_losses += 1;
        } else {
            self.session.consecutive_losses = 0;
        }

        if self.balance > self.peak_balance {
            self.peak_balance = self.balance;
        }
        if self.peak_balance > Decimal::ZERO {
            let drawdown = (self.peak_balance - self.balance) / self.peak_balance;
            if drawdown > self.max_drawdown_pct {
                self.max_drawdown_pct = drawdown;
            }
        }

        if matches!(self.mode, EquityMode::Halted { .. }) {
            return;
        }
        if self.max_drawdown_pct >= limits.global_drawdown_pct {
            self.mode = EquityMode::Halted {
                reason: format!(
                    "drawdown {} reached limit {}",
                    self.max_drawdown_pct.round_dp(4),
                    limits.global_drawdown_pct
                ),
            };
            return;
        }

        let daily_floor = -(self.starting_balance * limits.max_daily_loss_pct);
        let limited = matches!(self.mode, EquityMode::Limited(_));
        let daily_breached = !limited && self.session.daily_pnl <= daily_floor;
        let streak_breached = limits.max_consecutive_losses > 0
            && self.session.consecutive_losses >= limits.max_consecutive_losses;
        if daily_breached {
            let until = closed_at + limits.daily_loss_cooldown;
            let terms = LimitedTerms {
                until: until + limits.limited_duration,
                exit_balance: self.balance + self.starting_balance * limits.limited_recovery_pct,
            };
            self.enter_cooldown(until, Some(terms));
        } else if streak_breached {
            self.enter_cooldown(closed_at + limits.cooldown, None);
        }
        if streak_breached {
            self.session.consecutive_losses = 0;
        }

        if let EquityMode::Limited(terms) = &self.mode {
            if self.balance >= terms.exit_balance {
                self.mode = EquityMode::Normal;
            }
        }
    }

    /// Enter or extend a cooldown; a pending `Limited` period is kept.
    fn enter_cooldown(&mut self, until: DateTime<Utc>, then: Option<LimitedTerms>) {
        let (until, then) = match &self.mode {
            EquityMode::Cooldown {
                until: current,
                then: queued,
            } => ((*current).max(until), then.or_else(|| queued.clone())),
            _ => (until, then),
        };
        self.mode = EquityMode::Cooldown { until, then };
    }

    /// Return to `Normal` from any mode.
    pub fn resume(&mut self) {
        self.mode = EquityMode::Normal;
        self.peak_balance = self.balance;
        self.max_drawdown_pct = Decimal::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limits() -> ProtectionLimits {
        ProtectionLimits {
            max_daily_loss_pct: dec!(0.03),
            max_consecutive_losses: 3,
            cooldown: Duration::minutes(30),
            daily_loss_cooldown: Duration::minutes(120),
            limited_duration: Duration::minutes(600),
            limited_recovery_pct: dec!(0.01),
            max_daily_trades: 0,
            global_drawdown_pct: dec!(0.10),
        }
    }

    #[test]
    fn balance_tracks_cumulative_pnl() {
        let now = Utc::now();
        let mut eq = EquityState::new(dec!(10000), now);
        eq.apply_trade(dec!(50), now, &limits());
        eq.apply_trade(dec!(-20), now, &limits());
        assert_eq!(eq.cumulative_pnl, dec!(30));
        assert_eq!(eq.balance, dec!(10030));
        assert!(eq.is_consistent());
        assert_eq!(eq.session.daily_trades, 2);
        assert_eq!(eq.session.consecutive_losses, 1);
    }

    #[test]
    fn consecutive_losses_trigger_cooldown() {
        let now = Utc::now();
        let mut eq = EquityState::new(dec!(10000), now);
        for _ in 0..3 {
            eq.apply_trade(dec!(-10), now, &limits());
        }
        assert_eq!(
            eq.mode,
            EquityMode::Cooldown {
                until: now + Duration::minutes(30),
                then: None
            }
        );
        assert!(!eq.admits_entries(now));
        assert!(eq.admits_entries(now + Duration::minutes(31)));
        assert_eq!(eq.mode, EquityMode::Normal);
    }

    #[test]
    fn daily_loss_triggers_cooldown() {
        let now = Utc::now();
        let mut eq = EquityState::new(dec!(10000), now);
        eq.apply_trade(dec!(-300), now, &limits());
        assert_eq!(eq.mode.name(), "cooldown");
    }

    #[test]
    fn daily_loss_cooldown_gives_way_to_limited_mode() {
        let now = Utc::now();
        let mut eq = EquityState::new(dec!(10000), now);
        eq.apply_trade(dec!(-300), now, &limits());
        assert!(!eq.admits_entries(now + Duration::minutes(119)));

        let after = now + Duration::minutes(121);
        assert!(eq.admits_entries(after));
        let EquityMode::Limited(terms) = &eq.mode else {
            panic!("expected limited, got {:?}", eq.mode);
        };
        assert_eq!(terms.exit_balance, dec!(9800));
        assert_eq!(terms.until, now + Duration::minutes(720));

        // Still below the daily floor, but no second cooldown while limited.
        eq.apply_trade(dec!(-20), after, &limits());
        assert_eq!(eq.mode.name(), "limited");

        eq.apply_trade(dec!(120), after, &limits());
        assert_eq!(eq.mode, EquityMode::Normal);
    }

    #[test]
    fn limited_mode_expires() {
        let now = Utc::now();
        let mut eq = EquityState::new(dec!(10000), now);
        eq.apply_trade(dec!(-300), now, &limits());
        assert!(eq.admits_entries(now + Duration::minutes(200)));
        assert_eq!(eq.mode.name(), "limited");
        assert!(eq.admits_entries(now + Duration::minutes(721)));
        assert_eq!(eq.mode, EquityMode::Normal);
    }

    #[test]
    fn daily_trade_cap_resets_next_day() {
        let now = Utc::now();
        let capped = ProtectionLimits {
            max_daily_trades: 2,
            ..limits()
        };
        let mut eq = EquityState::new(dec!(10000), now);
        eq.apply_trade(dec!(10), now, &capped);
        assert!(!eq.daily_trades_exhausted(now, &capped));
        eq.apply_trade(dec!(10), now, &capped);
        assert!(eq.daily_trades_exhausted(now, &capped));
        assert!(!eq.daily_trades_exhausted(now + Duration::days(1), &capped));
        assert!(!eq.daily_trades_exhausted(now, &limits()));
    }

    #[test]
    fn drawdown_halts_until_resumed() {
        let now = Utc::now();
        let mut eq = EquityState::new(dec!(1000), now);
        eq.apply_trade(dec!(-150), now, &ProtectionLimits { max_daily_loss_pct: dec!(1), ..limits() });
        assert_eq!(eq.mode.name(), "halted");
        assert!(!eq.admits_entries(now + Duration::days(3)));
        eq.resume();
        assert!(eq.admits_entries(now));
    }

    #[test]
    fn session_rolls_over_on_new_day() {
        let now = Utc::now();
        let mut eq = EquityState::new(dec!(10000), now);
        eq.apply_trade(dec!(-10), now, &limits());
        eq.apply_trade(dec!(5), now + Duration::days(1), &limits());
        assert_eq!(eq.session.daily_trades, 1);
        assert_eq!(eq.session.daily_pnl, dec!(5));
    }
}
