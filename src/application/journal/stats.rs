//! Performance summary over journaled trades.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::port::outbound::journal::TradeRow;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Fraction of trades with positive PnL.
    pub win_rate: Decimal,
    pub average_r: Decimal,
    pub net_pnl: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    /// Largest peak-to-trough fall of the cumulative PnL curve.
    pub max_drawdown: Decimal,
    /// The same fall as a fraction of the peak it started from.
    pub max_drawdown_pct: Decimal,
    pub pnl_by_day: BTreeMap<NaiveDate, Decimal>,
}

impl TradeStats {
    /// Summarize trades in journal order.
    #[must_use]
    pub fn compute(trades: &[TradeRow]) -> Self {
        if trades.is_empty() {
            return Self::default();
        }

        let mut stats = Self {
            total_trades: trades.len(),
            ..Self::default()
        };
        let mut r_sum = Decimal::ZERO;
        let mut curve = Decimal::ZERO;
        let mut peak = Decimal::ZERO;

        for trade in trades {
            if trade.pnl > Decimal::ZERO {
                stats.wins += 1;
                stats.gross_profit += trade.pnl;
            } else if trade.pnl < Decimal::ZERO {
                stats.losses += 1;
                stats.gross_loss += trade.pnl.abs();
            }
            r_sum += trade.r_multiple;
            stats.net_pnl += trade.pnl;
            *stats
                .pnl_by_day
                .entry(trade.timestamp.date_naive())
                .or_insert(Decimal::ZERO) += trade.pnl;

            curve += trade.pnl;
            peak = peak.max(curve);
            stats.max_drawdown = stats.max_drawdown.max(peak - curve);
            if peak > Decimal::ZERO {
                stats.max_drawdown_pct = stats.max_drawdown_pct.max(((peak - curve) / peak).round_dp(4));
            }
        }

        let total = Decimal::from(stats.total_trades);
        stats.win_rate = (Decimal::from(stats.wins) / total).round_dp(4);
        stats.average_r = (r_sum / total).round_dp(4);
        stats
    }

    /// Gross profit over gross loss; `None` without losing trades.
    #[must_use]
    pub fn profit_factor(&self) -> Option<Decimal> {
        if self.gross_loss.is_zero() {
            None
        } else {
            Some((self.gross_profit / self.gross_loss).round_dp(4))
        }
    }

    /// Check the record against `rules`.
    #[must_use]
    pub fn promotion(&self, rules: &PromotionRules) -> PromotionStatus {
        let live_ready = self.total_trades >= rules.min_trades
            && self.net_pnl >= rules.min_net_pnl
            && self.max_drawdown_pct <= rules.max_drawdown_pct;
        let scale_up_ready = live_ready
            && self.win_rate >= SCALE_UP_MIN_WIN_RATE
            && self.average_r >= SCALE_UP_MIN_AVERAGE_R;
        PromotionStatus {
            live_ready,
            scale_up_ready,
            details: format!(
                "trades={} win_rate={} net_pnl={} max_drawdown_pct={}",
                self.total_trades,
                self.win_rate,
                self.net_pnl.round_dp(2),
                self.max_drawdown_pct
            ),
        }
    }
}

const SCALE_UP_MIN_WIN_RATE: Decimal = Decimal::from_parts(55, 0, 0, false, 2);
const SCALE_UP_MIN_AVERAGE_R: Decimal = Decimal::ONE;

/// Thresholds a demo record must meet before going live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionRules {
    pub min_trades: usize,
    pub min_net_pnl: Decimal,
    pub max_drawdown_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionStatus {
    /// Enough trades, profitable, and drawdown within bounds.
    pub live_ready: bool,
    /// Live-ready with a 55% win rate and at least 1R per trade.
    pub scale_up_ready: bool,
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn row(day: u32, pnl: Decimal, r: Decimal) -> TradeRow {
        TradeRow {
            timestamp: Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap(),
            symbol: "SOLUSDT".into(),
            side: Side::Long,
            qty: dec!(1),
            entry_price: dec!(100),
            exit_price: dec!(100) + pnl,
            pnl,
            r_multiple: r,
        }
    }

    #[test]
    fn empty_journal_has_zero_stats() {
        assert_eq!(TradeStats::compute(&[]), TradeStats::default());
    }

    #[test]
    fn summarizes_trades() {
        let trades = [
            row(1, dec!(100), dec!(1)),
            row(1, dec!(-50), dec!(-0.5)),
            row(2, dec!(-80), dec!(-0.8)),
            row(3, dec!(200), dec!(2)),
        ];
        let stats = TradeStats::compute(&trades);
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.win_rate, dec!(0.5));
        assert_eq!(stats.net_pnl, dec!(170));
        assert_eq!(stats.average_r, dec!(0.425));
        assert_eq!(stats.max_drawdown, dec!(130));
        assert_eq!(stats.max_drawdown_pct, dec!(1.3));
        assert_eq!(stats.pnl_by_day.len(), 3);
        assert_eq!(stats.profit_factor(), Some(dec!(2.3077)));
    }

    fn rules() -> PromotionRules {
        PromotionRules {
            min_trades: 3,
            min_net_pnl: dec!(100),
            max_drawdown_pct: dec!(0.25),
        }
    }

    #[test]
    fn promotion_needs_trades_profit_and_bounded_drawdown() {
        let steady = [
            row(1, dec!(100), dec!(1)),
            row(1, dec!(-20), dec!(-0.2)),
            row(2, dec!(150), dec!(1.5)),
        ];
        let status = TradeStats::compute(&steady).promotion(&rules());
        assert!(status.live_ready);
        assert!(!status.scale_up_ready);
        assert!(status.details.contains("trades=3"), "{}", status.details);

        let too_few = TradeStats::compute(&steady[..2]).promotion(&rules());
        assert!(!too_few.live_ready);

        let deep = [
            row(1, dec!(100), dec!(1)),
            row(1, dec!(-50), dec!(-0.5)),
            row(2, dec!(200), dec!(2)),
        ];
        assert!(!TradeStats::compute(&deep).promotion(&rules()).live_ready);
    }

    #[test]
    fn strong_record_is_ready_to_scale() {
        let trades = [
            row(1, dec!(140), dec!(1.4)),
            row(2, dec!(150), dec!(1.5)),
            row(3, dec!(-10), dec!(-0.1)),
            row(4, dec!(160), dec!(1.6)),
        ];
        let status = TradeStats::compute(&trades).promotion(&rules());
        assert!(status.live_ready);
        assert!(status.scale_up_ready);
    }
}
