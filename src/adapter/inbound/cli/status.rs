//! Handler for the `status` command.
//!
//! Read-only: works even when the state snapshot is corrupt.

use std::path::Path;

use serde_json::{json, Value};

use crate::adapter::outbound::csv_journal::CsvJournal;
use crate::application::journal::TradeStats;
use crate::error::Result;
use crate::infrastructure::bootstrap;
use crate::infrastructure::config::Config;

/// Execute the status command.
pub fn execute(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let report = report(&config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Ledger state, protection limits and journal statistics as one document.
pub fn report(config: &Config) -> Result<Value> {
    let store = bootstrap::open_store(config);
    let snapshot = store.export_state();

    let trades = CsvJournal::open(&config.storage.journal_dir)?.read_trades()?;
    let stats = TradeStats::compute(&trades);
    let journal_matches_ledger = stats.net_pnl == snapshot.equity.cumulative_pnl;
    let promotion = stats.promotion(&config.promotion.rules());
    let risk = &config.risk;

    Ok(json!({
        "state": snapshot,
        "limits": {
            "max_daily_loss_pct": risk.max_daily_loss_pct,
            "max_daily_trades": risk.max_daily_trades,
            "daily_trades": snapshot.equity.session.daily_trades,
            "max_consecutive_losses": risk.max_consecutive_losses,
            "cooldown_minutes": risk.cooldown_minutes,
            "daily_loss_cooldown_minutes": risk.daily_loss_cooldown_minutes,
            "limited_mode_duration_minutes": risk.limited_mode_duration_minutes,
            "limited_mode_recovery_pct": risk.limited_mode_recovery_pct,
            "global_drawdown_pct": risk.global_drawdown_pct,
        },
        "stats": stats,
        "profit_factor": stats.profit_factor(),
        "promotion": promotion,
        "journal_matches_ledger": journal_matches_ledger,
    }))
}
