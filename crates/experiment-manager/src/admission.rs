use wavesens_core::config::PortfolioSettings;
use wavesens_core::error::{PipelineError, PipelineResult};

/// Computes a candidate position size in dollars from the portfolio's
/// base allocation, scaled by confidence and (currently static)
/// volatility/correlation factors, clamped to the configured bounds
/// and to the cash actually available above the reserve floor.
pub fn compute_position_size(
    total_value: f64,
    cash: f64,
    confidence_percent: f64,
    volatility_factor: f64,
    correlation_factor: f64,
    portfolio: &PortfolioSettings,
) -> f64 {
    let base = total_value * (portfolio.base_position_percent / 100.0);
    let confidence_factor =
        (confidence_percent / 100.0).clamp(portfolio.confidence_factor_min, portfolio.confidence_factor_max);
    let mut size = base * confidence_factor * volatility_factor * correlation_factor;

    let max_allowed = total_value * (portfolio.max_position_percent / 100.0);
    size = size.clamp(portfolio.min_position_size, max_allowed);

    let reserve_amount = total_value * (portfolio.min_cash_reserve_percent / 100.0);
    let available = (cash - reserve_amount).max(0.0);
    size.min(available)
}

/// Admission checks, evaluated in order; the first failure aborts with
/// its reason. Checks (a) "cash >= size" and (e) "cash-after >= reserve"
/// from the risk-check list collapse into one reserve check here: any
/// cash shortfall severe enough to fail (a) also fails (e) with a
/// larger deficit, so the reserve check alone is both necessary and
/// sufficient and produces the reason the rest of the system expects.
pub fn admission_check(
    cash: f64,
    total_value: f64,
    active_position_count: i64,
    size: f64,
    commission: f64,
    daily_loss_breached: bool,
    portfolio: &PortfolioSettings,
) -> PipelineResult<()> {
    if active_position_count >= portfolio.max_concurrent_positions {
        return Err(PipelineError::AdmissionRefused(format!(
            "Max concurrent positions reached: {active_position_count} >= {}",
            portfolio.max_concurrent_positions
        )));
    }

    let max_allowed = total_value * (portfolio.max_position_percent / 100.0);
    if size > max_allowed {
        return Err(PipelineError::AdmissionRefused(format!("Position size exceeds max: ${size:.2} > ${max_allowed:.2}")));
    }

    if size < portfolio.min_position_size {
        return Err(PipelineError::AdmissionRefused(format!(
            "Position size below minimum: ${size:.2} < ${:.2}",
            portfolio.min_position_size
        )));
    }

    let reserve_amount = total_value * (portfolio.min_cash_reserve_percent / 100.0);
    let cash_after = cash - size - commission;
    if cash_after < reserve_amount {
        return Err(PipelineError::AdmissionRefused(format!("Would violate cash reserve: ${cash_after:.2} < ${reserve_amount:.2}")));
    }

    if daily_loss_breached {
        return Err(PipelineError::AdmissionRefused("daily_loss_limit".to_string()));
    }

    Ok(())
}

/// Evaluates stop-loss before take-profit: a position that has crossed
/// both in the same tick is closed for the loss, not the gain.
pub fn decide_exit_reason(current_price: f64, stop_loss: f64, take_profit: f64) -> Option<&'static str> {
    if current_price <= stop_loss {
        Some("stop_loss")
    } else if current_price >= take_profit {
        Some("take_profit")
    } else {
        None
    }
}

/// Ratchets the trailing stop upward once unrealized return crosses
/// the activation threshold; never moves it down.
pub fn update_trailing_stop(
    current_stop: f64,
    current_price: f64,
    entry_price: f64,
    activation_percent: f64,
    distance_percent: f64,
) -> f64 {
    let unrealized_return_percent = (current_price - entry_price) / entry_price * 100.0;
    if unrealized_return_percent < activation_percent {
        return current_stop;
    }
    let candidate = current_price * (1.0 - distance_percent / 100.0);
    current_stop.max(candidate)
}

pub struct ExitAccounting {
    pub proceeds: f64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    pub return_percent: f64,
}

/// Pure exit-accounting arithmetic: proceeds net of exit commission,
/// gross/net P&L, and the realized return percentage.
pub fn calculate_exit(
    entry_price: f64,
    shares: f64,
    entry_commission: f64,
    position_size: f64,
    exit_price: f64,
    exit_commission: f64,
) -> ExitAccounting {
    let proceeds = shares * exit_price - exit_commission;
    let entry_cost = position_size + entry_commission;
    let gross_pnl = shares * (exit_price - entry_price);
    let net_pnl = proceeds - entry_cost;
    let return_percent = net_pnl / entry_cost * 100.0;
    ExitAccounting { proceeds, gross_pnl, net_pnl, return_percent }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portfolio() -> PortfolioSettings {
        PortfolioSettings {
            initial_capital: 10_000.0,
            min_cash_reserve_percent: 10.0,
            max_position_percent: 10.0,
            min_position_size: 100.0,
            max_concurrent_positions: 20,
            daily_loss_limit_percent: 5.0,
            default_stop_loss_percent: 3.0,
            default_take_profit_percent: 5.0,
            trailing_stop_activation_percent: 2.0,
            trailing_stop_distance_percent: 1.5,
            commission_fixed: 1.0,
            commission_percent: 0.1,
            slippage_liquid_percent: 0.05,
            slippage_illiquid_percent: 0.2,
            liquidity_threshold_volume: 1_000_000,
            base_position_percent: 2.0,
            confidence_factor_min: 0.5,
            confidence_factor_max: 1.5,
            volatility_factor_min: 0.5,
            correlation_factor_min: 0.5,
            position_check_interval_seconds: 30,
            portfolio_snapshot_interval_seconds: 300,
            price_cache_ttl_seconds: 300,
            price_stale_cache_ttl_seconds: 3600,
            min_hold_hours: 2.0,
        }
    }

    #[test]
    fn admission_refusal_cash_reserve_scenario() {
        let result = admission_check(500.0, 10_000.0, 0, 800.0, 0.0, false, &portfolio());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Would violate cash reserve"), "{err}");
    }

    #[test]
    fn admission_passes_when_all_checks_clear() {
        let result = admission_check(5_000.0, 10_000.0, 0, 500.0, 1.0, false, &portfolio());
        assert!(result.is_ok());
    }

    #[test]
    fn daily_loss_breach_refuses_admission() {
        let result = admission_check(5_000.0, 10_000.0, 0, 500.0, 1.0, true, &portfolio());
        assert!(matches!(result.unwrap_err(), PipelineError::AdmissionRefused(reason) if reason == "daily_loss_limit"));
    }

    #[test]
    fn stop_loss_takes_priority_at_96() {
        assert_eq!(decide_exit_reason(96.0, 97.0, 105.0), Some("stop_loss"));
    }

    #[test]
    fn take_profit_triggers_at_106() {
        assert_eq!(decide_exit_reason(106.0, 97.0, 105.0), Some("take_profit"));
    }

    #[test]
    fn trailing_stop_ratchets_and_never_decreases() {
        let mut stop = 97.0;
        stop = update_trailing_stop(stop, 100.0, 100.0, 2.0, 1.5);
        assert_eq!(stop, 97.0);

        stop = update_trailing_stop(stop, 103.0, 100.0, 2.0, 1.5);
        assert!((stop - 101.455).abs() < 1e-9);

        stop = update_trailing_stop(stop, 102.0, 100.0, 2.0, 1.5);
        assert!((stop - 101.455).abs() < 1e-9);

        stop = update_trailing_stop(stop, 104.0, 100.0, 2.0, 1.5);
        assert!((stop - 102.44).abs() < 1e-9);
    }

    #[test]
    fn exit_accounting_matches_formula() {
        let exit = calculate_exit(100.0, 10.0, 1.0, 1_000.0, 105.0, 1.05);
        assert!((exit.proceeds - (1_050.0 - 1.05)).abs() < 1e-9);
        assert!((exit.net_pnl - (exit.proceeds - 1_001.0)).abs() < 1e-9);
    }
}
