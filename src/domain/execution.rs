//! Daily portfolio cycle.
//!
//! Runs, in order, on a working copy of the state:
//! 1. price refresh (failed refreshes keep the last price and mark the position stale)
//! 2. exits: stop-loss, trend breach, take-profit
//! 3. averaging-down
//! 4. new entries from the current ranking
//! 5. NAV recording
//!
//! The working copy is only returned after [`PortfolioState::validate`] passes,
//! so a failed cycle leaves the caller's state untouched.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::domain::error::DiprankerError;
use crate::domain::portfolio::{Action, ActionKind, PortfolioState};
use crate::domain::position::Position;
use crate::domain::quote::PriceBatch;
use crate::domain::ranking::{Ranking, ScoredCandidate};

/// Tolerance for percentage thresholds.
const PCT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioRules {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub trend_breach_pct: f64,
    pub trend_breach_days: u32,
    pub averaging_trigger_pct: f64,
    pub averaging_lots: u64,
    pub lot_size: u64,
    pub max_positions: usize,
    pub min_cash_ratio: f64,
    pub min_score: f64,
    pub min_dividend: f64,
    pub min_market_cap: f64,
    pub max_buys_per_cycle: usize,
    pub per_position_max: f64,
    pub entry_cash_fraction: f64,
}

impl Default for PortfolioRules {
    fn default() -> Self {
        PortfolioRules {
            stop_loss_pct: -15.0,
            take_profit_pct: 20.0,
            trend_breach_pct: -8.0,
            trend_breach_days: 5,
            averaging_trigger_pct: -5.0,
            averaging_lots: 1,
            lot_size: 100,
            max_positions: 10,
            min_cash_ratio: 0.5,
            min_score: 70.0,
            min_dividend: 2.0,
            min_market_cap: 500.0,
            max_buys_per_cycle: 2,
            per_position_max: 1_000_000.0,
            entry_cash_fraction: 0.3,
        }
    }
}

/// Everything a cycle reads besides the state itself.
#[derive(Debug, Clone, Copy)]
pub struct CycleInputs<'a> {
    pub date: NaiveDate,
    pub prices: &'a PriceBatch,
    /// Current ranking; also supplies MA25 for held codes.
    pub ranking: &'a Ranking,
    /// Benchmark level stored alongside the NAV entry.
    pub benchmark: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub state: PortfolioState,
    pub actions: Vec<Action>,
    /// True when `date` was already committed and only NAV was recomputed.
    pub replayed: bool,
    pub stale: Vec<String>,
}

/// Apply one daily cycle to `state`, returning the validated next state.
pub fn run_cycle(
    state: &PortfolioState,
    inputs: &CycleInputs<'_>,
    rules: &PortfolioRules,
) -> Result<CycleOutcome, DiprankerError> {
    state.validate()?;

    if let Some(last) = state.last_cycle_date() {
        if inputs.date < last {
            return Err(DiprankerError::CycleOutOfOrder {
                date: inputs.date,
                last,
            });
        }
        if inputs.date == last {
            return replay_cycle(state, inputs);
        }
    }

    let mut working = state.clone();
    let stale = refresh_prices(&mut working, inputs.prices);
    let stale_set: HashSet<&str> = stale.iter().map(String::as_str).collect();

    let mut actions = evaluate_exits(&mut working, inputs, rules, &stale_set);
    actions.extend(average_down(&mut working, inputs, rules, &stale_set));
    let touched: HashSet<String> = actions.iter().map(|a| a.code.clone()).collect();
    actions.extend(enter_positions(&mut working, inputs, rules, &touched));

    working.record_nav(inputs.date, inputs.benchmark);
    working.history.extend(actions.iter().cloned());
    working.validate()?;

    info!(
        date = %inputs.date,
        nav = working.nav(),
        cash = working.cash,
        positions = working.position_count(),
        actions = actions.len(),
        "cycle committed"
    );

    Ok(CycleOutcome {
        state: working,
        actions,
        replayed: false,
        stale,
    })
}

/// Re-running a committed date only re-marks prices and rewrites its NAV entry.
fn replay_cycle(
    state: &PortfolioState,
    inputs: &CycleInputs<'_>,
) -> Result<CycleOutcome, DiprankerError> {
    let mut working = state.clone();
    let stale = refresh_prices(&mut working, inputs.prices);
    let previous = working.daily_nav.pop();
    let benchmark = inputs.benchmark.or(previous.and_then(|p| p.benchmark));
    working.record_nav(inputs.date, benchmark);
    working.validate()?;

    debug!(date = %inputs.date, "cycle already committed, NAV recomputed");

    Ok(CycleOutcome {
        state: working,
        actions: Vec::new(),
        replayed: true,
        stale,
    })
}

fn refresh_prices(state: &mut PortfolioState, prices: &PriceBatch) -> Vec<String> {
    let mut stale = Vec::new();
    for pos in &mut state.positions {
        match prices.price(&pos.code) {
            Some(price) => pos.last_price = price,
            None => {
                warn!(code = %pos.code, last_price = pos.last_price, "price refresh failed, using last known price");
                stale.push(pos.code.clone());
            }
        }
    }
    stale
}

fn trend_deviation(ranking: &Ranking, code: &str, price: f64) -> Option<f64> {
    ranking
        .get(code)
        .and_then(|c| c.snapshot.trend_deviation_pct(price))
}

fn sell(
    state: &mut PortfolioState,
    date: NaiveDate,
    code: &str,
    shares: u64,
    kind: ActionKind,
    reason: String,
) -> Option<Action> {
    let pos = state.get_position_mut(code)?;
    let shares = shares.min(pos.shares);
    let price = pos.last_price;
    let amount = shares as f64 * price;
    let realized = pos.realized_pnl(shares, price);
    pos.shares -= shares;
    if kind == ActionKind::TakeProfit {
        pos.half_sold = true;
    }
    let resulting_state = pos.state();
    if pos.shares == 0 {
        state.remove_position(code);
    }
    state.cash += amount;

    info!(%code, ?kind, shares, price, realized, "sell");
    Some(Action {
        date,
        kind,
        code: code.to_string(),
        price,
        shares,
        amount,
        realized_pnl: Some(realized),
        resulting_state,
        reason,
    })
}

fn evaluate_exits(
    state: &mut PortfolioState,
    inputs: &CycleInputs<'_>,
    rules: &PortfolioRules,
    stale: &HashSet<&str>,
) -> Vec<Action> {
    // Decide first, then execute, so removals never disturb iteration.
    let mut decisions: Vec<(String, u64, ActionKind, String)> = Vec::new();

    for pos in &mut state.positions {
        let pnl = pos.pnl_pct();

        if pnl <= rules.stop_loss_pct + PCT_EPSILON {
            decisions.push((
                pos.code.clone(),
                pos.shares,
                ActionKind::StopLoss,
                format!("pnl {pnl:.2}% <= {}%", rules.stop_loss_pct),
            ));
            continue;
        }

        if !stale.contains(pos.code.as_str()) {
            if let Some(dev) = trend_deviation(inputs.ranking, &pos.code, pos.last_price) {
                if dev < rules.trend_breach_pct {
                    pos.breach_days += 1;
                } else {
                    pos.breach_days = 0;
                }
            }
        }
        if pos.breach_days >= rules.trend_breach_days {
            decisions.push((
                pos.code.clone(),
                pos.shares,
                ActionKind::TrendBreach,
                format!(
                    "trend below {}% for {} cycles",
                    rules.trend_breach_pct, pos.breach_days
                ),
            ));
            continue;
        }

        if !pos.half_sold && pnl >= rules.take_profit_pct - PCT_EPSILON {
            let half = pos.shares / 2;
            if half > 0 {
                decisions.push((
                    pos.code.clone(),
                    half,
                    ActionKind::TakeProfit,
                    format!("pnl {pnl:.2}% >= {}%", rules.take_profit_pct),
                ));
            }
        }
    }

    decisions
        .into_iter()
        .filter_map(|(code, shares, kind, reason)| {
            sell(state, inputs.date, &code, shares, kind, reason)
        })
        .collect()
}

fn average_down(
    state: &mut PortfolioState,
    inputs: &CycleInputs<'_>,
    rules: &PortfolioRules,
    stale: &HashSet<&str>,
) -> Vec<Action> {
    let mut actions = Vec::new();
    let shares = rules.averaging_lots * rules.lot_size;
    if shares == 0 {
        return actions;
    }

    for pos in &mut state.positions {
        if pos.averaged_down || stale.contains(pos.code.as_str()) {
            continue;
        }
        let pnl = pos.pnl_pct();
        if pnl > rules.averaging_trigger_pct + PCT_EPSILON {
            continue;
        }
        let Some(dev) = trend_deviation(inputs.ranking, &pos.code, pos.last_price) else {
            continue;
        };
        if dev <= rules.trend_breach_pct {
            continue;
        }

        let price = pos.last_price;
        let cost = shares as f64 * price;
        if cost > state.cash {
            debug!(code = %pos.code, cost, cash = state.cash, "not enough cash to average down");
            continue;
        }

        state.cash -= cost;
        pos.add_shares(shares, price);
        pos.averaged_down = true;

        info!(code = %pos.code, shares, price, cost_basis = pos.cost_basis, "average down");
        actions.push(Action {
            date: inputs.date,
            kind: ActionKind::AverageDown,
            code: pos.code.clone(),
            price,
            shares,
            amount: cost,
            realized_pnl: None,
            resulting_state: pos.state(),
            reason: format!("pnl {pnl:.2}% <= {}%, trend {dev:.2}%", rules.averaging_trigger_pct),
        });
    }
    actions
}

fn passes_entry_gates(candidate: &ScoredCandidate, rules: &PortfolioRules) -> bool {
    let snap = &candidate.snapshot;
    candidate.score >= rules.min_score
        && snap.dividend_yield.unwrap_or(0.0) >= rules.min_dividend
        && snap.market_cap_b.unwrap_or(0.0) >= rules.min_market_cap
        && snap.price > 0.0
        && snap.price.is_finite()
}

fn enter_positions(
    state: &mut PortfolioState,
    inputs: &CycleInputs<'_>,
    rules: &PortfolioRules,
    touched: &HashSet<String>,
) -> Vec<Action> {
    let mut actions = Vec::new();

    if state.position_count() >= rules.max_positions {
        debug!(positions = state.position_count(), "position limit reached, no entries");
        return actions;
    }
    let nav = state.nav();
    let cash_ratio = if nav > 0.0 { state.cash / nav } else { 0.0 };
    if cash_ratio < rules.min_cash_ratio {
        debug!(cash_ratio, floor = rules.min_cash_ratio, "cash ratio below floor, no entries");
        return actions;
    }
    if rules.lot_size == 0 {
        return actions;
    }

    for candidate in &inputs.ranking.candidates {
        if actions.len() >= rules.max_buys_per_cycle
            || state.position_count() >= rules.max_positions
        {
            break;
        }
        let code = candidate.code();
        if state.has_position(code) || touched.contains(code) {
            continue;
        }
        if !passes_entry_gates(candidate, rules) {
            continue;
        }

        let price = candidate.snapshot.price;
        let budget = rules.per_position_max.min(rules.entry_cash_fraction * state.cash);
        let lot_cost = price * rules.lot_size as f64;
        let lots = (budget / lot_cost).floor();
        if !(lots >= 1.0) {
            debug!(%code, budget, lot_cost, "budget below one lot, skipping");
            continue;
        }
        let shares = lots as u64 * rules.lot_size;
        let cost = shares as f64 * price;
        if cost > state.cash {
            continue;
        }

        state.cash -= cost;
        let position = Position::new(code, inputs.date, price, shares);
        let resulting_state = position.state();
        state.add_position(position);

        info!(%code, shares, price, score = candidate.score, "buy");
        actions.push(Action {
            date: inputs.date,
            kind: ActionKind::Buy,
            code: code.to_string(),
            price,
            shares,
            amount: cost,
            realized_pnl: None,
            resulting_state,
            reason: format!("score {:.1}", candidate.score),
        });
    }
    actions
}
