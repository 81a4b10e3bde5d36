//! Parallel backtest sweep (SPEC_FULL.md §7, §9): runs one compiled Play
//! across many independent symbol histories concurrently with `rayon`.
//! Each job gets its own `PlayEngine` and `SimAdapter` — no state crosses
//! threads — and `rayon`'s indexed `collect` hands results back in the
//! order the caller submitted them, not thread-schedule order, so a sweep
//! produces the same `Vec<SweepOutcome>` regardless of worker count.
//! Never used inside one engine's own bar loop, which stays single
//! threaded per spec.md §5.

use rayon::prelude::*;

use crate::play::CompiledPlay;

use super::error::EngineError;
use super::exec_adapter::SimAdapter;
use super::play_engine::{BarOutcome, ClosedBars, PlayEngine};

/// One symbol's full closed-bar history, paired with the mark price to
/// fill against on each tick.
pub struct SweepJob {
    pub symbol: String,
    pub ticks: Vec<(ClosedBars, f64)>,
}

/// The result of running one `SweepJob` to completion, or as far as it
/// got before a fatal `EngineError` ended that symbol's run early. One
/// symbol's error never aborts the other jobs in the sweep.
pub struct SweepOutcome {
    pub symbol: String,
    pub outcomes: Vec<BarOutcome>,
    pub error: Option<EngineError>,
}

/// Runs `jobs` concurrently, one `PlayEngine`/`SimAdapter` pair per job.
/// `compiled` is shared read-only across threads — `CompiledPlay` is pure
/// data built once at Play-load time.
pub fn run_sweep(compiled: &CompiledPlay, jobs: Vec<SweepJob>) -> Result<Vec<SweepOutcome>, crate::indicators::FactoryError> {
    jobs.into_par_iter().map(|job| run_job(compiled, job)).collect()
}

fn run_job(compiled: &CompiledPlay, job: SweepJob) -> Result<SweepOutcome, crate::indicators::FactoryError> {
    let mut engine = PlayEngine::new(compiled)?;
    let mut adapter = SimAdapter::new(&compiled.account);
    let mut outcomes = Vec::with_capacity(job.ticks.len());

    for (closed, mark_price) in job.ticks {
        adapter.set_mark_price(&job.symbol, mark_price);
        match engine.process_bar(&job.symbol, closed, mark_price, &mut adapter) {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                return Ok(SweepOutcome { symbol: job.symbol, outcomes, error: Some(err) });
            }
        }
    }

    Ok(SweepOutcome { symbol: job.symbol, outcomes, error: None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use crate::feed::TfRole;
    use crate::play::feature::{ParamMap, ParamValue};
    use crate::play::risk::{Account, FeeModel, MarginMode, RiskModel, Sizing, StopLoss, TakeProfit};
    use crate::play::{FeatureSpec, Play};
    use crate::rules::{RawExpr, RawOperand};
    use std::collections::BTreeMap;

    fn flat_play() -> Play {
        let mut ema_params = ParamMap::new();
        ema_params.insert("period".to_string(), ParamValue::Number(3.0));

        let mut actions = BTreeMap::new();
        actions.insert(
            "entry_long".to_string(),
            RawExpr::Cond {
                lhs: RawOperand::Token("price.mark.close".to_string()),
                op: ">".to_string(),
                rhs: RawOperand::Token("indicator.ema_3".to_string()),
                tolerance: None,
            },
        );
        actions.insert(
            "exit_long".to_string(),
            RawExpr::Cond {
                lhs: RawOperand::Token("price.mark.close".to_string()),
                op: "<".to_string(),
                rhs: RawOperand::Token("indicator.ema_3".to_string()),
                tolerance: None,
            },
        );

        Play {
            id: "sweep-fixture".to_string(),
            version: "1.0.0".to_string(),
            symbol_universe: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            exec_tf: "1m".to_string(),
            med_tf: None,
            high_tf: None,
            features: vec![FeatureSpec {
                output_key: "ema_3".to_string(),
                tf: TfRole::Exec,
                indicator_type: "ema".to_string(),
                params: ema_params,
                input_source: None,
            }],
            structures: vec![],
            actions,
            setups: BTreeMap::new(),
            risk_model: RiskModel {
                stop_loss: StopLoss::Percent { value: 5.0 },
                take_profit: TakeProfit::RrRatio { value: 2.0 },
                sizing: Sizing::PercentEquity { value: 10.0 },
                max_positions_per_symbol: 1,
                allow_flip: false,
                allow_scale_in: false,
                allow_scale_out: false,
            },
            account: Account {
                starting_equity_usdt: 10_000.0,
                max_leverage: 5.0,
                margin_mode: MarginMode::Isolated,
                min_trade_notional_usdt: 10.0,
                max_notional_usdt: None,
                max_margin_usdt: None,
                fee_model: FeeModel { taker: 0.0006, maker: 0.0002 },
                slippage_bps: None,
            },
        }
    }

    fn bar(i: i64, close: f64) -> Bar {
        Bar { ts_open: i * 60_000, ts_close: (i + 1) * 60_000, open: close, high: close, low: close, close, volume: 10.0 }
    }

    fn ticks(closes: &[f64]) -> Vec<(ClosedBars, f64)> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| (ClosedBars { exec: bar(i as i64, c), med: None, high: None }, c))
            .collect()
    }

    #[test]
    fn sweep_runs_every_job_and_preserves_submission_order() {
        let compiled = flat_play().compile().unwrap();
        let jobs = vec![
            SweepJob { symbol: "BTCUSDT".to_string(), ticks: ticks(&[100.0, 100.0, 100.0, 120.0]) },
            SweepJob { symbol: "ETHUSDT".to_string(), ticks: ticks(&[50.0, 50.0, 50.0, 40.0]) },
        ];

        let results = run_sweep(&compiled, jobs).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].symbol, "BTCUSDT");
        assert_eq!(results[1].symbol, "ETHUSDT");
        assert!(results.iter().all(|r| r.error.is_none()));
        assert_eq!(results[0].outcomes.len(), 4);
    }

    #[test]
    fn sweep_is_deterministic_across_repeated_runs() {
        let compiled = flat_play().compile().unwrap();
        let make_jobs = || {
            vec![
                SweepJob { symbol: "BTCUSDT".to_string(), ticks: ticks(&[100.0, 100.0, 100.0, 120.0, 90.0]) },
                SweepJob { symbol: "ETHUSDT".to_string(), ticks: ticks(&[50.0, 50.0, 50.0, 40.0, 60.0]) },
            ]
        };

        let run = || {
            run_sweep(&compiled, make_jobs())
                .unwrap()
                .into_iter()
                .map(|r| (r.symbol, format!("{:?}", r.outcomes)))
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }
}
