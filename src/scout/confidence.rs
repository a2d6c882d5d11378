//! Confidence signal arithmetic.
//!
//! Bounded [0,1] heuristics derived purely from evaluation deltas — no
//! engine calls, no search. Each signal is independently optional: an
//! absent input yields `None`, never a fabricated number. The one
//! exception is `horizon`, which has a documented default when the sweep
//! depth is unknown.

use serde::{Deserialize, Serialize};

use super::dual_depth::InvestigationResult;

/// Divergence at which shallow and deep evaluation are treated as fully
/// disagreeing.
const STABILITY_SPAN_CP: f64 = 120.0;

/// Spread at which the gap between the top two candidates saturates.
const VOLATILITY_SPAN_CP: f64 = 80.0;

/// Horizon risk when the sweep depth is unknown.
const HORIZON_UNKNOWN: f64 = 0.6;

/// Raw inputs for signal estimation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceInputs {
    pub eval_shallow: Option<i32>,
    pub eval_deep: Option<i32>,
    pub top1_eval: Option<i32>,
    pub top2_eval: Option<i32>,
    pub shallow_depth: Option<u32>,
}

impl From<&InvestigationResult> for ConfidenceInputs {
    fn from(result: &InvestigationResult) -> Self {
        Self {
            eval_shallow: Some(result.eval_shallow),
            eval_deep: Some(result.eval_deep),
            top1_eval: Some(result.best_move_deep_eval),
            top2_eval: result.second_best_move_deep_eval,
            shallow_depth: None,
        }
    }
}

/// Derived signals, recomputed per request and never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSignals {
    /// 1.0 at perfect shallow/deep agreement, 0.0 at full divergence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_stability: Option<f64>,
    /// Spread between the top two candidates, saturated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility: Option<f64>,
    /// Risk that the sweep depth hid tactics beyond its horizon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizon: Option<f64>,
    pub notes: Vec<String>,
}

/// Estimate all signals from whatever inputs are present.
pub fn estimate(inputs: &ConfidenceInputs) -> ConfidenceSignals {
    let mut notes = Vec::new();

    let eval_stability = match (inputs.eval_shallow, inputs.eval_deep) {
        (Some(shallow), Some(deep)) => {
            Some((1.0 - (deep - shallow).abs() as f64 / STABILITY_SPAN_CP).clamp(0.0, 1.0))
        }
        _ => {
            notes.push("stability unavailable: missing shallow or deep eval".to_string());
            None
        }
    };

    let volatility = match (inputs.top1_eval, inputs.top2_eval) {
        (Some(top1), Some(top2)) => {
            Some(((top1 - top2).abs() as f64 / VOLATILITY_SPAN_CP).clamp(0.0, 1.0))
        }
        _ => {
            notes.push("volatility unavailable: missing second candidate".to_string());
            None
        }
    };

    let horizon = match inputs.shallow_depth {
        None => {
            notes.push("horizon defaulted: sweep depth unknown".to_string());
            Some(HORIZON_UNKNOWN)
        }
        Some(depth) if depth <= 6 => Some(1.0),
        Some(depth) if depth <= 10 => Some(0.7),
        Some(depth) if depth <= 14 => Some(0.4),
        Some(_) => Some(0.25),
    };

    ConfidenceSignals {
        eval_stability,
        volatility,
        horizon,
        notes,
    }
}
