//! Evidence reduction.
//!
//! Collapses a raw investigation into the compact, canonical bundle the
//! narration collaborator consumes: one primary claim, the rejected
//! alternatives with their refutations, the threat moves those
//! refutations reveal, and a deterministic prose summary. Pure
//! post-processing — no engine calls.

use serde::{Deserialize, Serialize};

use super::dual_depth::InvestigationResult;
use super::format_cp;

/// The investigation's central claim: the verified best move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryClaim {
    pub mv: String,
    pub eval_cp: i32,
    pub pv: Vec<String>,
}

/// A candidate whose shallow appeal did not survive deep verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedAlternative {
    pub mv: String,
    pub shallow_cp: i32,
    pub deep_cp: i32,
    /// First move of the refuting reply line, when the engine showed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refutation: Option<String>,
}

/// Compact, canonical evidence for downstream narration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub primary: PrimaryClaim,
    pub rejected: Vec<RejectedAlternative>,
    /// Distinct refutation moves, in branch order.
    pub threats: Vec<String>,
    pub summary: String,
}

/// Reduce an investigation to its evidence bundle.
pub fn reduce(result: &InvestigationResult) -> EvidenceBundle {
    // The claim's line is the best move followed by the verified reply
    // continuation from its branch, when the sweep explored it.
    let continuation = result
        .exploration_tree
        .branches
        .iter()
        .find(|b| b.mv == result.best_move_deep)
        .map(|b| b.reply_pv.clone())
        .unwrap_or_default();
    let primary = PrimaryClaim {
        mv: result.best_move_deep.clone(),
        eval_cp: result.best_move_deep_eval,
        pv: std::iter::once(result.best_move_deep.clone())
            .chain(continuation)
            .collect(),
    };

    let rejected: Vec<RejectedAlternative> = result
        .exploration_tree
        .branches
        .iter()
        .filter(|b| b.overestimated)
        .filter_map(|b| {
            b.deep_cp.map(|deep_cp| RejectedAlternative {
                mv: b.mv.clone(),
                shallow_cp: b.shallow_cp,
                deep_cp,
                refutation: b.reply_pv.first().cloned(),
            })
        })
        .collect();

    let mut threats = Vec::new();
    for alternative in &rejected {
        if let Some(threat) = &alternative.refutation {
            if !threats.contains(threat) {
                threats.push(threat.clone());
            }
        }
    }

    let summary = render_summary(result, &rejected);

    EvidenceBundle {
        primary,
        rejected,
        threats,
        summary,
    }
}

fn render_summary(result: &InvestigationResult, rejected: &[RejectedAlternative]) -> String {
    let mut summary = format!(
        "Best move is {} ({}).",
        result.best_move_deep,
        format_cp(result.best_move_deep_eval)
    );

    if result.is_winning {
        summary.push_str(" The side to move holds a winning advantage.");
    }
    if result.is_critical {
        if let (Some(second), Some(second_eval)) = (
            &result.second_best_move_deep,
            result.second_best_move_deep_eval,
        ) {
            summary.push_str(&format!(
                " It is the only good move; the second-best {} trails at {}.",
                second,
                format_cp(second_eval)
            ));
        }
    }

    for alternative in rejected {
        match &alternative.refutation {
            Some(reply) => summary.push_str(&format!(
                " {} looks tempting at shallow depth ({}) but deeper search refutes it ({}, reply {}).",
                alternative.mv,
                format_cp(alternative.shallow_cp),
                format_cp(alternative.deep_cp),
                reply
            )),
            None => summary.push_str(&format!(
                " {} looks tempting at shallow depth ({}) but deeper search refutes it ({}).",
                alternative.mv,
                format_cp(alternative.shallow_cp),
                format_cp(alternative.deep_cp)
            )),
        }
    }

    summary
}
