//! Dual-depth exploration.
//!
//! A shallow multipv sweep proposes candidate moves cheaply; a deep pass
//! verifies the canonical line; each candidate is then re-examined at deep
//! depth one ply in, which exposes moves whose shallow appeal evaporates
//! under reply search ("overestimated" moves, the shallow-search blind
//! spots downstream narration cares about).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chess::Board;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::goal::GoalOutcome;
use super::{
    find_legal_move, format_cp, parse_board, render_move, white_to_move, ScanPolicy,
};
use crate::engine::{to_relative, EnginePool, EvaluationInfo};
use crate::error::{AppError, AppResult};

/// Gap between best and second-best deep moves beyond which the position
/// is treated as only-move critical.
const CRITICAL_GAP_CP: i32 = 100;

/// Mover-relative deep eval at or above which the side to move is winning.
const WINNING_REL_CP: i32 = 150;

/// A ranked candidate from the shallow sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCandidate {
    /// Candidate move in coordinate notation.
    pub mv: String,
    /// White-POV centipawns at shallow depth.
    pub score_cp: i32,
    /// Shallow principal variation, truncated.
    pub pv: Vec<String>,
}

/// One explored branch: a candidate move and its deep verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchNode {
    /// The candidate move.
    pub mv: String,
    /// White-POV shallow score of the candidate.
    pub shallow_cp: i32,
    /// White-POV deep score of the resulting position; `None` when the
    /// branch evaluation failed and the branch was kept without a verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_cp: Option<i32>,
    /// The refuting reply line found at deep depth.
    #[serde(default)]
    pub reply_pv: Vec<String>,
    /// Whether shallow appeal evaporated under deeper reply search.
    pub overestimated: bool,
}

/// Rooted exploration record for one investigated position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorationTree {
    pub fen: String,
    pub eval_shallow: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_deep: Option<i32>,
    pub best_move: String,
    pub branches: Vec<BranchNode>,
}

/// Aggregate artifact of one investigation. Immutable once built; the
/// builder below accumulates the independently computed stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub fen: String,
    pub eval_shallow: i32,
    pub eval_deep: i32,
    pub best_move_deep: String,
    pub best_move_deep_eval: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_best_move_deep: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_best_move_deep_eval: Option<i32>,
    pub is_critical: bool,
    pub is_winning: bool,
    pub top_moves_shallow: Vec<MoveCandidate>,
    pub overestimated_moves: Vec<String>,
    pub exploration_tree: ExplorationTree,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<GoalOutcome>,
}

/// Accumulates investigation stages, then yields the immutable result.
#[derive(Debug, Default)]
struct InvestigationBuilder {
    fen: String,
    white_to_move: bool,
    eval_shallow: Option<i32>,
    top_moves_shallow: Vec<MoveCandidate>,
    eval_deep: Option<i32>,
    best_move_deep: Option<String>,
    best_move_deep_eval: Option<i32>,
    second_best_move_deep: Option<String>,
    second_best_move_deep_eval: Option<i32>,
    branches: Vec<BranchNode>,
    annotated_transcript: Option<String>,
    goal: Option<GoalOutcome>,
}

impl InvestigationBuilder {
    fn new(fen: &str, white_to_move: bool) -> Self {
        Self {
            fen: fen.to_string(),
            white_to_move,
            ..Self::default()
        }
    }

    fn finish(self) -> AppResult<InvestigationResult> {
        let missing = |stage: &str| AppError::Internal {
            message: format!("investigation finalized before {} stage", stage),
        };
        let eval_shallow = self.eval_shallow.ok_or_else(|| missing("shallow"))?;
        let eval_deep = self.eval_deep.ok_or_else(|| missing("deep"))?;
        let best_move_deep = self.best_move_deep.ok_or_else(|| missing("deep"))?;
        let best_move_deep_eval = self.best_move_deep_eval.ok_or_else(|| missing("deep"))?;

        let best_rel = to_relative(best_move_deep_eval, self.white_to_move);
        let is_critical = self
            .second_best_move_deep_eval
            .map(|second| best_rel - to_relative(second, self.white_to_move) > CRITICAL_GAP_CP)
            .unwrap_or(false);
        let is_winning = best_rel >= WINNING_REL_CP;

        let overestimated_moves = self
            .branches
            .iter()
            .filter(|b| b.overestimated)
            .map(|b| b.mv.clone())
            .collect();

        Ok(InvestigationResult {
            exploration_tree: ExplorationTree {
                fen: self.fen.clone(),
                eval_shallow,
                eval_deep: Some(eval_deep),
                best_move: best_move_deep.clone(),
                branches: self.branches,
            },
            fen: self.fen,
            eval_shallow,
            eval_deep,
            best_move_deep,
            best_move_deep_eval,
            second_best_move_deep: self.second_best_move_deep,
            second_best_move_deep_eval: self.second_best_move_deep_eval,
            is_critical,
            is_winning,
            top_moves_shallow: self.top_moves_shallow,
            overestimated_moves,
            annotated_transcript: self.annotated_transcript,
            goal: self.goal,
        })
    }
}

/// Outcome of a timeout-bounded scan: the result, or a structured error
/// object the API layer can pass through without unwinding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScanOutcome {
    Completed(Box<InvestigationResult>),
    Error { error: String },
}

/// The search component: dual-depth exploration and goal-directed search
/// against a shared engine pool.
#[derive(Clone)]
pub struct Investigator {
    pool: Arc<EnginePool>,
    policy: ScanPolicy,
}

/// True when a candidate's shallow promise is strictly beyond the
/// significance margin of its deep verification. Both scores are relative
/// to the side that played the candidate; equality is deliberately not
/// flagged, evaluation jitter lives inside the margin.
fn is_overestimated(shallow_rel: i32, branch_rel: i32, threshold_cp: i32) -> bool {
    shallow_rel - branch_rel > threshold_cp
}

impl Investigator {
    pub fn new(pool: Arc<EnginePool>, policy: ScanPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> &ScanPolicy {
        &self.policy
    }

    pub(crate) fn pool(&self) -> &Arc<EnginePool> {
        &self.pool
    }

    /// Full dual-depth investigation without a wall-clock bound.
    pub async fn investigate(&self, fen: &str) -> AppResult<InvestigationResult> {
        self.run_scan(fen).await?.finish()
    }

    /// Dual-depth investigation plus goal-directed search, merged into one
    /// artifact.
    pub async fn investigate_with_goal(
        &self,
        fen: &str,
        request: &super::goal::GoalRequest,
    ) -> AppResult<InvestigationResult> {
        let mut builder = self.run_scan(fen).await?;
        builder.goal = Some(self.investigate_target(fen, request).await?);
        builder.finish()
    }

    /// Timeout-bounded scan. On deadline expiry the investigation is
    /// abandoned and a structured error is returned; an in-flight engine
    /// call may still run to completion inside its queue.
    pub async fn scan(&self, fen: &str) -> ScanOutcome {
        let deadline = Duration::from_secs_f64(self.policy.timeout_seconds);
        match tokio::time::timeout(deadline, self.investigate(fen)).await {
            Ok(Ok(result)) => ScanOutcome::Completed(Box::new(result)),
            Ok(Err(e)) => ScanOutcome::Error {
                error: e.to_string(),
            },
            Err(_) => {
                warn!(fen = %fen, timeout_s = self.policy.timeout_seconds, "Scan timed out");
                ScanOutcome::Error {
                    error: format!("scan timeout after {}s", self.policy.timeout_seconds),
                }
            }
        }
    }

    async fn run_scan(&self, fen: &str) -> AppResult<InvestigationBuilder> {
        let start = Instant::now();
        // Fail fast before spending any engine budget.
        let board = parse_board(fen)?;
        let white = white_to_move(&board);
        let mut builder = InvestigationBuilder::new(fen, white);

        // Stage 1: shallow breadth sweep.
        let shallow = self
            .pool
            .analyze_single(fen, self.policy.shallow_depth, self.policy.branching_limit)
            .await?;
        let shallow_best = shallow.evals.first().cloned().ok_or_else(|| {
            AppError::Internal {
                message: format!("engine returned no shallow evaluations for {}", fen),
            }
        })?;
        let mut candidates: Vec<MoveCandidate> = shallow
            .evals
            .iter()
            .filter_map(|e| {
                e.best_move().map(|mv| MoveCandidate {
                    mv: mv.to_string(),
                    score_cp: e.score_cp,
                    pv: e.pv.iter().take(self.policy.max_pv_plies).cloned().collect(),
                })
            })
            .collect();
        candidates.sort_by_key(|c| -to_relative(c.score_cp, white));
        candidates.truncate(self.policy.branching_limit);

        builder.eval_shallow = Some(
            candidates
                .first()
                .map(|c| c.score_cp)
                .unwrap_or(shallow_best.score_cp),
        );
        builder.top_moves_shallow = candidates.clone();
        debug!(
            fen = %fen,
            candidates = candidates.len(),
            engine = %shallow.engine_id,
            "Shallow sweep complete"
        );

        // Stage 2: deep verification of the canonical line, second-best
        // captured for criticality.
        let deep = self
            .pool
            .analyze_single(fen, self.policy.deep_depth, 2)
            .await?;
        let best = deep.evals.first().ok_or_else(|| AppError::Internal {
            message: format!("engine returned no deep evaluation for {}", fen),
        })?;
        builder.eval_deep = Some(best.score_cp);
        builder.best_move_deep = Some(best.best_move().unwrap_or_default().to_string());
        builder.best_move_deep_eval = Some(best.score_cp);
        if let Some(second) = deep.evals.get(1) {
            builder.second_best_move_deep = second.best_move().map(str::to_string);
            builder.second_best_move_deep_eval = Some(second.score_cp);
        }

        // Stage 3: deep verification of each shallow candidate, one ply in.
        for candidate in &candidates {
            let Some(mv) = find_legal_move(&board, &candidate.mv) else {
                warn!(fen = %fen, mv = %candidate.mv, "Shallow candidate is not legal, skipping");
                continue;
            };
            let child = board.make_move_new(mv);
            match self
                .pool
                .analyze_single(&child.to_string(), self.policy.deep_depth, 1)
                .await
            {
                Ok(reply) if !reply.evals.is_empty() => {
                    let branch_eval = &reply.evals[0];
                    let shallow_rel = to_relative(candidate.score_cp, white);
                    let branch_rel = to_relative(branch_eval.score_cp, white);
                    builder.branches.push(BranchNode {
                        mv: candidate.mv.clone(),
                        shallow_cp: candidate.score_cp,
                        deep_cp: Some(branch_eval.score_cp),
                        reply_pv: branch_eval
                            .pv
                            .iter()
                            .take(self.policy.max_pv_plies)
                            .cloned()
                            .collect(),
                        overestimated: is_overestimated(
                            shallow_rel,
                            branch_rel,
                            self.policy.overestimate_threshold_cp,
                        ),
                    });
                }
                other => {
                    // Partial-failure tolerance: the branch stays without a
                    // verdict and never reaches the overestimated list.
                    if let Err(e) = other {
                        warn!(fen = %fen, mv = %candidate.mv, error = %e, "Branch evaluation failed");
                    } else {
                        warn!(fen = %fen, mv = %candidate.mv, "Branch evaluation returned no lines");
                    }
                    builder.branches.push(BranchNode {
                        mv: candidate.mv.clone(),
                        shallow_cp: candidate.score_cp,
                        deep_cp: None,
                        reply_pv: Vec::new(),
                        overestimated: false,
                    });
                }
            }
        }

        if self.policy.include_annotated_transcript {
            builder.annotated_transcript = Some(build_transcript(
                &board,
                best.score_cp,
                &best.pv,
                &builder.branches,
                &self.policy,
            ));
        }

        info!(
            fen = %fen,
            eval_deep = best.score_cp,
            branches = builder.branches.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Investigation complete"
        );
        Ok(builder)
    }
}

/// Render the deep principal variation with evaluation tags plus one line
/// per explored branch, capped at `transcript_max_chars`.
fn build_transcript(
    root: &Board,
    eval_deep: i32,
    pv: &[String],
    branches: &[BranchNode],
    policy: &ScanPolicy,
) -> String {
    let mut out = String::new();
    let mut board = *root;
    let mut move_number = 1u32;
    let mut white_turn = white_to_move(&board);
    if !white_turn {
        out.push_str("1... ");
    }

    for (i, uci) in pv.iter().take(policy.max_pv_plies).enumerate() {
        let Some(mv) = find_legal_move(&board, uci) else {
            break;
        };
        if white_turn {
            out.push_str(&format!("{}. ", move_number));
        }
        out.push_str(&render_move(&board, &mv));
        if i == 0 {
            out.push_str(&format!(" {{{}}}", format_cp(eval_deep)));
        }
        out.push(' ');
        if !white_turn {
            move_number += 1;
        }
        board = board.make_move_new(mv);
        white_turn = !white_turn;
    }

    let mut text = out.trim_end().to_string();
    for branch in branches {
        let line = match branch.deep_cp {
            Some(deep) => format!(
                "\nalt {}: shallow {}, deep {}{}",
                branch.mv,
                format_cp(branch.shallow_cp),
                format_cp(deep),
                if branch.overestimated {
                    " (overestimated)"
                } else {
                    ""
                }
            ),
            None => format!(
                "\nalt {}: shallow {}, deep unavailable",
                branch.mv,
                format_cp(branch.shallow_cp)
            ),
        };
        text.push_str(&line);
    }

    if text.len() > policy.transcript_max_chars {
        let mut cut = policy.transcript_max_chars;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
