//! Goal-directed search.
//!
//! Finds a witness line — a concrete move sequence — satisfying a
//! declarative predicate within bounded search effort:
//! - predicates compose with and/or/not over leaf conditions
//! - candidate moves are engine-ranked, the beam keeps the best states
//! - opponent plies follow the best-reply assumption
//! - "no witness found" is a result, never an error

use std::time::Instant;

use chess::{Board, ChessMove, Color, MoveGen, Piece};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::dual_depth::Investigator;
use super::{find_legal_move, is_castle, parse_board, parse_square, render_move};
use crate::engine::to_relative;
use crate::error::{AppError, AppResult};

/// Piece color in predicate leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    White,
    Black,
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

/// Piece kind in predicate leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl From<PieceKind> for Piece {
    fn from(kind: PieceKind) -> Self {
        match kind {
            PieceKind::Pawn => Piece::Pawn,
            PieceKind::Knight => Piece::Knight,
            PieceKind::Bishop => Piece::Bishop,
            PieceKind::Rook => Piece::Rook,
            PieceKind::Queen => Piece::Queen,
            PieceKind::King => Piece::King,
        }
    }
}

/// Which wing a castling move lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastleSide {
    King,
    Queen,
}

/// Declarative search target, evaluated by one recursive visitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// A specified piece stands on a specified square.
    PieceOn {
        color: Side,
        piece: PieceKind,
        square: String,
    },
    /// The specified side has just castled on the specified wing.
    Castles { color: Side, side: CastleSide },
    /// The specified move (rendered form, e.g. "e2e4" or "O-O") has just
    /// been played.
    MovePlayed { mv: String },
    And { all: Vec<Predicate> },
    Or { any: Vec<Predicate> },
    Not { not: Box<Predicate> },
}

/// The move that produced the state under inspection.
struct PlayedMove {
    rendered: String,
    mover: Color,
    castle: Option<CastleSide>,
}

impl Predicate {
    /// Evaluate against a reached position. `last` is the move that led
    /// here; `None` at the root.
    fn holds(&self, board: &Board, last: Option<&PlayedMove>) -> bool {
        match self {
            Predicate::PieceOn {
                color,
                piece,
                square,
            } => match parse_square(square) {
                Some(sq) => {
                    board.piece_on(sq) == Some((*piece).into())
                        && board.color_on(sq) == Some((*color).into())
                }
                None => false,
            },
            Predicate::Castles { color, side } => last.is_some_and(|p| {
                p.mover == Color::from(*color) && p.castle == Some(*side)
            }),
            Predicate::MovePlayed { mv } => last.is_some_and(|p| p.rendered == *mv),
            Predicate::And { all } => all.iter().all(|p| p.holds(board, last)),
            Predicate::Or { any } => any.iter().any(|p| p.holds(board, last)),
            Predicate::Not { not } => !not.holds(board, last),
        }
    }
}

/// What kind of answer the search is after. Only existence queries are
/// defined today; the variant keeps the wire shape stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    #[default]
    Existence,
}

/// How opponent plies are modeled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpponentModel {
    /// The opponent always plays the engine's best reply.
    #[default]
    BestReply,
}

/// Search effort bounds for one goal query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalPolicy {
    #[serde(default)]
    pub query_type: QueryType,
    /// Maximum plies to search.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// States retained after each ply.
    #[serde(default = "default_beam_width")]
    pub beam_width: usize,
    /// Candidate moves expanded per protagonist state.
    #[serde(default = "default_branching_limit")]
    pub branching_limit: usize,
    #[serde(default)]
    pub opponent_model: OpponentModel,
    /// Engine depth when proposing protagonist candidates.
    #[serde(default = "default_depth_propose")]
    pub engine_depth_propose: u32,
    /// Engine depth when modeling the opponent's reply.
    #[serde(default = "default_depth_reply")]
    pub engine_depth_reply: u32,
    /// Distinct witness lines to collect before stopping.
    #[serde(default = "default_top_k")]
    pub top_k_witnesses: usize,
}

fn default_max_depth() -> u32 {
    4
}

fn default_beam_width() -> usize {
    4
}

fn default_branching_limit() -> usize {
    4
}

fn default_depth_propose() -> u32 {
    4
}

fn default_depth_reply() -> u32 {
    8
}

fn default_top_k() -> usize {
    1
}

impl Default for GoalPolicy {
    fn default() -> Self {
        Self {
            query_type: QueryType::default(),
            max_depth: default_max_depth(),
            beam_width: default_beam_width(),
            branching_limit: default_branching_limit(),
            opponent_model: OpponentModel::default(),
            engine_depth_propose: default_depth_propose(),
            engine_depth_reply: default_depth_reply(),
            top_k_witnesses: default_top_k(),
        }
    }
}

/// Hard budget for one goal query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopPolicy {
    #[serde(default = "default_max_time_s")]
    pub max_time_s: f64,
    #[serde(default = "default_max_engine_calls")]
    pub max_engine_calls: u32,
    /// Budget for the narration collaborator downstream; the search itself
    /// makes no language-model calls.
    #[serde(default)]
    pub max_llm_calls: u32,
}

fn default_max_time_s() -> f64 {
    12.0
}

fn default_max_engine_calls() -> u32 {
    64
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            max_time_s: default_max_time_s(),
            max_engine_calls: default_max_engine_calls(),
            max_llm_calls: 0,
        }
    }
}

/// One goal query: target predicate plus effort bounds. Created per
/// request and discarded after the investigation completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRequest {
    pub predicate: Predicate,
    #[serde(default)]
    pub policy: GoalPolicy,
    #[serde(default)]
    pub stop: StopPolicy,
    /// Confidence the caller requires of downstream narration; carried
    /// through unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_required: Option<f64>,
    /// Artifact names the caller requires of downstream narration; carried
    /// through unchanged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_artifacts: Vec<String>,
}

impl GoalRequest {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            policy: GoalPolicy::default(),
            stop: StopPolicy::default(),
            confidence_required: None,
            required_artifacts: Vec::new(),
        }
    }
}

/// Whether a witness was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Success,
    Failure,
}

/// Result of one goal query. "No witness" is an expected outcome, so this
/// is always returned as data, never as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalOutcome {
    pub goal_status: GoalStatus,
    /// First witness found; empty on failure, and on trivial success when
    /// the predicate already held at the root.
    pub witness_line: Vec<String>,
    /// All distinct witnesses, up to `top_k_witnesses`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub witnesses: Vec<Vec<String>>,
    pub nodes_expanded: u32,
    pub engine_calls: u32,
}

impl GoalOutcome {
    fn from_witnesses(witnesses: Vec<Vec<String>>, nodes_expanded: u32, engine_calls: u32) -> Self {
        Self {
            goal_status: if witnesses.is_empty() {
                GoalStatus::Failure
            } else {
                GoalStatus::Success
            },
            witness_line: witnesses.first().cloned().unwrap_or_default(),
            witnesses,
            nodes_expanded,
            engine_calls,
        }
    }
}

/// One attempt in the retry audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalAttempt {
    pub attempt: u32,
    pub outcome: String,
    pub latency_ms: i64,
}

struct BeamState {
    board: Board,
    line: Vec<String>,
    score_rel: i32,
}

impl Investigator {
    /// Search for move sequences satisfying `request.predicate`, bounded
    /// by the request's policy and stop budgets.
    pub async fn investigate_target(
        &self,
        fen: &str,
        request: &GoalRequest,
    ) -> AppResult<GoalOutcome> {
        let board = parse_board(fen)?;
        let root_white = board.side_to_move() == Color::White;
        let policy = &request.policy;
        let start = Instant::now();
        let mut engine_calls = 0u32;
        let mut nodes_expanded = 0u32;
        let mut witnesses: Vec<Vec<String>> = Vec::new();

        // The predicate may already hold before any move is made.
        if request.predicate.holds(&board, None) {
            witnesses.push(Vec::new());
        }

        let mut beam = vec![BeamState {
            board,
            line: Vec::new(),
            score_rel: 0,
        }];

        'plies: for ply in 1..=policy.max_depth {
            if witnesses.len() >= policy.top_k_witnesses {
                break;
            }
            let mut next: Vec<BeamState> = Vec::new();

            for state in &beam {
                if start.elapsed().as_secs_f64() > request.stop.max_time_s
                    || engine_calls >= request.stop.max_engine_calls
                {
                    debug!(ply = ply, engine_calls = engine_calls, "Goal search budget exhausted");
                    break 'plies;
                }

                let protagonist = (state.board.side_to_move() == Color::White) == root_white;
                let (depth, fan_out) = if protagonist {
                    (policy.engine_depth_propose, policy.branching_limit)
                } else {
                    // Best-reply assumption: the opponent does not branch.
                    (policy.engine_depth_reply, 1)
                };

                let candidates = self
                    .candidate_moves(&state.board, depth, fan_out, &mut engine_calls)
                    .await?;

                for (mv, score_white) in candidates {
                    nodes_expanded += 1;
                    let rendered = render_move(&state.board, &mv);
                    let played = PlayedMove {
                        castle: castle_side(&state.board, &mv),
                        mover: state.board.side_to_move(),
                        rendered: rendered.clone(),
                    };
                    let child = state.board.make_move_new(mv);
                    let mut line = state.line.clone();
                    line.push(rendered);

                    if request.predicate.holds(&child, Some(&played)) {
                        if !witnesses.contains(&line) {
                            witnesses.push(line);
                        }
                        if witnesses.len() >= policy.top_k_witnesses {
                            break 'plies;
                        }
                        continue;
                    }
                    next.push(BeamState {
                        board: child,
                        line,
                        score_rel: to_relative(score_white, root_white),
                    });
                }
            }

            next.sort_by_key(|s| -s.score_rel);
            next.truncate(policy.beam_width);
            beam = next;
            if beam.is_empty() {
                break;
            }
        }

        let outcome = GoalOutcome::from_witnesses(witnesses, nodes_expanded, engine_calls);
        info!(
            fen = %fen,
            status = ?outcome.goal_status,
            witnesses = outcome.witnesses.len(),
            engine_calls = outcome.engine_calls,
            latency_ms = start.elapsed().as_millis() as u64,
            "Goal search complete"
        );
        Ok(outcome)
    }

    /// Retry wrapper: re-invokes the search on transient infrastructure
    /// failure only, recording each attempt. Semantic failure (no witness
    /// within bounds) is returned as-is — it is an answer, not a fault.
    pub async fn retry_investigate_target(
        &self,
        fen: &str,
        request: &GoalRequest,
        max_retries: u32,
    ) -> AppResult<(GoalOutcome, Vec<GoalAttempt>)> {
        let mut attempts = Vec::new();
        let mut last_transient = None;

        for attempt in 1..=max_retries + 1 {
            let start = Instant::now();
            match self.investigate_target(fen, request).await {
                Ok(outcome) => {
                    attempts.push(GoalAttempt {
                        attempt,
                        outcome: match outcome.goal_status {
                            GoalStatus::Success => "success".to_string(),
                            GoalStatus::Failure => "failure".to_string(),
                        },
                        latency_ms: start.elapsed().as_millis() as i64,
                    });
                    return Ok((outcome, attempts));
                }
                Err(AppError::Engine(e)) if e.is_transient() => {
                    warn!(attempt = attempt, error = %e, "Goal search attempt failed, retrying");
                    attempts.push(GoalAttempt {
                        attempt,
                        outcome: format!("transient: {}", e),
                        latency_ms: start.elapsed().as_millis() as i64,
                    });
                    last_transient = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Engine(last_transient.unwrap_or_else(|| {
            crate::error::EngineError::Unavailable {
                message: "goal search retries exhausted".to_string(),
                retries: max_retries,
            }
        })))
    }

    /// Engine-ranked candidate moves for one state: multipv first-moves
    /// filtered for legality, topped up from move generation when the
    /// engine proposes fewer than `limit` distinct legal moves.
    async fn candidate_moves(
        &self,
        board: &Board,
        depth: u32,
        limit: usize,
        engine_calls: &mut u32,
    ) -> AppResult<Vec<(ChessMove, i32)>> {
        let legal: Vec<ChessMove> = MoveGen::new_legal(board).collect();
        if legal.is_empty() {
            return Ok(Vec::new());
        }

        *engine_calls += 1;
        let analysis = self
            .pool()
            .analyze_single(&board.to_string(), depth, limit)
            .await?;

        let mut out: Vec<(ChessMove, i32)> = Vec::new();
        for eval in &analysis.evals {
            if let Some(first) = eval.best_move() {
                if let Some(mv) = find_legal_move(board, first) {
                    if !out.iter().any(|(m, _)| *m == mv) {
                        out.push((mv, eval.score_cp));
                    }
                }
            }
        }

        let fallback = analysis.evals.last().map(|e| e.score_cp).unwrap_or(0);
        for mv in legal {
            if out.len() >= limit {
                break;
            }
            if !out.iter().any(|(m, _)| *m == mv) {
                out.push((mv, fallback));
            }
        }
        out.truncate(limit);
        Ok(out)
    }
}

fn castle_side(board: &Board, mv: &ChessMove) -> Option<CastleSide> {
    if !is_castle(board, mv) {
        return None;
    }
    Some(if mv.get_dest().get_file() == chess::File::G {
        CastleSide::King
    } else {
        CastleSide::Queen
    })
}
