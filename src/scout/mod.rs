//! Position investigation.
//!
//! This module hosts the search side of the crate:
//! - [`Investigator`]: dual-depth exploration (shallow breadth sweep plus
//!   deep verification) and goal-directed beam search
//! - [`ScanPolicy`]: externally configurable scan knobs
//! - [`reduce`](evidence::reduce): evidence reduction for narration
//! - [`estimate`](confidence::estimate): confidence signal arithmetic

mod confidence;
mod dual_depth;
mod evidence;
mod goal;

pub use confidence::{estimate, ConfidenceInputs, ConfidenceSignals};
pub use dual_depth::{
    BranchNode, ExplorationTree, InvestigationResult, Investigator, MoveCandidate, ScanOutcome,
};
pub use evidence::{reduce, EvidenceBundle, PrimaryClaim, RejectedAlternative};
pub use goal::{
    CastleSide, GoalAttempt, GoalOutcome, GoalPolicy, GoalRequest, GoalStatus, OpponentModel,
    PieceKind, Predicate, QueryType, Side, StopPolicy,
};

use std::str::FromStr;

use chess::{Board, ChessMove, Color, File, MoveGen, Piece, Rank, Square};
use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::error::{AppError, AppResult};

/// Externally configurable scan knobs. Unset fields take the documented
/// defaults on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPolicy {
    /// Breadth-oriented sweep depth.
    #[serde(default = "default_shallow_depth")]
    pub shallow_depth: u32,
    /// Verification depth for the canonical line and each branch.
    #[serde(default = "default_deep_depth")]
    pub deep_depth: u32,
    /// Fan-out cap per node.
    #[serde(default = "default_branching_limit")]
    pub branching_limit: usize,
    /// Principal variations are truncated to this many plies.
    #[serde(default = "default_max_pv_plies")]
    pub max_pv_plies: usize,
    /// Whether to render the annotated transcript.
    #[serde(default = "default_include_transcript")]
    pub include_annotated_transcript: bool,
    /// Hard cap on transcript length.
    #[serde(default = "default_transcript_max_chars")]
    pub transcript_max_chars: usize,
    /// Wall-clock budget for one scan.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    /// A branch is overestimated only strictly beyond this margin.
    #[serde(default = "default_overestimate_threshold")]
    pub overestimate_threshold_cp: i32,
}

fn default_shallow_depth() -> u32 {
    2
}

fn default_deep_depth() -> u32 {
    16
}

fn default_branching_limit() -> usize {
    4
}

fn default_max_pv_plies() -> usize {
    16
}

fn default_include_transcript() -> bool {
    true
}

fn default_transcript_max_chars() -> usize {
    12_000
}

fn default_timeout_seconds() -> f64 {
    18.0
}

fn default_overestimate_threshold() -> i32 {
    80
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            shallow_depth: default_shallow_depth(),
            deep_depth: default_deep_depth(),
            branching_limit: default_branching_limit(),
            max_pv_plies: default_max_pv_plies(),
            include_annotated_transcript: default_include_transcript(),
            transcript_max_chars: default_transcript_max_chars(),
            timeout_seconds: default_timeout_seconds(),
            overestimate_threshold_cp: default_overestimate_threshold(),
        }
    }
}

impl From<&ScanConfig> for ScanPolicy {
    fn from(config: &ScanConfig) -> Self {
        Self {
            shallow_depth: config.shallow_depth,
            deep_depth: config.deep_depth,
            branching_limit: config.branching_limit,
            max_pv_plies: config.max_pv_plies,
            include_annotated_transcript: true,
            transcript_max_chars: config.transcript_max_chars,
            timeout_seconds: config.timeout_seconds,
            overestimate_threshold_cp: config.overestimate_threshold_cp,
        }
    }
}

// ============================================================================
// Board helpers
// ============================================================================

/// Parse a FEN, failing fast on malformed input.
pub(crate) fn parse_board(fen: &str) -> AppResult<Board> {
    Board::from_str(fen).map_err(|_| AppError::MalformedPosition {
        fen: fen.to_string(),
    })
}

/// Parse an algebraic square name like "e4".
pub(crate) fn parse_square(name: &str) -> Option<Square> {
    let bytes = name.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let file = (bytes[0] as char).to_ascii_lowercase() as i32 - 'a' as i32;
    let rank = bytes[1] as i32 - '1' as i32;
    if !(0..8).contains(&file) || !(0..8).contains(&rank) {
        return None;
    }
    Some(Square::make_square(
        Rank::from_index(rank as usize),
        File::from_index(file as usize),
    ))
}

/// Coordinate notation for a move, e.g. "e2e4" or "e7e8q".
pub(crate) fn move_to_uci(mv: &ChessMove) -> String {
    let promo = match mv.get_promotion() {
        Some(Piece::Queen) => "q",
        Some(Piece::Rook) => "r",
        Some(Piece::Bishop) => "b",
        Some(Piece::Knight) => "n",
        _ => "",
    };
    format!("{}{}{}", mv.get_source(), mv.get_dest(), promo)
}

/// Find the legal move matching a coordinate-notation string, if any.
pub(crate) fn find_legal_move(board: &Board, uci: &str) -> Option<ChessMove> {
    MoveGen::new_legal(board).find(|m| move_to_uci(m) == uci)
}

/// True when the move is castling: the king travels two files.
pub(crate) fn is_castle(board: &Board, mv: &ChessMove) -> bool {
    board.piece_on(mv.get_source()) == Some(Piece::King)
        && (mv.get_source().get_file().to_index() as i32
            - mv.get_dest().get_file().to_index() as i32)
            .abs()
            == 2
}

/// Render a move for witness lines and transcripts: castling as O-O /
/// O-O-O, everything else in coordinate notation.
pub(crate) fn render_move(board: &Board, mv: &ChessMove) -> String {
    if is_castle(board, mv) {
        if mv.get_dest().get_file() == File::G {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        }
    } else {
        move_to_uci(mv)
    }
}

/// Format centipawns as a pawn-unit tag, e.g. "+0.45" or "-1.20".
pub(crate) fn format_cp(cp: i32) -> String {
    format!("{}{:.2}", if cp >= 0 { "+" } else { "-" }, cp.abs() as f64 / 100.0)
}

/// Side on move at the root, as a sign-aware flag.
pub(crate) fn white_to_move(board: &Board) -> bool {
    board.side_to_move() == Color::White
}
