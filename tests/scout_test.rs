//! Integration tests for dual-depth scans, goal search, evidence
//! reduction, and confidence signals, driven by scripted engines.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use chess_scout::engine::{
    AnalysisRequest, Engine, EnginePool, EvaluationInfo, START_FEN,
};
use chess_scout::error::{AppError, EngineError, EngineResult};
use chess_scout::scout::{
    estimate, reduce, CastleSide, ConfidenceInputs, GoalRequest, GoalStatus, PieceKind, Predicate,
    ScanOutcome, ScanPolicy, Side,
};
use chess_scout::Investigator;

async fn investigator_with(
    engine: Box<dyn Engine>,
    policy: ScanPolicy,
) -> Investigator {
    let pool = EnginePool::assemble(vec![Ok(engine)], 16).await.unwrap();
    Investigator::new(Arc::new(pool), policy)
}

fn eval(cp: i32, pv: &[&str]) -> EvaluationInfo {
    EvaluationInfo::new(cp, pv.iter().map(|s| s.to_string()).collect())
}

// ============================================================================
// Goal search
// ============================================================================

/// Fails every request; proves a code path makes no engine calls.
struct UnreachableEngine;

#[async_trait]
impl Engine for UnreachableEngine {
    fn name(&self) -> &str {
        "unreachable"
    }
    async fn analyse(&mut self, _request: &AnalysisRequest) -> EngineResult<Vec<EvaluationInfo>> {
        Err(EngineError::ProcessDied {
            message: "should never be called".to_string(),
        })
    }
    async fn shutdown(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_depth_zero_succeeds_when_predicate_already_holds() {
    let investigator =
        investigator_with(Box::new(UnreachableEngine), ScanPolicy::default()).await;

    let mut request = GoalRequest::new(Predicate::PieceOn {
        color: Side::White,
        piece: PieceKind::Queen,
        square: "e4".to_string(),
    });
    request.policy.max_depth = 0;

    let outcome = investigator
        .investigate_target("4k3/8/8/8/4Q3/8/8/4K3 w - - 0 1", &request)
        .await
        .unwrap();

    assert_eq!(outcome.goal_status, GoalStatus::Success);
    assert!(outcome.witness_line.is_empty());
    assert_eq!(outcome.engine_calls, 0);
}

#[tokio::test]
async fn test_depth_zero_fails_when_predicate_does_not_hold() {
    let investigator =
        investigator_with(Box::new(UnreachableEngine), ScanPolicy::default()).await;

    let mut request = GoalRequest::new(Predicate::PieceOn {
        color: Side::Black,
        piece: PieceKind::Queen,
        square: "e4".to_string(),
    });
    request.policy.max_depth = 0;

    let outcome = investigator
        .investigate_target("4k3/8/8/8/4Q3/8/8/4K3 w - - 0 1", &request)
        .await
        .unwrap();

    assert_eq!(outcome.goal_status, GoalStatus::Failure);
    assert!(outcome.witness_line.is_empty());
}

/// Proposes castling moves first when asked for candidates.
struct CastleProposer;

#[async_trait]
impl Engine for CastleProposer {
    fn name(&self) -> &str {
        "castle-proposer"
    }
    async fn analyse(&mut self, request: &AnalysisRequest) -> EngineResult<Vec<EvaluationInfo>> {
        Ok(vec![
            eval(40, &["e1g1"]),
            eval(30, &["e1c1"]),
            eval(10, &["a1b1"]),
            eval(5, &["h1g1"]),
        ]
        .into_iter()
        .take(request.multipv)
        .collect())
    }
    async fn shutdown(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_castling_goal_yields_castle_witness() {
    let investigator = investigator_with(Box::new(CastleProposer), ScanPolicy::default()).await;

    let mut request = GoalRequest::new(Predicate::Or {
        any: vec![
            Predicate::Castles {
                color: Side::White,
                side: CastleSide::King,
            },
            Predicate::Castles {
                color: Side::White,
                side: CastleSide::Queen,
            },
        ],
    });
    request.policy.max_depth = 1;

    let outcome = investigator
        .investigate_target("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1", &request)
        .await
        .unwrap();

    assert_eq!(outcome.goal_status, GoalStatus::Success);
    assert_eq!(outcome.witness_line.len(), 1);
    assert!(
        outcome.witness_line[0] == "O-O" || outcome.witness_line[0] == "O-O-O",
        "witness was {:?}",
        outcome.witness_line
    );
}

#[tokio::test]
async fn test_top_k_collects_distinct_witnesses() {
    let investigator = investigator_with(Box::new(CastleProposer), ScanPolicy::default()).await;

    let mut request = GoalRequest::new(Predicate::Or {
        any: vec![
            Predicate::Castles {
                color: Side::White,
                side: CastleSide::King,
            },
            Predicate::Castles {
                color: Side::White,
                side: CastleSide::Queen,
            },
        ],
    });
    request.policy.max_depth = 1;
    request.policy.top_k_witnesses = 2;

    let outcome = investigator
        .investigate_target("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1", &request)
        .await
        .unwrap();

    assert_eq!(outcome.goal_status, GoalStatus::Success);
    assert_eq!(outcome.witnesses.len(), 2);
    assert!(outcome.witnesses.contains(&vec!["O-O".to_string()]));
    assert!(outcome.witnesses.contains(&vec!["O-O-O".to_string()]));
}

#[tokio::test]
async fn test_exhausted_goal_search_is_a_result_not_an_error() {
    let investigator = investigator_with(Box::new(CastleProposer), ScanPolicy::default()).await;

    // A black queen cannot appear on a1 in one ply from this position.
    let mut request = GoalRequest::new(Predicate::PieceOn {
        color: Side::Black,
        piece: PieceKind::Queen,
        square: "a1".to_string(),
    });
    request.policy.max_depth = 1;

    let outcome = investigator
        .investigate_target("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1", &request)
        .await
        .unwrap();

    assert_eq!(outcome.goal_status, GoalStatus::Failure);
    assert!(outcome.witness_line.is_empty());
    assert!(outcome.engine_calls >= 1);
}

#[tokio::test]
async fn test_goal_search_respects_engine_call_budget() {
    let investigator = investigator_with(Box::new(CastleProposer), ScanPolicy::default()).await;

    let mut request = GoalRequest::new(Predicate::PieceOn {
        color: Side::Black,
        piece: PieceKind::Queen,
        square: "a1".to_string(),
    });
    request.policy.max_depth = 6;
    request.stop.max_engine_calls = 2;

    let outcome = investigator
        .investigate_target("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1", &request)
        .await
        .unwrap();

    assert_eq!(outcome.goal_status, GoalStatus::Failure);
    assert!(outcome.engine_calls <= 2);
}

// ============================================================================
// Retry wrapper
// ============================================================================

/// Fails the first call with a transient error, then behaves.
struct FlakyEngine {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Engine for FlakyEngine {
    fn name(&self) -> &str {
        "flaky"
    }
    async fn analyse(&mut self, request: &AnalysisRequest) -> EngineResult<Vec<EvaluationInfo>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(EngineError::Unavailable {
                message: "warming up".to_string(),
                retries: 0,
            });
        }
        Ok(vec![eval(15, &["e2e4"])]
            .into_iter()
            .take(request.multipv)
            .collect())
    }
    async fn shutdown(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_retry_recovers_from_transient_failure_with_audit_trail() {
    let calls = Arc::new(AtomicUsize::new(0));
    let investigator = investigator_with(
        Box::new(FlakyEngine {
            calls: Arc::clone(&calls),
        }),
        ScanPolicy::default(),
    )
    .await;

    let mut request = GoalRequest::new(Predicate::MovePlayed {
        mv: "e2e4".to_string(),
    });
    request.policy.max_depth = 1;

    let (outcome, attempts) = investigator
        .retry_investigate_target(START_FEN, &request, 2)
        .await
        .unwrap();

    assert_eq!(outcome.goal_status, GoalStatus::Success);
    assert_eq!(outcome.witness_line, vec!["e2e4".to_string()]);
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].attempt, 1);
    assert!(attempts[0].outcome.starts_with("transient:"));
    assert_eq!(attempts[1].outcome, "success");
}

#[tokio::test]
async fn test_retry_does_not_mask_non_transient_failure() {
    struct BrokenEngine;

    #[async_trait]
    impl Engine for BrokenEngine {
        fn name(&self) -> &str {
            "broken"
        }
        async fn analyse(
            &mut self,
            _request: &AnalysisRequest,
        ) -> EngineResult<Vec<EvaluationInfo>> {
            Err(EngineError::Protocol {
                message: "garbage on stdout".to_string(),
            })
        }
        async fn shutdown(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    let investigator = investigator_with(Box::new(BrokenEngine), ScanPolicy::default()).await;
    let mut request = GoalRequest::new(Predicate::MovePlayed {
        mv: "e2e4".to_string(),
    });
    request.policy.max_depth = 1;

    let err = investigator
        .retry_investigate_target(START_FEN, &request, 3)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Engine(EngineError::Protocol { .. })
    ));
}

#[tokio::test]
async fn test_semantic_failure_is_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));

    struct CountingProposer {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Engine for CountingProposer {
        fn name(&self) -> &str {
            "counting"
        }
        async fn analyse(
            &mut self,
            request: &AnalysisRequest,
        ) -> EngineResult<Vec<EvaluationInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![eval(0, &["a2a3"])]
                .into_iter()
                .take(request.multipv)
                .collect())
        }
        async fn shutdown(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    let investigator = investigator_with(
        Box::new(CountingProposer {
            calls: Arc::clone(&calls),
        }),
        ScanPolicy::default(),
    )
    .await;

    let mut request = GoalRequest::new(Predicate::MovePlayed {
        mv: "h2h4".to_string(),
    });
    request.policy.max_depth = 1;
    request.policy.branching_limit = 1;

    let (outcome, attempts) = investigator
        .retry_investigate_target(START_FEN, &request, 3)
        .await
        .unwrap();

    // One attempt only: "no witness" is an answer, not a fault.
    assert_eq!(outcome.goal_status, GoalStatus::Failure);
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, "failure");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Scan timeout boundary
// ============================================================================

/// Never returns from an analysis call.
struct HangingEngine;

#[async_trait]
impl Engine for HangingEngine {
    fn name(&self) -> &str {
        "hanging"
    }
    async fn analyse(&mut self, _request: &AnalysisRequest) -> EngineResult<Vec<EvaluationInfo>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![eval(0, &["e2e4"])])
    }
    async fn shutdown(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_scan_times_out_with_structured_error() {
    let policy = ScanPolicy {
        timeout_seconds: 0.01,
        ..ScanPolicy::default()
    };
    let investigator = investigator_with(Box::new(HangingEngine), policy).await;

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        investigator.scan(START_FEN),
    )
    .await
    .expect("scan must return within bounded wall-clock time");

    match outcome {
        ScanOutcome::Error { error } => {
            assert_eq!(error, "scan timeout after 0.01s");
        }
        ScanOutcome::Completed(_) => panic!("hanging engine cannot complete a scan"),
    }
}

#[tokio::test]
async fn test_scan_rejects_malformed_position_without_engine_calls() {
    let investigator =
        investigator_with(Box::new(UnreachableEngine), ScanPolicy::default()).await;
    let outcome = investigator.scan("not a fen at all").await;
    match outcome {
        ScanOutcome::Error { error } => assert!(error.contains("Malformed position")),
        ScanOutcome::Completed(_) => panic!("malformed input must not scan"),
    }
}

// ============================================================================
// Dual-depth scan end to end
// ============================================================================

/// Scripted dual-depth engine: one overestimated candidate, one branch
/// that fails its deep verification.
struct DualDepthScript;

#[async_trait]
impl Engine for DualDepthScript {
    fn name(&self) -> &str {
        "dual-depth-script"
    }
    async fn analyse(&mut self, request: &AnalysisRequest) -> EngineResult<Vec<EvaluationInfo>> {
        match (request.depth, request.multipv) {
            (2, 4) => Ok(vec![
                eval(90, &["e2e4", "e7e5"]),
                eval(60, &["d2d4", "d7d5"]),
                eval(40, &["g1f3"]),
            ]),
            (16, 2) => Ok(vec![eval(35, &["e2e4", "e7e5", "g1f3"]), eval(30, &["g1f3"])]),
            (16, 1) => {
                if request.fen.contains("4P3") {
                    // After e2e4: shallow 90 vs deep -20, overestimated.
                    Ok(vec![eval(-20, &["d7d5", "e4d5"])])
                } else if request.fen.contains("3P4") {
                    // After d2d4: deep verification fails.
                    Err(EngineError::Timeout { timeout_ms: 10 })
                } else {
                    // After g1f3: within the margin.
                    Ok(vec![eval(10, &["d7d5"])])
                }
            }
            _ => Err(EngineError::Protocol {
                message: format!("unscripted request d{} m{}", request.depth, request.multipv),
            }),
        }
    }
    async fn shutdown(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_scan_tolerates_branch_failure_and_flags_overestimation() {
    let investigator = investigator_with(Box::new(DualDepthScript), ScanPolicy::default()).await;
    let outcome = investigator.scan(START_FEN).await;

    let result = match outcome {
        ScanOutcome::Completed(result) => result,
        ScanOutcome::Error { error } => panic!("scan failed: {}", error),
    };

    assert_eq!(result.fen, START_FEN);
    assert_eq!(result.best_move_deep, "e2e4");
    assert_eq!(result.eval_deep, 35);
    assert_eq!(result.second_best_move_deep.as_deref(), Some("g1f3"));

    // e2e4 collapsed beyond the margin; d2d4's failed verification keeps
    // it out of the overestimated list; g1f3 stayed within the margin.
    assert_eq!(result.overestimated_moves, vec!["e2e4".to_string()]);
    let failed_branch = result
        .exploration_tree
        .branches
        .iter()
        .find(|b| b.mv == "d2d4")
        .unwrap();
    assert!(failed_branch.deep_cp.is_none());
    assert!(!failed_branch.overestimated);

    let transcript = result.annotated_transcript.as_ref().unwrap();
    assert!(transcript.starts_with("1. e2e4 {+0.35}"));
    assert!(transcript.contains("alt d2d4: shallow +0.60, deep unavailable"));
}

#[tokio::test]
async fn test_scan_feeds_evidence_and_confidence() {
    let investigator = investigator_with(Box::new(DualDepthScript), ScanPolicy::default()).await;
    let result = investigator.investigate(START_FEN).await.unwrap();

    let bundle = reduce(&result);
    assert_eq!(bundle.primary.mv, "e2e4");
    assert_eq!(bundle.rejected.len(), 1);
    assert_eq!(bundle.rejected[0].mv, "e2e4");
    assert_eq!(bundle.threats, vec!["d7d5".to_string()]);
    assert!(bundle.summary.starts_with("Best move is e2e4 (+0.35)."));

    let mut inputs = ConfidenceInputs::from(&result);
    inputs.shallow_depth = Some(investigator.policy().shallow_depth);
    let signals = estimate(&inputs);
    // |35 - 90| / 120 away from perfect agreement.
    let stability = signals.eval_stability.unwrap();
    assert!((stability - (1.0 - 55.0 / 120.0)).abs() < 1e-9);
    // Depth 2 sweep: maximum horizon risk.
    assert!((signals.horizon.unwrap() - 1.0).abs() < 1e-9);
    let volatility = signals.volatility.unwrap();
    assert!((volatility - 5.0 / 80.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_investigate_with_goal_attaches_outcome() {
    let investigator = investigator_with(Box::new(CastleProposer), ScanPolicy::default()).await;

    let mut request = GoalRequest::new(Predicate::Castles {
        color: Side::White,
        side: CastleSide::King,
    });
    request.policy.max_depth = 1;

    // CastleProposer answers every scripted shape, including the scan's
    // deep and branch calls.
    let result = investigator
        .investigate_with_goal("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1", &request)
        .await
        .unwrap();

    let goal = result.goal.as_ref().unwrap();
    assert_eq!(goal.goal_status, GoalStatus::Success);
    assert_eq!(goal.witness_line, vec!["O-O".to_string()]);
}
