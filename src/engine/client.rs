//! UCI engine subprocess client.
//!
//! Wraps one engine process behind the [`Engine`] capability:
//! - spawn + `uci`/`isready` handshake
//! - `analyse(position, depth, multipv)` with score normalization
//! - deadline enforcement per call
//! - `quit` with kill fallback on shutdown

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::types::{AnalysisRequest, EvaluationInfo, RawScore};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Position-evaluation capability. Implemented by [`UciEngine`] and by
/// scripted stand-ins in tests. Exactly one caller may drive an instance
/// at a time; serialization across callers is the queue's job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Engine: Send {
    /// Stable identifier for diagnostics.
    fn name(&self) -> &str;

    /// Evaluate a position, returning one record per principal variation,
    /// ordered best-first. Scores are white-POV clamped centipawns.
    async fn analyse(&mut self, request: &AnalysisRequest) -> EngineResult<Vec<EvaluationInfo>>;

    /// Terminate the underlying process or resource.
    async fn shutdown(&mut self) -> EngineResult<()>;
}

/// A UCI engine subprocess.
pub struct UciEngine {
    name: String,
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    call_timeout: Duration,
    configured_multipv: usize,
}

impl UciEngine {
    /// Spawn the engine binary and complete the UCI handshake.
    pub async fn spawn(config: &EngineConfig, instance: usize) -> EngineResult<Self> {
        let name = format!("uci-{}", instance);
        let mut child = Command::new(&config.binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Unavailable {
                message: format!("failed to spawn {}: {}", config.binary.display(), e),
                retries: 0,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| EngineError::Protocol {
            message: "engine stdin not captured".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| EngineError::Protocol {
            message: "engine stdout not captured".to_string(),
        })?;

        let mut engine = Self {
            name,
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            configured_multipv: 1,
        };

        engine.send("uci").await?;
        engine.read_until("uciok").await?;
        engine.send("isready").await?;
        engine.read_until("readyok").await?;

        info!(engine = %engine.name, binary = %config.binary.display(), "Engine ready");
        Ok(engine)
    }

    async fn send(&mut self, command: &str) -> EngineResult<()> {
        debug!(engine = %self.name, command = %command, "-> engine");
        self.stdin.write_all(command.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn next_line(&mut self) -> EngineResult<String> {
        match self.lines.next_line().await? {
            Some(line) => Ok(line),
            None => Err(EngineError::ProcessDied {
                message: "stdout closed".to_string(),
            }),
        }
    }

    async fn read_until(&mut self, marker: &str) -> EngineResult<()> {
        let deadline = self.call_timeout;
        let wait = async {
            loop {
                let line = self.next_line().await?;
                if line.trim() == marker {
                    return Ok(());
                }
            }
        };
        tokio::time::timeout(deadline, wait)
            .await
            .map_err(|_| EngineError::Timeout {
                timeout_ms: deadline.as_millis() as u64,
            })?
    }

    async fn run_search(
        &mut self,
        request: &AnalysisRequest,
        white_to_move: bool,
    ) -> EngineResult<Vec<EvaluationInfo>> {
        if request.multipv != self.configured_multipv {
            self.send(&format!("setoption name MultiPV value {}", request.multipv))
                .await?;
            self.configured_multipv = request.multipv;
        }
        self.send(&format!("position fen {}", request.fen)).await?;
        self.send(&format!("go depth {}", request.depth)).await?;

        let mut slots: Vec<Option<EvaluationInfo>> = vec![None; request.multipv];
        loop {
            let line = self.next_line().await?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.first() {
                Some(&"info") => {
                    if let Some((slot, score, pv)) = parse_info(&tokens) {
                        if slot < slots.len() {
                            slots[slot] =
                                Some(EvaluationInfo::new(score.to_white_cp(white_to_move), pv));
                        }
                    }
                }
                Some(&"bestmove") => break,
                _ => {}
            }
        }

        let evals: Vec<EvaluationInfo> = slots.into_iter().flatten().collect();
        if evals.is_empty() {
            return Err(EngineError::Protocol {
                message: format!("no evaluation lines before bestmove for {}", request.fen),
            });
        }
        Ok(evals)
    }
}

#[async_trait]
impl Engine for UciEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyse(&mut self, request: &AnalysisRequest) -> EngineResult<Vec<EvaluationInfo>> {
        // The engine reports scores relative to the side to move.
        let white_to_move = request.fen.split_whitespace().nth(1) != Some("b");

        let start = Instant::now();
        let deadline = self.call_timeout;
        let result = tokio::time::timeout(deadline, self.run_search(request, white_to_move))
            .await
            .map_err(|_| EngineError::Timeout {
                timeout_ms: deadline.as_millis() as u64,
            })?;

        match &result {
            Ok(evals) => debug!(
                engine = %self.name,
                depth = request.depth,
                multipv = request.multipv,
                lines = evals.len(),
                latency_ms = start.elapsed().as_millis() as u64,
                "Analysis complete"
            ),
            Err(e) => warn!(
                engine = %self.name,
                error = %e,
                latency_ms = start.elapsed().as_millis() as u64,
                "Analysis failed"
            ),
        }
        result
    }

    async fn shutdown(&mut self) -> EngineResult<()> {
        let _ = self.send("quit").await;
        match tokio::time::timeout(Duration::from_secs(1), self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(engine = %self.name, status = %status, "Engine exited");
                Ok(())
            }
            _ => {
                warn!(engine = %self.name, "Engine did not quit, killing");
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}

/// Parse one `info` line into (multipv slot, raw score, pv). Lines without
/// a score or pv (currmove chatter, string payloads) yield `None`.
fn parse_info(tokens: &[&str]) -> Option<(usize, RawScore, Vec<String>)> {
    let mut multipv = 1usize;
    let mut score = None;
    let mut pv = Vec::new();

    let mut i = 1;
    while i < tokens.len() {
        match tokens[i] {
            "multipv" => {
                multipv = tokens.get(i + 1)?.parse().ok()?;
                i += 2;
            }
            "score" => {
                let kind = *tokens.get(i + 1)?;
                let value: i32 = tokens.get(i + 2)?.parse().ok()?;
                score = Some(match kind {
                    "cp" => RawScore::Cp(value),
                    "mate" => RawScore::Mate(value),
                    _ => return None,
                });
                i += 3;
            }
            "pv" => {
                pv = tokens[i + 1..].iter().map(|s| s.to_string()).collect();
                break;
            }
            "string" => return None,
            _ => i += 1,
        }
    }

    let score = score?;
    if pv.is_empty() {
        return None;
    }
    Some((multipv.saturating_sub(1), score, pv))
}
