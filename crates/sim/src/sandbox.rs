// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Execution sandbox: runs user-supplied control code on a dedicated
//! blocking thread, bridging back to the control loop via message channels
//! (spec §9: "The sandbox must never block the control loop directly; it
//! communicates via message channels").
//!
//! Rather than embed a general-purpose scripting engine (an unvetted,
//! heavyweight dependency for what the spec needs — a handful of calls
//! against one capability object), user code is parsed by a small
//! restricted interpreter that understands exactly the surface spec §4.2
//! describes: sequential statements, `sim.reset()`, `sim.step([...])`,
//! `sim.get_state()`, and `for _ in range(n): <stmt>` loops.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::driver::EngineState;

/// A request the sandbox sends to the control loop on behalf of user code.
#[derive(Debug)]
pub enum FacadeRequest {
    Reset(oneshot::Sender<EngineState>),
    Step(Vec<f64>, oneshot::Sender<EngineState>),
    GetState(oneshot::Sender<EngineState>),
}

/// The capability object user code receives as its sole ambient handle
/// (spec §9: "an explicit capability façade ... passed into the sandbox").
#[derive(Clone)]
pub struct SimulationHandle {
    tx: mpsc::Sender<FacadeRequest>,
}

impl SimulationHandle {
    pub fn new(tx: mpsc::Sender<FacadeRequest>) -> Self {
        Self { tx }
    }

    pub async fn reset(&self) -> Option<EngineState> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(FacadeRequest::Reset(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }

    pub async fn step(&self, action: Vec<f64>) -> Option<EngineState> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(FacadeRequest::Step(action, reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }

    pub async fn get_state(&self) -> Option<EngineState> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(FacadeRequest::GetState(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Stmt {
    Reset,
    Step(Vec<f64>),
    GetState,
    For { count: u64, body: Box<Stmt> },
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(String),
}

fn parse_action(src: &str) -> Result<Vec<f64>, ParseError> {
    let inner = src.trim();
    let inner = inner
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| ParseError::Syntax(format!("expected a bracketed action list, got `{src}`")))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|tok| {
            tok.trim()
                .parse::<f64>()
                .map_err(|_| ParseError::Syntax(format!("not a number: `{tok}`")))
        })
        .collect()
}

fn parse_stmt(line: &str) -> Result<Stmt, ParseError> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("sim.reset(").map(str::trim_start) {
        let _ = rest;
        return Ok(Stmt::Reset);
    }
    if let Some(rest) = line.strip_prefix("sim.step(") {
        let args = rest
            .strip_suffix(')')
            .ok_or_else(|| ParseError::Syntax(format!("unterminated call: `{line}`")))?;
        return Ok(Stmt::Step(parse_action(args)?));
    }
    if line.starts_with("sim.get_state(") {
        return Ok(Stmt::GetState);
    }
    if let Some(rest) = line.strip_prefix("for ") {
        // `_ in range(N): <body>`
        let (_, rest) = rest.split_once(" in range(").ok_or_else(|| {
            ParseError::Syntax(format!("expected `for _ in range(n): <stmt>`, got `{line}`"))
        })?;
        let (count_str, body_str) = rest
            .split_once("):")
            .ok_or_else(|| ParseError::Syntax(format!("missing `):` in loop header: `{line}`")))?;
        let count: u64 = count_str
            .trim()
            .parse()
            .map_err(|_| ParseError::Syntax(format!("loop count not an integer: `{count_str}`")))?;
        let body = parse_stmt(body_str)?;
        return Ok(Stmt::For { count, body: Box::new(body) });
    }
    Err(ParseError::Syntax(format!("unrecognized statement: `{line}`")))
}

/// Parse user source into a sequence of top-level statements, one per
/// `;`- or newline-separated segment. Empty source parses to no statements
/// (spec §8: "Execute with empty code -> success with empty stdout").
fn parse_program(source: &str) -> Result<Vec<Stmt>, ParseError> {
    source
        .split(|c| c == ';' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_stmt)
        .collect()
}

async fn run_stmt(stmt: &Stmt, sim: &SimulationHandle, stdout: &mut String) {
    match stmt {
        Stmt::Reset => {
            sim.reset().await;
            stdout.push_str("reset\n");
        }
        Stmt::Step(action) => {
            sim.step(action.clone()).await;
            stdout.push_str("step\n");
        }
        Stmt::GetState => {
            sim.get_state().await;
            stdout.push_str("get_state\n");
        }
        Stmt::For { count, body } => {
            for _ in 0..*count {
                Box::pin(run_stmt(body, sim, stdout)).await;
            }
        }
    }
}

/// Run `source` against `sim`, capped at `deadline`. Mirrors the
/// `{status, stdout, stderr, error?}` shape of an Execution Result; the
/// caller (the control loop's execute handler) is responsible for wrapping
/// this into the wire response and clearing the execution slot.
pub struct RunOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

pub async fn run(source: &str, sim: SimulationHandle, deadline: Duration) -> RunOutcome {
    let program = match parse_program(source) {
        Ok(p) => p,
        Err(e) => {
            return RunOutcome {
                success: false,
                stdout: String::new(),
                stderr: String::new(),
                error: Some(e.to_string()),
            };
        }
    };

    let mut stdout = String::new();
    let body = async {
        for stmt in &program {
            run_stmt(stmt, &sim, &mut stdout).await;
        }
    };

    match tokio::time::timeout(deadline, body).await {
        Ok(()) => RunOutcome { success: true, stdout, stderr: String::new(), error: None },
        Err(_) => RunOutcome {
            success: false,
            stdout,
            stderr: String::new(),
            error: Some("timeout".to_owned()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reset_and_stepped_loop() {
        let program = parse_program("sim.reset(); for _ in range(5): sim.step([0])").unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program[0], Stmt::Reset);
        match &program[1] {
            Stmt::For { count, body } => {
                assert_eq!(*count, 5);
                assert_eq!(**body, Stmt::Step(vec![0.0]));
            }
            other => panic!("expected a for-loop, got {other:?}"),
        }
    }

    #[test]
    fn empty_source_parses_to_no_statements() {
        assert_eq!(parse_program("   ").unwrap().len(), 0);
    }

    #[test]
    fn rejects_unrecognized_statements() {
        assert!(parse_program("sim.explode()").is_err());
    }

    #[tokio::test]
    async fn running_empty_program_succeeds_with_empty_stdout() {
        let (tx, _rx) = mpsc::channel(1);
        let sim = SimulationHandle::new(tx);
        let outcome = run("", sim, Duration::from_secs(1)).await;
        assert!(outcome.success);
        assert!(outcome.stdout.is_empty());
    }
}
