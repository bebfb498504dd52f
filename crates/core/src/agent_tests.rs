// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    idle      = { AgentPhase::Idle, false },
    executing = { AgentPhase::ExecutingTask, true },
    stopped   = { AgentPhase::Stopped, false },
)]
fn busy_only_while_executing(phase: AgentPhase, expected: bool) {
    assert_eq!(phase.is_busy(), expected);
}

#[test]
fn phase_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&AgentPhase::ExecutingTask).unwrap(),
        "\"executing_task\""
    );
}

#[test]
fn status_roundtrips() {
    let mut status = AgentStatus::idle("planner", "planning");
    status.iteration = 2;
    status.current_task_id = Some(TaskId::from_string("tsk-x"));
    status.process_pid = Some(4242);
    let json = serde_json::to_string(&status).unwrap();
    let back: AgentStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(back, status);
}
