//! Mode driver scenarios: single, parallel, chain and race over a scripted
//! runner, including agent resolution into invocations.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::{sleep, Duration};

use common::{err_result, ok_result, StubRunner};
use pi_swarm::agent::{resolve_inheritance, AgentConfig, AgentSource};
use pi_swarm::modes::{ModeOutcome, ModeRequest, Orchestrator, RaceVariant, TaskSpec};
use pi_swarm::team::{TeamConfig, TeamMember, TeamTask};

fn agent_def(name: &str, model: Option<&str>, extends: Option<&str>) -> AgentConfig {
    AgentConfig {
        name: name.to_string(),
        description: format!("{} agent", name),
        tools: Some(vec!["read".to_string()]),
        model: model.map(String::from),
        system_prompt: format!("You are {}.", name),
        thinking: None,
        source: AgentSource::Project,
        file_path: PathBuf::from(format!("{}.md", name)),
        extends: extends.map(String::from),
        resolved_tools: None,
        resolved_model: None,
        resolved_thinking: None,
    }
}

fn orchestrator(runner: Arc<StubRunner>, agents: Vec<AgentConfig>) -> Orchestrator {
    Orchestrator::new(runner, agents, ".")
}

#[tokio::test]
async fn single_mode_reports_result_and_exit_code() {
    let runner = StubRunner::always_ok();
    let orchestrator = orchestrator(runner, Vec::new());

    let outcome = orchestrator
        .dispatch(ModeRequest::Single {
            spec: TaskSpec::new("t1", "summarize the repo"),
        })
        .await
        .unwrap();

    let ModeOutcome::Single { result } = &outcome else {
        panic!("wrong outcome variant");
    };
    assert!(result.is_success());
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.summary().completed, 1);
}

#[tokio::test]
async fn single_mode_failure_yields_nonzero_exit() {
    let runner = StubRunner::new(|invocation, _| err_result(invocation, "agent blew up"));
    let orchestrator = orchestrator(runner, Vec::new());

    let outcome = orchestrator
        .dispatch(ModeRequest::Single {
            spec: TaskSpec::new("t1", "doomed task"),
        })
        .await
        .unwrap();

    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.summary().failed, 1);
}

#[tokio::test]
async fn agent_resolution_flows_into_invocations() {
    let agents = resolve_inheritance(vec![
        agent_def("base", Some("sonnet"), None),
        agent_def("coder", None, Some("base")),
    ])
    .unwrap();

    let runner = StubRunner::always_ok();
    let orchestrator = orchestrator(runner.clone(), agents);

    orchestrator
        .dispatch(ModeRequest::Single {
            spec: TaskSpec::new("t1", "write code").with_agent("coder"),
        })
        .await
        .unwrap();

    let invocation = &runner.invocations_for("t1")[0];
    assert_eq!(invocation.model.as_deref(), Some("sonnet"));
    assert_eq!(invocation.tools.as_deref().unwrap(), ["read"]);
    assert_eq!(invocation.system_prompt.as_deref(), Some("You are coder."));
}

#[tokio::test]
async fn unknown_agent_name_fails_before_running() {
    let runner = StubRunner::always_ok();
    let orchestrator = orchestrator(runner.clone(), Vec::new());

    let result = orchestrator
        .dispatch(ModeRequest::Single {
            spec: TaskSpec::new("t1", "task").with_agent("ghost"),
        })
        .await;

    assert!(result.is_err());
    assert_eq!(runner.total_calls(), 0);
}

#[tokio::test]
async fn parallel_mode_preserves_input_order() {
    let runner = StubRunner::new_async(|invocation, _| {
        Box::pin(async move {
            let delay = match invocation.id.as_str() {
                "t0" => 30,
                "t1" => 5,
                "t2" => 20,
                "t3" => 1,
                _ => 10,
            };
            sleep(Duration::from_millis(delay)).await;
            ok_result(&invocation, invocation.id.clone())
        })
    });
    let orchestrator = orchestrator(runner, Vec::new());

    let tasks: Vec<TaskSpec> = (0..5)
        .map(|i| TaskSpec::new(format!("t{}", i), format!("task {}", i)))
        .collect();
    let outcome = orchestrator
        .dispatch(ModeRequest::Parallel {
            tasks,
            concurrency: 4,
        })
        .await
        .unwrap();

    let ModeOutcome::Parallel { results, aborted } = &outcome else {
        panic!("wrong outcome variant");
    };
    assert!(!aborted);
    let outputs: Vec<&str> = results
        .iter()
        .map(|r| r.as_ref().unwrap().output.as_str())
        .collect();
    assert_eq!(outputs, ["t0", "t1", "t2", "t3", "t4"]);
    assert_eq!(outcome.summary().completed, 5);
}

#[tokio::test]
async fn parallel_mode_counts_failures_without_aborting() {
    let runner = StubRunner::new(|invocation, _| {
        if invocation.id == "t1" {
            err_result(invocation, "failed")
        } else {
            ok_result(invocation, "ok")
        }
    });
    let orchestrator = orchestrator(runner, Vec::new());

    let tasks: Vec<TaskSpec> = (0..3)
        .map(|i| TaskSpec::new(format!("t{}", i), "task"))
        .collect();
    let outcome = orchestrator
        .dispatch(ModeRequest::Parallel {
            tasks,
            concurrency: 2,
        })
        .await
        .unwrap();

    let summary = outcome.summary();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test]
async fn chain_substitutes_previous_output() {
    let runner = StubRunner::new(|invocation, _| {
        ok_result(invocation, format!("out-{}", invocation.id))
    });
    let orchestrator = orchestrator(runner.clone(), Vec::new());

    let outcome = orchestrator
        .dispatch(ModeRequest::Chain {
            steps: vec![
                TaskSpec::new("s1", "research the topic"),
                TaskSpec::new("s2", "summarize this: {previous}"),
                TaskSpec::new("s3", "write the final report"),
            ],
        })
        .await
        .unwrap();

    let ModeOutcome::Chain { results, aborted } = &outcome else {
        panic!("wrong outcome variant");
    };
    assert!(!aborted);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].step, Some(1));
    assert_eq!(results[2].step, Some(3));

    // Placeholder replaced for s2; s3 receives s2's output as context.
    let s2 = &runner.invocations_for("s2")[0];
    assert_eq!(s2.task, "summarize this: out-s1");
    let s3 = &runner.invocations_for("s3")[0];
    assert_eq!(s3.context.as_deref(), Some("out-s2"));
}

#[tokio::test]
async fn chain_stops_on_first_failure() {
    let runner = StubRunner::new(|invocation, _| {
        if invocation.id == "s2" {
            err_result(invocation, "step failed")
        } else {
            ok_result(invocation, "ok")
        }
    });
    let orchestrator = orchestrator(runner.clone(), Vec::new());

    let outcome = orchestrator
        .dispatch(ModeRequest::Chain {
            steps: vec![
                TaskSpec::new("s1", "one"),
                TaskSpec::new("s2", "two"),
                TaskSpec::new("s3", "three"),
            ],
        })
        .await
        .unwrap();

    let ModeOutcome::Chain { results, .. } = &outcome else {
        panic!("wrong outcome variant");
    };
    assert_eq!(results.len(), 2);
    assert_eq!(runner.call_count("s3"), 0);
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test]
async fn race_mode_first_success_wins() {
    let runner = StubRunner::new_async(|invocation, _| {
        Box::pin(async move {
            if invocation.id == "fast" {
                sleep(Duration::from_millis(10)).await;
                ok_result(&invocation, "fast answer")
            } else {
                tokio::select! {
                    _ = sleep(Duration::from_millis(500)) => ok_result(&invocation, "slow answer"),
                    _ = invocation.cancel.cancelled() => common::aborted_result(&invocation),
                }
            }
        })
    });
    let orchestrator = orchestrator(runner.clone(), Vec::new());

    let outcome = orchestrator
        .dispatch(ModeRequest::Race {
            task: "answer the question".to_string(),
            variants: vec![
                RaceVariant {
                    id: "fast".to_string(),
                    ..Default::default()
                },
                RaceVariant {
                    id: "slow".to_string(),
                    ..Default::default()
                },
            ],
        })
        .await
        .unwrap();

    let ModeOutcome::Race { winner, result, aborted } = &outcome else {
        panic!("wrong outcome variant");
    };
    assert!(!aborted);
    assert_eq!(winner.as_deref(), Some("fast"));
    assert_eq!(result.as_ref().unwrap().output, "fast answer");
    assert_eq!(runner.total_calls(), 2);
}

#[tokio::test]
async fn team_mode_dispatches_through_engine() {
    let runner = StubRunner::always_ok();
    let orchestrator = orchestrator(runner, Vec::new());

    let mut config = TeamConfig::new("docs-team", "write the docs", ".");
    config.members = vec![TeamMember {
        role: "writer".to_string(),
        ..Default::default()
    }];
    config.tasks = vec![
        TeamTask::new("outline", "outline the docs", "writer"),
        TeamTask::new("draft", "draft the docs", "writer").depends_on(["outline"]),
    ];

    let outcome = orchestrator
        .dispatch(ModeRequest::Team(Box::new(config)))
        .await
        .unwrap();

    let ModeOutcome::Team(report) = &outcome else {
        panic!("wrong outcome variant");
    };
    assert_eq!(report.completed_count(), 2);
    assert_eq!(outcome.exit_code(), 0);
}
