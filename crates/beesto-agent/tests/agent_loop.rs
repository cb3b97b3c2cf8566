//! End-to-end agent runs against a scripted endpoint and an in-memory sandbox.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use std::sync::Arc;

use beesto_agent::{AgentOrchestrator, AgentStore, WorkspaceApplier};
use beesto_core::{
    AgentChannel, AgentEvent, AgentState, ChatTranscript, Phase, PhaseEndpoint, StepStatus,
};
use beesto_editor::{EditorStore, FileTreeStore};
use beesto_providers::{Reply, ScriptedEndpoint};
use beesto_sandbox::{MemoryBackend, Sandbox, SandboxBackend, starter_template};

const PLAN: &str = r#"Here is the plan:
{"steps": [
  {"id": "hero", "title": "Add hero component", "description": "Create Hero.tsx"},
  {"id": "page", "title": "Use hero on home page", "description": "Update page.tsx"}
]}"#;

const HERO_STEP: &str = "Creating the component.\n\
```filename:src/components/Hero.tsx\n\
export function Hero() {\n  return <h1>Beesto</h1>;\n}\n\
```\n";

struct Workspace {
    backend: Arc<MemoryBackend>,
    tree: Arc<FileTreeStore>,
    applier: Arc<WorkspaceApplier>,
}

async fn workspace() -> Workspace {
    let backend = Arc::new(MemoryBackend::new());
    let sandbox = Arc::new(Sandbox::new(Arc::clone(&backend) as Arc<dyn SandboxBackend>));
    sandbox.mount(&starter_template()).await.unwrap();
    let editor = Arc::new(EditorStore::new(Arc::clone(&sandbox)));
    let tree = Arc::new(FileTreeStore::new(Arc::clone(&sandbox)));
    let applier = Arc::new(WorkspaceApplier::new(sandbox, editor, Arc::clone(&tree)));
    Workspace {
        backend,
        tree,
        applier,
    }
}

fn orchestrator(workspace: &Workspace, endpoint: &Arc<ScriptedEndpoint>) -> AgentOrchestrator {
    AgentOrchestrator::new(
        Arc::clone(endpoint) as Arc<dyn PhaseEndpoint>,
        Arc::new(AgentStore::new()),
        Arc::clone(&workspace.applier),
        Arc::new(ChatTranscript::new()),
    )
}

#[tokio::test]
async fn failing_step_is_isolated_and_run_completes() {
    let workspace = workspace().await;
    let endpoint = Arc::new(
        ScriptedEndpoint::new()
            .with_phase(Phase::Analyze, Reply::fragments(["{\"intent\": ", "\"add hero\"}"]))
            .with_phase(Phase::Plan, Reply::text(PLAN))
            .with_step("hero", Reply::text(HERO_STEP))
            .with_step("page", Reply::status(502))
            .with_phase(Phase::Report, Reply::text(r#"{"summary": "Hero added"}"#)),
    );
    let orchestrator = orchestrator(&workspace, &endpoint);

    let state = orchestrator.run("Add a hero section").await;

    assert_eq!(state, AgentState::Completed);
    let snapshot = orchestrator.store().snapshot();
    assert!(!snapshot.is_processing);
    assert_eq!(
        snapshot
            .logs
            .iter()
            .filter(|line| line.starts_with("Error executing step"))
            .count(),
        1
    );
    assert!(snapshot
        .logs
        .contains(&"Error executing step: Use hero on home page".to_owned()));
    assert_eq!(snapshot.logs.last().map(String::as_str), Some("Agent loop completed"));

    let statuses: Vec<_> = snapshot.plan.iter().map(|step| step.status).collect();
    assert_eq!(statuses, [StepStatus::Completed, StepStatus::Failed]);
    assert_eq!(snapshot.plan[1].logs, ["Execution failed: 502 Bad Gateway"]);
    assert!(snapshot.report.unwrap().contains("\"summary\": \"Hero added\""));

    assert!(workspace
        .backend
        .file("src/components/Hero.tsx")
        .unwrap()
        .contains("<h1>Beesto</h1>"));
    assert!(workspace.tree.find_node("/src/components/Hero.tsx").is_some());

    assert_eq!(
        endpoint.phases_called(),
        [
            Phase::Analyze,
            Phase::Plan,
            Phase::Execute,
            Phase::Execute,
            Phase::Report
        ]
    );
    let analyze = &endpoint.call_history()[0];
    assert!(analyze
        .context
        .as_ref()
        .unwrap()
        .file_structure
        .contains(&"/src/app/page.tsx".to_owned()));
    assert!(endpoint.call_history()[1].analysis.is_some());
}

#[tokio::test]
async fn planning_failure_fails_run() {
    let workspace = workspace().await;
    let endpoint = Arc::new(
        ScriptedEndpoint::new()
            .with_phase(Phase::Analyze, Reply::text("{}"))
            .with_phase(Phase::Plan, Reply::stream_error("model overloaded")),
    );
    let orchestrator = orchestrator(&workspace, &endpoint);

    assert_eq!(orchestrator.run("anything").await, AgentState::Failed);
    let logs = orchestrator.store().logs();
    assert_eq!(
        logs.last().map(String::as_str),
        Some("Error: Stream error: model overloaded")
    );
    assert!(!orchestrator.store().is_processing());
}

#[tokio::test]
async fn rollback_resets_after_a_run() {
    let workspace = workspace().await;
    let endpoint = Arc::new(
        ScriptedEndpoint::new()
            .with_phase(Phase::Analyze, Reply::text("{}"))
            .with_phase(Phase::Plan, Reply::text(PLAN))
            .with_phase(Phase::Execute, Reply::text("no changes"))
            .with_phase(Phase::Report, Reply::text("done")),
    );
    let orchestrator = orchestrator(&workspace, &endpoint);
    orchestrator.run("anything").await;

    orchestrator.rollback();

    let snapshot = orchestrator.store().snapshot();
    assert_eq!(snapshot.state, AgentState::Idle);
    assert!(snapshot.plan.is_empty());
    assert!(snapshot.report.is_none());
    assert!(snapshot.current_step_id.is_none());
    assert_eq!(snapshot.logs, ["Rolled back agent changes"]);
}

#[tokio::test]
async fn rollback_cancels_run_in_flight() {
    let workspace = workspace().await;
    let endpoint = Arc::new(
        ScriptedEndpoint::new()
            .with_phase(Phase::Analyze, Reply::text("{}"))
            .with_phase(Phase::Plan, Reply::Pending),
    );
    let (channel, mut events) = AgentChannel::new();
    let orchestrator = Arc::new(orchestrator(&workspace, &endpoint).with_channel(channel));

    let run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.run("anything").await }
    });
    while let Some(event) = events.recv().await {
        if event
            == (AgentEvent::StateChanged {
                from: AgentState::Analyzing,
                to: AgentState::Planning,
            })
        {
            break;
        }
    }

    orchestrator.rollback();
    let state = run.await.unwrap();

    assert_eq!(state, AgentState::Idle);
    let snapshot = orchestrator.store().snapshot();
    assert_eq!(snapshot.state, AgentState::Idle);
    assert!(!snapshot.is_processing);
    assert_eq!(snapshot.logs, ["Rolled back agent changes"]);
    assert_eq!(endpoint.phases_called(), [Phase::Analyze, Phase::Plan]);
}

#[tokio::test]
async fn repeated_step_ids_track_each_step() {
    let workspace = workspace().await;
    let endpoint = Arc::new(
        ScriptedEndpoint::new()
            .with_phase(Phase::Analyze, Reply::text("{}"))
            .with_phase(
                Phase::Plan,
                Reply::text(r#"{"steps": [{"id": 1, "title": "A"}, {"id": 1, "title": "B"}]}"#),
            )
            .with_phase(Phase::Execute, Reply::status(500))
            .with_phase(Phase::Report, Reply::text("done")),
    );
    let orchestrator = orchestrator(&workspace, &endpoint);

    assert_eq!(orchestrator.run("anything").await, AgentState::Completed);

    let plan = orchestrator.store().plan();
    let ids: Vec<_> = plan.iter().map(|step| step.id.as_str()).collect();
    assert_eq!(ids, ["1", "step-2"]);
    for step in &plan {
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.logs, ["Execution failed: 500 Internal Server Error"]);
    }
    let executed: Vec<_> = endpoint
        .call_history()
        .iter()
        .filter_map(|request| request.step.as_ref().map(|step| step.title.clone()))
        .collect();
    assert_eq!(executed, ["A", "B"]);
}
