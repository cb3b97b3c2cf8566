//! Command handlers for CLI operations

use std::fs::OpenOptions;
use std::io::{self, Write as _};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::fs as async_fs;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use beesto_agent::{AgentOrchestrator, AgentStore, WorkspaceApplier};
use beesto_core::config::WorkspaceConfig;
use beesto_core::{AgentChannel, AgentConfig, AgentEvent, AgentState, ChatTranscript};
use beesto_editor::{EditorStore, FileTreeStore};
use beesto_providers::HttpPhaseEndpoint;
use beesto_sandbox::{LocalBackend, Sandbox, starter_template};

use crate::utils::{get_beesto_folder, with_state_dir_skipped, write_tree};

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str =
    "beesto=info,beesto_agent=info,beesto_editor=info,beesto_sandbox=info,beesto_providers=info";

/// Routes all tracing output to `<project>/.beesto/debug.log`, replacing the old log.
///
/// # Errors
/// Returns an error if the log directory or file cannot be created
pub async fn init_logging(project: &Path) -> Result<()> {
    let beesto_dir = get_beesto_folder(project);
    async_fs::create_dir_all(&beesto_dir).await?;

    let debug_log = beesto_dir.join("debug.log");
    if async_fs::try_exists(&debug_log).await.unwrap_or(false) {
        async_fs::remove_file(&debug_log).await?;
    }

    // Open log file synchronously for tracing writer (needs sync File)
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&debug_log)?;

    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(
            fmt::layer()
                .with_writer(Arc::new(log_file))
                .with_ansi(false)
                .with_target(true)
                .with_level(true),
        )
        .init();
    Ok(())
}

fn open_sandbox(project: &Path) -> Arc<Sandbox> {
    Arc::new(Sandbox::new(Arc::new(LocalBackend::new(project))))
}

/// Write the starter template into the project, optionally installing dependencies
///
/// # Errors
/// Returns an error if the template cannot be written or `npm install` fails
pub async fn handle_init(project: &Path, install: bool) -> Result<()> {
    let sandbox = open_sandbox(project);
    sandbox.mount(&starter_template()).await?;
    writeln!(io::stdout(), "Created starter project in {}", project.display())?;

    if install {
        let installed = sandbox.install_dependencies().await?;
        let mut stdout = io::stdout().lock();
        for entry in sandbox.console().entries() {
            writeln!(stdout, "{}", entry.message)?;
        }
        if !installed {
            bail!("npm install failed");
        }
    }
    Ok(())
}

/// Print the project tree, optionally filtered by name
///
/// # Errors
/// Returns an error if the listing cannot be written
pub async fn handle_tree(project: &Path, search: Option<String>) -> Result<()> {
    let config = with_state_dir_skipped(WorkspaceConfig::default());
    let tree = FileTreeStore::from_config(open_sandbox(project), &config);
    tree.refresh_tree().await;
    if let Some(term) = search {
        tree.set_search_term(term);
    }

    write_tree(&mut io::stdout().lock(), &tree.filtered_nodes(), 0)?;
    Ok(())
}

fn print_event(event: &AgentEvent) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    match event {
        AgentEvent::StateChanged { to, .. } => writeln!(stdout, "[{to}]"),
        AgentEvent::Log(line) => writeln!(stdout, "  {line}"),
        AgentEvent::StepStatus { step_id, status } => {
            writeln!(stdout, "  step {step_id}: {status:?}")
        }
        AgentEvent::Fragment { .. } => Ok(()),
    }
}

/// Run the agent loop for one request against the configured endpoint
///
/// # Errors
/// Returns an error if the endpoint client cannot be built or the run fails
pub async fn handle_run(project: &Path, request: &str, endpoint: Option<String>) -> Result<()> {
    // Load or create configuration from ~/.beesto/config.toml
    let mut config = AgentConfig::load_or_create().unwrap_or_else(|error| {
        warn!("Failed to load config from ~/.beesto/config.toml: {error}");
        warn!("Using default configuration");
        AgentConfig::default().with_env_overrides()
    });
    if let Some(url) = endpoint {
        config.endpoint.url = url;
    }
    info!("Using phase endpoint {}", config.endpoint.url);

    let sandbox = open_sandbox(project);
    let editor = Arc::new(EditorStore::new(Arc::clone(&sandbox)));
    let tree = Arc::new(FileTreeStore::from_config(
        Arc::clone(&sandbox),
        &with_state_dir_skipped(config.workspace.clone()),
    ));
    let applier = Arc::new(WorkspaceApplier::new(sandbox, editor, tree));

    let (channel, mut events) = AgentChannel::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Err(error) = print_event(&event) {
                warn!("Failed to print agent event: {error}");
                break;
            }
        }
    });

    let orchestrator = AgentOrchestrator::new(
        Arc::new(HttpPhaseEndpoint::from_config(&config.endpoint)?),
        Arc::new(AgentStore::new()),
        applier,
        Arc::new(ChatTranscript::new()),
    )
    .with_channel(channel);

    let state = orchestrator.run(request).await;
    let report = orchestrator.store().report();
    // Closes the event channel so the printer drains and exits
    drop(orchestrator);
    printer.await?;

    if let Some(report) = report {
        writeln!(io::stdout(), "\n{report}")?;
    }
    if state == AgentState::Failed {
        bail!("Agent run failed; see {}", get_beesto_folder(project).join("debug.log").display());
    }
    Ok(())
}
