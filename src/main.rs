//! lexigen - an LLM-driven glossary builder for text corpora.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use lexigen::api::{self, AppState};
use lexigen::cli::{Cli, Command, ProjectCommand};
use lexigen::config::Config;
use lexigen::error::{LexigenError, Result};
use lexigen::llm::{create_client_for_project, DebugSink};
use lexigen::logging;
use lexigen::model::{RunScope, RunStatus};
use lexigen::persistence::{projects, CatalogDb, ProjectDb};
use lexigen::pipeline::RunEvent;
use lexigen::run::RunManager;

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    logging::init_stderr_logging();

    let cli = Cli::parse_args();
    match run(cli).await {
        Ok(code) => {
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(e) => {
            error!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config_path = cli.config_path();
    let mut config = Config::load_from_file(&config_path)?;
    if let Some(root) = &cli.projects_root {
        config.projects_root = Some(root.clone());
    }

    match cli.command {
        Command::Serve { addr } => serve(&config, addr).await,
        Command::Run {
            project,
            scope,
            doc_root,
        } => run_pipeline(&config, &project, &scope, doc_root).await,
        Command::Project { command } => project_command(&config, command).await,
    }
}

/// Starts the HTTP API server.
async fn serve(config: &Config, addr_override: Option<String>) -> Result<i32> {
    let addr = addr_override.unwrap_or_else(|| config.server.addr.clone());
    let state = AppState::new(config).await?;
    let router = api::router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LexigenError::config(format!("Failed to bind {addr}: {e}")))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, router)
        .await
        .map_err(|e| LexigenError::internal(format!("Server error: {e}")))?;
    Ok(0)
}

/// Runs the pipeline for a project and waits for the terminal state.
///
/// Exit codes: 0 completed, 1 failed, 2 cancelled.
async fn run_pipeline(
    config: &Config,
    project_name: &str,
    scope: &str,
    doc_root_override: Option<PathBuf>,
) -> Result<i32> {
    let scope = RunScope::from_str(scope).map_err(LexigenError::validation)?;

    let projects_root = config.resolve_projects_root();
    let catalog = CatalogDb::open(&projects_root).await?;
    let mut conn = catalog
        .pool()
        .acquire()
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to acquire catalog: {e}")))?;
    let project = projects::get_project_by_name(&mut conn, project_name)
        .await?
        .ok_or_else(|| LexigenError::not_found(format!("project '{project_name}'")))?;
    drop(conn);

    let db = ProjectDb::open(&projects_root.join(&project.name)).await?;
    let debug = DebugSink::for_db_path(Some(db.path()));
    let llm = create_client_for_project(&project, debug.clone())?;
    if !llm.is_available().await {
        warn!("LLM service is not reachable; the run will likely fail");
    }

    let doc_root = doc_root_override
        .or_else(|| (!project.doc_root.is_empty()).then(|| PathBuf::from(&project.doc_root)));

    let manager = RunManager::new(
        project.id,
        db,
        llm,
        debug,
        doc_root,
        Duration::from_secs(config.llm.timeout_secs),
    );
    let run_id = manager.start_run(scope, "cli", None).await?;
    info!("Run {run_id} started (scope={scope})");

    // Ctrl-C requests cooperative cancellation; the run finalizes cleanly
    let cancel_manager = manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run {run_id}");
            let _ = cancel_manager.cancel_run(run_id).await;
        }
    });

    stream_logs(&manager, run_id).await;

    let status = manager.wait_for_terminal(run_id).await?;
    info!("Run {run_id} finished: {status}");

    Ok(match status {
        RunStatus::Completed => 0,
        RunStatus::Cancelled => 2,
        _ => 1,
    })
}

/// Prints a run's log stream until the terminal sentinel.
async fn stream_logs(manager: &Arc<RunManager>, run_id: i64) {
    let Some(mut subscription) = manager.subscribe_logs(run_id) else {
        return;
    };

    let print = |event: &RunEvent| -> bool {
        match event {
            RunEvent::Log(log) => {
                println!("[{:?}] {}", log.level, log.message);
                false
            }
            RunEvent::Complete { .. } => true,
        }
    };

    for event in &subscription.snapshot {
        if print(event) {
            return;
        }
    }
    loop {
        match subscription.receiver.recv().await {
            Ok(event) => {
                if print(&event) {
                    return;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Handles `lexigen project ...` subcommands.
async fn project_command(config: &Config, command: ProjectCommand) -> Result<i32> {
    let projects_root = config.resolve_projects_root();
    let catalog = CatalogDb::open(&projects_root).await?;
    let mut conn = catalog
        .pool()
        .acquire()
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to acquire catalog: {e}")))?;

    match command {
        ProjectCommand::Add {
            name,
            doc_root,
            provider,
            model,
            base_url,
        } => {
            let project = projects::create_project(
                &mut conn, &name, &doc_root, &provider, &model, &base_url,
            )
            .await?;
            println!("Created project '{}' (id {})", project.name, project.id);
        }
        ProjectCommand::List => {
            let all = projects::list_projects(&mut conn).await?;
            if all.is_empty() {
                println!("No projects registered");
            }
            for project in all {
                println!(
                    "{:>4}  {}  provider={} model={}",
                    project.id, project.name, project.llm_provider, project.llm_model
                );
            }
        }
    }

    Ok(0)
}
