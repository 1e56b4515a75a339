//! External subprocess engines
//!
//! Runs one crawler subprocess under a wall-clock budget, captures its
//! output for logging, and converts the artifact it leaves behind into the
//! canonical tree. The contract with the binaries: exit code 0 means the
//! artifact is readable and adaptable; anything else is a slot failure.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

use crate::adapters::{self, AdapterError, OsintStats};
use crate::config::EnginesConfig;
use crate::tree::Node;

/// Why an external engine run failed. All of these are fatal for the slot.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("engine exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("engine timed out after {0:?}")]
    Timeout(Duration),
    #[error("engine cancelled")]
    Cancelled,
    #[error("artifact not readable at {path}: {source}")]
    Artifact {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("adapter failed: {0}")]
    Adapter(#[from] AdapterError),
}

/// Which adapter consumes the engine's artifact.
#[derive(Debug, Clone)]
pub enum ArtifactKind {
    /// OnionSearch CSV rows, rooted at the query.
    SearchCsv { query: String },
    /// TOC recursive tree JSON.
    TreeJson,
    /// TorBot OSINT JSON (either shape).
    OsintJson { starting_url: String },
}

/// A fully-resolved subprocess invocation.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    pub artifact: PathBuf,
}

/// TorBot launch parameters, mirroring its CLI surface.
#[derive(Debug, Clone)]
pub struct TorBotParams {
    pub url: String,
    pub depth: usize,
    pub socks_host: String,
    pub socks_port: u16,
    pub disable_socks5: bool,
    pub info_mode: bool,
    pub output_format: String,
}

/// Build the TOC deep-crawl invocation.
pub fn toc_command(cfg: &EnginesConfig, url: &str) -> ExternalCommand {
    ExternalCommand {
        program: cfg.toc.program.clone(),
        args: vec![
            "-url".to_string(),
            url.to_string(),
            "-output".to_string(),
            cfg.toc.artifact.clone(),
        ],
        work_dir: cfg.toc.work_dir.clone(),
        artifact: cfg.toc.artifact_path(),
    }
}

/// Build the OnionSearch invocation.
pub fn onionsearch_command(
    cfg: &EnginesConfig,
    query: &str,
    engines: &[String],
    limit: Option<usize>,
) -> ExternalCommand {
    let mut args = vec!["--output".to_string(), cfg.onionsearch.artifact.clone()];
    if let Some(limit) = limit {
        args.push("--limit".to_string());
        args.push(limit.to_string());
    }
    for engine in engines {
        args.push("--engines".to_string());
        args.push(engine.clone());
    }
    args.push(query.to_string());

    ExternalCommand {
        program: cfg.onionsearch.program.clone(),
        args,
        work_dir: cfg.onionsearch.work_dir.clone(),
        artifact: cfg.onionsearch.artifact_path(),
    }
}

/// Build the TorBot invocation.
pub fn torbot_command(cfg: &EnginesConfig, params: &TorBotParams) -> ExternalCommand {
    let mut args = vec![
        "main.py".to_string(),
        "-u".to_string(),
        params.url.clone(),
        "--depth".to_string(),
        params.depth.to_string(),
        "--save".to_string(),
        params.output_format.clone(),
        "--quiet".to_string(),
    ];
    if params.info_mode {
        args.push("--info".to_string());
    }
    if params.disable_socks5 {
        args.push("--disable-socks5".to_string());
    } else {
        args.push("--host".to_string());
        args.push(params.socks_host.clone());
        args.push("--port".to_string());
        args.push(params.socks_port.to_string());
    }

    ExternalCommand {
        program: cfg.torbot.program.clone(),
        args,
        work_dir: cfg.torbot.work_dir.clone(),
        artifact: cfg.torbot.artifact_path(),
    }
}

/// Run the subprocess to completion, then adapt its artifact.
///
/// The artifact is deleted after successful adaption. Cancellation and the
/// wall-clock timeout both kill the child (`kill_on_drop`).
pub async fn run_to_tree(
    command: ExternalCommand,
    kind: ArtifactKind,
    timeout: Duration,
    mut cancel: watch::Receiver<bool>,
) -> Result<(Node, Option<OsintStats>), EngineError> {
    tracing::info!(
        "running engine: {} {} (cwd {})",
        command.program,
        command.args.join(" "),
        command.work_dir.display()
    );

    let child = tokio::process::Command::new(&command.program)
        .args(&command.args)
        .current_dir(&command.work_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| EngineError::Spawn {
            program: command.program.clone(),
            source,
        })?;

    let output = tokio::select! {
        waited = tokio::time::timeout(timeout, child.wait_with_output()) => match waited {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(EngineError::Spawn { program: command.program, source });
            }
            Err(_) => return Err(EngineError::Timeout(timeout)),
        },
        _ = cancel.changed() => return Err(EngineError::Cancelled),
    };

    if !output.stdout.is_empty() {
        tracing::debug!("engine stdout: {}", String::from_utf8_lossy(&output.stdout));
    }
    if !output.stderr.is_empty() {
        tracing::debug!("engine stderr: {}", String::from_utf8_lossy(&output.stderr));
    }

    if !output.status.success() {
        return Err(EngineError::Failed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let bytes = std::fs::read(&command.artifact).map_err(|source| EngineError::Artifact {
        path: command.artifact.clone(),
        source,
    })?;

    let result = match kind {
        ArtifactKind::SearchCsv { query } => {
            (adapters::convert_search_csv(&query, bytes.as_slice())?, None)
        }
        ArtifactKind::TreeJson => (adapters::convert_tree_json(bytes.as_slice())?, None),
        ArtifactKind::OsintJson { starting_url } => {
            let (tree, stats) = adapters::convert_osint_json(&starting_url, bytes.as_slice())?;
            (tree, Some(stats))
        }
    };

    if let Err(e) = std::fs::remove_file(&command.artifact) {
        tracing::warn!("failed to delete artifact {}: {e}", command.artifact.display());
    }

    Ok(result)
}
