//! Maven and Gradle strategies
//!
//! The build tool runs in the project root. Its archive replaces whatever
//! was deployed before; an exploded webapp directory next to the archive is
//! copied into the target as well.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::deploy::project::DeploymentTarget;
use crate::deploy::runner::StrategyRunner;
use crate::deploy::strategy::{BuildStrategy, GRADLE_MANIFESTS, MAVEN_MANIFEST};
use crate::errors::PilotError;
use crate::filesys::dir::{remove_path, Dir};
use crate::filesys::sync::{copy_file_forced, copy_tree};
use crate::tomcat::install::ServerInstallation;

/// Output lines that point at logs instead of stating an error
const BOILERPLATE: &[&str] = &[
    "-> [Help 1]",
    "[Help 1]",
    "To see the full stack trace",
    "Re-run Maven using the -X switch",
    "For more information about the errors",
    "After correcting the problems",
    "mvn <args> -rf",
    "Run with --stacktrace",
    "Run with --info",
    "Run with --debug",
    "Run with --scan",
    "Get more help at",
    "* Try:",
    "BUILD FAILED",
    "BUILD FAILURE",
];

/// Runs an external build tool
#[derive(Debug, Clone, Copy)]
pub struct ToolchainRunner {
    strategy: BuildStrategy,
}

impl ToolchainRunner {
    pub fn new(strategy: BuildStrategy) -> Self {
        Self { strategy }
    }

    fn manifest_present(&self, root: &Path) -> bool {
        match self.strategy {
            BuildStrategy::Gradle => GRADLE_MANIFESTS.iter().any(|m| root.join(m).is_file()),
            _ => root.join(MAVEN_MANIFEST).is_file(),
        }
    }

    /// Program and arguments, preferring the project's wrapper script
    fn command_line(&self, root: &Path) -> (PathBuf, Vec<&'static str>) {
        let (wrapper, tool, args) = match self.strategy {
            BuildStrategy::Gradle => ("gradlew", "gradle", vec!["clean", "war"]),
            _ => ("mvnw", "mvn", vec!["clean", "package", "-DskipTests"]),
        };
        let wrapper = if cfg!(windows) {
            root.join(format!(
                "{}.{}",
                wrapper,
                if wrapper == "gradlew" { "bat" } else { "cmd" }
            ))
        } else {
            root.join(wrapper)
        };
        if wrapper.is_file() {
            (wrapper, args)
        } else {
            (PathBuf::from(tool), args)
        }
    }

    fn output_dir(&self, root: &Path) -> PathBuf {
        match self.strategy {
            BuildStrategy::Gradle => root.join("build").join("libs"),
            _ => root.join("target"),
        }
    }
}

#[async_trait]
impl StrategyRunner for ToolchainRunner {
    fn strategy(&self) -> BuildStrategy {
        self.strategy
    }

    async fn produce(
        &self,
        target: &DeploymentTarget,
        _install: &ServerInstallation,
    ) -> Result<(), PilotError> {
        let root = &target.source_dir;
        if !self.manifest_present(root) {
            return Err(PilotError::BuildError(format!(
                "No {} build file in {}",
                self.strategy,
                root.display()
            )));
        }

        let (program, args) = self.command_line(root);
        info!("Running {} {}", program.display(), args.join(" "));
        let output = Command::new(&program)
            .args(&args)
            .current_dir(root)
            .output()
            .await
            .map_err(|e| {
                PilotError::BuildError(format!("Failed to run {}: {}", program.display(), e))
            })?;

        if !output.status.success() {
            let text = format!(
                "{}\n{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            let errors = actionable_errors(&text);
            let reason = if errors.is_empty() {
                format!("{} exited with {}", program.display(), output.status)
            } else {
                errors.join("\n")
            };
            return Err(PilotError::BuildError(reason));
        }

        let war = find_archive(&self.output_dir(root)).await?;
        install_archive(&war, target).await
    }
}

/// Error lines worth showing, deduplicated, in order of appearance
pub fn actionable_errors(output: &str) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();
    for raw in output.lines() {
        let line = raw.trim();
        let message = if let Some(rest) = line.strip_prefix("[ERROR]") {
            rest.trim()
        } else if let Some(rest) = line.strip_prefix("e: ") {
            rest.trim()
        } else if line.contains("error:") || line.starts_with("FAILURE:") {
            line
        } else {
            continue;
        };

        if message.is_empty() || BOILERPLATE.iter().any(|b| message.contains(b)) {
            continue;
        }
        if !errors.iter().any(|e| e == message) {
            errors.push(message.to_string());
        }
    }
    errors
}

/// Newest `.war` in the build output directory
async fn find_archive(dir: &Path) -> Result<PathBuf, PilotError> {
    let wars = Dir::new(dir).list_files_with_ext("war").await?;
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for war in wars {
        let modified = tokio::fs::metadata(&war).await?.modified()?;
        if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
            newest = Some((modified, war));
        }
    }
    newest.map(|(_, war)| war).ok_or_else(|| {
        PilotError::BuildError(format!("No .war archive produced in {}", dir.display()))
    })
}

async fn install_archive(war: &Path, target: &DeploymentTarget) -> Result<(), PilotError> {
    remove_path(&target.target_dir).await?;
    remove_path(&target.war_path()).await?;

    if let Some(parent) = target.war_path().parent() {
        Dir::new(parent).create().await?;
    }
    copy_file_forced(war, &target.war_path()).await?;
    info!(war = %war.display(), "Archive deployed");

    let exploded = war.with_extension("");
    if Dir::new(&exploded).exists().await {
        let copied = copy_tree(&exploded, &target.target_dir).await?;
        debug!(copied, "Exploded webapp copied");
    }
    Ok(())
}
