//! Direct copy strategy
//!
//! Syncs `src/main/webapp` into the target, compiles `src/main/java` into
//! `WEB-INF/classes` against Tomcat's own jars and copies `lib/*.jar` into
//! `WEB-INF/lib`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::deploy::project::DeploymentTarget;
use crate::deploy::runner::StrategyRunner;
use crate::deploy::strategy::{BuildStrategy, WEB_CONTENT_DIR};
use crate::errors::PilotError;
use crate::filesys::dir::Dir;
use crate::filesys::sync::{brutal_sync, copy_file_forced, copy_tree, SyncOptions};
use crate::tomcat::install::{join_classpath, ServerInstallation};

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectCopyRunner;

#[async_trait]
impl StrategyRunner for DirectCopyRunner {
    fn strategy(&self) -> BuildStrategy {
        BuildStrategy::DirectCopy
    }

    async fn produce(
        &self,
        target: &DeploymentTarget,
        install: &ServerInstallation,
    ) -> Result<(), PilotError> {
        let web = target.web_content_dir();
        if !Dir::new(&web).exists().await {
            return Err(PilotError::BuildError(format!(
                "{} not found in {}",
                WEB_CONTENT_DIR,
                target.source_dir.display()
            )));
        }

        let report = brutal_sync(&web, &target.target_dir, &SyncOptions::restricted()).await?;
        info!(
            copied = report.copied,
            removed = report.removed,
            preserved = report.preserved,
            "Web content synchronized"
        );

        compile_sources(target, install).await?;
        copy_resources(target).await?;
        copy_project_jars(target).await?;
        Ok(())
    }
}

async fn compile_sources(
    target: &DeploymentTarget,
    install: &ServerInstallation,
) -> Result<(), PilotError> {
    let sources = Dir::new(target.java_source_dir())
        .walk_files_with_ext("java")
        .await?;
    if sources.is_empty() {
        debug!("No Java sources to compile");
        return Ok(());
    }

    let classes = Dir::new(target.classes_dir());
    classes.create().await?;

    let mut classpath = Dir::new(install.lib_dir()).list_files_with_ext("jar").await?;
    classpath.extend(Dir::new(target.project_lib_dir()).list_files_with_ext("jar").await?);
    classpath.extend(Dir::new(target.lib_dir()).list_files_with_ext("jar").await?);
    classpath.push(target.classes_dir());

    // Source lists overflow command lines on large projects
    let scratch = Dir::create_temp_dir("catpilot-javac").await?;
    let argfile = scratch.file("sources.txt");
    argfile.write_string(&argfile_contents(&sources)).await?;

    info!(count = sources.len(), "Compiling Java sources");
    let output = Command::new(install.javac())
        .arg("-encoding")
        .arg("UTF-8")
        .arg("-d")
        .arg(classes.path())
        .arg("-cp")
        .arg(join_classpath(&classpath))
        .arg(format!("@{}", argfile.path().display()))
        .current_dir(&target.source_dir)
        .output()
        .await;
    let _ = scratch.delete().await;

    let output =
        output.map_err(|e| PilotError::BuildError(format!("Failed to run javac: {}", e)))?;
    if !output.status.success() {
        let text = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        return Err(PilotError::BuildError(format!(
            "Compilation failed:\n{}",
            compiler_errors(&text).join("\n")
        )));
    }
    Ok(())
}

/// One quoted path per line, backslashes escaped
fn argfile_contents(sources: &[PathBuf]) -> String {
    sources
        .iter()
        .map(|p| format!("\"{}\"", p.to_string_lossy().replace('\\', "\\\\")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `File.java:12: error: ...` lines, deduplicated
pub(crate) fn compiler_errors(output: &str) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();
    for line in output.lines().map(str::trim) {
        if line.contains("error:") && !errors.iter().any(|e| e == line) {
            errors.push(line.to_string());
        }
    }
    if errors.is_empty() {
        errors.push(output.trim().to_string());
    }
    errors
}

async fn copy_resources(target: &DeploymentTarget) -> Result<(), PilotError> {
    let resources = target.resource_dir();
    if !Dir::new(&resources).exists().await {
        return Ok(());
    }
    let copied = copy_tree(&resources, &target.classes_dir()).await?;
    debug!(copied, "Resources copied");
    Ok(())
}

async fn copy_project_jars(target: &DeploymentTarget) -> Result<(), PilotError> {
    let jars = Dir::new(target.project_lib_dir()).list_files_with_ext("jar").await?;
    if jars.is_empty() {
        return Ok(());
    }

    let lib = Dir::new(target.lib_dir());
    lib.create().await?;
    for jar in &jars {
        copy_file_forced(jar, &lib.path().join(file_name(jar)?)).await?;
    }
    info!(count = jars.len(), "Dependency jars copied");
    Ok(())
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr, PilotError> {
    path.file_name()
        .ok_or_else(|| PilotError::Internal(format!("No file name in {}", path.display())))
}
