//! Editor-side collaborator
//!
//! Everything that needs a human or an editor (saving buffers, choosing a
//! strategy, locating installations, scaffolding new projects) goes through
//! this trait so the core stays headless.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::deploy::strategy::BuildStrategy;
use crate::errors::PilotError;

/// Which installation a path prompt is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    CatalinaHome,
    JavaHome,
}

impl PathKind {
    pub fn label(&self) -> &'static str {
        match self {
            PathKind::CatalinaHome => "Tomcat installation (CATALINA_HOME)",
            PathKind::JavaHome => "JDK installation (JAVA_HOME)",
        }
    }
}

/// Interactive and editor operations used by the core
#[async_trait]
pub trait Workbench: Send + Sync {
    /// Persist unsaved editor buffers
    async fn save_all(&self) -> Result<(), PilotError>;

    /// Hand off to project scaffolding when no project is recognized
    async fn scaffold(&self, root: &Path);

    /// Ask for a strategy, `None` when the user declines
    async fn pick_strategy(&self) -> Option<BuildStrategy>;

    /// Ask for an installation directory, `None` when the user declines
    async fn prompt_path(&self, kind: PathKind) -> Option<PathBuf>;
}

/// Non-interactive workbench for service mode
#[derive(Debug, Clone, Default)]
pub struct Headless {
    /// Answer for strategy prompts
    pub default_strategy: Option<BuildStrategy>,
}

#[async_trait]
impl Workbench for Headless {
    async fn save_all(&self) -> Result<(), PilotError> {
        Ok(())
    }

    async fn scaffold(&self, root: &Path) {
        warn!("No Java web project found in {}", root.display());
    }

    async fn pick_strategy(&self) -> Option<BuildStrategy> {
        self.default_strategy
    }

    async fn prompt_path(&self, kind: PathKind) -> Option<PathBuf> {
        warn!("{} is not configured", kind.label());
        None
    }
}

/// Prompts on the terminal, each prompt bounded by a timeout
#[derive(Debug, Clone)]
pub struct Terminal {
    pub timeout: Duration,
}

impl Default for Terminal {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

impl Terminal {
    async fn ask(&self, question: &str) -> Option<String> {
        let mut stdout = tokio::io::stdout();
        let _ = stdout.write_all(format!("{} ", question.bold()).as_bytes()).await;
        let _ = stdout.flush().await;

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match tokio::time::timeout(self.timeout, stdin.read_line(&mut line)).await {
            Ok(Ok(n)) if n > 0 => {
                let answer = line.trim().to_string();
                (!answer.is_empty()).then_some(answer)
            }
            Ok(_) => None,
            Err(_) => {
                println!();
                warn!("Prompt timed out after {:?}", self.timeout);
                None
            }
        }
    }
}

#[async_trait]
impl Workbench for Terminal {
    async fn save_all(&self) -> Result<(), PilotError> {
        Ok(())
    }

    async fn scaffold(&self, root: &Path) {
        println!(
            "{} no pom.xml, build.gradle or src/main/webapp under {}",
            "No Java web project:".yellow().bold(),
            root.display()
        );
    }

    async fn pick_strategy(&self) -> Option<BuildStrategy> {
        let answer = self.ask("Deploy with [local/maven/gradle]:").await?;
        match answer.parse::<BuildStrategy>() {
            Ok(strategy) => Some(strategy),
            Err(e) => {
                println!("{}", e.red());
                None
            }
        }
    }

    async fn prompt_path(&self, kind: PathKind) -> Option<PathBuf> {
        let answer = self.ask(&format!("Path to {}:", kind.label())).await?;
        info!("Using {} for {}", answer, kind.label());
        Some(PathBuf::from(answer))
    }
}
