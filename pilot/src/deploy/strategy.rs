//! Build strategies

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maven manifest
pub const MAVEN_MANIFEST: &str = "pom.xml";

/// Gradle manifests, groovy and kotlin DSL
pub const GRADLE_MANIFESTS: &[&str] = &["build.gradle", "build.gradle.kts"];

/// Web content directory used by the direct copy strategy
pub const WEB_CONTENT_DIR: &str = "src/main/webapp";

/// How the project is turned into a deployed webapp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStrategy {
    /// Sync web content, compile sources, copy jars
    #[serde(rename = "local")]
    DirectCopy,

    Maven,

    Gradle,
}

impl BuildStrategy {
    pub const ALL: [BuildStrategy; 3] = [
        BuildStrategy::DirectCopy,
        BuildStrategy::Maven,
        BuildStrategy::Gradle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStrategy::DirectCopy => "local",
            BuildStrategy::Maven => "maven",
            BuildStrategy::Gradle => "gradle",
        }
    }

    /// Whether the strategy's marker exists under the project root
    pub fn precondition_met(&self, root: &Path) -> bool {
        match self {
            BuildStrategy::DirectCopy => root.join(WEB_CONTENT_DIR).is_dir(),
            BuildStrategy::Maven => root.join(MAVEN_MANIFEST).is_file(),
            BuildStrategy::Gradle => GRADLE_MANIFESTS.iter().any(|m| root.join(m).is_file()),
        }
    }

    /// Strategies whose markers exist, toolchains first
    pub fn detect(root: &Path) -> Vec<BuildStrategy> {
        [BuildStrategy::Maven, BuildStrategy::Gradle, BuildStrategy::DirectCopy]
            .into_iter()
            .filter(|s| s.precondition_met(root))
            .collect()
    }
}

impl fmt::Display for BuildStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "direct" | "directcopy" => Ok(BuildStrategy::DirectCopy),
            "maven" | "mvn" => Ok(BuildStrategy::Maven),
            "gradle" => Ok(BuildStrategy::Gradle),
            other => Err(format!("Unknown build strategy: {}", other)),
        }
    }
}

/// What a deploy request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyChoice {
    /// Resolve interactively before running
    Prompt,

    Strategy(BuildStrategy),
}

impl FromStr for StrategyChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("prompt") {
            return Ok(StrategyChoice::Prompt);
        }
        s.parse().map(StrategyChoice::Strategy)
    }
}
