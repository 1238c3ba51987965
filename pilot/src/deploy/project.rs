//! Active project and its deployment target

use std::path::{Path, PathBuf};

use crate::deploy::strategy::{BuildStrategy, WEB_CONTENT_DIR};
use crate::errors::PilotError;
use crate::tomcat::install::ServerInstallation;

/// Directory of dependency jars copied into `WEB-INF/lib`
pub const PROJECT_LIB_DIR: &str = "lib";

/// Java sources compiled by the direct copy strategy
pub const JAVA_SOURCE_DIR: &str = "src/main/java";

/// Resources copied next to compiled classes
pub const RESOURCE_DIR: &str = "src/main/resources";

/// The project being deployed, fixed for the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    root: PathBuf,
    app_name: String,
}

impl Project {
    /// The app name is the root directory's name
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PilotError> {
        let root = root.into();
        let app_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                PilotError::ValidationError(format!("Cannot derive app name from {}", root.display()))
            })?;
        Ok(Self { root, app_name })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Whether any strategy marker exists
    pub fn is_recognized(&self) -> bool {
        !BuildStrategy::detect(&self.root).is_empty()
    }

    /// Target inside the given installation
    pub fn target(&self, install: &ServerInstallation) -> DeploymentTarget {
        DeploymentTarget {
            app_name: self.app_name.clone(),
            source_dir: self.root.clone(),
            target_dir: install.webapps_dir().join(&self.app_name),
        }
    }
}

/// Where one project is deployed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub app_name: String,

    /// Project root
    pub source_dir: PathBuf,

    /// `<catalina_home>/webapps/<app_name>`
    pub target_dir: PathBuf,
}

impl DeploymentTarget {
    pub fn web_content_dir(&self) -> PathBuf {
        self.source_dir.join(WEB_CONTENT_DIR)
    }

    pub fn java_source_dir(&self) -> PathBuf {
        self.source_dir.join(JAVA_SOURCE_DIR)
    }

    pub fn resource_dir(&self) -> PathBuf {
        self.source_dir.join(RESOURCE_DIR)
    }

    pub fn project_lib_dir(&self) -> PathBuf {
        self.source_dir.join(PROJECT_LIB_DIR)
    }

    pub fn classes_dir(&self) -> PathBuf {
        self.target_dir.join("WEB-INF").join("classes")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.target_dir.join("WEB-INF").join("lib")
    }

    /// `<catalina_home>/webapps/<app_name>.war`
    pub fn war_path(&self) -> PathBuf {
        self.target_dir.with_file_name(format!("{}.war", self.app_name))
    }
}
