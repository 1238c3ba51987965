//! Installation resolution
//!
//! Both homes are resolved from an ordered candidate list: explicit override,
//! environment variable, persisted settings, then an interactive prompt. The
//! first candidate that validates wins. The result is cached until
//! [`Installer::invalidate`] is called, which the lifecycle manager does
//! when launching from the cached homes fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::PilotError;
use crate::storage::settings::SettingsStore;
use crate::workbench::{PathKind, Workbench};

pub const CATALINA_HOME_ENV: &str = "CATALINA_HOME";
pub const JAVA_HOME_ENV: &str = "JAVA_HOME";

/// Bootstrap class used for start and stop
pub const BOOTSTRAP_CLASS: &str = "org.apache.catalina.startup.Bootstrap";

#[cfg(windows)]
const EXE_SUFFIX: &str = ".exe";
#[cfg(not(windows))]
const EXE_SUFFIX: &str = "";

/// Resolved runtime locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInstallation {
    pub catalina_home: PathBuf,
    pub java_home: PathBuf,
}

impl ServerInstallation {
    pub fn new(catalina_home: impl Into<PathBuf>, java_home: impl Into<PathBuf>) -> Self {
        Self {
            catalina_home: catalina_home.into(),
            java_home: java_home.into(),
        }
    }

    pub fn java(&self) -> PathBuf {
        java_tool(&self.java_home, "java")
    }

    pub fn javac(&self) -> PathBuf {
        java_tool(&self.java_home, "javac")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.catalina_home.join("bin")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.catalina_home.join("lib")
    }

    pub fn conf_dir(&self) -> PathBuf {
        self.catalina_home.join("conf")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.catalina_home.join("logs")
    }

    pub fn webapps_dir(&self) -> PathBuf {
        self.catalina_home.join("webapps")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.catalina_home.join("work")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.catalina_home.join("temp")
    }

    pub fn server_xml(&self) -> PathBuf {
        self.conf_dir().join("server.xml")
    }

    pub fn users_xml(&self) -> PathBuf {
        self.conf_dir().join("tomcat-users.xml")
    }

    /// Bootstrap classpath, `bootstrap.jar` and `tomcat-juli.jar`
    pub fn bootstrap_classpath(&self) -> String {
        let bin = self.bin_dir();
        join_classpath(&[bin.join("bootstrap.jar"), bin.join("tomcat-juli.jar")])
    }
}

fn java_tool(java_home: &Path, name: &str) -> PathBuf {
    java_home.join("bin").join(format!("{}{}", name, EXE_SUFFIX))
}

/// Join paths with the platform classpath separator
pub fn join_classpath(paths: &[PathBuf]) -> String {
    let separator = if cfg!(windows) { ";" } else { ":" };
    paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(separator)
}

/// A Tomcat home must contain the bootstrap jar
pub fn is_valid_catalina_home(path: &Path) -> bool {
    path.join("bin").join("bootstrap.jar").is_file()
}

/// A JDK home must contain both java and javac
pub fn is_valid_java_home(path: &Path) -> bool {
    java_tool(path, "java").is_file() && java_tool(path, "javac").is_file()
}

fn is_valid(kind: PathKind, path: &Path) -> bool {
    match kind {
        PathKind::CatalinaHome => is_valid_catalina_home(path),
        PathKind::JavaHome => is_valid_java_home(path),
    }
}

/// Paths given on the command line
#[derive(Debug, Clone, Default)]
pub struct InstallOverrides {
    pub catalina_home: Option<PathBuf>,
    pub java_home: Option<PathBuf>,
}

/// Resolves and caches the installation
pub struct Installer {
    overrides: InstallOverrides,
    read_env: bool,
    settings: Arc<SettingsStore>,
    workbench: Arc<dyn Workbench>,
    cached: Mutex<Option<ServerInstallation>>,
}

impl Installer {
    pub fn new(
        overrides: InstallOverrides,
        settings: Arc<SettingsStore>,
        workbench: Arc<dyn Workbench>,
    ) -> Self {
        Self {
            overrides,
            read_env: true,
            settings,
            workbench,
            cached: Mutex::new(None),
        }
    }

    /// Ignore environment variables during resolution
    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    /// Resolve the installation, from cache when possible
    pub async fn resolve(&self) -> Result<ServerInstallation, PilotError> {
        let mut cached = self.cached.lock().await;
        if let Some(install) = cached.as_ref() {
            return Ok(install.clone());
        }

        let catalina_home = self.resolve_one(PathKind::CatalinaHome).await?;
        let java_home = self.resolve_one(PathKind::JavaHome).await?;
        let install = ServerInstallation::new(catalina_home, java_home);
        info!(
            catalina_home = %install.catalina_home.display(),
            java_home = %install.java_home.display(),
            "Installation resolved"
        );

        *cached = Some(install.clone());
        Ok(install)
    }

    /// Drop the cached installation
    pub async fn invalidate(&self) {
        debug!("Installation cache invalidated");
        *self.cached.lock().await = None;
    }

    async fn resolve_one(&self, kind: PathKind) -> Result<PathBuf, PilotError> {
        let settings = self.settings.get().await;
        let (overridden, env_var, persisted) = match kind {
            PathKind::CatalinaHome => (
                self.overrides.catalina_home.clone(),
                CATALINA_HOME_ENV,
                settings.catalina_home,
            ),
            PathKind::JavaHome => (
                self.overrides.java_home.clone(),
                JAVA_HOME_ENV,
                settings.java_home,
            ),
        };
        let from_env = if self.read_env {
            std::env::var_os(env_var).map(PathBuf::from)
        } else {
            None
        };

        for (source, candidate) in [("override", overridden), ("environment", from_env), ("settings", persisted)] {
            let Some(path) = candidate else { continue };
            if is_valid(kind, &path) {
                debug!(source, path = %path.display(), "{} found", kind.label());
                return Ok(path);
            }
            warn!(source, path = %path.display(), "Ignoring invalid {}", kind.label());
        }

        let Some(path) = self.workbench.prompt_path(kind).await else {
            return Err(PilotError::ConfigError(format!("{} not found", kind.label())));
        };
        if !is_valid(kind, &path) {
            return Err(PilotError::ConfigError(format!(
                "{} is not a valid {}",
                path.display(),
                kind.label()
            )));
        }

        self.settings
            .update(|s| match kind {
                PathKind::CatalinaHome => s.catalina_home = Some(path.clone()),
                PathKind::JavaHome => s.java_home = Some(path.clone()),
            })
            .await?;
        Ok(path)
    }
}
