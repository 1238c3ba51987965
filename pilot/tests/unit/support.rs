//! Fakes for the OS, the manager and the browser

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use catpilot::browser::BrowserController;
use catpilot::deploy::project::DeploymentTarget;
use catpilot::deploy::runner::StrategyRunner;
use catpilot::deploy::strategy::BuildStrategy;
use catpilot::errors::PilotError;
use catpilot::filesys::file::File;
use catpilot::monitor::processor::{line_channel, LineReceiver, LineSender};
use catpilot::monitor::sink::LogSink;
use catpilot::storage::settings::{Settings, SettingsStore};
use catpilot::tomcat::install::{InstallOverrides, Installer, ServerInstallation};
use catpilot::tomcat::lifecycle::{TomcatManager, TomcatOptions};
use catpilot::tomcat::manager::ManagerApi;
use catpilot::tomcat::process::{ProcessHost, ServerProcess};
use catpilot::workbench::Headless;
use pilot_api::EventLevel;
use tempfile::TempDir;
use tokio::sync::Notify;

pub const SERVER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Server port="8005" shutdown="SHUTDOWN">
  <Service name="Catalina">
    <Connector port="8080" protocol="HTTP/1.1"
               connectionTimeout="20000"
               redirectPort="8443" />
    <Engine name="Catalina" defaultHost="localhost">
      <Host name="localhost" appBase="webapps" unpackWARs="true" autoDeploy="true" />
    </Engine>
  </Service>
</Server>
"#;

/// A server.xml with no HTTP connector, so every port patch fails
pub const SERVER_XML_AJP_ONLY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Server port="8005" shutdown="SHUTDOWN">
  <Service name="Catalina">
    <Connector protocol="AJP/1.3" address="::1" port="8009" redirectPort="8443" />
  </Service>
</Server>
"#;

struct FakeProcess {
    exited: Arc<AtomicBool>,
}

#[async_trait]
impl ServerProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    fn has_exited(&mut self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    async fn terminate(&mut self, _grace: Duration) -> Result<(), PilotError> {
        self.exited.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Process host that never launches anything
#[derive(Default)]
pub struct FakeHost {
    pub bound: Mutex<HashSet<u16>>,
    pub spawns: AtomicUsize,
    pub stop_commands: AtomicUsize,
    pub kills: AtomicUsize,
    pub fail_spawn: AtomicBool,
    processes: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakeHost {
    pub fn bind(&self, port: u16) {
        self.bound.lock().unwrap().insert(port);
    }

    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn stop_commands(&self) -> usize {
        self.stop_commands.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessHost for FakeHost {
    async fn spawn(
        &self,
        _install: &ServerInstallation,
        _args: Vec<String>,
        _lines: LineSender,
    ) -> Result<Box<dyn ServerProcess>, PilotError> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(PilotError::ProcessError("Failed to spawn java: not found".to_string()));
        }
        let exited = Arc::new(AtomicBool::new(false));
        self.processes.lock().unwrap().push(exited.clone());
        Ok(Box::new(FakeProcess { exited }))
    }

    async fn run_to_exit(
        &self,
        _install: &ServerInstallation,
        _args: Vec<String>,
    ) -> Result<(), PilotError> {
        self.stop_commands.fetch_add(1, Ordering::SeqCst);
        self.bound.lock().unwrap().clear();
        Ok(())
    }

    async fn kill_runtime(&self, _install: &ServerInstallation) -> Result<usize, PilotError> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.bound.lock().unwrap().clear();
        let processes = self.processes.lock().unwrap();
        for exited in processes.iter() {
            exited.store(true, Ordering::SeqCst);
        }
        Ok(processes.len())
    }

    async fn port_in_use(&self, port: u16) -> bool {
        self.bound.lock().unwrap().contains(&port)
    }
}

/// Manager endpoint with a fixed answer
pub struct FakeManager {
    pub accept: bool,
    pub calls: AtomicUsize,
}

impl FakeManager {
    pub fn new(accept: bool) -> Self {
        Self {
            accept,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ManagerApi for FakeManager {
    async fn reload(&self, _port: u16, app_name: &str) -> Result<(), PilotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.accept {
            Ok(())
        } else {
            Err(PilotError::ProtocolError(format!("FAIL - No context exists named [/{}]", app_name)))
        }
    }
}

/// Records every refresh
#[derive(Default)]
pub struct RecordingBrowser {
    pub refreshed: Mutex<Vec<String>>,
}

impl RecordingBrowser {
    pub fn refreshed(&self) -> Vec<String> {
        self.refreshed.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserController for RecordingBrowser {
    async fn refresh(&self, app_name: &str) -> Result<(), PilotError> {
        self.refreshed.lock().unwrap().push(app_name.to_string());
        Ok(())
    }
}

/// Runner that reports a busy target a fixed number of times
pub struct ScriptedRunner {
    strategy: BuildStrategy,
    busy: AtomicU32,
    failure: Option<String>,
    gate: Option<Arc<Notify>>,
    pub calls: AtomicU32,
}

impl ScriptedRunner {
    pub fn busy(times: u32) -> Self {
        Self {
            strategy: BuildStrategy::DirectCopy,
            busy: AtomicU32::new(times),
            failure: None,
            gate: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::busy(0)
        }
    }

    /// Blocks every run until the gate is notified
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::busy(0)
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StrategyRunner for ScriptedRunner {
    fn strategy(&self) -> BuildStrategy {
        self.strategy
    }

    async fn produce(
        &self,
        target: &DeploymentTarget,
        _install: &ServerInstallation,
    ) -> Result<(), PilotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(message) = &self.failure {
            return Err(PilotError::BuildError(message.clone()));
        }
        let remaining = self.busy.load(Ordering::SeqCst);
        if remaining > 0 {
            self.busy.store(remaining - 1, Ordering::SeqCst);
            return Err(PilotError::ResourceBusy(target.target_dir.display().to_string()));
        }
        Ok(())
    }
}

pub fn fake_catalina(root: &Path, server_xml: &str) -> PathBuf {
    let home = root.join("tomcat");
    for dir in ["bin", "conf", "lib", "logs", "webapps", "work", "temp"] {
        std::fs::create_dir_all(home.join(dir)).unwrap();
    }
    std::fs::write(home.join("bin/bootstrap.jar"), "").unwrap();
    std::fs::write(home.join("conf/server.xml"), server_xml).unwrap();
    home
}

pub fn fake_jdk(root: &Path) -> PathBuf {
    let home = root.join("jdk");
    std::fs::create_dir_all(home.join("bin")).unwrap();
    for tool in ["java", "javac"] {
        let name = if cfg!(windows) { format!("{}.exe", tool) } else { tool.to_string() };
        std::fs::write(home.join("bin").join(name), "").unwrap();
    }
    home
}

/// A Tomcat manager over a throwaway installation and fake collaborators
pub struct Fixture {
    pub tmp: TempDir,
    pub install: ServerInstallation,
    pub settings: Arc<SettingsStore>,
    pub host: Arc<FakeHost>,
    pub manager_api: Arc<FakeManager>,
    pub sink: Arc<LogSink>,
    pub lines: LineSender,
    pub tomcat: Arc<TomcatManager>,
    _line_rx: LineReceiver,
}

impl Fixture {
    pub fn new(server_xml: &str, manager_accepts: bool) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let catalina_home = fake_catalina(tmp.path(), server_xml);
        let java_home = fake_jdk(tmp.path());
        let install = ServerInstallation::new(&catalina_home, &java_home);

        let settings = Arc::new(SettingsStore::with_settings(
            File::new(tmp.path().join("settings.json")),
            Settings {
                port: 8080,
                ..Settings::default()
            },
        ));
        let installer = Arc::new(
            Installer::new(
                InstallOverrides {
                    catalina_home: Some(catalina_home),
                    java_home: Some(java_home),
                },
                settings.clone(),
                Arc::new(Headless::default()),
            )
            .without_env(),
        );

        let host = Arc::new(FakeHost::default());
        let manager_api = Arc::new(FakeManager::new(manager_accepts));
        let sink = Arc::new(LogSink::new(EventLevel::Debug));
        let (lines, line_rx) = line_channel();
        let tomcat = Arc::new(TomcatManager::new(
            installer,
            settings.clone(),
            host.clone(),
            manager_api.clone(),
            sink.clone(),
            lines.clone(),
            TomcatOptions {
                stop_grace: Duration::from_millis(200),
                probe_interval: Duration::from_millis(10),
            },
        ));

        Self {
            tmp,
            install,
            settings,
            host,
            manager_api,
            sink,
            lines,
            tomcat,
            _line_rx: line_rx,
        }
    }

    /// A direct copy project named `shop`
    pub fn project(&self) -> PathBuf {
        let root = self.tmp.path().join("shop");
        std::fs::create_dir_all(root.join("src/main/webapp")).unwrap();
        std::fs::write(root.join("src/main/webapp/index.jsp"), "<h1>shop</h1>").unwrap();
        root
    }

    pub fn server_xml(&self) -> String {
        std::fs::read_to_string(self.install.server_xml()).unwrap()
    }
}
