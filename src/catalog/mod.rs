//! Instance discovery and launch command resolution.
//!
//! An instance is any immediate subdirectory of the servers root that
//! contains a recognized launch artifact: a platform start script, or a
//! non-installer server jar. No other file format is parsed here.

use std::path::{Path, PathBuf};

/// Error type for catalog operations.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    /// The servers root directory could not be read.
    #[error("Failed to read servers directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolved command line for launching an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    program: String,
    args: Vec<String>,
}

impl LaunchCommand {
    /// Create a launch command from an executable and its arguments.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The executable (or interpreter) to run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the executable.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// One configured, launchable server installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    id: String,
    dir: PathBuf,
}

impl Instance {
    /// Create an instance from its directory. The id is the directory name.
    #[must_use]
    pub fn new(id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            dir: dir.into(),
        }
    }

    /// Instance identifier, unique within one servers root.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The instance's working directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve the launch artifact in this instance's directory.
    ///
    /// Prefers a platform start script, then falls back to a non-installer
    /// server jar run through `java`. Returns `None` when the directory
    /// holds no recognized artifact (or does not exist).
    #[must_use]
    pub fn resolve_launch(&self) -> Option<LaunchCommand> {
        for script in Self::start_scripts() {
            if self.dir.join(script).is_file() {
                return Some(Self::script_command(script));
            }
        }

        self.find_server_jar().map(|jar| {
            LaunchCommand::new(
                "java",
                vec!["-jar".to_string(), jar, "nogui".to_string()],
            )
        })
    }

    #[cfg(windows)]
    fn start_scripts() -> &'static [&'static str] {
        &["start.bat", "run.bat"]
    }

    #[cfg(not(windows))]
    fn start_scripts() -> &'static [&'static str] {
        &["start.sh", "run.sh"]
    }

    #[cfg(windows)]
    fn script_command(script: &str) -> LaunchCommand {
        LaunchCommand::new("cmd.exe", vec!["/C".to_string(), script.to_string()])
    }

    #[cfg(not(windows))]
    fn script_command(script: &str) -> LaunchCommand {
        LaunchCommand::new("sh", vec![script.to_string()])
    }

    /// Find a server jar, skipping installer jars so a half-finished
    /// install is never mistaken for a runnable server.
    fn find_server_jar(&self) -> Option<String> {
        let entries = std::fs::read_dir(&self.dir).ok()?;
        entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".jar") && !name.contains("installer"))
            .min()
    }
}

/// Enumerates launchable instances under one servers root.
///
/// The root is passed in explicitly; there is no process-wide directory
/// state.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    /// Create a catalog over the given servers root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The servers root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List all instances, sorted by id.
    ///
    /// A missing root yields an empty catalog rather than an error.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::ReadDir` if the root exists but cannot be read.
    pub fn instances(&self) -> Result<Vec<Instance>, CatalogError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.root).map_err(|e| CatalogError::ReadDir {
            path: self.root.clone(),
            source: e,
        })?;

        let mut instances: Vec<Instance> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let id = entry.file_name().into_string().ok()?;
                let instance = Instance::new(id, entry.path());
                instance.resolve_launch().is_some().then_some(instance)
            })
            .collect();

        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }

    /// Look up one instance by id.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::ReadDir` if the root cannot be enumerated.
    pub fn find(&self, id: &str) -> Result<Option<Instance>, CatalogError> {
        Ok(self.instances()?.into_iter().find(|i| i.id() == id))
    }
}
