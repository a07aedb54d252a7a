use std::{env, fmt, fs, io, path};

use logger::LogFormat;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file {0}")]
    ReadFailed(path::PathBuf, #[source] io::Error),
    #[error("failed to write config file {0}")]
    WriteFailed(path::PathBuf, #[source] io::Error),
    #[error("failed to parse config file {0}")]
    ParseFailed(path::PathBuf, #[source] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: Engine,
    pub settings: Settings,
    pub logging: Logging,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Engine {
    /// Probes allowed to run at the same time across all checks
    pub max_concurrent_probes: usize,
    /// Seconds between two reconciliations against the checks file
    pub reconcile_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Checks file, relative paths are resolved against the config directory
    pub checks_file: path::PathBuf,
    /// Seconds between two polls of the checks file
    pub watch_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub format: LogFormat,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
pub fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
}

impl Default for Engine {
    fn default() -> Self {
        Self { max_concurrent_probes: vigil::DEFAULT_MAX_CONCURRENT_PROBES, reconcile_interval_secs: 60 }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self { checks_file: path::PathBuf::from("checks.toml"), watch_interval_secs: 5 }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self { level: "info".into(), format: LogFormat::Compact }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Configuration State:")?;
        write_title_1(f, "Engine")?;
        write_1(f, "Max Concurrent Probes", &self.engine.max_concurrent_probes)?;
        write_1(f, "Reconcile Interval (s)", &self.engine.reconcile_interval_secs)?;
        write_title_1(f, "Settings")?;
        write_1(f, "Checks File", &self.settings.checks_file.display())?;
        write_1(f, "Watch Interval (s)", &self.settings.watch_interval_secs)?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/vigil/config.toml
    ///  or the specified path, with the name config.toml if one does not exist.
    /// A relative checks file is resolved against the directory of the config.
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let mut config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|err| Error::ReadFailed(config_path.clone(), err))?;
            toml::from_str::<Self>(raw_string.as_str())
                .map_err(|err| Error::ParseFailed(config_path.clone(), err))?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        if config.settings.checks_file.is_relative() {
            if let Some(parent) = config_path.parent() {
                config.settings.checks_file = parent.join(&config.settings.checks_file);
            }
        }

        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::WriteFailed(path.to_path_buf(), err))?;
        }

        fs::write(path, config_str).map_err(|err| Error::WriteFailed(path.to_path_buf(), err))
    }
}
