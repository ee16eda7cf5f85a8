//! Build configuration.
//!
//! # Storage layout
//!
//! ```text
//! <root>/
//!   sassline.yaml   (optional: every key has a default)
//! ```
//!
//! All path fields use `PathBuf` and are interpreted relative to the project
//! root; use [`BuildConfig::resolve`] to turn one into an absolute path.
//! The loaded value is immutable for the lifetime of the process.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name looked up in the project root.
pub const CONFIG_FILE: &str = "sassline.yaml";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// CSS output formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    #[default]
    Compressed,
    Expanded,
}

impl fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStyle::Compressed => write!(f, "compressed"),
            OutputStyle::Expanded => write!(f, "expanded"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config sections
// ---------------------------------------------------------------------------

/// Stylesheet entry points, the recompile trigger glob and the output folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcePaths {
    /// Left-to-right entry point.
    pub ltr: PathBuf,
    /// Right-to-left entry point.
    pub rtl: PathBuf,
    /// Glob over the whole stylesheet tree. Only triggers recompilation.
    pub watch: String,
    pub output_folder: PathBuf,
    pub output_style: OutputStyle,
    pub source_maps: bool,
}

impl Default for SourcePaths {
    fn default() -> Self {
        Self {
            ltr: PathBuf::from("sass/app.scss"),
            rtl: PathBuf::from("sass/app.rtl.scss"),
            watch: "sass/**/**".to_string(),
            output_folder: PathBuf::from("css"),
            output_style: OutputStyle::Compressed,
            source_maps: true,
        }
    }
}

impl SourcePaths {
    /// Both entry points in compile order.
    pub fn entry_points(&self) -> [&Path; 2] {
        [self.ltr.as_path(), self.rtl.as_path()]
    }
}

/// Glob describing the markup files pushed by the `html` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HtmlSources(pub String);

impl Default for HtmlSources {
    fn default() -> Self {
        Self("*.html".to_string())
    }
}

impl fmt::Display for HtmlSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Development server settings used by `serve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub base_dir: PathBuf,
    pub host: String,
    /// `0` binds an ephemeral port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Filesystem watcher tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

// ---------------------------------------------------------------------------
// BuildConfig
// ---------------------------------------------------------------------------

/// Root configuration value, injected into every task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub sass: SourcePaths,
    pub html: HtmlSources,
    pub server: ServerConfig,
    pub watch: WatchConfig,
}

impl BuildConfig {
    /// `<root>/sassline.yaml`: pure, no I/O.
    pub fn path_at(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE)
    }

    /// Load the config for a project root.
    ///
    /// A missing file yields [`BuildConfig::default`]; a malformed one is a
    /// [`ConfigError::Parse`] naming the file.
    pub fn load_at(root: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_at(root);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        Self::from_yaml(&raw, &path)
    }

    /// Parse and validate YAML text; `origin` is only used in error messages.
    pub fn from_yaml(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        // An empty file deserializes to `null`, which we treat as "all defaults".
        let config: Self = if raw.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let paths = [
            ("sass.ltr", &self.sass.ltr),
            ("sass.rtl", &self.sass.rtl),
            ("sass.output_folder", &self.sass.output_folder),
            ("server.base_dir", &self.server.base_dir),
        ];
        for (field, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "path must not be empty".to_string(),
                });
            }
        }
        if self.sass.watch.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "sass.watch",
                reason: "glob must not be empty".to_string(),
            });
        }
        if self.html.0.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "html",
                reason: "glob must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Join a configured path onto the project root (absolute paths pass through).
    pub fn resolve(root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }

    /// `host:port` string handed to the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_stock_project_layout() {
        let config = BuildConfig::default();
        assert_eq!(config.sass.ltr, PathBuf::from("sass/app.scss"));
        assert_eq!(config.sass.rtl, PathBuf::from("sass/app.rtl.scss"));
        assert_eq!(config.sass.watch, "sass/**/**");
        assert_eq!(config.sass.output_folder, PathBuf::from("css"));
        assert_eq!(config.sass.output_style, OutputStyle::Compressed);
        assert!(config.sass.source_maps);
        assert_eq!(config.html.0, "*.html");
        assert_eq!(config.server.base_dir, PathBuf::from("."));
        assert_eq!(config.listen_addr(), "127.0.0.1:3000");
    }

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_keys() {
        let raw = "sass:\n  output_folder: public/css\nserver:\n  port: 8080\n";
        let config = BuildConfig::from_yaml(raw, Path::new("sassline.yaml")).expect("parse");
        assert_eq!(config.sass.output_folder, PathBuf::from("public/css"));
        assert_eq!(config.sass.ltr, PathBuf::from("sass/app.scss"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = BuildConfig::from_yaml("  \n", Path::new("sassline.yaml")).expect("parse");
        assert_eq!(config, BuildConfig::default());
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let root = Path::new("/project");
        assert_eq!(
            BuildConfig::resolve(root, Path::new("css")),
            PathBuf::from("/project/css")
        );
        assert_eq!(
            BuildConfig::resolve(root, Path::new("/elsewhere/css")),
            PathBuf::from("/elsewhere/css")
        );
    }
}
