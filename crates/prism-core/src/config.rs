// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub log: LogCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: 800,
            height: 600,
            title: "prism".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub validation: bool,
    pub stale_swapchain: StalePolicyCfg,
    pub present_wait_idle: bool,
    pub vertex_shader: Option<PathBuf>,
    pub fragment_shader: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            validation: cfg!(debug_assertions),
            stale_swapchain: StalePolicyCfg::default(),
            present_wait_idle: false,
            vertex_shader: None,
            fragment_shader: None,
        }
    }
}

/// What the frame loop does when acquire/present report a stale swapchain.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicyCfg {
    #[default]
    Rebuild,
    Ignore,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogCfg {
    pub filter: String,
}

impl Default for LogCfg {
    fn default() -> Self {
        LogCfg {
            filter: "info".to_owned(),
        }
    }
}

impl AppCfg {
    pub fn from_toml_str(src: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(src).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load `path`. A missing file is not an error and yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(s) => {
                debug!("config: {}", path.display());
                Self::from_toml_str(&s, path)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("config: {} not found, using defaults", path.display());
                Ok(AppCfg::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<AppCfg, ConfigError> {
        AppCfg::from_toml_str(src, Path::new("test.toml"))
    }

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert_eq!(cfg.window.width, 800);
        assert_eq!(cfg.window.height, 600);
        assert_eq!(cfg.render.validation, cfg!(debug_assertions));
        assert_eq!(cfg.render.stale_swapchain, StalePolicyCfg::Rebuild);
        assert!(!cfg.render.present_wait_idle);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = parse(
            r#"
            [window]
            title = "tri"

            [render]
            stale_swapchain = "ignore"
            vertex_shader = "shaders/a.spv"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.title, "tri");
        assert_eq!(cfg.window.width, 800);
        assert_eq!(cfg.render.stale_swapchain, StalePolicyCfg::Ignore);
        assert_eq!(
            cfg.render.vertex_shader.as_deref(),
            Some(Path::new("shaders/a.spv"))
        );
        assert!(cfg.render.fragment_shader.is_none());
        assert_eq!(cfg.log.filter, "info");
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = parse("[render]\nstale_swapchain = \"sometimes\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = AppCfg::load(Path::new("definitely/not/here/prism.toml")).unwrap();
        assert_eq!(cfg, AppCfg::default());
    }
}
