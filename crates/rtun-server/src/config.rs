//! Server configuration: TOML file + CLI overrides.

use rtun_core::RtunResult;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Capacity, in bytes, of each tunnel's `rio`/`wio` buffer. Exceeding it
    /// on `append` tears the tunnel down (`spec.md` §4.3's backpressure
    /// point). Neither capacity nor threshold is pinned by the spec; this
    /// default is recorded as an Open Question resolution in `DESIGN.md`.
    #[serde(default = "default_buffer_cap")]
    pub buffer_cap: usize,
    /// Default address-family preference for outbound `CONN` requests that
    /// do not pin one (`spec.md` §4.4).
    #[serde(default = "default_af_preference")]
    pub af_preference: String,
    /// Maximum number of `DATA` records the dispatcher emits per call to
    /// `forward`, bounding how much of one tunnel's backlog can starve
    /// others in a single reactor iteration (`spec.md` §4.5).
    #[serde(default = "default_forward_chunk")]
    pub forward_chunk: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            buffer_cap: default_buffer_cap(),
            af_preference: default_af_preference(),
            forward_chunk: default_forward_chunk(),
        }
    }
}

fn default_buffer_cap() -> usize {
    256 * 1024
}
fn default_af_preference() -> String {
    "any".to_string()
}
fn default_forward_chunk() -> usize {
    16 * 1024
}

/// Resolved server configuration (CLI overrides applied over TOML/defaults).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub buffer_cap: usize,
    pub af_preference: String,
    pub forward_chunk: usize,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file, then apply CLI
    /// overrides. A missing file is not an error — defaults are used.
    pub fn load(config_path: Option<&Path>, cli_buffer_cap: Option<usize>) -> RtunResult<Self> {
        let file_config = match config_path {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "loading config file");
                let content = std::fs::read_to_string(path)?;
                toml::from_str::<ConfigFile>(&content)
                    .unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "config parse error, using defaults");
                        ConfigFile::default()
                    })
            }
            Some(path) => {
                info!(path = %path.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
            None => ConfigFile::default(),
        };

        Ok(Self {
            buffer_cap: cli_buffer_cap.unwrap_or(file_config.server.buffer_cap),
            af_preference: file_config.server.af_preference,
            forward_chunk: file_config.server.forward_chunk,
        })
    }
}
