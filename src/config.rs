use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use encode_bus::{Codec, ContainerFormat, EncodingSettings};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Raw,
    Ffmpeg,
}

/// Synthetic capture source feeding the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SourceConfig {
    /// Nominal capture rate; the real interval is jittered around it.
    pub fps: f64,
    pub jitter_ms: u64,
    /// Stops by itself after this long; 0 runs until ctrl-c.
    pub duration_secs: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            fps: 24.0,
            jitter_ms: 15,
            duration_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecorderConfig {
    pub output: String,
    pub backend: BackendKind,
    pub encoding: EncodingSettings,
    pub source: SourceConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output: "recording.rgba".to_string(),
            backend: BackendKind::Raw,
            encoding: EncodingSettings {
                width: 320,
                height: 240,
                codec: Codec::Raw,
                format: ContainerFormat::Raw,
                frame_rate: 30,
                ..Default::default()
            },
            source: SourceConfig::default(),
        }
    }
}

impl RecorderConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse config {}", path.display()))
    }
}

/// Process wide configuration, read from the JSON file named by the first
/// command line argument. Defaults apply when no argument is given.
pub fn config() -> &'static RecorderConfig {
    static CONFIG: LazyLock<RecorderConfig> = LazyLock::new(|| match std::env::args().nth(1) {
        Some(path) => RecorderConfig::load(Path::new(&path)).unwrap_or_else(|e| {
            eprintln!("Error loading config: {:#}", e);
            std::process::exit(1);
        }),
        None => RecorderConfig::default(),
    });
    &CONFIG
}
