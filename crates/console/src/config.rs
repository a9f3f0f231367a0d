use std::path::PathBuf;
use std::time::Duration;

use vigil_core::geometry::Size;
use vigil_core::selection::OperatorSelection;

/// Console configuration loaded from environment variables.
///
/// Every field has a default suitable for a backend running locally.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// HTTP base URL of the backend (registry + session control).
    pub backend_url: String,
    /// WebSocket URL of the live detection stream.
    pub stream_url: String,
    /// Pause between session stop and start during reconciliation.
    pub settle_delay: Duration,
    /// Consecutive reconnect attempts before the transport gives up.
    pub reconnect_max_attempts: u32,
    /// Detector resolution assumed when a frame does not report one.
    pub source_size: Size,
    /// Size of the headless overlay surface.
    pub display_size: Size,
    /// Operator selection applied at startup.
    pub selection: OperatorSelection,
    /// Where to write rendered overlay snapshots, if anywhere.
    pub snapshot_path: Option<PathBuf>,
    /// Font used for raster label text.
    pub overlay_font: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl ConsoleConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                        | Default                          |
    /// |--------------------------------|----------------------------------|
    /// | `VIGIL_BACKEND_URL`            | `http://localhost:8000`          |
    /// | `VIGIL_STREAM_URL`             | backend URL as `ws(s)://…/ws/live` |
    /// | `VIGIL_SETTLE_DELAY_MS`        | `300`                            |
    /// | `VIGIL_RECONNECT_MAX_ATTEMPTS` | `5`                              |
    /// | `VIGIL_SOURCE_WIDTH`           | `1280`                           |
    /// | `VIGIL_SOURCE_HEIGHT`          | `720`                            |
    /// | `VIGIL_DISPLAY_WIDTH`          | `1280`                           |
    /// | `VIGIL_DISPLAY_HEIGHT`         | `720`                            |
    /// | `VIGIL_SELECTION`              | empty                            |
    /// | `VIGIL_SNAPSHOT_PATH`          | unset                            |
    /// | `VIGIL_OVERLAY_FONT`           | unset                            |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend_url = var("VIGIL_BACKEND_URL").unwrap_or_else(|| "http://localhost:8000".into());
        let stream_url = match var("VIGIL_STREAM_URL") {
            Some(url) => url,
            None => derive_stream_url(&backend_url)?,
        };

        let settle_ms: u64 = parse_or(var("VIGIL_SETTLE_DELAY_MS"), "VIGIL_SETTLE_DELAY_MS", 300)?;
        let reconnect_max_attempts: u32 = parse_or(
            var("VIGIL_RECONNECT_MAX_ATTEMPTS"),
            "VIGIL_RECONNECT_MAX_ATTEMPTS",
            5,
        )?;

        let source_size = Size::new(
            dimension(var("VIGIL_SOURCE_WIDTH"), "VIGIL_SOURCE_WIDTH", 1280)?,
            dimension(var("VIGIL_SOURCE_HEIGHT"), "VIGIL_SOURCE_HEIGHT", 720)?,
        );
        let display_size = Size::new(
            dimension(var("VIGIL_DISPLAY_WIDTH"), "VIGIL_DISPLAY_WIDTH", 1280)?,
            dimension(var("VIGIL_DISPLAY_HEIGHT"), "VIGIL_DISPLAY_HEIGHT", 720)?,
        );

        let selection = match var("VIGIL_SELECTION") {
            Some(raw) => parse_selection(&raw)?,
            None => OperatorSelection::new(),
        };

        Ok(Self {
            backend_url,
            stream_url,
            settle_delay: Duration::from_millis(settle_ms),
            reconnect_max_attempts,
            source_size,
            display_size,
            selection,
            snapshot_path: var("VIGIL_SNAPSHOT_PATH").map(PathBuf::from),
            overlay_font: var("VIGIL_OVERLAY_FONT").map(PathBuf::from),
        })
    }
}

/// `http://host:port/base` becomes `ws://host:port/base/ws/live`.
fn derive_stream_url(backend_url: &str) -> Result<String, ConfigError> {
    let (scheme, rest) = if let Some(rest) = backend_url.strip_prefix("https://") {
        ("wss://", rest)
    } else if let Some(rest) = backend_url.strip_prefix("http://") {
        ("ws://", rest)
    } else {
        return Err(ConfigError::Invalid {
            var: "VIGIL_BACKEND_URL",
            expected: "an http:// or https:// URL",
            value: backend_url.to_string(),
        });
    };
    Ok(format!("{scheme}{}/ws/live", rest.trim_end_matches('/')))
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            var,
            expected: "a non-negative integer",
            value: raw,
        }),
    }
}

fn dimension(value: Option<String>, var: &'static str, default: u32) -> Result<f64, ConfigError> {
    let px: u32 = parse_or(value, var, default)?;
    if px == 0 {
        return Err(ConfigError::Invalid {
            var,
            expected: "a positive pixel count",
            value: "0".into(),
        });
    }
    Ok(f64::from(px))
}

/// Parse `model:cls,cls;model2:cls` into a selection.
///
/// A model with no classes (`model` or `model:`) is selected with an
/// empty class set.
pub fn parse_selection(raw: &str) -> Result<OperatorSelection, ConfigError> {
    let mut selection = OperatorSelection::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (model, classes) = entry.split_once(':').unwrap_or((entry, ""));
        let model = model.trim();
        if model.is_empty() {
            return Err(ConfigError::Invalid {
                var: "VIGIL_SELECTION",
                expected: "entries of the form model:cls,cls",
                value: raw.to_string(),
            });
        }
        selection.set_model_selected(model, true);
        let classes: Vec<&str> = classes
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if let Err(e) = selection.set_model_classes(model, classes) {
            return Err(ConfigError::Invalid {
                var: "VIGIL_SELECTION",
                expected: "entries of the form model:cls,cls",
                value: e.to_string(),
            });
        }
    }
    Ok(selection)
}
