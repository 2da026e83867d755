//! Screen capture through a platform screenshot utility.

use std::fs;
use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use scribe_types::ContentPart;
use tokio::process::Command;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::ToolError;
use crate::process::run_with_timeout;

/// Placeholder in a capture argv replaced by the output file path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Upper bound on waiting for the capture utility.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(15);

pub trait CaptureSource {
    /// Take a screenshot and return it as an image part.
    fn capture(&mut self) -> Result<ContentPart, ToolError>;
}

/// Screenshot command for the current platform, if one is known.
#[must_use]
pub fn default_capture_command() -> Option<Vec<String>> {
    let argv: &[&str] = if cfg!(target_os = "macos") {
        &["screencapture", "-x", "-t", "jpg", OUTPUT_PLACEHOLDER]
    } else if cfg!(windows) {
        return None;
    } else {
        &["gnome-screenshot", "-f", OUTPUT_PLACEHOLDER]
    };
    Some(argv.iter().map(ToString::to_string).collect())
}

/// [`CaptureSource`] that runs an external command writing an image file.
pub struct CommandCapture {
    argv: Vec<String>,
    extension: String,
    timeout: Duration,
    runtime: Runtime,
}

impl CommandCapture {
    /// `argv` must contain [`OUTPUT_PLACEHOLDER`] where the image path goes.
    pub fn new(argv: Vec<String>, extension: &str) -> Result<Self, ToolError> {
        if argv.is_empty() || !argv.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER)) {
            return Err(ToolError::BadArgs {
                message: format!("capture command must include {OUTPUT_PLACEHOLDER}"),
            });
        }
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool: "screen capture".to_string(),
                message: format!("failed to start runtime: {e}"),
            })?;
        Ok(Self {
            argv,
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
            timeout: DEFAULT_CAPTURE_TIMEOUT,
            runtime,
        })
    }

    /// Platform default, or [`ToolError::Unsupported`] where none is known.
    pub fn platform_default() -> Result<Self, ToolError> {
        let argv = default_capture_command().ok_or_else(|| {
            ToolError::Unsupported("Screen capture is not supported on this platform.".to_string())
        })?;
        let extension = if cfg!(target_os = "macos") { "jpg" } else { "png" };
        Self::new(argv, extension)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl CaptureSource for CommandCapture {
    fn capture(&mut self) -> Result<ContentPart, ToolError> {
        let file = tempfile::Builder::new()
            .prefix("scribe-capture-")
            .suffix(&format!(".{}", self.extension))
            .tempfile()
            .map_err(|e| ToolError::ExecutionFailed {
                tool: "screen capture".to_string(),
                message: format!("failed to create temp file: {e}"),
            })?;
        let output_path = file.path().to_string_lossy().into_owned();
        let argv: Vec<String> = self
            .argv
            .iter()
            .map(|a| a.replace(OUTPUT_PLACEHOLDER, &output_path))
            .collect();
        let Some((program, args)) = argv.split_first() else {
            return Err(ToolError::BadArgs {
                message: "capture command is empty".to_string(),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        let cwd = file
            .path()
            .parent()
            .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf);
        debug!(program, "Starting screen capture");
        let output = self.runtime.block_on(run_with_timeout(
            "screen capture",
            cmd,
            &cwd,
            self.timeout,
        ))?;
        if !output.success() {
            return Err(ToolError::ExecutionFailed {
                tool: "screen capture".to_string(),
                message: format!(
                    "{program} exited with {:?}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
            });
        }

        let bytes = fs::read(file.path()).map_err(|e| ToolError::ExecutionFailed {
            tool: "screen capture".to_string(),
            message: format!("failed to read capture: {e}"),
        })?;
        if bytes.is_empty() {
            return Err(ToolError::ExecutionFailed {
                tool: "screen capture".to_string(),
                message: "capture produced an empty image".to_string(),
            });
        }
        info!(bytes = bytes.len(), "Screen captured");
        Ok(ContentPart::Image {
            mime_type: mime_for_extension(&self.extension).to_string(),
            data_base64: STANDARD.encode(bytes),
        })
    }
}

fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_without_placeholder_is_rejected() {
        let err = CommandCapture::new(vec!["true".to_string()], "png").err();
        assert!(matches!(err, Some(ToolError::BadArgs { .. })));
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for_extension("jpg"), "image/jpeg");
        assert_eq!(mime_for_extension("png"), "image/png");
    }

    #[cfg(unix)]
    #[test]
    fn captured_file_is_base64_encoded() {
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            "printf 'img' > \"{output}\"".to_string(),
        ];
        let mut capture = CommandCapture::new(argv, ".JPG").expect("capture");
        let part = capture.capture().expect("captured");
        assert_eq!(
            part,
            ContentPart::Image {
                mime_type: "image/jpeg".to_string(),
                data_base64: "aW1n".to_string(),
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_utility_is_reported() {
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo denied >&2; exit 1 # {output}".to_string(),
        ];
        let mut capture = CommandCapture::new(argv, "png").expect("capture");
        let err = capture.capture().expect_err("fails");
        assert!(err.to_string().contains("denied"));
    }

    #[cfg(unix)]
    #[test]
    fn hung_utility_times_out() {
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            "sleep 5 # {output}".to_string(),
        ];
        let mut capture = CommandCapture::new(argv, "png")
            .expect("capture")
            .with_timeout(Duration::from_millis(100));
        assert!(capture.capture().expect_err("times out").is_timeout());
    }
}
