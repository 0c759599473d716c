//! Error types for the music toolkit

use std::fmt;
use std::path::{Path, PathBuf};

/// Error type shared by every toolkit operation
#[derive(Debug, Clone)]
pub enum ToolkitError {
    /// E001: Input file does not exist
    InputNotFound(PathBuf),
    /// E002: External command failed to start, exited non-zero, or produced no output
    ExternalTool { tool: String, message: String },
    /// E003: Audio could not be decoded
    AudioDecode(String),
    /// E004: Audio could not be encoded or written
    AudioEncode(String),
    /// E005: MIDI file could not be parsed
    MidiParse(String),
    /// E006: MIDI file could not be written
    MidiWrite(String),
    /// E007: Notation document could not be parsed
    NotationParse(String),
    /// E008: Notation document could not be written
    NotationWrite(String),
    /// E009: Filesystem error
    Io(String),
    /// E010: Invalid argument passed to an operation
    InvalidArgument(String),
    /// E011: Configuration validation failed
    ConfigValidation(String),
    /// E012: Plot rendering failed
    Visualization(String),
    /// E013: Score analysis failed
    Analysis(String),
}

impl ToolkitError {
    /// Shorthand for an external tool failure
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolkitError::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Short error code, e.g. `E001`
    pub fn code(&self) -> &'static str {
        match self {
            ToolkitError::InputNotFound(_) => "E001",
            ToolkitError::ExternalTool { .. } => "E002",
            ToolkitError::AudioDecode(_) => "E003",
            ToolkitError::AudioEncode(_) => "E004",
            ToolkitError::MidiParse(_) => "E005",
            ToolkitError::MidiWrite(_) => "E006",
            ToolkitError::NotationParse(_) => "E007",
            ToolkitError::NotationWrite(_) => "E008",
            ToolkitError::Io(_) => "E009",
            ToolkitError::InvalidArgument(_) => "E010",
            ToolkitError::ConfigValidation(_) => "E011",
            ToolkitError::Visualization(_) => "E012",
            ToolkitError::Analysis(_) => "E013",
        }
    }
}

impl fmt::Display for ToolkitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        match self {
            ToolkitError::InputNotFound(path) => {
                write!(f, "{}: Input file {} does not exist", code, path.display())
            }
            ToolkitError::ExternalTool { tool, message } => {
                write!(f, "{}: Error running {} - {}", code, tool, message)
            }
            ToolkitError::AudioDecode(msg) => write!(f, "{}: Audio decode error - {}", code, msg),
            ToolkitError::AudioEncode(msg) => write!(f, "{}: Audio encode error - {}", code, msg),
            ToolkitError::MidiParse(msg) => write!(f, "{}: MIDI parse error - {}", code, msg),
            ToolkitError::MidiWrite(msg) => write!(f, "{}: MIDI write error - {}", code, msg),
            ToolkitError::NotationParse(msg) => {
                write!(f, "{}: Notation parse error - {}", code, msg)
            }
            ToolkitError::NotationWrite(msg) => {
                write!(f, "{}: Notation write error - {}", code, msg)
            }
            ToolkitError::Io(msg) => write!(f, "{}: File I/O error - {}", code, msg),
            ToolkitError::InvalidArgument(msg) => write!(f, "{}: Invalid argument - {}", code, msg),
            ToolkitError::ConfigValidation(msg) => {
                write!(f, "{}: Configuration validation failed - {}", code, msg)
            }
            ToolkitError::Visualization(msg) => {
                write!(f, "{}: Visualization error - {}", code, msg)
            }
            ToolkitError::Analysis(msg) => write!(f, "{}: Analysis error - {}", code, msg),
        }
    }
}

impl std::error::Error for ToolkitError {}

impl From<std::io::Error> for ToolkitError {
    fn from(err: std::io::Error) -> Self {
        ToolkitError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ToolkitError {
    fn from(err: serde_json::Error) -> Self {
        ToolkitError::Io(format!("JSON serialization error: {}", err))
    }
}

impl From<hound::Error> for ToolkitError {
    fn from(err: hound::Error) -> Self {
        ToolkitError::AudioDecode(err.to_string())
    }
}

impl From<anyhow::Error> for ToolkitError {
    fn from(err: anyhow::Error) -> Self {
        ToolkitError::ConfigValidation(err.to_string())
    }
}

/// Fail with `InputNotFound` unless `path` exists
pub fn require_input(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ToolkitError::InputNotFound(path.to_path_buf()))
    }
}

/// Result type alias for toolkit operations
pub type Result<T> = std::result::Result<T, ToolkitError>;
