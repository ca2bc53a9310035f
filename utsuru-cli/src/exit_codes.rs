//! Exit codes following sysexits.h conventions.

use utsuru_core::UtsuruError;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Unsupported or corrupt image data.
/// Maps to EX_DATAERR from sysexits.h.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input file or directory.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// I/O error while processing input.
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Missing or invalid configuration (similarity threshold, index strategy).
/// Maps to EX_CONFIG from sysexits.h.
pub const CONFIG_ERROR: i32 = 78;

/// Represents an exit code with optional error context.
#[derive(Debug)]
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Typed errors from the core first, then the context strings set by
        // the commands.
        let core = err.chain().find_map(|e| e.downcast_ref::<UtsuruError>());
        let code = match core {
            Some(e) if e.is_configuration() => CONFIG_ERROR,
            Some(UtsuruError::InvalidThreshold(_)) => CONFIG_ERROR,
            Some(e) if e.is_user_input() => DATA_ERROR,
            _ if message.contains("Failed to read") => {
                let missing = err
                    .chain()
                    .filter_map(|e| e.downcast_ref::<std::io::Error>())
                    .any(|e| e.kind() == std::io::ErrorKind::NotFound);
                if missing {
                    INPUT_ERROR
                } else {
                    IO_ERROR
                }
            }
            _ => GENERAL_ERROR,
        };

        Self {
            code,
            message: Some(message),
        }
    }
}
