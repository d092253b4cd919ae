//! Process exit codes
//!
//! Per-file failures during a sync are reported in the summary and never
//! change the exit code. Only problems that stop a run from starting, or an
//! aborted local walk, do.

use upsync_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Bad flags or configuration
    UsageError = 2,
    NetworkError = 3,
    AuthError = 4,
    NotFound = 5,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Exit code for an error that prevented a run
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::NotFound(_) => ExitCode::NotFound,
            Error::Network(_) => ExitCode::NetworkError,
            Error::Auth(_) => ExitCode::AuthError,
            Error::Config(_) | Error::InvalidPath(_) => ExitCode::UsageError,
            Error::Io(_) | Error::Walk(_) | Error::General(_) => ExitCode::GeneralError,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::UsageError.as_i32(), 2);
        assert_eq!(ExitCode::NotFound.as_i32(), 5);
    }

    #[test]
    fn test_from_error() {
        assert_eq!(
            ExitCode::from_error(&Error::Config("bucket is required".to_string())),
            ExitCode::UsageError
        );
        assert_eq!(
            ExitCode::from_error(&Error::Auth("denied".to_string())),
            ExitCode::AuthError
        );
        assert_eq!(
            ExitCode::from_error(&Error::Network("timeout".to_string())),
            ExitCode::NetworkError
        );
    }
}
