use std::fmt;
use std::io;

use vdp_link::LinkError;
use vdp_registry::RegistryError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Bind { source, .. }
        | LinkError::Connect { source, .. }
        | LinkError::Accept(source)
        | LinkError::Io(source) => io_error(context, source),
        LinkError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        LinkError::Closed | LinkError::UnsupportedBaudRate(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

pub fn registry_error(context: &str, err: RegistryError) -> CliError {
    match err {
        RegistryError::Link(err) => link_error(context, err),
        RegistryError::Frame(_) | RegistryError::Schema(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        RegistryError::TooManyChannels { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        RegistryError::Spawn { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
