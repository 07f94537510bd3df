use std::borrow::Cow;

/// All possible error kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An I/O operation failed.
    Io,
    /// The configuration cannot be loaded.
    Config,
    /// The service cannot be advertised.
    Mdns,
    /// A scheduler core cannot be started.
    Scheduler,
    /// A core component failed.
    Core,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::Io => "Input/Output",
            Self::Config => "Configuration",
            Self::Mdns => "Mdns",
            Self::Scheduler => "Scheduler",
            Self::Core => "Core",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// A `vigil-os` error.
#[derive(Debug, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::new(ErrorKind::Config, e.to_string())
    }
}

impl From<mdns_sd::Error> for Error {
    fn from(e: mdns_sd::Error) -> Self {
        Self::new(ErrorKind::Mdns, e.to_string())
    }
}

impl From<vigil::error::Error> for Error {
    fn from(e: vigil::error::Error) -> Self {
        Self::new(ErrorKind::Core, e.to_string())
    }
}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

// Converts a host I/O error into the error type of the core collaborators.
pub(crate) fn storage_error(e: &std::io::Error) -> vigil::error::Error {
    vigil::error::Error::storage(e.to_string())
}

pub(crate) fn network_error(e: &std::io::Error) -> vigil::error::Error {
    vigil::error::Error::network(e.to_string())
}

pub(crate) fn sensor_error(e: &std::io::Error) -> vigil::error::Error {
    vigil::error::Error::sensor(e.to_string())
}
