use alloc::borrow::Cow;

/// All possible error kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A storage gateway operation failed.
    Storage,
    /// A network collaborator failed.
    Network,
    /// A sensor could not be sampled.
    Sensor,
    /// A configuration value is invalid.
    Config,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::Storage => "Storage",
            Self::Network => "Network",
            Self::Sensor => "Sensor",
            Self::Config => "Configuration",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.description())
    }
}

/// A `vigil` error.
#[derive(Debug, Clone, PartialEq, Eq)]
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

    /// Creates a [`ErrorKind::Storage`] error.
    pub fn storage(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Storage, description)
    }

    /// Creates a [`ErrorKind::Network`] error.
    pub fn network(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Network, description)
    }

    /// Creates a [`ErrorKind::Sensor`] error.
    pub fn sensor(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Sensor, description)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl core::error::Error for Error {}

/// A specialized [`Result`](core::result::Result) type for `vigil`.
pub type Result<T> = core::result::Result<T, Error>;
