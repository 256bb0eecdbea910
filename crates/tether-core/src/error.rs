use std::fmt;

/// Machine-readable error codes for operator and pipeline decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    MissingIdentifier,
    MissingDependency,
    EntityNotFound,
    CollectorFailed,
    CacheCorrupted,
    CacheIoFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::MissingIdentifier => "E2001",
            Self::MissingDependency => "E2002",
            Self::EntityNotFound => "E2003",
            Self::CollectorFailed => "E2004",
            Self::CacheCorrupted => "E3001",
            Self::CacheIoFailed => "E3002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::MissingIdentifier => "Entity has no portable identifier",
            Self::MissingDependency => "Dependency absent from stack and cache",
            Self::EntityNotFound => "Entity not found in storage",
            Self::CollectorFailed => "Dependency collector failed",
            Self::CacheCorrupted => "Corrupt dependency cache entry",
            Self::CacheIoFailed => "Dependency cache I/O failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .tether/config.toml and retry."),
            Self::MissingIdentifier => {
                Some("Assign the entity a uuid before calculating dependencies.")
            }
            // Recoverable: the calculator recomputes the affected closure.
            Self::MissingDependency => None,
            Self::EntityNotFound => Some("The entity was deleted mid-run; re-run the calculation."),
            Self::CollectorFailed => None,
            Self::CacheCorrupted => Some("Run `tether cache clear` to rebuild the cache."),
            Self::CacheIoFailed => Some("Check cache path permissions and disk space."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
