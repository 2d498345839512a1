use std::error;
use std::fmt;

/// Convenient result type for split diff operations using [`DiffError`] as the error type.
pub type DiffResult<T> = Result<T, DiffError>;

/// Main error type for split diff operations.
///
/// [`DiffError`] can represent a single error, an error with additional detail, or several
/// aggregated errors, e.g. one per failed table diff plus a cleanup failure.
#[derive(Debug, Clone)]
pub struct DiffError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Error with kind and static description
    WithDescription(ErrorKind, &'static str),
    /// Error with kind, static description, and dynamic detail
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    /// Multiple aggregated errors
    Many(Vec<DiffError>),
}

/// Categories of errors that can occur while verifying a split.
///
/// The first group decides how the worker reacts to a failure: configuration and target
/// errors abort before anything is mutated, synchronization errors abort with compensations
/// pending, diff setup errors and discrepancies are recorded without stopping sibling diffs.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Worker Phase Errors
    ConfigurationError,
    TargetUnavailable,
    SyncReplicationError,
    DiffSetupError,
    DiscrepancyFound,
    CleanupError,

    // Remote Call Errors
    RemoteActionTimeout,
    RemoteActionFailed,
    SchemaFetchFailed,
    RowStreamFailed,

    // Workflow Errors
    DiffWorkerPanic,
    Cancelled,
    InvalidState,

    // IO & Serialization Errors
    IoError,
    SerializationError,

    // Unknown / Uncategorized
    Unknown,

    // Error kind raised by fault injection in tests.
    #[cfg(feature = "failpoints")]
    FailpointError,
}

impl DiffError {
    /// Creates a [`DiffError`] containing multiple aggregated errors.
    pub fn many(errors: Vec<DiffError>) -> DiffError {
        DiffError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattening nested aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns `true` if any of the errors is of the given kind.
    pub fn contains_kind(&self, kind: ErrorKind) -> bool {
        self.kinds().contains(&kind)
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }

    /// Combines two optional errors into one, keeping both when both are present.
    ///
    /// Used to merge the error of a run with the error of the cleanup that followed it.
    pub fn combine(first: Option<DiffError>, second: Option<DiffError>) -> Option<DiffError> {
        match (first, second) {
            (Some(first), Some(second)) => Some(DiffError::many(vec![first, second])),
            (Some(err), None) | (None, Some(err)) => Some(err),
            (None, None) => None,
        }
    }
}

impl PartialEq for DiffError {
    fn eq(&self, other: &DiffError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for DiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)
            }
            ErrorRepr::Many(ref errors) => {
                if errors.is_empty() {
                    write!(f, "Multiple errors occurred (empty)")?;
                } else if errors.len() == 1 {
                    errors[0].fmt(f)?;
                } else {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl error::Error for DiffError {}

impl From<(ErrorKind, &'static str)> for DiffError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> DiffError {
        DiffError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for DiffError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> DiffError {
        DiffError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl<E> From<Vec<E>> for DiffError
where
    E: Into<DiffError>,
{
    fn from(errors: Vec<E>) -> DiffError {
        DiffError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

impl From<std::io::Error> for DiffError {
    fn from(err: std::io::Error) -> DiffError {
        DiffError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "I/O error occurred",
                err.to_string(),
            ),
        }
    }
}

impl From<serde_json::Error> for DiffError {
    fn from(err: serde_json::Error) -> DiffError {
        DiffError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::SerializationError,
                "JSON serialization failed",
                err.to_string(),
            ),
        }
    }
}

impl From<splitdiff_config::shared::ValidationError> for DiffError {
    fn from(err: splitdiff_config::shared::ValidationError) -> DiffError {
        DiffError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConfigurationError,
                "Invalid diff configuration",
                err.to_string(),
            ),
        }
    }
}

/// Converts a failed task join into a [`ErrorKind::DiffWorkerPanic`] error.
impl From<tokio::task::JoinError> for DiffError {
    fn from(err: tokio::task::JoinError) -> DiffError {
        DiffError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::DiffWorkerPanic,
                "A table diff task panicked or was aborted",
                err.to_string(),
            ),
        }
    }
}

/// Converts a closed diff permit pool into an [`ErrorKind::InvalidState`] error.
impl From<tokio::sync::AcquireError> for DiffError {
    fn from(err: tokio::sync::AcquireError) -> DiffError {
        DiffError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::InvalidState,
                "Failed to acquire a table diff permit",
                err.to_string(),
            ),
        }
    }
}
