//! Macros for split diff error handling.

/// Creates a [`crate::error::DiffError`] from error kind, description and optional detail.
#[macro_export]
macro_rules! diff_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::DiffError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::DiffError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates a [`crate::error::DiffError`] and returns it from the current function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::diff_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::diff_error!($kind, $desc, $detail))
    };
}
