//! Small helpers shared across the crate.

/// Returns early with an error if a condition is not met.
///
/// This is similar to `assert!`, but returns the error instead of panicking.
///
/// ```ignore
/// ensure!(header_count <= max_headers, ParseError::too_many_headers(max_headers));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
