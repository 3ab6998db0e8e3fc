//! Assertion helpers for operation bodies.
//!
//! The helpers decide which failures are transient. A value that has not
//! replicated yet is an eventual-consistency window; a value that is plain
//! wrong is a bug and must never be retried away.

use std::fmt::Debug;

use crate::error::{AssertionFailure, OperationError};

/// Fail with an assertion unless `condition` holds.
pub fn ensure(condition: bool, message: impl Into<String>) -> Result<(), OperationError> {
    if condition {
        Ok(())
    } else {
        Err(AssertionFailure::new(message).into())
    }
}

/// Fail with an assertion unless `actual == expected`.
pub fn ensure_eq<T>(actual: T, expected: T, message: impl Into<String>) -> Result<(), OperationError>
where
    T: PartialEq + Debug,
{
    if actual == expected {
        Ok(())
    } else {
        Err(AssertionFailure::mismatch(message, expected, actual).into())
    }
}

/// Check a read that is expected to converge to `expected`.
///
/// `None` means the value has not arrived yet and is transient. Any other
/// value is an assertion failure.
pub fn eventually_eq<T>(
    actual: Option<T>,
    expected: &T,
    message: impl Into<String>,
) -> Result<(), OperationError>
where
    T: PartialEq + Debug,
{
    match actual {
        Some(value) if &value == expected => Ok(()),
        Some(value) => Err(AssertionFailure::mismatch(message, expected, value).into()),
        None => Err(OperationError::transient(format!(
            "{}: value not visible yet",
            message.into()
        ))),
    }
}

/// Like [`eventually_eq`], but a value from `superseded` is also transient.
///
/// Used after overwrites, where a node may briefly still serve an older write.
pub fn eventually_latest<T>(
    actual: Option<T>,
    latest: &T,
    superseded: &[T],
    message: impl Into<String>,
) -> Result<(), OperationError>
where
    T: PartialEq + Debug,
{
    match actual {
        Some(value) if superseded.contains(&value) => Err(OperationError::transient(format!(
            "{}: still serving superseded value {:?}",
            message.into(),
            value
        ))),
        other => eventually_eq(other, latest, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_value_is_transient() {
        let err = eventually_eq(None, &1, "readback").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_wrong_value_is_assertion() {
        let err = eventually_eq(Some(2), &1, "readback").unwrap_err();
        assert_eq!(
            err,
            OperationError::Assertion(AssertionFailure::mismatch("readback", 1, 2))
        );
    }

    #[test]
    fn test_superseded_value_is_transient() {
        let old = b"v1".to_vec();
        let new = b"v2".to_vec();
        assert!(eventually_latest(Some(old.clone()), &new, &[old.clone()], "overwrite")
            .unwrap_err()
            .is_transient());
        assert!(eventually_latest(Some(new.clone()), &new, &[old], "overwrite").is_ok());
        assert!(!eventually_latest(Some(b"v3".to_vec()), &new, &[], "overwrite")
            .unwrap_err()
            .is_transient());
    }

    #[test]
    fn test_ensure() {
        assert!(ensure(true, "fine").is_ok());
        assert_eq!(
            ensure(false, "broken"),
            Err(OperationError::assertion("broken"))
        );
        assert!(ensure_eq(3, 3, "same").is_ok());
    }
}
