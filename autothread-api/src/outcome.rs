//! # Outcomes
//!
//! `Outcome` carries *expected* failures: capacity exceeded, a routine that
//! failed, a hook that failed, a unit that could not be posted to. Protocol
//! violations are never expressed as an `Outcome`; they travel on the
//! `Err` side of a `Result` instead (see [`crate::errors::ProtocolError`]).
//!
//! On the wire an outcome is encoded as `{ ok: true, value }` or
//! `{ ok: false, error }`.

use crate::value::Value;

/// Tagged success/failure for expected outcomes.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Outcome<T, E = String> {
    Ok(T),
    Fail(E),
}

impl<T, E> Outcome<T, E> {
    pub fn ok(value: T) -> Self {
        Outcome::Ok(value)
    }

    pub fn fail(error: impl Into<E>) -> Self {
        Outcome::Fail(error.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn is_fail(&self) -> bool {
        !self.is_ok()
    }

    pub fn as_ref(&self) -> Outcome<&T, &E> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(v),
            Outcome::Fail(e) => Outcome::Fail(e),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U, E> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(f(v)),
            Outcome::Fail(e) => Outcome::Fail(e),
        }
    }

    pub fn map_fail<F>(self, f: impl FnOnce(E) -> F) -> Outcome<T, F> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(v),
            Outcome::Fail(e) => Outcome::Fail(f(e)),
        }
    }

    /// Returns the failure, if any.
    pub fn failure(&self) -> Option<&E> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Fail(e) => Some(e),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        self.into()
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Outcome::Ok(v),
            Err(e) => Outcome::Fail(e),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for Result<T, E> {
    fn from(outcome: Outcome<T, E>) -> Self {
        match outcome {
            Outcome::Ok(v) => Ok(v),
            Outcome::Fail(e) => Err(e),
        }
    }
}

impl From<Outcome<Value>> for Value {
    fn from(outcome: Outcome<Value>) -> Self {
        match outcome {
            Outcome::Ok(value) => Value::object([("ok", Value::Bool(true)), ("value", value)]),
            Outcome::Fail(error) => Value::object([("ok", Value::Bool(false)), ("error", Value::String(error))]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_round_trip() {
        let outcome: Outcome<u32> = Ok::<u32, String>(3).into();
        assert_eq!(outcome, Outcome::Ok(3));
        assert_eq!(Outcome::<u32>::fail("nope").into_result(), Err("nope".to_string()));
    }

    #[test]
    fn test_wire_shape() {
        let encoded = Value::from(Outcome::<Value>::fail("boom"));
        assert_eq!(encoded.get("ok"), Some(&Value::Bool(false)));
        assert_eq!(encoded.get("error").and_then(Value::as_str), Some("boom"));
        assert!(encoded.get("value").is_none());
    }
}
