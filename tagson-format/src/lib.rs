//! Tagson Format - Core primitives for typed JSON
//!
//! This crate provides the building blocks shared by the Tagson engine, with
//! no knowledge of the type registry:
//!
//! - Reserved names and markers
//! - The value graph model (shared, possibly cyclic containers)
//! - Keypath escaping and resolution
//! - Value classification
//! - Deferred values
//! - Error types
//! - Walk limits

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod constants;
pub mod deferred;
pub mod error;
pub mod keypath;
pub mod limits;
pub mod value;

// Re-export commonly used types
pub use classify::Kind;
pub use deferred::{is_deferred, Deferred, DeferredState, Resolver};
pub use error::{Result, Shape, TagsonError};
pub use limits::Limits;
pub use value::{ArrayRef, Class, ObjectRef, Prototype, Value};

/// Convert a finite number to its JSON form
///
/// Integral values inside the exactly representable range are written as
/// JSON integers. Returns `None` for NaN and the infinities.
pub fn number_to_json(n: f64) -> Option<serde_json::Value> {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        return Some(serde_json::Value::from(n as i64));
    }
    serde_json::Number::from_f64(n).map(serde_json::Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_numbers_become_integers() {
        assert_eq!(number_to_json(3.0), Some(json!(3)));
        assert_eq!(number_to_json(-0.0), Some(json!(0)));
        assert_eq!(number_to_json(1.5), Some(json!(1.5)));
        assert_eq!(number_to_json(1e300), Some(json!(1e300)));
    }

    #[test]
    fn special_numbers_have_no_json_form() {
        assert_eq!(number_to_json(f64::NAN), None);
        assert_eq!(number_to_json(f64::INFINITY), None);
        assert_eq!(number_to_json(f64::NEG_INFINITY), None);
    }
}
