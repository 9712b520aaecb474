use evalkit_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// What the statistical metrics do when an input holds NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NanPolicy {
    /// Results become NaN.
    #[default]
    Propagate,
    /// Pairs containing NaN are removed before computing.
    Omit,
    /// NaN input is a numeric error.
    Raise,
}

impl NanPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            NanPolicy::Propagate => "propagate",
            NanPolicy::Omit => "omit",
            NanPolicy::Raise => "raise",
        }
    }

    /// Applies the `omit` filter. Other policies return the inputs unchanged.
    pub fn prepare(self, a: &[f64], b: &[f64]) -> (Vec<f64>, Vec<f64>) {
        match self {
            NanPolicy::Omit => a
                .iter()
                .zip(b)
                .filter(|(x, y)| !x.is_nan() && !y.is_nan())
                .map(|(x, y)| (*x, *y))
                .unzip(),
            NanPolicy::Propagate | NanPolicy::Raise => (a.to_vec(), b.to_vec()),
        }
    }

    /// Returns whether any input holds NaN, failing under `raise`.
    pub fn check(self, inputs: &[&[f64]]) -> AppResult<bool> {
        let has_nan = inputs.iter().any(|values| values.iter().any(|v| v.is_nan()));
        if has_nan && self == NanPolicy::Raise {
            return Err(AppError::numeric("The input contains nan values"));
        }
        Ok(has_nan)
    }
}

impl std::str::FromStr for NanPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "propagate" => Ok(NanPolicy::Propagate),
            "omit" => Ok(NanPolicy::Omit),
            "raise" => Ok(NanPolicy::Raise),
            other => Err(AppError::usage(format!(
                "unknown nan_policy '{other}' (expected propagate, omit or raise)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalkit_core::ErrorKind;

    #[test]
    fn omit_drops_pairs_with_nan_on_either_side() {
        let (a, b) = NanPolicy::Omit.prepare(&[1.0, f64::NAN, 3.0, 4.0], &[1.0, 2.0, f64::NAN, 4.0]);
        assert_eq!(a, vec![1.0, 4.0]);
        assert_eq!(b, vec![1.0, 4.0]);
    }

    #[test]
    fn propagate_keeps_nan() {
        let (a, _) = NanPolicy::Propagate.prepare(&[f64::NAN], &[1.0]);
        assert!(a[0].is_nan());
        assert!(NanPolicy::Propagate.check(&[&a]).unwrap());
    }

    #[test]
    fn raise_is_numeric_error() {
        let err = NanPolicy::Raise.check(&[&[1.0], &[f64::NAN]]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Numeric);
        assert!(!NanPolicy::Raise.check(&[&[1.0]]).unwrap());
    }

    #[test]
    fn parses_names() {
        assert_eq!("omit".parse::<NanPolicy>().unwrap(), NanPolicy::Omit);
        assert!("drop".parse::<NanPolicy>().is_err());
        let policy: NanPolicy = serde_json::from_str("\"raise\"").unwrap();
        assert_eq!(policy, NanPolicy::Raise);
    }
}
