/// How two floats are compared by the structural `equal` functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FloatCmp {
    /// IEEE equality: NaN never equals anything.
    #[default]
    Exact,
    /// Like `Exact`, except two NaNs compare equal.
    NanEqual,
}

impl FloatCmp {
    pub fn from_equal_nan(equal_nan: bool) -> Self {
        if equal_nan {
            FloatCmp::NanEqual
        } else {
            FloatCmp::Exact
        }
    }

    pub fn eq(self, a: f64, b: f64) -> bool {
        match self {
            FloatCmp::Exact => a == b,
            FloatCmp::NanEqual => a == b || (a.is_nan() && b.is_nan()),
        }
    }

    pub fn eq_slice(self, a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.eq(*x, *y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_rejects_nan() {
        assert!(!FloatCmp::Exact.eq(f64::NAN, f64::NAN));
        assert!(FloatCmp::Exact.eq(1.5, 1.5));
    }

    #[test]
    fn nan_equal_accepts_paired_nan_only() {
        assert!(FloatCmp::NanEqual.eq(f64::NAN, f64::NAN));
        assert!(!FloatCmp::NanEqual.eq(f64::NAN, 0.0));
        assert!(FloatCmp::NanEqual.eq_slice(&[1.0, f64::NAN], &[1.0, f64::NAN]));
        assert!(!FloatCmp::NanEqual.eq_slice(&[1.0], &[1.0, 2.0]));
    }
}
