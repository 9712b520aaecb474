use std::collections::BTreeMap;

/// Prefix and suffix applied to every key of an evaluation or plot result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Affix {
    pub prefix: String,
    pub suffix: String,
}

impl Affix {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::new(prefix, "")
    }

    pub fn suffix(suffix: impl Into<String>) -> Self {
        Self::new("", suffix)
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty() && self.suffix.is_empty()
    }

    pub fn apply(&self, key: &str) -> String {
        format!("{}{key}{}", self.prefix, self.suffix)
    }

    pub fn apply_keys<V: Clone>(&self, map: &BTreeMap<String, V>) -> BTreeMap<String, V> {
        if self.is_empty() {
            return map.clone();
        }
        map.iter()
            .map(|(key, value)| (self.apply(key), value.clone()))
            .collect()
    }

    /// Nests `self` inside `outer`: the outer prefix goes first and the outer
    /// suffix goes last.
    pub fn within(&self, outer: &Affix) -> Affix {
        Affix {
            prefix: format!("{}{}", outer.prefix, self.prefix),
            suffix: format!("{}{}", self.suffix, outer.suffix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_wraps_key() {
        assert_eq!(Affix::new("val_", "_v2").apply("mae"), "val_mae_v2");
        assert_eq!(Affix::none().apply("mae"), "mae");
    }

    #[test]
    fn within_composes_outer_first() {
        let inner = Affix::new("p1_", "_s1");
        let outer = Affix::new("p0_", "_s0");
        let combined = inner.within(&outer);
        assert_eq!(combined.apply("k"), "p0_p1_k_s1_s0");
        assert_eq!(
            combined.apply("k"),
            outer.apply(&inner.apply("k"))
        );
    }

    #[test]
    fn apply_keys_renames_every_entry() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 2);
        let renamed = Affix::prefix("x.").apply_keys(&map);
        assert_eq!(renamed.get("x.a"), Some(&1));
        assert_eq!(renamed.get("x.b"), Some(&2));
        assert_eq!(renamed.len(), 2);
    }
}
