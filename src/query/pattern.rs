//! Match patterns for the manager's listing calls.

use serde::{Deserialize, Serialize};

use crate::model::UNIT_PREFIX;

/// Kind of unit a listing is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Service,
    Timer,
}

impl UnitType {
    pub fn suffix(self) -> &'static str {
        match self {
            UnitType::Service => ".service",
            UnitType::Timer => ".timer",
        }
    }
}

/// Glob matching managed units whose name contains `filter`.
///
/// The managed-unit prefix is inserted when the filter lacks it, so the
/// pattern never matches foreign units.
pub fn unit_match_pattern(unit_type: Option<UnitType>, filter: Option<&str>) -> String {
    let mut pattern = filter.unwrap_or_default().to_string();
    if let Some(unit_type) = unit_type {
        if !pattern.ends_with(unit_type.suffix()) {
            pattern.push_str(unit_type.suffix());
        }
    }
    if !pattern.contains(UNIT_PREFIX) {
        pattern = format!("*{}*{}", UNIT_PREFIX, pattern);
    }
    pattern.push('*');
    collapse_stars(&pattern)
}

fn collapse_stars(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if c == '*' && out.ends_with('*') {
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter() {
        assert_eq!(unit_match_pattern(None, None), "*taskflow-*");
    }

    #[test]
    fn test_type_suffix() {
        assert_eq!(
            unit_match_pattern(Some(UnitType::Timer), Some("nightly")),
            "*taskflow-*nightly.timer*"
        );
        assert_eq!(
            unit_match_pattern(Some(UnitType::Service), Some("x.service")),
            "*taskflow-*x.service*"
        );
    }

    #[test]
    fn test_prefix_already_present() {
        assert_eq!(
            unit_match_pattern(None, Some("taskflow-etl")),
            "taskflow-etl*"
        );
        assert_eq!(
            unit_match_pattern(None, Some("*taskflow-*")),
            "*taskflow-*"
        );
    }
}
