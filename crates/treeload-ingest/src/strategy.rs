use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use treeload_model::{Batch, EntityTree};

use crate::assembler::BatchBound;
use crate::config::ConfigError;
use crate::render;
use crate::Result;

/// The ingestion strategies, numbered as in historical benchmark reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Gulp,
    Bounded,
    Merge,
    Bulk,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Gulp,
        Strategy::Bounded,
        Strategy::Merge,
        Strategy::Bulk,
    ];

    pub fn number(self) -> u8 {
        match self {
            Strategy::Gulp => 1,
            Strategy::Bounded => 2,
            Strategy::Merge => 4,
            Strategy::Bulk => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Gulp => "gulp",
            Strategy::Bounded => "bounded",
            Strategy::Merge => "merge",
            Strategy::Bulk => "bulk",
        }
    }

    /// Report label, e.g. `i4`.
    pub fn label(self) -> String {
        format!("i{}", self.number())
    }

    /// Merge and bulk match on `id`; they need the uniqueness constraints in
    /// place before ingesting.
    pub fn requires_constraints(self) -> bool {
        matches!(self, Strategy::Merge | Strategy::Bulk)
    }

    /// `1|gulp, 2|bounded, 4|merge, 6|bulk`
    pub fn valid_options() -> String {
        Strategy::ALL
            .iter()
            .map(|s| format!("{}|{}", s.number(), s.name()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Lazily render `tree` into batches. Gulp ignores `bound`; bulk reads
    /// `bound.target` as rows per record set.
    pub fn render(
        self,
        tree: &EntityTree,
        bound: BatchBound,
    ) -> Box<dyn Iterator<Item = Result<Batch<'_>>> + '_> {
        match self {
            Strategy::Gulp => Box::new(render::gulp::render(tree)),
            Strategy::Bounded => Box::new(render::bounded::render(tree, bound)),
            Strategy::Merge => Box::new(render::merge::render(tree, bound)),
            Strategy::Bulk => render::bulk::render(tree, bound),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.name())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    /// Accepts `2`, `i2` or `bounded`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let numbered = wanted.strip_prefix('i').unwrap_or(wanted.as_str());
        Strategy::ALL
            .into_iter()
            .find(|st| st.name() == wanted || st.number().to_string() == numbered)
            .ok_or_else(|| ConfigError::UnsupportedStrategy {
                name: s.to_string(),
                valid: Strategy::valid_options(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_by_number_label_or_name() {
        assert_eq!("2".parse::<Strategy>().unwrap(), Strategy::Bounded);
        assert_eq!("i6".parse::<Strategy>().unwrap(), Strategy::Bulk);
        assert_eq!("Merge".parse::<Strategy>().unwrap(), Strategy::Merge);
        assert_eq!("gulp".parse::<Strategy>().unwrap(), Strategy::Gulp);
    }

    #[test]
    fn test_retired_numbers_are_unsupported() {
        for retired in ["3", "5", "spray", ""] {
            let err = retired.parse::<Strategy>().unwrap_err();
            assert!(err.to_string().contains("1|gulp, 2|bounded, 4|merge, 6|bulk"));
        }
    }

    #[test]
    fn test_constraints() {
        assert!(!Strategy::Gulp.requires_constraints());
        assert!(!Strategy::Bounded.requires_constraints());
        assert!(Strategy::Merge.requires_constraints());
        assert!(Strategy::Bulk.requires_constraints());
    }
}
