//! Registry of benchmark dataset size classes.

use serde::Serialize;

use crate::tree::KindCounts;
use crate::{ModelError, Result};

/// A named dataset size class. Used to generate or locate fixtures and to
/// validate post-ingestion counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Case {
    pub name: &'static str,
    pub node_count: usize,
    pub dir_count: usize,
    pub file_count: usize,
}

impl Case {
    pub fn counts(&self) -> KindCounts {
        KindCounts {
            directories: self.dir_count,
            files: self.file_count,
        }
    }
}

pub const CASES: &[Case] = &[
    Case {
        name: "case_100",
        node_count: 97,
        dir_count: 35,
        file_count: 62,
    },
    Case {
        name: "case_1750",
        node_count: 1_741,
        dir_count: 270,
        file_count: 1_471,
    },
    Case {
        name: "case_5000",
        node_count: 4_983,
        dir_count: 712,
        file_count: 4_271,
    },
    Case {
        name: "case_50k",
        node_count: 49_906,
        dir_count: 6_027,
        file_count: 43_879,
    },
    Case {
        name: "case_2mil",
        node_count: 2_013_404,
        dir_count: 222_116,
        file_count: 1_791_288,
    },
];

/// Look up a case by full name (`case_100`) or bare suffix (`100`).
pub fn find_case(name: &str) -> Result<&'static Case> {
    let name = name.trim();
    CASES
        .iter()
        .find(|c| c.name == name || c.name.strip_prefix("case_") == Some(name))
        .ok_or_else(|| ModelError::UnknownCase {
            name: name.to_string(),
            valid: case_names(),
        })
}

pub fn case_names() -> String {
    CASES.iter().map(|c| c.name).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_are_consistent() {
        for case in CASES {
            assert_eq!(case.dir_count + case.file_count, case.node_count, "{}", case.name);
            assert!(case.dir_count >= 1);
        }
    }

    #[test]
    fn test_find_case_accepts_suffix() {
        assert_eq!(find_case("100").unwrap().node_count, 97);
        assert_eq!(find_case("case_5000").unwrap().dir_count, 712);
    }

    #[test]
    fn test_unknown_case_lists_valid_names() {
        let err = find_case("7").unwrap_err();
        assert!(err.to_string().contains("case_100, case_1750"));
    }
}
