//! Importance-weighted 0–3 fidelity grading.
//!
//! | Score | Basic cases      | Edge cases      |
//! |-------|------------------|-----------------|
//! | 3     | all pass         | all pass        |
//! | 2     | all pass         | some fail       |
//! | 1     | some pass        | (ignored)       |
//! | 0     | none pass        | (ignored)       |

use serde::{Deserialize, Serialize};
use xlbench_model::{Importance, TestResult};

/// How to grade an operation whose results are all edge cases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOnlyPolicy {
    /// Score the edge cases as if they were basic.
    Promote,
    /// No basic case passed, so the operation scores 0.
    #[default]
    Zero,
    /// No score.
    NotApplicable,
}

impl std::fmt::Display for EdgeOnlyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Promote => write!(f, "promote"),
            Self::Zero => write!(f, "zero"),
            Self::NotApplicable => write!(f, "not_applicable"),
        }
    }
}

/// Score one operation's results. `None` when there is nothing to grade.
pub fn score<'a>(
    results: impl IntoIterator<Item = &'a TestResult>,
    policy: EdgeOnlyPolicy,
) -> Option<u8> {
    let mut basic = Vec::new();
    let mut edge = Vec::new();
    for r in results {
        match r.importance.unwrap_or_default() {
            Importance::Basic => basic.push(r.passed),
            Importance::Edge => edge.push(r.passed),
        }
    }

    if basic.is_empty() {
        if edge.is_empty() {
            return None;
        }
        return match policy {
            EdgeOnlyPolicy::Promote => Some(grade(&edge, &[])),
            EdgeOnlyPolicy::Zero => Some(0),
            EdgeOnlyPolicy::NotApplicable => None,
        };
    }
    Some(grade(&basic, &edge))
}

fn grade(basic: &[bool], edge: &[bool]) -> u8 {
    let passed = basic.iter().filter(|p| **p).count();
    if passed == 0 {
        0
    } else if passed < basic.len() {
        1
    } else if edge.iter().all(|p| *p) {
        3
    } else {
        2
    }
}
