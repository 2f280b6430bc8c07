use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::ThoughtError;

/// Phase of the thinking process a thought belongs to.
///
/// The declaration order is the canonical display order; it is used for
/// progress reporting only and never enforced as a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ThoughtStage {
    /// Framing the problem and its constraints.
    ProblemDefinition,
    /// Gathering information.
    Research,
    /// Examining the gathered information.
    Analysis,
    /// Combining findings into a coherent picture.
    Synthesis,
    /// Drawing the final answer.
    Conclusion,
}

impl ThoughtStage {
    /// All stages in canonical order.
    pub const ALL: [ThoughtStage; 5] = [
        ThoughtStage::ProblemDefinition,
        ThoughtStage::Research,
        ThoughtStage::Analysis,
        ThoughtStage::Synthesis,
        ThoughtStage::Conclusion,
    ];

    /// Canonical list, for enumeration in error messages and tool schemas.
    pub fn values() -> &'static [ThoughtStage] {
        &Self::ALL
    }

    /// Display name of the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThoughtStage::ProblemDefinition => "Problem Definition",
            ThoughtStage::Research => "Research",
            ThoughtStage::Analysis => "Analysis",
            ThoughtStage::Synthesis => "Synthesis",
            ThoughtStage::Conclusion => "Conclusion",
        }
    }

    /// Parse a stage name, ignoring case and surrounding whitespace.
    pub fn parse(text: &str) -> Result<Self, ThoughtError> {
        lookup_table()
            .get(&text.trim().to_lowercase())
            .copied()
            .ok_or_else(|| ThoughtError::InvalidStage {
                value: text.to_string(),
                valid: Self::valid_names(),
            })
    }

    /// Comma-separated display names of every stage.
    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn lookup_table() -> &'static HashMap<String, ThoughtStage> {
    static TABLE: OnceLock<HashMap<String, ThoughtStage>> = OnceLock::new();
    TABLE.get_or_init(|| {
        ThoughtStage::ALL
            .iter()
            .map(|stage| (stage.as_str().to_lowercase(), *stage))
            .collect()
    })
}

impl std::fmt::Display for ThoughtStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThoughtStage {
    type Err = ThoughtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ThoughtStage {
    type Error = ThoughtError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ThoughtStage> for String {
    fn from(stage: ThoughtStage) -> Self {
        stage.as_str().to_string()
    }
}
