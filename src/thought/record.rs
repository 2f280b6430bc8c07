use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::ThoughtStage;
use crate::error::{ThoughtError, ThoughtResult};

/// Caller-supplied fields for a new thought.
///
/// Numbers are signed so that out-of-range values reach validation and are
/// reported against the offending field instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtInput {
    /// The thought text.
    #[serde(alias = "thought")]
    pub content: String,
    /// Position claimed for this thought within the session.
    #[serde(alias = "thought_number")]
    pub thought_number: i64,
    /// Current estimate of the sequence length.
    #[serde(alias = "total_thoughts")]
    pub total_thoughts: i64,
    /// Whether the sequence should continue.
    #[serde(alias = "next_thought_needed")]
    pub next_thought_needed: bool,
    /// Stage name, parsed case-insensitively.
    pub stage: String,
    /// Short labels.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Axioms relied on by this thought.
    #[serde(default, alias = "axioms_used")]
    pub axioms_used: Vec<String>,
    /// Assumptions this thought challenges.
    #[serde(default, alias = "assumptions_challenged")]
    pub assumptions_challenged: Vec<String>,
    /// Whether this thought revises an earlier one.
    #[serde(default, alias = "is_revision")]
    pub is_revision: Option<bool>,
    /// The thought number being revised.
    #[serde(default, alias = "revises_thought")]
    pub revises_thought: Option<i64>,
    /// The thought number this branch diverges from.
    #[serde(default, alias = "branch_from_thought")]
    pub branch_from_thought: Option<i64>,
    /// Label of the alternative path.
    #[serde(default, alias = "branch_id")]
    pub branch_id: Option<String>,
    /// Whether the caller expects to extend the estimate.
    #[serde(default, alias = "needs_more_thoughts")]
    pub needs_more_thoughts: Option<bool>,
    /// Optional quality score in [0.0, 1.0].
    #[serde(default)]
    pub score: Option<f64>,
}

impl ThoughtInput {
    /// Create input for a plain thought. `next_thought_needed` defaults to
    /// whether the thought number is below the estimate.
    pub fn new(
        content: impl Into<String>,
        thought_number: i64,
        total_thoughts: i64,
        stage: ThoughtStage,
    ) -> Self {
        Self {
            content: content.into(),
            thought_number,
            total_thoughts,
            next_thought_needed: thought_number < total_thoughts,
            stage: stage.as_str().to_string(),
            tags: Vec::new(),
            axioms_used: Vec::new(),
            assumptions_challenged: Vec::new(),
            is_revision: None,
            revises_thought: None,
            branch_from_thought: None,
            branch_id: None,
            needs_more_thoughts: None,
            score: None,
        }
    }

    /// Set the tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the axioms used.
    pub fn with_axioms<I, S>(mut self, axioms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.axioms_used = axioms.into_iter().map(Into::into).collect();
        self
    }

    /// Set the assumptions challenged.
    pub fn with_assumptions<I, S>(mut self, assumptions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assumptions_challenged = assumptions.into_iter().map(Into::into).collect();
        self
    }

    /// Mark as a revision of an earlier thought.
    pub fn revising(mut self, thought_number: i64) -> Self {
        self.is_revision = Some(true);
        self.revises_thought = Some(thought_number);
        self
    }

    /// Mark as part of a branch diverging from an earlier thought.
    pub fn branching_from(mut self, thought_number: i64, branch_id: impl Into<String>) -> Self {
        self.branch_from_thought = Some(thought_number);
        self.branch_id = Some(branch_id.into());
        self
    }

    /// Set the quality score.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Override whether another thought is needed.
    pub fn with_next_thought_needed(mut self, needed: bool) -> Self {
        self.next_thought_needed = needed;
        self
    }
}

/// A validated, immutable thought within a session.
///
/// Records can only be built through [`ThoughtRecord::create`] (or loaded from
/// a session file and re-validated), which assigns the identifier and
/// creation timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtRecord {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,
    /// The thought text, trimmed.
    #[serde(alias = "thought")]
    pub content: String,
    /// Position within the session.
    pub thought_number: u32,
    /// Estimated sequence length at the time of this thought.
    pub total_thoughts: u32,
    /// Whether the sequence should continue.
    pub next_thought_needed: bool,
    /// Stage of the thinking process.
    pub stage: ThoughtStage,
    /// Labels in insertion order, deduplicated ignoring case.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Axioms relied on.
    #[serde(default)]
    pub axioms_used: Vec<String>,
    /// Assumptions challenged.
    #[serde(default)]
    pub assumptions_challenged: Vec<String>,
    /// Whether this record revises an earlier thought.
    #[serde(default)]
    pub is_revision: bool,
    /// Revised thought number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revises_thought: Option<u32>,
    /// Branch origin thought number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_from_thought: Option<u32>,
    /// Branch label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    /// Caller's hint that the estimate will grow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_more_thoughts: Option<bool>,
    /// Quality score in [0.0, 1.0].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    timestamp: DateTime<Utc>,
}

impl ThoughtRecord {
    /// Validate caller input and stamp a new record with identity and time.
    pub fn create(input: ThoughtInput) -> ThoughtResult<Self> {
        let content = check_content(&input.content)?;
        let stage = ThoughtStage::parse(&input.stage)?;
        let (thought_number, total_thoughts) =
            check_position(input.thought_number, input.total_thoughts)?;

        let is_revision = input.is_revision.unwrap_or(false);
        let revises_thought = check_revision(is_revision, input.revises_thought, thought_number)?;
        let (branch_from_thought, branch_id) = check_branch(
            input.branch_from_thought,
            input.branch_id.as_deref(),
            thought_number,
        )?;

        Ok(Self {
            id: Uuid::new_v4(),
            content,
            thought_number,
            total_thoughts,
            next_thought_needed: input.next_thought_needed,
            stage,
            tags: normalize_tags(input.tags)?,
            axioms_used: check_entries("axiomsUsed", input.axioms_used)?,
            assumptions_challenged: check_entries(
                "assumptionsChallenged",
                input.assumptions_challenged,
            )?,
            is_revision,
            revises_thought,
            branch_from_thought,
            branch_id,
            needs_more_thoughts: input.needs_more_thoughts,
            score: check_score(input.score)?,
            timestamp: Utc::now(),
        })
    }

    /// Re-check every invariant on a record that did not come through
    /// [`ThoughtRecord::create`], such as one read back from disk.
    pub fn validate(&self) -> ThoughtResult<()> {
        check_content(&self.content)?;
        check_position(self.thought_number.into(), self.total_thoughts.into())?;
        check_revision(
            self.is_revision,
            self.revises_thought.map(i64::from),
            self.thought_number,
        )?;
        check_branch(
            self.branch_from_thought.map(i64::from),
            self.branch_id.as_deref(),
            self.thought_number,
        )?;
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(ThoughtError::validation(
                "tags",
                "tags must not contain empty strings",
            ));
        }
        check_score(self.score)?;
        Ok(())
    }

    /// Unique identifier, assigned at creation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Creation time, assigned at creation.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether this record belongs to a branch.
    pub fn is_branch(&self) -> bool {
        self.branch_id.is_some()
    }

    /// One-line display form, e.g. `Revision 3/5 (revising thought 1)`.
    pub fn headline(&self) -> String {
        let position = format!("{}/{}", self.thought_number, self.total_thoughts);
        match (self.revises_thought, self.branch_from_thought, &self.branch_id) {
            (Some(revises), _, _) if self.is_revision => {
                format!("Revision {} (revising thought {})", position, revises)
            }
            (_, Some(from), Some(branch)) => {
                format!("Branch {} (from thought {}, ID: {})", position, from, branch)
            }
            _ => format!("Thought {}", position),
        }
    }

    /// Content truncated to `max_chars` characters, with `...` appended when cut.
    pub fn snippet(&self, max_chars: usize) -> String {
        if self.content.chars().count() > max_chars {
            let cut: String = self.content.chars().take(max_chars).collect();
            format!("{}...", cut)
        } else {
            self.content.clone()
        }
    }
}

fn check_content(content: &str) -> ThoughtResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ThoughtError::validation(
            "content",
            "thought content cannot be empty",
        ));
    }
    Ok(trimmed.to_string())
}

fn check_number(field: &str, value: i64) -> ThoughtResult<u32> {
    if value < 1 {
        return Err(ThoughtError::validation(
            field,
            format!("{} must be at least 1 (got {})", field, value),
        ));
    }
    u32::try_from(value).map_err(|_| {
        ThoughtError::validation(field, format!("{} is too large (got {})", field, value))
    })
}

fn check_position(thought_number: i64, total_thoughts: i64) -> ThoughtResult<(u32, u32)> {
    let number = check_number("thoughtNumber", thought_number)?;
    let total = check_number("totalThoughts", total_thoughts)?;
    if total < number {
        return Err(ThoughtError::validation(
            "totalThoughts",
            format!(
                "totalThoughts must be greater than or equal to thoughtNumber ({} < {})",
                total, number
            ),
        ));
    }
    Ok((number, total))
}

fn check_revision(
    is_revision: bool,
    revises_thought: Option<i64>,
    thought_number: u32,
) -> ThoughtResult<Option<u32>> {
    match (is_revision, revises_thought) {
        (false, None) => Ok(None),
        (false, Some(_)) => Err(ThoughtError::validation(
            "revisesThought",
            "revisesThought is only valid when isRevision is true",
        )),
        (true, None) => Err(ThoughtError::validation(
            "revisesThought",
            "revisesThought is required when isRevision is true",
        )),
        (true, Some(target)) => {
            let target = check_number("revisesThought", target)?;
            if target >= thought_number {
                return Err(ThoughtError::validation(
                    "revisesThought",
                    format!(
                        "revisesThought must be less than thoughtNumber ({} >= {})",
                        target, thought_number
                    ),
                ));
            }
            Ok(Some(target))
        }
    }
}

fn check_branch(
    branch_from_thought: Option<i64>,
    branch_id: Option<&str>,
    thought_number: u32,
) -> ThoughtResult<(Option<u32>, Option<String>)> {
    match (branch_from_thought, branch_id) {
        (None, None) => Ok((None, None)),
        (Some(_), None) => Err(ThoughtError::validation(
            "branchId",
            "branchId is required when branchFromThought is set",
        )),
        (None, Some(_)) => Err(ThoughtError::validation(
            "branchFromThought",
            "branchFromThought is required when branchId is set",
        )),
        (Some(origin), Some(label)) => {
            let origin = check_number("branchFromThought", origin)?;
            if origin >= thought_number {
                return Err(ThoughtError::validation(
                    "branchFromThought",
                    format!(
                        "branchFromThought must be less than thoughtNumber ({} >= {})",
                        origin, thought_number
                    ),
                ));
            }
            let label = label.trim();
            if label.is_empty() {
                return Err(ThoughtError::validation(
                    "branchId",
                    "branchId cannot be empty",
                ));
            }
            Ok((Some(origin), Some(label.to_string())))
        }
    }
}

fn normalize_tags(tags: Vec<String>) -> ThoughtResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in check_entries("tags", tags)? {
        let folded = tag.to_lowercase();
        if !normalized.iter().any(|t| t.to_lowercase() == folded) {
            normalized.push(tag);
        }
    }
    Ok(normalized)
}

fn check_entries(field: &str, entries: Vec<String>) -> ThoughtResult<Vec<String>> {
    entries
        .into_iter()
        .map(|entry| {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                Err(ThoughtError::validation(
                    field,
                    format!("{} must not contain empty strings", field),
                ))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

fn check_score(score: Option<f64>) -> ThoughtResult<Option<f64>> {
    match score {
        Some(value) if !(0.0..=1.0).contains(&value) => Err(ThoughtError::validation(
            "score",
            format!("score must be between 0.0 and 1.0 (got {})", value),
        )),
        other => Ok(other),
    }
}

/// Accepts RFC 3339 timestamps as well as the zone-less ISO form written by
/// older session files, which is read as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
