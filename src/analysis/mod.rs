//! Stateless analysis over a snapshot of a session.
//!
//! Every function here is a pure function of the slice it is given; nothing
//! touches storage, so results are reproducible and can be computed for many
//! sessions in parallel.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::thought::{ThoughtRecord, ThoughtStage};

/// Relevance contributed by sharing the target's stage.
pub const STAGE_MATCH_WEIGHT: f64 = 2.0;
/// Relevance contributed by each shared tag.
pub const SHARED_TAG_WEIGHT: f64 = 1.5;
/// Relevance contributed by each shared salient word.
pub const SHARED_WORD_WEIGHT: f64 = 0.5;
/// Words shorter than this many characters are ignored when comparing content.
pub const MIN_SALIENT_WORD_LEN: usize = 5;
/// Number of tags reported in [`SummaryReport::top_tags`].
pub const TOP_TAG_LIMIT: usize = 5;
/// Maximum characters of content quoted in a [`RelatedThought`].
pub const SNIPPET_CHARS: usize = 100;

/// Aggregate statistics for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    /// Number of records.
    pub total_thoughts: usize,
    /// Records per stage; every stage is listed.
    pub stages: BTreeMap<ThoughtStage, usize>,
    /// Records flagged as revisions.
    pub revision_count: usize,
    /// Number of distinct branch labels.
    pub branch_count: usize,
    /// Distinct branch labels in order of first appearance.
    pub branches: Vec<String>,
    /// Thought numbers and stages ordered by thought number.
    pub timeline: Vec<TimelineEntry>,
    /// Most frequent tags.
    pub top_tags: Vec<TagCount>,
    /// Whether every stage has at least one record.
    pub has_all_stages: bool,
    /// Highest thought number over highest estimate, in [0, 1].
    pub percent_complete: f64,
}

/// One point on the session timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    /// Thought number.
    pub thought_number: u32,
    /// Stage of that thought.
    pub stage: ThoughtStage,
}

/// A tag and how many records carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    /// Tag as first written.
    pub tag: String,
    /// Records carrying the tag.
    pub count: usize,
}

/// Analysis of one thought in the context of its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtAnalysis {
    /// The analyzed thought.
    pub current_thought: ThoughtOverview,
    /// Most relevant other records, best first.
    pub related_thoughts: Vec<RelatedThought>,
    /// `thoughtNumber / totalThoughts`, in [0, 1].
    pub progress: f64,
    /// No earlier-numbered record shares the stage.
    pub is_first_in_stage: bool,
    /// Records in the session.
    pub thought_history_length: usize,
    /// Stage of the analyzed thought.
    pub current_stage: ThoughtStage,
}

/// Caller-facing projection of the analyzed thought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtOverview {
    /// Position in the sequence.
    pub thought_number: u32,
    /// Estimated length of the sequence.
    pub total_thoughts: u32,
    /// Whether another thought was expected.
    pub next_thought_needed: bool,
    /// Stage of the thought.
    pub stage: ThoughtStage,
    /// Tags carried by the thought.
    pub tags: Vec<String>,
    /// When the thought was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Short description of a related thought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedThought {
    /// Position in the sequence.
    pub thought_number: u32,
    /// Stage of the related thought.
    pub stage: ThoughtStage,
    /// Leading characters of its content.
    pub snippet: String,
}

/// Lowercased words of at least [`MIN_SALIENT_WORD_LEN`] characters.
pub fn salient_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_SALIENT_WORD_LEN)
        .map(str::to_lowercase)
        .collect()
}

fn tag_set(thought: &ThoughtRecord) -> HashSet<String> {
    thought.tags.iter().map(|t| t.to_lowercase()).collect()
}

/// Relevance of `candidate` to `target`: stage match, shared tags and shared
/// salient words, each weighted.
pub fn relevance(target: &ThoughtRecord, candidate: &ThoughtRecord) -> f64 {
    Scorer::new(target).score(candidate)
}

/// Relevance scoring with the target's tag and word sets computed once.
struct Scorer {
    stage: ThoughtStage,
    tags: HashSet<String>,
    words: HashSet<String>,
}

impl Scorer {
    fn new(target: &ThoughtRecord) -> Self {
        Self {
            stage: target.stage,
            tags: tag_set(target),
            words: salient_words(&target.content),
        }
    }

    fn score(&self, candidate: &ThoughtRecord) -> f64 {
        let stage = if candidate.stage == self.stage {
            STAGE_MATCH_WEIGHT
        } else {
            0.0
        };
        let tags = self.tags.intersection(&tag_set(candidate)).count() as f64;
        let words = self
            .words
            .intersection(&salient_words(&candidate.content))
            .count() as f64;

        stage + tags * SHARED_TAG_WEIGHT + words * SHARED_WORD_WEIGHT
    }
}

/// Up to `max_results` thoughts related to `target`, most relevant first.
///
/// Ties go to the smaller thought number, then the earlier timestamp. The
/// target itself and thoughts with no relevance at all are never returned.
pub fn find_related(
    target: &ThoughtRecord,
    all_thoughts: &[ThoughtRecord],
    max_results: usize,
) -> Vec<ThoughtRecord> {
    let scorer = Scorer::new(target);

    let mut scored: Vec<(f64, &ThoughtRecord)> = all_thoughts
        .iter()
        .filter(|t| t.id() != target.id())
        .map(|t| (scorer.score(t), t))
        .filter(|(score, _)| *score > 0.0)
        .collect();

    scored.sort_by(|(score_a, a), (score_b, b)| {
        score_b
            .total_cmp(score_a)
            .then_with(|| a.thought_number.cmp(&b.thought_number))
            .then_with(|| a.timestamp().cmp(&b.timestamp()))
    });

    scored
        .into_iter()
        .take(max_results)
        .map(|(_, t)| t.clone())
        .collect()
}

/// True when no thought with a smaller number shares the target's stage.
pub fn is_first_in_stage(target: &ThoughtRecord, all_thoughts: &[ThoughtRecord]) -> bool {
    !all_thoughts
        .iter()
        .any(|t| t.stage == target.stage && t.thought_number < target.thought_number)
}

/// Distinct branch labels in order of first appearance.
pub fn branch_ids(all_thoughts: &[ThoughtRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    all_thoughts
        .iter()
        .filter_map(|t| t.branch_id.as_ref())
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Records per stage, with every stage present.
pub fn stage_counts(all_thoughts: &[ThoughtRecord]) -> BTreeMap<ThoughtStage, usize> {
    let mut counts: BTreeMap<ThoughtStage, usize> =
        ThoughtStage::ALL.iter().map(|s| (*s, 0)).collect();
    for thought in all_thoughts {
        *counts.entry(thought.stage).or_insert(0) += 1;
    }
    counts
}

/// `max(thoughtNumber) / max(totalThoughts)` clamped to [0, 1]; 0 when empty.
pub fn percent_complete(all_thoughts: &[ThoughtRecord]) -> f64 {
    let max_number = all_thoughts.iter().map(|t| t.thought_number).max();
    let max_total = all_thoughts.iter().map(|t| t.total_thoughts).max();
    match (max_number, max_total) {
        (Some(number), Some(total)) if total > 0 => {
            (f64::from(number) / f64::from(total)).clamp(0.0, 1.0)
        }
        _ => 0.0,
    }
}

fn top_tags(all_thoughts: &[ThoughtRecord]) -> Vec<TagCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in all_thoughts.iter().flat_map(|t| t.tags.iter()) {
        *counts.entry(tag.as_str()).or_insert(0) += 1;
    }

    let mut ranked: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| match b.count.cmp(&a.count) {
        Ordering::Equal => a.tag.cmp(&b.tag),
        other => other,
    });
    ranked.truncate(TOP_TAG_LIMIT);
    ranked
}

/// Summarize a session snapshot. Never fails, including on an empty slice.
pub fn generate_summary(all_thoughts: &[ThoughtRecord]) -> SummaryReport {
    let stages = stage_counts(all_thoughts);
    let branches = branch_ids(all_thoughts);

    let mut timeline: Vec<TimelineEntry> = all_thoughts
        .iter()
        .map(|t| TimelineEntry {
            thought_number: t.thought_number,
            stage: t.stage,
        })
        .collect();
    timeline.sort_by_key(|entry| entry.thought_number);

    SummaryReport {
        total_thoughts: all_thoughts.len(),
        has_all_stages: stages.values().all(|count| *count > 0),
        stages,
        revision_count: all_thoughts.iter().filter(|t| t.is_revision).count(),
        branch_count: branches.len(),
        branches,
        timeline,
        top_tags: top_tags(all_thoughts),
        percent_complete: percent_complete(all_thoughts),
    }
}

/// Describe `target` against the rest of the session.
pub fn analyze_thought(
    target: &ThoughtRecord,
    all_thoughts: &[ThoughtRecord],
    max_results: usize,
) -> ThoughtAnalysis {
    let related_thoughts = find_related(target, all_thoughts, max_results)
        .iter()
        .map(|t| RelatedThought {
            thought_number: t.thought_number,
            stage: t.stage,
            snippet: t.snippet(SNIPPET_CHARS),
        })
        .collect();

    ThoughtAnalysis {
        current_thought: ThoughtOverview {
            thought_number: target.thought_number,
            total_thoughts: target.total_thoughts,
            next_thought_needed: target.next_thought_needed,
            stage: target.stage,
            tags: target.tags.clone(),
            timestamp: target.timestamp(),
        },
        related_thoughts,
        progress: (f64::from(target.thought_number) / f64::from(target.total_thoughts))
            .clamp(0.0, 1.0),
        is_first_in_stage: is_first_in_stage(target, all_thoughts),
        thought_history_length: all_thoughts.len(),
        current_stage: target.stage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thought::ThoughtInput;
    use pretty_assertions::assert_eq;

    fn thought(n: i64, stage: ThoughtStage, content: &str, tags: &[&str]) -> ThoughtRecord {
        ThoughtRecord::create(
            ThoughtInput::new(content, n, 5, stage).with_tags(tags.iter().copied()),
        )
        .unwrap()
    }

    fn numbers(thoughts: &[ThoughtRecord]) -> Vec<u32> {
        thoughts.iter().map(|t| t.thought_number).collect()
    }

    #[test]
    fn test_salient_words_filters_short_words() {
        let words = salient_words("The Carbon tax is a policy, carbon-neutral!");
        let mut sorted: Vec<_> = words.into_iter().collect();
        sorted.sort();
        assert_eq!(sorted, vec!["carbon", "neutral", "policy"]);
    }

    #[test]
    fn test_relevance_components() {
        let a = thought(1, ThoughtStage::Research, "emissions trajectory", &["climate", "data"]);
        let b = thought(2, ThoughtStage::Research, "emissions baseline", &["Climate"]);
        let c = thought(3, ThoughtStage::Analysis, "unrelated", &[]);

        assert_eq!(
            relevance(&a, &b),
            STAGE_MATCH_WEIGHT + SHARED_TAG_WEIGHT + SHARED_WORD_WEIGHT
        );
        assert_eq!(relevance(&a, &c), 0.0);
    }

    #[test]
    fn test_find_related_stage_match() {
        let t1 = thought(1, ThoughtStage::Research, "Emission data gathering", &["climate"]);
        let t2 = thought(2, ThoughtStage::Research, "Regulatory landscape", &["policy"]);
        let all = vec![t1.clone(), t2.clone()];

        let related = find_related(&t2, &all, 1);
        assert_eq!(related, vec![t1]);
    }

    #[test]
    fn test_find_related_excludes_target_and_caps_results() {
        let all: Vec<_> = (1..=5)
            .map(|n| thought(n, ThoughtStage::Analysis, "same words everywhere", &["x"]))
            .collect();

        let related = find_related(&all[2], &all, 3);
        assert_eq!(related.len(), 3);
        assert!(related.iter().all(|t| t.id() != all[2].id()));
        assert_eq!(numbers(&related), vec![1, 2, 4]);
    }

    #[test]
    fn test_find_related_orders_by_relevance_then_number() {
        let target = thought(6, ThoughtStage::Synthesis, "carbon pricing", &["climate", "policy"]);
        let all = vec![
            thought(1, ThoughtStage::Research, "unrelated matter", &["policy"]),
            thought(2, ThoughtStage::Synthesis, "different topic", &[]),
            thought(3, ThoughtStage::Synthesis, "carbon markets", &["climate", "policy"]),
            thought(4, ThoughtStage::Research, "nothing shared", &[]),
            thought(5, ThoughtStage::Analysis, "other ideas", &["climate"]),
            target.clone(),
        ];

        let related = find_related(&target, &all, 10);
        // #3: stage + 2 tags + "carbon"; #2: stage; #1 and #5: one tag each.
        assert_eq!(numbers(&related), vec![3, 2, 1, 5]);
    }

    #[test]
    fn test_find_related_skips_zero_relevance() {
        let target = thought(2, ThoughtStage::Conclusion, "final answer", &[]);
        let all = vec![thought(1, ThoughtStage::Research, "gather", &[]), target.clone()];
        assert!(find_related(&target, &all, 3).is_empty());
    }

    #[test]
    fn test_find_related_zero_max_results() {
        let a = thought(1, ThoughtStage::Research, "a", &[]);
        let b = thought(2, ThoughtStage::Research, "b", &[]);
        assert!(find_related(&b, &[a, b.clone()], 0).is_empty());
    }

    #[test]
    fn test_is_first_in_stage() {
        let t1 = thought(1, ThoughtStage::Research, "a", &[]);
        let t2 = thought(2, ThoughtStage::Analysis, "b", &[]);
        let t3 = thought(3, ThoughtStage::Research, "c", &[]);
        let all = vec![t1.clone(), t2.clone(), t3.clone()];

        assert!(is_first_in_stage(&t1, &all));
        assert!(is_first_in_stage(&t2, &all));
        assert!(!is_first_in_stage(&t3, &all));
    }

    #[test]
    fn test_is_first_in_stage_ignores_later_and_equal_numbers() {
        let revision = thought(2, ThoughtStage::Research, "again", &[]);
        let later = thought(4, ThoughtStage::Research, "later", &[]);
        let same_number = thought(2, ThoughtStage::Research, "twin", &[]);
        assert!(is_first_in_stage(&revision, &[later, same_number]));
    }

    #[test]
    fn test_summary_of_empty_session() {
        let summary = generate_summary(&[]);
        assert_eq!(summary.total_thoughts, 0);
        assert_eq!(summary.percent_complete, 0.0);
        assert_eq!(summary.revision_count, 0);
        assert_eq!(summary.branch_count, 0);
        assert!(summary.stages.values().all(|c| *c == 0));
        assert!(summary.timeline.is_empty());
        assert!(summary.top_tags.is_empty());
        assert!(!summary.has_all_stages);
    }

    #[test]
    fn test_summary_counts() {
        let all = vec![
            thought(1, ThoughtStage::ProblemDefinition, "a", &["climate"]),
            ThoughtRecord::create(
                ThoughtInput::new("b", 2, 8, ThoughtStage::Research)
                    .revising(1)
                    .with_tags(["climate", "policy"]),
            )
            .unwrap(),
            ThoughtRecord::create(
                ThoughtInput::new("c", 3, 8, ThoughtStage::Analysis).branching_from(2, "explore-A"),
            )
            .unwrap(),
            ThoughtRecord::create(
                ThoughtInput::new("d", 4, 8, ThoughtStage::Analysis).branching_from(2, "explore-A"),
            )
            .unwrap(),
        ];

        let summary = generate_summary(&all);
        assert_eq!(summary.total_thoughts, 4);
        assert_eq!(summary.stages[&ThoughtStage::Analysis], 2);
        assert_eq!(summary.stages[&ThoughtStage::Conclusion], 0);
        assert_eq!(summary.revision_count, 1);
        assert_eq!(summary.branch_count, 1);
        assert_eq!(summary.branches, vec!["explore-A"]);
        assert_eq!(summary.percent_complete, 0.5);
        assert_eq!(
            summary.top_tags,
            vec![
                TagCount {
                    tag: "climate".to_string(),
                    count: 2
                },
                TagCount {
                    tag: "policy".to_string(),
                    count: 1
                },
            ]
        );
        assert!(!summary.has_all_stages);
    }

    #[test]
    fn test_summary_timeline_sorted_by_number() {
        let all = vec![
            thought(3, ThoughtStage::Analysis, "c", &[]),
            thought(1, ThoughtStage::ProblemDefinition, "a", &[]),
            thought(2, ThoughtStage::Research, "b", &[]),
        ];
        let timeline: Vec<u32> = generate_summary(&all)
            .timeline
            .iter()
            .map(|e| e.thought_number)
            .collect();
        assert_eq!(timeline, vec![1, 2, 3]);
    }

    #[test]
    fn test_summary_has_all_stages() {
        let all: Vec<_> = ThoughtStage::ALL
            .iter()
            .enumerate()
            .map(|(i, stage)| thought(i as i64 + 1, *stage, "x", &[]))
            .collect();
        let summary = generate_summary(&all);
        assert!(summary.has_all_stages);
        assert_eq!(summary.percent_complete, 1.0);
    }

    #[test]
    fn test_top_tags_limited_and_tie_broken_by_name() {
        let tags = ["f", "e", "d", "c", "b", "a"];
        let all = vec![thought(1, ThoughtStage::Research, "x", &tags)];
        let top: Vec<String> = generate_summary(&all)
            .top_tags
            .into_iter()
            .map(|t| t.tag)
            .collect();
        assert_eq!(top, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_top_tags_count_a_record_once_per_tag() {
        let all = vec![thought(1, ThoughtStage::Research, "a", &["Climate", "climate"])];
        let summary = generate_summary(&all);
        assert_eq!(
            summary.top_tags,
            vec![TagCount {
                tag: "Climate".to_string(),
                count: 1
            }]
        );
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let value = serde_json::to_value(generate_summary(&[])).unwrap();
        assert_eq!(value["percentComplete"], 0.0);
        assert_eq!(value["stages"]["Problem Definition"], 0);
        assert!(value.get("revisionCount").is_some());
        assert!(value.get("topTags").is_some());
    }

    #[test]
    fn test_branch_ids_first_seen_order() {
        let mk = |n: i64, b: &str| {
            ThoughtRecord::create(
                ThoughtInput::new("x", n, 9, ThoughtStage::Research).branching_from(1, b),
            )
            .unwrap()
        };
        let all = vec![mk(2, "beta"), mk(3, "alpha"), mk(4, "beta")];
        assert_eq!(branch_ids(&all), vec!["beta", "alpha"]);
    }

    #[test]
    fn test_analyze_thought() {
        let long = "x".repeat(150);
        let t1 = thought(1, ThoughtStage::Research, &long, &["climate"]);
        let t2 = thought(2, ThoughtStage::Research, "second", &["climate"]);
        let all = vec![t1, t2.clone()];

        let analysis = analyze_thought(&t2, &all, 3);
        assert_eq!(analysis.current_thought.thought_number, 2);
        assert_eq!(analysis.related_thoughts.len(), 1);
        assert_eq!(analysis.related_thoughts[0].thought_number, 1);
        assert_eq!(analysis.related_thoughts[0].snippet.chars().count(), 103);
        assert!(analysis.related_thoughts[0].snippet.ends_with("..."));
        assert_eq!(analysis.progress, 0.4);
        assert!(!analysis.is_first_in_stage);
        assert_eq!(analysis.thought_history_length, 2);
        assert_eq!(analysis.current_stage, ThoughtStage::Research);
    }
}
