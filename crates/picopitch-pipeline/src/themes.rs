//! Theme consolidation: merging noisy free-text domain labels into a small
//! set of canonical themes.
//!
//! Labels are clustered by the model in bounded batches. The surviving theme
//! names are then clustered again, and each second-level group is expanded
//! back to the leaf labels it covers. Re-consolidation repeats while the map
//! is still large and shrinking, up to a pass budget.
//!
//! Merge policy: batches are merged union-by-key. A label keeps the first
//! theme it was assigned to; labels a batch omitted become singleton themes;
//! labels the model invented are ignored. Every pass therefore yields a
//! partition of its input, except for labels in pass-1 batches that failed
//! outright, which are dropped.

use std::collections::{BTreeMap, HashSet};

use picopitch_llm::{parse_model_output, prompts, Invoker, ModelOutput};
use serde_json::{Map, Value};

use crate::error::ConsolidationError;

/// Canonical theme name to the original labels it covers.
pub type ThemeMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidationOptions {
    /// Labels per model call.
    pub batch_size: usize,
    /// Input labels beyond this many are dropped before clustering.
    pub max_domains: usize,
    /// A re-pass over at most this many theme names is made in one call.
    pub single_call_limit: usize,
    /// Passes after the second run only while more themes than this remain.
    pub repass_threshold: usize,
    pub max_passes: u32,
}

impl Default for ConsolidationOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_domains: 2000,
            single_call_limit: 200,
            repass_threshold: 100,
            max_passes: 3,
        }
    }
}

struct PassOutcome {
    themes: ThemeMap,
    batches: usize,
    failed_batches: usize,
    /// Labels whose batch failed.
    unassigned: Vec<String>,
}

impl PassOutcome {
    fn all_failed(&self) -> bool {
        self.failed_batches == self.batches
    }
}

/// Consolidates `labels` into canonical themes.
///
/// Blank and duplicate labels are ignored. Input order decides which labels
/// survive the `max_domains` bound, so callers should pass the most frequent
/// labels first.
///
/// # Errors
///
/// Returns [`ConsolidationError::AllBatchesFailed`] when every first-pass
/// batch failed. A failed re-pass falls back to the previous pass instead.
pub async fn consolidate(
    invoker: &Invoker,
    labels: &[String],
    options: ConsolidationOptions,
) -> Result<ThemeMap, ConsolidationError> {
    let mut seen = HashSet::new();
    let mut bounded: Vec<String> = labels
        .iter()
        .map(|label| label.trim())
        .filter(|label| !label.is_empty() && seen.insert(*label))
        .map(str::to_string)
        .collect();

    if bounded.len() > options.max_domains {
        tracing::info!(
            total = bounded.len(),
            kept = options.max_domains,
            "limiting theme consolidation to the leading domains"
        );
        bounded.truncate(options.max_domains);
    }
    if bounded.is_empty() {
        return Ok(ThemeMap::new());
    }

    let first = cluster(invoker, &bounded, options.batch_size, 1).await;
    if first.all_failed() {
        return Err(ConsolidationError::AllBatchesFailed {
            batches: first.batches,
        });
    }
    if !first.unassigned.is_empty() {
        tracing::warn!(
            dropped = first.unassigned.len(),
            failed_batches = first.failed_batches,
            "labels from failed batches were dropped"
        );
    }
    tracing::info!(
        domains = bounded.len(),
        themes = first.themes.len(),
        "first consolidation pass complete"
    );

    let mut current = first.themes;
    let mut pass = 1;
    while pass < options.max_passes
        && current.len() > 1
        && (pass == 1 || current.len() > options.repass_threshold)
    {
        pass += 1;
        let names: Vec<String> = current.keys().cloned().collect();
        let batch_size = if names.len() <= options.single_call_limit {
            names.len()
        } else {
            options.batch_size
        };

        let outcome = cluster(invoker, &names, batch_size, pass).await;
        if outcome.all_failed() {
            tracing::warn!(
                pass,
                themes = current.len(),
                "re-consolidation failed; keeping previous pass"
            );
            break;
        }

        let mut level = outcome.themes;
        for name in outcome.unassigned {
            level.entry(name.clone()).or_default().push(name);
        }
        let merged = expand(level, &current);
        let progressed = merged.len() < current.len();
        tracing::info!(
            pass,
            before = current.len(),
            after = merged.len(),
            "re-consolidation pass complete"
        );
        current = merged;
        if !progressed {
            break;
        }
    }

    Ok(current)
}

/// One clustering pass over `labels`, in contiguous batches.
async fn cluster(
    invoker: &Invoker,
    labels: &[String],
    batch_size: usize,
    pass: u32,
) -> PassOutcome {
    let batch_size = batch_size.max(1);
    let batches = labels.len().div_ceil(batch_size);
    let mut themes = ThemeMap::new();
    let mut assigned = HashSet::new();
    let mut unassigned = Vec::new();
    let mut failed_batches = 0;

    for (index, batch) in labels.chunks(batch_size).enumerate() {
        match cluster_batch(invoker, batch).await {
            Ok(groups) => merge_batch(&mut themes, &mut assigned, batch, groups),
            Err(reason) => {
                tracing::warn!(
                    pass,
                    batch = index + 1,
                    batches,
                    %reason,
                    "consolidation batch skipped"
                );
                failed_batches += 1;
                unassigned.extend(batch.iter().cloned());
            }
        }
    }

    PassOutcome {
        themes,
        batches,
        failed_batches,
        unassigned,
    }
}

async fn cluster_batch(
    invoker: &Invoker,
    batch: &[String],
) -> Result<Map<String, Value>, String> {
    let raw = invoker
        .invoke("consolidate_themes", &prompts::theme_consolidation(batch))
        .await
        .map_err(|e| e.to_string())?;

    match parse_model_output::<Value>(&raw) {
        ModelOutput::Parsed(Value::Object(groups)) => Ok(groups),
        ModelOutput::Parsed(_) => Err("expected a JSON object of theme groups".to_string()),
        ModelOutput::Malformed { reason, .. } => Err(reason),
    }
}

fn merge_batch(
    themes: &mut ThemeMap,
    assigned: &mut HashSet<String>,
    batch: &[String],
    groups: Map<String, Value>,
) {
    let members: HashSet<&str> = batch.iter().map(String::as_str).collect();

    for (theme, value) in groups {
        let theme = theme.trim();
        let Value::Array(items) = value else {
            continue;
        };
        if theme.is_empty() {
            continue;
        }
        for item in items {
            let Value::String(label) = item else {
                continue;
            };
            if members.contains(label.as_str()) && assigned.insert(label.clone()) {
                themes.entry(theme.to_string()).or_default().push(label);
            }
        }
    }

    for label in batch {
        if assigned.insert(label.clone()) {
            themes.entry(label.clone()).or_default().push(label.clone());
        }
    }
}

/// Resolves each second-level group through the previous map.
fn expand(level: ThemeMap, previous: &ThemeMap) -> ThemeMap {
    level
        .into_iter()
        .map(|(theme, intermediates)| {
            let leaves = intermediates
                .iter()
                .filter_map(|name| previous.get(name))
                .flatten()
                .cloned()
                .collect();
            (theme, leaves)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use picopitch_llm::LlmError;
    use serde_json::json;

    use super::*;
    use crate::testing::{listed_labels, scripted_invoker};

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn identity(listed: &[String]) -> String {
        let map: Map<String, Value> = listed
            .iter()
            .map(|l| (l.clone(), json!([l])))
            .collect();
        Value::Object(map).to_string()
    }

    fn leaves(map: &ThemeMap) -> Vec<String> {
        let mut all: Vec<String> = map.values().flatten().cloned().collect();
        all.sort();
        all
    }

    #[tokio::test]
    async fn empty_input_needs_no_model_call() {
        let invoker = scripted_invoker(|_| panic!("model must not be called"));
        let themes = consolidate(&invoker, &[], ConsolidationOptions::default())
            .await
            .unwrap();
        assert!(themes.is_empty());
    }

    #[tokio::test]
    async fn output_partitions_every_input_label() {
        let input = labels(&[
            "Invoice Automation",
            "Invoicing",
            "Billing Tools",
            "Social Media Marketing",
            "Digital Marketing",
        ]);
        let invoker = scripted_invoker(|prompt| {
            let listed = listed_labels(prompt);
            let reply = if listed.iter().any(|l| l == "Invoicing") {
                json!({
                    "Billing": ["Invoice Automation", "Invoicing", "Billing Tools"],
                    "Marketing": ["Social Media Marketing"],
                    "Hallucinated": ["Not An Input"]
                })
            } else {
                json!({
                    "Marketing": ["Marketing", "Digital Marketing"],
                    "Billing": ["Billing"]
                })
            };
            Ok(format!("```json\n{reply}\n```"))
        });

        let themes = consolidate(&invoker, &input, ConsolidationOptions::default())
            .await
            .unwrap();

        let mut expected = input.clone();
        expected.sort();
        assert_eq!(leaves(&themes), expected);
        assert_eq!(themes.len(), 2);
        assert_eq!(
            themes["Marketing"],
            labels(&["Social Media Marketing", "Digital Marketing"])
        );
        assert!(!themes.contains_key("Hallucinated"));
    }

    #[tokio::test]
    async fn failed_batch_is_skipped_and_others_kept() {
        let input = labels(&["a1", "a2", "b1", "b2", "c1", "c2"]);
        let invoker = scripted_invoker(|prompt| {
            let listed = listed_labels(prompt);
            if listed.iter().any(|l| l == "b1") {
                Err(LlmError::RateLimited("quota exhausted".into()))
            } else {
                Ok(identity(&listed))
            }
        });
        let options = ConsolidationOptions {
            batch_size: 2,
            ..ConsolidationOptions::default()
        };

        let themes = consolidate(&invoker, &input, options).await.unwrap();
        assert_eq!(leaves(&themes), labels(&["a1", "a2", "c1", "c2"]));
    }

    #[tokio::test]
    async fn every_batch_failing_is_an_error() {
        let invoker = scripted_invoker(|_| Ok("not json".into()));
        let options = ConsolidationOptions {
            batch_size: 2,
            ..ConsolidationOptions::default()
        };
        let err = consolidate(&invoker, &labels(&["a", "b", "c"]), options)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConsolidationError::AllBatchesFailed { batches: 2 }
        ));
    }

    #[tokio::test]
    async fn same_theme_from_two_batches_is_unioned() {
        let input = labels(&["Rust CLI", "Go CLI", "Cargo plugins", "IDE plugins"]);
        let invoker = scripted_invoker(|prompt| {
            Ok(json!({ "Developer Tooling": listed_labels(prompt) }).to_string())
        });
        let options = ConsolidationOptions {
            batch_size: 2,
            ..ConsolidationOptions::default()
        };

        let themes = consolidate(&invoker, &input, options).await.unwrap();
        assert_eq!(themes.len(), 1);
        assert_eq!(themes["Developer Tooling"], input);
    }

    #[tokio::test]
    async fn failed_repass_keeps_first_pass() {
        let invoker = scripted_invoker(|prompt| {
            if listed_labels(prompt).iter().any(|l| l == "alpha") {
                Ok(json!({ "A": ["alpha"], "B": ["beta"] }).to_string())
            } else {
                Ok("I could not decide".into())
            }
        });

        let themes = consolidate(
            &invoker,
            &labels(&["alpha", "beta"]),
            ConsolidationOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(themes["A"], labels(&["alpha"]));
        assert_eq!(themes["B"], labels(&["beta"]));
    }

    #[tokio::test]
    async fn bound_keeps_leading_unique_labels() {
        let input = labels(&["one", "two", "one", " ", "three", "four", "five"]);
        let invoker = scripted_invoker(|prompt| Ok(identity(&listed_labels(prompt))));
        let options = ConsolidationOptions {
            max_domains: 3,
            ..ConsolidationOptions::default()
        };

        let themes = consolidate(&invoker, &input, options).await.unwrap();
        assert_eq!(leaves(&themes), labels(&["one", "three", "two"]));
    }

    #[tokio::test]
    async fn zero_domain_bound_yields_empty_map() {
        let invoker = scripted_invoker(|_| panic!("model must not be called"));
        let options = ConsolidationOptions {
            max_domains: 0,
            ..ConsolidationOptions::default()
        };

        let themes = consolidate(&invoker, &labels(&["one", "two"]), options)
            .await
            .unwrap();
        assert!(themes.is_empty());
    }

    #[tokio::test]
    async fn large_maps_get_a_third_pass() {
        let input = labels(&["a", "b", "c", "d"]);
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let invoker = scripted_invoker(move |prompt| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let listed = listed_labels(prompt);
            // Merge the first two listed labels each pass.
            let mut groups = Map::new();
            groups.insert(listed[0].clone(), json!([listed[0], listed[1]]));
            Ok(Value::Object(groups).to_string())
        });
        let options = ConsolidationOptions {
            repass_threshold: 1,
            ..ConsolidationOptions::default()
        };

        let themes = consolidate(&invoker, &input, options).await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(themes.len(), 1);
        assert_eq!(leaves(&themes), input);
    }
}
