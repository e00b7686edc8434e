use crate::catalog::CatalogStore;
use crate::fragdb::config;
use crate::models::{CatalogEntry, LocalProduct, MatchRecord};
use crate::normalize::Normalizer;
use crate::rules::Rules;
use std::collections::{BTreeMap, HashSet};
use strsim::normalized_levenshtein;
use tracing::debug;

pub const DEFAULT_THRESHOLD: f64 = 0.55;

const SEQUENCE_WEIGHT: f64 = 0.6;
const OVERLAP_WEIGHT: f64 = 0.4;

/// Blended similarity between two matching keys: an edit-distance ratio
/// weighted against plain word overlap, both in [0, 1].
pub fn score(query_key: &str, entry_key: &str) -> f64 {
    let sequence = normalized_levenshtein(query_key, entry_key);
    let overlap = token_overlap(query_key, entry_key);
    SEQUENCE_WEIGHT * sequence + OVERLAP_WEIGHT * overlap
}

fn token_overlap(a: &str, b: &str) -> f64 {
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let shared = words_a.intersection(&words_b).count();
    shared as f64 / words_a.len().max(words_b.len()) as f64
}

/// Picks the strictly best-scoring entry for one query key, or nothing if
/// even the best falls below the threshold. Ties keep the first-seen
/// entry.
pub fn best_match(
    query_key: &str,
    entries: &[CatalogEntry],
    normalizer: &Normalizer,
    threshold: f64,
) -> Option<MatchRecord> {
    let mut best_score = 0.0_f64;
    let mut best_entry: Option<&CatalogEntry> = None;
    for entry in entries {
        let entry_key = normalizer.matching_key(&entry.display_name);
        let candidate = score(query_key, &entry_key);
        if candidate > best_score {
            best_score = candidate;
            best_entry = Some(entry);
        }
    }
    let entry = best_entry?;
    if best_score < threshold {
        return None;
    }
    Some(MatchRecord {
        remote_id: entry.remote_id,
        remote_url: entry.remote_url.clone(),
        image_url: config::image_url_for(entry.remote_id),
        score: best_score,
    })
}

#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub matches: BTreeMap<String, MatchRecord>,
    pub unmatched: u64,
    pub unresolved: u64,
}

/// Scores every group against its resolved namespace. Pure and cheap, so
/// it is recomputed from the current catalog on every run; the output is
/// deterministic for a given catalog and query set.
pub fn match_groups(
    groups: &BTreeMap<String, Vec<usize>>,
    products: &[LocalProduct],
    catalog: &CatalogStore,
    rules: &Rules,
    normalizer: &Normalizer,
    threshold: f64,
) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();
    for (group_key, members) in groups {
        let Some(brand) = members.first().map(|idx| products[*idx].brand.as_str()) else {
            continue;
        };
        let Some(slug) = rules.resolve(brand) else {
            outcome.unresolved += 1;
            continue;
        };
        let entries = catalog.entries(slug).unwrap_or_default();
        if entries.is_empty() {
            outcome.unmatched += 1;
            continue;
        }
        let query_key = normalizer.matching_key(group_key);
        match best_match(&query_key, entries, normalizer, threshold) {
            Some(record) => {
                debug!(
                    target = "sillage.match",
                    group = group_key.as_str(),
                    remote_id = record.remote_id,
                    score = record.score,
                    "group_matched"
                );
                outcome.matches.insert(group_key.clone(), record);
            }
            None => outcome.unmatched += 1,
        }
    }
    outcome
}
