use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::ids::{ProjectId, TicketId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub project_id: ProjectId,
    /// Per-project sequence number issued at creation.
    pub number: i64,
    pub title: String,
    pub tags: BTreeSet<String>,
}

/// Trim tags and drop blanks. Duplicates collapse because a ticket's tags
/// are a set.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| tag.as_ref().trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Count tag occurrences across every ticket's tag set.
///
/// Full recompute; the result does not depend on iteration order.
pub fn tally_tags<'a, I>(tag_sets: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = &'a BTreeSet<String>>,
{
    let mut counts = BTreeMap::new();
    for tag in tag_sets.into_iter().flatten() {
        *counts.entry(tag.clone()).or_insert(0) += 1;
    }
    counts
}
