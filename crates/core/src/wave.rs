//! Priority bucketing shared by the rollout engine and the manifest pipeline.
//!
//! parse tag -> bucket -> sort keys ascending -> sort each bucket by name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Resource, Result, APPLY_WAVE_ANNOTATION, DEFAULT_APPLY_WAVE};

/// Anything that can be placed in a wave.
pub trait Prioritized {
    /// Raw wave annotation, if any.
    fn wave_tag(&self) -> Option<&str>;
    /// Name used to order members inside a wave.
    fn sort_name(&self) -> &str;
}

impl Prioritized for Resource {
    fn wave_tag(&self) -> Option<&str> { self.annotation(APPLY_WAVE_ANNOTATION) }
    fn sort_name(&self) -> &str { self.name() }
}

/// Non-empty group of items sharing one tag, ordered by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wave<T> {
    pub tag: i64,
    pub items: Vec<T>,
}

impl<T: Prioritized> Wave<T> {
    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.sort_name()).collect()
    }
}

/// Missing or empty tags map to [`DEFAULT_APPLY_WAVE`]; anything else must be an integer.
pub fn parse_wave_tag(raw: Option<&str>, name: &str) -> Result<i64> {
    match raw {
        None | Some("") => Ok(DEFAULT_APPLY_WAVE),
        Some(v) => v.parse::<i64>().map_err(|source| Error::InvalidWave {
            name: name.to_string(),
            value: v.to_string(),
            source,
        }),
    }
}

/// Partition `items` into waves in ascending tag order.
///
/// Fails on the first malformed tag without returning a partial grouping.
pub fn group_into_waves<T, I>(items: I) -> Result<Vec<Wave<T>>>
where
    T: Prioritized,
    I: IntoIterator<Item = T>,
{
    let mut buckets: BTreeMap<i64, Vec<T>> = BTreeMap::new();
    for item in items {
        let tag = parse_wave_tag(item.wave_tag(), item.sort_name())?;
        buckets.entry(tag).or_default().push(item);
    }
    Ok(buckets
        .into_iter()
        .map(|(tag, mut items)| {
            // stable: equal names keep input order
            items.sort_by(|a, b| a.sort_name().cmp(b.sort_name()));
            Wave { tag, items }
        })
        .collect())
}
