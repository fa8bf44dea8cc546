//! Pure reductions from extracted records to the two destination aggregates.
//!
//! `trending_by_time` counts every raw appearance of a video per
//! (region, category, day). `emotions_by_time_category` sums likes and
//! dislikes over the *last observed state* of each video only, because those
//! metrics are cumulative counters and summing every snapshot would count the
//! same engagement once per trending day.

use std::collections::BTreeMap;

use crate::types::{
    CountAggregate, DayKey, EngagementAggregate, EntityKey, LastStateRecord, RawRecord,
};

/// Collapse the observations of each (region, video, category) into the most
/// recent one.
///
/// The latest `trending_date` wins. Two observations on the same latest date
/// are resolved in favour of the higher `record_id`, so the result does not
/// depend on input order. Output is ordered by (region, video, category).
#[must_use]
pub fn reduce_last_state(records: &[RawRecord]) -> Vec<LastStateRecord> {
    let mut groups: BTreeMap<EntityKey, Vec<&RawRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.entity_key()).or_default().push(record);
    }

    groups
        .into_iter()
        .filter_map(|(key, observations)| {
            let last = observations
                .into_iter()
                .max_by_key(|r| (r.trending_date, r.record_id))?;
            Some(LastStateRecord {
                region: key.region,
                video_id: key.video_id,
                category_title: key.category_title,
                trending_date: last.trending_date,
                likes: last.likes,
                dislikes: last.dislikes,
            })
        })
        .collect()
}

/// Number of raw rows per (region, category, day). Repeat appearances of one
/// video on different days each count on their own day.
#[must_use]
pub fn count_by_day(records: &[RawRecord]) -> Vec<CountAggregate> {
    let mut counts: BTreeMap<DayKey, i64> = BTreeMap::new();
    for record in records {
        let count = counts.entry(record.day_key()).or_insert(0);
        *count = count.saturating_add(1);
    }

    counts
        .into_iter()
        .map(|(key, videos_count)| CountAggregate {
            region: key.region,
            category_title: key.category_title,
            trending_date: key.trending_date,
            videos_count,
        })
        .collect()
}

/// Sum of likes and dislikes per (region, category, day) over last-state
/// records. Missing metrics add nothing.
#[must_use]
pub fn engagement_by_day(last_states: &[LastStateRecord]) -> Vec<EngagementAggregate> {
    let mut sums: BTreeMap<DayKey, (i64, i64)> = BTreeMap::new();
    for state in last_states {
        let (likes, dislikes) = sums.entry(state.day_key()).or_insert((0, 0));
        *likes = likes.saturating_add(state.likes.unwrap_or(0));
        *dislikes = dislikes.saturating_add(state.dislikes.unwrap_or(0));
    }

    sums.into_iter()
        .map(|(key, (likes, dislikes))| EngagementAggregate {
            region: key.region,
            category_title: key.category_title,
            trending_date: key.trending_date,
            likes,
            dislikes,
        })
        .collect()
}

/// Both aggregates computed from one extraction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Aggregates {
    pub counts: Vec<CountAggregate>,
    pub engagement: Vec<EngagementAggregate>,
}

#[must_use]
pub fn aggregate(records: &[RawRecord], last_states: &[LastStateRecord]) -> Aggregates {
    Aggregates {
        counts: count_by_day(records),
        engagement: engagement_by_day(last_states),
    }
}

#[cfg(test)]
#[path = "transform_test.rs"]
mod tests;
