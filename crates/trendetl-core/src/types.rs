use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Date format accepted on the command line and rendered into logs.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive day range a pipeline run reads from the source and replaces in
/// the destination tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl ObservationWindow {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvertedWindow`] if `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvertedWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse a window from two ISO 8601 dates (`2017-11-14`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDate`] if either string is not a
    /// calendar date, or [`ConfigError::InvertedWindow`] if start > end.
    pub fn parse(start: &str, end: &str) -> Result<Self, ConfigError> {
        Self::new(parse_date("start_dt", start)?, parse_date("end_dt", end)?)
    }

    #[must_use]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for ObservationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

fn parse_date(param: &str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|e| ConfigError::InvalidDate {
        param: param.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// One row of the `trending_vids` source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub record_id: i64,
    pub video_id: String,
    pub region: String,
    pub trending_date: NaiveDate,
    pub channel_title: Option<String>,
    pub category_title: String,
    pub publish_time: Option<NaiveDateTime>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub dislikes: Option<i64>,
    pub comment_count: Option<i64>,
}

impl RawRecord {
    #[must_use]
    pub fn entity_key(&self) -> EntityKey {
        EntityKey {
            region: self.region.clone(),
            video_id: self.video_id.clone(),
            category_title: self.category_title.clone(),
        }
    }

    #[must_use]
    pub fn day_key(&self) -> DayKey {
        DayKey {
            region: self.region.clone(),
            category_title: self.category_title.clone(),
            trending_date: self.trending_date,
        }
    }
}

/// Identity of a video within a region and category.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub region: String,
    pub video_id: String,
    pub category_title: String,
}

/// Grouping key shared by both aggregate tables.
///
/// Field order gives the output ordering: region, then category, then date.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DayKey {
    pub region: String,
    pub category_title: String,
    pub trending_date: NaiveDate,
}

/// Most recent observation of one video inside the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastStateRecord {
    pub region: String,
    pub video_id: String,
    pub category_title: String,
    pub trending_date: NaiveDate,
    pub likes: Option<i64>,
    pub dislikes: Option<i64>,
}

impl LastStateRecord {
    #[must_use]
    pub fn day_key(&self) -> DayKey {
        DayKey {
            region: self.region.clone(),
            category_title: self.category_title.clone(),
            trending_date: self.trending_date,
        }
    }
}

/// A row of `trending_by_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountAggregate {
    pub region: String,
    pub category_title: String,
    pub trending_date: NaiveDate,
    pub videos_count: i64,
}

/// A row of `emotions_by_time_category`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementAggregate {
    pub region: String,
    pub category_title: String,
    pub trending_date: NaiveDate,
    pub likes: i64,
    pub dislikes: i64,
}
