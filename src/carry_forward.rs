//! Last-known values for the sticky reading fields.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{DailyReport, FieldValue};
use crate::store::TrackerStore;

pub const DEFAULT_WEEKLY_READING_RATE: f64 = 35000.0;

pub const BOOK_TITLE: &str = "book_title";
pub const WORD_COUNT: &str = "word_count";
pub const ACCUMULATED_READING_PERCENT: &str = "accumulated_reading_percent";
pub const WEEKLY_READING_RATE: &str = "expected_weekly_reading_rate";

pub const CARRY_FORWARD_FIELDS: [&str; 4] = [
    BOOK_TITLE,
    WORD_COUNT,
    ACCUMULATED_READING_PERCENT,
    WEEKLY_READING_RATE,
];

/// Most recent entered value per field, each resolved independently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastKnown {
    pub book_title: Option<String>,
    pub word_count: Option<f64>,
    pub accumulated_reading_percent: Option<f64>,
    pub expected_weekly_reading_rate: Option<f64>,
}

impl LastKnown {
    /// Scans `history` for entries strictly before `as_of`. Order of `history` does not matter.
    pub fn from_history<'a>(
        history: impl IntoIterator<Item = &'a DailyReport>,
        as_of: NaiveDate,
    ) -> Self {
        let mut latest: [Option<(NaiveDate, &'a FieldValue)>; 4] = [None; 4];

        for report in history.into_iter().filter(|r| r.date < as_of) {
            for (slot, slug) in latest.iter_mut().zip(CARRY_FORWARD_FIELDS) {
                let Some(value) = report.value(slug) else {
                    continue;
                };
                if slot.map_or(true, |(date, _)| report.date > date) {
                    *slot = Some((report.date, value));
                }
            }
        }

        let [title, count, accumulated, rate] = latest.map(|slot| slot.map(|(_, value)| value));
        Self {
            book_title: title.map(|v| v.to_string().trim().to_string()),
            word_count: count.and_then(FieldValue::as_number),
            accumulated_reading_percent: accumulated.and_then(FieldValue::as_number),
            expected_weekly_reading_rate: rate.and_then(FieldValue::as_number),
        }
    }

    /// Weekly reading rate with the default applied when it was never set.
    pub fn reading_rate(&self) -> f64 {
        self.expected_weekly_reading_rate
            .unwrap_or(DEFAULT_WEEKLY_READING_RATE)
    }

    pub fn with_rate_default(mut self) -> Self {
        self.expected_weekly_reading_rate = Some(self.reading_rate());
        self
    }
}

/// Resolves carry-forward values through the store.
///
/// A store failure is logged and treated as empty history.
pub async fn resolve_last_known(
    store: &dyn TrackerStore,
    learner: Uuid,
    as_of: NaiveDate,
) -> LastKnown {
    match store.last_known(learner, as_of).await {
        Ok(found) => found.with_rate_default(),
        Err(err) => {
            tracing::warn!(%learner, %as_of, error = %err, "carry-forward lookup failed, using empty history");
            LastKnown::default().with_rate_default()
        }
    }
}
