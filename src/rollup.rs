//! Seven-day aggregation of daily reports against the weekly plan.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::carry_forward::{
    LastKnown, ACCUMULATED_READING_PERCENT, BOOK_TITLE, WEEKLY_READING_RATE, WORD_COUNT,
};
use crate::models::{short_day, week_start, weekday_name, DailyReport, TaskDefinition, WEEK};
use crate::plan::WeeklyPlan;
use crate::reading::{daily_expected_percent, ReadingCursor};
use crate::tier::{classify, Effort, TierThresholds};

pub const EXPECTED_MATH_POINTS: &str = "expected_math_points";
pub const ACTUAL_MATH_POINTS: &str = "actual_math_points";
pub const MATH_TIME: &str = "math_time";

/// Planned minutes of math per planned point.
pub const MINUTES_PER_MATH_POINT: f64 = 2.0;

/// One day of the window. `None` means nothing was entered or planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayProgress {
    pub date: NaiveDate,
    pub day: String,
    pub has_report: bool,
    pub actual_math_points: Option<f64>,
    pub expected_math_points: Option<f64>,
    pub math_time: Option<f64>,
    pub expected_math_time: Option<f64>,
    pub daily_reading_percent: Option<f64>,
    pub expected_daily_reading_percent: Option<i64>,
}

/// Zero-filled view of a [`DayProgress`] for plotting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub day: String,
    pub actual_math_points: f64,
    pub expected_math_points: f64,
    pub math_time: f64,
    pub expected_math_time: f64,
    pub daily_reading_percent: f64,
    pub expected_daily_reading_percent: f64,
}

impl DayProgress {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            day: short_day(date.weekday()).to_string(),
            has_report: false,
            actual_math_points: None,
            expected_math_points: None,
            math_time: None,
            expected_math_time: None,
            daily_reading_percent: None,
            expected_daily_reading_percent: None,
        }
    }

    pub fn chart_point(&self) -> ChartPoint {
        ChartPoint {
            day: self.day.clone(),
            actual_math_points: self.actual_math_points.unwrap_or(0.0),
            expected_math_points: self.expected_math_points.unwrap_or(0.0),
            math_time: self.math_time.unwrap_or(0.0),
            expected_math_time: self.expected_math_time.unwrap_or(0.0),
            daily_reading_percent: self.daily_reading_percent.unwrap_or(0.0),
            expected_daily_reading_percent: self.expected_daily_reading_percent.unwrap_or(0) as f64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklyTotals {
    pub actual_math_points: f64,
    pub expected_math_points: f64,
    pub actual_math_time: f64,
    pub expected_math_time: f64,
    pub actual_reading_percent: f64,
    pub expected_reading_percent: f64,
}

impl WeeklyTotals {
    fn from_days(days: &[DayProgress]) -> Self {
        let mut totals = days.iter().fold(Self::default(), |mut totals, day| {
            totals.actual_math_points += day.actual_math_points.unwrap_or(0.0);
            totals.expected_math_points += day.expected_math_points.unwrap_or(0.0);
            totals.actual_math_time += day.math_time.unwrap_or(0.0);
            totals.expected_math_time += day.expected_math_time.unwrap_or(0.0);
            totals.actual_reading_percent += day.daily_reading_percent.unwrap_or(0.0);
            totals.expected_reading_percent +=
                day.expected_daily_reading_percent.unwrap_or(0) as f64;
            totals
        });
        totals.actual_reading_percent = totals.actual_reading_percent.round();
        totals.expected_reading_percent = totals.expected_reading_percent.round();
        totals
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(flatten)]
    pub totals: WeeklyTotals,
    pub effort: Effort,
}

/// Planned-vs-completed matrix for the active custom text tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextTasks {
    /// slug -> label
    pub labels: BTreeMap<String, String>,
    /// slug -> weekday name -> planned value
    pub plan: BTreeMap<String, BTreeMap<String, String>>,
    /// slug -> short day -> completed
    pub completion: BTreeMap<String, BTreeMap<String, bool>>,
}

impl TextTasks {
    pub fn is_planned(&self, slug: &str, day: Weekday) -> bool {
        self.plan
            .get(slug)
            .is_some_and(|days| days.contains_key(weekday_name(day)))
    }

    pub fn is_done(&self, slug: &str, day: Weekday) -> bool {
        self.completion
            .get(slug)
            .and_then(|days| days.get(short_day(day)))
            .copied()
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupResult {
    #[serde(rename = "dailyData")]
    pub daily_data: Vec<DayProgress>,
    pub summary: Summary,
    #[serde(rename = "textTasks")]
    pub text_tasks: TextTasks,
}

/// Rolls up the Monday-to-Sunday week containing `reference_date`.
///
/// `context` holds the carry-forward values as of that Monday and seeds the
/// reading rate, book length and accumulated progress. Reports outside the
/// week are ignored.
pub fn build_rollup(
    reference_date: NaiveDate,
    definitions: &[TaskDefinition],
    plan: &WeeklyPlan,
    reports: &[DailyReport],
    context: &LastKnown,
    thresholds: Option<TierThresholds>,
) -> RollupResult {
    let monday = week_start(reference_date);
    let by_date: BTreeMap<NaiveDate, &DailyReport> =
        reports.iter().map(|report| (report.date, report)).collect();

    let custom_tasks: Vec<&TaskDefinition> = definitions
        .iter()
        .filter(|def| def.is_custom_text())
        .collect();

    let mut rate = Some(context.reading_rate());
    let mut count = context.word_count;
    let mut cursor = ReadingCursor {
        accumulated: context.accumulated_reading_percent,
        title: context.book_title.clone(),
    };

    let mut text_tasks = TextTasks::default();
    for def in &custom_tasks {
        text_tasks.labels.insert(def.slug.clone(), def.label.clone());
        text_tasks.plan.insert(def.slug.clone(), plan.week_for(&def.slug));
        text_tasks.completion.insert(def.slug.clone(), BTreeMap::new());
    }

    let mut daily_data = Vec::with_capacity(WEEK.len());
    for (offset, weekday) in WEEK.iter().enumerate() {
        let date = monday + Duration::days(offset as i64);
        let report = by_date.get(&date).copied();

        if let Some(report) = report {
            rate = report.number(WEEKLY_READING_RATE).or(rate);
            count = report.number(WORD_COUNT).or(count);
        }

        let expected_math_points = plan.expected_number(*weekday, EXPECTED_MATH_POINTS);
        let title = report.and_then(|r| r.text(BOOK_TITLE));
        let daily_reading_percent = cursor.advance(
            report.and_then(|r| r.number(ACCUMULATED_READING_PERCENT)),
            title.as_deref(),
        );

        for def in &custom_tasks {
            let done = report.is_some_and(|r| r.is_filled(&def.slug));
            if let Some(days) = text_tasks.completion.get_mut(&def.slug) {
                days.insert(short_day(*weekday).to_string(), done);
            }
        }

        daily_data.push(DayProgress {
            has_report: report.is_some(),
            actual_math_points: report.and_then(|r| r.number(ACTUAL_MATH_POINTS)),
            expected_math_points,
            math_time: report.and_then(|r| r.number(MATH_TIME)),
            expected_math_time: expected_math_points.map(|p| p * MINUTES_PER_MATH_POINT),
            daily_reading_percent,
            expected_daily_reading_percent: daily_expected_percent(rate, count),
            ..DayProgress::empty(date)
        });
    }

    let totals = WeeklyTotals::from_days(&daily_data);
    let effort = classify(&daily_data, &totals, &text_tasks, thresholds, reference_date);

    RollupResult {
        daily_data,
        summary: Summary { totals, effort },
        text_tasks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldType, FieldValue};
    use crate::registry::TaskRegistry;
    use crate::tier::{Scope, Tier};

    // 2024-03-11 is a Monday.
    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn registry() -> TaskRegistry {
        let mut registry = TaskRegistry::with_defaults();
        registry.add_custom("Piano", None, FieldType::Text).unwrap();
        registry.add_custom("Chores", None, FieldType::Text).unwrap();
        registry
    }

    fn plan(registry: &TaskRegistry) -> WeeklyPlan {
        let mut plan = WeeklyPlan::new();
        for day in [Weekday::Mon, Weekday::Tue, Weekday::Thu, Weekday::Fri] {
            plan.set(day, EXPECTED_MATH_POINTS, "2", registry).unwrap();
            plan.set(day, "piano", "scales", registry).unwrap();
        }
        plan
    }

    fn context() -> LastKnown {
        LastKnown {
            book_title: Some("Matilda".into()),
            word_count: Some(100000.0),
            accumulated_reading_percent: Some(10.0),
            expected_weekly_reading_rate: Some(35000.0),
        }
    }

    fn reports() -> Vec<DailyReport> {
        vec![
            DailyReport::new(date(11))
                .with(ACTUAL_MATH_POINTS, FieldValue::Number(2.0))
                .with(MATH_TIME, FieldValue::Number(5.0))
                .with(ACCUMULATED_READING_PERCENT, FieldValue::Number(15.0))
                .with("piano", FieldValue::text("done")),
            DailyReport::new(date(13))
                .with(ACTUAL_MATH_POINTS, FieldValue::Number(3.0))
                .with(ACCUMULATED_READING_PERCENT, FieldValue::Number(22.0))
                .with("piano", FieldValue::text("extra practice")),
            DailyReport::new(date(14))
                .with(ACTUAL_MATH_POINTS, FieldValue::text("oops"))
                .with("chores", FieldValue::text("  ")),
        ]
    }

    fn build(reference: NaiveDate) -> RollupResult {
        let registry = registry();
        build_rollup(
            reference,
            registry.definitions(),
            &plan(&registry),
            &reports(),
            &context(),
            None,
        )
    }

    #[test]
    fn window_covers_monday_to_sunday_in_order() {
        let rollup = build(date(13));
        let days: Vec<&str> = rollup.daily_data.iter().map(|d| d.day.as_str()).collect();
        assert_eq!(days, ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]);
        assert_eq!(rollup.daily_data[0].date, date(11));
        assert_eq!(rollup.daily_data[6].date, date(17));
    }

    #[test]
    fn missing_days_stay_absent_but_chart_as_zero() {
        let rollup = build(date(13));
        let tuesday = &rollup.daily_data[1];
        assert!(!tuesday.has_report);
        assert_eq!(tuesday.actual_math_points, None);
        assert_eq!(tuesday.expected_math_points, Some(2.0));
        assert_eq!(tuesday.expected_math_time, Some(4.0));
        assert_eq!(tuesday.chart_point().actual_math_points, 0.0);

        let wednesday = &rollup.daily_data[2];
        assert_eq!(wednesday.expected_math_points, None);
        assert_eq!(wednesday.chart_point().expected_math_points, 0.0);
    }

    #[test]
    fn unparseable_numbers_are_not_counted_as_zero_entries() {
        let rollup = build(date(14));
        let thursday = &rollup.daily_data[3];
        assert!(thursday.has_report);
        assert_eq!(thursday.actual_math_points, None);
    }

    #[test]
    fn totals_sum_the_week() {
        let totals = build(date(17)).summary.totals;
        assert_eq!(totals.actual_math_points, 5.0);
        assert_eq!(totals.expected_math_points, 8.0);
        assert_eq!(totals.actual_math_time, 5.0);
        assert_eq!(totals.expected_math_time, 16.0);
        // 15 - 10 on Monday, 22 - 15 on Wednesday
        assert_eq!(totals.actual_reading_percent, 12.0);
        // 5% a day from 35000 words a week over a 100000 word book
        assert_eq!(totals.expected_reading_percent, 35.0);
    }

    #[test]
    fn reading_rate_changes_apply_from_that_day() {
        let registry = registry();
        let reports = vec![DailyReport::new(date(13))
            .with(WEEKLY_READING_RATE, FieldValue::Number(70000.0))];
        let rollup = build_rollup(
            date(13),
            registry.definitions(),
            &WeeklyPlan::new(),
            &reports,
            &context(),
            None,
        );
        let expected: Vec<Option<i64>> = rollup
            .daily_data
            .iter()
            .map(|d| d.expected_daily_reading_percent)
            .collect();
        assert_eq!(
            expected,
            [Some(5), Some(5), Some(10), Some(10), Some(10), Some(10), Some(10)]
        );
    }

    #[test]
    fn unknown_book_length_has_no_expected_reading() {
        let registry = registry();
        let rollup = build_rollup(
            date(13),
            registry.definitions(),
            &WeeklyPlan::new(),
            &[],
            &LastKnown::default(),
            None,
        );
        assert!(rollup
            .daily_data
            .iter()
            .all(|d| d.expected_daily_reading_percent.is_none()));
        assert_eq!(rollup.summary.effort.tier, Tier::Excellent);
    }

    #[test]
    fn text_task_matrix_tracks_plan_and_completion() {
        let rollup = build(date(13));
        let text = &rollup.text_tasks;
        assert_eq!(text.labels.get("piano").map(String::as_str), Some("Piano"));
        assert_eq!(text.plan["piano"].len(), 4);
        assert_eq!(text.plan["piano"]["Monday"], "scales");
        assert!(text.plan["chores"].is_empty());
        assert!(text.completion["piano"]["Mon"]);
        assert!(text.completion["piano"]["Wed"]);
        assert!(!text.completion["piano"]["Tue"]);
        assert!(!text.completion["chores"]["Thu"]);
        assert_eq!(text.completion["chores"].len(), 7);
        assert!(text.is_planned("piano", Weekday::Thu));
        assert!(!text.is_planned("piano", Weekday::Wed));
        assert!(text.is_done("piano", Weekday::Wed));
        assert!(!text.is_done("unknown", Weekday::Mon));
    }

    #[test]
    fn inactive_tasks_are_left_out() {
        let mut registry = registry();
        registry.set_active("chores", false).unwrap();
        let reports = vec![DailyReport::new(date(12)).with("chores", FieldValue::text("dishes"))];
        let rollup = build_rollup(
            date(17),
            registry.definitions(),
            &WeeklyPlan::new(),
            &reports,
            &context(),
            None,
        );
        assert!(!rollup.text_tasks.labels.contains_key("chores"));
        assert!(!rollup.text_tasks.completion.contains_key("chores"));
        assert!(rollup.summary.effort.extras.is_empty());
    }

    #[test]
    fn unplanned_wednesday_task_is_an_extra_on_sunday() {
        let rollup = build(date(17));
        assert_eq!(rollup.summary.effort.scope, Scope::Final);
        assert_eq!(rollup.summary.effort.extras.get("piano"), Some(&1));
        assert!(rollup.summary.effort.extras.get("chores").is_none());

        let midweek = build(date(13));
        assert_eq!(midweek.summary.effort.scope, Scope::Progress);
        assert!(midweek.summary.effort.extras.is_empty());
    }

    #[test]
    fn midweek_effort_uses_days_so_far() {
        // Mon..Wed: actual 2 + 3 math, 5 + 7 reading; expected 2 + 2 math, 5 * 3 reading
        let effort = build(date(13)).summary.effort;
        assert!((effort.overall_pct - 17.0 / 19.0).abs() < 1e-9);
        assert_eq!(effort.tier, Tier::Good);
    }

    #[test]
    fn rebuilding_gives_identical_output() {
        let first = serde_json::to_string(&build(date(15))).unwrap();
        let second = serde_json::to_string(&build(date(15))).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"dailyData\""));
        assert!(first.contains("\"textTasks\""));
    }
}
