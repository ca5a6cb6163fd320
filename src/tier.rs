use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::WEEK;
use crate::rollup::{DayProgress, TextTasks, WeeklyTotals};

pub const DEFAULT_NEEDS_WORK_MAX: f64 = 0.88;
pub const DEFAULT_GOOD_MAX: f64 = 0.98;

/// Ordered from least to most effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    NeedsWork,
    Good,
    Excellent,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::NeedsWork => "needsWork",
            Tier::Good => "good",
            Tier::Excellent => "excellent",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "needsWork" | "needs_work" | "needs-work" => Ok(Tier::NeedsWork),
            "good" => Ok(Tier::Good),
            "excellent" => Ok(Tier::Excellent),
            other => Err(ConfigError::UnknownTier(other.to_string())),
        }
    }
}

/// Mid-week summaries are provisional; the Sunday summary is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Progress,
    Final,
}

impl Scope {
    pub fn for_date(date: NaiveDate) -> Self {
        if date.weekday() == Weekday::Sun {
            Scope::Final
        } else {
            Scope::Progress
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Progress => "progress",
            Scope::Final => "final",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "progress" => Ok(Scope::Progress),
            "final" => Ok(Scope::Final),
            other => Err(ConfigError::UnknownScope(other.to_string())),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawThresholds {
    needs_work_max: f64,
    good_max: f64,
}

/// Tier boundaries; only constructible when `0 < needs_work_max < good_max <= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawThresholds")]
pub struct TierThresholds {
    needs_work_max: f64,
    good_max: f64,
}

impl TierThresholds {
    pub fn new(needs_work_max: f64, good_max: f64) -> Result<Self, ConfigError> {
        if needs_work_max > 0.0 && needs_work_max < good_max && good_max <= 1.0 {
            Ok(Self {
                needs_work_max,
                good_max,
            })
        } else {
            Err(ConfigError::ThresholdOrder {
                needs_work_max,
                good_max,
            })
        }
    }

    /// Reads back persisted bounds. Invalid rows are logged and ignored so the defaults apply.
    pub fn from_stored(needs_work_max: f64, good_max: f64) -> Option<Self> {
        match Self::new(needs_work_max, good_max) {
            Ok(thresholds) => Some(thresholds),
            Err(err) => {
                tracing::warn!(error = %err, "stored tier thresholds are invalid, using defaults");
                None
            }
        }
    }

    pub fn needs_work_max(&self) -> f64 {
        self.needs_work_max
    }

    pub fn good_max(&self) -> f64 {
        self.good_max
    }

    /// Lower bounds are inclusive: a ratio equal to `needs_work_max` is `Good`.
    pub fn tier_for(&self, ratio: f64) -> Tier {
        if ratio < self.needs_work_max {
            Tier::NeedsWork
        } else if ratio < self.good_max {
            Tier::Good
        } else {
            Tier::Excellent
        }
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            needs_work_max: DEFAULT_NEEDS_WORK_MAX,
            good_max: DEFAULT_GOOD_MAX,
        }
    }
}

impl TryFrom<RawThresholds> for TierThresholds {
    type Error = ConfigError;

    fn try_from(raw: RawThresholds) -> Result<Self, Self::Error> {
        Self::new(raw.needs_work_max, raw.good_max)
    }
}

pub fn default_message(scope: Scope, tier: Tier) -> &'static str {
    match (scope, tier) {
        (Scope::Progress, Tier::Excellent) => "Awesome - you're on track for a great week!",
        (Scope::Progress, Tier::Good) => {
            "You're doing well - but keep focusing on your daily to-dos."
        }
        (Scope::Progress, Tier::NeedsWork) => {
            "Uh-oh - looks like you're falling behind. Try and make up some of your missed tasks"
        }
        (Scope::Final, Tier::Excellent) => "Woo!! Goal achieved! Double pocket money this week!",
        (Scope::Final, Tier::Good) => "A solid effort - try for a bonus next week!",
        (Scope::Final, Tier::NeedsWork) => {
            "Tsk tsk - not enough effort. You're on the chore roster next week!"
        }
    }
}

/// Configured wording per scope and tier. Gaps fall back to [`default_message`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierMessages {
    #[serde(default)]
    progress: BTreeMap<Tier, String>,
    #[serde(default, rename = "final")]
    final_: BTreeMap<Tier, String>,
}

impl TierMessages {
    fn scope_map(&self, scope: Scope) -> &BTreeMap<Tier, String> {
        match scope {
            Scope::Progress => &self.progress,
            Scope::Final => &self.final_,
        }
    }

    pub fn get(&self, scope: Scope, tier: Tier) -> &str {
        self.scope_map(scope)
            .get(&tier)
            .map(String::as_str)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| default_message(scope, tier))
    }

    pub fn set(&mut self, scope: Scope, tier: Tier, message: &str) {
        let map = match scope {
            Scope::Progress => &mut self.progress,
            Scope::Final => &mut self.final_,
        };
        map.insert(tier, message.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effort {
    pub scope: Scope,
    pub tier: Tier,
    pub overall_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_math_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_reading_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, u32>,
}

impl Effort {
    pub fn message<'a>(&self, messages: &'a TierMessages) -> &'a str {
        messages.get(self.scope, self.tier)
    }

    /// Human wording for the bonus effort, e.g. "2 extra maths points".
    pub fn bonus_lines(&self, labels: &BTreeMap<String, String>) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(points) = self.extra_math_points {
            lines.push(format!(
                "{} extra maths point{}",
                fmt_amount(points),
                plural(points)
            ));
        }
        if let Some(percent) = self.extra_reading_percent {
            lines.push(format!("{}% extra reading", fmt_amount(percent)));
        }
        for (slug, count) in &self.extras {
            let label = labels.get(slug).map(String::as_str).unwrap_or(slug.as_str());
            lines.push(format!(
                "{count} extra {label} task{}",
                plural(*count as f64)
            ));
        }
        lines
    }
}

fn plural(amount: f64) -> &'static str {
    if amount > 1.0 {
        "s"
    } else {
        ""
    }
}

fn fmt_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{}", amount as i64)
    } else {
        format!("{amount:.1}")
    }
}

/// Classifies the week's effort as of `reference_date`.
///
/// The ratio compares actual against expected math points plus reading percent
/// for the days up to and including `reference_date`. A week with nothing
/// expected yet is vacuously excellent. Extras are only reported on Sunday.
pub fn classify(
    days: &[DayProgress],
    totals: &WeeklyTotals,
    text_tasks: &TextTasks,
    thresholds: Option<TierThresholds>,
    reference_date: NaiveDate,
) -> Effort {
    let thresholds = thresholds.unwrap_or_default();
    let scope = Scope::for_date(reference_date);

    let (actual, expected) = days
        .iter()
        .filter(|day| day.date <= reference_date)
        .fold((0.0, 0.0), |(actual, expected), day| {
            (
                actual
                    + day.actual_math_points.unwrap_or(0.0)
                    + day.daily_reading_percent.unwrap_or(0.0),
                expected
                    + day.expected_math_points.unwrap_or(0.0)
                    + day.expected_daily_reading_percent.unwrap_or(0) as f64,
            )
        });

    let overall_pct = if expected > 0.0 {
        actual / expected
    } else {
        1.0
    };
    let tier = thresholds.tier_for(overall_pct);

    let mut effort = Effort {
        scope,
        tier,
        overall_pct,
        extra_math_points: None,
        extra_reading_percent: None,
        extras: BTreeMap::new(),
    };

    if scope == Scope::Final {
        effort.extra_math_points = positive(totals.actual_math_points - totals.expected_math_points);
        effort.extra_reading_percent =
            positive(totals.actual_reading_percent - totals.expected_reading_percent);
        effort.extras = unplanned_completions(text_tasks);
    }

    effort
}

fn positive(amount: f64) -> Option<f64> {
    (amount > 0.0).then_some(amount)
}

/// Per custom task, days completed without anything planned.
fn unplanned_completions(text_tasks: &TextTasks) -> BTreeMap<String, u32> {
    let mut extras = BTreeMap::new();
    for slug in text_tasks.labels.keys() {
        let count = WEEK
            .iter()
            .filter(|day| text_tasks.is_done(slug, **day) && !text_tasks.is_planned(slug, **day))
            .count() as u32;
        if count > 0 {
            extras.insert(slug.clone(), count);
        }
    }
    extras
}
