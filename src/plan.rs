use std::collections::BTreeMap;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::models::weekday_name;
use crate::registry::TaskRegistry;

/// Expected values per weekday, keyed by full weekday name and then by slug.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklyPlan {
    days: BTreeMap<String, BTreeMap<String, String>>,
}

impl WeeklyPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Planned value for `slug` on `day`; blank entries count as nothing planned.
    pub fn expected_for(&self, day: Weekday, slug: &str) -> Option<&str> {
        self.days
            .get(weekday_name(day))
            .and_then(|tasks| tasks.get(slug))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn expected_number(&self, day: Weekday, slug: &str) -> Option<f64> {
        self.expected_for(day, slug)
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite())
    }

    pub fn is_planned(&self, day: Weekday, slug: &str) -> bool {
        self.expected_for(day, slug).is_some()
    }

    /// Sets one entry. Numeric definitions only accept integers; an empty value clears the entry.
    pub fn set(
        &mut self,
        day: Weekday,
        slug: &str,
        value: &str,
        registry: &TaskRegistry,
    ) -> Result<(), PlanError> {
        let def = registry
            .get(slug)
            .ok_or_else(|| PlanError::UnknownSlug(slug.to_string()))?;
        let value = value.trim();

        if value.is_empty() {
            if let Some(tasks) = self.days.get_mut(weekday_name(day)) {
                tasks.remove(slug);
            }
            return Ok(());
        }

        if def.field_type.is_numeric() && value.parse::<i64>().is_err() {
            return Err(PlanError::NotAnInteger {
                slug: slug.to_string(),
                value: value.to_string(),
            });
        }

        self.days
            .entry(weekday_name(day).to_string())
            .or_default()
            .insert(slug.to_string(), value.to_string());
        Ok(())
    }

    /// Drops `slug` from every weekday, used when a definition is deactivated.
    pub fn clear_slug(&mut self, slug: &str) {
        for tasks in self.days.values_mut() {
            tasks.remove(slug);
        }
        self.days.retain(|_, tasks| !tasks.is_empty());
    }

    /// Whole-week plan for one slug, weekday name to trimmed value.
    pub fn week_for(&self, slug: &str) -> BTreeMap<String, String> {
        crate::models::WEEK
            .iter()
            .filter_map(|day| {
                self.expected_for(*day, slug)
                    .map(|value| (weekday_name(*day).to_string(), value.to_string()))
            })
            .collect()
    }

    /// Flattened `(weekday name, slug, value)` rows for storage.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.days.iter().flat_map(|(day, tasks)| {
            tasks
                .iter()
                .map(move |(slug, value)| (day.as_str(), slug.as_str(), value.as_str()))
        })
    }

    /// Loads a stored row without validation; stored rows were validated on write.
    pub fn insert_raw(&mut self, day: Weekday, slug: &str, value: &str) {
        self.days
            .entry(weekday_name(day).to_string())
            .or_default()
            .insert(slug.to_string(), value.to_string());
    }
}
