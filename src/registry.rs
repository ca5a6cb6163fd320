//! Per-learner set of tracked fields.
//!
//! Slugs are validated once, when a definition is created, and never derived
//! from labels again afterwards.

use crate::error::RegistryError;
use crate::models::{FieldType, TaskDefinition};

pub const MAX_SLUG_LEN: usize = 63;

const DEFAULT_FIELDS: [(&str, &str, FieldType, bool); 11] = [
    ("expected_math_points", "Math (Pts)", FieldType::Number, false),
    ("actual_math_points", "Math (Pts)", FieldType::Number, false),
    ("math_time", "Math Time (mins)", FieldType::Number, false),
    ("book_title", "Book Title", FieldType::Text, false),
    ("word_count", "Word Count", FieldType::Number, false),
    (
        "expected_daily_reading_percent",
        "Expected Daily Reading (%)",
        FieldType::Number,
        true,
    ),
    (
        "accumulated_reading_percent",
        "Reading Progress (%)",
        FieldType::Number,
        false,
    ),
    (
        "expected_weekly_reading_percent",
        "Expected Weekly Reading Progress (%)",
        FieldType::Number,
        true,
    ),
    (
        "expected_weekly_reading_rate",
        "Number of Words Read per Week",
        FieldType::Number,
        false,
    ),
    (
        "daily_reading_percent",
        "Actual Daily Reading Progress (%)",
        FieldType::Number,
        true,
    ),
    (
        "accumulated_weekly_reading_percent",
        "Reading Progress (reset each week) (%)",
        FieldType::Number,
        true,
    ),
];

pub fn default_definitions() -> Vec<TaskDefinition> {
    DEFAULT_FIELDS
        .iter()
        .map(|(slug, label, field_type, readonly)| TaskDefinition {
            slug: slug.to_string(),
            label: label.to_string(),
            field_type: *field_type,
            is_default: true,
            is_active: true,
            readonly: *readonly,
        })
        .collect()
}

/// Snake-cases a label: "Piano Practice!" becomes "piano_practice".
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

pub fn validate_slug(slug: &str) -> Result<(), RegistryError> {
    let mut chars = slug.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let valid = starts_with_letter
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidSlug(slug.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskRegistry {
    definitions: Vec<TaskDefinition>,
}

impl TaskRegistry {
    pub fn new(definitions: Vec<TaskDefinition>) -> Self {
        Self { definitions }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_definitions())
    }

    pub fn definitions(&self) -> &[TaskDefinition] {
        &self.definitions
    }

    pub fn get(&self, slug: &str) -> Option<&TaskDefinition> {
        self.definitions.iter().find(|def| def.slug == slug)
    }

    /// Adds a custom definition. The slug is taken as given or derived from the label.
    pub fn add_custom(
        &mut self,
        label: &str,
        slug: Option<&str>,
        field_type: FieldType,
    ) -> Result<&TaskDefinition, RegistryError> {
        let label = label.trim();
        let slug = match slug.map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => slug.to_string(),
            None => slugify(label),
        };
        validate_slug(&slug)?;

        if self.get(&slug).is_some() {
            return Err(RegistryError::DuplicateSlug(slug));
        }

        self.definitions.push(TaskDefinition {
            slug,
            label: label.to_string(),
            field_type,
            is_default: false,
            is_active: true,
            readonly: false,
        });
        let added = self.definitions.len() - 1;
        Ok(&self.definitions[added])
    }

    pub fn set_active(&mut self, slug: &str, active: bool) -> Result<(), RegistryError> {
        let def = self
            .definitions
            .iter_mut()
            .find(|def| def.slug == slug)
            .ok_or_else(|| RegistryError::UnknownSlug(slug.to_string()))?;
        def.is_active = active;
        Ok(())
    }

    pub fn remove(&mut self, slug: &str) -> Result<TaskDefinition, RegistryError> {
        let index = self
            .definitions
            .iter()
            .position(|def| def.slug == slug)
            .ok_or_else(|| RegistryError::UnknownSlug(slug.to_string()))?;
        if self.definitions[index].is_default {
            return Err(RegistryError::ProtectedDefault(slug.to_string()));
        }
        Ok(self.definitions.remove(index))
    }
}
