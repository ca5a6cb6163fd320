//! Fetch-then-compute entry points used by the CLI.
//!
//! Each function gathers its inputs through [`TrackerStore`] and hands them to
//! the pure core. Nothing derived is written back except by `save_daily_report`.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, Weekday};
use uuid::Uuid;

use crate::carry_forward::{
    resolve_last_known, ACCUMULATED_READING_PERCENT, BOOK_TITLE, CARRY_FORWARD_FIELDS,
    WEEKLY_READING_RATE, WORD_COUNT,
};
use crate::error::{ServiceError, StoreError};
use crate::models::{
    week_start, DailyReport, FieldType, FieldValue, TaskDefinition, WeeklyResult, WEEK,
};
use crate::plan::WeeklyPlan;
use crate::reading::{daily_expected_percent, display_percent};
use crate::registry::TaskRegistry;
use crate::rollup::{build_rollup, RollupResult};
use crate::store::TrackerStore;
use crate::tier::{Scope, TierThresholds};

pub const EXPECTED_DAILY_READING_PERCENT: &str = "expected_daily_reading_percent";

pub type FieldMap = BTreeMap<String, Option<FieldValue>>;

/// Values to pre-populate the daily form for `date`.
///
/// Existing entries win; empty sticky fields fall back to the last known value
/// before `date`. The expected daily reading percent is always recomputed and
/// is an empty string when the book length is unknown.
pub async fn compute_daily_defaults(
    store: &dyn TrackerStore,
    learner: Uuid,
    date: NaiveDate,
) -> Result<FieldMap, StoreError> {
    let definitions = store.definitions(learner).await?;
    let report = store.report(learner, date).await?;
    let last = resolve_last_known(store, learner, date).await;

    let mut values = FieldMap::new();
    for def in definitions.iter().filter(|def| def.is_active) {
        let mut value = report.as_ref().and_then(|r| r.value(&def.slug).cloned());
        if value.is_none() && CARRY_FORWARD_FIELDS.contains(&def.slug.as_str()) {
            value = match def.slug.as_str() {
                BOOK_TITLE => last.book_title.clone().map(FieldValue::Text),
                WORD_COUNT => last.word_count.map(FieldValue::Number),
                ACCUMULATED_READING_PERCENT => {
                    last.accumulated_reading_percent.map(FieldValue::Number)
                }
                WEEKLY_READING_RATE => Some(FieldValue::Number(last.reading_rate())),
                _ => None,
            };
        }
        values.insert(def.slug.clone(), value);
    }

    let number = |slug: &str, fallback: Option<f64>| {
        values
            .get(slug)
            .and_then(|v| v.as_ref())
            .and_then(FieldValue::as_number)
            .or(fallback)
    };
    let rate = number(WEEKLY_READING_RATE, Some(last.reading_rate()));
    let count = number(WORD_COUNT, last.word_count);
    let percent = match daily_expected_percent(rate, count) {
        Some(p) => FieldValue::Number(p as f64),
        None => FieldValue::Text(display_percent(None)),
    };
    values.insert(EXPECTED_DAILY_READING_PERCENT.to_string(), Some(percent));

    Ok(values)
}

/// Weekly rollup for the week containing `date`, usable mid-week and on Sunday.
pub async fn compute_weekly_rollup(
    store: &dyn TrackerStore,
    learner: Uuid,
    date: NaiveDate,
) -> Result<RollupResult, StoreError> {
    let monday = week_start(date);
    let sunday = monday + Duration::days(6);

    let definitions = store.definitions(learner).await?;
    let plan = store.plan(learner).await?;
    let reports = store.reports_between(learner, monday, sunday).await?;
    let context = resolve_last_known(store, learner, monday).await;
    let thresholds = load_thresholds(store).await;

    let rollup = build_rollup(date, &definitions, &plan, &reports, &context, thresholds);
    tracing::debug!(
        %learner,
        week = %monday,
        scope = %rollup.summary.effort.scope,
        tier = %rollup.summary.effort.tier,
        overall_pct = rollup.summary.effort.overall_pct,
        "weekly rollup computed"
    );
    Ok(rollup)
}

/// Stores the outcome of a finished week. Mid-week rollups are not recorded.
pub async fn record_weekly_result(
    store: &dyn TrackerStore,
    learner: Uuid,
    rollup: &RollupResult,
) -> Result<Option<WeeklyResult>, StoreError> {
    let effort = &rollup.summary.effort;
    if effort.scope != Scope::Final {
        return Ok(None);
    }
    let Some(first) = rollup.daily_data.first() else {
        return Ok(None);
    };

    let result = WeeklyResult {
        learner_id: learner,
        week_start: week_start(first.date),
        overall_pct: effort.overall_pct,
        tier: effort.tier.to_string(),
    };
    store.save_weekly_result(&result).await?;
    tracing::info!(%learner, week = %result.week_start, tier = %effort.tier, "weekly result recorded");
    Ok(Some(result))
}

async fn load_thresholds(store: &dyn TrackerStore) -> Option<TierThresholds> {
    match store.tier_thresholds().await {
        Ok(thresholds) => thresholds,
        Err(err) => {
            tracing::warn!(error = %err, "tier thresholds unavailable, using defaults");
            None
        }
    }
}

/// Normalises and stores one day's entries.
///
/// Unknown slugs and readonly (derived) fields are dropped, blank values become
/// "not entered", and numeric fields that do not parse are dropped with a
/// warning. The reading rate and book length are resolved from the incoming
/// values or carried forward so later days can compute expected reading.
pub async fn save_daily_report(
    store: &dyn TrackerStore,
    learner: Uuid,
    date: NaiveDate,
    incoming: &FieldMap,
) -> Result<DailyReport, StoreError> {
    let definitions = store.definitions(learner).await?;
    let last = resolve_last_known(store, learner, date).await;

    let mut report = DailyReport::new(date);
    for def in definitions.iter().filter(|def| !def.readonly) {
        let raw = incoming
            .get(&def.slug)
            .and_then(|v| v.as_ref())
            .filter(|v| !v.is_blank());
        let value = match raw {
            Some(value) if def.field_type.is_numeric() => {
                let parsed = value.as_number().map(FieldValue::Number);
                if parsed.is_none() {
                    tracing::warn!(%learner, %date, slug = %def.slug, value = %value, "ignoring non-numeric entry");
                }
                parsed
            }
            Some(FieldValue::Text(text)) => Some(FieldValue::Text(text.trim().to_string())),
            Some(value) => Some(value.clone()),
            None => None,
        };
        report.values.insert(def.slug.clone(), value);
    }

    if let Some(slot) = report.values.get_mut(WEEKLY_READING_RATE) {
        if slot.is_none() {
            *slot = Some(FieldValue::Number(last.reading_rate()));
        }
    }
    if let Some(slot) = report.values.get_mut(WORD_COUNT) {
        if slot.is_none() {
            *slot = last.word_count.map(FieldValue::Number);
        }
    }

    store.save_report(learner, &report).await?;
    tracing::info!(%learner, %date, fields = report.values.len(), "daily report saved");
    Ok(report)
}

/// Adds a custom task definition for the learner.
pub async fn define_task(
    store: &dyn TrackerStore,
    learner: Uuid,
    label: &str,
    slug: Option<&str>,
    field_type: FieldType,
) -> Result<TaskDefinition, ServiceError> {
    let mut registry = TaskRegistry::new(store.definitions(learner).await?);
    let added = registry.add_custom(label, slug, field_type)?.clone();
    store
        .save_definitions(learner, registry.definitions())
        .await?;
    tracing::info!(%learner, slug = %added.slug, "task defined");
    Ok(added)
}

/// Deactivates a definition and clears its planned values; history is kept.
pub async fn deactivate_task(
    store: &dyn TrackerStore,
    learner: Uuid,
    slug: &str,
) -> Result<(), ServiceError> {
    let mut registry = TaskRegistry::new(store.definitions(learner).await?);
    registry.set_active(slug, false)?;
    let mut plan = store.plan(learner).await?;
    let cleared = planned_days(&plan, slug);
    plan.clear_slug(slug);

    store
        .save_definitions(learner, registry.definitions())
        .await?;
    store.save_plan(learner, &plan).await?;
    tracing::info!(%learner, %slug, cleared, "task deactivated");
    Ok(())
}

/// Deletes a custom definition outright. Defaults can only be deactivated.
pub async fn remove_task(
    store: &dyn TrackerStore,
    learner: Uuid,
    slug: &str,
) -> Result<TaskDefinition, ServiceError> {
    let mut registry = TaskRegistry::new(store.definitions(learner).await?);
    let removed = registry.remove(slug)?;
    let mut plan = store.plan(learner).await?;
    let cleared = planned_days(&plan, slug);
    plan.clear_slug(slug);

    store
        .save_definitions(learner, registry.definitions())
        .await?;
    store.save_plan(learner, &plan).await?;
    tracing::info!(%learner, %slug, cleared, "task removed");
    Ok(removed)
}

fn planned_days(plan: &WeeklyPlan, slug: &str) -> usize {
    WEEK.iter().filter(|day| plan.is_planned(**day, slug)).count()
}

pub async fn set_plan_entry(
    store: &dyn TrackerStore,
    learner: Uuid,
    day: Weekday,
    slug: &str,
    value: &str,
) -> Result<(), ServiceError> {
    let registry = TaskRegistry::new(store.definitions(learner).await?);
    let mut plan = store.plan(learner).await?;
    plan.set(day, slug, value, &registry)?;
    store.save_plan(learner, &plan).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carry_forward::DEFAULT_WEEKLY_READING_RATE;
    use crate::error::RegistryError;
    use crate::store::memory::MemoryStore;
    use crate::tier::Tier;

    // 2024-03-11 is a Monday.
    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    async fn setup() -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let learner = store.add_learner("sam@example.com");
        let mut registry = TaskRegistry::with_defaults();
        registry.add_custom("Piano", None, FieldType::Text).unwrap();
        store
            .save_definitions(learner, registry.definitions())
            .await
            .unwrap();
        (store, learner)
    }

    fn entries(pairs: &[(&str, FieldValue)]) -> FieldMap {
        pairs
            .iter()
            .map(|(slug, value)| (slug.to_string(), Some(value.clone())))
            .collect()
    }

    #[tokio::test]
    async fn defaults_carry_sticky_fields_forward() {
        let (store, learner) = setup().await;
        save_daily_report(
            &store,
            learner,
            date(4),
            &entries(&[
                (BOOK_TITLE, FieldValue::text("Matilda")),
                (WORD_COUNT, FieldValue::text("100000")),
                (ACCUMULATED_READING_PERCENT, FieldValue::Number(40.0)),
                ("math_time", FieldValue::Number(20.0)),
            ]),
        )
        .await
        .unwrap();

        let defaults = compute_daily_defaults(&store, learner, date(11)).await.unwrap();
        assert_eq!(defaults[BOOK_TITLE], Some(FieldValue::text("Matilda")));
        assert_eq!(defaults[WORD_COUNT], Some(FieldValue::Number(100000.0)));
        assert_eq!(
            defaults[WEEKLY_READING_RATE],
            Some(FieldValue::Number(DEFAULT_WEEKLY_READING_RATE))
        );
        assert_eq!(defaults["math_time"], None);
        assert_eq!(
            defaults[EXPECTED_DAILY_READING_PERCENT],
            Some(FieldValue::Number(5.0))
        );
    }

    #[tokio::test]
    async fn defaults_keep_todays_entries() {
        let (store, learner) = setup().await;
        save_daily_report(
            &store,
            learner,
            date(4),
            &entries(&[(BOOK_TITLE, FieldValue::text("Matilda"))]),
        )
        .await
        .unwrap();
        save_daily_report(
            &store,
            learner,
            date(5),
            &entries(&[
                ("math_time", FieldValue::Number(15.0)),
                ("piano", FieldValue::text("scales")),
            ]),
        )
        .await
        .unwrap();

        let defaults = compute_daily_defaults(&store, learner, date(5)).await.unwrap();
        assert_eq!(defaults["math_time"], Some(FieldValue::Number(15.0)));
        assert_eq!(defaults["piano"], Some(FieldValue::text("scales")));
        assert_eq!(defaults[BOOK_TITLE], Some(FieldValue::text("Matilda")));
    }

    #[tokio::test]
    async fn unknown_book_length_gives_an_empty_expected_percent() {
        let (store, learner) = setup().await;
        let defaults = compute_daily_defaults(&store, learner, date(11)).await.unwrap();
        assert_eq!(
            defaults[EXPECTED_DAILY_READING_PERCENT],
            Some(FieldValue::text(""))
        );
        assert_eq!(defaults[WORD_COUNT], None);
    }

    #[tokio::test]
    async fn saving_normalises_entries() {
        let (store, learner) = setup().await;
        let mut incoming = entries(&[
            ("actual_math_points", FieldValue::text("lots")),
            ("math_time", FieldValue::text(" 25 ")),
            ("piano", FieldValue::text("  ")),
            (BOOK_TITLE, FieldValue::text(" Matilda ")),
            (EXPECTED_DAILY_READING_PERCENT, FieldValue::Number(99.0)),
            ("not_a_field", FieldValue::text("x")),
        ]);
        incoming.insert(WORD_COUNT.to_string(), None);

        let saved = save_daily_report(&store, learner, date(12), &incoming)
            .await
            .unwrap();
        assert_eq!(saved.values["actual_math_points"], None);
        assert_eq!(saved.values["math_time"], Some(FieldValue::Number(25.0)));
        assert_eq!(saved.values["piano"], None);
        assert_eq!(saved.values[BOOK_TITLE], Some(FieldValue::text("Matilda")));
        assert_eq!(saved.values[WORD_COUNT], None);
        assert_eq!(
            saved.values[WEEKLY_READING_RATE],
            Some(FieldValue::Number(DEFAULT_WEEKLY_READING_RATE))
        );
        assert!(!saved.values.contains_key(EXPECTED_DAILY_READING_PERCENT));
        assert!(!saved.values.contains_key("not_a_field"));
        assert_eq!(store.report(learner, date(12)).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn weekly_rollup_end_to_end() {
        let (store, learner) = setup().await;
        set_plan_entry(&store, learner, Weekday::Mon, "expected_math_points", "5")
            .await
            .unwrap();
        set_plan_entry(&store, learner, Weekday::Mon, "piano", "scales")
            .await
            .unwrap();
        store
            .save_tier_thresholds(&TierThresholds::new(0.5, 0.9).unwrap())
            .await
            .unwrap();
        save_daily_report(
            &store,
            learner,
            date(11),
            &entries(&[
                ("actual_math_points", FieldValue::Number(7.0)),
                ("piano", FieldValue::text("done")),
            ]),
        )
        .await
        .unwrap();
        save_daily_report(
            &store,
            learner,
            date(13),
            &entries(&[("piano", FieldValue::text("more"))]),
        )
        .await
        .unwrap();

        let rollup = compute_weekly_rollup(&store, learner, date(17)).await.unwrap();
        let effort = &rollup.summary.effort;
        assert_eq!(effort.scope, Scope::Final);
        assert_eq!(effort.tier, Tier::Excellent);
        assert_eq!(effort.extra_math_points, Some(2.0));
        assert_eq!(effort.extras.get("piano"), Some(&1));

        let again = compute_weekly_rollup(&store, learner, date(17)).await.unwrap();
        assert_eq!(
            serde_json::to_vec(&rollup).unwrap(),
            serde_json::to_vec(&again).unwrap()
        );
    }

    #[tokio::test]
    async fn learners_are_found_regardless_of_email_case() {
        let store = MemoryStore::new();
        let id = store.add_learner("Sam.Jones@Example.com");
        let found = store.learner_by_email(" sam.jones@EXAMPLE.com").await.unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.email, "sam.jones@example.com");
        assert!(matches!(
            store.learner_by_email("sam@example.com").await,
            Err(StoreError::LearnerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn stored_thresholds_drive_the_weekly_tier() {
        let (store, learner) = setup().await;
        set_plan_entry(&store, learner, Weekday::Mon, "expected_math_points", "20")
            .await
            .unwrap();
        save_daily_report(
            &store,
            learner,
            date(11),
            &entries(&[("actual_math_points", FieldValue::Number(11.0))]),
        )
        .await
        .unwrap();

        let before = compute_weekly_rollup(&store, learner, date(11)).await.unwrap();
        assert!((before.summary.effort.overall_pct - 0.55).abs() < 1e-9);
        assert_eq!(before.summary.effort.tier, Tier::NeedsWork);

        store
            .save_tier_thresholds(&TierThresholds::new(0.5, 0.6).unwrap())
            .await
            .unwrap();
        let after = compute_weekly_rollup(&store, learner, date(11)).await.unwrap();
        assert_eq!(after.summary.effort.overall_pct, before.summary.effort.overall_pct);
        assert_eq!(after.summary.effort.tier, Tier::Good);
    }

    #[tokio::test]
    async fn later_reports_do_not_change_earlier_defaults() {
        let (store, learner) = setup().await;
        save_daily_report(
            &store,
            learner,
            date(4),
            &entries(&[(BOOK_TITLE, FieldValue::text("Matilda"))]),
        )
        .await
        .unwrap();
        let before = compute_daily_defaults(&store, learner, date(6)).await.unwrap();

        save_daily_report(
            &store,
            learner,
            date(6),
            &entries(&[(WORD_COUNT, FieldValue::Number(5000.0))]),
        )
        .await
        .unwrap();
        save_daily_report(
            &store,
            learner,
            date(9),
            &entries(&[(BOOK_TITLE, FieldValue::text("The BFG"))]),
        )
        .await
        .unwrap();

        let after = compute_daily_defaults(&store, learner, date(6)).await.unwrap();
        assert_eq!(after[BOOK_TITLE], before[BOOK_TITLE]);
        assert_eq!(before[BOOK_TITLE], Some(FieldValue::text("Matilda")));

        let known = resolve_last_known(&store, learner, date(6)).await;
        assert_eq!(known.word_count, None);
    }

    #[tokio::test]
    async fn deactivation_clears_the_plan_but_keeps_history() {
        let (store, learner) = setup().await;
        set_plan_entry(&store, learner, Weekday::Tue, "piano", "scales")
            .await
            .unwrap();
        save_daily_report(
            &store,
            learner,
            date(12),
            &entries(&[("piano", FieldValue::text("done"))]),
        )
        .await
        .unwrap();

        deactivate_task(&store, learner, "piano").await.unwrap();

        assert!(!store.plan(learner).await.unwrap().is_planned(Weekday::Tue, "piano"));
        let report = store.report(learner, date(12)).await.unwrap().unwrap();
        assert!(report.is_filled("piano"));
        let rollup = compute_weekly_rollup(&store, learner, date(17)).await.unwrap();
        assert!(rollup.text_tasks.labels.is_empty());
    }

    #[tokio::test]
    async fn duplicate_definitions_are_rejected() {
        let (store, learner) = setup().await;
        let err = define_task(&store, learner, "Piano", None, FieldType::Text)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Registry(RegistryError::DuplicateSlug(_))
        ));
        let added = define_task(&store, learner, "Spelling Words", None, FieldType::Number)
            .await
            .unwrap();
        assert_eq!(added.slug, "spelling_words");
    }

    #[tokio::test]
    async fn only_custom_tasks_can_be_removed() {
        let (store, learner) = setup().await;
        set_plan_entry(&store, learner, Weekday::Mon, "piano", "scales")
            .await
            .unwrap();

        let err = remove_task(&store, learner, "book_title").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Registry(RegistryError::ProtectedDefault(_))
        ));

        let removed = remove_task(&store, learner, "piano").await.unwrap();
        assert_eq!(removed.label, "Piano");
        let definitions = store.definitions(learner).await.unwrap();
        assert!(definitions.iter().all(|def| def.slug != "piano"));
        assert!(!store.plan(learner).await.unwrap().is_planned(Weekday::Mon, "piano"));
    }

    #[tokio::test]
    async fn only_final_weeks_are_recorded() {
        let (store, learner) = setup().await;
        let midweek = compute_weekly_rollup(&store, learner, date(14)).await.unwrap();
        assert_eq!(record_weekly_result(&store, learner, &midweek).await.unwrap(), None);

        let sunday = compute_weekly_rollup(&store, learner, date(17)).await.unwrap();
        let recorded = record_weekly_result(&store, learner, &sunday)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recorded.week_start, date(11));
        assert_eq!(recorded.tier, "excellent");
        assert_eq!(store.results().len(), 1);
    }

    #[tokio::test]
    async fn failing_thresholds_fall_back_to_defaults() {
        let store = MemoryStore::failing();
        assert_eq!(load_thresholds(&store).await, None);
        let err = compute_weekly_rollup(&store, Uuid::new_v4(), date(13)).await;
        assert!(matches!(err, Err(StoreError::Unavailable(_))));
    }
}
