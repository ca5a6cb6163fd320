use std::collections::{BTreeMap, HashMap};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Weekday};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::carry_forward::{
    LastKnown, ACCUMULATED_READING_PERCENT, BOOK_TITLE, WEEKLY_READING_RATE, WORD_COUNT,
};
use crate::error::StoreError;
use crate::models::{
    normalize_email, parse_weekday, week_start, DailyReport, FieldType, FieldValue, Learner,
    TaskDefinition, WeeklyResult,
};
use crate::plan::WeeklyPlan;
use crate::registry::TaskRegistry;
use crate::service::{self, FieldMap};
use crate::store::TrackerStore;
use crate::tier::{Scope, Tier, TierMessages, TierThresholds};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates (or renames) a learner and gives them the default field set.
    pub async fn add_learner(&self, full_name: &str, email: &str) -> anyhow::Result<Uuid> {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO effort_tracker.learners (id, full_name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(full_name)
        .bind(normalize_email(email))
        .fetch_one(&self.pool)
        .await
        .context("failed to insert learner")?
        .get("id");

        let mut definitions = self.definitions(id).await?;
        for default in TaskRegistry::with_defaults().definitions() {
            if !definitions.iter().any(|def| def.slug == default.slug) {
                definitions.push(default.clone());
            }
        }
        self.save_definitions(id, &definitions).await?;
        Ok(id)
    }

    async fn last_value(
        &self,
        learner: Uuid,
        before: NaiveDate,
        slug: &str,
    ) -> Result<Option<FieldValue>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT fields -> $3 AS value
            FROM effort_tracker.daily_reports
            WHERE learner_id = $1
              AND report_date < $2
              AND NULLIF(btrim(fields ->> $3), '') IS NOT NULL
            ORDER BY report_date DESC
            LIMIT 1
            "#,
        )
        .bind(learner)
        .bind(before)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let value: Json<Option<FieldValue>> = row.try_get("value")?;
                Ok(value.0)
            }
            None => Ok(None),
        }
    }
}

fn report_from_row(row: &sqlx::postgres::PgRow) -> Result<DailyReport, StoreError> {
    let fields: Json<BTreeMap<String, Option<FieldValue>>> = row.try_get("fields")?;
    Ok(DailyReport {
        date: row.try_get("report_date")?,
        values: fields.0,
    })
}

#[async_trait]
impl TrackerStore for PgStore {
    async fn learner_by_email(&self, email: &str) -> Result<Learner, StoreError> {
        let email = normalize_email(email);
        let row = sqlx::query(
            "SELECT id, full_name, email FROM effort_tracker.learners WHERE email = $1",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::LearnerNotFound(email))?;

        Ok(Learner {
            id: row.try_get("id")?,
            full_name: row.try_get("full_name")?,
            email: row.try_get("email")?,
        })
    }

    async fn report(
        &self,
        learner: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DailyReport>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT report_date, fields
            FROM effort_tracker.daily_reports
            WHERE learner_id = $1 AND report_date = $2
            "#,
        )
        .bind(learner)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(report_from_row).transpose()
    }

    async fn reports_between(
        &self,
        learner: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyReport>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT report_date, fields
            FROM effort_tracker.daily_reports
            WHERE learner_id = $1 AND report_date BETWEEN $2 AND $3
            ORDER BY report_date ASC
            "#,
        )
        .bind(learner)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(report_from_row).collect()
    }

    async fn last_known(&self, learner: Uuid, before: NaiveDate) -> Result<LastKnown, StoreError> {
        let title = self.last_value(learner, before, BOOK_TITLE).await?;
        let count = self.last_value(learner, before, WORD_COUNT).await?;
        let accumulated = self
            .last_value(learner, before, ACCUMULATED_READING_PERCENT)
            .await?;
        let rate = self.last_value(learner, before, WEEKLY_READING_RATE).await?;

        Ok(LastKnown {
            book_title: title.map(|v| v.to_string().trim().to_string()),
            word_count: count.and_then(|v| v.as_number()),
            accumulated_reading_percent: accumulated.and_then(|v| v.as_number()),
            expected_weekly_reading_rate: rate.and_then(|v| v.as_number()),
        })
    }

    async fn save_report(&self, learner: Uuid, report: &DailyReport) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO effort_tracker.daily_reports (learner_id, report_date, fields)
            VALUES ($1, $2, $3)
            ON CONFLICT (learner_id, report_date) DO UPDATE
            SET fields = EXCLUDED.fields, updated_at = now()
            "#,
        )
        .bind(learner)
        .bind(report.date)
        .bind(Json(&report.values))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn plan(&self, learner: Uuid) -> Result<WeeklyPlan, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT day_of_week, slug, value
            FROM effort_tracker.plan_entries
            WHERE learner_id = $1
            "#,
        )
        .bind(learner)
        .fetch_all(&self.pool)
        .await?;

        let mut plan = WeeklyPlan::new();
        for row in rows {
            let day: String = row.try_get("day_of_week")?;
            let slug: String = row.try_get("slug")?;
            let value: String = row.try_get("value")?;
            match parse_weekday(&day) {
                Some(weekday) => plan.insert_raw(weekday, &slug, &value),
                None => tracing::warn!(%learner, %day, %slug, "skipping plan entry with unknown weekday"),
            }
        }
        Ok(plan)
    }

    async fn save_plan(&self, learner: Uuid, plan: &WeeklyPlan) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM effort_tracker.plan_entries WHERE learner_id = $1")
            .bind(learner)
            .execute(&mut *tx)
            .await?;

        for (day, slug, value) in plan.entries() {
            sqlx::query(
                r#"
                INSERT INTO effort_tracker.plan_entries (learner_id, day_of_week, slug, value)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(learner)
            .bind(day)
            .bind(slug)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn definitions(&self, learner: Uuid) -> Result<Vec<TaskDefinition>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT slug, label, field_type, is_default, is_active, readonly
            FROM effort_tracker.task_definitions
            WHERE learner_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(learner)
        .fetch_all(&self.pool)
        .await?;

        let mut definitions = Vec::with_capacity(rows.len());
        for row in rows {
            let slug: String = row.try_get("slug")?;
            let field_type: String = row.try_get("field_type")?;
            let field_type = field_type.parse::<FieldType>().unwrap_or_else(|err| {
                tracing::warn!(%learner, %slug, error = %err, "treating unknown field type as text");
                FieldType::Text
            });
            definitions.push(TaskDefinition {
                slug,
                label: row.try_get("label")?,
                field_type,
                is_default: row.try_get("is_default")?,
                is_active: row.try_get("is_active")?,
                readonly: row.try_get("readonly")?,
            });
        }
        Ok(definitions)
    }

    async fn save_definitions(
        &self,
        learner: Uuid,
        definitions: &[TaskDefinition],
    ) -> Result<(), StoreError> {
        let slugs: Vec<String> = definitions.iter().map(|def| def.slug.clone()).collect();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM effort_tracker.task_definitions
            WHERE learner_id = $1 AND NOT is_default AND NOT (slug = ANY($2))
            "#,
        )
        .bind(learner)
        .bind(&slugs)
        .execute(&mut *tx)
        .await?;

        for (position, def) in definitions.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO effort_tracker.task_definitions
                (learner_id, slug, label, field_type, is_default, is_active, readonly, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (learner_id, slug) DO UPDATE
                SET label = EXCLUDED.label,
                    is_active = EXCLUDED.is_active,
                    position = EXCLUDED.position
                "#,
            )
            .bind(learner)
            .bind(&def.slug)
            .bind(&def.label)
            .bind(def.field_type.as_str())
            .bind(def.is_default)
            .bind(def.is_active)
            .bind(def.readonly)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn tier_thresholds(&self) -> Result<Option<TierThresholds>, StoreError> {
        let row = sqlx::query(
            "SELECT needs_work_max, good_max FROM effort_tracker.tier_thresholds WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let needs_work_max: f64 = row.try_get("needs_work_max")?;
        let good_max: f64 = row.try_get("good_max")?;
        Ok(TierThresholds::from_stored(needs_work_max, good_max))
    }

    async fn save_tier_thresholds(&self, thresholds: &TierThresholds) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO effort_tracker.tier_thresholds (id, needs_work_max, good_max)
            VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE
            SET needs_work_max = EXCLUDED.needs_work_max, good_max = EXCLUDED.good_max
            "#,
        )
        .bind(thresholds.needs_work_max())
        .bind(thresholds.good_max())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn tier_messages(&self) -> Result<TierMessages, StoreError> {
        let rows = sqlx::query("SELECT scope, tier, message FROM effort_tracker.tier_messages")
            .fetch_all(&self.pool)
            .await?;

        let mut messages = TierMessages::default();
        for row in rows {
            let scope: String = row.try_get("scope")?;
            let tier: String = row.try_get("tier")?;
            let message: String = row.try_get("message")?;
            match (scope.parse::<Scope>(), tier.parse::<Tier>()) {
                (Ok(scope), Ok(tier)) => messages.set(scope, tier, &message),
                _ => tracing::warn!(%scope, %tier, "skipping unknown tier message"),
            }
        }
        Ok(messages)
    }

    async fn save_tier_message(
        &self,
        scope: Scope,
        tier: Tier,
        message: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO effort_tracker.tier_messages (scope, tier, message)
            VALUES ($1, $2, $3)
            ON CONFLICT (scope, tier) DO UPDATE SET message = EXCLUDED.message
            "#,
        )
        .bind(scope.as_str())
        .bind(tier.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_weekly_result(&self, result: &WeeklyResult) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO effort_tracker.weekly_results (learner_id, week_start, overall_pct, tier)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (learner_id, week_start) DO UPDATE
            SET overall_pct = EXCLUDED.overall_pct, tier = EXCLUDED.tier, recorded_at = now()
            "#,
        )
        .bind(result.learner_id)
        .bind(result.week_start)
        .bind(result.overall_pct)
        .bind(&result.tier)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Demo learner with a custom task, a weekly plan and the current week's reports.
pub async fn seed(store: &PgStore, today: NaiveDate) -> anyhow::Result<Uuid> {
    let learner = store
        .add_learner("Avery Lee", "avery.lee@example.com")
        .await?;

    if let Err(err) = service::define_task(store, learner, "Piano", None, FieldType::Text).await {
        tracing::info!(error = %err, "seed task already present");
    }

    let plan_days = [
        (Weekday::Mon, "10", "scales"),
        (Weekday::Tue, "10", ""),
        (Weekday::Wed, "8", "sonata"),
        (Weekday::Thu, "10", ""),
        (Weekday::Fri, "6", "scales"),
    ];
    for (day, points, piano) in plan_days {
        service::set_plan_entry(store, learner, day, "expected_math_points", points).await?;
        service::set_plan_entry(store, learner, day, "piano", piano).await?;
    }

    let monday = week_start(today);
    let days: [(NaiveDate, Vec<(&str, FieldValue)>); 4] = [
        (
            monday - Duration::days(1),
            vec![
                (BOOK_TITLE, FieldValue::text("Matilda")),
                (WORD_COUNT, FieldValue::Number(40000.0)),
                (WEEKLY_READING_RATE, FieldValue::Number(14000.0)),
                (ACCUMULATED_READING_PERCENT, FieldValue::Number(0.0)),
            ],
        ),
        (
            monday,
            vec![
                ("actual_math_points", FieldValue::Number(10.0)),
                ("math_time", FieldValue::Number(22.0)),
                (ACCUMULATED_READING_PERCENT, FieldValue::Number(6.0)),
                ("piano", FieldValue::text("scales")),
            ],
        ),
        (
            monday + Duration::days(1),
            vec![
                ("actual_math_points", FieldValue::Number(8.0)),
                ("math_time", FieldValue::Number(18.0)),
                (ACCUMULATED_READING_PERCENT, FieldValue::Number(11.0)),
                ("piano", FieldValue::text("arpeggios")),
            ],
        ),
        (
            monday + Duration::days(2),
            vec![
                ("actual_math_points", FieldValue::Number(9.0)),
                (ACCUMULATED_READING_PERCENT, FieldValue::Number(15.0)),
            ],
        ),
    ];

    for (date, fields) in days {
        if date > today {
            break;
        }
        let values: FieldMap = fields
            .into_iter()
            .map(|(slug, value)| (slug.to_string(), Some(value)))
            .collect();
        service::save_daily_report(store, learner, date, &values).await?;
    }

    Ok(learner)
}

/// Imports long-format rows (`email,date,slug,value`) and merges them into
/// existing daily reports. Returns the number of reports written.
pub async fn import_csv(store: &PgStore, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        email: String,
        date: NaiveDate,
        slug: String,
        value: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut grouped: BTreeMap<(String, NaiveDate), FieldMap> = BTreeMap::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let value = row
            .value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(FieldValue::Text);
        grouped
            .entry((normalize_email(&row.email), row.date))
            .or_default()
            .insert(row.slug.trim().to_string(), value);
    }

    let mut learners: HashMap<String, Uuid> = HashMap::new();
    let mut written = 0usize;

    for ((email, date), incoming) in grouped {
        let learner = match learners.get(&email) {
            Some(id) => *id,
            None => {
                let id = store
                    .learner_by_email(&email)
                    .await
                    .with_context(|| format!("unknown learner in import: {email}"))?
                    .id;
                learners.insert(email.clone(), id);
                id
            }
        };

        let mut merged: FieldMap = store
            .report(learner, date)
            .await?
            .map(|report| report.values)
            .unwrap_or_default();
        merged.extend(incoming);

        service::save_daily_report(store, learner, date, &merged).await?;
        written += 1;
    }

    Ok(written)
}
