//! Persistence seam between the pure core and whatever holds the data.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::carry_forward::LastKnown;
use crate::error::StoreError;
use crate::models::{DailyReport, Learner, TaskDefinition, WeeklyResult};
use crate::plan::WeeklyPlan;
use crate::tier::{Scope, Tier, TierMessages, TierThresholds};

#[async_trait]
pub trait TrackerStore: Send + Sync {
    async fn learner_by_email(&self, email: &str) -> Result<Learner, StoreError>;

    async fn report(&self, learner: Uuid, date: NaiveDate)
        -> Result<Option<DailyReport>, StoreError>;

    /// Reports dated within `start..=end`, oldest first.
    async fn reports_between(
        &self,
        learner: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyReport>, StoreError>;

    /// Carry-forward values from reports strictly before `before`. No defaults applied.
    async fn last_known(&self, learner: Uuid, before: NaiveDate) -> Result<LastKnown, StoreError>;

    async fn save_report(&self, learner: Uuid, report: &DailyReport) -> Result<(), StoreError>;

    async fn plan(&self, learner: Uuid) -> Result<WeeklyPlan, StoreError>;

    async fn save_plan(&self, learner: Uuid, plan: &WeeklyPlan) -> Result<(), StoreError>;

    async fn definitions(&self, learner: Uuid) -> Result<Vec<TaskDefinition>, StoreError>;

    async fn save_definitions(
        &self,
        learner: Uuid,
        definitions: &[TaskDefinition],
    ) -> Result<(), StoreError>;

    async fn tier_thresholds(&self) -> Result<Option<TierThresholds>, StoreError>;

    async fn save_tier_thresholds(&self, thresholds: &TierThresholds) -> Result<(), StoreError>;

    async fn tier_messages(&self) -> Result<TierMessages, StoreError>;

    async fn save_tier_message(
        &self,
        scope: Scope,
        tier: Tier,
        message: &str,
    ) -> Result<(), StoreError>;

    async fn save_weekly_result(&self, result: &WeeklyResult) -> Result<(), StoreError>;
}
