//! Diesel row models for lifecycle persistence.

use super::schema::{periods, tasks};
use chrono::NaiveDate;
use diesel::prelude::*;

/// Row model for period records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = periods)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PeriodRow {
    /// Period identifier.
    pub id: String,
    /// First day of the period.
    pub start_date: NaiveDate,
    /// Last day of the period.
    pub end_date: Option<NaiveDate>,
    /// Current-period flag.
    pub is_current: bool,
    /// Creation timestamp.
    pub created_at: String,
}

/// Row model for task records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskRow {
    /// Task identifier.
    pub id: String,
    /// Task title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional assignee.
    pub resource: Option<String>,
    /// Optional classification tag.
    pub category: Option<String>,
    /// Current status.
    pub status: String,
    /// Owning period.
    pub period_id: String,
    /// Serialized transition log.
    pub transition_log: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
    /// Tombstone timestamp.
    pub deleted_at: Option<String>,
}
