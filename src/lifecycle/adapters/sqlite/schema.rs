//! Diesel schema for lifecycle persistence.

diesel::table! {
    /// Performance periods.
    periods (id) {
        /// Period identifier (UUID text).
        id -> Text,
        /// First day of the period.
        start_date -> Date,
        /// Last day of the period, null while open.
        end_date -> Nullable<Date>,
        /// Current-period flag.
        is_current -> Bool,
        /// Creation timestamp (RFC 3339).
        created_at -> Text,
    }
}

diesel::table! {
    /// Task records with their transition history.
    tasks (id) {
        /// Task identifier (UUID text).
        id -> Text,
        /// Task title.
        title -> Text,
        /// Optional description.
        description -> Nullable<Text>,
        /// Optional assignee.
        resource -> Nullable<Text>,
        /// Optional classification tag.
        category -> Nullable<Text>,
        /// Current status, mirrored from the last log entry.
        status -> Text,
        /// Owning period.
        period_id -> Text,
        /// JSON array of transition entries.
        transition_log -> Text,
        /// Creation timestamp (RFC 3339).
        created_at -> Text,
        /// Last update timestamp (RFC 3339).
        updated_at -> Text,
        /// Tombstone timestamp (RFC 3339).
        deleted_at -> Nullable<Text>,
    }
}

diesel::joinable!(tasks -> periods (period_id));
diesel::allow_tables_to_appear_in_same_query!(periods, tasks);
