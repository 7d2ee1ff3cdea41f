//! Database schema for jobs.db.
//!
//! Defines versioned schema migrations for the download jobs database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

// =============================================================================
// Download Jobs Table - Version 0
// =============================================================================

const DOWNLOAD_JOBS_TABLE_V0: Table = Table {
    name: "download_jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("source_url", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("requested_format", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("progress", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("output_location", &SqlType::Text),
        sqlite_column!("last_error", &SqlType::Text),
        sqlite_column!("attempts", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("completed_at", &SqlType::Integer),
    ],
    indices: &[
        ("idx_jobs_status", "status"),
        ("idx_jobs_created_at", "created_at"),
    ],
};

pub const DOWNLOAD_JOBS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[DOWNLOAD_JOBS_TABLE_V0],
    migration: None,
}];
