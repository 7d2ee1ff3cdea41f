use anyhow::{bail, Result};
use rusqlite::{params, types::Type, Connection};

pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {{
        // unused_mut fires when no optional field assignment is passed
        #[allow(unused_mut)]
        let mut column = Column {
            name: $name,
            sql_type: $sql_type,
            is_primary_key: false,
            non_null: false,
            default_value: None,
        };
        $(column.$field = $value;)*
        column
    }};
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }

    fn from_sql(text: &str) -> Option<&'static SqlType> {
        match text {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            "REAL" => Some(&SqlType::Real),
            "BLOB" => Some(&SqlType::Blob),
            _ => None,
        }
    }
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_value: Option<S>,
}

impl<S: AsRef<str>> Column<'_, S> {
    fn definition(&self) -> String {
        let mut def = format!("{} {}", self.name.as_ref(), self.sql_type.as_sql());
        if self.is_primary_key {
            def.push_str(" PRIMARY KEY");
        }
        if self.non_null {
            def.push_str(" NOT NULL");
        }
        if let Some(default_value) = &self.default_value {
            def.push_str(&format!(" DEFAULT {}", default_value.as_ref()));
        }
        def
    }
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [(&'static str, &'static str)],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let definitions: Vec<String> = self.columns.iter().map(|c| c.definition()).collect();
        conn.execute(
            &format!("CREATE TABLE {} ({});", self.name, definitions.join(", ")),
            params![],
        )?;

        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, column_name
                ),
                params![],
            )?;
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    /// Check that every table on disk matches this schema column for column.
    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            let actual = read_table_columns(conn, table.name)?;

            if actual.len() != table.columns.len() {
                bail!(
                    "Table {} has {} columns where {} were expected (found: {})",
                    table.name,
                    actual.len(),
                    table.columns.len(),
                    actual
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }

            for (found, expected) in actual.iter().zip(table.columns.iter()) {
                if found.name != expected.name {
                    bail!(
                        "Table {} column name mismatch: {} on disk, {} expected",
                        table.name,
                        found.name,
                        expected.name
                    );
                }
                if found.sql_type != expected.sql_type {
                    bail!(
                        "Table {} column {} type mismatch: {:?} on disk, {:?} expected",
                        table.name,
                        found.name,
                        found.sql_type,
                        expected.sql_type
                    );
                }
                if found.non_null != expected.non_null {
                    bail!(
                        "Table {} column {} non-null mismatch: {} on disk, {} expected",
                        table.name,
                        found.name,
                        found.non_null,
                        expected.non_null
                    );
                }
                // SQLite can report stored defaults wrapped in parentheses.
                let found_default = found.default_value.as_deref().map(strip_outer_parens);
                let expected_default = expected.default_value.map(strip_outer_parens);
                if found_default != expected_default {
                    bail!(
                        "Table {} column {} default value mismatch: {:?} on disk, {:?} expected",
                        table.name,
                        found.name,
                        found_default,
                        expected_default
                    );
                }
                if found.is_primary_key != expected.is_primary_key {
                    bail!(
                        "Table {} column {} primary key mismatch",
                        table.name,
                        found.name
                    );
                }
            }

            for (index_name, _) in table.indices {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1 AND tbl_name = ?2",
                    params![index_name, table.name],
                    |row| row.get(0),
                )?;
                if count == 0 {
                    bail!("Table {} is missing index '{}'", table.name, index_name);
                }
            }
        }
        Ok(())
    }
}

fn read_table_columns(conn: &Connection, table: &str) -> Result<Vec<Column<'static, String>>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table))?;
    let columns = stmt
        .query_map(params![], |row| {
            let type_text: String = row.get(2)?;
            let sql_type = SqlType::from_sql(&type_text).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(2, type_text.clone(), Type::Text)
            })?;
            Ok(Column {
                name: row.get(1)?,
                sql_type,
                non_null: row.get::<_, i32>(3)? == 1,
                default_value: row.get(4)?,
                is_primary_key: row.get::<_, i32>(5)? == 1,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn strip_outer_parens<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();
    s.strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(s)
        .to_string()
}

pub const BASE_DB_VERSION: usize = 31000;
