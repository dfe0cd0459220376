//! Typed description of the warehouse star schema.
//!
//! The loader, the constraint enforcer, `bootstrap`, `audit` and `reset` all read
//! table layouts from here instead of carrying their own DDL strings.

use itertools::Itertools;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    BigInt,
    Double,
    Text,
    Boolean,
}

impl SqlType {
    pub fn as_sql(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
            SqlType::Boolean => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl Column {
    const fn required(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
        }
    }

    const fn optional(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteRule {
    /// Referenced rows cannot be deleted while dependents exist.
    Restrict,
    /// Dependents disappear with the referenced row.
    Cascade,
}

impl DeleteRule {
    pub fn as_sql(self) -> &'static str {
        match self {
            DeleteRule::Restrict => "RESTRICT",
            DeleteRule::Cascade => "CASCADE",
        }
    }
}

/// Foreign key declared on the owning table. Updates always cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: &'static str,
    pub column: &'static str,
    pub references: &'static str,
    pub references_column: &'static str,
    pub on_delete: DeleteRule,
}

impl ForeignKey {
    pub fn add_sql(&self, table: &str) -> String {
        format!(
            "ALTER TABLE {table} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({}) ON UPDATE CASCADE ON DELETE {}",
            self.name,
            self.column,
            self.references,
            self.references_column,
            self.on_delete.as_sql()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueKey {
    pub name: &'static str,
    pub column: &'static str,
}

impl UniqueKey {
    pub fn add_sql(&self, table: &str) -> String {
        format!(
            "ALTER TABLE {table} ADD CONSTRAINT {} UNIQUE ({})",
            self.name, self.column
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Index {
    pub name: &'static str,
    pub column: &'static str,
}

impl Index {
    pub fn create_sql(&self, table: &str) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({})",
            self.name, self.column
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub primary_key: &'static [&'static str],
    pub unique: Option<UniqueKey>,
    pub foreign_keys: &'static [ForeignKey],
    pub indexes: &'static [Index],
}

impl TableSchema {
    pub fn column_names(&self) -> String {
        self.columns.iter().map(|c| c.name).join(", ")
    }

    /// Bare table definition. Keys and indexes are applied later by the
    /// constraint enforcer so loads never fight with half-applied DDL.
    pub fn create_table_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                if c.nullable {
                    format!("{} {}", c.name, c.sql_type.as_sql())
                } else {
                    format!("{} {} NOT NULL", c.name, c.sql_type.as_sql())
                }
            })
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS {} ({columns})", self.name)
    }

    pub fn insert_prefix(&self) -> String {
        format!("INSERT INTO {} ({}) ", self.name, self.column_names())
    }

    pub fn truncate_sql(&self) -> String {
        format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", self.name)
    }

    pub fn primary_key_name(&self) -> String {
        format!("{}_pkey", self.name)
    }

    pub fn add_primary_key_sql(&self) -> Option<String> {
        if self.primary_key.is_empty() {
            return None;
        }
        Some(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
            self.name,
            self.primary_key_name(),
            self.primary_key.join(", ")
        ))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn is_dimension(&self) -> bool {
        self.name.starts_with("dim_")
    }
}

pub const DIM_REGION: TableSchema = TableSchema {
    name: "dim_region",
    columns: &[
        Column::required("region_id", SqlType::Integer),
        Column::required("region_code", SqlType::Text),
    ],
    primary_key: &["region_id"],
    unique: Some(UniqueKey {
        name: "dim_region_region_code_key",
        column: "region_code",
    }),
    foreign_keys: &[],
    indexes: &[],
};

pub const DIM_LANGUAGE: TableSchema = TableSchema {
    name: "dim_language",
    columns: &[
        Column::required("language_id", SqlType::Integer),
        Column::required("language_code", SqlType::Text),
    ],
    primary_key: &["language_id"],
    unique: Some(UniqueKey {
        name: "dim_language_language_code_key",
        column: "language_code",
    }),
    foreign_keys: &[],
    indexes: &[],
};

pub const DIM_GENRE: TableSchema = TableSchema {
    name: "dim_genre",
    columns: &[
        Column::required("genre_id", SqlType::Integer),
        Column::required("genre_name", SqlType::Text),
    ],
    primary_key: &["genre_id"],
    unique: Some(UniqueKey {
        name: "dim_genre_genre_name_key",
        column: "genre_name",
    }),
    foreign_keys: &[],
    indexes: &[],
};

pub const DIM_TIME: TableSchema = TableSchema {
    name: "dim_time",
    columns: &[
        Column::required("time_id", SqlType::Integer),
        // NULL only on the sentinel row
        Column::optional("year", SqlType::Integer),
        Column::optional("decade", SqlType::Integer),
    ],
    primary_key: &["time_id"],
    unique: Some(UniqueKey {
        name: "dim_time_year_key",
        column: "year",
    }),
    foreign_keys: &[],
    indexes: &[],
};

pub const FACT_FILM_VERSION: TableSchema = TableSchema {
    name: "fact_film_version",
    columns: &[
        Column::required("fact_id", SqlType::Integer),
        Column::required("tconst", SqlType::Text),
        Column::required("region_id", SqlType::Integer),
        Column::required("language_id", SqlType::Integer),
        Column::required("time_id", SqlType::Integer),
        Column::optional("is_original_title", SqlType::Boolean),
        Column::required("average_rating", SqlType::Double),
        Column::required("num_votes", SqlType::BigInt),
    ],
    primary_key: &["fact_id"],
    unique: None,
    foreign_keys: &[
        ForeignKey {
            name: "fk_region",
            column: "region_id",
            references: "dim_region",
            references_column: "region_id",
            on_delete: DeleteRule::Restrict,
        },
        ForeignKey {
            name: "fk_language",
            column: "language_id",
            references: "dim_language",
            references_column: "language_id",
            on_delete: DeleteRule::Restrict,
        },
        ForeignKey {
            name: "fk_time",
            column: "time_id",
            references: "dim_time",
            references_column: "time_id",
            on_delete: DeleteRule::Restrict,
        },
    ],
    indexes: &[
        Index {
            name: "idx_fact_film_version_tconst",
            column: "tconst",
        },
        Index {
            name: "idx_fact_film_version_time",
            column: "time_id",
        },
    ],
};

pub const FACT_GENRE_BRIDGE: TableSchema = TableSchema {
    name: "fact_genre_bridge",
    columns: &[
        Column::required("fact_id", SqlType::Integer),
        Column::required("genre_id", SqlType::Integer),
    ],
    primary_key: &["fact_id", "genre_id"],
    unique: None,
    foreign_keys: &[
        ForeignKey {
            name: "fk_bridge_fact",
            column: "fact_id",
            references: "fact_film_version",
            references_column: "fact_id",
            on_delete: DeleteRule::Cascade,
        },
        ForeignKey {
            name: "fk_genre",
            column: "genre_id",
            references: "dim_genre",
            references_column: "genre_id",
            on_delete: DeleteRule::Restrict,
        },
    ],
    indexes: &[Index {
        name: "idx_fact_genre_bridge_genre",
        column: "genre_id",
    }],
};

/// Every warehouse table in load order: dimensions, then fact, then bridge.
pub const WAREHOUSE_TABLES: [&TableSchema; 6] = [
    &DIM_REGION,
    &DIM_LANGUAGE,
    &DIM_GENRE,
    &DIM_TIME,
    &FACT_FILM_VERSION,
    &FACT_GENRE_BRIDGE,
];

pub fn table(name: &str) -> Option<&'static TableSchema> {
    WAREHOUSE_TABLES.iter().copied().find(|t| t.name == name)
}
