//! Runs against a real Postgres when `WAREHOUSE_TEST_DATABASE_URL` is set;
//! otherwise the test returns early. It drops and recreates the warehouse
//! tables, so point the variable at a scratch database. Kept as a single test
//! because the steps share one schema.

use anyhow::Result;
use async_trait::async_trait;
use film_warehouse::database_ops::constraints::ConstraintStatus;
use film_warehouse::database_ops::extract::{RawRow, SourceReader, SourceTable};
use film_warehouse::database_ops::maintenance::{bootstrap, reset};
use film_warehouse::database_ops::warehouse::Warehouse;
use film_warehouse::orchestrator::{run_pipeline, PipelineConfig};
use film_warehouse::util::db::Db;

struct StaticSource;

fn row(pairs: &[(&str, &str)]) -> RawRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Some(v.to_string())))
        .collect()
}

#[async_trait]
impl SourceReader for StaticSource {
    async fn read_table(&self, table: SourceTable, _: Option<usize>) -> Result<Vec<RawRow>> {
        Ok(match table {
            SourceTable::TitleBasics => vec![
                row(&[("tconst", "t1"), ("genres", "Drama,Comedy"), ("startYear", "1994")]),
                row(&[("tconst", "t2"), ("genres", "\\N"), ("startYear", "\\N")]),
            ],
            SourceTable::TitleRatings => {
                vec![row(&[("tconst", "t1"), ("averageRating", "8.9"), ("numVotes", "100")])]
            }
            SourceTable::TitleAkas => vec![row(&[
                ("titleId", "t1"),
                ("ordering", "1"),
                ("region", "US"),
                ("language", "en"),
                ("isOriginalTitle", "1"),
            ])],
        })
    }
}

async fn test_db() -> Option<Db> {
    let url = std::env::var("WAREHOUSE_TEST_DATABASE_URL").ok()?;
    Some(Db::connect(&url, 2).await.expect("connect to test database"))
}

async fn count(db: &Db, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .persistent(false)
        .fetch_one(&db.pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn warehouse_lifecycle_on_postgres() {
    let Some(db) = test_db().await else {
        return;
    };
    reset(&db).await.unwrap();

    let first = run_pipeline(PipelineConfig::default(), &StaticSource, &db)
        .await
        .unwrap();
    assert!(first.is_clean());
    assert_eq!(count(&db, "fact_film_version").await, 2);
    assert_eq!(count(&db, "fact_genre_bridge").await, 3);
    assert_eq!(count(&db, "dim_genre").await, 3);

    let second = run_pipeline(PipelineConfig::default(), &StaticSource, &db)
        .await
        .unwrap();
    assert!(second.is_clean());
    assert_eq!(count(&db, "fact_film_version").await, 2);
    assert_eq!(count(&db, "fact_genre_bridge").await, 3);
    assert_eq!(
        second.constraints.status_of("fk_bridge_fact"),
        Some(&ConstraintStatus::AlreadyPresent)
    );

    let sentinel_region: i32 =
        sqlx::query_scalar("SELECT region_id FROM fact_film_version WHERE tconst = 't2'")
            .persistent(false)
            .fetch_one(&db.pool)
            .await
            .unwrap();
    assert_eq!(sentinel_region, -1);

    reset(&db).await.unwrap();

    let report = bootstrap(&db).await.unwrap();
    assert_eq!(report.created.len(), 6);
    assert!(db.has_primary_key("dim_time").await.unwrap());
    assert!(db
        .constraint_exists("fact_film_version", "fk_region")
        .await
        .unwrap());
    assert_eq!(count(&db, "dim_language").await, 1);

    let dropped = reset(&db).await.unwrap();
    assert_eq!(dropped.len(), 6);
    assert!(!db.table_exists("dim_time").await.unwrap());
}
