use std::collections::HashSet;
use std::fs;
use std::path::Path;

use film_warehouse::database_ops::extract::TsvSourceReader;
use film_warehouse::database_ops::memory::MemoryWarehouse;
use film_warehouse::database_ops::schema::WAREHOUSE_TABLES;
use film_warehouse::database_ops::warehouse::Cell;
use film_warehouse::orchestrator::{run_pipeline, PipelineConfig};

const BASICS: &str = "tconst\ttitleType\tprimaryTitle\toriginalTitle\tisAdult\tstartYear\tendYear\truntimeMinutes\tgenres
tt0000001\tshort\tCarmencita\tCarmencita\t0\t1894\t\\N\t1\tDocumentary,Short
tt0000002\tshort\tLe clown et ses chiens\tLe clown et ses chiens\t0\t1892\t\\N\t5\tAnimation,Short
tt0000003\tmovie\t\"Quoted\" Title\tQuoted\t0\t1894\t\\N\t\\N\tdrama,Comedy,Drama
tt0000004\tmovie\tNo Genre\tNo Genre\t0\t\\N\t\\N\t90\t\\N
tt0000001\tshort\tDuplicate\tDuplicate\t0\t1999\t\\N\t1\tHorror
";

const RATINGS: &str = "tconst\taverageRating\tnumVotes
tt0000001\t5.7\t2100
tt0000003\t8.9\t100
tt0000004\tbad\t\\N
";

const AKAS: &str = "titleId\tordering\ttitle\tregion\tlanguage\ttypes\tattributes\tisOriginalTitle
tt0000001\t2\tCarmencita\tUS\t\\N\t\\N\t\\N\t0
tt0000001\t1\tCarmencita\t\\N\t\\N\toriginal\t\\N\t1
tt0000002\t1\tLe clown\tFR\tfr\t\\N\t\\N\t1
tt0000003\t1\tQuoted\tUS\ten\t\\N\t\\N\t0
";

fn write_dumps(dir: &Path) {
    fs::write(dir.join("title.basics.tsv"), BASICS).unwrap();
    fs::write(dir.join("title.ratings.tsv"), RATINGS).unwrap();
    fs::write(dir.join("title.akas.tsv"), AKAS).unwrap();
}

fn int(cell: &Cell) -> i32 {
    match cell {
        Cell::Int(Some(v)) => *v,
        other => panic!("expected integer, got {other:?}"),
    }
}

fn key_set(wh: &MemoryWarehouse, table: &str) -> HashSet<i32> {
    wh.rows(table).iter().map(|r| int(&r[0])).collect()
}

#[tokio::test]
async fn builds_star_schema_from_tsv_dumps() {
    let dir = tempfile::tempdir().unwrap();
    write_dumps(dir.path());
    let source = TsvSourceReader::new(dir.path());
    let wh = MemoryWarehouse::new();

    let report = run_pipeline(PipelineConfig::default(), &source, &wh)
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.titles, 4);
    assert_eq!(report.fact_rows, 4);

    for table in ["dim_region", "dim_language", "dim_genre", "dim_time"] {
        let sentinels = wh
            .rows(table)
            .iter()
            .filter(|r| int(&r[0]) == -1)
            .count();
        assert_eq!(sentinels, 1, "{table}");
    }

    let genres: Vec<String> = wh
        .rows("dim_genre")
        .iter()
        .filter_map(|r| match &r[1] {
            Cell::Text(Some(name)) => Some(name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        genres,
        ["Unknown", "Documentary", "Short", "Animation", "Drama", "Comedy"]
    );

    let facts = wh.rows("fact_film_version");
    // tt0000001 takes its ordering-1 alias, which has no region
    assert_eq!(int(&facts[0][2]), -1);
    assert_eq!(facts[0][5], Cell::Bool(Some(true)));
    // tt0000004 has no alias, no year and an unparsable rating
    assert_eq!(facts[3][5], Cell::Bool(None));
    assert_eq!(int(&facts[3][4]), -1);
    assert_eq!(facts[3][6], Cell::Double(Some(0.0)));
    assert_eq!(facts[3][7], Cell::BigInt(Some(0)));

    let regions = key_set(&wh, "dim_region");
    let languages = key_set(&wh, "dim_language");
    let years = key_set(&wh, "dim_time");
    for f in &facts {
        assert!(regions.contains(&int(&f[2])));
        assert!(languages.contains(&int(&f[3])));
        assert!(years.contains(&int(&f[4])));
    }

    let fact_ids = key_set(&wh, "fact_film_version");
    let genre_ids = key_set(&wh, "dim_genre");
    let bridge = wh.rows("fact_genre_bridge");
    let pairs: HashSet<(i32, i32)> = bridge.iter().map(|r| (int(&r[0]), int(&r[1]))).collect();
    assert_eq!(pairs.len(), bridge.len());
    for (fact_id, genre_id) in pairs {
        assert!(fact_ids.contains(&fact_id));
        assert!(genre_ids.contains(&genre_id));
    }
}

#[tokio::test]
async fn rerun_leaves_identical_warehouse() {
    let dir = tempfile::tempdir().unwrap();
    write_dumps(dir.path());
    let source = TsvSourceReader::new(dir.path());
    let wh = MemoryWarehouse::new();

    run_pipeline(PipelineConfig::default(), &source, &wh)
        .await
        .unwrap();
    let first: Vec<_> = WAREHOUSE_TABLES.iter().map(|t| wh.rows(t.name)).collect();

    let small_chunks = PipelineConfig {
        chunk_size: 1,
        batch_size: 2,
        ..Default::default()
    };
    let second = run_pipeline(small_chunks, &source, &wh).await.unwrap();
    let again: Vec<_> = WAREHOUSE_TABLES.iter().map(|t| wh.rows(t.name)).collect();

    assert!(second.is_clean());
    assert_eq!(first, again);
    assert!(second.loads.iter().all(|l| l.truncated && !l.created));
}
