use covid_insights::data_utils::string_values;
use covid_insights::loader::{DatasetCache, Datasets, Metric, PipelineOptions};
use covid_insights::PipelineError;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Write the three CSV files with the given header style.
fn write_csvs(dir: &Path, identity: &str) {
    let tables = [
        (Metric::Confirmed, ["5", "8"]),
        (Metric::Deaths, ["2", "3"]),
        (Metric::Recovered, ["1", "4"]),
    ];
    for (metric, values) in tables {
        let content = format!(
            "{},1/1/20,1/2/20\n,Testland,1.0,2.0,{},{}\nOntario,Canada,51.2,-85.3,0,1\n",
            identity, values[0], values[1]
        );
        fs::write(dir.join(metric.file_name()), content).unwrap();
    }
}

#[test]
fn test_load_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    write_csvs(dir.path(), "Province/State,Country/Region,Lat,Long");

    let data = Datasets::load(dir.path(), PipelineOptions::default()).unwrap();
    assert_eq!(data.confirmed.raw.shape(), (2, 6));
    assert_eq!(data.confirmed.long.height(), 4);
    assert_eq!(data.joined.table.height(), 4);

    let provinces = string_values(&data.confirmed.wide, "Province/State").unwrap();
    assert_eq!(provinces[0].as_deref(), Some("All Provinces"));
}

#[test]
fn test_alternate_headers_are_normalized() {
    let dir = tempfile::tempdir().unwrap();
    write_csvs(dir.path(), "Province_State,Country_Region,Latitude,Longitude");

    let data = Datasets::load(dir.path(), PipelineOptions::default()).unwrap();
    let names = data.confirmed.raw.get_column_names();
    assert!(names.contains(&"Country/Region"));
    assert!(names.contains(&"Lat"));
    assert_eq!(data.confirmed.column_map.unmapped(), vec!["1/1/20", "1/2/20"]);

    let diagnostics = data.diagnostics();
    assert_eq!(diagnostics.tables.len(), 3);
    assert_eq!(diagnostics.tables[0].date_columns, 2);
    assert!(diagnostics.tables[0].chronological);
    assert_eq!(diagnostics.join.joined_rows, 4);
}

#[test]
fn test_missing_country_column_is_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    write_csvs(dir.path(), "Province/State,Nation,Lat,Long");

    let result = Datasets::load(dir.path(), PipelineOptions::default());
    assert!(matches!(result, Err(PipelineError::Schema { .. })));
}

#[test]
fn test_missing_file_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    write_csvs(dir.path(), "Province/State,Country/Region,Lat,Long");
    fs::remove_file(dir.path().join(Metric::Recovered.file_name())).unwrap();

    match Datasets::load(dir.path(), PipelineOptions::default()) {
        Err(PipelineError::Load { path, .. }) => {
            assert!(path.ends_with("covid_19_recovered_v1.csv"))
        }
        other => panic!("expected Load error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_cache_loads_once() {
    let dir = tempfile::tempdir().unwrap();
    write_csvs(dir.path(), "Province/State,Country/Region,Lat,Long");

    let cache = DatasetCache::new(dir.path(), PipelineOptions::default());
    assert!(!cache.is_loaded());

    let first = cache.get().unwrap();
    let second = cache.get().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.load_count(), 1);
    assert!(cache.is_loaded());
}

#[test]
fn test_cache_shared_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    write_csvs(dir.path(), "Province/State,Country/Region,Lat,Long");
    let cache = Arc::new(DatasetCache::new(dir.path(), PipelineOptions::default()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || cache.get().unwrap().joined.table.height())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 4);
    }
    assert_eq!(cache.load_count(), 1);
}
