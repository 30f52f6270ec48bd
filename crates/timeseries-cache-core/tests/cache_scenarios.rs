#![allow(missing_docs)]

mod common;

use std::{fs, time::Duration};

use common::*;
use tempfile::TempDir;
use timeseries_cache_core::{
    ProductKey,
    config::{
        BackendConfig, BackendFormat, BackendRegistry, CacheConfig, FetchStrategy, RecordPolicy,
        Settings,
    },
    ingest::{Degradation, ErrorKind},
    orchestrator::{EnsureOutcome, RequestOrchestrator},
    time::TimeEncoding,
};

fn day_csv(day: &str, np: [f64; 4]) -> String {
    let mut text = String::from("# plasma moments\ntime,np\n");
    for (hour, value) in ["00", "06", "12", "18"].iter().zip(np) {
        text.push_str(&format!("{day}T{hour}:00:00,{value}\n"));
    }
    text
}

fn omni_registry() -> Result<BackendRegistry, Box<dyn std::error::Error>> {
    Ok(BackendRegistry::from_configs([(
        ProductKey::new("omni"),
        csv_config("omni/{YYYY}/omni_{YYYY}{MM}{DD}.csv", &["np"], Some(-9999.0)),
    )])?)
}

fn no_tolerance(record_policy: RecordPolicy, fetch_strategy: FetchStrategy) -> CacheConfig {
    CacheConfig {
        tolerance: Duration::ZERO,
        record_policy,
        fetch_strategy,
        ..CacheConfig::default()
    }
}

#[tokio::test]
async fn missing_middle_day_is_recorded_under_always() -> TestResult {
    let tmp = TempDir::new()?;
    write_text(
        &tmp.path().join("omni/2020/omni_20200101.csv"),
        &day_csv("2020-01-01", [1.0, 2.0, 3.0, 4.0]),
    )?;
    write_text(
        &tmp.path().join("omni/2020/omni_20200103.csv"),
        &day_csv("2020-01-03", [5.0, 6.0, 7.0, 8.0]),
    )?;

    let cache = orchestrator(
        tmp.path(),
        omni_registry()?,
        no_tolerance(RecordPolicy::Always, FetchStrategy::FullRange),
    );
    let key = ProductKey::new("omni");

    let outcome = cache
        .ensure(&key, range("2020-01-01", "2020-01-04")?)
        .await?;
    let EnsureOutcome::Ingested { rows, notices } = outcome else {
        return Err("expected an ingest".into());
    };
    assert_eq!(rows, 8);
    assert_eq!(notices.len(), 1);
    assert!(matches!(
        &notices[0],
        Degradation::MissingFile { slot, .. } if *slot == range("2020-01-02", "2020-01-03")?
    ));

    let np = cache.store().view(&key, "np", None)?;
    assert_eq!(np.values(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    assert_eq!(np.times()[4], tick("2020-01-03")?);

    // The late file is never picked up: the whole range was recorded.
    write_text(
        &tmp.path().join("omni/2020/omni_20200102.csv"),
        &day_csv("2020-01-02", [9.0; 4]),
    )?;
    let again = cache
        .ensure(&key, range("2020-01-02", "2020-01-03")?)
        .await?;
    assert_eq!(again, EnsureOutcome::Covered);
    assert_eq!(cache.store().grab(&key).snapshot().len(), 8);
    Ok(())
}

#[tokio::test]
async fn missing_middle_day_is_refetched_under_located_only() -> TestResult {
    let tmp = TempDir::new()?;
    write_text(
        &tmp.path().join("omni/2020/omni_20200101.csv"),
        &day_csv("2020-01-01", [1.0, 2.0, 3.0, 4.0]),
    )?;
    write_text(
        &tmp.path().join("omni/2020/omni_20200103.csv"),
        &day_csv("2020-01-03", [5.0, 6.0, 7.0, 8.0]),
    )?;

    let cache = orchestrator(
        tmp.path(),
        omni_registry()?,
        no_tolerance(RecordPolicy::LocatedOnly, FetchStrategy::FullRange),
    );
    let key = ProductKey::new("omni");

    cache
        .ensure(&key, range("2020-01-01", "2020-01-04")?)
        .await?;
    assert_eq!(
        cache.tracker().intervals(&key),
        vec![
            range("2020-01-01", "2020-01-02")?,
            range("2020-01-03", "2020-01-04")?
        ]
    );

    write_text(
        &tmp.path().join("omni/2020/omni_20200102.csv"),
        &day_csv("2020-01-02", [9.0; 4]),
    )?;
    let again = cache
        .ensure(&key, range("2020-01-02", "2020-01-03")?)
        .await?;
    assert_eq!(
        again,
        EnsureOutcome::Ingested {
            rows: 4,
            notices: Vec::new()
        }
    );

    let np = cache.store().view(&key, "np", None)?;
    assert_eq!(np.len(), 12);
    assert!(np.times().windows(2).all(|w| w[0] < w[1]));
    assert_eq!(
        cache.tracker().intervals(&key),
        vec![range("2020-01-01", "2020-01-04")?]
    );
    Ok(())
}

#[tokio::test]
async fn fill_sentinel_becomes_nan() -> TestResult {
    let tmp = TempDir::new()?;
    let mut text = String::from("time,np1\n");
    for i in 0..10 {
        let value = if i == 5 { -9999.0 } else { f64::from(i) };
        text.push_str(&format!("2020-01-01T00:{i:02}:00,{value}\n"));
    }
    write_text(&tmp.path().join("swe/20200101.csv"), &text)?;

    let registry = BackendRegistry::from_configs([(
        ProductKey::new("swe"),
        csv_config("swe/{YYYY}{MM}{DD}.csv", &["np1"], Some(-9999.0)),
    )])?;
    let cache = orchestrator(tmp.path(), registry, CacheConfig::default());
    let key = ProductKey::new("swe");

    cache.ensure_between(&key, "2020-01-01", "2020-01-02").await?;

    let np1 = cache.store().view(&key, "np1", None)?;
    assert_eq!(np1.len(), 10);
    for (i, v) in np1.values().iter().enumerate() {
        if i == 5 {
            assert!(v.is_nan(), "np1[5] should be NaN, got {v}");
        } else {
            assert_eq!(*v, i as f64);
        }
    }
    Ok(())
}

fn hourly_registry() -> Result<BackendRegistry, Box<dyn std::error::Error>> {
    Ok(BackendRegistry::from_configs([(
        ProductKey::new("fast"),
        BackendConfig {
            kind: BackendFormat::BinaryColumnar,
            path_template: Some("fast/{YYYY}{MM}{DD}_{hh}.parquet".to_string()),
            path_templates: Vec::new(),
            time_field: "epoch".to_string(),
            time_encoding: TimeEncoding::Tt2000,
            fields: vec!["b".to_string()],
            fill_sentinel: Some(-1e31),
            block_hours: Some(1),
            delimiter: None,
            comment: None,
        },
    )])?)
}

fn write_hour(root: &std::path::Path, hour: &str, base: f32) -> TestResult {
    let times: Vec<String> = ["00", "15", "30", "45"]
        .iter()
        .map(|m| format!("2020-01-01T{hour}:{m}:00"))
        .collect();
    let times: Vec<&str> = times.iter().map(String::as_str).collect();
    write_tt2000_parquet(
        &root.join(format!("fast/20200101_{hour}.parquet")),
        &times,
        &[("b", vec![base, base + 1.0, base + 2.0, base + 3.0])],
    )
}

async fn overlapping_requests(
    strategy: FetchStrategy,
) -> Result<(RequestOrchestrator, EnsureOutcome, TempDir), Box<dyn std::error::Error>> {
    let tmp = TempDir::new()?;
    write_hour(tmp.path(), "10", 0.0)?;
    write_hour(tmp.path(), "11", 10.0)?;

    let cache = orchestrator(
        tmp.path(),
        hourly_registry()?,
        no_tolerance(RecordPolicy::Always, strategy),
    );
    let key = ProductKey::new("fast");

    let first = cache
        .ensure(&key, range("2020-01-01T10:00:00", "2020-01-01T11:00:00")?)
        .await?;
    assert_eq!(
        first,
        EnsureOutcome::Ingested {
            rows: 4,
            notices: Vec::new()
        }
    );

    // Any attempt to read the first hour again now reports a missing file.
    fs::remove_file(tmp.path().join("fast/20200101_10.parquet"))?;

    let second = cache
        .ensure(&key, range("2020-01-01T10:30:00", "2020-01-01T11:30:00")?)
        .await?;
    Ok((cache, second, tmp))
}

#[tokio::test]
async fn remainder_strategy_reads_only_the_uncovered_block() -> TestResult {
    let (cache, second, _tmp) = overlapping_requests(FetchStrategy::Remainder).await?;
    let key = ProductKey::new("fast");

    assert_eq!(
        second,
        EnsureOutcome::Ingested {
            rows: 2,
            notices: Vec::new()
        }
    );
    let b = cache.store().view(&key, "b", None)?;
    assert_eq!(b.values(), &[0.0, 1.0, 2.0, 3.0, 10.0, 11.0]);
    assert_eq!(
        cache.tracker().intervals(&key),
        vec![range("2020-01-01T10:00:00", "2020-01-01T11:30:00")?]
    );
    Ok(())
}

#[tokio::test]
async fn full_range_strategy_rereads_the_covered_block() -> TestResult {
    let (cache, second, _tmp) = overlapping_requests(FetchStrategy::FullRange).await?;
    let key = ProductKey::new("fast");

    let EnsureOutcome::Ingested { rows, notices } = second else {
        return Err("expected an ingest".into());
    };
    assert_eq!(rows, 2);
    assert!(matches!(
        notices.as_slice(),
        [Degradation::MissingFile { slot, .. }]
            if *slot == range("2020-01-01T10:00:00", "2020-01-01T11:00:00")?
    ));
    // Rows already stored survive even though their file is gone.
    assert_eq!(cache.store().grab(&key).snapshot().len(), 6);
    Ok(())
}

#[tokio::test]
async fn disjoint_requests_accumulate_in_time_order() -> TestResult {
    let tmp = TempDir::new()?;
    write_text(
        &tmp.path().join("omni/2020/omni_20200101.csv"),
        &day_csv("2020-01-01", [1.0, 2.0, 3.0, 4.0]),
    )?;
    write_text(
        &tmp.path().join("omni/2020/omni_20200105.csv"),
        &day_csv("2020-01-05", [5.0, 6.0, 7.0, 8.0]),
    )?;

    let cache = orchestrator(tmp.path(), omni_registry()?, CacheConfig::default());
    let key = ProductKey::new("omni");
    let handle = cache.store().grab(&key);

    // Later range first.
    cache.ensure_between(&key, "2020-01-05", "2020-01-06").await?;
    cache.ensure_between(&key, "2020-01-01", "2020-01-02").await?;

    assert!(std::sync::Arc::ptr_eq(&handle, &cache.store().grab(&key)));
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.version(), 2);
    assert_eq!(snapshot.len(), 8);
    assert!(snapshot.times().windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(
        snapshot.field("np"),
        Some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0][..])
    );
    assert_eq!(
        cache.tracker().intervals(&key),
        vec![
            range("2020-01-01", "2020-01-02")?,
            range("2020-01-05", "2020-01-06")?
        ]
    );
    Ok(())
}

#[tokio::test]
async fn nothing_on_disk_is_no_data_found() -> TestResult {
    let tmp = TempDir::new()?;
    let cache = orchestrator(tmp.path(), omni_registry()?, CacheConfig::default());
    let key = ProductKey::new("omni");

    let err = cache
        .ensure_between(&key, "2020-01-01", "2020-01-03")
        .await
        .err()
        .ok_or("expected an error")?;
    assert_eq!(err.kind(), ErrorKind::NoDataFound);
    assert!(!err.is_partial());
    assert_eq!(err.notices().len(), 2);
    assert!(cache.store().grab(&key).snapshot().is_empty());
    Ok(())
}

#[tokio::test]
async fn settings_file_drives_the_whole_cache() -> TestResult {
    let tmp = TempDir::new()?;
    write_text(
        &tmp.path().join("archive/omni/2020/omni_20200101.csv"),
        &day_csv("2020-01-01", [1.0, -9999.0, 3.0, 4.0]),
    )?;
    let config_path = tmp.path().join("cache.json");
    fs::write(
        &config_path,
        r##"{
            "root": "archive",
            "cache": { "tolerance_secs": 0, "max_concurrent_reads": 2 },
            "products": {
                "omni": {
                    "kind": "daily_delimited",
                    "path_template": "omni/{YYYY}/omni_{YYYY}{MM}{DD}.csv",
                    "time_field": "time",
                    "time_encoding": "calendar",
                    "fields": ["np"],
                    "fill_sentinel": -9999,
                    "comment": "#"
                }
            }
        }"##,
    )?;

    let settings = Settings::load(&config_path).await?;
    let cache = RequestOrchestrator::from_settings(&settings);
    let key = ProductKey::new("omni");

    cache.ensure_between(&key, "2020-01-01", "2020-01-02").await?;
    let np = cache
        .store()
        .view(&key, "np", Some(range("2020-01-01T06:00:00", "2020-01-01T13:00:00")?))?;
    assert_eq!(np.len(), 2);
    assert!(np.values()[0].is_nan());
    assert_eq!(np.values()[1], 3.0);
    assert!(
        cache
            .ensure_between(&key, "2020-01-01T01:00:00", "2020-01-01T02:00:00")
            .await?
            .was_covered()
    );
    Ok(())
}

#[tokio::test]
async fn unreadable_file_is_retried_once_repaired() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("omni/2020/omni_20200101.csv");
    write_text(&path, "when,np\n2020-01-01T00:00:00,1\n")?;

    let cache = orchestrator(
        tmp.path(),
        omni_registry()?,
        no_tolerance(RecordPolicy::Always, FetchStrategy::FullRange),
    );
    let key = ProductKey::new("omni");
    let day = range("2020-01-01", "2020-01-02")?;

    let err = cache.ensure(&key, day).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoDataFound);
    assert!(matches!(
        err.notices(),
        [Degradation::FileFailed { slot, .. }] if *slot == day
    ));
    assert!(cache.tracker().intervals(&key).is_empty());

    write_text(&path, &day_csv("2020-01-01", [1.0, 2.0, 3.0, 4.0]))?;
    let outcome = cache.ensure(&key, day).await?;
    assert_eq!(
        outcome,
        EnsureOutcome::Ingested {
            rows: 4,
            notices: Vec::new()
        }
    );
    assert_eq!(cache.tracker().intervals(&key), vec![day]);
    Ok(())
}

#[tokio::test]
async fn unreadable_day_stays_uncovered_next_to_good_days() -> TestResult {
    let tmp = TempDir::new()?;
    write_text(
        &tmp.path().join("omni/2020/omni_20200101.csv"),
        &day_csv("2020-01-01", [1.0, 2.0, 3.0, 4.0]),
    )?;
    write_text(&tmp.path().join("omni/2020/omni_20200102.csv"), "when,np\n")?;
    write_text(
        &tmp.path().join("omni/2020/omni_20200103.csv"),
        &day_csv("2020-01-03", [5.0, 6.0, 7.0, 8.0]),
    )?;

    let cache = orchestrator(
        tmp.path(),
        omni_registry()?,
        no_tolerance(RecordPolicy::Always, FetchStrategy::Remainder),
    );
    let key = ProductKey::new("omni");

    cache
        .ensure(&key, range("2020-01-01", "2020-01-04")?)
        .await?;
    assert_eq!(
        cache.tracker().intervals(&key),
        vec![
            range("2020-01-01", "2020-01-02")?,
            range("2020-01-03", "2020-01-04")?
        ]
    );

    write_text(
        &tmp.path().join("omni/2020/omni_20200102.csv"),
        &day_csv("2020-01-02", [9.0, 9.0, 9.0, 9.0]),
    )?;
    let outcome = cache
        .ensure(&key, range("2020-01-01", "2020-01-04")?)
        .await?;
    assert!(matches!(outcome, EnsureOutcome::Ingested { rows: 4, .. }));
    assert_eq!(cache.store().view(&key, "np", None)?.len(), 12);
    assert_eq!(
        cache.tracker().intervals(&key),
        vec![range("2020-01-01", "2020-01-04")?]
    );
    Ok(())
}

#[tokio::test]
async fn remainder_keeps_samples_inside_the_tolerance_seam() -> TestResult {
    let tmp = TempDir::new()?;
    write_text(
        &tmp.path().join("omni/2020/omni_20200101.csv"),
        &day_csv("2020-01-01", [1.0, 2.0, 3.0, 4.0]),
    )?;
    write_text(
        &tmp.path().join("omni/2020/omni_20200102.csv"),
        "time,np\n2020-01-02T00:00:05,5\n2020-01-02T12:00:00,6\n",
    )?;

    let cache = orchestrator(
        tmp.path(),
        omni_registry()?,
        CacheConfig {
            tolerance: Duration::from_secs(10),
            record_policy: RecordPolicy::Always,
            fetch_strategy: FetchStrategy::Remainder,
            ..CacheConfig::default()
        },
    );
    let key = ProductKey::new("omni");

    cache
        .ensure(&key, range("2020-01-01", "2020-01-02")?)
        .await?;
    let outcome = cache
        .ensure(&key, range("2020-01-01", "2020-01-03")?)
        .await?;
    assert!(matches!(outcome, EnsureOutcome::Ingested { rows: 2, .. }));

    let np = cache.store().view(&key, "np", None)?;
    assert_eq!(np.len(), 6);
    assert_eq!(np.times()[4], tick("2020-01-02T00:00:05")?);
    assert_eq!(
        cache.tracker().intervals(&key),
        vec![range("2020-01-01", "2020-01-03")?]
    );
    Ok(())
}
