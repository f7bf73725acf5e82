//! End-to-end behaviour of the metered service facade

use futures::future::join_all;
use meterml_core::config::SecurityConfig;
use meterml_core::model::PredictionService;
use meterml_core::{
    CoreError, FeatureRow, FeatureValue, MeteredService, ModelLifecycleManager, ServiceConfig,
};
use meterml_databases::{AccountStore, MemoryAccountStore};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const INSTRUMENTS: [&str; 3] = ["Guitar", "Piano", "Violin"];
const CITIES: [&str; 3] = ["Lyon", "Paris", "Nice"];
const MONTHS: [&str; 4] = ["Jan", "Feb", "Mar", "Apr"];

/// Lesson prices with instrument, city and age effects
fn lesson_csv(rows: usize, base: f64) -> String {
    let mut csv = String::from("Subject/Instrument,City,Month,Age,Price\n");
    for i in 0..rows {
        let instrument = i % INSTRUMENTS.len();
        let city = (i / 3) % CITIES.len();
        let month = (i / 2) % MONTHS.len();
        let age = 10 + (i * 7) % 50;
        let price = base + 15.0 * instrument as f64 + 5.0 * city as f64 + 0.5 * age as f64;
        writeln!(
            csv,
            "{},{},{},{},{:.2}",
            INSTRUMENTS[instrument], CITIES[city], MONTHS[month], age, price
        )
        .unwrap();
    }
    csv
}

struct Harness {
    _dir: TempDir,
    service: Arc<MeteredService>,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::write(data_dir.join("music_students_data.csv"), lesson_csv(60, 40.0)).unwrap();

    let mut config = ServiceConfig::default();
    config.storage.database_url = "memory".to_string();
    config.storage.data_dir = data_dir;
    config.storage.artifact_path = dir.path().join("models").join("model.bin");
    config.security = SecurityConfig {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    };

    let store: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
    let lifecycle = Arc::new(ModelLifecycleManager::new());
    let service = MeteredService::with_parts(&config, store, lifecycle).unwrap();
    Harness {
        _dir: dir,
        service: Arc::new(service),
    }
}

fn lesson_row(instrument: &str, city: &str, age: f64) -> FeatureRow {
    let mut row = FeatureRow::new();
    row.insert("Subject/Instrument".to_string(), instrument.into());
    row.insert("City".to_string(), city.into());
    row.insert("Month".to_string(), "Jan".into());
    row.insert("Age".to_string(), FeatureValue::Number(age));
    row
}

#[tokio::test]
async fn test_predict_before_train_keeps_the_charge() {
    let h = harness().await;
    h.service.register("ann", "pw", 12).await.unwrap();

    assert!(matches!(
        h.service.predict("ann", "pw", &lesson_row("Piano", "Paris", 30.0)).await,
        Err(CoreError::NoModelTrained)
    ));
    assert_eq!(h.service.balance("ann").await.unwrap(), 7);
}

#[tokio::test]
async fn test_train_then_predict_end_to_end() {
    let h = harness().await;
    h.service.register("ann", "pw", 20).await.unwrap();

    let outcome = h.service.train_from_file("ann", "pw", None).await.unwrap();
    assert!(outcome.published);
    assert_eq!((outcome.train_rows, outcome.test_rows), (48, 12));
    assert!(outcome.metrics.r2 > 0.99, "r2 = {}", outcome.metrics.r2);

    let metadata = h.service.metadata("ann", "pw").await.unwrap();
    assert_eq!(metadata.target, "Price");
    assert_eq!(metadata.numeric_features, vec!["Age"]);
    assert_eq!(metadata.model.unwrap().id, outcome.model_id);

    let prediction = h
        .service
        .predict("ann", "pw", &lesson_row("Violin", "Nice", 30.0))
        .await
        .unwrap();
    // 40 + 30 + 10 + 15
    assert!((prediction.value - 95.0).abs() < 1.0, "got {}", prediction.value);
    assert_eq!(prediction.model_id, outcome.model_id);

    // train 1 + metadata 1 + predict 5
    assert_eq!(h.service.balance("ann").await.unwrap(), 13);
}

#[tokio::test]
async fn test_training_is_deterministic() {
    let h = harness().await;
    h.service.register("ann", "pw", 5).await.unwrap();

    let first = h.service.train_from_file("ann", "pw", None).await.unwrap();
    let second = h.service.train_from_file("ann", "pw", None).await.unwrap();
    assert_eq!(first.metrics.mse.to_bits(), second.metrics.mse.to_bits());
    assert_eq!(first.metrics.r2.to_bits(), second.metrics.r2.to_bits());
    assert_ne!(first.model_id, second.model_id);
}

#[tokio::test]
async fn test_dataset_failures() {
    let h = harness().await;
    h.service.register("ann", "pw", 10).await.unwrap();

    assert!(matches!(
        h.service.train_from_file("ann", "pw", Some("absent.csv")).await,
        Err(CoreError::DatasetNotFound(_))
    ));
    assert!(matches!(
        h.service.train_from_file("ann", "pw", Some("../secret.csv")).await,
        Err(CoreError::DatasetNotFound(_))
    ));

    let missing = b"City,Month,Age\nParis,Jan,3\n".to_vec();
    match h.service.train_from_upload("ann", "pw", missing).await {
        Err(CoreError::SchemaError { missing }) => {
            assert_eq!(missing, vec!["Subject/Instrument", "Price"])
        }
        other => panic!("expected SchemaError, got {other:?}"),
    }

    let unusable = b"Subject/Instrument,City,Month,Age,Price\nPiano,Paris,Jan,n/a,10\n".to_vec();
    assert!(matches!(
        h.service.train_from_upload("ann", "pw", unusable).await,
        Err(CoreError::EmptyTrainingSet)
    ));
    assert!(matches!(
        h.service.train_from_upload("ann", "pw", b"  \n".to_vec()).await,
        Err(CoreError::MalformedDataset(_))
    ));

    // Every attempt above was charged
    assert_eq!(h.service.balance("ann").await.unwrap(), 5);
    assert!(matches!(
        h.service.lifecycle().acquire_read(),
        Err(CoreError::NoModelTrained)
    ));
}

#[tokio::test]
async fn test_bad_credentials_are_free() {
    let h = harness().await;
    h.service.register("ann", "pw", 3).await.unwrap();

    assert!(matches!(
        h.service.metadata("ann", "wrong").await,
        Err(CoreError::Unauthorized)
    ));
    assert!(matches!(
        h.service.metadata("nobody", "pw").await,
        Err(CoreError::Unauthorized)
    ));
    assert_eq!(h.service.balance("ann").await.unwrap(), 3);
}

async fn concurrent_predicts(h: &Harness, user: &str, attempts: usize) -> usize {
    let tasks = (0..attempts).map(|_| {
        let service = Arc::clone(&h.service);
        let user = user.to_string();
        tokio::spawn(async move {
            service
                .predict(&user, "pw", &lesson_row("Piano", "Lyon", 20.0))
                .await
        })
    });
    join_all(tasks)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_predict_scenarios() {
    let h = harness().await;
    h.service.register("trainer", "pw", 1).await.unwrap();
    h.service.train_from_file("trainer", "pw", None).await.unwrap();

    for (user, balance, attempts, expected, remaining) in [
        ("three", 3, 4, 0, 3),
        ("ten", 10, 2, 2, 0),
        ("five", 5, 2, 1, 0),
        ("many", 23, 8, 4, 3),
    ] {
        h.service.register(user, "pw", balance).await.unwrap();
        assert_eq!(
            concurrent_predicts(&h, user, attempts).await,
            expected,
            "user {user}"
        );
        assert_eq!(h.service.balance(user).await.unwrap(), remaining);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_held_snapshot_survives_retraining() {
    let h = harness().await;
    h.service.register("ann", "pw", 10).await.unwrap();
    h.service.train_from_file("ann", "pw", None).await.unwrap();

    let held = h.service.lifecycle().acquire_read().unwrap();
    let row = lesson_row("Guitar", "Lyon", 40.0);
    let before = PredictionService::predict(&held, &row).unwrap();

    // Retrain on shifted prices while the old handle is in use
    let shifted = lesson_csv(60, 140.0).into_bytes();
    let outcome = h.service.train_from_upload("ann", "pw", shifted).await.unwrap();
    assert!(outcome.published);

    let again = PredictionService::predict(&held, &row).unwrap();
    assert_eq!(again.value.to_bits(), before.value.to_bits());
    assert_eq!(again.model_id, before.model_id);

    let fresh = h.service.predict("ann", "pw", &row).await.unwrap();
    assert_eq!(fresh.model_id, outcome.model_id);
    assert!((fresh.value - before.value - 100.0).abs() < 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_predictions_during_republishing_see_whole_versions() {
    let h = harness().await;
    h.service.register("ann", "pw", 50).await.unwrap();
    let row = lesson_row("Piano", "Paris", 25.0);
    let low = lesson_csv(60, 40.0).into_bytes();
    let high = lesson_csv(60, 140.0).into_bytes();

    let current_value = || {
        let handle = h.service.lifecycle().acquire_read().unwrap();
        PredictionService::predict(&handle, &row).unwrap().value.to_bits()
    };
    h.service.train_from_upload("ann", "pw", high.clone()).await.unwrap();
    let high_bits = current_value();
    h.service.train_from_upload("ann", "pw", low.clone()).await.unwrap();
    let low_bits = current_value();
    assert_ne!(low_bits, high_bits);

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let lifecycle = Arc::clone(h.service.lifecycle());
            let done = Arc::clone(&done);
            let row = row.clone();
            tokio::task::spawn_blocking(move || {
                let mut seen = Vec::new();
                while !done.load(Ordering::Acquire) || seen.len() < 50 {
                    let handle = lifecycle.acquire_read().unwrap();
                    let first = PredictionService::predict(&handle, &row).unwrap();
                    let second = PredictionService::predict(&handle, &row).unwrap();
                    assert_eq!(first.value.to_bits(), second.value.to_bits());
                    assert_eq!(first.model_id, handle.id());
                    seen.push(first.value.to_bits());
                }
                seen
            })
        })
        .collect();

    for round in 0..6 {
        let csv = if round % 2 == 0 { high.clone() } else { low.clone() };
        assert!(h.service.train_from_upload("ann", "pw", csv).await.unwrap().published);
    }
    done.store(true, Ordering::Release);

    for reader in join_all(readers).await {
        for bits in reader.unwrap() {
            assert!(bits == low_bits || bits == high_bits, "mixed model output");
        }
    }
}

#[tokio::test]
async fn test_build_recovers_persisted_artifact() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::write(data_dir.join("music_students_data.csv"), lesson_csv(30, 40.0)).unwrap();

    let mut config = ServiceConfig::default();
    config.storage.database_url = format!("sqlite://{}", dir.path().join("accounts.db").display());
    config.storage.data_dir = data_dir;
    config.storage.artifact_path = dir.path().join("models").join("model.bin");
    config.security = SecurityConfig {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    };

    let trained = {
        let service = MeteredService::build(&config).await.unwrap();
        service.register("ann", "pw", 4).await.unwrap();
        service.train_from_file("ann", "pw", None).await.unwrap().model_id
    };

    let restarted = MeteredService::build(&config).await.unwrap();
    assert_eq!(restarted.lifecycle().acquire_read().unwrap().id(), trained);
    assert_eq!(restarted.balance("ann").await.unwrap(), 3);
    assert!(matches!(
        restarted.register("ann", "other", 1).await,
        Err(CoreError::AccountExists(_))
    ));
}
