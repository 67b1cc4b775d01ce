//! 前処理パイプラインとエクスポートの結合テスト

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use gesture_core::calibration::CalibrationSet;
use gesture_core::export::{QuantizationCodec, QuantizationExporter, QuantizationOptions};
use gesture_core::model::TrainedModel;
use gesture_core::pipeline::prepare_file;
use gesture_core::source::select_input;
use gesture_core::{Error, PipelineConfig};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// label, take, 行数 の指定から CSV を書く
fn write_csv(dir: &Path, name: &str, takes: &[(&str, u32, usize)]) -> PathBuf {
    let path = dir.join(name);
    let mut f = fs::File::create(&path).unwrap();
    writeln!(f, "gesture_name,take_number,seq_num,val1,val2,val3").unwrap();
    for &(label, take, len) in takes {
        // 逆順に書いても集約後はシーケンス番号順になる
        for seq in (1..=len).rev() {
            let base = take as f32 * 10.0 + seq as f32;
            writeln!(f, "{label},{take},{seq},{},{},{}", base, base * 0.5, -base).unwrap();
        }
    }
    path
}

fn many_takes() -> Vec<(&'static str, u32, usize)> {
    let mut takes = Vec::new();
    for t in 0..12u32 {
        takes.push(("wave", t * 3 + 1, 9 + (t as usize % 3)));
        takes.push(("punch", t * 3 + 2, 10));
        if t < 4 {
            takes.push(("circle", t * 3 + 3, 8 + t as usize));
        }
    }
    takes
}

#[test]
fn prepare_is_deterministic_for_a_fixed_seed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "1.csv", &many_takes());
    let config = PipelineConfig::default();

    let a = prepare_file(&path, &config, &mut ChaCha8Rng::seed_from_u64(config.seed)).unwrap();
    let b = prepare_file(&path, &config, &mut ChaCha8Rng::seed_from_u64(config.seed)).unwrap();

    assert_eq!(a.train, b.train);
    assert_eq!(a.test, b.test);
    let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&a.stats.mean), bits(&b.stats.mean));
    assert_eq!(bits(&a.stats.std), bits(&b.stats.std));

    assert_eq!(a.target_length, 10);
    assert_eq!(a.feature_count, 3);
    assert_eq!(a.label_map.labels(), ["circle", "punch", "wave"]);
    for row in a.train.features.iter().chain(&a.test.features) {
        assert_eq!(row.len(), 30);
    }
}

#[test]
fn every_class_reaches_the_test_subset() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "1.csv", &many_takes());
    let config = PipelineConfig::default();
    let p = prepare_file(&path, &config, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();

    let counts = p.test.class_counts();
    for class in 0..p.label_map.num_classes() {
        assert!(counts.get(&class).copied().unwrap_or(0) >= 1, "class {class} missing");
    }
    // circle: 4件 → floor(0.8) = 0 → 1件, punch/wave: 12件 → 2件
    assert_eq!(counts.get(&0), Some(&1));
    assert_eq!(counts.get(&1), Some(&2));
    assert_eq!(counts.get(&2), Some(&2));
}

#[test]
fn mismatched_row_aborts_with_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("3.csv");
    fs::write(
        &path,
        "label,take_id,sequence_index,v1,v2\nwave,1,1,0.1,0.2\nwave,1,2,0.1\npunch,2,1,0.3,0.4\n",
    )
    .unwrap();
    let err = prepare_file(&path, &PipelineConfig::default(), &mut ChaCha8Rng::seed_from_u64(1))
        .unwrap_err();
    match err {
        Error::Schema { line, .. } => assert_eq!(line, 3),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn single_label_fails_with_insufficient_classes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "1.csv", &[("wave", 1, 5), ("wave", 2, 5)]);
    let err = prepare_file(&path, &PipelineConfig::default(), &mut ChaCha8Rng::seed_from_u64(1))
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientClasses { found: 1, .. }));
}

#[test]
fn declared_feature_count_must_match_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "1.csv", &[("wave", 1, 5), ("punch", 2, 5)]);
    let config = PipelineConfig {
        feature_count: Some(6),
        ..PipelineConfig::default()
    };
    let err = prepare_file(&path, &config, &mut ChaCha8Rng::seed_from_u64(1)).unwrap_err();
    assert!(matches!(err, Error::Schema { line: 1, .. }));
}

#[test]
fn input_selection_prefers_largest_numeric_name() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["7.csv", "1700000000.csv", "99.csv", "notes.csv", "1800000000.txt"] {
        fs::write(dir.path().join(name), "x").unwrap();
    }
    let chosen = select_input(dir.path(), None).unwrap();
    assert_eq!(chosen, dir.path().join("1700000000.csv"));

    let explicit = select_input(dir.path(), Some("7")).unwrap();
    assert_eq!(explicit, dir.path().join("7.csv"));

    assert!(matches!(select_input(dir.path(), Some("8")), Err(Error::InputNotFound(_))));
}

#[test]
fn input_selection_without_numeric_csv_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(select_input(dir.path(), None), Err(Error::InputNotFound(_))));
    fs::write(dir.path().join("session.csv"), "x").unwrap();
    assert!(matches!(select_input(dir.path(), None), Err(Error::InputNotFound(_))));
}

// ---------------------------------------------------------------------------
// エクスポート
// ---------------------------------------------------------------------------

struct StubModel;

impl TrainedModel for StubModel {
    fn input_dim(&self) -> usize {
        2
    }
    fn num_classes(&self) -> usize {
        2
    }
    fn predict(&self, _input: &[f32]) -> Vec<f32> {
        vec![0.5, 0.5]
    }
    fn export_saved_model(&self, dir: &Path) -> std::io::Result<()> {
        fs::write(dir.join("model.bin"), b"stub")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported op: {0}")]
struct StubCodecError(String);

struct StubCodec {
    fail: bool,
}

impl QuantizationCodec for StubCodec {
    type Error = StubCodecError;

    fn quantize(
        &self,
        saved_model: &Path,
        calibration: &CalibrationSet,
        options: &QuantizationOptions,
    ) -> Result<Vec<u8>, Self::Error> {
        assert!(options.is_full_integer());
        assert!(saved_model.join("model.bin").is_file());
        if self.fail {
            return Err(StubCodecError("softmax".into()));
        }
        // 2回走査できること
        let first = calibration.batches().count();
        let second = calibration.batches().count();
        Ok(vec![first as u8, second as u8])
    }
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn export_writes_artifact_and_removes_staging() {
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    let codec = StubCodec { fail: false };
    let exporter = QuantizationExporter::new(&codec, &models);
    let calibration = CalibrationSet::from_samples(vec![vec![0.0, 1.0]; 3]);
    let ts = NaiveDate::from_ymd_opt(2026, 10, 16)
        .unwrap()
        .and_hms_opt(12, 34, 56)
        .unwrap();

    let path = exporter.export_at(&StubModel, &calibration, ts).unwrap();
    assert_eq!(path, models.join("20261016_123456.gq8"));
    assert_eq!(fs::read(&path).unwrap(), vec![3, 3]);
    assert_eq!(entries(&models), vec!["20261016_123456.gq8".to_string()]);
}

#[test]
fn failed_quantization_propagates_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    let codec = StubCodec { fail: true };
    let exporter = QuantizationExporter::new(&codec, &models);
    let calibration = CalibrationSet::from_samples(vec![vec![0.0, 1.0]]);

    let err = exporter.export(&StubModel, &calibration).unwrap_err();
    match &err {
        Error::Quantization { source } => assert!(source.to_string().contains("softmax")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(entries(&models).is_empty());
}
