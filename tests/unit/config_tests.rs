// Configuration tests against the public API

use estate_watermark::config::*;
use rstest::rstest;

const FULL: &str = r#"
store:
  base_url: https://cms.example.com/
  token: static-token
  timeout_secs: 10
  projects:
    collection: listings
    image_fields: [hero, floor_plan]
  developers:
    collection: builders
    image_fields: [logo]
  ledger_collection: wm_failures
  vault_collection: wm_originals
watermark:
  overlay: https://cdn.example.com/logo.png
  marker: _wm
  vault_folder: Originals
  size_ceiling_bytes: 5242880
  work_dir: /var/tmp/estate
batch:
  concurrency_limit: 8
  max_retry_count: 5
  page_size: 50
logging:
  format: pretty
  level: estate_watermark=debug
"#;

#[test]
fn test_full_config_round_trip_of_every_section() {
    let config = Config::from_yaml_with_env(FULL).expect("Failed to parse full config");

    assert_eq!(config.store.base_url, "https://cms.example.com");
    assert_eq!(config.store.timeout_secs, 10);
    assert_eq!(config.store.projects.collection, "listings");
    assert_eq!(config.store.projects.image_fields, vec!["hero", "floor_plan"]);
    assert_eq!(config.store.developers.image_fields, vec!["logo"]);
    assert_eq!(config.store.ledger_collection, "wm_failures");
    assert_eq!(config.store.vault_collection, "wm_originals");

    assert_eq!(config.watermark.marker().as_str(), "_wm");
    assert_eq!(config.watermark.vault_folder, "Originals");
    assert_eq!(config.watermark.size_ceiling_bytes, 5 * 1024 * 1024);
    assert_eq!(config.watermark.work_dir.to_str(), Some("/var/tmp/estate"));

    assert_eq!(config.batch.concurrency_limit, 8);
    assert_eq!(config.batch.max_retry_count, 5);
    assert_eq!(config.batch.page_size, 50);

    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(config.validate().is_ok());
}

#[test]
fn test_token_is_not_serialized() {
    let config = Config::from_yaml_with_env(FULL).unwrap();
    let yaml = serde_yaml::to_string(&config).unwrap();
    assert!(!yaml.contains("static-token"));
}

#[rstest]
#[case("store:\n  base_url: ftp://cms.example.com\n", "base_url")]
#[case("watermark:\n  overlay: \"\"\n", "overlay")]
#[case("batch:\n  concurrency_limit: 0\n", "concurrency_limit")]
#[case("batch:\n  page_size: 0\n", "page_size")]
#[case("watermark:\n  overlay: asset:logo\n  size_ceiling_bytes: 0\n", "size_ceiling_bytes")]
fn test_validation_errors(#[case] override_yaml: &str, #[case] expected: &str) {
    let mut base: serde_yaml::Value = serde_yaml::from_str(FULL).unwrap();
    let patch: serde_yaml::Value = serde_yaml::from_str(override_yaml).unwrap();

    // Merge one level deep: section -> keys
    if let (Some(base_map), Some(patch_map)) = (base.as_mapping_mut(), patch.as_mapping()) {
        for (section, values) in patch_map {
            let target = base_map
                .get_mut(section)
                .and_then(|v| v.as_mapping_mut())
                .expect("section exists in FULL");
            for (key, value) in values.as_mapping().unwrap() {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    let yaml = serde_yaml::to_string(&base).unwrap();
    let config = Config::from_yaml_with_env(&yaml).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.contains(expected), "error '{err}' should mention '{expected}'");
}

#[test]
fn test_full_config_from_file_with_env_token() {
    std::env::set_var("ESTATE_WM_UNIT_TOKEN", "from-env");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("estate.yaml");
    std::fs::write(&path, FULL.replace("static-token", "${ESTATE_WM_UNIT_TOKEN}")).unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.store.token, "from-env");
    assert_eq!(config.watermark.overlay, "https://cdn.example.com/logo.png");
}
