use std::fs;

use crate::config::{
    default_mappings, ConfigFile, ConfigStore, EngineConfig, ProfileError, CONFIG_VERSION,
    DEFAULT_PROFILE,
};
use crate::engine::mapping::{MappingSource, MappingTarget, XBOX_X};

fn temp_store(name: &str) -> ConfigStore {
    let path = std::env::temp_dir().join(format!(
        "padbridge-test-{}-{}.yaml",
        name,
        std::process::id()
    ));
    let _ = fs::remove_file(&path);
    ConfigStore::load(path)
}

fn cleanup(store: &ConfigStore) {
    let _ = fs::remove_file(store.path());
}

#[test]
fn test_defaults_on_missing_file() {
    let store = temp_store("missing");
    assert!(!store.migration_notice);
    assert_eq!(store.file.version, CONFIG_VERSION);
    assert_eq!(store.file.current_profile, DEFAULT_PROFILE);
    assert_eq!(store.file.mappings, default_mappings());
    cleanup(&store);
}

#[test]
fn test_save_and_reload_round_trip() {
    let mut store = temp_store("roundtrip");
    store.file.config.rgb.red = 200;
    store.file.config.deadzone_left = 0.25;
    store.save_profile("Racing").unwrap();
    store.save().unwrap();

    let reloaded = ConfigStore::load(store.path().to_path_buf());
    assert!(!reloaded.migration_notice);
    assert_eq!(reloaded.file.current_profile, "Racing");
    assert_eq!(reloaded.file.config, store.file.config);
    assert_eq!(reloaded.file.mappings, store.file.mappings);
    assert_eq!(
        reloaded.file.profiles.get("Racing"),
        store.file.profiles.get("Racing")
    );
    cleanup(&store);
}

#[test]
fn test_foreign_version_loads_defaults_with_notice() {
    let path = std::env::temp_dir().join(format!(
        "padbridge-test-version-{}.yaml",
        std::process::id()
    ));
    let mut file = ConfigFile::default();
    file.version = CONFIG_VERSION + 1;
    file.config.rgb.red = 7;
    fs::write(&path, serde_yaml::to_string(&file).unwrap()).unwrap();

    let store = ConfigStore::load(path.clone());
    assert!(store.migration_notice);
    assert_eq!(store.file.version, CONFIG_VERSION);
    assert_eq!(store.file.config, EngineConfig::default());
    let _ = fs::remove_file(path);
}

#[test]
fn test_profile_switch_restores_mappings() {
    let mut store = temp_store("profiles");

    // Save the stock state as "Racing", then remap Square.
    store.save_profile("Racing").unwrap();
    for mapping in &mut store.file.mappings {
        if mapping.source == MappingSource::Square {
            mapping.targets = vec![MappingTarget::Keyboard(30)];
        }
    }
    store.save_profile("Racing").unwrap();

    // Loading Default restores the stock Square mapping.
    store.load_profile(DEFAULT_PROFILE).unwrap();
    let square = store
        .file
        .mappings
        .iter()
        .find(|m| m.source == MappingSource::Square)
        .unwrap();
    assert_eq!(square.targets, vec![MappingTarget::XboxButton(XBOX_X)]);
    assert_eq!(store.file.mappings, default_mappings());

    // Loading Racing brings the remap back.
    store.load_profile("Racing").unwrap();
    let square = store
        .file
        .mappings
        .iter()
        .find(|m| m.source == MappingSource::Square)
        .unwrap();
    assert_eq!(square.targets, vec![MappingTarget::Keyboard(30)]);
    cleanup(&store);
}

#[test]
fn test_default_profile_is_immutable() {
    let mut store = temp_store("immutable");
    assert_eq!(
        store.save_profile(DEFAULT_PROFILE),
        Err(ProfileError::NameInvalid(DEFAULT_PROFILE.to_string()))
    );
    assert_eq!(
        store.delete_profile(DEFAULT_PROFILE),
        Err(ProfileError::NameInvalid(DEFAULT_PROFILE.to_string()))
    );
    cleanup(&store);
}

#[test]
fn test_profile_name_validation() {
    let mut store = temp_store("names");
    assert!(matches!(
        store.save_profile(""),
        Err(ProfileError::NameInvalid(_))
    ));
    assert!(matches!(
        store.save_profile("bad/name"),
        Err(ProfileError::NameInvalid(_))
    ));
    assert!(store.save_profile("Racing 2").is_ok());
    cleanup(&store);
}

#[test]
fn test_delete_missing_profile() {
    let mut store = temp_store("delete");
    assert_eq!(
        store.delete_profile("Ghost"),
        Err(ProfileError::NotFound("Ghost".to_string()))
    );

    store.save_profile("Ghost").unwrap();
    assert!(store.delete_profile("Ghost").is_ok());
    // Deleting the current profile falls back to Default.
    assert_eq!(store.file.current_profile, DEFAULT_PROFILE);
    cleanup(&store);
}

#[test]
fn test_list_profiles_starts_with_default() {
    let mut store = temp_store("list");
    store.save_profile("B").unwrap();
    store.save_profile("A").unwrap();
    let profiles = store.list_profiles();
    assert_eq!(profiles[0], DEFAULT_PROFILE);
    assert!(profiles.contains(&"A".to_string()));
    assert!(profiles.contains(&"B".to_string()));
    cleanup(&store);
}

#[test]
fn test_mapping_serde_round_trip() {
    let mappings = default_mappings();
    let json = serde_json::to_string(&mappings).unwrap();
    let back: Vec<crate::engine::mapping::ButtonMapping> = serde_json::from_str(&json).unwrap();
    assert_eq!(mappings, back);

    let yaml = serde_yaml::to_string(&mappings).unwrap();
    let back: Vec<crate::engine::mapping::ButtonMapping> = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(mappings, back);
}
