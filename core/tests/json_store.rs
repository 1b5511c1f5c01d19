use reflow_core::store::seed_builtin_profiles;
use reflow_core::{JsonProfileStore, Phase, Profile, ProfileStore, StoreError};
use std::fs;

fn three_phase() -> Profile {
    Profile::new(
        "Sn63 Pb37",
        vec![
            Phase::named("Preheat", 150.0, 90.0),
            Phase::new(183.0, 60.5),
            Phase::named("Cooling", 40.0, 120.0),
        ],
    )
}

#[test]
fn save_then_load_preserves_phases() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonProfileStore::open(dir.path()).unwrap();

    let profile = three_phase();
    store.save(&profile).unwrap();
    assert!(dir.path().join("sn63_pb37.json").exists());

    let loaded = store.load("Sn63 Pb37").unwrap();
    assert_eq!(loaded, profile);
    assert_eq!(loaded.phases.len(), 3);
    assert_eq!(loaded.phases[1].duration_s, 60.5);
}

#[test]
fn list_is_sorted_and_skips_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonProfileStore::open(dir.path()).unwrap();
    store
        .save(&Profile::new("zinc", vec![Phase::new(100.0, 10.0)]))
        .unwrap();
    store
        .save(&Profile::new("Alpha", vec![Phase::new(100.0, 10.0)]))
        .unwrap();
    fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    assert_eq!(store.list().unwrap(), vec!["Alpha", "zinc"]);
}

#[test]
fn load_reports_missing_and_malformed_profiles() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonProfileStore::open(dir.path()).unwrap();

    assert_eq!(
        store.load("ghost"),
        Err(StoreError::NotFound("ghost".to_string()))
    );

    fs::write(
        dir.path().join("bad.json"),
        r#"{"name": "bad", "phases": [{"target_temperature_c": 100}]}"#,
    )
    .unwrap();
    assert!(matches!(store.load("bad"), Err(StoreError::Parse(_))));

    fs::write(
        dir.path().join("empty.json"),
        r#"{"name": "empty", "phases": []}"#,
    )
    .unwrap();
    assert!(matches!(store.load("empty"), Err(StoreError::Parse(_))));
}

#[test]
fn unknown_keys_are_ignored_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonProfileStore::open(dir.path()).unwrap();
    fs::write(
        dir.path().join("legacy.json"),
        r#"{"name": "legacy", "total_duration": 3,
            "phases": [{"name": "Warm", "start_temp": 25, "target_temperature_c": 60, "duration_s": 180}]}"#,
    )
    .unwrap();

    let profile = store.load("legacy").unwrap();
    assert_eq!(profile.phases, vec![Phase::named("Warm", 60.0, 180.0)]);
}

#[test]
fn delete_and_seed() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonProfileStore::open(dir.path().join("profiles")).unwrap();
    assert_eq!(seed_builtin_profiles(&store).unwrap(), 2);
    assert_eq!(store.list().unwrap().len(), 2);

    store.delete("Test Profile").unwrap();
    assert_eq!(store.list().unwrap(), vec!["Lead-free Reflow"]);
    assert_eq!(
        store.delete("Test Profile"),
        Err(StoreError::NotFound("Test Profile".to_string()))
    );
    assert_eq!(seed_builtin_profiles(&store).unwrap(), 0);
}

#[test]
fn invalid_profile_never_reaches_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonProfileStore::open(dir.path()).unwrap();
    let err = store
        .save(&Profile::new("neg", vec![Phase::new(100.0, -1.0)]))
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn names_sharing_a_file_stem_do_not_overwrite_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonProfileStore::open(dir.path()).unwrap();
    let original = Profile::new("Lead Free", vec![Phase::new(245.0, 90.0)]);
    store.save(&original).unwrap();

    let err = store
        .save(&Profile::new("lead_free", vec![Phase::new(200.0, 60.0)]))
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::NameCollision {
            name: "lead_free".to_string(),
            existing: "Lead Free".to_string(),
        }
    );
    assert_eq!(store.list().unwrap(), vec!["Lead Free"]);
    assert_eq!(store.load("Lead Free").unwrap(), original);

    // Same name saves over itself.
    let updated = Profile::new("Lead Free", vec![Phase::new(250.0, 95.0)]);
    store.save(&updated).unwrap();
    assert_eq!(store.load("Lead Free").unwrap(), updated);
}
