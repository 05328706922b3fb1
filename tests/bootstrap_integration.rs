use spotlight_capture::bootstrap::{initialize, is_first_launch};
use spotlight_capture::config::Configuration;
use spotlight_capture::settings::{
    LogLevel, Settings, SettingsService, SettingsStore, YamlFileStore, keys,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;

fn cfg_in(root: &Path) -> Configuration {
    Configuration {
        app_data_dir: root.join("app"),
        asset_cache_dir: root.join("assets"),
        working_dir: root.join("work"),
        settings_file: root.join("app").join("settings.yaml"),
        default_save_dir: root.join("Pictures").join("Spotlight"),
        default_log_dir: root.join("app").join("logs"),
        fallback_extension: "jpg".into(),
    }
}

fn service(cfg: &Configuration) -> SettingsService {
    let store = YamlFileStore::open(&cfg.settings_file).unwrap();
    SettingsService::new(Arc::new(store), Settings::defaults(cfg))
}

#[test]
fn first_launch_seeds_defaults_and_directories() {
    let tmp = tempdir().unwrap();
    let cfg = cfg_in(tmp.path());
    assert!(is_first_launch(&cfg));

    let settings = service(&cfg);
    let outcome = initialize(&cfg, &settings).unwrap();
    assert!(outcome.first_launch);
    assert_eq!(outcome.seeded.len(), 4);
    assert!(outcome.install_date.is_some());
    assert!(cfg.app_data_dir.is_dir());
    assert!(cfg.default_save_dir.is_dir());
    assert!(!is_first_launch(&cfg));

    let current = settings.current();
    assert_eq!(current.save_dir, cfg.default_save_dir);
    assert!(!current.logging.enabled);
    assert_eq!(current.logging.level, LogLevel::Information);
    assert!(current.install_info.installed);
}

#[test]
fn second_initialize_keeps_user_changes() {
    let tmp = tempdir().unwrap();
    let cfg = cfg_in(tmp.path());
    let first_date = {
        let settings = service(&cfg);
        let outcome = initialize(&cfg, &settings).unwrap();
        settings.set_save_dir(Path::new("/elsewhere")).unwrap();
        settings.set_logging_enabled(true).unwrap();
        outcome.install_date
    };

    // Fresh process: reopen the persisted store.
    let settings = service(&cfg);
    let outcome = initialize(&cfg, &settings).unwrap();
    assert!(!outcome.first_launch);
    assert!(outcome.seeded.is_empty());
    assert_eq!(outcome.install_date, first_date);
    assert_eq!(settings.save_dir(), PathBuf::from("/elsewhere"));
    assert!(settings.current().logging.enabled);
    assert!(settings.store().contains(keys::INSTALL_DATE));
}
