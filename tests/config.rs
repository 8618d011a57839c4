use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use hitzone::config::{ConfigWatcher, HitzoneConfig};
use hitzone::DetectorMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "HITZONE_CONFIG",
        "HITZONE_CAMERA_DEVICE",
        "HITZONE_PLC_ADDR",
        "HITZONE_PLC_SLOT",
        "HITZONE_PLC_ENABLED",
        "HITZONE_DETECTOR_MODE",
    ] {
        std::env::remove_var(key);
    }
}

fn temp_config(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file.flush().expect("flush config");
    file
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = temp_config(
        ".json",
        r#"{
            "camera": {
                "device": "/dev/video2",
                "width": 1280,
                "height": 720,
                "target_fps": 25,
                "max_consecutive_failures": 10
            },
            "plc": {
                "addr": "10.0.0.5",
                "slot": 2,
                "target1_tag": "Cell1.Hit",
                "reconnect_interval_s": 5.0
            },
            "tuning": {
                "detector_mode": "fast",
                "min_radius": 6,
                "deadband_px": 2.5
            },
            "targets": [
                {"rel_x": 0.25, "rel_y": 0.4, "diameter": 60},
                {"x": 960, "y": 360, "diameter": 50}
            ]
        }"#,
    );

    std::env::set_var("HITZONE_CONFIG", file.path());
    std::env::set_var("HITZONE_PLC_ADDR", "10.0.0.9:2222");
    std::env::set_var("HITZONE_PLC_SLOT", "4");
    std::env::set_var("HITZONE_DETECTOR_MODE", "robust");

    let cfg = HitzoneConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "/dev/video2");
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));
    assert_eq!(cfg.camera.target_fps, 25);
    assert_eq!(cfg.camera.max_consecutive_failures, 10);
    assert_eq!(cfg.camera.reconnect_delay, Duration::from_millis(1000));
    assert_eq!(cfg.plc.addr, "10.0.0.9:2222");
    assert_eq!(cfg.plc.slot, 4);
    assert_eq!(cfg.plc.target1_tag, "Cell1.Hit");
    assert_eq!(cfg.plc.target2_tag, "Target2_Hit");
    assert!(cfg.plc.enabled);
    assert_eq!(cfg.tuning.detector_mode, DetectorMode::Robust);
    assert_eq!(cfg.tuning.min_radius, 6);
    assert_eq!(cfg.tuning.deadband_px, 2.5);
    assert_eq!(cfg.tuning.zones[0].diameter, 60);
    assert_eq!(cfg.tuning.zones[1].rel_x, 0.75);
    assert_eq!(cfg.tuning.zones[1].rel_y, 0.5);

    let endpoint = cfg.endpoint().expect("endpoint");
    assert_eq!((endpoint.host.as_str(), endpoint.port, endpoint.slot), ("10.0.0.9", 2222, 4));

    let writer = cfg.writer_config().expect("writer config");
    assert_eq!(writer.reconnect_interval, Duration::from_secs(5));
    assert_eq!(writer.tags[0], "Cell1.Hit");

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = temp_config(
        ".toml",
        r#"
[camera]
device = "stub://bench"

[plc]
enabled = false

[tuning]
stability_frames = 4

[[targets]]
rel_x = 0.2
rel_y = 0.5

[[targets]]
rel_x = 0.8
rel_y = 0.5
diameter = 30

[marker]
bands = [
    { lower = [100, 120, 60], upper = [125, 255, 255] },
    { lower = [100, 120, 60], upper = [125, 255, 255] },
]
"#,
    );

    let cfg = HitzoneConfig::load_from(Some(file.path())).expect("load toml");
    assert_eq!(cfg.camera.device, "stub://bench");
    assert!(!cfg.plc.enabled);
    assert_eq!(cfg.tuning.off_frames, 4);
    assert_eq!(cfg.tuning.hold_frames, 8);
    assert_eq!(cfg.tuning.zones[0].rel_x, 0.2);
    assert_eq!(cfg.tuning.zones[0].diameter, 40);
    assert_eq!(cfg.tuning.zones[1].diameter, 30);
    assert_eq!(cfg.marker_bands[0].lower, [100, 120, 60]);

    clear_env();
}

#[test]
fn rejects_invalid_configs() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cases = [
        r#"{"camera": {"width": 0}}"#,
        r#"{"plc": {"reconnect_interval_s": 0}}"#,
        r#"{"plc": {"io_timeout_ms": 0}}"#,
        r#"{"plc": {"poll_timeout_ms": 0}}"#,
        r#"{"plc": {"shutdown_timeout_ms": 0}}"#,
        r#"{"plc": {"target2_tag": "  "}}"#,
        r#"{"targets": [{"rel_x": 0.5, "rel_y": 0.5}]}"#,
        r#"{"targets": [{"rel_x": 0.5, "rel_y": -0.1}, {"rel_x": 0.5, "rel_y": 0.5}]}"#,
        r#"{"tuning": {"detector_mode": "sonar"}}"#,
        r#"{"unknown_section": {}}"#,
    ];
    for case in cases {
        let file = temp_config(".json", case);
        assert!(
            HitzoneConfig::load_from(Some(file.path())).is_err(),
            "accepted invalid config {}",
            case
        );
    }

    std::env::set_var("HITZONE_PLC_ENABLED", "perhaps");
    assert!(HitzoneConfig::load_from(None).is_err());

    clear_env();
}

#[test]
fn missing_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let err = HitzoneConfig::load_from(Some(std::path::Path::new("/nonexistent/hitzone.json")))
        .unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}

#[test]
fn watcher_reports_tuning_changes_once() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = temp_config(".json", r#"{"tuning": {"min_radius": 5}}"#);
    let mut watcher = ConfigWatcher::new(file.path());
    assert!(watcher.poll().expect("poll").is_none());

    // Make sure the new mtime differs even on coarse-grained filesystems.
    std::thread::sleep(Duration::from_millis(1100));
    file.as_file_mut().set_len(0).expect("truncate");
    let mut handle = std::fs::OpenOptions::new()
        .write(true)
        .open(file.path())
        .expect("reopen");
    handle
        .write_all(br#"{"tuning": {"min_radius": 9, "detector_mode": "fast"}}"#)
        .expect("rewrite");
    handle.sync_all().expect("sync");

    let tuning = watcher.poll().expect("poll").expect("changed");
    assert_eq!(tuning.min_radius, 9);
    assert_eq!(tuning.detector_mode, DetectorMode::Fast);
    assert!(watcher.poll().expect("poll").is_none());
}
