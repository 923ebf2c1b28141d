//! Pack file management: save/load, import into the pack directory,
//! listing, module application and the `.tscfg` priority rule

mod common;

use common::*;
use devtrust_pack::{ConfigPackEngine, CreateOptions, PackConfig, PackError, PackErrorKind, Result};
use serde_json::Value;
use std::fs;

fn kind<T: std::fmt::Debug>(result: Result<T>) -> PackErrorKind {
    result.expect_err("operation should fail").kind()
}

#[test]
fn test_import_list_and_get_content() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pack_dir = dir.path().join("config");
    let ca = lab_ca("DevTrust Test CA")?;
    let dev1 = provision(&ca, "dev-001", "Developer", pack_config(&dir.path().join("out")))?;
    let dev2 = provision(&ca, "dev-002", "Device", pack_config(&pack_dir))?;

    assert!(dev2.engine.list()?.is_empty());

    let wifi = dev1
        .engine
        .create("wifi", b"{\"ssid\":\"lab\"}", &dev2.cert_pem, &CreateOptions::default())?;
    let ntp = dev1.engine.create(
        "ntp",
        b"{\"server\":\"pool.ntp.org\"}",
        &dev2.cert_pem,
        &CreateOptions::default(),
    )?;

    let imported = dev2.engine.import(&wifi)?;
    assert_eq!(imported.metadata.name, "wifi");
    assert_eq!(imported.sig_info.signer_cn, "dev-001");
    assert_eq!(imported.saved_path, pack_dir.join("wifi.tscfg"));
    assert_eq!(fs::read_to_string(&imported.saved_path)?, wifi);
    dev2.engine.import(&ntp)?;

    // Stray files are not packs
    fs::write(pack_dir.join("notes.txt"), b"ignore me")?;

    assert_eq!(dev2.engine.list()?, vec!["ntp".to_string(), "wifi".to_string()]);
    assert_eq!(dev2.engine.get_content("wifi")?, b"{\"ssid\":\"lab\"}".to_vec());
    assert_eq!(
        dev2.engine.get_content("ntp")?,
        b"{\"server\":\"pool.ntp.org\"}".to_vec()
    );
    assert_eq!(kind(dev2.engine.get_content("missing")), PackErrorKind::Io);
    assert_eq!(kind(dev2.engine.get_content("../wifi")), PackErrorKind::InvalidArgument);
    Ok(())
}

#[test]
fn test_import_rejects_foreign_and_misnamed_packs() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pack_dir = dir.path().join("config");
    let ca = lab_ca("DevTrust Test CA")?;
    let dev1 = provision(&ca, "dev-001", "Developer", pack_config(&pack_dir))?;
    let dev2 = provision(&ca, "dev-002", "Device", pack_config(&pack_dir))?;
    let dev3 = provision(&ca, "dev-003", "Device", pack_config(&pack_dir))?;

    let json = dev1
        .engine
        .create("wifi", NET_CONFIG, &dev2.cert_pem, &CreateOptions::default())?;
    assert_eq!(kind(dev3.engine.import(&json)), PackErrorKind::Recipient);

    let escaping = set_field(&json, "metadata", "name", Value::from("../../etc/wifi"));
    assert_eq!(kind(dev2.engine.import(&escaping)), PackErrorKind::InvalidArgument);

    let tampered = flip_bit(&json, None, "payload", 0);
    assert_eq!(kind(dev2.engine.import(&tampered)), PackErrorKind::Signature);

    assert!(dev2.engine.list()?.is_empty());

    // Unnamed packs are stored under a default name
    let mut unnamed: Value = serde_json::from_str(&json).expect("json");
    unnamed["metadata"]
        .as_object_mut()
        .expect("metadata")
        .remove("name");
    let imported = dev2.engine.import(&unnamed.to_string())?;
    assert_eq!(imported.metadata.name, "unnamed");
    assert_eq!(dev2.engine.list()?, vec!["unnamed".to_string()]);
    Ok(())
}

#[test]
fn test_save_and_load_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ca = lab_ca("DevTrust Test CA")?;
    let dev1 = provision(&ca, "dev-001", "Developer", pack_config(dir.path()))?;
    let dev2 = provision(&ca, "dev-002", "Device", pack_config(dir.path()))?;

    let json = dev1
        .engine
        .create("net-config", NET_CONFIG, &dev2.cert_pem, &CreateOptions::default())?;
    let path = dir.path().join("export").join("nested").join("net-config.tscfg");
    dev1.engine.save(&path, &json)?;

    assert_eq!(dev2.engine.verify_file(&path)?.signer_cn, "dev-001");
    assert_eq!(dev2.engine.load_file(&path)?.content, NET_CONFIG.to_vec());

    let metadata = dev2.engine.validate_file(&path)?;
    assert_eq!(metadata.name, "net-config");
    assert!(dev2.engine.list()?.is_empty());

    assert_eq!(
        kind(dev2.engine.load_file(&dir.path().join("absent.tscfg"))),
        PackErrorKind::Io
    );

    let empty = dir.path().join("empty.tscfg");
    fs::write(&empty, b"")?;
    assert_eq!(kind(dev2.engine.load_file(&empty)), PackErrorKind::InvalidArgument);

    let small = dev2.engine_with(PackConfig {
        max_pack_size: 256,
        ..pack_config(dir.path())
    });
    assert_eq!(kind(small.verify_file(&path)), PackErrorKind::InvalidArgument);
    Ok(())
}

#[test]
fn test_save_into_unwritable_location_is_io_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ca = lab_ca("DevTrust Test CA")?;
    let dev1 = provision(&ca, "dev-001", "Developer", pack_config(dir.path()))?;
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"a file, not a directory")?;

    let err = dev1
        .engine
        .save(&blocker.join("pack.tscfg"), "{}")
        .expect_err("parent is a file");
    assert!(matches!(err, PackError::Io(_)));
    Ok(())
}

#[test]
fn test_apply_file_hands_out_modules() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ca = lab_ca("DevTrust Test CA")?;
    let dev1 = provision(&ca, "dev-001", "Developer", pack_config(dir.path()))?;
    let dev2 = provision(&ca, "dev-002", "Device", pack_config(dir.path()))?;

    let content = br#"{"network": {"ssid": "lab"}, "ntp": {"server": "pool.ntp.org"}}"#;
    let json = dev1
        .engine
        .create("system", content, &dev2.cert_pem, &CreateOptions::default())?;
    let path = dir.path().join("system.tscfg");
    dev1.engine.save(&path, &json)?;

    let mut seen = Vec::new();
    let applied = dev2.engine.apply_file(&path, |module, config| {
        seen.push((module.to_string(), config.clone()));
        Ok(())
    })?;
    assert_eq!(applied, vec!["network".to_string(), "ntp".to_string()]);
    assert_eq!(seen[0].1["ssid"], "lab");
    assert_eq!(seen[1].1["server"], "pool.ntp.org");

    // Applier failures stop the run
    let err = dev2
        .engine
        .apply_file(&path, |module, _| {
            if module == "ntp" {
                Err(PackError::InvalidArgument("ntp rejected".into()))
            } else {
                Ok(())
            }
        })
        .expect_err("applier failure");
    assert_eq!(err.kind(), PackErrorKind::InvalidArgument);

    let list = dev1
        .engine
        .create("list", b"[1, 2, 3]", &dev2.cert_pem, &CreateOptions::default())?;
    let list_path = dir.path().join("list.tscfg");
    dev1.engine.save(&list_path, &list)?;
    assert_eq!(
        kind(dev2.engine.apply_file(&list_path, |_, _| Ok(()))),
        PackErrorKind::Parse
    );
    Ok(())
}

#[test]
fn test_load_with_priority() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ca = lab_ca("DevTrust Test CA")?;
    let dev1 = provision(&ca, "dev-001", "Developer", pack_config(dir.path()))?;
    let dev2 = provision(&ca, "dev-002", "Device", pack_config(dir.path()))?;

    let json_path = dir.path().join("network.json");
    let tscfg_path = dir.path().join("network.tscfg");

    assert_eq!(
        kind(dev2.engine.load_with_priority(&dir.path().join("network.yaml"))),
        PackErrorKind::InvalidArgument
    );
    assert_eq!(kind(dev2.engine.load_with_priority(&json_path)), PackErrorKind::Io);

    fs::write(&json_path, b"{\"ssid\":\"plain\"}")?;
    assert!(!ConfigPackEngine::tscfg_exists(&json_path));
    let plain = dev2.engine.load_with_priority(&json_path)?;
    assert!(!plain.used_tscfg);
    assert_eq!(plain.content, b"{\"ssid\":\"plain\"}".to_vec());

    let pack = dev1
        .engine
        .create("network", NET_CONFIG, &dev2.cert_pem, &CreateOptions::default())?;
    dev1.engine.save(&tscfg_path, &pack)?;
    assert!(ConfigPackEngine::tscfg_exists(&json_path));
    let encrypted = dev2.engine.load_with_priority(&json_path)?;
    assert!(encrypted.used_tscfg);
    assert_eq!(encrypted.content, NET_CONFIG.to_vec());

    // dev-001 cannot open a pack addressed to dev-002 and falls back
    let fallback = dev1.engine.load_with_priority(&json_path)?;
    assert!(!fallback.used_tscfg);

    fs::write(&tscfg_path, b"corrupted")?;
    let fallback = dev2.engine.load_with_priority(&json_path)?;
    assert!(!fallback.used_tscfg);
    assert_eq!(fallback.content, b"{\"ssid\":\"plain\"}".to_vec());

    // An encrypted sibling alone is enough
    fs::remove_file(&json_path)?;
    dev1.engine.save(&tscfg_path, &pack)?;
    assert!(dev2.engine.load_with_priority(&json_path)?.used_tscfg);
    Ok(())
}
