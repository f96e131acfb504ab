use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::time::Duration;

use anyhow::Result;
use peerbook_addrbook::{
    AddressBook, AddressBookConfig, AddressBookError, Endpoint, SaveOutcome, MAX_SAVE_INTERVAL,
};

fn ep(s: &str) -> Endpoint {
    s.parse().expect("valid endpoint")
}

fn dir_entries(dir: &std::path::Path) -> Result<Vec<OsString>> {
    let mut names = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<std::io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

#[tokio::test]
async fn save_and_reopen_restores_key_and_peers() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("addrbook.json");

    let book = AddressBook::new(&path)?;
    let peers = [
        "1.2.3.4:13802",
        "8.8.8.8:13802",
        "9.9.9.9:13802",
        "[2a00:1450::1]:13802",
    ];
    for (attempts, key) in peers.iter().enumerate() {
        assert!(book.add_address(ep(key)));
        for _ in 0..attempts {
            book.mark_attempt(key);
        }
    }
    assert_eq!(book.save()?, SaveOutcome::Written { peers: 4 });

    let expected: HashMap<String, u64> = book
        .get_peers()
        .into_iter()
        .map(|known| (known.addr.key(), known.attempts))
        .collect();
    let key = book.identity_key().to_string();
    book.stop().await;

    let reopened = AddressBook::new(&path)?;
    assert_eq!(reopened.identity_key(), key);
    let restored: HashMap<String, u64> = reopened
        .get_peers()
        .into_iter()
        .map(|known| (known.addr.key(), known.attempts))
        .collect();
    assert_eq!(restored, expected);
    assert_eq!(reopened.get_addrs(), vec!["1.2.3.4:13802".to_string()]);
    reopened.stop().await;

    Ok(())
}

#[tokio::test]
async fn restored_records_keep_timestamps() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("addrbook.json");

    let book = AddressBook::new(&path)?;
    book.add_address(ep("8.8.8.8:13802"));
    book.mark_success("8.8.8.8:13802");
    let before = book.peer("8.8.8.8:13802").expect("known").snapshot();
    book.save()?;
    book.stop().await;

    let reopened = AddressBook::new(&path)?;
    let after = reopened.peer("8.8.8.8:13802").expect("restored").snapshot();
    assert_eq!(after, before);
    assert!(after.last_success.is_some());
    reopened.stop().await;

    Ok(())
}

#[tokio::test]
async fn empty_save_does_not_touch_existing_file() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("addrbook.json");

    let book = AddressBook::new(&path)?;
    book.add_address(ep("8.8.8.8:13802"));
    book.save()?;
    book.remove_addr("8.8.8.8:13802");
    let before = fs::read(&path)?;

    assert_eq!(book.save()?, SaveOutcome::Skipped);
    book.stop().await;
    assert_eq!(fs::read(&path)?, before);

    Ok(())
}

#[tokio::test]
async fn empty_save_does_not_create_file() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("addrbook.json");

    let book = AddressBook::new(&path)?;
    assert_eq!(book.save()?, SaveOutcome::Skipped);
    book.stop().await;
    assert!(!path.exists());

    Ok(())
}

#[tokio::test]
async fn corrupt_snapshot_refuses_to_open() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("addrbook.json");
    fs::write(&path, b"not json at all")?;

    match AddressBook::new(&path) {
        Err(AddressBookError::CorruptSnapshot { path: reported, .. }) => {
            assert_eq!(reported, path);
        }
        other => panic!("expected corrupt snapshot error, got {other:?}"),
    }
    assert_eq!(fs::read(&path)?, b"not json at all");

    Ok(())
}

#[tokio::test]
async fn periodic_task_writes_snapshot() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("addrbook.json");
    let config = AddressBookConfig::new(&path).with_save_interval(Duration::from_millis(50));

    let book = AddressBook::open(config)?;
    book.add_address(ep("8.8.8.8:13802"));

    let mut waited = Duration::ZERO;
    while !path.exists() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }
    assert!(path.exists(), "background task never saved");
    book.stop().await;

    Ok(())
}

#[tokio::test]
async fn stop_flushes_final_snapshot() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("addrbook.json");

    let book = AddressBook::new(&path)?;
    book.add_address(ep("8.8.8.8:13802"));
    book.add_address(ep("1.2.3.4:13802"));
    assert!(!path.exists());

    book.stop().await;
    book.stop().await;

    let text = fs::read_to_string(&path)?;
    assert!(text.contains("8.8.8.8:13802"));
    assert!(text.contains("1.2.3.4:13802"));
    assert!(text.contains(book.identity_key()));

    Ok(())
}

#[tokio::test]
async fn huge_save_interval_still_flushes_on_stop() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("addrbook.json");
    let config = AddressBookConfig::new(&path).with_save_interval(Duration::from_secs(u64::MAX));
    assert_eq!(config.effective_save_interval(), MAX_SAVE_INTERVAL);

    let book = AddressBook::open(config)?;
    book.add_address(ep("8.8.8.8:13802"));
    book.stop().await;

    assert!(path.exists(), "stop did not write the final snapshot");
    assert!(fs::read_to_string(&path)?.contains("8.8.8.8:13802"));

    Ok(())
}

#[tokio::test]
async fn failed_save_keeps_previous_snapshot() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("addrbook.json");

    let book = AddressBook::new(&path)?;
    book.add_address(ep("8.8.8.8:13802"));
    book.save()?;
    let previous = fs::read(&path)?;

    // Park the previous snapshot inside a non-empty directory at the target
    // path so the final rename fails.
    let aside = temp_dir.path().join("aside.json");
    fs::rename(&path, &aside)?;
    fs::create_dir(&path)?;
    let kept = path.join("addrbook.json");
    fs::rename(&aside, &kept)?;

    book.add_address(ep("1.2.3.4:13802"));
    assert!(book.save().is_err());
    book.stop().await;

    assert_eq!(fs::read(&kept)?, previous);
    assert_eq!(dir_entries(temp_dir.path())?, vec![OsString::from("addrbook.json")]);
    assert_eq!(dir_entries(&path)?, vec![OsString::from("addrbook.json")]);
    assert_eq!(book.size(), 2);

    Ok(())
}
