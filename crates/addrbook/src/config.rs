use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How often the background task snapshots the book.
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(10);

/// Longest accepted interval between background snapshots. Longer
/// requests are clamped to this.
pub const MAX_SAVE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Permission bits applied to the snapshot file (unix only). The file
/// carries the node's private identity key.
pub const DEFAULT_FILE_MODE: u32 = 0o600;

const DEFAULT_FILE_NAME: &str = "addrbook.json";

/// Address book configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressBookConfig {
    /// Snapshot location
    pub file_path: PathBuf,
    /// Interval between background snapshots
    #[serde(with = "duration_secs")]
    pub save_interval: Duration,
    /// Mode bits applied to the snapshot on write
    pub file_mode: u32,
}

impl Default for AddressBookConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from(DEFAULT_FILE_NAME),
            save_interval: DEFAULT_SAVE_INTERVAL,
            file_mode: DEFAULT_FILE_MODE,
        }
    }
}

impl AddressBookConfig {
    pub fn new<P: Into<PathBuf>>(file_path: P) -> Self {
        Self {
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    /// Place the snapshot under `data_dir` using the default file name.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(DEFAULT_FILE_NAME))
    }

    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    /// Save interval as used by the background task, within
    /// `1ms..=MAX_SAVE_INTERVAL`.
    pub fn effective_save_interval(&self) -> Duration {
        self.save_interval.clamp(Duration::from_millis(1), MAX_SAVE_INTERVAL)
    }

    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AddressBookConfig::default();
        assert_eq!(config.save_interval, Duration::from_secs(10));
        assert_eq!(config.file_mode, 0o600);
        assert_eq!(config.file_path, PathBuf::from("addrbook.json"));
    }

    #[test]
    fn deserializes_partial_config() {
        let config: AddressBookConfig =
            serde_json::from_str(r#"{"file_path": "/tmp/book.json", "save_interval": 30}"#)
                .unwrap();
        assert_eq!(config.file_path, PathBuf::from("/tmp/book.json"));
        assert_eq!(config.save_interval, Duration::from_secs(30));
        assert_eq!(config.effective_save_interval(), Duration::from_secs(30));
        assert_eq!(config.file_mode, DEFAULT_FILE_MODE);
    }

    #[test]
    fn effective_save_interval_is_bounded() {
        let huge = AddressBookConfig::default().with_save_interval(Duration::from_secs(u64::MAX));
        assert_eq!(huge.effective_save_interval(), MAX_SAVE_INTERVAL);

        let zero = AddressBookConfig::default().with_save_interval(Duration::ZERO);
        assert_eq!(zero.effective_save_interval(), Duration::from_millis(1));
    }

    #[test]
    fn in_dir_uses_default_file_name() {
        let config = AddressBookConfig::in_dir(Path::new("/var/lib/peerbook"));
        assert_eq!(
            config.file_path,
            PathBuf::from("/var/lib/peerbook/addrbook.json")
        );
    }
}
