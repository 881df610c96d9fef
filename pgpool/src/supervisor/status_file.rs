//! Persistent status store (spec §3 "Persistent status record", §4.B).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::backend::BackendStatus;

/// Byte encoding of a backend's on-disk status. Distinct from
/// `BackendStatus` because the file only ever needs to distinguish
/// down-vs-not; `Unused`/`CONNECT_WAIT`/`Up` all collapse to "not down"
/// on load (§4.B).
const STATUS_DOWN: u8 = 1;
const STATUS_NOT_DOWN: u8 = 0;

pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// §4.B `load`. Never fails the caller: I/O errors and the
    /// bogus-file sanity rule both just mean "nothing trustworthy on
    /// disk", so every index is reported as `CONNECT_WAIT`.
    pub fn load(&self, discard_flag: bool, num_backends: usize) -> Vec<BackendStatus> {
        if discard_flag {
            if let Err(err) = fs::remove_file(&self.path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %err, "failed to remove status file");
                }
            }
            return vec![BackendStatus::ConnectWait; num_backends];
        }

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "no usable status file, defaulting to CONNECT_WAIT");
                return vec![BackendStatus::ConnectWait; num_backends];
            }
        };

        let stored: Vec<bool> = (0..num_backends)
            .map(|i| bytes.get(i).copied().unwrap_or(STATUS_NOT_DOWN) == STATUS_DOWN)
            .collect();

        // Bogus-file sanity rule (§4.B): a file where *every* backend is
        // DOWN cannot be trusted (it would otherwise leave the pool
        // permanently unable to serve) and is treated as absent.
        if num_backends > 0 && stored.iter().all(|&down| down) {
            warn!(path = %self.path.display(), "status file marks every backend DOWN, treating as bogus");
            return vec![BackendStatus::ConnectWait; num_backends];
        }

        stored
            .into_iter()
            .map(|down| {
                if down {
                    BackendStatus::Down
                } else {
                    BackendStatus::ConnectWait
                }
            })
            .collect()
    }

    /// §4.B `save`. Called on clean shutdown only; failures are logged,
    /// never fatal (§7 "Recoverable I/O").
    pub fn save(&self, statuses: &[BackendStatus]) {
        let bytes: Vec<u8> = statuses
            .iter()
            .map(|s| {
                if *s == BackendStatus::Down {
                    STATUS_DOWN
                } else {
                    STATUS_NOT_DOWN
                }
            })
            .collect();

        match fs::write(&self.path, &bytes) {
            Ok(()) => info!(path = %self.path.display(), "wrote status file"),
            Err(err) => warn!(path = %self.path.display(), error = %err, "failed to write status file"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip_preserves_down_set() {
        let dir = tempdir().unwrap();
        let file = StatusFile::new(dir.path().join("pgpool_status"));

        let statuses = vec![
            BackendStatus::Up,
            BackendStatus::Down,
            BackendStatus::Up,
        ];
        file.save(&statuses);

        let loaded = file.load(false, 3);
        assert_eq!(
            loaded,
            vec![
                BackendStatus::ConnectWait,
                BackendStatus::Down,
                BackendStatus::ConnectWait,
            ]
        );
    }

    #[test]
    fn test_bogus_all_down_file_is_discarded() {
        let dir = tempdir().unwrap();
        let file = StatusFile::new(dir.path().join("pgpool_status"));
        file.save(&[BackendStatus::Down, BackendStatus::Down]);

        let loaded = file.load(false, 2);
        assert_eq!(
            loaded,
            vec![BackendStatus::ConnectWait, BackendStatus::ConnectWait]
        );
    }

    #[test]
    fn test_discard_flag_unlinks_and_resets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pgpool_status");
        let file = StatusFile::new(&path);
        file.save(&[BackendStatus::Down]);
        assert!(path.exists());

        let loaded = file.load(true, 1);
        assert_eq!(loaded, vec![BackendStatus::ConnectWait]);
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_file_defaults_to_connect_wait() {
        let dir = tempdir().unwrap();
        let file = StatusFile::new(dir.path().join("does_not_exist"));
        let loaded = file.load(false, 2);
        assert_eq!(
            loaded,
            vec![BackendStatus::ConnectWait, BackendStatus::ConnectWait]
        );
    }
}
