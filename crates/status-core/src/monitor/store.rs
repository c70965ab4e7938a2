use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::StateError;
use crate::target::sanitize_id;

/// Durable last-status map: one `<sanitized id>.txt` file per target holding
/// only the decimal code.
///
/// No locking is performed. Two processes sharing a directory can lose
/// updates.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, target_id: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", sanitize_id(target_id)))
    }

    /// Return the previously persisted code for `target_id` (if any) and
    /// overwrite it with `new_code`.
    ///
    /// An unreadable previous file counts as no previous value; the file is
    /// still overwritten.
    pub fn get_previous_and_persist(
        &self,
        target_id: &str,
        new_code: i64,
    ) -> Result<Option<String>, StateError> {
        fs::create_dir_all(&self.dir).map_err(|source| StateError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(target_id);
        let previous = match fs::read(&path) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).trim().to_string()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(target = target_id, path = %path.display(), error = %e, "Ignoring unreadable state file");
                None
            }
        };

        fs::write(&path, new_code.to_string())
            .map_err(|source| StateError::Write { path: path.clone(), source })?;

        debug!(target = target_id, path = %path.display(), previous = ?previous, new_code, "State persisted");
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_returns_none_and_creates_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("nested/status"));

        let prev = store.get_previous_and_persist("api", 200).unwrap();
        assert_eq!(prev, None);
        assert_eq!(fs::read_to_string(store.path_for("api")).unwrap(), "200");
    }

    #[test]
    fn second_call_returns_previous_and_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path());

        store.get_previous_and_persist("api", 200).unwrap();
        let prev = store.get_previous_and_persist("api", -1).unwrap();
        assert_eq!(prev.as_deref(), Some("200"));
        assert_eq!(fs::read_to_string(store.path_for("api")).unwrap(), "-1");
    }

    #[test]
    fn unchanged_code_is_still_rewritten() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path());
        let path = store.path_for("api");
        fs::write(&path, "200\n").unwrap();

        let prev = store.get_previous_and_persist("api", 200).unwrap();
        assert_eq!(prev.as_deref(), Some("200"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "200");
    }

    #[test]
    fn non_utf8_state_file_is_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path());
        let path = store.path_for("api");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let prev = store.get_previous_and_persist("api", 200).unwrap();
        assert_ne!(prev.as_deref(), Some("200"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "200");

        let prev = store.get_previous_and_persist("api", 200).unwrap();
        assert_eq!(prev.as_deref(), Some("200"));
    }

    #[test]
    fn file_name_is_sanitized() {
        let store = StateStore::new("/var/lib/status");
        assert_eq!(
            store.path_for("host:8080/api"),
            PathBuf::from("/var/lib/status/host_8080_api.txt")
        );
    }

    #[test]
    fn targets_do_not_share_state() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path());

        store.get_previous_and_persist("a", 200).unwrap();
        assert_eq!(store.get_previous_and_persist("b", 500).unwrap(), None);
        assert_eq!(store.get_previous_and_persist("a", 200).unwrap().as_deref(), Some("200"));
    }

    #[test]
    fn unwritable_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();
        let store = StateStore::new(&blocker);

        let err = store.get_previous_and_persist("api", 200).unwrap_err();
        assert!(matches!(err, StateError::CreateDir { .. }), "{}", err);
        assert_eq!(err.path(), &blocker);
    }
}
