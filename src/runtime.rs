//! Resolves the runtime state directory (where the control socket lives) under the invoking
//! user's home, with a test-only override so tests never touch a real `$HOME`.

use std::env;
use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};

#[cfg(test)]
use std::path::Path;

static STATE_DIR: OnceLock<RwLock<PathBuf>> = OnceLock::new();

fn state_dir_lock() -> &'static RwLock<PathBuf> {
    STATE_DIR.get_or_init(|| RwLock::new(default_state_dir()))
}

fn default_state_dir() -> PathBuf {
    let home = env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"));
    home.join(".local/share/supervisor")
}

/// The directory where runtime artifacts (currently just the control socket) are stored.
pub fn state_dir() -> PathBuf {
    state_dir_lock().read().expect("runtime dir lock poisoned").clone()
}

#[cfg(test)]
pub fn init_with_test_home(home: &Path) {
    let mut guard = state_dir_lock().write().expect("runtime dir lock poisoned");
    *guard = home.join(".local/share/supervisor");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::env_lock;
    use tempfile::tempdir;

    #[test]
    fn state_dir_is_scoped_under_test_home() {
        let _guard = env_lock();
        let temp = tempdir().expect("tempdir");
        init_with_test_home(temp.path());
        assert_eq!(
            state_dir(),
            temp.path().join(".local/share/supervisor")
        );
    }
}
