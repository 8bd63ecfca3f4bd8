// file: src/utils/system.rs
// version: 1.0.0
// guid: e2c7a914-8b3d-4f60-a5d1-0f96b4e83c27

//! System utility functions

use std::ffi::OsString;
use std::path::PathBuf;
use tracing::debug;

/// System utility functions
pub struct SystemUtils;

impl SystemUtils {
    /// Check if running as root
    pub fn is_root() -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    /// Real user and group IDs of the invoking process, as `uid:gid`
    pub fn owner_spec() -> String {
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        format!("{}:{}", uid, gid)
    }

    /// Resolve a command against an explicit search path
    pub fn locate_in(command: &str, search_path: Option<&OsString>) -> Option<PathBuf> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let found = which::which_in(command, search_path, cwd).ok();
        debug!("Lookup of {}: {:?}", command, found);
        found
    }

    /// Return the subset of `commands` that does not resolve, in input order.
    ///
    /// `search_path` defaults to the process `PATH`.
    pub fn find_missing_commands<S: AsRef<str>>(
        commands: &[S],
        search_path: Option<OsString>,
    ) -> Vec<String> {
        let search_path = search_path.or_else(|| std::env::var_os("PATH"));
        commands
            .iter()
            .map(AsRef::as_ref)
            .filter(|cmd| Self::locate_in(cmd, search_path.as_ref()).is_none())
            .map(str::to_string)
            .collect()
    }
}
