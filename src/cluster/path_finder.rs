//! Locating the `kubectl` binary.

use std::path::{Path, PathBuf};

/// Name of the binary looked up when no explicit path is configured.
pub(crate) const KUBECTL: &str = "kubectl";

/// System directories that hold `kubectl` without always being on `PATH`
/// (package managers, snap).
const SYSTEM_DIRS: &[&str] = &["/usr/local/bin", "/usr/bin", "/snap/bin"];

/// Directories below `$HOME` where user installs of `kubectl` land:
/// manual installs, krew-style setups and the Google Cloud SDK.
const HOME_DIRS: &[&str] = &[".local/bin", "bin", "google-cloud-sdk/bin"];

/// Find the `kubectl` binary.
///
/// `PATH` is searched first via the `which` crate. If that fails, the
/// well-known install directories from [`candidate_dirs`] are checked in
/// order.
///
/// # Returns
///
/// `Some(PathBuf)` with the first match, `None` if `kubectl` is nowhere to
/// be found. Callers fall back to the bare name so the failure surfaces as
/// a query error on first use.
pub(crate) fn find_kubectl() -> Option<PathBuf> {
    if let Ok(path) = which::which(KUBECTL) {
        return Some(path);
    }
    let home = std::env::var_os("HOME").map(PathBuf::from);
    find_in_dirs(&candidate_dirs(home.as_deref()), KUBECTL)
}

/// Fallback directories in search order: system directories, then the
/// per-user ones when a home directory is known.
fn candidate_dirs(home: Option<&Path>) -> Vec<PathBuf> {
    let system = SYSTEM_DIRS.iter().map(PathBuf::from);
    let user = home
        .into_iter()
        .flat_map(|home| HOME_DIRS.iter().map(move |dir| home.join(dir)));
    system.chain(user).collect()
}

/// First `<dir>/<name>` that exists.
fn find_in_dirs(dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
    dirs.iter().map(|dir| dir.join(name)).find(|path| path.is_file())
}
