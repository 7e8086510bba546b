use std::path::{Path, PathBuf};
use uzers::os::unix::UserExt;

/// Expand a leading tilde in configured paths.
///
/// Supports `~`, `~/path` (current user, from `HOME`) and `~user/path`.
/// Returns `None` when the home directory cannot be determined.
///
/// # Examples
///
/// ```
/// use satellite_install::utils::path::expand_tilde;
///
/// let root = expand_tilde("/srv/satellite-agents").unwrap();
/// assert_eq!(root, std::path::PathBuf::from("/srv/satellite-agents"));
/// ```
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_str()?;

    let Some(after_tilde) = path_str.strip_prefix('~') else {
        return Some(path.to_path_buf());
    };

    if after_tilde.is_empty() || after_tilde.starts_with('/') {
        let home = std::env::var("HOME").ok().filter(|h| !h.is_empty())?;
        return Some(PathBuf::from(home).join(after_tilde.trim_start_matches('/')));
    }

    let (username, rest) = after_tilde.split_once('/').unwrap_or((after_tilde, ""));
    let user = uzers::get_user_by_name(username)?;
    Some(user.home_dir().join(rest))
}

/// Numeric id of the invoking user. `UID` wins when exported, since that is
/// what the runtime directory layout was derived from.
pub fn current_uid() -> u32 {
    std::env::var("UID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(uzers::get_current_uid)
}
