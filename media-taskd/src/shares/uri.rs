use std::path::{Component, Path, PathBuf};

use super::ShareDetails;
use crate::{Error, Result};

/// Scheme prefix of share-relative URIs.
pub const SHARE_URI_PREFIX: &str = "share://";

/// Protocol entry a share needs for local path resolution.
pub const PROTOCOL_FILE: &str = "file";

/// Path of `uri` relative to the root of share `share_id`.
///
/// Returns `None` when `uri` is not of the form `share://{share_id}/...`.
pub fn share_relative_path<'a>(uri: &'a str, share_id: &str) -> Option<&'a str> {
    uri.strip_prefix(SHARE_URI_PREFIX)?
        .strip_prefix(share_id)?
        .strip_prefix('/')
}

/// Translate a `share://` URI into a local path under the share's `file` root.
pub fn resolve_share_uri(uri: &str, share: &ShareDetails) -> Result<PathBuf> {
    if !uri.starts_with(SHARE_URI_PREFIX) {
        return Err(Error::validation(format!(
            "invalid uri {uri:?}: expected {SHARE_URI_PREFIX}{}/...",
            share.id
        )));
    }

    if !share.supports(PROTOCOL_FILE) {
        return Err(Error::validation(format!(
            "share '{}' does not support the '{PROTOCOL_FILE}' protocol",
            share.id
        )));
    }

    let base = share.base_path(PROTOCOL_FILE).ok_or_else(|| {
        Error::validation(format!(
            "share '{}' has no '{PROTOCOL_FILE}' path",
            share.id
        ))
    })?;

    let relative = share_relative_path(uri, &share.id).ok_or_else(|| {
        Error::validation(format!("uri {uri:?} does not belong to share '{}'", share.id))
    })?;

    let relative = Path::new(relative);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.as_os_str().is_empty() || escapes {
        return Err(Error::validation(format!(
            "uri {uri:?} does not name a file inside share '{}'",
            share.id
        )));
    }

    Ok(Path::new(base).join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shares::SharePath;
    use std::collections::HashMap;

    fn share(protocols: &[&str], file_root: Option<&str>) -> ShareDetails {
        let mut paths = HashMap::new();
        if let Some(root) = file_root {
            paths.insert(
                PROTOCOL_FILE.to_string(),
                SharePath {
                    protocol: PROTOCOL_FILE.to_string(),
                    path: Some(root.to_string()),
                    credentials: Default::default(),
                },
            );
        }
        ShareDetails {
            id: "s1".to_string(),
            name: None,
            protocols: protocols.iter().map(|p| p.to_string()).collect(),
            paths,
        }
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(share_relative_path("share://s1/a/b.mp4", "s1"), Some("a/b.mp4"));
        assert_eq!(share_relative_path("share://s2/a/b.mp4", "s1"), None);
        assert_eq!(share_relative_path("share://s10/a.mp4", "s1"), None);
        assert_eq!(share_relative_path("ftp://s1/a.mp4", "s1"), None);
    }

    #[test]
    fn test_resolves_under_file_root() {
        let share = share(&["file"], Some("/mnt/media"));
        let path = resolve_share_uri("share://s1/2024/clip.mp4", &share).unwrap();
        assert_eq!(path, PathBuf::from("/mnt/media/2024/clip.mp4"));
    }

    #[test]
    fn test_rejects_other_schemes_and_shares() {
        let share = share(&["file"], Some("/mnt/media"));
        assert!(resolve_share_uri("/mnt/media/clip.mp4", &share).is_err());
        assert!(resolve_share_uri("share://other/clip.mp4", &share).is_err());
    }

    #[test]
    fn test_requires_file_protocol() {
        let err = resolve_share_uri("share://s1/clip.mp4", &share(&["ftp"], None)).unwrap_err();
        assert!(err.is_precondition());
        assert!(resolve_share_uri("share://s1/clip.mp4", &share(&["file"], None)).is_err());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let share = share(&["file"], Some("/mnt/media"));
        assert!(resolve_share_uri("share://s1/../etc/passwd", &share).is_err());
        assert!(resolve_share_uri("share://s1//etc/passwd", &share).is_err());
        assert!(resolve_share_uri("share://s1/", &share).is_err());
    }
}
