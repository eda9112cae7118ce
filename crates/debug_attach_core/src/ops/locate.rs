use crate::{AttachConfig, EnvironmentDescriptor, ProjectKind};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Where the descriptor would live for this server directory hint. `None` when the
/// hint is empty, i.e. the server directory is not known yet.
pub fn descriptor_path(server_dir_hint: &str, config: &AttachConfig) -> Option<PathBuf> {
    let hint = server_dir_hint.trim();
    if hint.is_empty() {
        return None;
    }
    Some(Path::new(hint).join(&config.descriptor_file_name))
}

/// The descriptor file, if the server has written it already.
pub async fn locate(server_dir_hint: &str, config: &AttachConfig) -> Option<PathBuf> {
    let path = descriptor_path(server_dir_hint, config)?;
    if file_exists(&path).await {
        Some(path)
    } else {
        None
    }
}

pub fn backup_marker_path(descriptor_path: &Path, backup_suffix: &str) -> PathBuf {
    let mut name = OsString::from(descriptor_path.as_os_str());
    name.push(backup_suffix);
    PathBuf::from(name)
}

/// Whether the sibling backup marker exists. Only its presence matters, never its content.
pub async fn backup_marker_exists(descriptor_path: &Path, backup_suffix: &str) -> bool {
    file_exists(&backup_marker_path(descriptor_path, backup_suffix)).await
}

/// Fresh observation of the descriptor and its backup marker for one poll iteration.
pub async fn observe(descriptor_path: &Path, config: &AttachConfig) -> EnvironmentDescriptor {
    let exists_at_poll_start = file_exists(descriptor_path).await;
    let backup_exists = backup_marker_exists(descriptor_path, &config.backup_suffix).await;

    EnvironmentDescriptor {
        path: descriptor_path.to_path_buf(),
        exists_at_poll_start,
        backup_exists,
    }
}

fn servers_root(project_root: &Path, kind: ProjectKind) -> PathBuf {
    match kind {
        ProjectKind::Maven => project_root.join("target/liberty/wlp/usr/servers"),
        ProjectKind::Gradle => project_root.join("build/wlp/usr/servers"),
    }
}

/// Finds the server directory in the conventional dev-mode install layout. Returns
/// `None` when there is no server directory or more than one candidate.
pub async fn discover_server_dir(project_root: &Path, kind: ProjectKind) -> Option<PathBuf> {
    let root = servers_root(project_root, kind);
    let mut entries = match tokio::fs::read_dir(&root).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("No server install under {}: {}", root.display(), e);
            return None;
        }
    };

    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            candidates.push(entry.path());
        }
    }

    if candidates.len() == 1 {
        candidates.pop()
    } else {
        if candidates.len() > 1 {
            tracing::debug!(
                "Found {} server directories under {}; cannot pick one",
                candidates.len(),
                root.display()
            );
        }
        None
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_path_requires_hint() {
        let config = AttachConfig::default();
        assert_eq!(descriptor_path("", &config), None);
        assert_eq!(descriptor_path("   ", &config), None);
        assert_eq!(
            descriptor_path("/srv/defaultServer", &config),
            Some(PathBuf::from("/srv/defaultServer/server.env"))
        );
    }

    #[test]
    fn test_backup_marker_path_appends_suffix() {
        let path = backup_marker_path(Path::new("/srv/s/server.env"), ".bak");
        assert_eq!(path, PathBuf::from("/srv/s/server.env.bak"));
    }

    #[tokio::test]
    async fn test_locate_absent_until_written() {
        let dir = tempfile::tempdir().unwrap();
        let hint = dir.path().to_str().unwrap();
        let config = AttachConfig::default();

        assert_eq!(locate(hint, &config).await, None);

        std::fs::write(dir.path().join("server.env"), "WLP_DEBUG_ADDRESS=7777\n").unwrap();
        assert_eq!(locate(hint, &config).await, Some(dir.path().join("server.env")));
    }

    #[tokio::test]
    async fn test_observe_reports_backup_marker() {
        let dir = tempfile::tempdir().unwrap();
        let config = AttachConfig::default();
        let descriptor = dir.path().join("server.env");

        let seen = observe(&descriptor, &config).await;
        assert!(!seen.exists_at_poll_start);
        assert!(!seen.backup_exists);

        std::fs::write(&descriptor, "").unwrap();
        std::fs::write(dir.path().join("server.env.bak"), "").unwrap();

        let seen = observe(&descriptor, &config).await;
        assert!(seen.exists_at_poll_start);
        assert!(seen.backup_exists);
        assert_eq!(seen.path, descriptor);
    }

    #[tokio::test]
    async fn test_discover_single_maven_server() {
        let dir = tempfile::tempdir().unwrap();
        let server = dir.path().join("target/liberty/wlp/usr/servers/defaultServer");
        std::fs::create_dir_all(&server).unwrap();

        assert_eq!(
            discover_server_dir(dir.path(), ProjectKind::Maven).await,
            Some(server)
        );
        assert_eq!(discover_server_dir(dir.path(), ProjectKind::Gradle).await, None);
    }

    #[tokio::test]
    async fn test_discover_ambiguous_servers() {
        let dir = tempfile::tempdir().unwrap();
        let servers = dir.path().join("build/wlp/usr/servers");
        std::fs::create_dir_all(servers.join("one")).unwrap();
        std::fs::create_dir_all(servers.join("two")).unwrap();
        std::fs::write(servers.join("notes.txt"), "").unwrap();

        assert_eq!(discover_server_dir(dir.path(), ProjectKind::Gradle).await, None);
    }
}
