use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::common::DomainResult;
use crate::domains::routing::types::EngineDescriptor;

/// Directory of engine executables, re-read on every request so engines can be
/// added or removed without restarting.
#[derive(Debug, Clone)]
pub struct EngineRegistry {
    directory: PathBuf,
}

impl EngineRegistry {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Executable regular files in the directory, ordered by file name.
    /// A missing directory yields no engines.
    pub async fn discover(&self) -> DomainResult<Vec<EngineDescriptor>> {
        let mut dir = match tokio::fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(directory = %self.directory.display(), "Engine directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut found: Vec<(String, PathBuf)> = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            // follows symlinks so linked engines are picked up
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(m) => m,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !metadata.is_file() || !is_executable(&metadata) {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                continue;
            }
            found.push((file_name, path));
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));

        let names = display_names(found.iter().map(|(file_name, _)| file_name.as_str()));
        let engines: Vec<EngineDescriptor> = found
            .into_iter()
            .zip(names)
            .map(|((_, path), name)| EngineDescriptor { name, path })
            .collect();

        debug!(
            directory = %self.directory.display(),
            count = engines.len(),
            "Discovered engines"
        );
        Ok(engines)
    }
}

/// `a_star.exe` is shown as `a_star`.
fn display_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

/// Names in input order; files whose stems clash keep their full file name.
fn display_names<'a>(file_names: impl Iterator<Item = &'a str> + Clone) -> Vec<String> {
    let mut stems: HashMap<String, usize> = HashMap::new();
    for file_name in file_names.clone() {
        *stems.entry(display_name(file_name)).or_default() += 1;
    }
    file_names
        .map(|file_name| {
            let stem = display_name(file_name);
            if stems.get(&stem).copied().unwrap_or(0) > 1 {
                file_name.to_string()
            } else {
                stem
            }
        })
        .collect()
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_strips_extension() {
        assert_eq!(display_name("a_star.exe"), "a_star");
        assert_eq!(display_name("bfs"), "bfs");
    }

    #[test]
    fn clashing_stems_keep_full_file_names() {
        let names = display_names(["a", "a.py", "a.sh", "dijkstra.exe"].into_iter());
        assert_eq!(names, ["a", "a.py", "a.sh", "dijkstra"]);
    }

    #[tokio::test]
    async fn missing_directory_has_no_engines() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EngineRegistry::new(dir.path().join("nope"));
        assert!(registry.discover().await.unwrap().is_empty());
    }
}
