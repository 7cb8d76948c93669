use anyhow::{anyhow, Context};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const EXPORT_EXTENSIONS: &[&str] = &["csv", "txt"];

/// One uploaded export, consumed once by the batch.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub file_name: String,
    /// Full path or bundle entry name; enclosing folders can name the year.
    pub path: String,
    /// Read failures of single entries are kept so the batch can report them
    /// against the file instead of failing the whole request.
    pub content: Result<Vec<u8>, String>,
}

#[cfg(test)]
impl SourceFile {
    pub fn from_bytes(file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            path: file_name.to_string(),
            content: Ok(bytes),
        }
    }
}

pub fn read_file(path: &Path, file_name: Option<&str>) -> SourceFile {
    let file_name = file_name
        .map(|s| s.to_string())
        .or_else(|| path.file_name().map(|s| s.to_string_lossy().to_string()))
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    SourceFile {
        file_name,
        path: path.to_string_lossy().to_string(),
        content: std::fs::read(path).map_err(|e| e.to_string()),
    }
}

/// Every export file directly inside `folder`, in file-name order.
pub fn read_folder(folder: &Path) -> anyhow::Result<Vec<SourceFile>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    let entries = std::fs::read_dir(folder)
        .with_context(|| format!("failed to read folder {}", folder.to_string_lossy()))?;
    for ent in entries {
        let p = ent?.path();
        if !p.is_file() {
            continue;
        }
        let ext = p
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        if EXPORT_EXTENSIONS.contains(&ext.as_str()) {
            paths.push(p);
        }
    }
    paths.sort();
    Ok(paths.iter().map(|p| read_file(p, None)).collect())
}

/// Files of a zip bundle in archive order; directories and macOS resource
/// forks are skipped.
pub fn read_bundle(bundle_path: &Path) -> anyhow::Result<Vec<SourceFile>> {
    let file = File::open(bundle_path).with_context(|| {
        format!("failed to open bundle {}", bundle_path.to_string_lossy())
    })?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| anyhow!("not a zip bundle {}: {}", bundle_path.to_string_lossy(), e))?;

    let mut out = Vec::new();
    for i in 0..zip.len() {
        let mut entry = match zip.by_index(i) {
            Ok(e) => e,
            Err(e) => {
                out.push(SourceFile {
                    file_name: format!("entry #{}", i + 1),
                    path: format!("entry #{}", i + 1),
                    content: Err(e.to_string()),
                });
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        let path = entry.name().replace('\\', "/");
        if path.starts_with("__MACOSX/") {
            continue;
        }
        let file_name = path.rsplit('/').next().unwrap_or(&path).to_string();
        if file_name.starts_with('.') {
            continue;
        }
        let mut buf = Vec::new();
        let content = entry.read_to_end(&mut buf).map(|_| buf).map_err(|e| e.to_string());
        out.push(SourceFile {
            file_name,
            path,
            content,
        });
    }
    Ok(out)
}
