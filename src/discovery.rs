//! Tool discovery
//!
//! Resolves an ordered list of tool directories into [`ToolDescriptor`]s:
//! - Each directory is listed non-recursively, one tool per entry
//! - User-supplied directories come first, the default directory last
//! - An unreadable directory never aborts discovery

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{DevError, ErrorClass, Result};

/// Module base name that takes its tool name from the enclosing directory
pub const INDEX_BASE_NAME: &str = "index";

/// A discovered tool module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    /// Directory the tool was found in
    pub source_dir: PathBuf,
    /// File stem of the directory entry
    pub module_base_name: String,
}

impl ToolDescriptor {
    pub fn new(source_dir: impl Into<PathBuf>, module_base_name: impl Into<String>) -> Self {
        Self {
            source_dir: source_dir.into(),
            module_base_name: module_base_name.into(),
        }
    }

    /// Name the tool is bundled and exposed under.
    ///
    /// `index` modules are named after their directory, everything else
    /// after its own base name.
    pub fn logical_name(&self) -> String {
        if self.module_base_name == INDEX_BASE_NAME {
            self.source_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.module_base_name.clone())
        } else {
            self.module_base_name.clone()
        }
    }

    /// Bundle output path for this tool under `tools_out_dir`
    pub fn output_path(&self, tools_out_dir: &Path, extension: &str) -> PathBuf {
        tools_out_dir.join(format!("{}.{}", self.logical_name(), extension))
    }
}

/// A directory that could not be listed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryWarning {
    pub dir: PathBuf,
    pub message: String,
}

impl DiscoveryWarning {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Soft
    }
}

/// Result of one discovery pass
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Tools in discovery order
    pub tools: Vec<ToolDescriptor>,
    /// One entry per unreadable user-supplied directory
    pub warnings: Vec<DiscoveryWarning>,
}

impl DiscoveryReport {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Scans tool directories
#[derive(Debug, Clone)]
pub struct ToolDiscovery {
    extra_dirs: Vec<PathBuf>,
    default_dir: PathBuf,
}

impl ToolDiscovery {
    /// Create a discovery over just the default directory
    pub fn new(default_dir: impl Into<PathBuf>) -> Self {
        Self {
            extra_dirs: Vec::new(),
            default_dir: default_dir.into(),
        }
    }

    /// Add user-supplied directories, scanned before the default one
    pub fn with_extra_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.extra_dirs.extend(dirs);
        self
    }

    /// All directories in scan order
    pub fn directories(&self) -> Vec<&Path> {
        self.extra_dirs
            .iter()
            .map(PathBuf::as_path)
            .chain(std::iter::once(self.default_dir.as_path()))
            .collect()
    }

    /// Run one discovery pass.
    ///
    /// A missing default directory is silently treated as empty. A missing
    /// user-supplied directory produces a warning and is treated as empty.
    pub async fn discover(&self) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        let default_index = self.extra_dirs.len();
        for (index, dir) in self.directories().into_iter().enumerate() {
            let is_default = index == default_index;
            match list_entries(dir).await {
                Ok(names) => {
                    debug!("Found {} tool entries in {}", names.len(), dir.display());
                    report
                        .tools
                        .extend(names.into_iter().map(|name| ToolDescriptor::new(dir, name)));
                }
                Err(e) if is_default => {
                    debug!("Default tools directory {} not readable: {}", dir.display(), e);
                }
                Err(e) => {
                    warn!("Error reading tools directory {}: {}", dir.display(), e);
                    report.warnings.push(DiscoveryWarning {
                        dir: dir.to_path_buf(),
                        message: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

/// List entry stems of `dir`, sorted by file name, hidden entries skipped
async fn list_entries(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut file_names = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }
        file_names.push(PathBuf::from(file_name));
    }
    file_names.sort();

    Ok(file_names
        .iter()
        .filter_map(|f| f.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .collect())
}

/// Split a comma-separated directory list, resolving each entry against `base`
pub fn parse_tools_dirs(list: &str, base: &Path) -> Vec<PathBuf> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| base.join(s))
        .collect()
}

/// `TOOLS_PATH` value: comma-joined output paths, or `None` without tools
pub fn tools_path_env(tools: &[ToolDescriptor], tools_out_dir: &Path, extension: &str) -> Option<String> {
    if tools.is_empty() {
        return None;
    }
    let paths: Vec<String> = tools
        .iter()
        .map(|t| t.output_path(tools_out_dir, extension).display().to_string())
        .collect();
    Some(paths.join(","))
}

/// Reject tool sets where two descriptors would write the same bundle
pub fn check_unique_names(tools: &[ToolDescriptor]) -> Result<()> {
    let mut seen: HashMap<String, &Path> = HashMap::new();
    for tool in tools {
        let name = tool.logical_name();
        if let Some(first) = seen.get(&name) {
            return Err(DevError::DuplicateTool {
                name,
                first: first.to_path_buf(),
                second: tool.source_dir.clone(),
            });
        }
        seen.insert(name, &tool.source_dir);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tool_dir(root: &Path, name: &str, files: &[&str]) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for file in files {
            std::fs::write(dir.join(file), "export default {}").unwrap();
        }
        dir
    }

    #[test]
    fn test_logical_name_from_base_name() {
        let tool = ToolDescriptor::new("/src/tools", "weather");
        assert_eq!(tool.logical_name(), "weather");
    }

    #[test]
    fn test_logical_name_index_uses_directory() {
        let tool = ToolDescriptor::new("/src/search", "index");
        assert_eq!(tool.logical_name(), "search");
    }

    #[test]
    fn test_output_path() {
        let tool = ToolDescriptor::new("/src/tools", "weather");
        assert_eq!(
            tool.output_path(Path::new("/work/tools"), "mjs"),
            PathBuf::from("/work/tools/weather.mjs")
        );
    }

    #[tokio::test]
    async fn test_discover_preserves_directory_order() {
        let temp = TempDir::new().unwrap();
        let a = tool_dir(temp.path(), "alpha", &["foo.ts", "index.ts"]);
        let b = tool_dir(temp.path(), "beta", &["foo.ts", "index.ts"]);

        let discovery = ToolDiscovery::new(temp.path().join("missing")).with_extra_dirs(vec![a.clone(), b.clone()]);
        let report = discovery.discover().await;

        let names: Vec<String> = report.tools.iter().map(|t| t.logical_name()).collect();
        assert_eq!(names, vec!["foo", "alpha", "foo", "beta"]);
        assert_eq!(report.tools[0].source_dir, a);
        assert_eq!(report.tools[2].source_dir, b);
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_default_dir_is_silent() {
        let temp = TempDir::new().unwrap();
        let discovery = ToolDiscovery::new(temp.path().join("tools"));
        let report = discovery.discover().await;

        assert!(report.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_extra_dir_warns_and_continues() {
        let temp = TempDir::new().unwrap();
        let good = tool_dir(temp.path(), "good", &["calc.ts"]);
        let default = tool_dir(temp.path(), "tools", &["weather.ts"]);

        let discovery = ToolDiscovery::new(default).with_extra_dirs(vec![temp.path().join("nope"), good]);
        let report = discovery.discover().await;

        let names: Vec<String> = report.tools.iter().map(|t| t.logical_name()).collect();
        assert_eq!(names, vec!["calc", "weather"]);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].dir, temp.path().join("nope"));
        assert_eq!(report.warnings[0].class(), ErrorClass::Soft);
    }

    #[tokio::test]
    async fn test_discover_skips_hidden_entries() {
        let temp = TempDir::new().unwrap();
        let default = tool_dir(temp.path(), "tools", &[".DS_Store", "weather.ts"]);
        let report = ToolDiscovery::new(default).discover().await;

        assert_eq!(report.tools.len(), 1);
        assert_eq!(report.tools[0].module_base_name, "weather");
    }

    #[tokio::test]
    async fn test_discover_keeps_duplicates() {
        let temp = TempDir::new().unwrap();
        let a = tool_dir(temp.path(), "a", &["weather.ts"]);
        let b = tool_dir(temp.path(), "b", &["weather.ts"]);
        let report = ToolDiscovery::new(b).with_extra_dirs(vec![a]).discover().await;

        assert_eq!(report.tools.len(), 2);
        assert!(check_unique_names(&report.tools).is_err());
    }

    #[test]
    fn test_directories_default_last() {
        let discovery = ToolDiscovery::new("/src/tools").with_extra_dirs(vec![PathBuf::from("/x"), PathBuf::from("/y")]);
        assert_eq!(
            discovery.directories(),
            vec![Path::new("/x"), Path::new("/y"), Path::new("/src/tools")]
        );
    }

    #[test]
    fn test_parse_tools_dirs() {
        let dirs = parse_tools_dirs("lib/tools, extra ,,", Path::new("/project"));
        assert_eq!(dirs, vec![PathBuf::from("/project/lib/tools"), PathBuf::from("/project/extra")]);
    }

    #[test]
    fn test_tools_path_env_absent_without_tools() {
        assert_eq!(tools_path_env(&[], Path::new("/work/tools"), "mjs"), None);
    }

    #[test]
    fn test_tools_path_env_joins_in_order() {
        let tools = vec![
            ToolDescriptor::new("/src/tools", "weather"),
            ToolDescriptor::new("/src/search", "index"),
            ToolDescriptor::new("/src/tools", "calc"),
        ];
        let env = tools_path_env(&tools, Path::new("/work/tools"), "mjs");
        assert_eq!(
            env.as_deref(),
            Some("/work/tools/weather.mjs,/work/tools/search.mjs,/work/tools/calc.mjs")
        );
    }

    #[test]
    fn test_check_unique_names_ok() {
        let tools = vec![ToolDescriptor::new("/a", "x"), ToolDescriptor::new("/a", "y")];
        assert!(check_unique_names(&tools).is_ok());
    }

    #[test]
    fn test_check_unique_names_index_collision() {
        let tools = vec![
            ToolDescriptor::new("/a", "search"),
            ToolDescriptor::new("/b/search", "index"),
        ];
        let err = check_unique_names(&tools).unwrap_err();
        assert!(matches!(err, DevError::DuplicateTool { ref name, .. } if name == "search"));
    }
}
