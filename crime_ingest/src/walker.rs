use crate::error::DiscoveryWarning;
use glob::{glob_with, MatchOptions, Pattern};
use regex::Regex;
use std::fs;
use std::iter;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// How source files are located under a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryStrategy {
    /// `root/YYYY-MM/YYYY-MM-{suffix}` for every suffix.
    StructuredPeriod { suffixes: Vec<String> },
    /// Any file below `root` whose name contains `needle`, ignoring case,
    /// optionally restricted to parent paths containing `path_filter`.
    PatternGlob {
        needle: String,
        path_filter: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// `YYYY-MM` folder the file was found in, for period discovery.
    pub period: Option<String>,
}

impl SourceFile {
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

pub type Discovered = Result<SourceFile, DiscoveryWarning>;

fn period_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{4}-[0-9]{2}$").expect("period pattern is valid"))
}

/// True for folder names of the exact form `YYYY-MM`.
pub fn is_period_folder(name: &str) -> bool {
    period_pattern().is_match(name)
}

pub struct FolderWalker {
    root: PathBuf,
    strategy: DiscoveryStrategy,
}

impl FolderWalker {
    pub fn new(root: impl Into<PathBuf>, strategy: DiscoveryStrategy) -> Self {
        Self {
            root: root.into(),
            strategy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily yields candidate files, with warnings inline for anything the
    /// naming convention expected but did not find.
    pub fn candidates(&self) -> Box<dyn Iterator<Item = Discovered> + '_> {
        if !self.root.is_dir() {
            return Box::new(iter::once(Err(DiscoveryWarning::MissingRoot(
                self.root.clone(),
            ))));
        }

        match &self.strategy {
            DiscoveryStrategy::StructuredPeriod { suffixes } => self.period_candidates(suffixes),
            DiscoveryStrategy::PatternGlob {
                needle,
                path_filter,
            } => self.glob_candidates(needle, path_filter.as_deref()),
        }
    }

    fn period_candidates<'a>(
        &'a self,
        suffixes: &'a [String],
    ) -> Box<dyn Iterator<Item = Discovered> + 'a> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Cannot list {}: {}", self.root.display(), e);
                return Box::new(iter::once(Err(DiscoveryWarning::MissingRoot(
                    self.root.clone(),
                ))));
            }
        };

        let mut folders: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        folders.sort();

        Box::new(folders.into_iter().flat_map(
            move |folder| -> Box<dyn Iterator<Item = Discovered> + 'a> {
                let name = folder
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();

                if !is_period_folder(&name) {
                    return Box::new(iter::once(Err(DiscoveryWarning::NonPeriodFolder(folder))));
                }

                Box::new(suffixes.iter().map(move |suffix| {
                    let path = folder.join(format!("{}-{}", name, suffix));
                    if path.is_file() {
                        Ok(SourceFile {
                            path,
                            period: Some(name.clone()),
                        })
                    } else {
                        Err(DiscoveryWarning::MissingFile(path))
                    }
                }))
            },
        ))
    }

    fn glob_candidates<'a>(
        &'a self,
        needle: &str,
        path_filter: Option<&str>,
    ) -> Box<dyn Iterator<Item = Discovered> + 'a> {
        let pattern = format!(
            "{}/**/*{}*",
            Pattern::escape(&self.root.to_string_lossy()),
            Pattern::escape(needle)
        );
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        let paths = match glob_with(&pattern, options) {
            Ok(paths) => paths,
            Err(e) => {
                log::warn!("Invalid discovery pattern {}: {}", pattern, e);
                return Box::new(iter::empty());
            }
        };

        let filter = path_filter.map(str::to_lowercase);
        Box::new(
            paths
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(e) => {
                        log::debug!("Skipping unreadable path during discovery: {}", e);
                        None
                    }
                })
                .filter(|path| path.is_file())
                .filter(move |path| match &filter {
                    Some(filter) => self.parent_matches(path, filter),
                    None => true,
                })
                .map(|path| Ok(SourceFile { path, period: None })),
        )
    }

    fn parent_matches(&self, path: &Path, filter: &str) -> bool {
        let parent = path.parent().unwrap_or(path);
        let relative = parent.strip_prefix(&self.root).unwrap_or(parent);
        relative.to_string_lossy().to_lowercase().contains(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "Month\n").unwrap();
    }

    fn suffixes() -> Vec<String> {
        vec![
            "city-of-london-street.csv".to_string(),
            "metropolitan-street.csv".to_string(),
        ]
    }

    #[test]
    fn test_period_folder_pattern() {
        assert!(is_period_folder("2021-07"));
        assert!(!is_period_folder("July-2021"));
        assert!(!is_period_folder("2021-7"));
        assert!(!is_period_folder("2021-07-01"));
        assert!(!is_period_folder("x2021-07"));
        assert!(!is_period_folder("２０２１-07"));
    }

    #[test]
    fn test_structured_period_discovery() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("2021-07/2021-07-city-of-london-street.csv"));
        touch(&root.join("2021-07/2021-07-metropolitan-street.csv"));
        touch(&root.join("2021-08/2021-08-metropolitan-street.csv"));
        touch(&root.join("July-2021/July-2021-metropolitan-street.csv"));
        touch(&root.join("2021-7/2021-7-metropolitan-street.csv"));

        let walker = FolderWalker::new(
            root,
            DiscoveryStrategy::StructuredPeriod {
                suffixes: suffixes(),
            },
        );
        let discovered: Vec<Discovered> = walker.candidates().collect();

        let found: Vec<&SourceFile> = discovered.iter().filter_map(|d| d.as_ref().ok()).collect();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].file_name(), "2021-07-city-of-london-street.csv");
        assert_eq!(found[0].period.as_deref(), Some("2021-07"));
        assert_eq!(found[2].file_name(), "2021-08-metropolitan-street.csv");

        let warnings: Vec<&DiscoveryWarning> =
            discovered.iter().filter_map(|d| d.as_ref().err()).collect();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.contains(&&DiscoveryWarning::NonPeriodFolder(root.join("July-2021"))));
        assert!(warnings.contains(&&DiscoveryWarning::NonPeriodFolder(root.join("2021-7"))));
        assert!(warnings.contains(&&DiscoveryWarning::MissingFile(
            root.join("2021-08/2021-08-city-of-london-street.csv")
        )));
    }

    #[test]
    fn test_missing_root_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nope");
        let walker = FolderWalker::new(
            &root,
            DiscoveryStrategy::StructuredPeriod {
                suffixes: suffixes(),
            },
        );

        let discovered: Vec<Discovered> = walker.candidates().collect();
        assert_eq!(discovered, vec![Err(DiscoveryWarning::MissingRoot(root))]);
    }

    #[test]
    fn test_pattern_glob_discovery() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("2011/2011LSOADemoData.csv"));
        touch(&root.join("nested/2016/2016_lsoademodata.csv"));
        touch(&root.join("nested/2016/readme.txt"));
        fs::create_dir_all(root.join("2019LSOADemoData.d")).unwrap();

        let walker = FolderWalker::new(
            root,
            DiscoveryStrategy::PatternGlob {
                needle: "LSOADemoData".to_string(),
                path_filter: None,
            },
        );
        let names: Vec<String> = walker
            .candidates()
            .filter_map(Result::ok)
            .map(|f| f.file_name().to_string())
            .collect();
        assert_eq!(names, vec!["2011LSOADemoData.csv", "2016_lsoademodata.csv"]);

        let filtered = FolderWalker::new(
            root,
            DiscoveryStrategy::PatternGlob {
                needle: "lsoademodata".to_string(),
                path_filter: Some("2016".to_string()),
            },
        );
        let names: Vec<String> = filtered
            .candidates()
            .filter_map(Result::ok)
            .map(|f| f.file_name().to_string())
            .collect();
        assert_eq!(names, vec!["2016_lsoademodata.csv"]);
    }
}
