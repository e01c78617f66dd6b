use crate::app::models::{ConfigurationDescriptor, PlanEntry, TransformRule};
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use pathdiff::diff_paths;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Compiled form of one transform rule's `test`/`exclude` pair.
struct RuleMatcher {
    test: Regex,
    exclude: Option<Regex>,
}

impl RuleMatcher {
    fn compile(idx: usize, rule: &TransformRule) -> Result<Self> {
        let test = Regex::new(rule.test.as_str()).context(format!(
            "Rule #{}: invalid test pattern: {}",
            idx,
            rule.test.as_str()
        ))?;
        let exclude = rule
            .exclude
            .as_ref()
            .map(|p| {
                Regex::new(p.as_str())
                    .context(format!("Rule #{}: invalid exclude pattern: {}", idx, p.as_str()))
            })
            .transpose()?;
        Ok(Self { test, exclude })
    }

    fn applies_to(&self, subject: &str) -> bool {
        self.test.is_match(subject) && !self.exclude.as_ref().is_some_and(|e| e.is_match(subject))
    }
}

pub struct Scanner {
    root: PathBuf,
    matchers: Vec<RuleMatcher>,
}

impl Scanner {
    pub fn new(root: PathBuf, descriptor: &ConfigurationDescriptor) -> Result<Self> {
        let matchers = descriptor
            .rules()
            .iter()
            .enumerate()
            .map(|(idx, rule)| RuleMatcher::compile(idx, rule))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { root, matchers })
    }

    /// Index of the first rule that would transform `path`. Earlier rules win
    /// when several match. Relative paths are taken relative to the root.
    pub fn rule_for(&self, path: &Path) -> Option<usize> {
        let relative = if path.is_absolute() {
            diff_paths(path, &self.root)?
        } else {
            path.to_path_buf()
        };
        self.first_match(&to_subject(&relative))
    }

    fn first_match(&self, subject: &str) -> Option<usize> {
        self.matchers.iter().position(|m| m.applies_to(subject))
    }

    /// Walks the project and pairs every file with the rule it would go
    /// through. Directories are kept only when they lead to a listed file.
    pub fn scan(&self, include_unmatched: bool) -> Vec<PlanEntry> {
        let mut entries = Vec::new();

        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .build();

        for result in walker {
            match result {
                Ok(entry) => {
                    let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                    if let Some(processed) =
                        self.process_entry(entry.path(), is_dir, include_unmatched)
                    {
                        entries.push(processed);
                    }
                }
                Err(err) => log::warn!("Error walking entry: {}", err),
            }
        }

        let needed_dirs: HashSet<PathBuf> = entries
            .iter()
            .filter(|e| !e.is_dir)
            .flat_map(|e| e.path.ancestors().skip(1).map(Path::to_path_buf))
            .collect();
        entries.retain(|e| !e.is_dir || needed_dirs.contains(&e.path));

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    fn process_entry(
        &self,
        path: &Path,
        is_dir: bool,
        include_unmatched: bool,
    ) -> Option<PlanEntry> {
        if path == self.root {
            return None;
        }

        // Hidden files are walked, so the repository metadata must be skipped by hand.
        if path.components().any(|c| c.as_os_str() == ".git") {
            return None;
        }

        let relative = diff_paths(path, &self.root)?;
        let rule = if is_dir {
            None
        } else {
            self.first_match(&to_subject(&relative))
        };

        if !is_dir && rule.is_none() && !include_unmatched {
            return None;
        }

        Some(PlanEntry {
            path: path.to_path_buf(),
            relative_path: to_subject(&relative),
            depth: relative.components().count(),
            is_dir,
            rule,
        })
    }
}

fn to_subject(relative: &Path) -> String {
    relative.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::default_rules;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for file in [
            "src/index.jsx",
            "src/util/math.js",
            "src/style.css",
            "node_modules/react/index.js",
            "bower_components/jquery/jquery.js",
            "README.md",
        ] {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "// fixture\n").unwrap();
        }
        dir
    }

    fn descriptor(rules: Vec<TransformRule>) -> ConfigurationDescriptor {
        ConfigurationDescriptor::construct("src/index.jsx", "public", "bundle.js", rules).unwrap()
    }

    fn listed_files(entries: &[PlanEntry]) -> Vec<&str> {
        entries
            .iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.relative_path.as_str())
            .collect()
    }

    #[test]
    fn plan_routes_sources_and_skips_excluded_dirs() {
        let dir = project();
        let scanner = Scanner::new(dir.path().to_path_buf(), &descriptor(default_rules())).unwrap();
        let entries = scanner.scan(false);

        assert_eq!(listed_files(&entries), ["src/index.jsx", "src/util/math.js"]);
        assert!(entries.iter().filter(|e| !e.is_dir).all(|e| e.rule == Some(0)));

        let dirs: Vec<&str> = entries
            .iter()
            .filter(|e| e.is_dir)
            .map(|e| e.relative_path.as_str())
            .collect();
        assert_eq!(dirs, ["src", "src/util"]);
    }

    #[test]
    fn plan_can_list_unmatched_files() {
        let dir = project();
        let scanner = Scanner::new(dir.path().to_path_buf(), &descriptor(default_rules())).unwrap();
        let entries = scanner.scan(true);

        let readme = entries
            .iter()
            .find(|e| e.relative_path == "README.md")
            .unwrap();
        assert_eq!(readme.rule, None);
        let vendored = entries
            .iter()
            .find(|e| e.relative_path == "node_modules/react/index.js")
            .unwrap();
        assert_eq!(vendored.rule, None);
    }

    #[test]
    fn directory_flag_is_taken_from_the_walker() {
        // Nothing exists under /project, so any metadata lookup would say "not a directory".
        let scanner =
            Scanner::new(PathBuf::from("/project"), &descriptor(default_rules())).unwrap();

        let dir = scanner
            .process_entry(Path::new("/project/src.js"), true, false)
            .unwrap();
        assert!(dir.is_dir);
        assert_eq!(dir.rule, None);

        let file = scanner
            .process_entry(Path::new("/project/src/app.js"), false, false)
            .unwrap();
        assert!(!file.is_dir);
        assert_eq!(file.rule, Some(0));
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = vec![
            TransformRule::new(r"\.css$", None, "css-loader", Vec::<String>::new()),
            TransformRule::new(r"util/", None, "util-loader", Vec::<String>::new()),
            TransformRule::new(r"\.jsx?$", Some("node_modules"), "babel-loader", ["env"]),
        ];
        let scanner = Scanner::new(PathBuf::from("/project"), &descriptor(rules)).unwrap();

        assert_eq!(scanner.rule_for(Path::new("src/style.css")), Some(0));
        assert_eq!(scanner.rule_for(Path::new("src/util/math.js")), Some(1));
        assert_eq!(scanner.rule_for(Path::new("src/index.jsx")), Some(2));
        assert_eq!(scanner.rule_for(Path::new("node_modules/x/index.js")), None);
    }

    #[test]
    fn absolute_paths_are_made_relative_to_root() {
        let scanner =
            Scanner::new(PathBuf::from("/project"), &descriptor(default_rules())).unwrap();
        assert_eq!(scanner.rule_for(Path::new("/project/src/app.js")), Some(0));
        assert_eq!(scanner.rule_for(Path::new("/project/src/app.ts")), None);
    }

    #[test]
    fn no_rules_means_nothing_is_transformed() {
        let dir = project();
        let scanner = Scanner::new(dir.path().to_path_buf(), &descriptor(Vec::new())).unwrap();
        assert!(scanner.scan(false).is_empty());
    }

    #[test]
    fn invalid_pattern_is_reported_with_its_source() {
        let rules = vec![TransformRule::new("(unclosed", None, "babel-loader", ["env"])];
        let err = Scanner::new(PathBuf::from("/project"), &descriptor(rules))
            .err()
            .unwrap();
        assert!(err.to_string().contains("(unclosed"));
    }
}
