//! Architectural Enforcement Integration Tests
//!
//! Source scans that keep the streaming core honest:
//! - Blocking sleeps only where a read is simulated, async sleeps only for restart backoff
//! - No blocking file or network I/O on the async path
//!
//! The helpers here are shared by the test files under `tests/`.

use std::fs;
use std::path::{Path, PathBuf};

/// Source directory of `streamer-core`
#[must_use]
pub fn core_src_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../streamer/core/src")
}

/// Every `.rs` file under `dir`, sorted for stable reports
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("rs"))
        .collect();
    files.sort();
    files
}

/// Path of `file` relative to `root`, with forward slashes
#[must_use]
pub fn relative(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// One line of production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    /// 1-based line number
    pub number: usize,
    /// Line text with any `//` comment removed
    pub code: String,
}

/// Production lines of a source file: everything before the first
/// `#[cfg(test)]`, with comments stripped and blank results dropped
#[must_use]
pub fn production_lines(content: &str) -> Vec<CodeLine> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .filter_map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line).trim_end();
            if code.trim().is_empty() {
                None
            } else {
                Some(CodeLine {
                    number: idx + 1,
                    code: code.to_string(),
                })
            }
        })
        .collect()
}

/// A forbidden pattern found in production code
#[derive(Debug, Clone)]
pub struct Violation {
    /// File relative to the scanned root
    pub file: String,
    /// 1-based line number
    pub line: usize,
    /// What rule was broken
    pub rule: &'static str,
    /// Offending code
    pub code: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}: {}", self.file, self.line, self.rule, self.code.trim())
    }
}

/// A pattern that is only allowed in some files
pub struct Rule {
    /// Short description used in reports
    pub name: &'static str,
    /// Substrings that trigger the rule
    pub patterns: &'static [&'static str],
    /// Files (relative, forward slashes) where the patterns are allowed
    pub allowed_in: &'static [&'static str],
}

/// Scan every production line under `root` against `rules`
///
/// # Panics
///
/// Panics if `root` does not exist, so a moved crate cannot pass silently.
#[must_use]
pub fn scan(root: &Path, rules: &[Rule]) -> Vec<Violation> {
    assert!(root.is_dir(), "{} is not a directory", root.display());

    let mut violations = Vec::new();
    for file in rust_files(root) {
        let Ok(content) = fs::read_to_string(&file) else {
            continue;
        };
        let name = relative(root, &file);

        for line in production_lines(&content) {
            for rule in rules {
                if rule.allowed_in.contains(&name.as_str()) {
                    continue;
                }
                if rule.patterns.iter().any(|p| line.code.contains(p)) {
                    violations.push(Violation {
                        file: name.clone(),
                        line: line.number,
                        rule: rule.name,
                        code: line.code.clone(),
                    });
                }
            }
        }
    }
    violations
}

/// Print `violations` and panic if there are any
///
/// # Panics
///
/// Panics when `violations` is not empty.
pub fn report(title: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let content = "fn a() {}\n// std::thread::sleep\nlet x = 1; // sleep\n#[cfg(test)]\nfn b() {}\n";
        let lines = production_lines(content);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].number, 1);
        assert_eq!(lines[1].code, "let x = 1;");
    }

    #[test]
    fn test_relative_uses_forward_slashes() {
        let root = Path::new("/src");
        assert_eq!(relative(root, &root.join("pool").join("mod.rs")), "pool/mod.rs");
    }
}
