//! Structural tests for architectural boundary enforcement.
//!
//! These tests scan source files to verify that the layer boundaries
//! (domain → application → infra/output → commands) hold.

use std::path::{Path, PathBuf};

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

fn src(parts: &[&str]) -> PathBuf {
    parts
        .iter()
        .fold(Path::new(env!("CARGO_MANIFEST_DIR")).join("src"), |p, part| {
            p.join(part)
        })
}

fn relative(file: &Path) -> String {
    file.strip_prefix(env!("CARGO_MANIFEST_DIR"))
        .unwrap_or(file)
        .display()
        .to_string()
        .replace('\\', "/")
}

/// Track brace depth and return whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    /// Process a line and return `true` if it's inside a `#[cfg(test)]` block.
    fn process_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.contains("#[cfg(test)]") || trimmed.contains("#[cfg(all(test") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Non-comment lines outside `#[cfg(test)]` blocks, with 1-based line numbers.
fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut tracker = CfgTestTracker::new();
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            let comment = trimmed.starts_with("//")
                || trimmed.starts_with("/*")
                || trimmed.starts_with('*');
            (!in_test && !comment).then(|| (i + 1, line.to_string()))
        })
        .collect()
}

/// Report every production line under `dir` containing one of `needles`.
fn find_in_dir(dir: &Path, needles: &[&str], skip: impl Fn(&str) -> bool) -> Vec<String> {
    let mut violations = Vec::new();
    for file in collect_rs_files(dir) {
        let rel = relative(&file);
        if skip(&rel) {
            continue;
        }
        for (lineno, line) in production_lines(&file) {
            for needle in needles {
                if line.contains(needle) {
                    violations.push(format!("{rel}:{lineno}: `{needle}`: {}", line.trim()));
                }
            }
        }
    }
    violations
}

// ── Layer boundaries ──────────────────────────────────────────────────────────

#[test]
fn domain_is_pure() {
    let violations = find_in_dir(
        &src(&["domain"]),
        &[
            "crate::infra",
            "crate::application",
            "crate::commands",
            "crate::output",
            "tokio::",
            "std::fs",
            "std::process",
            "std::net",
            "reqwest",
        ],
        |_| false,
    );
    assert!(
        violations.is_empty(),
        "domain/ must stay free of I/O and outer layers:\n{}",
        violations.join("\n")
    );
}

#[test]
fn application_depends_only_on_domain() {
    let violations = find_in_dir(
        &src(&["application"]),
        &["crate::infra", "crate::commands", "crate::output", "reqwest"],
        // Only compiled under cfg(test) via services/mod.rs.
        |rel| rel.ends_with("test_support.rs"),
    );
    assert!(
        violations.is_empty(),
        "application/ must not import infra/, commands/ or output/:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    let violations = find_in_dir(
        &src(&["infra"]),
        &["crate::commands", "crate::output"],
        |_| false,
    );
    assert!(
        violations.is_empty(),
        "infra/ must not import from commands/ or output/:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_print_macros_outside_tests() {
    let violations = find_in_dir(&src(&["infra"]), &["println!", "eprintln!"], |_| false);
    assert!(
        violations.is_empty(),
        "infra/ must not use println!/eprintln! outside #[cfg(test)]:\n{}",
        violations.join("\n")
    );
}

// ── Trait bounds over concrete types ──────────────────────────────────────────

#[test]
fn services_take_ports_not_adapters() {
    let violations = find_in_dir(
        &src(&["application", "services"]),
        &[
            "HttpPlatformClient",
            "SshShell",
            "TokioCommandRunner",
            "DialoguerPicker",
            "TerminalReporter",
            "YamlConfigStore",
        ],
        |rel| rel.ends_with("test_support.rs"),
    );
    assert!(
        violations.is_empty(),
        "services must take port traits, not infra adapters:\n{}",
        violations.join("\n")
    );
}

// ── Command handlers ──────────────────────────────────────────────────────────

#[test]
fn no_inline_json_branching_in_commands() {
    let violations = find_in_dir(
        &src(&["commands"]),
        &["json: bool", "if json", "if !json", "is_json()", "serde_json::"],
        |_| false,
    );
    assert!(
        violations.is_empty(),
        "Found inline JSON branching in commands/ — use app.renderer() instead:\n{}",
        violations.join("\n")
    );
}

#[test]
fn commands_never_prompt_directly() {
    let violations = find_in_dir(
        &src(&["commands"]),
        &["dialoguer::", "Select::new()", "io::stdin().lock()"],
        |_| false,
    );
    assert!(
        violations.is_empty(),
        "Prompts belong behind the MachinePicker port:\n{}",
        violations.join("\n")
    );
}

/// Each file in `commands/` must be ≤125 lines of non-test code.
#[test]
fn command_handlers_are_reasonably_sized() {
    let mut violations: Vec<String> = Vec::new();
    for file in collect_rs_files(&src(&["commands"])) {
        let count = production_lines(&file)
            .iter()
            .filter(|(_, line)| !line.trim().is_empty())
            .count();
        if count > 125 {
            violations.push(format!(
                "{}: {count} non-test lines (limit: 125)",
                relative(&file)
            ));
        }
    }
    assert!(
        violations.is_empty(),
        "Command handler files exceed 125-line limit — extract logic to application services:\n{}",
        violations.join("\n")
    );
}
