use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

const CHECKED_EXTENSIONS: &[&str] = &["rs", "md", "yaml", "toml"];

const EXCLUDED_DIRS: &[&str] = &["target", ".git", "examples"];

const EXCLUDED_FILES: &[&str] = &["Cargo.lock"];

/// Phrases that mark a test as silently skipping instead of failing.
const SKIP_PATTERNS: &[&str] = &["Skipping test", "skipping test", "Test skipped", "test skipped"];

type Violations = Vec<(PathBuf, usize, String)>;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");
    println!("cargo:rerun-if-changed=.git/packed-refs");

    let sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=QUOTA_WATCH_GIT_SHA={}", sha);

    let root = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()));
    let files = collect_files_to_check(&root);
    for file in &files {
        println!("cargo:rerun-if-changed={}", file.display());
    }

    let sources: Vec<(PathBuf, String)> = files
        .iter()
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("rs"))
        .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some("build.rs"))
        .filter_map(|p| {
            let content = std::fs::read_to_string(p).ok()?;
            Some((p.strip_prefix(&root).unwrap_or(p).to_path_buf(), content))
        })
        .collect();

    enforce_line_limits(&root, &files);
    enforce_no_dead_code_allows(&sources);
    enforce_test_hygiene(&sources);
}

fn enforce_line_limits(root: &Path, files: &[PathBuf]) {
    let violations: Violations = files
        .iter()
        .filter_map(|file| {
            let content = std::fs::read_to_string(file).ok()?;
            let lines = content.lines().filter(|l| !l.trim().is_empty()).count();
            (lines > MAX_LINES).then(|| {
                let rel = file.strip_prefix(root).unwrap_or(file).to_path_buf();
                (rel, lines, format!("exceeds by {}", lines - MAX_LINES))
            })
        })
        .collect();

    fail_on(
        &format!("FILE LINE LIMIT EXCEEDED (max {} non-empty lines)", MAX_LINES),
        &violations,
        &["Split these files into smaller modules."],
    );
}

fn enforce_no_dead_code_allows(sources: &[(PathBuf, String)]) {
    let mut violations = Violations::new();
    for (path, content) in sources {
        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                && trimmed.contains("dead_code")
            {
                violations.push((path.clone(), i + 1, trimmed.to_string()));
            }
        }
    }

    fail_on(
        "#[allow(dead_code)] IS NOT ALLOWED",
        &violations,
        &[
            "Delete unused code, or gate test-only code behind #[cfg(test)].",
            "Silencing the warning hides real issues.",
        ],
    );
}

/// A test function located by its `#[test]` / `#[tokio::test]` attribute.
struct TestFn<'a> {
    name: String,
    line: usize,
    serial: bool,
    body: Vec<&'a str>,
}

fn is_serial_attr(line: &str) -> bool {
    let attr = line.trim();
    attr == "#[serial]" || attr == "#[serial_test::serial]"
}

/// Finds every test function and its body by brace matching.
fn test_functions(content: &str) -> Vec<TestFn<'_>> {
    let lines: Vec<&str> = content.lines().collect();
    let mut tests = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim();
        if trimmed != "#[test]" && !trimmed.starts_with("#[tokio::test") {
            i += 1;
            continue;
        }

        let attr_line = i;
        // Attributes may sit on either side of the test attribute.
        let mut serial = attr_line > 0 && is_serial_attr(lines[attr_line - 1]);
        let mut j = i + 1;
        while j < lines.len() && !lines[j].contains("fn ") {
            serial |= is_serial_attr(lines[j]);
            j += 1;
        }
        if j >= lines.len() {
            break;
        }

        let name = lines[j]
            .split("fn ")
            .nth(1)
            .and_then(|rest| rest.split('(').next())
            .unwrap_or("")
            .trim()
            .to_string();

        let mut depth = 0i32;
        let mut opened = false;
        let mut body = Vec::new();
        let mut k = j;
        while k < lines.len() {
            body.push(lines[k]);
            for c in lines[k].chars() {
                match c {
                    '{' => {
                        depth += 1;
                        opened = true;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            if opened && depth <= 0 {
                break;
            }
            k += 1;
        }

        tests.push(TestFn {
            name,
            line: attr_line + 1,
            serial,
            body,
        });
        i = k + 1;
    }

    tests
}

/// Tests must fail rather than skip, and env mutation requires `#[serial]`.
fn enforce_test_hygiene(sources: &[(PathBuf, String)]) {
    let mut skips = Violations::new();
    let mut unserialized = Violations::new();

    for (path, content) in sources {
        for test in test_functions(content) {
            let skip = test.body.iter().find_map(|line| {
                SKIP_PATTERNS
                    .iter()
                    .find(|p| line.contains(**p))
                    .map(|p| format!("test `{}` contains skip pattern: {}", test.name, p))
            });
            if let Some(message) = skip {
                skips.push((path.clone(), test.line, message));
            }

            let mutates_env = test.body.iter().any(|line| {
                let trimmed = line.trim();
                !trimmed.starts_with("//")
                    && (trimmed.contains("env::set_var") || trimmed.contains("env::remove_var"))
            });
            if mutates_env && !test.serial {
                unserialized.push((
                    path.clone(),
                    test.line,
                    format!("test `{}` mutates env without #[serial]", test.name),
                ));
            }
        }
    }

    fail_on(
        "SILENT TEST SKIPS ARE NOT ALLOWED",
        &skips,
        &[
            "Tests must FAIL if they cannot run, not silently pass.",
            "Use fakes for sources, transports and clocks, or #[ignore] with a reason.",
        ],
    );
    fail_on(
        "ENV MUTATIONS REQUIRE #[serial]",
        &unserialized,
        &[
            "Environment variables are process-global; add `#[serial]` from serial_test",
            "to every test that calls std::env::set_var or std::env::remove_var.",
        ],
    );
}

fn fail_on(title: &str, violations: &Violations, advice: &[&str]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n========================================");
    eprintln!("{}", title);
    eprintln!("========================================");
    for (path, line, message) in violations {
        eprintln!("  {}:{}", path.display(), line);
        eprintln!("    {}", message);
    }
    eprintln!("========================================");
    for line in advice {
        eprintln!("{}", line);
    }
    eprintln!();
    panic!("Build failed: {} ({} occurrence(s))", title, violations.len());
}

fn collect_files_to_check(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if let Ok(output) = Command::new("git")
        .args(["ls-files"])
        .current_dir(root)
        .output()
    {
        if output.status.success() {
            if let Ok(stdout) = String::from_utf8(output.stdout) {
                files.extend(
                    stdout
                        .lines()
                        .map(|line| root.join(line))
                        .filter(|path| should_check_file(path, root)),
                );
                if !files.is_empty() {
                    return files;
                }
            }
        }
    }

    walk_directory(root, root, &mut files);
    files
}

fn walk_directory(dir: &Path, root: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let excluded = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| EXCLUDED_DIRS.contains(&name));
            if !excluded {
                walk_directory(&path, root, files);
            }
        } else if should_check_file(&path, root) {
            files.push(path);
        }
    }
}

fn should_check_file(path: &Path, root: &Path) -> bool {
    let checked_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| CHECKED_EXTENSIONS.contains(&ext));
    if !checked_ext {
        return false;
    }

    let Ok(rel_path) = path.strip_prefix(root) else {
        return true;
    };
    let rel = rel_path.to_string_lossy();
    if EXCLUDED_FILES.iter().any(|f| *f == rel) {
        return false;
    }
    !rel_path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
    })
}
