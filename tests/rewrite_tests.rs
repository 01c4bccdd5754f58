//! Integration tests for the instrumentation engine.
//!
//! Each test feeds a small source file through `rewrite_source` and checks
//! the shape of the rewritten text: guard first, bootstrap last, everything
//! else byte-identical.

use softmock::rewrite::{rewrite_source, RewriteError};
use std::path::{Path, PathBuf};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test-fixtures")
}

fn rewrite(source: &str) -> String {
    rewrite_source(Path::new("src/subject.rs"), source).expect("rewrite should succeed")
}

#[test]
fn test_guard_is_first_statement_of_body() {
    let source = "fn scale(x: i32, factor: i32) -> i32 {\n    x * factor\n}\n";
    let rewritten = rewrite(source);

    let guard_at = rewritten.find("if SOFT_FLAG_").expect("guard expected");
    let body_at = rewritten.find("x * factor").expect("body expected");
    assert!(
        guard_at < body_at,
        "guard must run before the original body:\n{rewritten}"
    );
    assert!(rewritten.contains("softmock::runtime::mock_for(scale as fn(i32, i32) -> i32)"));
    assert!(rewritten.contains("return soft_mock(x, factor);"));
}

#[test]
fn test_resultless_function_still_returns() {
    let source = "fn notify(message: &str) {\n    let _ = message;\n}\n";
    let rewritten = rewrite(source);

    assert!(rewritten.contains("mock_for(notify as fn(&str))"));
    assert!(rewritten.contains("return soft_mock(message);"));
}

#[test]
fn test_method_forwards_receiver_first() {
    let source = "\
struct File {
    name: String,
}

impl File {
    fn close(&self) -> Result<(), String> {
        let _ = &self.name;
        Ok(())
    }
}
";
    let rewritten = rewrite(source);

    assert!(rewritten.contains("mock_for(<File>::close as fn(&File) -> Result<(), String>)"));
    assert!(rewritten.contains("return soft_mock(self);"));
    assert!(rewritten
        .contains("softmock::runtime::register(<File>::close as fn(&File) -> Result<(), String>"));
}

#[test]
fn test_bootstrap_registers_each_target_once() {
    let source = "\
fn first() {}

fn second(x: u8) -> u8 {
    x
}
";
    // `first` has an empty body but still gets instrumented; only the
    // bootstrap and flags prove both were accepted.
    let rewritten = rewrite(source);

    assert_eq!(rewritten.matches("softmock::runtime::register(").count(), 2);
    assert_eq!(rewritten.matches("linkme::distributed_slice").count(), 1);
    assert_eq!(
        rewritten.matches("static SOFT_FLAG_").count(),
        2,
        "one flag static per declaration:\n{rewritten}"
    );
}

#[test]
fn test_unsupported_declarations_left_untouched() {
    let source = "\
fn id<T>(value: T) -> T {
    value
}

async fn fetch(url: &str) -> String {
    url.to_owned()
}

fn pair((a, b): (i32, i32)) -> i32 {
    a + b
}
";
    let rewritten = rewrite(source);
    assert_eq!(rewritten, source, "nothing instrumentable, nothing changed");
}

#[test]
fn test_comments_and_formatting_preserved() {
    let source = "\
// File-level commentary that must survive.

/// Doc comment on the function.
fn answer() -> i32 {
    // the canonical value
    42
}
";
    let rewritten = rewrite(source);

    assert!(rewritten.contains("// File-level commentary that must survive."));
    assert!(rewritten.contains("/// Doc comment on the function."));
    assert!(rewritten.contains("    // the canonical value\n    42"));
}

#[test]
fn test_transform_is_deterministic() {
    let source = "fn stable() -> u64 {\n    7\n}\n";
    let first = rewrite(source);
    let second = rewrite(source);
    assert_eq!(first, second);
}

#[test]
fn test_second_pass_is_a_no_op() {
    let source = "fn stable() -> u64 {\n    7\n}\n";
    let once = rewrite(source);
    let twice = rewrite(&once);
    assert_eq!(once, twice, "an instrumented file must pass through unchanged");
}

#[test]
fn test_flag_names_depend_on_path() {
    let source = "fn stable() -> u64 {\n    7\n}\n";
    let here = rewrite_source(Path::new("a.rs"), source).unwrap();
    let there = rewrite_source(Path::new("b.rs"), source).unwrap();
    assert_ne!(here, there);
}

#[test]
fn test_parse_error_reported_per_file() {
    let result = rewrite_source(Path::new("broken.rs"), "fn broken( {\n");
    assert!(matches!(result, Err(RewriteError::Parse(_))));
}

#[test]
fn test_fixture_file_rewrites_cleanly() {
    let path = fixtures_dir().join("specs").join("fileops.rs");
    let source = std::fs::read_to_string(&path).expect("fileops.rs should exist");

    let rewritten = rewrite_source(&path, &source).expect("fixture should rewrite");

    // open/read_at/Handle::close are instrumentable; the generic helper and
    // the trait impl are not.
    assert_eq!(rewritten.matches("softmock::runtime::register(").count(), 3);
    assert!(rewritten.contains("mock_for(open as fn(&str) -> Result<Handle, String>)"));
    assert!(rewritten.contains("mock_for(<Handle>::close as fn(&mut Handle) -> bool)"));

    // The result is still parseable Rust.
    let reparse = ra_ap_syntax_smoke(&rewritten);
    assert!(reparse, "rewritten fixture must still parse:\n{rewritten}");
}

fn ra_ap_syntax_smoke(source: &str) -> bool {
    use ra_ap_syntax::{Edition, SourceFile};
    SourceFile::parse(source, Edition::Edition2021).errors().is_empty()
}
