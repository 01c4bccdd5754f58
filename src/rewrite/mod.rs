//! Source instrumentation engine.
//!
//! Transforms one Rust file at a time into a functionally equivalent file
//! in which every safely instrumentable function can be redirected at run
//! time:
//!
//! - `collect`: find and classify top-level functions and inherent methods
//! - `codegen`: synthesize the guard statements, flag statics and the
//!   per-file registration hook, spliced in as byte-offset text edits
//!
//! Files the engine cannot handle (parse errors, internal failures) produce
//! a per-file [`RewriteError`]; the tree-level caller logs it and falls
//! back to copying the file unchanged.

mod codegen;
mod collect;

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use ra_ap_syntax::{Edition, SourceFile};
use thiserror::Error;

pub use codegen::FLAG_PREFIX;
pub use collect::{collect_targets, Collected, FnTarget, SkipReason};

/// Module path fragments that are never instrumented: everything the
/// registry itself transitively leans on, so instrumented code never calls
/// into a registry that is itself being instrumented.
pub const EXCLUDED_MODULES: &[&str] = &[
    "softmock",
    "linkme",
    "core",
    "alloc",
    "std/src/sync",
    "std/src/any",
    "std/src/collections",
    "std/src/panic",
];

/// Per-file transformation failure.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The file does not parse; nothing was rewritten.
    #[error("parse failed: {0}")]
    Parse(String),
    /// An internal invariant broke mid-transformation; the caller falls
    /// back to the original bytes.
    #[error("instrumentation failed: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Is `path` inside one of the excluded module trees under `root`?
pub fn is_excluded(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    EXCLUDED_MODULES
        .iter()
        .any(|module| relative.starts_with(module))
}

/// Instrument one source string.
///
/// `path` only feeds deterministic flag naming and diagnostics. Returns the
/// rewritten text, or the input unchanged when the file carries no
/// instrumentable declarations or is already instrumented. All bytes
/// outside the splice points are preserved exactly.
pub fn rewrite_source(path: &Path, source: &str) -> Result<String, RewriteError> {
    if source.contains(FLAG_PREFIX) {
        // A previous run already rewrote this file; a second pass would
        // instrument the instrumentation.
        return Ok(source.to_owned());
    }

    let parse = SourceFile::parse(source, Edition::Edition2021);
    let errors = parse.errors();
    if let Some(first) = errors.first() {
        return Err(RewriteError::Parse(format!("{first:?}")));
    }
    let tree = parse.tree();

    panic::catch_unwind(AssertUnwindSafe(|| transform(path, source, &tree)))
        .map_err(|payload| RewriteError::Internal(panic_message(payload.as_ref())))
}

/// Transform one file on disk, as the tree sync sees it.
///
/// Non-Rust files and excluded modules come back byte-identical.
pub fn rewrite_file(root: &Path, path: &Path) -> Result<Vec<u8>, RewriteError> {
    let is_rust = path.extension().is_some_and(|ext| ext == "rs");
    if !is_rust || is_excluded(root, path) {
        return Ok(fs::read(path)?);
    }
    let source = fs::read_to_string(path)?;
    Ok(rewrite_source(path, &source)?.into_bytes())
}

fn transform(path: &Path, source: &str, tree: &SourceFile) -> String {
    let collected = collect_targets(source, tree);
    for (name, reason) in &collected.skipped {
        tracing::debug!(file = %path.display(), function = %name, ?reason, "left uninstrumented");
    }
    if collected.targets.is_empty() {
        return source.to_owned();
    }

    let flagged: Vec<(FnTarget, String)> = collected
        .targets
        .into_iter()
        .map(|target| {
            let flag = codegen::flag_name(path, target.body_range);
            (target, flag)
        })
        .collect();

    let mut edits: Vec<codegen::Edit> = flagged
        .iter()
        .map(|(target, flag)| codegen::Edit {
            at: target.body_insert_at.into(),
            text: codegen::guard_stmt(target, flag),
        })
        .collect();
    edits.push(codegen::Edit {
        at: source.len(),
        text: codegen::bootstrap_block(path, &flagged),
    });

    codegen::apply_edits(source, edits)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excluded_module_prefixes() {
        let root = Path::new("/tree");
        assert!(is_excluded(root, Path::new("/tree/core/src/option.rs")));
        assert!(is_excluded(root, Path::new("/tree/std/src/sync/mutex.rs")));
        assert!(is_excluded(root, Path::new("/tree/softmock/src/lib.rs")));
        assert!(!is_excluded(root, Path::new("/tree/std/src/io/mod.rs")));
        assert!(!is_excluded(root, Path::new("/elsewhere/core/lib.rs")));
    }

    #[test]
    fn test_parse_failure_is_per_file_error() {
        let result = rewrite_source(Path::new("bad.rs"), "fn broken( {");
        assert!(matches!(result, Err(RewriteError::Parse(_))));
    }

    #[test]
    fn test_file_without_targets_is_unchanged() {
        let source = "struct Marker;\n\nconst LIMIT: usize = 8;\n";
        let rewritten = rewrite_source(Path::new("plain.rs"), source).unwrap();
        assert_eq!(rewritten, source);
    }
}
