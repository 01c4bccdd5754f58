//! Guard and bootstrap synthesis.
//!
//! Everything the engine splices into a file is built here as plain text,
//! anchored to byte offsets from the syntax tree. The original bytes are
//! never re-printed, so formatting and comments survive untouched.

use std::hash::Hasher;
use std::path::Path;

use fnv::FnvHasher;
use ra_ap_syntax::TextRange;

use super::collect::FnTarget;

/// Prefix of every synthesized guard flag static. Its presence in a file is
/// also how the engine recognizes prior instrumentation.
pub const FLAG_PREFIX: &str = "SOFT_FLAG_";

const REGISTER_PREFIX: &str = "SOFT_REGISTER_";

/// Absolute path generated code uses to reach the registry, so no `use`
/// items have to be threaded into the rewritten file.
const RUNTIME_PATH: &str = "softmock::runtime";

/// Deterministic flag name for a declaration, derived from its body span.
///
/// Stable across repeated runs on an unchanged file. An edit that shifts
/// byte offsets renames every flag after it; nothing stale survives because
/// identities are re-derived on the next run, but diffs get noisy.
pub fn flag_name(path: &Path, body: TextRange) -> String {
    let mut hasher = FnvHasher::default();
    hasher.write(format!("{}:{}", path.display(), u32::from(body.start())).as_bytes());
    hasher.write(format!("{}:{}", path.display(), u32::from(body.end())).as_bytes());
    format!("{}{:016X}", FLAG_PREFIX, hasher.finish())
}

/// The redirect spliced in as the first statement of an instrumented body.
///
/// When the flag is active the replacement is fetched and invoked with this
/// call's actual arguments, and its result returned immediately; `return`
/// with a unit-typed call covers declarations without results. When the
/// replacement is not yet visible the original body runs.
pub fn guard_stmt(target: &FnTarget, flag: &str) -> String {
    let ind = &target.indent;
    let ident = target.ident_expr();
    let fn_ty = target.fn_ptr_ty();
    let args = target.arg_names.join(", ");
    format!(
        "\n{ind}    if {flag}.is_active() {{\n\
         {ind}        if let Some(soft_mock) = {RUNTIME_PATH}::mock_for({ident} as {fn_ty}) {{\n\
         {ind}            return soft_mock({args});\n\
         {ind}        }}\n\
         {ind}    }}"
    )
}

/// Flag statics plus the single registration hook for a file, appended at
/// its end. The hook registers every accepted declaration exactly once at
/// process start.
pub fn bootstrap_block(path: &Path, targets: &[(FnTarget, String)]) -> String {
    let mut out = String::from("\n");
    for (_, flag) in targets {
        out.push_str(&format!(
            "static {flag}: {RUNTIME_PATH}::Flag = {RUNTIME_PATH}::Flag::new();\n"
        ));
    }

    let mut hasher = FnvHasher::default();
    hasher.write(path.display().to_string().as_bytes());
    for (_, flag) in targets {
        hasher.write(flag.as_bytes());
    }

    out.push_str(&format!(
        "#[linkme::distributed_slice({RUNTIME_PATH}::REGISTRATIONS)]\n"
    ));
    out.push_str(&format!(
        "static {}{:016X}: {}::RegisterFn = || {{\n",
        REGISTER_PREFIX,
        hasher.finish(),
        RUNTIME_PATH
    ));
    for (target, flag) in targets {
        out.push_str(&format!(
            "    {}::register({} as {}, &{});\n",
            RUNTIME_PATH,
            target.ident_expr(),
            target.fn_ptr_ty(),
            flag
        ));
    }
    out.push_str("};\n");
    out
}

/// A text insertion at a byte offset of the original source.
#[derive(Debug)]
pub struct Edit {
    pub at: usize,
    pub text: String,
}

/// Apply insertions whose offsets all refer to the original source.
pub fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|edit| edit.at);
    let added: usize = edits.iter().map(|edit| edit.text.len()).sum();
    let mut out = String::with_capacity(source.len() + added);
    let mut cursor = 0;
    for edit in &edits {
        out.push_str(&source[cursor..edit.at]);
        out.push_str(&edit.text);
        cursor = edit.at;
    }
    out.push_str(&source[cursor..]);
    out
}
