//! Bootstrap script rendering
//!
//! The companion server is started through a tiny generated Python script
//! that prints interpreter diagnostics and then imports the server entry
//! module. Credentials are passed through the process environment, never
//! through the script text.

use std::path::Path;

/// Entry module of the companion server package.
pub const DEFAULT_ENTRY_MODULE: &str = "mistral_ocr_zotero.server";

const TEMPLATE: &str = r#"# Generated by ocrsup. Single-use bootstrap for the OCR companion server.
import sys
import traceback

ENTRY_MODULE = "@ENTRY_MODULE@"
PACKAGE_HINT = "@PACKAGE_HINT@"
LOG_PATH = "@LOG_PATH@"

print("Starting OCR companion server...")
print(f"Python executable: {sys.executable}")
print(f"Python version: {sys.version}")
print(f"Diagnostics log: {LOG_PATH}")
sys.stdout.flush()

try:
    from importlib import import_module
    server = import_module(ENTRY_MODULE)
except ImportError as e:
    print(f"Error: Could not import {ENTRY_MODULE}: {e}")
    print(f"Please install with: pip install {PACKAGE_HINT}")
    traceback.print_exc()
    sys.exit(1)

try:
    print("Import successful, starting main()...")
    sys.stdout.flush()
    server.main()
except Exception as e:
    print(f"Error starting server: {e}")
    traceback.print_exc()
    sys.exit(1)
"#;

/// Escape `value` for embedding inside a double-quoted script string literal.
///
/// Backslashes and quotes are escaped and control characters are encoded, so
/// the value can never terminate the literal early.
pub fn escape_script_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if c.is_control() => escaped.push_str(&format!("\\x{:02x}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Distribution name guessed from an entry module (`a_b.server` -> `a-b`).
fn package_hint(entry_module: &str) -> String {
    entry_module
        .split('.')
        .next()
        .unwrap_or(entry_module)
        .replace('_', "-")
}

/// Render the bootstrap script for `entry_module`, logging to `log_path`.
pub fn render_bootstrap_script(entry_module: &str, log_path: &Path) -> String {
    TEMPLATE
        .replace("@ENTRY_MODULE@", &escape_script_literal(entry_module))
        .replace(
            "@PACKAGE_HINT@",
            &escape_script_literal(&package_hint(entry_module)),
        )
        .replace(
            "@LOG_PATH@",
            &escape_script_literal(&log_path.to_string_lossy()),
        )
}
