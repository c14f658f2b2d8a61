//! Lexical import scanner.
//!
//! Finds the byte span of every static `import`/`export ... from` specifier
//! in a JavaScript module without a full parse. The cursor skips comments,
//! string literals, and template literals (including nested `${}`
//! interpolations), so an `import` keyword inside any of those never produces
//! a span. Dynamic `import()` is deliberately not reported; its argument is a
//! runtime expression, not a static specifier.
//!
//! Spans are byte offsets of the specifier text itself, excluding the quotes,
//! which is what span-based overwrite wants.

/// One static import specifier found in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpan {
    /// Byte offset of the first specifier byte (after the opening quote).
    pub start: usize,
    /// Byte offset one past the last specifier byte (the closing quote).
    pub end: usize,
    /// Specifier text exactly as written.
    pub specifier: String,
}

/// Scan `source` for static import/export-from specifiers, in appearance
/// order. Duplicate specifiers are reported once per occurrence; every
/// occurrence needs its own rewrite.
#[must_use]
pub fn scan_imports(source: &str) -> Vec<ImportSpan> {
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut spans = Vec::new();
    let mut i = 0;
    // Last significant (non-whitespace, non-comment) byte, used to tell a
    // regex literal from a division operator.
    let mut prev_significant: Option<u8> = None;

    while i < len {
        let b = bytes[i];

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if b == b'/' && i + 1 < len && bytes[i + 1] == b'/' {
            i = skip_line_comment(bytes, i);
            continue;
        }
        if b == b'/' && i + 1 < len && bytes[i + 1] == b'*' {
            i = skip_block_comment(bytes, i);
            continue;
        }
        if b == b'/' && starts_regex(prev_significant) {
            i = skip_regex(bytes, i);
            prev_significant = Some(b'/');
            continue;
        }

        if b == b'\'' || b == b'"' {
            i = skip_string(bytes, i);
            prev_significant = Some(b);
            continue;
        }
        if b == b'`' {
            i = skip_template(bytes, i);
            prev_significant = Some(b);
            continue;
        }

        if matches_keyword(bytes, i, b"import") {
            if let Some((span, resume)) = scan_import(source, bytes, i + 6) {
                spans.push(span);
                i = resume;
                prev_significant = Some(b'"');
                continue;
            }
            i += 6;
            prev_significant = Some(b't');
            continue;
        }

        if matches_keyword(bytes, i, b"export") {
            if let Some((span, resume)) = scan_clause_from(source, bytes, i + 6) {
                spans.push(span);
                i = resume;
                prev_significant = Some(b'"');
                continue;
            }
            i += 6;
            prev_significant = Some(b't');
            continue;
        }

        prev_significant = Some(b);
        i += 1;
    }

    spans
}

/// After the `import` keyword: side-effect form, `import.meta`, dynamic
/// `import(`, or a clause ending in `from "..."`.
fn scan_import(source: &str, bytes: &[u8], start: usize) -> Option<(ImportSpan, usize)> {
    let i = skip_ws_and_comments(bytes, start);
    match bytes.get(i) {
        // import.meta — not an import statement
        Some(b'.') => None,
        // dynamic import(...) — out of scope; the argument is skipped as a
        // plain string by the main loop
        Some(b'(') => None,
        // import "./side-effect"
        Some(b'\'' | b'"') => capture_specifier(source, bytes, i),
        // import <clause> from "..."
        Some(_) => scan_clause_from(source, bytes, start),
        None => None,
    }
}

/// Walk an import/export clause looking for a top-level `from` followed by a
/// quoted specifier. Braces (named imports/exports, which may contain string
/// names and a `from` identifier), strings, and comments are skipped. Gives
/// up at `;` or end of input.
fn scan_clause_from(source: &str, bytes: &[u8], start: usize) -> Option<(ImportSpan, usize)> {
    let len = bytes.len();
    let mut i = start;

    while i < len {
        let b = bytes[i];
        match b {
            b';' => return None,
            b'{' => i = skip_braces(bytes, i),
            b'\'' | b'"' => i = skip_string(bytes, i),
            b'`' => return None,
            b'/' if i + 1 < len && bytes[i + 1] == b'/' => i = skip_line_comment(bytes, i),
            b'/' if i + 1 < len && bytes[i + 1] == b'*' => i = skip_block_comment(bytes, i),
            _ => {
                if matches_keyword(bytes, i, b"from") {
                    let after = skip_ws_and_comments(bytes, i + 4);
                    if let Some(b'\'' | b'"') = bytes.get(after) {
                        return capture_specifier(source, bytes, after);
                    }
                    // `from` as an identifier; keep walking
                }
                i += 1;
            }
        }
    }

    None
}

/// Capture the specifier inside the quote starting at `i`. The span excludes
/// the quotes. A newline before the closing quote means this is not a valid
/// specifier string; give up.
fn capture_specifier(source: &str, bytes: &[u8], i: usize) -> Option<(ImportSpan, usize)> {
    let quote = bytes[i];
    let start = i + 1;
    let mut j = start;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'\n' => return None,
            b if b == quote => {
                return Some((
                    ImportSpan {
                        start,
                        end: j,
                        specifier: source[start..j].to_string(),
                    },
                    j + 1,
                ));
            }
            _ => j += 1,
        }
    }
    None
}

/// Keyword match with word boundaries. A preceding `.` rules out property
/// access (`obj.import`); non-ASCII bytes count as identifier characters.
fn matches_keyword(bytes: &[u8], pos: usize, keyword: &[u8]) -> bool {
    let end = pos + keyword.len();
    if end > bytes.len() || &bytes[pos..end] != keyword {
        return false;
    }
    if pos > 0 {
        let prev = bytes[pos - 1];
        if is_ident_byte(prev) || prev == b'.' {
            return false;
        }
    }
    if let Some(&next) = bytes.get(end) {
        if is_ident_byte(next) {
            return false;
        }
    }
    true
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// A `/` begins a regex literal when the previous significant byte cannot end
/// an expression.
fn starts_regex(prev: Option<u8>) -> bool {
    match prev {
        None => true,
        Some(b) => matches!(
            b,
            b'=' | b'(' | b'[' | b'{' | b',' | b';' | b':' | b'!' | b'&' | b'|' | b'?' | b'+'
                | b'-' | b'*' | b'%' | b'^' | b'~' | b'<' | b'>'
        ),
    }
}

fn skip_line_comment(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

fn skip_block_comment(bytes: &[u8], mut i: usize) -> usize {
    i += 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_ws_and_comments(bytes: &[u8], mut i: usize) -> usize {
    let len = bytes.len();
    loop {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i + 1 < len && bytes[i] == b'/' && bytes[i + 1] == b'/' {
            i = skip_line_comment(bytes, i);
        } else if i + 1 < len && bytes[i] == b'/' && bytes[i + 1] == b'*' {
            i = skip_block_comment(bytes, i);
        } else {
            return i;
        }
    }
}

/// Skip a `'` or `"` string literal, honoring backslash escapes. Returns the
/// index past the closing quote.
fn skip_string(bytes: &[u8], i: usize) -> usize {
    let quote = bytes[i];
    let mut j = i + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'\n' => return j,
            b if b == quote => return j + 1,
            _ => j += 1,
        }
    }
    j
}

/// Skip a template literal, recursing into `${}` interpolations, which may
/// themselves contain strings, templates, and comments.
fn skip_template(bytes: &[u8], i: usize) -> usize {
    let len = bytes.len();
    let mut j = i + 1;
    while j < len {
        match bytes[j] {
            b'\\' => j += 2,
            b'`' => return j + 1,
            b'$' if j + 1 < len && bytes[j + 1] == b'{' => {
                j = skip_template_expr(bytes, j + 2);
            }
            _ => j += 1,
        }
    }
    len
}

fn skip_template_expr(bytes: &[u8], mut i: usize) -> usize {
    let len = bytes.len();
    let mut depth = 1usize;
    while i < len {
        match bytes[i] {
            b'\'' | b'"' => i = skip_string(bytes, i),
            b'`' => i = skip_template(bytes, i),
            b'/' if i + 1 < len && bytes[i + 1] == b'/' => i = skip_line_comment(bytes, i),
            b'/' if i + 1 < len && bytes[i + 1] == b'*' => i = skip_block_comment(bytes, i),
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    len
}

/// Skip a regex literal, honoring escapes and character classes. Returns the
/// index past the closing `/`.
fn skip_regex(bytes: &[u8], i: usize) -> usize {
    let len = bytes.len();
    let mut j = i + 1;
    let mut in_class = false;
    while j < len {
        match bytes[j] {
            b'\\' => j += 2,
            b'[' => {
                in_class = true;
                j += 1;
            }
            b']' => {
                in_class = false;
                j += 1;
            }
            b'/' if !in_class => return j + 1,
            b'\n' => return j,
            _ => j += 1,
        }
    }
    len
}

/// Skip a `{ ... }` section, honoring nesting, strings, and comments. Named
/// export lists may contain arbitrary string names (`export { x as "s" }`).
fn skip_braces(bytes: &[u8], i: usize) -> usize {
    let len = bytes.len();
    let mut j = i + 1;
    let mut depth = 1usize;
    while j < len {
        match bytes[j] {
            b'\'' | b'"' => j = skip_string(bytes, j),
            b'`' => j = skip_template(bytes, j),
            b'/' if j + 1 < len && bytes[j + 1] == b'/' => j = skip_line_comment(bytes, j),
            b'/' if j + 1 < len && bytes[j + 1] == b'*' => j = skip_block_comment(bytes, j),
            b'{' => {
                depth += 1;
                j += 1;
            }
            b'}' => {
                depth -= 1;
                j += 1;
                if depth == 0 {
                    return j;
                }
            }
            _ => j += 1,
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(source: &str) -> Vec<String> {
        scan_imports(source)
            .into_iter()
            .map(|s| s.specifier)
            .collect()
    }

    #[test]
    fn test_import_forms() {
        assert_eq!(specs(r#"import React from "react";"#), ["react"]);
        assert_eq!(specs(r#"import { useState } from "react";"#), ["react"]);
        assert_eq!(specs(r#"import * as path from "./path";"#), ["./path"]);
        assert_eq!(specs(r#"import "./side-effect";"#), ["./side-effect"]);
        assert_eq!(
            specs(r#"import Default, { named } from './mixed';"#),
            ["./mixed"]
        );
    }

    #[test]
    fn test_export_from_forms() {
        assert_eq!(specs(r#"export { a, b } from "./ab";"#), ["./ab"]);
        assert_eq!(specs(r#"export * from "./star";"#), ["./star"]);
        assert_eq!(specs(r#"export * as ns from "./ns";"#), ["./ns"]);
    }

    #[test]
    fn test_plain_export_yields_nothing() {
        assert!(specs("export const x = 1;").is_empty());
        assert!(specs("export default function f() { return 1; }").is_empty());
        assert!(specs(r#"export const s = "import junk from 'fake'";"#).is_empty());
    }

    #[test]
    fn test_spans_are_byte_offsets_of_specifier_text() {
        let source = r#"import App from "./App";"#;
        let spans = scan_imports(source);
        assert_eq!(spans.len(), 1);
        assert_eq!(&source[spans[0].start..spans[0].end], "./App");
    }

    #[test]
    fn test_each_occurrence_reported() {
        let source = "import a from \"./dep\";\nimport b from \"./dep\";\n";
        let spans = scan_imports(source);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].specifier, "./dep");
        assert_eq!(spans[1].specifier, "./dep");
        assert!(spans[0].end < spans[1].start);
    }

    #[test]
    fn test_comments_are_skipped() {
        let source = r#"
// import commented from "./line";
/* import commented from "./block"; */
import real from "./real";
"#;
        assert_eq!(specs(source), ["./real"]);
    }

    #[test]
    fn test_string_literals_are_skipped() {
        let source = r#"
const fake = "import x from './not-real'";
const fake2 = 'import y from "./also-not-real"';
import real from "./real";
"#;
        assert_eq!(specs(source), ["./real"]);
    }

    #[test]
    fn test_template_literals_are_skipped() {
        let source = r#"
const msg = `import x from "./inside-template"`;
const nested = `outer ${ `import y from "./nested"` } rest`;
const expr = `value: ${ compute({ a: 1 }) } import z from "./still-template"`;
import real from "./real";
"#;
        assert_eq!(specs(source), ["./real"]);
    }

    #[test]
    fn test_dynamic_import_is_ignored() {
        let source = r#"
const mod = await import("./dynamic");
import real from "./real";
"#;
        assert_eq!(specs(source), ["./real"]);
    }

    #[test]
    fn test_import_meta_is_ignored() {
        let source = r#"
if (import.meta.hot) { import.meta.hot.accept(); }
import real from "./real";
"#;
        assert_eq!(specs(source), ["./real"]);
    }

    #[test]
    fn test_multiline_clause() {
        let source = "import {\n  a,\n  b,\n  c,\n} from \"./many\";\n";
        assert_eq!(specs(source), ["./many"]);
    }

    #[test]
    fn test_from_inside_braces_is_not_the_keyword() {
        let source = r#"import { from as other } from "./tricky";"#;
        assert_eq!(specs(source), ["./tricky"]);
    }

    #[test]
    fn test_property_access_is_not_a_keyword() {
        let source = r#"
loader.import("./via-method");
import real from "./real";
"#;
        assert_eq!(specs(source), ["./real"]);
    }

    #[test]
    fn test_regex_literal_is_skipped() {
        let source = r#"
const re = /import x from ".\/trap"/;
import real from "./real";
"#;
        assert_eq!(specs(source), ["./real"]);
    }

    #[test]
    fn test_single_quoted_specifier() {
        assert_eq!(specs("import a from './single';"), ["./single"]);
    }

    #[test]
    fn test_scoped_package() {
        assert_eq!(specs(r#"import x from "@scope/pkg";"#), ["@scope/pkg"]);
    }

    #[test]
    fn test_empty_source() {
        assert!(specs("").is_empty());
        assert!(specs("console.log('hello');").is_empty());
    }
}
