//! Text-in, text-out source transformations.
//!
//! Every function here is pure: it takes the current file content and returns
//! `Some(new_content)` when it changed something, or `None` when the pattern it
//! looks for is absent ("nothing to fix"). Line numbers are 1-based.
//!
//! These are heuristics over text, not parser-backed rewrites. Each one stays
//! scoped to the reported line or the nearest structural boundary (import
//! block, function body, JSX tag) so the orchestration in
//! [`super::RemediationEngine`] does not depend on how they work.

use std::sync::LazyLock;

use regex::Regex;

// -- Line helpers --

/// Zero-based index of a 1-based line, if it exists.
fn line_index(lines: &[&str], line: u32) -> Option<usize> {
    let idx = usize::try_from(line).ok()?.checked_sub(1)?;
    (idx < lines.len()).then_some(idx)
}

/// Split off a trailing carriage return so edits keep CRLF files intact.
fn split_cr(line: &str) -> (&str, &str) {
    match line.strip_suffix('\r') {
        Some(body) => (body, "\r"),
        None => (line, ""),
    }
}

fn leading_ws(line: &str) -> &str {
    let trimmed = line.trim_start();
    &line[..line.len().saturating_sub(trimmed.len())]
}

/// Apply `edit` to one line; `None` from `edit` means nothing changed.
fn edit_line<F>(content: &str, line: u32, edit: F) -> Option<String>
where
    F: FnOnce(&str) -> Option<String>,
{
    let lines: Vec<&str> = content.split('\n').collect();
    let idx = line_index(&lines, line)?;
    let (body, cr) = split_cr(lines[idx]);
    let edited = edit(body)?;
    if edited == body {
        return None;
    }
    let replacement = format!("{edited}{cr}");
    let mut out = lines;
    out[idx] = &replacement;
    Some(out.join("\n"))
}

/// Remove lines `start..=end` (zero-based).
fn remove_lines(content: &str, start: usize, end: usize) -> Option<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    if start > end || end >= lines.len() {
        return None;
    }
    let kept: Vec<&str> = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| *i < start || *i > end)
        .map(|(_, l)| *l)
        .collect();
    Some(kept.join("\n"))
}

/// Insert `new_line` so it becomes line `at` (zero-based).
fn insert_line(content: &str, at: usize, new_line: &str) -> String {
    let mut lines: Vec<&str> = content.split('\n').collect();
    let at = at.min(lines.len());
    lines.insert(at, new_line);
    lines.join("\n")
}

/// Net `(`/`)` and `{`/`}` depth change of a line, skipping string literals.
fn bracket_delta(line: &str) -> (i64, i64) {
    let mut parens: i64 = 0;
    let mut braces: i64 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in line.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => parens = parens.saturating_add(1),
            ')' => parens = parens.saturating_sub(1),
            '{' => braces = braces.saturating_add(1),
            '}' => braces = braces.saturating_sub(1),
            _ => {}
        }
    }
    (parens, braces)
}

/// Zero-based index of the line that closes the block opened at or after
/// line `start`.
fn block_end(lines: &[&str], start: usize) -> Option<usize> {
    let mut depth: i64 = 0;
    let mut opened = false;
    for (i, line) in lines.iter().enumerate().skip(start) {
        let (_, braces) = bracket_delta(line);
        if line.contains('{') {
            opened = true;
        }
        depth = depth.saturating_add(braces);
        if opened && depth <= 0 {
            return Some(i);
        }
    }
    None
}

/// Zero-based index of the line that closes the parenthesis opened on `start`.
fn statement_end(lines: &[&str], start: usize, max_lines: usize) -> Option<usize> {
    let mut depth: i64 = 0;
    for (i, line) in lines.iter().enumerate().skip(start).take(max_lines) {
        let (parens, _) = bracket_delta(line);
        depth = depth.saturating_add(parens);
        if depth <= 0 {
            return Some(i);
        }
    }
    None
}

fn word_regex(word: &str, suffix: &str) -> Option<Regex> {
    Regex::new(&format!(r"\b{}\b{suffix}", regex::escape(word))).ok()
}

// -- Imports --

/// Where a known symbol is imported from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSource {
    /// Module specifier.
    pub module: String,
    /// Whether the symbol is the module's default export.
    pub default_export: bool,
}

const KNOWN_SYMBOLS: &[(&str, &str, bool)] = &[
    ("React", "react", true),
    ("useState", "react", false),
    ("useEffect", "react", false),
    ("useMemo", "react", false),
    ("useCallback", "react", false),
    ("useRef", "react", false),
    ("useContext", "react", false),
    ("useReducer", "react", false),
    ("useLayoutEffect", "react", false),
    ("useId", "react", false),
    ("useTransition", "react", false),
    ("Fragment", "react", false),
    ("Suspense", "react", false),
    ("Image", "next/image", true),
    ("Link", "next/link", true),
    ("Script", "next/script", true),
    ("Head", "next/head", true),
    ("useRouter", "next/navigation", false),
    ("usePathname", "next/navigation", false),
    ("useSearchParams", "next/navigation", false),
    ("redirect", "next/navigation", false),
    ("notFound", "next/navigation", false),
    ("NextResponse", "next/server", false),
    ("NextRequest", "next/server", false),
];

/// Look up where `symbol` comes from, synthesizing a package import for
/// symbols that are not in the known table.
pub fn import_source(symbol: &str) -> ImportSource {
    if let Some((_, module, default_export)) = KNOWN_SYMBOLS.iter().find(|(s, _, _)| *s == symbol)
    {
        return ImportSource {
            module: (*module).to_owned(),
            default_export: *default_export,
        };
    }
    ImportSource {
        module: kebab_case(symbol),
        default_export: false,
    }
}

fn kebab_case(symbol: &str) -> String {
    let mut out = String::with_capacity(symbol.len().saturating_add(4));
    for (i, c) in symbol.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn is_import_line(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("import ") || t.starts_with("import{") || t.starts_with("import\"")
}

fn is_directive(line: &str) -> bool {
    let t = line.trim();
    matches!(
        t.trim_end_matches(';'),
        "'use client'" | "\"use client\"" | "'use server'" | "\"use server\"" | "'use strict'" | "\"use strict\""
    )
}

/// Zero-based index of the last line of the leading import block, or of the
/// last leading directive when there are no imports.
fn import_block_end(lines: &[&str]) -> Option<usize> {
    let mut last = None;
    let mut i = 0usize;
    while i < lines.len() {
        let line = lines[i];
        let t = line.trim();
        if is_import_line(line) {
            let mut end = i;
            if !t.contains(" from ") && !t.contains("from'") && !t.contains("from\"") && t.contains('{') {
                while end < lines.len().saturating_sub(1) && !lines[end].contains("from") {
                    end = end.saturating_add(1);
                }
            }
            last = Some(end);
            i = end.saturating_add(1);
            continue;
        }
        if is_directive(line) {
            last = Some(i);
        } else if !(t.is_empty() || t.starts_with("//") || t.starts_with("/*") || t.starts_with('*')) {
            break;
        }
        i = i.saturating_add(1);
    }
    last
}

/// Add an import for `symbol` after the leading import block.
///
/// Merges into an existing single-line import of the same module when
/// possible. Returns `None` if the symbol is already imported.
pub fn add_import(content: &str, symbol: &str) -> Option<String> {
    let word = word_regex(symbol, "")?;
    let lines: Vec<&str> = content.split('\n').collect();
    if lines.iter().any(|l| is_import_line(l) && word.is_match(l)) {
        return None;
    }

    let source = import_source(symbol);
    let quote = if lines.iter().any(|l| is_import_line(l) && l.contains('"')) {
        '"'
    } else {
        '\''
    };
    let semi = if lines.iter().any(|l| is_import_line(l) && !l.trim_end().ends_with(';')) {
        ""
    } else {
        ";"
    };

    if let Some(merged) = merge_into_existing(&lines, symbol, &source) {
        return Some(merged);
    }

    let statement = if source.default_export {
        format!("import {symbol} from {quote}{}{quote}{semi}", source.module)
    } else {
        format!("import {{ {symbol} }} from {quote}{}{quote}{semi}", source.module)
    };

    let at = match import_block_end(&lines) {
        Some(end) if is_directive(lines[end]) => {
            return Some(insert_line(content, end.saturating_add(1), &format!("\n{statement}")));
        }
        Some(end) => end.saturating_add(1),
        None => 0,
    };
    Some(insert_line(content, at, &statement))
}

fn merge_into_existing(lines: &[&str], symbol: &str, source: &ImportSource) -> Option<String> {
    let module = regex::escape(&source.module);
    let named = Regex::new(&format!(
        r#"^(\s*import\s+(?:[\w$]+\s*,\s*)?\{{)([^}}]*)(\}}\s*from\s*['"]{module}['"].*)$"#
    ))
    .ok()?;
    let default_only =
        Regex::new(&format!(r#"^(\s*import\s+)([\w$]+)(\s+from\s*['"]{module}['"].*)$"#)).ok()?;

    for (i, line) in lines.iter().enumerate() {
        let (body, cr) = split_cr(line);
        let merged = if source.default_export {
            named.captures(body).and_then(|c| {
                if c.get(1)?.as_str().contains(',') {
                    return None;
                }
                let head = c.get(1)?.as_str();
                let import_kw_end = head.find('{')?;
                Some(format!(
                    "{}{symbol}, {}{}{}",
                    &head[..import_kw_end],
                    &head[import_kw_end..],
                    c.get(2)?.as_str(),
                    c.get(3)?.as_str()
                ))
            })
        } else if let Some(c) = named.captures(body) {
            let existing = c.get(2)?.as_str().trim().trim_end_matches(',').trim();
            let list = if existing.is_empty() {
                symbol.to_owned()
            } else {
                format!("{existing}, {symbol}")
            };
            Some(format!("{} {list} {}", c.get(1)?.as_str(), c.get(3)?.as_str()))
        } else {
            default_only.captures(body).and_then(|c| {
                Some(format!(
                    "{}{}, {{ {symbol} }}{}",
                    c.get(1)?.as_str(),
                    c.get(2)?.as_str(),
                    c.get(3)?.as_str()
                ))
            })
        };

        if let Some(new_line) = merged {
            let replacement = format!("{new_line}{cr}");
            let mut out: Vec<&str> = lines.to_vec();
            out[i] = &replacement;
            return Some(out.join("\n"));
        }
    }
    None
}

/// Replace a quoted import specifier on any import or require line.
pub fn replace_import_specifier(content: &str, old: &str, new: &str) -> Option<String> {
    if old == new {
        return None;
    }
    let mut changed = false;
    let lines: Vec<String> = content
        .split('\n')
        .map(|line| {
            let is_module_line =
                is_import_line(line) || line.contains("from ") || line.contains("require(") || line.contains("import(");
            if !is_module_line {
                return line.to_owned();
            }
            let mut out = line.to_owned();
            for q in ['\'', '"'] {
                let needle = format!("{q}{old}{q}");
                if out.contains(&needle) {
                    out = out.replace(&needle, &format!("{q}{new}{q}"));
                    changed = true;
                }
            }
            out
        })
        .collect();
    changed.then(|| lines.join("\n"))
}

// -- Type annotations --

/// Guess a type for a parameter from its name.
pub fn infer_parameter_type(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    let starts_upper_after = |prefix: &str| {
        name.strip_prefix(prefix)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_uppercase())
    };

    match lower.as_str() {
        "e" | "ev" | "evt" | "event" => return "React.SyntheticEvent",
        "children" => return "React.ReactNode",
        "props" => return "Record<string, unknown>",
        "req" | "request" => return "Request",
        "res" | "response" => return "Response",
        "err" | "error" => return "Error",
        "cb" | "callback" | "fn" | "handler" => return "() => void",
        "date" | "timestamp" => return "Date",
        "i" | "j" | "n" | "idx" | "index" | "count" | "total" | "amount" | "age" | "page"
        | "limit" | "offset" | "size" | "length" | "width" | "height" | "price" | "quantity"
        | "num" | "delay" | "timeout" | "ms" => return "number",
        "name" | "title" | "label" | "text" | "message" | "msg" | "url" | "href" | "path"
        | "slug" | "email" | "query" | "str" | "description" | "content" | "value" | "key"
        | "id" | "token" | "locale" => return "string",
        _ => {}
    }

    if ["is", "has", "should", "can"]
        .iter()
        .any(|p| starts_upper_after(p))
        || matches!(
            lower.as_str(),
            "enabled" | "disabled" | "visible" | "open" | "checked" | "loading" | "active"
        )
    {
        return "boolean";
    }
    if starts_upper_after("on") {
        return "() => void";
    }
    if lower.ends_with("id") || lower.ends_with("name") || lower.ends_with("url") {
        return "string";
    }
    if lower.ends_with("count") || lower.ends_with("index") {
        return "number";
    }
    if (lower.ends_with('s') && lower.len() > 2)
        || matches!(lower.as_str(), "list" | "arr" | "array" | "data")
    {
        return "unknown[]";
    }
    "unknown"
}

/// Annotate `parameter` on the reported line with an inferred type.
pub fn add_type_annotation(content: &str, line: u32, parameter: &str) -> Option<String> {
    let word = word_regex(parameter, "")?;
    let ty = infer_parameter_type(parameter);

    edit_line(content, line, |body| {
        for m in word.find_iter(body) {
            let before = body[..m.start()].trim_end();
            let rest = body[m.end()..].trim_start();
            if rest.starts_with(':') || rest.starts_with("?:") {
                return None;
            }
            // Skip property accesses and object keys.
            if before.ends_with('.') {
                continue;
            }
            if rest.starts_with("=>") {
                let mut out = String::with_capacity(body.len().saturating_add(ty.len()).saturating_add(4));
                if before.ends_with('(') {
                    out.push_str(&body[..m.end()]);
                    out.push_str(": ");
                    out.push_str(ty);
                    out.push_str(&body[m.end()..]);
                } else {
                    out.push_str(&body[..m.start()]);
                    out.push('(');
                    out.push_str(parameter);
                    out.push_str(": ");
                    out.push_str(ty);
                    out.push(')');
                    out.push_str(&body[m.end()..]);
                }
                return Some(out);
            }
            let param_position = before.ends_with('(') || before.ends_with(',');
            let closes = rest.starts_with(',') || rest.starts_with(')');
            let defaults = rest.starts_with('=') && !rest.starts_with("==");
            if param_position && (closes || defaults) {
                return Some(format!("{}: {ty}{}", &body[..m.end()], &body[m.end()..]));
            }
        }
        None
    })
}

static FUNCTION_HEAD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?P<head>.*\bfunction\b[^{]*\))\s*\{").ok()
});
static ARROW_HEAD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?P<head>.*=\s*(?:async\s*)?\([^)]*\))\s*=>").ok());
static RETURNS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\breturn\b\s*([^;\n]*)").ok());

/// Infer a return type from the `return` statements in a function body.
fn infer_return_type(body: &str) -> Option<&'static str> {
    let returns = RETURNS.as_ref()?;
    let values: Vec<&str> = returns
        .captures_iter(body)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
        .filter(|v| !v.is_empty())
        .collect();

    if values.is_empty() {
        return Some("void");
    }
    let all = |pred: fn(&str) -> bool| values.iter().all(|v| pred(v));
    if all(|v| {
        v == "(" || v.starts_with('<') || v.trim_start_matches('(').trim_start().starts_with('<')
    }) {
        return Some("JSX.Element");
    }
    if all(|v| v.starts_with('\'') || v.starts_with('"') || v.starts_with('`')) {
        return Some("string");
    }
    if all(|v| v.parse::<f64>().is_ok()) {
        return Some("number");
    }
    if all(|v| v == "true" || v == "false") {
        return Some("boolean");
    }
    None
}

/// Add an explicit return type to the function declared on the reported line.
pub fn add_return_type(content: &str, line: u32) -> Option<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    let idx = line_index(&lines, line)?;
    let (body_line, _) = split_cr(lines[idx]);

    let head = FUNCTION_HEAD
        .as_ref()?
        .captures(body_line)
        .or_else(|| ARROW_HEAD.as_ref()?.captures(body_line))?
        .name("head")?
        .as_str()
        .to_owned();
    if body_line[head.len()..].trim_start().starts_with(':') {
        return None;
    }

    let end = block_end(&lines, idx)?;
    let body = lines[idx..=end].join("\n");
    let inferred = infer_return_type(&body)?;
    let ty = if head.contains("async") {
        format!("Promise<{inferred}>")
    } else {
        inferred.to_owned()
    };

    edit_line(content, line, |b| {
        Some(format!("{head}: {ty}{}", &b[head.len()..]))
    })
}

// -- Expression-level fixes --

/// Cast the object of `.property` so the access type-checks.
pub fn fix_property_access(content: &str, line: u32, property: &str) -> Option<String> {
    let access = Regex::new(&format!(
        r"(?P<obj>[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\.{}\b",
        regex::escape(property)
    ))
    .ok()?;
    edit_line(content, line, |body| {
        if body.contains("as any)") {
            return None;
        }
        let c = access.captures(body)?;
        let whole = c.get(0)?;
        let obj = c.name("obj")?.as_str();
        Some(format!(
            "{}({obj} as any).{property}{}",
            &body[..whole.start()],
            &body[whole.end()..]
        ))
    })
}

/// Assert the value on the reported line to `target_type`.
///
/// Handles JSX attribute expressions, `return` statements and single-line
/// assignments.
pub fn add_type_assertion(content: &str, line: u32, target_type: &str) -> Option<String> {
    let assertion = format!(" as unknown as {target_type}");
    edit_line(content, line, |body| {
        if body.contains(" as unknown as ") {
            return None;
        }

        if let Some(start) = body.find("={") {
            let inner_start = start.saturating_add(2);
            let inner_end = body[inner_start..].find('}').map(|e| e.saturating_add(inner_start))?;
            let expr = body[inner_start..inner_end].trim();
            if expr.is_empty() || expr.contains('{') {
                return None;
            }
            return Some(format!(
                "{}{expr}{assertion}{}",
                &body[..inner_start],
                &body[inner_end..]
            ));
        }

        let (code, terminator) = match body.trim_end().strip_suffix(';') {
            Some(code) => (code, ";"),
            None => (body.trim_end(), ""),
        };

        if let Some(pos) = code.find("return ") {
            let value_start = pos.saturating_add("return ".len());
            let value = code[value_start..].trim();
            if value.is_empty() || value.ends_with('(') || value.ends_with('{') {
                return None;
            }
            return Some(format!("{}{value}{assertion}{terminator}", &code[..value_start]));
        }

        let eq = assignment_operator(code)?;
        let value_start = eq.saturating_add(1);
        let value = code[value_start..].trim();
        if value.is_empty() || value.ends_with('(') || value.ends_with('{') || value.ends_with('[') {
            return None;
        }
        Some(format!(
            "{} {value}{assertion}{terminator}",
            code[..value_start].trim_end()
        ))
    })
}

/// Byte offset of the first plain `=` (not `==`, `=>`, `<=`, `>=`, `!=`).
fn assignment_operator(code: &str) -> Option<usize> {
    let bytes = code.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'=' {
            continue;
        }
        let prev = i.checked_sub(1).and_then(|p| bytes.get(p)).copied();
        let next = bytes.get(i.saturating_add(1)).copied();
        let compound = matches!(prev, Some(b'=' | b'!' | b'<' | b'>'));
        if !compound && !matches!(next, Some(b'=' | b'>')) {
            return Some(i);
        }
    }
    None
}

/// Globals whose members are never null.
const NEVER_NULL: &[&str] = &[
    "console", "Math", "JSON", "Object", "Array", "React", "process", "window", "document",
    "Promise", "Number", "String", "this",
];

static MEMBER_ACCESS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?P<obj>[A-Za-z_$][\w$]*|\)|\])\.(?P<prop>[A-Za-z_$][\w$]*)").ok()
});

/// Turn the first nullable member access on the line into optional chaining.
pub fn add_null_check(content: &str, line: u32, property: Option<&str>) -> Option<String> {
    let targeted;
    let access = match property {
        Some(p) => {
            targeted = Regex::new(&format!(
                r"(?P<obj>[A-Za-z_$][\w$]*|\)|\])\.(?P<prop>{})\b",
                regex::escape(p)
            ))
            .ok()?;
            &targeted
        }
        None => MEMBER_ACCESS.as_ref()?,
    };
    edit_line(content, line, |body| {
        for c in access.captures_iter(body) {
            let obj = c.name("obj")?;
            if property.is_none() && NEVER_NULL.contains(&obj.as_str()) {
                continue;
            }
            let dot = obj.end();
            if body[..dot].ends_with('?') {
                return None;
            }
            return Some(format!("{}?{}", &body[..dot], &body[dot..]));
        }
        None
    })
}

// -- Removals --

/// Remove an unused symbol from an import, or drop its declaration.
pub fn remove_unused_symbol(content: &str, line: u32, symbol: &str) -> Option<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    let idx = line_index(&lines, line)?;
    let (body, _) = split_cr(lines[idx]);

    if is_import_line(body) {
        return match remove_from_import(body, symbol)? {
            ImportEdit::DropLine => remove_lines(content, idx, idx),
            ImportEdit::Rewrite(new_line) => edit_line(content, line, |_| Some(new_line)),
        };
    }

    let trimmed = body.trim_start();
    if trimmed.starts_with("export ") {
        return None;
    }

    let word = regex::escape(symbol);
    let declaration = Regex::new(&format!(r"^(?:const|let|var)\s+{word}\s*(?::[^=]+)?=")).ok()?;
    if declaration.is_match(trimmed) {
        let end = statement_end(&lines, idx, 20)?;
        let (_, braces) = bracket_delta(&lines[idx..=end].join("\n"));
        if braces != 0 {
            return None;
        }
        return remove_lines(content, idx, end);
    }

    let function = Regex::new(&format!(r"^(?:async\s+)?function\s+{word}\s*[(<]")).ok()?;
    if function.is_match(trimmed) {
        let end = block_end(&lines, idx)?;
        return remove_lines(content, idx, end);
    }

    None
}

enum ImportEdit {
    DropLine,
    Rewrite(String),
}

fn remove_from_import(line: &str, symbol: &str) -> Option<ImportEdit> {
    let from_pos = line.rfind(" from ")?;
    let head = &line[..from_pos];
    let tail = &line[from_pos..];
    let indent = leading_ws(line);
    let mut clause = head.trim_start().strip_prefix("import")?.trim();
    let type_prefix = if let Some(rest) = clause.strip_prefix("type ") {
        clause = rest.trim_start();
        "type "
    } else {
        ""
    };

    if let Some(ns) = clause.strip_prefix("* as ") {
        return (ns.trim() == symbol).then_some(ImportEdit::DropLine);
    }

    let (default_part, named_part) = match clause.find('{') {
        Some(open) => {
            let close = clause.rfind('}')?;
            (
                clause[..open].trim().trim_end_matches(',').trim(),
                Some(&clause[open.saturating_add(1)..close]),
            )
        }
        None => (clause, None),
    };

    let mut changed = false;
    let default = if default_part == symbol {
        changed = true;
        ""
    } else {
        default_part
    };

    let named: Vec<&str> = named_part
        .map(|n| {
            n.split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .filter(|e| {
                    let alias = e.rsplit(" as ").next().unwrap_or(*e).trim();
                    let name = alias.strip_prefix("type ").unwrap_or(alias);
                    let keep = name != symbol;
                    if !keep {
                        changed = true;
                    }
                    keep
                })
                .collect()
        })
        .unwrap_or_default();

    if !changed {
        return None;
    }
    if default.is_empty() && named.is_empty() {
        return Some(ImportEdit::DropLine);
    }

    let clause = match (default.is_empty(), named.is_empty()) {
        (false, true) => default.to_owned(),
        (true, false) => format!("{{ {} }}", named.join(", ")),
        _ => format!("{default}, {{ {} }}", named.join(", ")),
    };
    Some(ImportEdit::Rewrite(format!("{indent}import {type_prefix}{clause}{tail}")))
}

static CONSOLE_CALL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^console\.(?:log|debug|info|trace|dir|table|warn|error|time|timeEnd)\s*\(").ok()
});

/// Remove a `console.*(...)` call or `debugger` statement on the reported line.
///
/// Only whole statements are removed; a call embedded in other code is left
/// alone.
pub fn remove_debug_statement(content: &str, line: u32) -> Option<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    let idx = line_index(&lines, line)?;
    let trimmed = lines[idx].trim();

    if trimmed.trim_end_matches(';') == "debugger" {
        return remove_lines(content, idx, idx);
    }
    if !CONSOLE_CALL.as_ref()?.is_match(trimmed) {
        return None;
    }
    let end = statement_end(&lines, idx, 20)?;
    let last = lines[end].trim().trim_end_matches(';');
    if !last.ends_with(')') {
        return None;
    }
    remove_lines(content, idx, end)
}

// -- Structural additions --

/// Supply a missing required property on the reported line.
pub fn add_missing_property(content: &str, line: u32, property: &str) -> Option<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    let idx = line_index(&lines, line)?;
    let (body, _) = split_cr(lines[idx]);
    let word = word_regex(property, r"\s*[:=]")?;
    if word.is_match(body) {
        return None;
    }

    static JSX_TAG: LazyLock<Option<Regex>> =
        LazyLock::new(|| Regex::new(r"<(?P<tag>[A-Z][\w.]*)").ok());
    if let Some(tag) = JSX_TAG.as_ref().and_then(|r| r.captures(body)).and_then(|c| c.name("tag")) {
        let at = tag.end();
        return edit_line(content, line, |b| {
            Some(format!("{} {property}={{undefined}}{}", &b[..at], &b[at..]))
        });
    }

    let open = body.rfind('{')?;
    if body[open.saturating_add(1)..].trim().is_empty() {
        let indent = format!("{}  ", leading_ws(body));
        return Some(insert_line(
            content,
            idx.saturating_add(1),
            &format!("{indent}{property}: undefined,"),
        ));
    }
    edit_line(content, line, |b| {
        let at = open.saturating_add(1);
        Some(format!("{} {property}: undefined,{}", &b[..at], &b[at..]))
    })
}

/// Prepend `'use client'` unless the module already carries a directive.
pub fn add_use_client_directive(content: &str) -> Option<String> {
    let first = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("//"))?;
    if is_directive(first) && (first.contains("use client") || first.contains("use server")) {
        return None;
    }
    Some(format!("'use client';\n\n{content}"))
}

static DEFAULT_HANDLER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"export\s+default\s+(?:async\s+)?function\s*(?:[\w$]+)?\s*\(\s*(?P<req>[\w$]+)(?:\s*:\s*[\w.<>]+)?\s*,\s*(?P<res>[\w$]+)(?:\s*:\s*[\w.<>]+)?\s*\)",
    )
    .ok()
});

/// Convert a pages-router `export default function handler(req, res)` into an
/// app-router `GET`/`POST` route handler returning `Response` objects.
pub fn fix_route_handler(content: &str) -> Option<String> {
    let caps = DEFAULT_HANDLER.as_ref()?.captures(content)?;
    let req = caps.name("req")?.as_str().to_owned();
    let res = caps.name("res")?.as_str().to_owned();
    let whole = caps.get(0)?;

    let method = if content.contains("'POST'") && !content.contains("'GET'") {
        "POST"
    } else {
        "GET"
    };

    let mut out = format!(
        "{}export async function {method}(request: Request){}",
        &content[..whole.start()],
        &content[whole.end()..]
    );

    out = rewrite_response_calls(&out, &res);
    out = out.replace(&format!("{req}.body"), "(await request.json())");
    out = out.replace(
        &format!("{req}.query"),
        "Object.fromEntries(new URL(request.url).searchParams)",
    );
    out = out.replace(&format!("{req}.method"), "request.method");
    out = out.replace(&format!("{req}.headers"), "request.headers");
    Some(out)
}

/// Index just past the `)` matching the `(` at `open`.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth: i64 = 0;
    for (offset, c) in text[open..].char_indices() {
        match c {
            '(' => depth = depth.saturating_add(1),
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open.saturating_add(offset).saturating_add(1));
                }
            }
            _ => {}
        }
    }
    None
}

fn rewrite_response_calls(text: &str, res: &str) -> String {
    static STATUS_JSON: LazyLock<Option<Regex>> =
        LazyLock::new(|| Regex::new(r"^\.status\((?P<code>\d{3})\)\.(?P<kind>json|send)\(").ok());

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let needle = format!("{res}.");

    while let Some(pos) = rest.find(&needle) {
        let after = &rest[pos.saturating_add(res.len())..];
        let (call_open, status, kind) = if let Some(c) = STATUS_JSON.as_ref().and_then(|r| r.captures(after)) {
            let open = c.get(0).map_or(0, |m| m.end()).saturating_sub(1);
            (
                open,
                c.name("code").map(|m| m.as_str().to_owned()),
                c.name("kind").map_or("json", |m| m.as_str()),
            )
        } else if after.starts_with(".json(") {
            (".json".len(), None, "json")
        } else if after.starts_with(".send(") {
            (".send".len(), None, "send")
        } else {
            out.push_str(&rest[..pos.saturating_add(needle.len())]);
            rest = &rest[pos.saturating_add(needle.len())..];
            continue;
        };

        let Some(close) = matching_paren(after, call_open) else {
            break;
        };
        let args = &after[call_open.saturating_add(1)..close.saturating_sub(1)];
        let prefix = &rest[..pos];
        let returned = prefix.trim_end().ends_with("return");
        out.push_str(prefix);
        if !returned {
            out.push_str("return ");
        }
        let init = status.map(|s| format!(", {{ status: {s} }}")).unwrap_or_default();
        match kind {
            "send" => out.push_str(&format!("new Response({args}{init})")),
            _ => out.push_str(&format!("Response.json({args}{init})")),
        }
        rest = &after[close..];
    }
    out.push_str(rest);
    out
}

static IMAGE_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<(?:img|Image)\b").ok());

/// End offset (exclusive) of the JSX tag starting at `start`.
fn tag_end(text: &str, start: usize) -> Option<usize> {
    let mut depth: i64 = 0;
    for (offset, c) in text[start..].char_indices() {
        match c {
            '{' => depth = depth.saturating_add(1),
            '}' => depth = depth.saturating_sub(1),
            '>' if depth == 0 => return Some(start.saturating_add(offset).saturating_add(1)),
            _ => {}
        }
    }
    None
}

/// Add `alt=""` to the first image element at or after `line` that lacks one,
/// falling back to the first such element in the file.
pub fn add_image_alt(content: &str, line: u32) -> Option<String> {
    let image = IMAGE_TAG.as_ref()?;
    let line_start: usize = content
        .split('\n')
        .take(usize::try_from(line.saturating_sub(1)).ok()?)
        .map(|l| l.len().saturating_add(1))
        .sum();

    let missing_alt: Vec<usize> = image
        .find_iter(content)
        .filter_map(|m| {
            let end = tag_end(content, m.start())?;
            (!content[m.start()..end].contains("alt=")).then_some(m.end())
        })
        .collect();

    let at = missing_alt
        .iter()
        .find(|pos| **pos >= line_start)
        .or_else(|| missing_alt.first())
        .copied()?;
    Some(format!("{} alt=\"\"{}", &content[..at], &content[at..]))
}

static DEP_ARRAY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[(?P<deps>[^\[\]]*)\]\s*\)").ok());

/// Add missing entries to the hook dependency array at or after `line`.
pub fn fix_hook_dependencies(content: &str, line: u32, missing: &[String]) -> Option<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    let idx = line_index(&lines, line)?;
    let deps_re = DEP_ARRAY.as_ref()?;

    let end = idx.saturating_add(30).min(lines.len());
    for (offset, candidate) in lines[idx..end].iter().enumerate() {
        let Some(c) = deps_re.captures(candidate) else {
            continue;
        };
        let deps = c.name("deps")?;
        let mut list: Vec<String> = deps
            .as_str()
            .split(',')
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty())
            .collect();
        let before = list.len();
        for dep in missing {
            if !list.iter().any(|d| d == dep) {
                list.push(dep.clone());
            }
        }
        if list.len() == before {
            return None;
        }
        let target = u32::try_from(idx.saturating_add(offset).saturating_add(1)).ok()?;
        let (start, stop) = (deps.start(), deps.end());
        return edit_line(content, target, |b| {
            Some(format!("{}{}{}", &b[..start], list.join(", "), &b[stop..]))
        });
    }
    None
}

static MAP_CALLBACK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\.map\(\s*(?:async\s*)?\(?\s*(?P<item>[A-Za-z_$][\w$]*)?(?:\s*,\s*(?P<index>[A-Za-z_$][\w$]*))?\s*\)?\s*=>").ok()
});
static JSX_OPEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"<(?P<tag>[A-Za-z][\w.]*)").ok());

/// Add a `key` prop to the first element rendered inside a `.map(...)`
/// callback near the reported line.
pub fn add_iteration_key(content: &str, line: u32) -> Option<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    let idx = line_index(&lines, line)?;

    let search_from = idx.saturating_sub(5);
    let callback = lines[search_from..=idx]
        .iter()
        .rev()
        .find_map(|l| MAP_CALLBACK.as_ref()?.captures(l))?;
    let key = match (callback.name("index"), callback.name("item")) {
        (Some(index), _) => index.as_str().to_owned(),
        (None, Some(item)) => format!("{}.id", item.as_str()),
        (None, None) => return None,
    };

    let jsx = JSX_OPEN.as_ref()?;
    let end = idx.saturating_add(3).min(lines.len());
    for (offset, candidate) in lines[idx..end].iter().enumerate() {
        let Some(tag) = jsx.captures(candidate).and_then(|c| c.name("tag")) else {
            continue;
        };
        let tag_close = candidate[tag.start()..].find('>').map(|e| e.saturating_add(tag.start()));
        let tag_text = tag_close.map_or(&candidate[tag.start()..], |e| &candidate[tag.start()..e]);
        if tag_text.contains("key=") {
            return None;
        }
        let target = u32::try_from(idx.saturating_add(offset).saturating_add(1)).ok()?;
        let at = tag.end();
        return edit_line(content, target, |b| {
            Some(format!("{} key={{{key}}}{}", &b[..at], &b[at..]))
        });
    }
    None
}

/// Rename `process.env.VARIABLE` reads to the client-exposed
/// `NEXT_PUBLIC_VARIABLE`.
pub fn fix_env_var_naming(content: &str, variable: &str) -> Option<String> {
    if variable.starts_with("NEXT_PUBLIC_") {
        return None;
    }
    let read = Regex::new(&format!(r"process\.env\.{}\b", regex::escape(variable))).ok()?;
    if !read.is_match(content) {
        return None;
    }
    Some(
        read.replace_all(content, format!("process.env.NEXT_PUBLIC_{variable}").as_str())
            .into_owned(),
    )
}

/// Widen `property?: T` to `property?: T | undefined`.
pub fn fix_strict_optional(content: &str, property: &str) -> Option<String> {
    let decl = Regex::new(&format!(
        r"\b{}\?\s*:\s*(?P<ty>[^;,\n}}]+)",
        regex::escape(property)
    ))
    .ok()?;
    let c = decl
        .captures_iter(content)
        .find(|c| c.name("ty").is_some_and(|t| !t.as_str().contains("undefined")))?;
    let ty = c.name("ty")?;
    let trimmed_end = ty.start().saturating_add(ty.as_str().trim_end().len());
    Some(format!(
        "{} | undefined{}",
        &content[..trimmed_end],
        &content[trimmed_end..]
    ))
}

/// Set `compilerOptions.<option> = true` in a `tsconfig.json` document.
///
/// Returns `Ok(None)` when the option is already enabled.
///
/// # Errors
///
/// Returns an error if the document is not plain JSON (comments are not
/// supported).
pub fn enable_compiler_option(
    tsconfig: &str,
    option: &str,
) -> Result<Option<String>, serde_json::Error> {
    let mut doc: serde_json::Value = serde_json::from_str(tsconfig)?;
    let Some(root) = doc.as_object_mut() else {
        return Ok(None);
    };
    let options = root
        .entry("compilerOptions")
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    let Some(options) = options.as_object_mut() else {
        return Ok(None);
    };
    if options.get(option).and_then(serde_json::Value::as_bool) == Some(true) {
        return Ok(None);
    }
    options.insert(option.to_owned(), serde_json::Value::Bool(true));
    let mut out = serde_json::to_string_pretty(&doc)?;
    out.push('\n');
    Ok(Some(out))
}
