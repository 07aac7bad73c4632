//! Source transforms, one behavior per test.

use devwatch::remediation::transforms::{
    add_iteration_key, add_image_alt, add_import, add_missing_property, add_null_check,
    add_return_type, add_type_annotation, add_type_assertion, add_use_client_directive,
    enable_compiler_option, fix_env_var_naming, fix_hook_dependencies, fix_property_access,
    fix_route_handler, fix_strict_optional, import_source, infer_parameter_type,
    remove_debug_statement, remove_unused_symbol, replace_import_specifier,
};

fn changed(result: Option<String>) -> String {
    match result {
        Some(content) => content,
        None => panic!("transform should change the content"),
    }
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

#[test]
fn add_import_merges_into_named_import() {
    let src = "import { useEffect } from 'react';\n\nexport default function A() {}\n";
    let out = changed(add_import(src, "useState"));
    assert_eq!(
        out,
        "import { useEffect, useState } from 'react';\n\nexport default function A() {}\n"
    );
}

#[test]
fn add_import_inserts_at_top_without_imports() {
    let src = "export function C() {\n  const [a] = useState(0);\n  return a;\n}\n";
    let out = changed(add_import(src, "useState"));
    assert!(out.starts_with("import { useState } from 'react';\nexport function C() {"));
}

#[test]
fn add_import_goes_below_directive() {
    let src = "'use client';\nexport default function A() {}\n";
    let out = changed(add_import(src, "Image"));
    assert_eq!(
        out,
        "'use client';\n\nimport Image from 'next/image';\nexport default function A() {}\n"
    );
}

#[test]
fn add_import_follows_quote_and_semicolon_style() {
    let src = "import Link from \"next/link\"\n\nconst a = 1\n";
    let out = changed(add_import(src, "useRouter"));
    assert!(out.contains("import { useRouter } from \"next/navigation\"\n"));
}

#[test]
fn add_import_is_noop_when_already_imported() {
    let src = "import { useState } from 'react';\nconst a = useState(1);\n";
    assert!(add_import(src, "useState").is_none());
}

#[test]
fn unknown_symbols_get_kebab_case_module() {
    let source = import_source("DatePicker");
    assert_eq!(source.module, "date-picker");
    assert!(!source.default_export);
    assert!(import_source("Link").default_export);
}

#[test]
fn replace_import_specifier_touches_module_lines_only() {
    let src = "import { x } from './utils.js';\nconst label = './utils.js';\n";
    let out = changed(replace_import_specifier(src, "./utils.js", "./utils"));
    assert_eq!(
        out,
        "import { x } from './utils';\nconst label = './utils.js';\n"
    );
    assert!(replace_import_specifier(src, "./missing", "./other").is_none());
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[test]
fn parameter_types_are_inferred_from_names() {
    assert_eq!(infer_parameter_type("isOpen"), "boolean");
    assert_eq!(infer_parameter_type("onClick"), "() => void");
    assert_eq!(infer_parameter_type("userId"), "string");
    assert_eq!(infer_parameter_type("items"), "unknown[]");
    assert_eq!(infer_parameter_type("index"), "number");
    assert_eq!(infer_parameter_type("thing"), "unknown");
}

#[test]
fn annotation_in_function_parameters() {
    let src = "function greet(name) {\n  return name;\n}\n";
    let out = changed(add_type_annotation(src, 1, "name"));
    assert!(out.starts_with("function greet(name: string) {\n"));
}

#[test]
fn annotation_wraps_bare_arrow_parameter() {
    let src = "const f = e => e.target;\n";
    let out = changed(add_type_annotation(src, 1, "e"));
    assert_eq!(out, "const f = (e: React.SyntheticEvent) => e.target;\n");
}

#[test]
fn annotation_skips_already_typed_parameter() {
    let src = "function greet(name: string) {}\n";
    assert!(add_type_annotation(src, 1, "name").is_none());
}

#[test]
fn return_type_from_literal_returns() {
    let src = "function total(a: number, b: number) {\n  return 42;\n}\n";
    let out = changed(add_return_type(src, 1));
    assert!(out.starts_with("function total(a: number, b: number): number {"));

    let src = "async function load() {\n  return 'x';\n}\n";
    let out = changed(add_return_type(src, 1));
    assert!(out.starts_with("async function load(): Promise<string> {"));
}

#[test]
fn return_type_void_without_value() {
    let src = "const reset = () => {\n  count = 0;\n};\n";
    let out = changed(add_return_type(src, 1));
    assert!(out.starts_with("const reset = (): void => {"));
}

#[test]
fn property_access_is_cast() {
    let src = "const v = user.profile.nickname;\n";
    let out = changed(fix_property_access(src, 1, "nickname"));
    assert_eq!(out, "const v = (user.profile as any).nickname;\n");
}

#[test]
fn assertion_on_assignment() {
    let src = "const n: number = input;\n";
    let out = changed(add_type_assertion(src, 1, "number"));
    assert_eq!(out, "const n: number = input as unknown as number;\n");
}

#[test]
fn null_check_on_first_nullable_access() {
    let src = "const n = user.name.length;\n";
    let out = changed(add_null_check(src, 1, None));
    assert_eq!(out, "const n = user?.name.length;\n");
}

#[test]
fn null_check_on_named_property_in_chain() {
    let src = "  return data.items.map((i) => i.id);\n";
    let out = changed(add_null_check(src, 1, Some("map")));
    assert_eq!(out, "  return data.items?.map((i) => i.id);\n");
}

#[test]
fn strict_optional_widens_type() {
    let src = "interface Props {\n  title?: string;\n}\n";
    let out = changed(fix_strict_optional(src, "title"));
    assert_eq!(out, "interface Props {\n  title?: string | undefined;\n}\n");
}

// ---------------------------------------------------------------------------
// Removals
// ---------------------------------------------------------------------------

#[test]
fn unused_named_import_is_removed() {
    let src = "import { useState, useEffect } from 'react';\nconst a = useState(1);\n";
    let out = changed(remove_unused_symbol(src, 1, "useEffect"));
    assert_eq!(out, "import { useState } from 'react';\nconst a = useState(1);\n");
}

#[test]
fn import_line_dropped_when_empty() {
    let src = "import React from 'react';\nexport const a = 1;\n";
    let out = changed(remove_unused_symbol(src, 1, "React"));
    assert_eq!(out, "export const a = 1;\n");
}

#[test]
fn unused_declaration_is_removed() {
    let src = "const unused = 5;\nexport const a = 1;\n";
    let out = changed(remove_unused_symbol(src, 1, "unused"));
    assert_eq!(out, "export const a = 1;\n");
}

#[test]
fn exported_declaration_is_kept() {
    let src = "export const unused = 5;\n";
    assert!(remove_unused_symbol(src, 1, "unused").is_none());
}

#[test]
fn multi_line_console_call_is_removed() {
    let src = "function f() {\n  console.log(\n    'a',\n  );\n  return 1;\n}\n";
    let out = changed(remove_debug_statement(src, 2));
    assert_eq!(out, "function f() {\n  return 1;\n}\n");
}

#[test]
fn debugger_statement_is_removed() {
    let src = "function f() {\n  debugger;\n}\n";
    let out = changed(remove_debug_statement(src, 2));
    assert_eq!(out, "function f() {\n}\n");
}

#[test]
fn embedded_console_call_is_left_alone() {
    let src = "const log = (m) => console.log(m);\n";
    assert!(remove_debug_statement(src, 1).is_none());
}

// ---------------------------------------------------------------------------
// Framework fixes
// ---------------------------------------------------------------------------

#[test]
fn use_client_is_prepended_once() {
    let src = "import { useState } from 'react';\n";
    let out = changed(add_use_client_directive(src));
    assert_eq!(out, "'use client';\n\nimport { useState } from 'react';\n");
    assert!(add_use_client_directive(&out).is_none());
}

#[test]
fn route_handler_is_converted() {
    let src = "export default function handler(req, res) {\n  res.status(200).json({ name: req.query.name });\n}\n";
    let out = changed(fix_route_handler(src));
    assert!(out.starts_with("export async function GET(request: Request) {\n"));
    assert!(out.contains(
        "return Response.json({ name: Object.fromEntries(new URL(request.url).searchParams).name }, { status: 200 });"
    ));
    assert!(!out.contains("res.status"));
}

#[test]
fn image_alt_is_added() {
    let src = "<div>\n  <img src=\"/a.png\" />\n</div>\n";
    let out = changed(add_image_alt(src, 2));
    assert_eq!(out, "<div>\n  <img alt=\"\" src=\"/a.png\" />\n</div>\n");
}

#[test]
fn image_with_alt_is_left_alone() {
    let src = "<img src=\"/a.png\" alt=\"logo\" />\n";
    assert!(add_image_alt(src, 1).is_none());
}

#[test]
fn hook_dependencies_are_appended() {
    let src = "useEffect(() => {\n  load(id);\n}, [load]);\n";
    let out = changed(fix_hook_dependencies(src, 1, &["id".to_owned(), "load".to_owned()]));
    assert_eq!(out, "useEffect(() => {\n  load(id);\n}, [load, id]);\n");
}

#[test]
fn iteration_key_uses_item_id() {
    let src = "{items.map((item) => (\n  <li>{item.name}</li>\n))}\n";
    let out = changed(add_iteration_key(src, 1));
    assert_eq!(out, "{items.map((item) => (\n  <li key={item.id}>{item.name}</li>\n))}\n");
}

#[test]
fn iteration_key_prefers_index() {
    let src = "{items.map((item, i) => <li>{item}</li>)}\n";
    let out = changed(add_iteration_key(src, 1));
    assert_eq!(out, "{items.map((item, i) => <li key={i}>{item}</li>)}\n");
}

#[test]
fn missing_jsx_property_is_supplied() {
    let src = "  <Button label=\"x\" />\n";
    let out = changed(add_missing_property(src, 1, "onClick"));
    assert_eq!(out, "  <Button onClick={undefined} label=\"x\" />\n");
}

#[test]
fn env_var_gets_public_prefix() {
    let src = "const key = process.env.API_KEY;\nconst again = process.env.API_KEY_ID;\n";
    let out = changed(fix_env_var_naming(src, "API_KEY"));
    assert_eq!(
        out,
        "const key = process.env.NEXT_PUBLIC_API_KEY;\nconst again = process.env.API_KEY_ID;\n"
    );
    assert!(fix_env_var_naming(&out, "NEXT_PUBLIC_API_KEY").is_none());
}

#[test]
fn compiler_option_is_enabled() {
    let tsconfig = "{\n  \"compilerOptions\": {\n    \"strict\": true\n  }\n}\n";
    let out = enable_compiler_option(tsconfig, "esModuleInterop")
        .expect("plain JSON should parse")
        .expect("option should be added");
    let doc: serde_json::Value = serde_json::from_str(&out).expect("output should be JSON");
    assert_eq!(doc["compilerOptions"]["esModuleInterop"], true);
    assert_eq!(doc["compilerOptions"]["strict"], true);

    let again = enable_compiler_option(&out, "esModuleInterop").expect("should parse");
    assert!(again.is_none());
}

#[test]
fn commented_tsconfig_is_rejected() {
    let tsconfig = "{\n  // comment\n  \"compilerOptions\": {}\n}\n";
    assert!(enable_compiler_option(tsconfig, "strict").is_err());
}

#[test]
fn crlf_lines_are_preserved() {
    let src = "const n = user.name;\r\nconst m = 1;\r\n";
    let out = changed(add_null_check(src, 1, None));
    assert_eq!(out, "const n = user?.name;\r\nconst m = 1;\r\n");
}
