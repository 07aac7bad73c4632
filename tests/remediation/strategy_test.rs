//! Diagnostic to strategy resolution.

use devwatch::diagnostic::{Category, Diagnostic, FixCapability, Location, Severity};
use devwatch::remediation::strategy::{
    import_specifier, missing_dependencies, package_name, resolve, FixStrategy,
};

fn diagnostic(category: Category, message: &str) -> Diagnostic {
    Diagnostic::new(
        category,
        Severity::Error,
        message,
        Location::new("src/page.tsx", 1, 1),
        FixCapability::AutoFixable,
        message,
    )
}

fn ts(code: &str, message: &str) -> Diagnostic {
    diagnostic(Category::TypeScript, message).with_code(code)
}

fn lint(rule: &str, message: &str) -> Diagnostic {
    diagnostic(Category::Lint, message).with_rule(rule)
}

#[test]
fn missing_name_resolves_to_add_import() {
    assert_eq!(
        resolve(&ts("TS2304", "Cannot find name 'useState'.")),
        Some(FixStrategy::AddImport {
            symbol: "useState".to_owned()
        })
    );
}

#[test]
fn implicit_any_resolves_to_annotation() {
    assert_eq!(
        resolve(&ts("TS7006", "Parameter 'event' implicitly has an 'any' type.")),
        Some(FixStrategy::AddTypeAnnotation {
            parameter: "event".to_owned()
        })
    );
}

#[test]
fn import_specifiers_pick_strategy_by_shape() {
    let relative = diagnostic(Category::Import, "Module not found: Can't resolve './Header.js'");
    assert_eq!(
        resolve(&relative),
        Some(FixStrategy::FixImportExtension {
            specifier: "./Header.js".to_owned()
        })
    );

    let alias = diagnostic(Category::Import, "Module not found: Can't resolve '@/lib/db'");
    assert_eq!(
        resolve(&alias),
        Some(FixStrategy::FixModuleResolution {
            specifier: "@/lib/db".to_owned()
        })
    );

    let build = diagnostic(Category::Build, "Module not found: Can't resolve '../lib/api.js'");
    assert_eq!(
        resolve(&build),
        Some(FixStrategy::FixImportExtension {
            specifier: "../lib/api.js".to_owned()
        })
    );
    assert_eq!(
        import_specifier("Module not found: Can't resolve 'react-query'").as_deref(),
        Some("react-query")
    );

    let bare = ts("TS2307", "Cannot find module 'lodash/fp' or its corresponding type declarations.");
    assert_eq!(
        resolve(&bare),
        Some(FixStrategy::InstallDependency {
            package: "lodash".to_owned()
        })
    );
}

#[test]
fn package_name_keeps_scope() {
    assert_eq!(package_name("@tanstack/react-query/devtools"), "@tanstack/react-query");
    assert_eq!(package_name("date-fns/format"), "date-fns");
    assert_eq!(package_name("zod"), "zod");
}

#[test]
fn runtime_property_read_resolves_to_null_check() {
    let d = diagnostic(
        Category::Runtime,
        "TypeError: Cannot read properties of undefined (reading 'map')",
    );
    assert_eq!(
        resolve(&d),
        Some(FixStrategy::AddNullCheck {
            property: Some("map".to_owned())
        })
    );
}

#[test]
fn runtime_env_var_resolves_to_rename() {
    let d = diagnostic(
        Category::Runtime,
        "ReferenceError: process.env.API_URL is undefined in the browser",
    );
    assert_eq!(
        resolve(&d),
        Some(FixStrategy::FixEnvVarNaming {
            variable: "API_URL".to_owned()
        })
    );
}

#[test]
fn client_component_build_error_resolves_to_directive() {
    let d = diagnostic(
        Category::Build,
        "You're importing a component that needs useState. It only works in a Client Component",
    );
    assert_eq!(resolve(&d), Some(FixStrategy::AddUseClientDirective));
}

#[test]
fn lint_rules_resolve() {
    assert_eq!(
        resolve(&lint("no-unused-vars", "'helper' is defined but never used.")),
        Some(FixStrategy::RemoveUnusedSymbol {
            symbol: "helper".to_owned()
        })
    );
    assert_eq!(
        resolve(&lint("no-console", "Unexpected console statement.")),
        Some(FixStrategy::RemoveDebugStatement)
    );
    assert_eq!(
        resolve(&lint("semi", "Missing semicolon.")),
        Some(FixStrategy::LintAutoFix {
            rule: "semi".to_owned()
        })
    );
    assert_eq!(resolve(&lint("max-lines", "File has too many lines.")), None);
}

#[test]
fn hook_dependencies_are_parsed() {
    let message = "React Hook useEffect has missing dependencies: 'load' and 'userId'. Either include them or remove the dependency array.";
    assert_eq!(missing_dependencies(message), vec!["load", "userId"]);
    assert_eq!(
        resolve(&lint("react-hooks/exhaustive-deps", message)),
        Some(FixStrategy::FixHookDependencies {
            missing: vec!["load".to_owned(), "userId".to_owned()]
        })
    );
}

#[test]
fn syntax_and_unknown_have_no_strategy() {
    assert_eq!(resolve(&diagnostic(Category::Syntax, "Unexpected token")), None);
    assert_eq!(resolve(&diagnostic(Category::Unknown, "it failed")), None);
    assert_eq!(resolve(&ts("TS9999", "Something new.")), None);
}

#[test]
fn project_file_strategies() {
    assert!(FixStrategy::InstallDependency {
        package: "zod".to_owned()
    }
    .targets_project_file());
    assert!(FixStrategy::FixConfigFile {
        option: "esModuleInterop".to_owned()
    }
    .targets_project_file());
    assert!(!FixStrategy::AddImageAlt.targets_project_file());
}

#[test]
fn strategy_serializes_with_kebab_tag() {
    let value = serde_json::to_value(FixStrategy::AddImport {
        symbol: "Link".to_owned(),
    })
    .expect("strategy should serialize");
    assert_eq!(value["strategy"], "add-import");
    assert_eq!(value["symbol"], "Link");
    assert_eq!(FixStrategy::AddImageAlt.tag(), "add-image-alt");
}
