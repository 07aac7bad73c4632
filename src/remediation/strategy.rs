//! Fix strategies and the mapping from diagnostics to strategies.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::diagnostic::{Category, Diagnostic};

/// A bounded text-transformation recipe for one diagnostic.
///
/// Recomputed from the diagnostic on every attempt and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum FixStrategy {
    /// Import a symbol that is used but not in scope.
    AddImport {
        /// Symbol to import.
        symbol: String,
    },
    /// Annotate a parameter that implicitly has type `any`.
    AddTypeAnnotation {
        /// Parameter name.
        parameter: String,
    },
    /// Annotate the return type of the function on the reported line.
    AddReturnType,
    /// Install a missing package with the package manager.
    InstallDependency {
        /// Package name.
        package: String,
    },
    /// Point a relative import at a file that exists.
    FixImportExtension {
        /// Import specifier as written.
        specifier: String,
    },
    /// Enable a compiler option in `tsconfig.json`.
    FixConfigFile {
        /// `compilerOptions` key to enable.
        option: String,
    },
    /// Access a property the checker does not know about.
    FixPropertyAccess {
        /// Property name.
        property: String,
    },
    /// Assert the expression on the reported line to the expected type.
    AddTypeAssertion {
        /// Type the value should be asserted to.
        target_type: String,
    },
    /// Replace a member access with optional chaining.
    AddNullCheck {
        /// Property being read, when known.
        property: Option<String>,
    },
    /// Remove an unused import or declaration.
    RemoveUnusedSymbol {
        /// Unused symbol.
        symbol: String,
    },
    /// Supply a required property that is missing.
    AddMissingProperty {
        /// Property name.
        property: String,
    },
    /// Rewrite a path-alias import into a resolvable relative path.
    FixModuleResolution {
        /// Import specifier as written.
        specifier: String,
    },
    /// Mark the module as a client component.
    AddUseClientDirective,
    /// Convert a pages-style handler into an app-router route handler.
    FixRouteHandler,
    /// Add an `alt` attribute to image elements.
    AddImageAlt,
    /// Add missing entries to a hook dependency array.
    FixHookDependencies {
        /// Dependencies to add.
        missing: Vec<String>,
    },
    /// Add a `key` prop to an element produced inside `.map(...)`.
    AddIterationKey,
    /// Remove a `console.*` or `debugger` statement.
    RemoveDebugStatement,
    /// Prefix an environment variable read in client code with `NEXT_PUBLIC_`.
    FixEnvVarNaming {
        /// Variable name as written.
        variable: String,
    },
    /// Allow `undefined` on an optional property under strict optional types.
    FixStrictOptional {
        /// Property name.
        property: String,
    },
    /// Run the lint tool's own fixer.
    LintAutoFix {
        /// Rule being fixed.
        rule: String,
    },
}

impl FixStrategy {
    /// Stable kebab-case tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::AddImport { .. } => "add-import",
            Self::AddTypeAnnotation { .. } => "add-type-annotation",
            Self::AddReturnType => "add-return-type",
            Self::InstallDependency { .. } => "install-dependency",
            Self::FixImportExtension { .. } => "fix-import-extension",
            Self::FixConfigFile { .. } => "fix-config-file",
            Self::FixPropertyAccess { .. } => "fix-property-access",
            Self::AddTypeAssertion { .. } => "add-type-assertion",
            Self::AddNullCheck { .. } => "add-null-check",
            Self::RemoveUnusedSymbol { .. } => "remove-unused-symbol",
            Self::AddMissingProperty { .. } => "add-missing-property",
            Self::FixModuleResolution { .. } => "fix-module-resolution",
            Self::AddUseClientDirective => "add-use-client-directive",
            Self::FixRouteHandler => "fix-route-handler",
            Self::AddImageAlt => "add-image-alt",
            Self::FixHookDependencies { .. } => "fix-hook-dependencies",
            Self::AddIterationKey => "add-iteration-key",
            Self::RemoveDebugStatement => "remove-debug-statement",
            Self::FixEnvVarNaming { .. } => "fix-env-var-naming",
            Self::FixStrictOptional { .. } => "fix-strict-optional",
            Self::LintAutoFix { .. } => "lint-auto-fix",
        }
    }

    /// The symbol, package or specifier the strategy targets, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::AddImport { symbol } | Self::RemoveUnusedSymbol { symbol } => Some(symbol),
            Self::AddTypeAnnotation { parameter } => Some(parameter),
            Self::InstallDependency { package } => Some(package),
            Self::FixImportExtension { specifier } | Self::FixModuleResolution { specifier } => {
                Some(specifier)
            }
            Self::FixConfigFile { option } => Some(option),
            Self::FixPropertyAccess { property }
            | Self::AddMissingProperty { property }
            | Self::FixStrictOptional { property } => Some(property),
            Self::AddTypeAssertion { target_type } => Some(target_type),
            Self::AddNullCheck { property } => property.as_deref(),
            Self::FixEnvVarNaming { variable } => Some(variable),
            Self::LintAutoFix { rule } => Some(rule),
            Self::AddReturnType
            | Self::AddUseClientDirective
            | Self::FixRouteHandler
            | Self::AddImageAlt
            | Self::FixHookDependencies { .. }
            | Self::AddIterationKey
            | Self::RemoveDebugStatement => None,
        }
    }

    /// Human description of what the strategy will do.
    pub fn description(&self) -> String {
        match self {
            Self::AddImport { symbol } => format!("Add an import for '{symbol}'"),
            Self::AddTypeAnnotation { parameter } => {
                format!("Add a type annotation to parameter '{parameter}'")
            }
            Self::AddReturnType => "Add an explicit return type".to_owned(),
            Self::InstallDependency { package } => format!("Install missing package '{package}'"),
            Self::FixImportExtension { specifier } => {
                format!("Fix the path or extension of import '{specifier}'")
            }
            Self::FixConfigFile { option } => format!("Enable '{option}' in tsconfig.json"),
            Self::FixPropertyAccess { property } => {
                format!("Relax the access to property '{property}'")
            }
            Self::AddTypeAssertion { target_type } => {
                format!("Assert the value to type '{target_type}'")
            }
            Self::AddNullCheck { property: Some(p) } => {
                format!("Use optional chaining when reading '{p}'")
            }
            Self::AddNullCheck { property: None } => "Use optional chaining".to_owned(),
            Self::RemoveUnusedSymbol { symbol } => format!("Remove unused symbol '{symbol}'"),
            Self::AddMissingProperty { property } => {
                format!("Add missing property '{property}'")
            }
            Self::FixModuleResolution { specifier } => {
                format!("Rewrite import '{specifier}' to a resolvable path")
            }
            Self::AddUseClientDirective => "Add the 'use client' directive".to_owned(),
            Self::FixRouteHandler => "Convert the handler to a route handler".to_owned(),
            Self::AddImageAlt => "Add alt text to image elements".to_owned(),
            Self::FixHookDependencies { missing } => {
                format!("Add hook dependencies: {}", missing.join(", "))
            }
            Self::AddIterationKey => "Add a key prop to the iterated element".to_owned(),
            Self::RemoveDebugStatement => "Remove the debug statement".to_owned(),
            Self::FixEnvVarNaming { variable } => {
                format!("Rename '{variable}' to 'NEXT_PUBLIC_{variable}'")
            }
            Self::FixStrictOptional { property } => {
                format!("Allow undefined on optional property '{property}'")
            }
            Self::LintAutoFix { rule } => format!("Apply the linter's fix for '{rule}'"),
        }
    }

    /// Whether the strategy edits a project file rather than the diagnostic's file.
    pub fn targets_project_file(&self) -> bool {
        matches!(
            self,
            Self::InstallDependency { .. } | Self::FixConfigFile { .. }
        )
    }
}

/// Lint rules the lint tool can fix on its own.
const NATIVE_LINT_FIXES: &[&str] = &[
    "semi",
    "quotes",
    "prefer-const",
    "no-extra-semi",
    "comma-dangle",
    "indent",
    "no-var",
    "eol-last",
    "no-trailing-spaces",
    "object-shorthand",
];

fn lazy(pattern: &str) -> Option<Regex> {
    Regex::new(pattern).ok()
}

static FIRST_QUOTED: LazyLock<Option<Regex>> = LazyLock::new(|| lazy(r"'([^']+)'"));
static MODULE_SPECIFIER: LazyLock<Option<Regex>> =
    LazyLock::new(|| lazy(r"(?:resolve|module) '([^']+)'"));
static TO_TYPE: LazyLock<Option<Regex>> = LazyLock::new(|| lazy(r"to type '([^']+)'"));
static READING: LazyLock<Option<Regex>> = LazyLock::new(|| lazy(r"\(reading '([^']+)'\)"));
static NOT_DEFINED: LazyLock<Option<Regex>> =
    LazyLock::new(|| lazy(r"\b([A-Za-z_$][\w$]*) is not defined"));
static PROPERTY: LazyLock<Option<Regex>> = LazyLock::new(|| lazy(r"Property '([^']+)'"));
static ENV_VAR: LazyLock<Option<Regex>> =
    LazyLock::new(|| lazy(r"process\.env\.([A-Z][A-Z0-9_]*)"));
static DEPS: LazyLock<Option<Regex>> = LazyLock::new(|| lazy(r"missing dependenc(?:y|ies): (.+?)\. "));
static CONFIG_FLAG: LazyLock<Option<Regex>> = LazyLock::new(|| lazy(r"'--?(\w+)'"));

fn capture(regex: &LazyLock<Option<Regex>>, text: &str) -> Option<String> {
    regex
        .as_ref()?
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().to_owned())
}

/// Specifier quoted in an import diagnostic.
///
/// Prefers the quote after `resolve` or `module`, since webpack messages
/// carry an apostrophe in "Can't" ahead of the specifier.
pub fn import_specifier(message: &str) -> Option<String> {
    capture(&MODULE_SPECIFIER, message).or_else(|| capture(&FIRST_QUOTED, message))
}

fn import_strategy(specifier: String) -> FixStrategy {
    if specifier.starts_with("./") || specifier.starts_with("../") {
        FixStrategy::FixImportExtension { specifier }
    } else if specifier.starts_with("@/") || specifier.starts_with("~/") {
        FixStrategy::FixModuleResolution { specifier }
    } else {
        FixStrategy::InstallDependency {
            package: package_name(&specifier),
        }
    }
}

/// Package that provides a bare specifier (`lodash/fp` -> `lodash`).
pub fn package_name(specifier: &str) -> String {
    let mut parts = specifier.split('/');
    match (parts.next(), parts.next()) {
        (Some(scope), Some(name)) if scope.starts_with('@') => format!("{scope}/{name}"),
        (Some(name), _) => name.to_owned(),
        (None, _) => specifier.to_owned(),
    }
}

/// Pick a strategy for a diagnostic, or `None` when nothing applies.
pub fn resolve(diagnostic: &Diagnostic) -> Option<FixStrategy> {
    let message = diagnostic.message.as_str();
    match diagnostic.category {
        Category::TypeScript => resolve_type_error(diagnostic.code.as_deref(), message),
        Category::Lint => resolve_lint(diagnostic.rule.as_deref(), message),
        Category::Import => import_specifier(message).map(import_strategy),
        Category::Build => resolve_build(message),
        Category::Runtime => resolve_runtime(message),
        Category::Syntax | Category::Unknown => None,
    }
}

fn resolve_type_error(code: Option<&str>, message: &str) -> Option<FixStrategy> {
    let quoted = || capture(&FIRST_QUOTED, message);
    match code? {
        "TS2304" | "TS2552" => Some(FixStrategy::AddImport { symbol: quoted()? }),
        "TS7006" | "TS7031" => Some(FixStrategy::AddTypeAnnotation {
            parameter: quoted()?,
        }),
        "TS7010" | "TS7030" => Some(FixStrategy::AddReturnType),
        "TS2307" => import_specifier(message).map(import_strategy),
        "TS2792" => Some(FixStrategy::FixModuleResolution {
            specifier: quoted()?,
        }),
        "TS2732" | "TS1259" => Some(FixStrategy::FixConfigFile {
            option: capture(&CONFIG_FLAG, message).unwrap_or_else(|| {
                if message.contains("esModuleInterop") {
                    "esModuleInterop".to_owned()
                } else {
                    "resolveJsonModule".to_owned()
                }
            }),
        }),
        "TS2339" => Some(FixStrategy::FixPropertyAccess {
            property: capture(&PROPERTY, message)?,
        }),
        "TS2322" | "TS2345" => Some(FixStrategy::AddTypeAssertion {
            target_type: capture(&TO_TYPE, message)?,
        }),
        "TS2531" | "TS2532" | "TS18047" | "TS18048" => Some(FixStrategy::AddNullCheck {
            property: None,
        }),
        "TS6133" | "TS6192" | "TS6196" => Some(FixStrategy::RemoveUnusedSymbol {
            symbol: quoted()?,
        }),
        "TS2741" => Some(FixStrategy::AddMissingProperty {
            property: capture(&PROPERTY, message)?,
        }),
        "TS2375" | "TS2379" | "TS2412" => Some(FixStrategy::FixStrictOptional {
            property: capture(&PROPERTY, message)?,
        }),
        _ => None,
    }
}

fn resolve_lint(rule: Option<&str>, message: &str) -> Option<FixStrategy> {
    let rule = rule?;
    match rule {
        "no-unused-vars" | "@typescript-eslint/no-unused-vars" => {
            Some(FixStrategy::RemoveUnusedSymbol {
                symbol: capture(&FIRST_QUOTED, message)?,
            })
        }
        "no-console" | "no-debugger" => Some(FixStrategy::RemoveDebugStatement),
        "react/jsx-key" => Some(FixStrategy::AddIterationKey),
        "jsx-a11y/alt-text" | "@next/next/no-img-element" => Some(FixStrategy::AddImageAlt),
        "react-hooks/exhaustive-deps" => {
            let missing = missing_dependencies(message);
            if missing.is_empty() {
                None
            } else {
                Some(FixStrategy::FixHookDependencies { missing })
            }
        }
        "no-undef" => capture(&FIRST_QUOTED, message).map(|symbol| FixStrategy::AddImport { symbol }),
        r if NATIVE_LINT_FIXES.contains(&r) => Some(FixStrategy::LintAutoFix {
            rule: r.to_owned(),
        }),
        _ => None,
    }
}

/// Dependency names listed in a hook-dependency lint message.
///
/// Understands both `missing dependency: 'a'` and
/// `missing dependencies: 'a', 'b', and 'c'`.
pub fn missing_dependencies(message: &str) -> Vec<String> {
    let Some(list) = capture(&DEPS, message).or_else(|| {
        message
            .split_once("missing dependenc")
            .map(|(_, rest)| rest.to_owned())
    }) else {
        return Vec::new();
    };
    let Some(names) = FIRST_QUOTED.as_ref() else {
        return Vec::new();
    };
    names
        .captures_iter(&list)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_owned()))
        .collect()
}

fn resolve_build(message: &str) -> Option<FixStrategy> {
    if message.contains("only works in a Client Component")
        || message.contains("You're importing a component that needs")
    {
        return Some(FixStrategy::AddUseClientDirective);
    }
    if message.contains("Module not found") || message.contains("Cannot find module") {
        return import_specifier(message).map(import_strategy);
    }
    None
}

fn resolve_runtime(message: &str) -> Option<FixStrategy> {
    if message.contains("only works in a Client Component")
        || message.contains("is not a function or its return value is not iterable")
    {
        return Some(FixStrategy::AddUseClientDirective);
    }
    if message.contains("No HTTP methods exported")
        || message.contains("does not export a default")
        || message.contains("res.status is not a function")
    {
        return Some(FixStrategy::FixRouteHandler);
    }
    if let Some(property) = capture(&READING, message) {
        return Some(FixStrategy::AddNullCheck {
            property: Some(property),
        });
    }
    if let Some(variable) = capture(&ENV_VAR, message) {
        if !variable.starts_with("NEXT_PUBLIC_") {
            return Some(FixStrategy::FixEnvVarNaming { variable });
        }
    }
    if let Some(symbol) = capture(&NOT_DEFINED, message) {
        return Some(FixStrategy::AddImport { symbol });
    }
    None
}
