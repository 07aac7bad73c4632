//! Safety-gated remediation engine.
//!
//! One attempt runs: resolve strategy, safety check, plan the edit, back up,
//! write, validate, then commit or roll back. Every outcome is a [`FixResult`];
//! nothing here returns an error to the caller.

pub mod backup;
pub mod lint;
pub mod safety;
pub mod strategy;
pub mod transforms;
pub mod validate;

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::{RemediationConfig, ToolsConfig};
use crate::diagnostic::Diagnostic;

use self::backup::BackupStore;
use self::lint::{EslintCli, LintTool};
use self::safety::{SafetyMode, SafetyPolicy};
use self::strategy::FixStrategy;
use self::validate::Validator;

/// Extensions tried when resolving an import specifier to a file.
const SOURCE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".json"];

/// What a successful fix changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixChange {
    /// Strategy tag.
    pub strategy: String,
    /// Strategy parameters and location.
    pub details: serde_json::Value,
}

/// Outcome of one fix attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixResult {
    /// The attempt completed and validation passed.
    pub success: bool,
    /// A change was written and kept.
    pub applied: bool,
    /// File the attempt targeted, when one was resolved.
    pub file: Option<PathBuf>,
    /// Reason for failure.
    pub error: Option<String>,
    /// The change, on success.
    pub change: Option<FixChange>,
    /// Follow-up for the developer.
    pub recommendation: Option<String>,
}

impl FixResult {
    /// A failed attempt with `reason`.
    pub fn failed(file: Option<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            applied: false,
            file,
            error: Some(reason.into()),
            change: None,
            recommendation: None,
        }
    }

    fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

/// A planned change, computed before anything is written.
enum Plan {
    /// Replace the target file with new content.
    Write(String),
    /// Install a package with the package manager.
    Install(String),
}

/// Applies fix strategies to files under a project root.
pub struct RemediationEngine {
    project_root: PathBuf,
    policy: SafetyPolicy,
    backups: Option<BackupStore>,
    validator: Option<Validator>,
    lint: Arc<dyn LintTool>,
    package_manager: String,
    tool_timeout: Duration,
}

impl std::fmt::Debug for RemediationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationEngine")
            .field("project_root", &self.project_root)
            .field("policy", &self.policy)
            .field("backups", &self.backups)
            .field("package_manager", &self.package_manager)
            .finish_non_exhaustive()
    }
}

impl RemediationEngine {
    /// Build an engine for `project_root` using ESLint as the lint tool.
    ///
    /// A relative `project_root` is made absolute against the current
    /// directory so containment checks never compare against an empty root.
    pub fn new(project_root: PathBuf, remediation: &RemediationConfig, tools: &ToolsConfig) -> Self {
        let project_root = absolute_root(project_root);
        let tool_timeout = Duration::from_secs(tools.tool_timeout_secs);
        let lint: Arc<dyn LintTool> = Arc::new(EslintCli::new(
            tools.lint_program.clone(),
            tools.lint_args.clone(),
            project_root.clone(),
            tool_timeout,
        ));
        let backups = remediation
            .backups_enabled
            .then(|| BackupStore::new(project_root.join(&remediation.backup_dir)));
        let validator = remediation
            .validate
            .then(|| Validator::new(Arc::clone(&lint), remediation.max_file_size_bytes));

        Self {
            project_root,
            policy: SafetyPolicy {
                conservative: remediation.conservative,
                max_file_size_bytes: remediation.max_file_size_bytes,
            },
            backups,
            validator,
            lint,
            package_manager: tools.package_manager.clone(),
            tool_timeout,
        }
    }

    /// Replace the lint tool used for native fixes and validation.
    #[must_use]
    pub fn with_lint_tool(mut self, lint: Arc<dyn LintTool>) -> Self {
        if self.validator.is_some() {
            self.validator = Some(Validator::new(
                Arc::clone(&lint),
                self.policy.max_file_size_bytes,
            ));
        }
        self.lint = lint;
        self
    }

    /// The configured safety policy.
    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    /// The backup store, when backups are enabled.
    pub fn backups(&self) -> Option<&BackupStore> {
        self.backups.as_ref()
    }

    /// Attempt a fix under the configured safety policy.
    pub async fn apply_fix(&self, diagnostic: &Diagnostic) -> FixResult {
        self.attempt(diagnostic, SafetyMode::Configured).await
    }

    /// Attempt a fix once with conservative mode off. The configured mode is
    /// left unchanged.
    pub async fn apply_fix_forced(&self, diagnostic: &Diagnostic) -> FixResult {
        self.attempt(diagnostic, SafetyMode::Forced).await
    }

    async fn attempt(&self, diagnostic: &Diagnostic, mode: SafetyMode) -> FixResult {
        let Some(strategy) = strategy::resolve(diagnostic) else {
            debug!(id = %diagnostic.id, category = %diagnostic.category, "no fix strategy");
            return FixResult::failed(None, "No automatic fix available");
        };

        let target = match self.target_path(diagnostic, &strategy) {
            Ok(path) => path,
            Err(reason) => return FixResult::failed(None, reason),
        };
        let file = Some(target.clone());

        let size = match tokio::fs::metadata(&target).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                return FixResult::failed(file, format!("Cannot read {}: {e}", target.display()));
            }
        };
        if let Err(reason) = self.policy.check(&strategy, size, mode) {
            info!(strategy = strategy.tag(), file = %target.display(), "fix blocked by safety policy");
            return FixResult::failed(file, reason).with_recommendation(strategy.description());
        }

        let original = match tokio::fs::read_to_string(&target).await {
            Ok(content) => content,
            Err(e) => {
                return FixResult::failed(file, format!("Cannot read {}: {e}", target.display()));
            }
        };

        let plan = match self.plan(&strategy, diagnostic, &target, &original).await {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                return FixResult::failed(file, "Nothing to fix")
                    .with_recommendation(strategy.description());
            }
            Err(reason) => {
                return FixResult::failed(file, reason).with_recommendation(strategy.description());
            }
        };

        if let Some(store) = &self.backups {
            if let Err(e) = store
                .create(&target, strategy.tag(), &strategy.description())
                .await
            {
                error!(file = %target.display(), error = %e, "backup failed, aborting fix");
                return FixResult::failed(file, format!("Backup failed, fix aborted: {e}"));
            }
        }

        let written = match plan {
            Plan::Write(content) => match tokio::fs::write(&target, &content).await {
                Ok(()) => Ok(content),
                Err(e) => Err(format!("Cannot write {}: {e}", target.display())),
            },
            Plan::Install(package) => self.install(&package, &target).await,
        };
        let after = match written {
            Ok(after) => after,
            Err(reason) => {
                self.rollback(&target, &original).await;
                return FixResult::failed(file, reason);
            }
        };

        if let Some(validator) = &self.validator {
            if let Err(reason) = validator.validate(&target, &original, &after).await {
                warn!(file = %target.display(), reason = %reason, "fix failed validation, rolling back");
                self.rollback(&target, &original).await;
                return FixResult::failed(file, reason).with_recommendation(strategy.description());
            }
        }

        info!(strategy = strategy.tag(), file = %target.display(), "fix applied");
        let mut details = serde_json::to_value(&strategy).unwrap_or(serde_json::Value::Null);
        if let Some(map) = details.as_object_mut() {
            map.insert("line".to_owned(), diagnostic.location.line.into());
            map.insert("description".to_owned(), strategy.description().into());
        }
        let recommendation = match &strategy {
            FixStrategy::FixEnvVarNaming { variable } => Some(format!(
                "Rename {variable} to NEXT_PUBLIC_{variable} in your .env files"
            )),
            FixStrategy::InstallDependency { package } => {
                Some(format!("Restart the dev server to pick up '{package}'"))
            }
            _ => None,
        };
        FixResult {
            success: true,
            applied: true,
            file,
            error: None,
            change: Some(FixChange {
                strategy: strategy.tag().to_owned(),
                details,
            }),
            recommendation,
        }
    }

    /// File a strategy edits: a project file, or the diagnostic's file.
    fn target_path(&self, diagnostic: &Diagnostic, strategy: &FixStrategy) -> Result<PathBuf, String> {
        if strategy.targets_project_file() {
            let file = if matches!(strategy, FixStrategy::InstallDependency { .. }) {
                "package.json"
            } else {
                "tsconfig.json"
            };
            return Ok(self.project_root.join(file));
        }
        if !self.project_root.is_absolute() {
            return Err(format!(
                "project root '{}' is not absolute",
                self.project_root.display()
            ));
        }
        if !diagnostic.location.has_file() {
            return Err("Diagnostic has no file location".to_owned());
        }
        let requested = Path::new(&diagnostic.location.file);
        let resolved = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.project_root.join(requested)
        };
        let normalized = normalize_path(&resolved);
        if !normalized.starts_with(normalize_path(&self.project_root)) {
            return Err(format!(
                "'{}' is outside the project root",
                diagnostic.location.file
            ));
        }
        Ok(normalized)
    }

    async fn plan(
        &self,
        strategy: &FixStrategy,
        diagnostic: &Diagnostic,
        target: &Path,
        content: &str,
    ) -> Result<Option<Plan>, String> {
        let line = diagnostic.location.line;
        let edited = match strategy {
            FixStrategy::LintAutoFix { .. } => match self.lint.fix(target).await {
                Ok(Some(fixed)) if fixed != content => Some(fixed),
                Ok(_) => None,
                Err(e) => return Err(format!("Lint fix failed: {e}")),
            },
            FixStrategy::InstallDependency { package } => {
                if !is_valid_package_name(package) {
                    return Err(format!("Refusing to install invalid package name '{package}'"));
                }
                return Ok(Some(Plan::Install(package.clone())));
            }
            FixStrategy::FixConfigFile { option } => transforms::enable_compiler_option(content, option)
                .map_err(|e| format!("tsconfig.json is not plain JSON: {e}"))?,
            FixStrategy::AddImport { symbol } => transforms::add_import(content, symbol),
            FixStrategy::AddTypeAnnotation { parameter } => {
                transforms::add_type_annotation(content, line, parameter)
            }
            FixStrategy::AddReturnType => transforms::add_return_type(content, line),
            FixStrategy::FixImportExtension { specifier } => {
                let dir = target.parent().unwrap_or(self.project_root.as_path());
                resolve_relative_import(dir, specifier)
                    .and_then(|new| transforms::replace_import_specifier(content, specifier, &new))
            }
            FixStrategy::FixModuleResolution { specifier } => {
                let dir = target.parent().unwrap_or(self.project_root.as_path());
                resolve_alias_import(&self.project_root, dir, specifier)
                    .and_then(|new| transforms::replace_import_specifier(content, specifier, &new))
            }
            FixStrategy::FixPropertyAccess { property } => {
                transforms::fix_property_access(content, line, property)
            }
            FixStrategy::AddTypeAssertion { target_type } => {
                transforms::add_type_assertion(content, line, target_type)
            }
            FixStrategy::AddNullCheck { property } => {
                transforms::add_null_check(content, line, property.as_deref())
            }
            FixStrategy::RemoveUnusedSymbol { symbol } => {
                transforms::remove_unused_symbol(content, line, symbol)
            }
            FixStrategy::AddMissingProperty { property } => {
                transforms::add_missing_property(content, line, property)
            }
            FixStrategy::AddUseClientDirective => transforms::add_use_client_directive(content),
            FixStrategy::FixRouteHandler => transforms::fix_route_handler(content),
            FixStrategy::AddImageAlt => transforms::add_image_alt(content, line),
            FixStrategy::FixHookDependencies { missing } => {
                transforms::fix_hook_dependencies(content, line, missing)
            }
            FixStrategy::AddIterationKey => transforms::add_iteration_key(content, line),
            FixStrategy::RemoveDebugStatement => transforms::remove_debug_statement(content, line),
            FixStrategy::FixEnvVarNaming { variable } => {
                transforms::fix_env_var_naming(content, variable)
            }
            FixStrategy::FixStrictOptional { property } => {
                transforms::fix_strict_optional(content, property)
            }
        };
        Ok(edited.map(Plan::Write))
    }

    /// Run the package manager and return the resulting `package.json`.
    async fn install(&self, package: &str, manifest: &Path) -> Result<String, String> {
        let verb = if self.package_manager == "npm" { "install" } else { "add" };
        let mut cmd = Command::new(&self.package_manager);
        cmd.args([verb, package])
            .current_dir(&self.project_root)
            .kill_on_drop(true);

        info!(package, manager = %self.package_manager, "installing dependency");
        let output = tokio::time::timeout(self.tool_timeout, cmd.output())
            .await
            .map_err(|_| {
                format!(
                    "{} {verb} {package} timed out after {}s",
                    self.package_manager,
                    self.tool_timeout.as_secs()
                )
            })?
            .map_err(|e| format!("failed to run {}: {e}", self.package_manager))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} {verb} {package} failed: {}",
                self.package_manager,
                stderr.trim()
            ));
        }
        tokio::fs::read_to_string(manifest)
            .await
            .map_err(|e| format!("Cannot read {}: {e}", manifest.display()))
    }

    /// Restore `target` from its latest backup, or from `original` when
    /// backups are off or the restore fails.
    async fn rollback(&self, target: &Path, original: &str) {
        if let Some(store) = &self.backups {
            match store.restore_latest(target).await {
                Ok(record) => {
                    info!(id = %record.id, file = %target.display(), "rolled back from backup");
                    return;
                }
                Err(e) => {
                    error!(file = %target.display(), error = %e, "backup restore failed, using in-memory copy");
                }
            }
        }
        if let Err(e) = tokio::fs::write(target, original).await {
            error!(file = %target.display(), error = %e, "rollback write failed");
        }
    }
}

static PACKAGE_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:@[a-z0-9][a-z0-9._-]*/)?[a-z0-9][a-z0-9._-]*$").ok()
});

/// Whether `name` is a plain npm package name, with no version or flags.
pub fn is_valid_package_name(name: &str) -> bool {
    name.len() <= 214 && PACKAGE_NAME.as_ref().is_some_and(|r| r.is_match(name))
}

/// Normalize a path by resolving `.` and `..` components without filesystem access.
///
/// `..` never climbs above the filesystem root.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            Component::CurDir => {}
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// Make `root` absolute and normalized, falling back to it unchanged.
fn absolute_root(root: PathBuf) -> PathBuf {
    match std::path::absolute(&root) {
        Ok(abs) => normalize_path(&abs),
        Err(e) => {
            warn!(root = %root.display(), error = %e, "could not make project root absolute");
            root
        }
    }
}

/// Relative specifier from `from_dir` to `to`, always starting with `.`.
fn relative_specifier(from_dir: &Path, to: &Path) -> String {
    let from: Vec<Component<'_>> = from_dir.components().collect();
    let target: Vec<Component<'_>> = to.components().collect();
    let common = from
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = from[common..].iter().map(|_| "..".to_owned()).collect();
    parts.extend(
        target[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    let joined = parts.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{joined}")
    }
}

fn strip_source_extension(specifier: &str) -> (&str, bool) {
    SOURCE_EXTENSIONS
        .iter()
        .find_map(|ext| specifier.strip_suffix(ext))
        .map_or((specifier, false), |base| (base, true))
}

fn exists_with_extension(base: &Path) -> bool {
    SOURCE_EXTENSIONS.iter().any(|ext| {
        let mut candidate = base.as_os_str().to_owned();
        candidate.push(ext);
        Path::new(&candidate).is_file()
    }) || SOURCE_EXTENSIONS
        .iter()
        .any(|ext| base.join(format!("index{ext}")).is_file())
}

/// Find a working form of a relative import that does not resolve.
///
/// Drops a wrong extension when an extensionless import resolves, and fixes
/// the casing of the last path segment.
pub fn resolve_relative_import(dir: &Path, specifier: &str) -> Option<String> {
    let (base, had_extension) = strip_source_extension(specifier);
    if had_extension && exists_with_extension(&dir.join(base)) {
        return Some(base.to_owned());
    }

    let (parent_spec, stem) = match base.rsplit_once('/') {
        Some((parent, stem)) => (parent, stem),
        None => (".", base),
    };
    let parent = dir.join(parent_spec);
    let entries = std::fs::read_dir(&parent).ok()?;
    let wanted = stem.to_lowercase();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let entry_stem = strip_source_extension(&name).0.to_owned();
        if entry_stem != stem && entry_stem.to_lowercase() == wanted {
            return Some(format!("{parent_spec}/{entry_stem}"));
        }
    }
    None
}

/// Rewrite a `@/` or `~/` alias import into a relative path that resolves.
pub fn resolve_alias_import(project_root: &Path, dir: &Path, specifier: &str) -> Option<String> {
    let rest = specifier
        .strip_prefix("@/")
        .or_else(|| specifier.strip_prefix("~/"))?;
    let (rest, _) = strip_source_extension(rest);
    [project_root.to_path_buf(), project_root.join("src")]
        .into_iter()
        .map(|root| root.join(rest))
        .find(|candidate| exists_with_extension(candidate))
        .map(|found| relative_specifier(&normalize_path(dir), &normalize_path(&found)))
}
