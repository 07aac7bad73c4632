//! Safety gate between strategy resolution and any file write.

use crate::remediation::strategy::FixStrategy;

/// How strictly the policy treats strategies outside the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyMode {
    /// Use the engine's configured conservative setting.
    Configured,
    /// Skip the allow/deny lists for one attempt. The size limit still applies.
    Forced,
}

/// Allow/deny lists plus a file size limit.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    /// Only allow-listed strategies may run.
    pub conservative: bool,
    /// Files larger than this are never edited.
    pub max_file_size_bytes: u64,
}

impl SafetyPolicy {
    /// Strategies considered safe to apply unattended.
    pub fn is_allowed(strategy: &FixStrategy) -> bool {
        matches!(
            strategy,
            FixStrategy::RemoveUnusedSymbol { .. }
                | FixStrategy::RemoveDebugStatement
                | FixStrategy::AddImport { .. }
                | FixStrategy::FixImportExtension { .. }
                | FixStrategy::LintAutoFix { .. }
        )
    }

    /// Strategies that touch dependencies, project config or behavior.
    pub fn is_denied(strategy: &FixStrategy) -> bool {
        matches!(
            strategy,
            FixStrategy::InstallDependency { .. }
                | FixStrategy::FixConfigFile { .. }
                | FixStrategy::FixRouteHandler
                | FixStrategy::AddImageAlt
                | FixStrategy::FixHookDependencies { .. }
        )
    }

    /// Decide whether `strategy` may edit a file of `file_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns the reason the attempt is blocked.
    pub fn check(
        &self,
        strategy: &FixStrategy,
        file_size: u64,
        mode: SafetyMode,
    ) -> Result<(), String> {
        if file_size > self.max_file_size_bytes {
            return Err(format!(
                "Blocked by safety restriction: file is {file_size} bytes, limit is {}",
                self.max_file_size_bytes
            ));
        }

        if self.conservative && mode == SafetyMode::Configured {
            if Self::is_denied(strategy) {
                return Err(format!(
                    "Blocked by safety restriction: '{}' is not permitted in conservative mode",
                    strategy.tag()
                ));
            }
            if !Self::is_allowed(strategy) {
                return Err(format!(
                    "Blocked by safety restriction: '{}' is not on the conservative allow-list",
                    strategy.tag()
                ));
            }
        }
        Ok(())
    }
}
