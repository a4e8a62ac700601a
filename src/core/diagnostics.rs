use crate::core::models::WarningPolicy;
use crate::utils::{BuildError, Logger, Result};
use parking_lot::Mutex;
use std::fmt;

pub const THIS_IS_UNDEFINED: &str = "THIS_IS_UNDEFINED";
pub const MISSING_EXPORT: &str = "MISSING_EXPORT";
pub const EMPTY_BUNDLE: &str = "EMPTY_BUNDLE";
pub const UNRESOLVED_REQUIRE: &str = "UNRESOLVED_REQUIRE";
pub const LICENSE_COLLECTION: &str = "LICENSE_COLLECTION";

/// A build warning attributed to a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    pub module: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "({}) {}: {}", self.code, module, self.message),
            None => write!(f, "({}) {}", self.code, self.message),
        }
    }
}

/// Per-target diagnostic sink applying the warning policy
pub struct Diagnostics {
    target: String,
    policy: WarningPolicy,
    collected: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new(target: &str, policy: WarningPolicy) -> Self {
        Self {
            target: target.to_string(),
            policy,
            collected: Mutex::new(Vec::new()),
        }
    }

    /// Records a diagnostic. Under the fatal policy it is returned as an error
    /// and must abort the target.
    pub fn raise(&self, code: &'static str, message: impl Into<String>, module: Option<String>) -> Result<()> {
        let diagnostic = Diagnostic {
            code,
            message: message.into(),
            module,
        };
        self.collected.lock().push(diagnostic.clone());

        match self.policy {
            WarningPolicy::Fatal => {
                Logger::error(&format!(
                    "[{}] {} (warnings need to be resolved before this target can be emitted)",
                    self.target, diagnostic
                ));
                Err(BuildError::DiagnosticRaised {
                    code: diagnostic.code.to_string(),
                    message: diagnostic.message,
                    module: diagnostic.module,
                })
            }
            WarningPolicy::Advisory => {
                Logger::warn(&format!("[{}] {}", self.target, diagnostic));
                Ok(())
            }
        }
    }

    /// Non-blocking notice; recorded and logged regardless of policy
    pub fn notice(&self, code: &'static str, message: impl Into<String>, module: Option<String>) {
        let diagnostic = Diagnostic {
            code,
            message: message.into(),
            module,
        };
        Logger::warn(&format!("[{}] {}", self.target, diagnostic));
        self.collected.lock().push(diagnostic);
    }

    pub fn collected(&self) -> Vec<Diagnostic> {
        self.collected.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_policy_turns_warning_into_error() {
        let diagnostics = Diagnostics::new("node", WarningPolicy::Fatal);
        let err = diagnostics
            .raise(MISSING_EXPORT, "'x' is not exported", Some("a.js".to_string()))
            .unwrap_err();

        assert!(matches!(err, BuildError::DiagnosticRaised { ref code, .. } if code == MISSING_EXPORT));
        assert_eq!(diagnostics.collected().len(), 1);
    }

    #[test]
    fn test_advisory_policy_collects() {
        let diagnostics = Diagnostics::new("browser", WarningPolicy::Advisory);
        diagnostics.raise(EMPTY_BUNDLE, "empty", None).unwrap();
        diagnostics.notice(LICENSE_COLLECTION, "no license file", None);

        let codes: Vec<_> = diagnostics.collected().iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![EMPTY_BUNDLE, LICENSE_COLLECTION]);
    }
}
