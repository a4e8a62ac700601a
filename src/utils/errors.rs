use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Where in the pipeline an error surfaced
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub target: Option<String>,
    pub module: Option<PathBuf>,
    pub code_snippet: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn with_module(mut self, module: PathBuf) -> Self {
        self.module = Some(module);
        self
    }

    pub fn with_snippet(mut self, snippet: String) -> Self {
        self.code_snippet = Some(snippet);
        self
    }
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not resolve '{specifier}' from {importer}")]
    UnresolvedImport { specifier: String, importer: String },

    #[error("[{stage}] failed to transform {module}: {message}")]
    TransformFailure {
        stage: String,
        module: String,
        message: String,
    },

    #[error("Output file '{file_name}' would be produced by both {first} and {second}")]
    ChunkNamingConflict {
        file_name: String,
        first: String,
        second: String,
    },

    #[error("Could not collect license of {package}: {message}")]
    LicenseCollection { package: String, message: String },

    #[error("({code}) {message}")]
    DiagnosticRaised {
        code: String,
        message: String,
        module: Option<String>,
    },

    #[error("Target '{target}' failed while {state}: {source}")]
    TargetFailure {
        target: String,
        state: String,
        #[source]
        source: Box<BuildError>,
    },

    #[error("{0}")]
    Other(String),
}

impl BuildError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn unresolved(specifier: &str, importer: impl fmt::Display) -> Self {
        Self::UnresolvedImport {
            specifier: specifier.to_string(),
            importer: importer.to_string(),
        }
    }

    pub fn transform(stage: &str, module: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::TransformFailure {
            stage: stage.to_string(),
            module: module.to_string(),
            message: message.into(),
        }
    }

    pub fn license(package: &str, message: impl Into<String>) -> Self {
        Self::LicenseCollection {
            package: package.to_string(),
            message: message.into(),
        }
    }

    /// Wrap an error with the target it belongs to and the state it failed in
    pub fn in_target(self, target: &str, state: impl fmt::Display) -> Self {
        match self {
            already @ BuildError::TargetFailure { .. } => already,
            other => BuildError::TargetFailure {
                target: target.to_string(),
                state: state.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, unwrapping target context
    pub fn root_cause(&self) -> &BuildError {
        match self {
            BuildError::TargetFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Format error with enhanced context display
    pub fn format_detailed(&self) -> String {
        match self {
            BuildError::TargetFailure {
                target,
                state,
                source,
            } => {
                let context = ErrorContext::new().with_target(target);
                let label = format!("Target failed while {}", state);
                self.format_error_with_context(&label, &source.format_detailed(), &Some(context))
            }
            BuildError::TransformFailure {
                stage,
                module,
                message,
            } => {
                let context = ErrorContext::new()
                    .with_module(PathBuf::from(module))
                    .with_snippet(message.clone());
                let label = format!("Transform Error [{}]", stage);
                self.format_error_with_context(&label, "stage rejected module", &Some(context))
            }
            BuildError::DiagnosticRaised {
                code,
                message,
                module,
            } => {
                let mut context = ErrorContext::new();
                if let Some(module) = module {
                    context = context.with_module(PathBuf::from(module));
                }
                self.format_error_with_context(code, message, &Some(context))
            }
            _ => format!("❌ {}", self),
        }
    }

    fn format_error_with_context(
        &self,
        error_type: &str,
        message: &str,
        context: &Option<ErrorContext>,
    ) -> String {
        let mut output = format!("❌ {}: {}", error_type, message);

        if let Some(ctx) = context {
            if let Some(ref target) = ctx.target {
                output.push_str(&format!("\n🎯 Target: {}", target));
            }

            if let Some(ref module) = ctx.module {
                output.push_str(&format!("\n📁 Module: {}", module.display()));
            }

            if let Some(ref snippet) = ctx.code_snippet {
                output.push_str("\n📝 Details:");
                for line in snippet.lines() {
                    output.push_str(&format!("\n     │ {}", line));
                }
            }
        }

        output
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;

impl From<glob::PatternError> for BuildError {
    fn from(err: glob::PatternError) -> Self {
        BuildError::config(format!("Invalid glob pattern: {}", err))
    }
}

impl From<tokio::task::JoinError> for BuildError {
    fn from(err: tokio::task::JoinError) -> Self {
        BuildError::Other(format!("Build task aborted: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_failure_keeps_root_cause() {
        let err = BuildError::unresolved("./missing", "src/main.ts").in_target("browser", "Transforming");

        assert!(matches!(
            err.root_cause(),
            BuildError::UnresolvedImport { specifier, .. } if specifier == "./missing"
        ));
        assert!(err.to_string().contains("browser"));
        assert!(err.to_string().contains("Transforming"));
    }

    #[test]
    fn test_in_target_does_not_double_wrap() {
        let err = BuildError::config("bad").in_target("node", "Resolving");
        let err = err.in_target("other", "Chunking");

        match err {
            BuildError::TargetFailure { target, .. } => assert_eq!(target, "node"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_format_detailed_transform_failure() {
        let err = BuildError::transform("typescript", "/p/src/a.ts", "Unexpected token\nat 3:4");
        let text = err.format_detailed();

        assert!(text.contains("Transform Error [typescript]"));
        assert!(text.contains("/p/src/a.ts"));
        assert!(text.contains("│ at 3:4"));
    }
}
