use super::common::IncludeFilter;
use crate::core::models::{ModuleId, TextOptions};
use crate::core::plugin::{ModuleSource, Stage, StageContext, StageOutput, StagePhase};
use crate::utils::Result;
use serde_json::Value;
use std::path::Path;

/// Inlines matching text files as `export default "<escaped contents>"`
pub struct TextAssetStage {
    include: IncludeFilter,
}

impl TextAssetStage {
    pub fn new(options: &TextOptions) -> Result<Self> {
        Ok(Self {
            include: IncludeFilter::new(&options.include)?,
        })
    }

    pub fn to_module(code: &str) -> String {
        format!("export default {};\n", Value::String(code.to_string()))
    }
}

impl Stage for TextAssetStage {
    fn name(&self) -> &str {
        "string"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Module
    }

    fn applies_to(&self, id: &ModuleId, project_root: &Path) -> bool {
        self.include.matches(id, project_root)
    }

    fn transform_module(&self, source: ModuleSource, _context: &StageContext) -> Result<StageOutput> {
        let code = Self::to_module(&source.code);
        Ok(StageOutput::unchanged(ModuleSource { id: source.id, code }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_escaped() {
        assert_eq!(
            TextAssetStage::to_module("Usage: \"tandem\"\n"),
            "export default \"Usage: \\\"tandem\\\"\\n\";\n"
        );
    }

    #[test]
    fn test_include_globs() {
        let stage = TextAssetStage::new(&TextOptions::default()).unwrap();
        let root = Path::new("/p");

        assert!(stage.applies_to(&ModuleId::from_path(Path::new("/p/cli/help.md")), root));
        assert!(!stage.applies_to(&ModuleId::from_path(Path::new("/p/cli/help.ts")), root));
    }
}
