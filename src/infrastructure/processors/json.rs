use crate::analysis::{identifier_from, is_reserved};
use crate::core::models::ModuleId;
use crate::core::plugin::{ModuleSource, Stage, StageContext, StageOutput, StagePhase};
use crate::utils::{BuildError, Result};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::Path;

/// Turns `.json` files into ES modules with one named export per
/// identifier-safe top-level key and a default export of the whole object
pub struct JsonStage;

impl JsonStage {
    pub fn new() -> Self {
        Self
    }

    pub fn to_module(&self, id: &ModuleId, code: &str) -> Result<String> {
        let value: Value =
            serde_json::from_str(code).map_err(|e| BuildError::transform(self.name(), id, e.to_string()))?;

        let object = match &value {
            Value::Object(object) => object,
            other => return Ok(format!("export default {};\n", other)),
        };

        let mut out = String::new();
        let mut members = Vec::with_capacity(object.len());
        for (key, entry) in object {
            if is_identifier(key) {
                let _ = writeln!(out, "export const {} = {};", key, entry);
                members.push(format!("\t{}", key));
            } else {
                members.push(format!("\t{}: {}", Value::String(key.clone()), entry));
            }
        }
        let _ = writeln!(out, "\nvar json = {{\n{}\n}};\n\nexport default json;", members.join(",\n"));
        Ok(out)
    }
}

impl Default for JsonStage {
    fn default() -> Self {
        Self::new()
    }
}

fn is_identifier(key: &str) -> bool {
    !key.is_empty() && identifier_from(key) == key && !is_reserved(key) && key != "json"
}

impl Stage for JsonStage {
    fn name(&self) -> &str {
        "json"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Module
    }

    fn applies_to(&self, id: &ModuleId, _project_root: &Path) -> bool {
        id.extension() == Some("json")
    }

    fn transform_module(&self, source: ModuleSource, _context: &StageContext) -> Result<StageOutput> {
        let code = self.to_module(&source.id, &source.code)?;
        Ok(StageOutput::unchanged(ModuleSource { id: source.id, code }))
    }
}
