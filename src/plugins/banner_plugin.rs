// Banner Plugin: fills the banner template put on top of every chunk

use crate::infrastructure::node_resolver::PackageJson;
use crate::utils::Logger;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Placeholders filled from the project package.json
static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(name|version|license|homepage)\}").unwrap()
});

/// Renders the configured banner of an output
///
/// # Example
/// ```
/// use tandem::plugins::BannerPlugin;
///
/// let plugin = BannerPlugin::new("/*! {name} v{version} */");
/// assert_eq!(plugin.render(None), "/*!  v */");
/// ```
pub struct BannerPlugin {
    template: String,
}

impl BannerPlugin {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Banner with every placeholder replaced; unknown values become empty
    pub fn render(&self, project: Option<&PackageJson>) -> String {
        PLACEHOLDER_REGEX
            .replace_all(&self.template, |caps: &Captures| {
                let value = project.and_then(|p| match &caps[1] {
                    "name" => p.name.clone(),
                    "version" => p.version.clone(),
                    "license" => p.license_id(),
                    _ => p.homepage.clone(),
                });
                value.unwrap_or_else(|| {
                    Logger::debug(&format!("banner placeholder {} has no value", &caps[0]));
                    String::new()
                })
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_placeholders_are_filled() {
        let project = PackageJson {
            name: Some("tandem-demo".to_string()),
            version: Some("2.1.0".to_string()),
            license: Some(serde_json::Value::String("MIT".to_string())),
            homepage: Some("https://example.org".to_string()),
            ..PackageJson::default()
        };
        let plugin = BannerPlugin::new("/*\n  @license\n  {name} v{version}\n  {homepage}\n  Released under the {license} License.\n*/");

        assert_eq!(
            plugin.render(Some(&project)),
            "/*\n  @license\n  tandem-demo v2.1.0\n  https://example.org\n  Released under the MIT License.\n*/"
        );
    }

    #[test]
    fn test_banner_without_placeholders_is_unchanged() {
        let plugin = BannerPlugin::new("/* Banner */");
        assert_eq!(plugin.render(None), "/* Banner */");
    }
}
