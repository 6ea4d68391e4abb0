//! Template lookup.
//!
//! The engine only needs a `load(name)` capability, expressed by
//! [`TemplateSource`]. [`TemplateRegistry`] is the in-memory source built once
//! at startup; [`DirectoryTemplateSource`] reads template files on demand.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::parser::{ConfigurationError, Template};
use crate::patterns::is_identifier;

/// Name of the built-in deck content template.
pub const BUILTIN_TEMPLATE: &str = "investment_banking_deck";

/// Name of the built-in render plan template.
pub const RENDER_PLAN_TEMPLATE: &str = "render_plan";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        BUILTIN_TEMPLATE,
        include_str!("../../templates/investment_banking_deck.yaml"),
    ),
    (
        RENDER_PLAN_TEMPLATE,
        include_str!("../../templates/render_plan.yaml"),
    ),
];

const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Anything that can resolve a template by name.
///
/// Implementations must apply the full template checks (schema, weights,
/// ranges) before returning, so callers never see an invalid template.
pub trait TemplateSource: Send + Sync {
    fn load(&self, name: &str) -> Result<Arc<Template>, ConfigurationError>;
}

/// Immutable set of validated templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Arc<Template>>,
}

impl TemplateRegistry {
    pub fn builder() -> TemplateRegistryBuilder {
        TemplateRegistryBuilder::new()
    }

    /// Registry holding only the built-in templates.
    pub fn with_builtin() -> Result<Self, ConfigurationError> {
        Self::builder().builtin().build()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Template>> {
        self.templates.get(name).cloned()
    }

    /// Registered template names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateSource for TemplateRegistry {
    fn load(&self, name: &str) -> Result<Arc<Template>, ConfigurationError> {
        self.get(name)
            .ok_or_else(|| ConfigurationError::TemplateNotFound(name.to_string()))
    }
}

enum Pending {
    Template(Template),
    Yaml(String),
    File(PathBuf),
    Directory(PathBuf),
    Builtin,
}

/// Builder for [`TemplateRegistry`].
///
/// Sources are parsed when `build()` is called; the first failing source
/// aborts the build.
pub struct TemplateRegistryBuilder {
    pending: Vec<Pending>,
}

impl TemplateRegistryBuilder {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Register a template constructed in code.
    pub fn template(mut self, template: Template) -> Self {
        self.pending.push(Pending::Template(template));
        self
    }

    /// Register a template from YAML source.
    pub fn yaml(mut self, yaml: impl Into<String>) -> Self {
        self.pending.push(Pending::Yaml(yaml.into()));
        self
    }

    /// Register a template file (`.yaml`, `.yml` or `.json`).
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pending.push(Pending::File(path.into()));
        self
    }

    /// Register every template file in a directory.
    pub fn directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.pending.push(Pending::Directory(path.into()));
        self
    }

    /// Register the templates shipped with the crate.
    pub fn builtin(mut self) -> Self {
        self.pending.push(Pending::Builtin);
        self
    }

    pub fn build(self) -> Result<TemplateRegistry, ConfigurationError> {
        let mut templates = BTreeMap::new();

        for pending in self.pending {
            let loaded = match pending {
                Pending::Template(template) => {
                    template.validate()?;
                    vec![template]
                }
                Pending::Yaml(yaml) => vec![Template::from_yaml(&yaml)?],
                Pending::File(path) => vec![Template::from_file(&path)?],
                Pending::Directory(path) => template_files(&path)?
                    .iter()
                    .map(Template::from_file)
                    .collect::<Result<Vec<_>, _>>()?,
                Pending::Builtin => BUILTIN_TEMPLATES
                    .iter()
                    .map(|(_, yaml)| Template::from_yaml(yaml))
                    .collect::<Result<Vec<_>, _>>()?,
            };

            for template in loaded {
                if templates.contains_key(&template.name) {
                    return Err(ConfigurationError::DuplicateTemplate(template.name));
                }
                templates.insert(template.name.clone(), Arc::new(template));
            }
        }

        tracing::debug!(templates = templates.len(), "template registry built");
        Ok(TemplateRegistry { templates })
    }
}

impl Default for TemplateRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Template files in a directory, sorted by file name.
fn template_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigurationError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_template = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| TEMPLATE_EXTENSIONS.contains(&e));
        if path.is_file() && is_template {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Loads `<root>/<name>.{yaml,yml,json}` on every call.
///
/// The file name must match the template's declared name.
#[derive(Debug, Clone)]
pub struct DirectoryTemplateSource {
    root: PathBuf,
}

impl DirectoryTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TemplateSource for DirectoryTemplateSource {
    fn load(&self, name: &str) -> Result<Arc<Template>, ConfigurationError> {
        // Names double as file stems; anything else could escape the root.
        if !is_identifier(name) {
            return Err(ConfigurationError::TemplateNotFound(name.to_string()));
        }

        let path = TEMPLATE_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", name, ext)))
            .find(|p| p.is_file())
            .ok_or_else(|| ConfigurationError::TemplateNotFound(name.to_string()))?;

        let template = Template::from_file(&path)?;
        if template.name != name {
            return Err(ConfigurationError::InvalidTemplate {
                template: name.to_string(),
                reason: format!("{} declares name '{}'", path.display(), template.name),
            });
        }

        tracing::debug!(template = name, path = %path.display(), "template loaded from directory");
        Ok(Arc::new(template))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_SECTION: &str = r#"
name: one_pager
version: "1.0"
sections:
  - name: summary
    weight: 1.0
    fields:
      - { path: headline, type: string }
"#;

    #[test]
    fn test_builtin_template_loads() {
        let registry = TemplateRegistry::with_builtin().unwrap();
        let template = registry.load(BUILTIN_TEMPLATE).unwrap();
        assert_eq!(template.sections.len(), 11);
        assert!((template.total_weight() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_every_builtin_is_registered_by_name() {
        let registry = TemplateRegistry::with_builtin().unwrap();
        assert_eq!(registry.len(), BUILTIN_TEMPLATES.len());
        for (name, _) in BUILTIN_TEMPLATES {
            assert_eq!(registry.load(name).unwrap().name, *name);
        }

        let plan = registry.load(RENDER_PLAN_TEMPLATE).unwrap();
        assert_eq!(plan.sections.len(), 1);
        assert_eq!(plan.sections[0].root, crate::template::RootType::List);
    }

    #[test]
    fn test_missing_template_is_configuration_error() {
        let registry = TemplateRegistry::with_builtin().unwrap();
        let err = registry.load("does_not_exist").unwrap_err();
        assert!(matches!(err, ConfigurationError::TemplateNotFound(ref n) if n == "does_not_exist"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let err = TemplateRegistry::builder()
            .yaml(ONE_SECTION)
            .yaml(ONE_SECTION)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateTemplate(_)));
    }

    #[test]
    fn test_invalid_template_aborts_build() {
        let bad = ONE_SECTION.replace("weight: 1.0", "weight: 0.7");
        let err = TemplateRegistry::builder()
            .builtin()
            .yaml(bad)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidWeights { .. }));
    }

    #[test]
    fn test_names_are_sorted() {
        let registry = TemplateRegistry::builder()
            .yaml(ONE_SECTION)
            .builtin()
            .build()
            .unwrap();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["investment_banking_deck", "one_pager", "render_plan"]);
    }

    #[test]
    fn test_directory_registration() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one_pager.yaml"), ONE_SECTION).unwrap();
        fs::write(dir.path().join("notes.txt"), "not a template").unwrap();

        let registry = TemplateRegistry::builder()
            .directory(dir.path())
            .build()
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("one_pager").is_some());
    }

    #[test]
    fn test_directory_source_loads_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryTemplateSource::new(dir.path());

        assert!(matches!(
            source.load("one_pager"),
            Err(ConfigurationError::TemplateNotFound(_))
        ));

        fs::write(dir.path().join("one_pager.yml"), ONE_SECTION).unwrap();
        assert_eq!(source.load("one_pager").unwrap().name, "one_pager");
    }

    #[test]
    fn test_directory_source_rejects_name_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("other.yaml"), ONE_SECTION).unwrap();
        let source = DirectoryTemplateSource::new(dir.path());
        assert!(matches!(
            source.load("other"),
            Err(ConfigurationError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_directory_source_rejects_path_names() {
        let source = DirectoryTemplateSource::new("/tmp");
        assert!(source.load("../etc/passwd").is_err());
    }
}
