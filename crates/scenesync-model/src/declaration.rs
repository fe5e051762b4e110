//! Declarations of inputs, filters, scene items and scenes

use crate::kind::{to_settings, Kind};
use crate::{ModelError, Settings, Transform};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// A filter attached to an input or a scene
///
/// `name` is unique within its parent object only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl FilterConfig {
    /// Create an enabled filter with empty settings
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            settings: Settings::new(),
            enabled: true,
            index: None,
        }
    }

    /// Create a filter from typed settings
    ///
    /// # Errors
    /// Returns [`ModelError::Settings`] if the settings are not an object.
    pub fn of_kind<K: Kind>(
        name: impl Into<String>,
        settings: &K::Settings,
    ) -> Result<Self, ModelError> {
        Ok(Self::new(name, K::KIND).with_settings(to_settings::<K>(settings)?))
    }

    /// Replace settings
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Set a single setting
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// With enabled state
    #[inline]
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// With position in the parent's filter chain
    #[inline]
    #[must_use]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Filters in application order
    ///
    /// Filters with an index come first in ascending index order, ties broken
    /// by declaration order. Filters without an index follow in declaration order.
    #[must_use]
    pub fn ordered(filters: &IndexMap<String, FilterConfig>) -> Vec<(&str, &FilterConfig)> {
        let mut out: Vec<_> = filters.iter().map(|(k, f)| (k.as_str(), f)).collect();
        // sort_by_key is stable
        out.sort_by_key(|(_, f)| (f.index.is_none(), f.index));
        out
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.name.is_empty() {
            return Err(ModelError::EmptyName { what: "filter" });
        }
        if self.kind.is_empty() {
            return Err(ModelError::EmptyKind {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// A named source object (browser, capture, media, ...)
///
/// Identity is `name`, which is unique across the whole remote namespace
/// shared by inputs and scenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDeclaration {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub filters: IndexMap<String, FilterConfig>,
}

impl InputDeclaration {
    /// Create an input declaration with empty settings
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            settings: Settings::new(),
            filters: IndexMap::new(),
        }
    }

    /// Create an input from typed settings
    ///
    /// # Errors
    /// Returns [`ModelError::Settings`] if the settings are not an object.
    pub fn of_kind<K: Kind>(
        name: impl Into<String>,
        settings: &K::Settings,
    ) -> Result<Self, ModelError> {
        Ok(Self::new(name, K::KIND).with_settings(to_settings::<K>(settings)?))
    }

    /// Replace settings
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Set a single setting
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Attach a filter under `key`
    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, filter: FilterConfig) -> Self {
        self.filters.insert(key.into(), filter);
        self
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.name.is_empty() {
            return Err(ModelError::EmptyName { what: "input" });
        }
        if self.kind.is_empty() {
            return Err(ModelError::EmptyKind {
                name: self.name.clone(),
            });
        }
        self.filters.values().try_for_each(FilterConfig::validate)
    }
}

/// What a scene item shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDeclaration {
    Input(InputDeclaration),
    Scene(Box<SceneDeclaration>),
}

impl SourceDeclaration {
    /// Remote name of the source
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Input(input) => &input.name,
            Self::Scene(scene) => &scene.name,
        }
    }
}

impl From<InputDeclaration> for SourceDeclaration {
    fn from(value: InputDeclaration) -> Self {
        Self::Input(value)
    }
}

impl From<SceneDeclaration> for SourceDeclaration {
    fn from(value: SceneDeclaration) -> Self {
        Self::Scene(Box::new(value))
    }
}

/// Placement of a source inside a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneItemDeclaration {
    pub source: SourceDeclaration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl SceneItemDeclaration {
    /// Place `source` with no explicit transform or state
    #[must_use]
    pub fn new(source: impl Into<SourceDeclaration>) -> Self {
        Self {
            source: source.into(),
            transform: None,
            enabled: None,
            locked: None,
            index: None,
        }
    }

    /// With transform
    #[inline]
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// With visibility
    #[inline]
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// With lock state
    #[inline]
    #[must_use]
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = Some(locked);
        self
    }

    /// With stacking index
    #[inline]
    #[must_use]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

/// A named scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDeclaration {
    pub name: String,
    #[serde(default)]
    pub items: IndexMap<String, SceneItemDeclaration>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub filters: IndexMap<String, FilterConfig>,
}

impl SceneDeclaration {
    /// Create an empty scene
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: IndexMap::new(),
            filters: IndexMap::new(),
        }
    }

    /// Add an item under `key`
    #[must_use]
    pub fn with_item(mut self, key: impl Into<String>, item: SceneItemDeclaration) -> Self {
        self.items.insert(key.into(), item);
        self
    }

    /// Attach a scene filter under `key`
    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, filter: FilterConfig) -> Self {
        self.filters.insert(key.into(), filter);
        self
    }

    /// Parse a YAML document
    ///
    /// # Errors
    /// Returns [`ModelError::Parse`] on malformed input.
    pub fn from_yaml_str(source: &str) -> Result<Self, ModelError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Parse a JSON document
    ///
    /// # Errors
    /// Returns [`ModelError::Parse`] on malformed input.
    pub fn from_json_str(source: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Check names, kinds and nesting
    ///
    /// # Errors
    /// - [`ModelError::EmptyName`] / [`ModelError::EmptyKind`]
    /// - [`ModelError::SelfNesting`] if the scene contains itself
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut path = Vec::new();
        self.validate_nested(&mut path)
    }

    fn validate_nested(&self, path: &mut Vec<String>) -> Result<(), ModelError> {
        if self.name.is_empty() {
            return Err(ModelError::EmptyName { what: "scene" });
        }
        if path.contains(&self.name) {
            let mut cycle = path.clone();
            cycle.push(self.name.clone());
            return Err(ModelError::SelfNesting {
                name: self.name.clone(),
                path: cycle,
            });
        }
        self.filters.values().try_for_each(FilterConfig::validate)?;

        path.push(self.name.clone());
        for item in self.items.values() {
            match &item.source {
                SourceDeclaration::Input(input) => input.validate()?,
                SourceDeclaration::Scene(scene) => scene.validate_nested(path)?,
            }
        }
        path.pop();
        Ok(())
    }

    /// All input declarations reachable from this scene, depth-first
    #[must_use]
    pub fn inputs(&self) -> Vec<&InputDeclaration> {
        let mut out = Vec::new();
        self.collect(&mut out, &mut Vec::new());
        out
    }

    /// This scene and every nested scene, depth-first
    #[must_use]
    pub fn scenes(&self) -> Vec<&SceneDeclaration> {
        let mut out = Vec::new();
        self.collect(&mut Vec::new(), &mut out);
        out
    }

    fn collect<'a>(
        &'a self,
        inputs: &mut Vec<&'a InputDeclaration>,
        scenes: &mut Vec<&'a SceneDeclaration>,
    ) {
        scenes.push(self);
        for item in self.items.values() {
            match &item.source {
                SourceDeclaration::Input(input) => inputs.push(input),
                SourceDeclaration::Scene(scene) => scene.collect(inputs, scenes),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chat() -> InputDeclaration {
        InputDeclaration::new("Chat", "browser_source").with_setting("url", "https://x")
    }

    #[test]
    fn filters_ordered_by_index_then_declaration() {
        let input = chat()
            .with_filter("c", FilterConfig::new("C", "color"))
            .with_filter("b", FilterConfig::new("B", "crop").with_index(1))
            .with_filter("a", FilterConfig::new("A", "mask").with_index(0))
            .with_filter("d", FilterConfig::new("D", "sharpen").with_index(1));

        let names: Vec<_> = FilterConfig::ordered(&input.filters)
            .into_iter()
            .map(|(_, f)| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B", "D", "C"]);
    }

    #[test]
    fn nested_scene_walk() {
        let overlay = SceneDeclaration::new("Overlay")
            .with_item("chat", SceneItemDeclaration::new(chat()));
        let main = SceneDeclaration::new("Main")
            .with_item("overlay", SceneItemDeclaration::new(overlay))
            .with_item(
                "cam",
                SceneItemDeclaration::new(InputDeclaration::new("Cam", "v4l2_input")),
            );

        let inputs: Vec<_> = main.inputs().iter().map(|i| i.name.as_str()).collect();
        let scenes: Vec<_> = main.scenes().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(inputs, vec!["Chat", "Cam"]);
        assert_eq!(scenes, vec!["Main", "Overlay"]);
    }

    #[test]
    fn self_nesting_rejected() {
        let inner = SceneDeclaration::new("Main");
        let outer = SceneDeclaration::new("Wrapper")
            .with_item("x", SceneItemDeclaration::new(SceneDeclaration::new("Main").with_item(
                "again",
                SceneItemDeclaration::new(SceneDeclaration::new("Wrapper")),
            )));
        assert!(inner.validate().is_ok());
        let err = outer.validate().unwrap_err();
        assert!(matches!(err, ModelError::SelfNesting { ref name, .. } if name == "Wrapper"));
    }

    #[test]
    fn empty_names_rejected() {
        let scene = SceneDeclaration::new("Main")
            .with_item("x", SceneItemDeclaration::new(InputDeclaration::new("", "color_source")));
        assert!(matches!(
            scene.validate(),
            Err(ModelError::EmptyName { what: "input" })
        ));
        assert!(matches!(
            SceneDeclaration::new("").validate(),
            Err(ModelError::EmptyName { what: "scene" })
        ));
    }

    #[test]
    fn yaml_declaration() {
        let yaml = r"
name: Main
items:
  chat:
    source:
      input:
        kind: browser_source
        name: Chat
        settings:
          url: https://x
        filters:
          tint:
            kind: color_filter
            name: Tint
            enabled: false
    transform:
      positionX: 100
    locked: true
  nested:
    source:
      scene:
        name: Sub
";
        let scene = SceneDeclaration::from_yaml_str(yaml).unwrap();
        assert_eq!(scene.items.keys().collect::<Vec<_>>(), vec!["chat", "nested"]);

        let chat = &scene.items["chat"];
        assert_eq!(chat.locked, Some(true));
        assert_eq!(chat.transform.as_ref().and_then(|t| t.position_x), Some(100.0));
        let SourceDeclaration::Input(input) = &chat.source else {
            panic!("expected input source");
        };
        assert_eq!(input.settings["url"], "https://x");
        assert!(!input.filters["tint"].enabled);
        assert_eq!(scene.items["nested"].source.name(), "Sub");
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = SceneDeclaration::from_yaml_str("items: [").unwrap_err();
        assert!(matches!(err, ModelError::Parse(_)));
    }
}
