//! Model registry: named lookup of loaded pose models
//!
//! Models are registered under a unique name and handed out as `Arc` handles;
//! the playback engine holds a snapshot of the active set while commanding
//! code keeps its own references. Registries can be filled programmatically,
//! from a YAML manifest, or by scanning a directory for the conventional
//! YOLOv8-Pose filenames.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::yolo::{YoloPoseModel, YoloPoseSize};
use crate::{ModelError, PoseModel, PoseModelConfig};

/// Errors from registry lookup and manifest loading
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Manifest parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Named threshold profile selectable from a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigProfile {
    /// Higher thresholds, fewer detections
    Fast,
    /// Lower thresholds, more detections
    Accurate,
}

impl ConfigProfile {
    #[must_use]
    pub fn config(self) -> PoseModelConfig {
        match self {
            ConfigProfile::Fast => PoseModelConfig::fast(),
            ConfigProfile::Accurate => PoseModelConfig::accurate(),
        }
    }
}

/// One model entry in a YAML manifest
#[derive(Debug, Deserialize)]
pub struct ManifestEntry {
    /// Registry name for the model
    pub name: String,
    /// ONNX file path, relative to the manifest's directory
    pub file: String,
    /// Threshold profile to start from; omitted means the defaults
    #[serde(default)]
    pub profile: Option<ConfigProfile>,
    /// Explicit thresholds and input size; takes precedence over `profile`
    #[serde(default)]
    pub config: Option<PoseModelConfig>,
}

impl ManifestEntry {
    /// Effective configuration: explicit `config`, else the `profile`
    /// preset, else defaults
    #[must_use]
    pub fn resolved_config(&self) -> PoseModelConfig {
        match (&self.config, self.profile) {
            (Some(config), _) => config.clone(),
            (None, Some(profile)) => profile.config(),
            (None, None) => PoseModelConfig::default(),
        }
    }
}

/// YAML manifest listing models to load
#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub models: Vec<ManifestEntry>,
}

impl Manifest {
    /// Parse a manifest from YAML text
    pub fn parse(contents: &str) -> Result<Self, RegistryError> {
        Ok(serde_yaml::from_str(contents)?)
    }
}

/// Registry of loaded pose models by name
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn PoseModel>>,
}

impl ModelRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// Register a model; replaces any existing model with the same name
    pub fn register(&mut self, model: Arc<dyn PoseModel>) {
        let name = model.name().to_string();
        info!("Registering pose model: {}", name);
        if self.models.insert(name.clone(), model).is_some() {
            warn!("Replaced previously registered model: {}", name);
        }
    }

    /// Look up a model by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn PoseModel>> {
        self.models.get(name).cloned()
    }

    /// Registered model names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Resolve a list of names into model handles.
    ///
    /// Fails on the first unknown name so a typo surfaces instead of silently
    /// playing without that model.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn PoseModel>>, RegistryError> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| RegistryError::UnknownModel(name.clone()))
            })
            .collect()
    }

    /// Load all models listed in a YAML manifest file.
    ///
    /// Model file paths are resolved relative to the manifest's directory.
    pub fn from_manifest(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let manifest = Manifest::parse(&contents)?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut registry = Self::new();
        for entry in manifest.models {
            let model_path = base_dir.join(&entry.file);
            let model = YoloPoseModel::load(&entry.name, model_path, entry.resolved_config())?;
            registry.register(Arc::new(model));
        }

        info!("Loaded {} models from manifest {:?}", registry.len(), path);
        Ok(registry)
    }

    /// Scan a directory for conventional YOLOv8-Pose filenames and load every
    /// size variant found, skipping the rest with a warning.
    pub fn load_defaults(model_dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let model_dir = model_dir.as_ref();
        let mut registry = Self::new();

        for size in YoloPoseSize::ALL {
            let path = model_dir.join(size.filename());
            if !path.exists() {
                continue;
            }
            match YoloPoseModel::load_size(size, model_dir, PoseModelConfig::default()) {
                Ok(model) => registry.register(Arc::new(model)),
                Err(e) => warn!("Skipping model {}: {}", size.filename(), e),
            }
        }

        if registry.is_empty() {
            warn!("No models found in {:?}", model_dir);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keypoint;
    use pose_playback_common::Frame;

    struct StubModel {
        name: String,
        config: PoseModelConfig,
    }

    impl StubModel {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                config: PoseModelConfig::default(),
            }
        }
    }

    impl PoseModel for StubModel {
        fn name(&self) -> &str {
            &self.name
        }

        fn config(&self) -> &PoseModelConfig {
            &self.config
        }

        fn process_frame(&self, _frame: &Frame) -> Result<Vec<Keypoint>, ModelError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ModelRegistry::new();
        registry.register(Arc::new(StubModel::new("stub")));

        assert_eq!(registry.len(), 1);
        assert!(registry.get("stub").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ModelRegistry::new();
        registry.register(Arc::new(StubModel::new("stub")));
        registry.register(Arc::new(StubModel::new("stub")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = ModelRegistry::new();
        registry.register(Arc::new(StubModel::new("zeta")));
        registry.register(Arc::new(StubModel::new("alpha")));
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_resolve_unknown_model() {
        let mut registry = ModelRegistry::new();
        registry.register(Arc::new(StubModel::new("stub")));

        let result = registry.resolve(&["stub".to_string(), "nope".to_string()]);
        assert!(matches!(result, Err(RegistryError::UnknownModel(name)) if name == "nope"));
    }

    #[test]
    fn test_resolve_preserves_order() {
        let mut registry = ModelRegistry::new();
        registry.register(Arc::new(StubModel::new("a")));
        registry.register(Arc::new(StubModel::new("b")));

        let models = registry
            .resolve(&["b".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(models[0].name(), "b");
        assert_eq!(models[1].name(), "a");
    }

    #[test]
    fn test_manifest_parse() {
        let yaml = r"
models:
  - name: yolov8n-pose
    file: yolov8n-pose.onnx
  - name: yolov8s-strict
    file: yolov8s-pose.onnx
    config:
      confidence_threshold: 0.5
      max_detections: 20
";
        let manifest = Manifest::parse(yaml).unwrap();
        assert_eq!(manifest.models.len(), 2);
        assert_eq!(manifest.models[0].name, "yolov8n-pose");
        // Defaults fill unset config fields
        assert_eq!(manifest.models[0].resolved_config().confidence_threshold, 0.25);
        let strict = manifest.models[1].resolved_config();
        assert_eq!(strict.confidence_threshold, 0.5);
        assert_eq!(strict.max_detections, 20);
        assert_eq!(strict.input_size, 640);
    }

    #[test]
    fn test_manifest_profiles() {
        let yaml = r"
models:
  - name: quick
    file: yolov8n-pose.onnx
    profile: fast
  - name: thorough
    file: yolov8l-pose.onnx
    profile: accurate
  - name: tuned
    file: yolov8s-pose.onnx
    profile: fast
    config:
      confidence_threshold: 0.33
";
        let manifest = Manifest::parse(yaml).unwrap();

        let quick = manifest.models[0].resolved_config();
        assert_eq!(quick.confidence_threshold, PoseModelConfig::fast().confidence_threshold);
        assert_eq!(quick.max_detections, 50);

        let thorough = manifest.models[1].resolved_config();
        assert_eq!(thorough.max_detections, PoseModelConfig::accurate().max_detections);

        // Explicit config wins over the profile
        let tuned = manifest.models[2].resolved_config();
        assert_eq!(tuned.confidence_threshold, 0.33);
        assert_eq!(tuned.max_detections, PoseModelConfig::default().max_detections);
    }

    #[test]
    fn test_manifest_parse_invalid() {
        assert!(Manifest::parse("models: 12").is_err());
    }
}
