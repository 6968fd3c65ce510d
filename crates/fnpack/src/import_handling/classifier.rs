//! Import classification
//!
//! Maps a dotted module name to stdlib, third-party or local using an
//! injected [`StdlibRegistry`].

use crate::{stdlib_detection::StdlibRegistry, types::ModuleKind};

/// Leading-dot count and first path segment of a module name
#[derive(Debug, PartialEq, Eq)]
struct ModuleDescriptor<'a> {
    leading_dots: usize,
    top_level: &'a str,
}

impl<'a> ModuleDescriptor<'a> {
    fn from_module_name(name: &'a str) -> Self {
        let trimmed = name.trim_start_matches('.');
        Self {
            leading_dots: name.len() - trimmed.len(),
            top_level: trimmed.split('.').next().unwrap_or_default().trim(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportClassifier {
    registry: StdlibRegistry,
}

impl ImportClassifier {
    pub fn new(registry: StdlibRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StdlibRegistry {
        &self.registry
    }

    /// Classify a module name
    ///
    /// Relative names are local regardless of the registry; anything the
    /// registry does not know (including the empty name) is third-party.
    pub fn classify(&self, module_name: &str) -> ModuleKind {
        let descriptor = ModuleDescriptor::from_module_name(module_name);
        if descriptor.leading_dots > 0 {
            return ModuleKind::Local;
        }
        if self.registry.contains(descriptor.top_level) {
            ModuleKind::StandardLibrary
        } else {
            ModuleKind::ThirdParty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor() {
        assert_eq!(
            ModuleDescriptor::from_module_name("..pkg.sub"),
            ModuleDescriptor {
                leading_dots: 2,
                top_level: "pkg"
            }
        );
        assert_eq!(
            ModuleDescriptor::from_module_name("os.path"),
            ModuleDescriptor {
                leading_dots: 0,
                top_level: "os"
            }
        );
    }

    #[test]
    fn test_classification_with_ruff_registry() {
        let classifier = ImportClassifier::new(StdlibRegistry::for_python_version(12));

        assert_eq!(classifier.classify("os"), ModuleKind::StandardLibrary);
        assert_eq!(classifier.classify("os.path"), ModuleKind::StandardLibrary);
        assert_eq!(
            classifier.classify("urllib.parse"),
            ModuleKind::StandardLibrary
        );
        assert_eq!(
            classifier.classify("__future__"),
            ModuleKind::StandardLibrary
        );
        assert_eq!(classifier.classify("boto3"), ModuleKind::ThirdParty);
        assert_eq!(classifier.classify("aiohttp.web"), ModuleKind::ThirdParty);
        assert_eq!(classifier.classify(".shared"), ModuleKind::Local);
        assert_eq!(classifier.classify("."), ModuleKind::Local);
        assert_eq!(classifier.classify(""), ModuleKind::ThirdParty);
    }

    #[test]
    fn test_every_registry_name_is_stdlib() {
        let registry = StdlibRegistry::from_names(["alpha", "beta", "gamma"]);
        let classifier = ImportClassifier::new(registry.clone());

        for name in registry.explicit_names() {
            assert_eq!(classifier.classify(name), ModuleKind::StandardLibrary);
        }
        assert_eq!(classifier.classify("os"), ModuleKind::ThirdParty);
    }

    #[test]
    fn test_leading_dot_is_local_regardless_of_registry() {
        let classifier = ImportClassifier::new(StdlibRegistry::from_names(["os"]));
        assert_eq!(classifier.classify(".os"), ModuleKind::Local);
        assert_eq!(classifier.classify("...os.path"), ModuleKind::Local);
    }
}
