//! Configuration
//!
//! Settings are layered: built-in defaults, the user's `fnpack.toml`, the
//! project's `fnpack.toml`, `FNPACK_*` environment variables and finally
//! command line flags. Each layer only overrides the keys it sets.

use std::{
    fs,
    path::{Path, PathBuf},
};

use etcetera::{BaseStrategy, choose_base_strategy};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    code_generator::{DEFAULT_RENAME_PREFIX, DeploymentFileGenerator},
    import_handling::{ImportClassifier, ImportParser},
    markers::{MarkerScanner, MarkerSyntax},
    module_registry::ModuleAnalyzer,
    stdlib_detection::{StdlibRegistry, parse_python_version},
    sync::{CompiledRule, SyncRule, TransferBlockSynchronizer},
    types::FxIndexMap,
    util::content_hash,
    validation::MarkerValidator,
};

pub const CONFIG_FILE_NAME: &str = "fnpack.toml";
pub const DEFAULT_SHARED_CONFIG_MODULE: &str = "shared_configuration";
pub const DEFAULT_TARGET_VERSION: &str = "py312";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },

    #[error("`{key}` is not set; pass it on the command line or in fnpack.toml")]
    Missing { key: &'static str },

    #[error("`{key}` is not a directory: {}", .path.display())]
    NotADirectory { key: &'static str, path: PathBuf },

    #[error("unsupported target version '{value}'; expected e.g. `py312` or `3.12`")]
    TargetVersion { value: String },

    #[error("invalid value '{value}' for {name}")]
    Environment { name: String, value: String },

    #[error("invalid sync rule `{pattern}` for '{function}': {source}")]
    InvalidRule {
        function: String,
        pattern: String,
        source: regex::Error,
    },
}

/// Resolved configuration for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub source_dir: Option<PathBuf>,
    pub deployment_dir: Option<PathBuf>,
    /// Explicit subset of functions to process; empty means all
    pub functions: Vec<String>,
    /// Modules in the source directory that are not functions
    pub exclude: Vec<String>,
    pub strict_orphan_checking: bool,
    pub orphans_as_errors: bool,
    pub force_rebuild: bool,
    pub verbose: bool,
    pub target_version: String,
    /// Extra names classified as standard library
    pub known_stdlib: Vec<String>,
    pub shared_config_module: String,
    pub rename_prefix: String,
    pub markers: MarkerSyntax,
    /// Transfer block name to the functions expected to carry it
    pub transfer_blocks: FxIndexMap<String, Vec<String>>,
    /// Substitution rules per target function, in application order
    pub sync_rules: FxIndexMap<String, Vec<SyncRule>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: None,
            deployment_dir: None,
            functions: Vec::new(),
            exclude: Vec::new(),
            strict_orphan_checking: false,
            orphans_as_errors: false,
            force_rebuild: false,
            verbose: false,
            target_version: DEFAULT_TARGET_VERSION.to_owned(),
            known_stdlib: Vec::new(),
            shared_config_module: DEFAULT_SHARED_CONFIG_MODULE.to_owned(),
            rename_prefix: DEFAULT_RENAME_PREFIX.to_owned(),
            markers: MarkerSyntax::default(),
            transfer_blocks: FxIndexMap::default(),
            sync_rules: FxIndexMap::default(),
        }
    }
}

/// One configuration file; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub source_dir: Option<PathBuf>,
    pub deployment_dir: Option<PathBuf>,
    pub functions: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub strict_orphan_checking: Option<bool>,
    pub orphans_as_errors: Option<bool>,
    pub force_rebuild: Option<bool>,
    pub verbose: Option<bool>,
    pub target_version: Option<String>,
    pub known_stdlib: Option<Vec<String>>,
    pub shared_config_module: Option<String>,
    pub rename_prefix: Option<String>,
    pub markers: Option<MarkerSyntax>,
    pub transfer_blocks: FxIndexMap<String, Vec<String>>,
    pub sync_rules: FxIndexMap<String, Vec<SyncRule>>,
}

impl ConfigFile {
    /// Read a file; relative paths in it are taken relative to its directory
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        if let Some(base) = path.parent() {
            file.source_dir = file.source_dir.map(|dir| base.join(dir));
            file.deployment_dir = file.deployment_dir.map(|dir| base.join(dir));
        }
        Ok(file)
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Project config file to use instead of `<source_dir>/fnpack.toml`
    pub config_file: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub deployment_dir: Option<PathBuf>,
    pub functions: Vec<String>,
    pub strict_orphan_checking: Option<bool>,
    pub force_rebuild: Option<bool>,
    pub verbose: Option<bool>,
    pub target_version: Option<String>,
}

/// Finds and layers configuration sources
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    user_config: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader reading the user config from the platform config directory
    pub fn new() -> Self {
        Self {
            user_config: user_config_path(),
        }
    }

    /// Loader with an explicit user config file, or none
    pub fn with_user_config(user_config: Option<PathBuf>) -> Self {
        Self { user_config }
    }

    /// Layer every source into a validated [`Config`]
    ///
    /// `env` looks up environment variables; the binary passes
    /// `|name| std::env::var(name).ok()`.
    pub fn load(
        &self,
        overrides: &ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = self.user_config.as_deref().filter(|path| path.is_file()) {
            debug!("loading user configuration from {}", path.display());
            config.merge(ConfigFile::read(path)?);
        }

        let project = match &overrides.config_file {
            Some(path) => Some(path.clone()),
            None => overrides
                .source_dir
                .clone()
                .or_else(|| env("FNPACK_SOURCE_DIR").map(PathBuf::from))
                .or_else(|| config.source_dir.clone())
                .map(|dir| dir.join(CONFIG_FILE_NAME))
                .filter(|path| path.is_file()),
        };
        if let Some(path) = project {
            debug!("loading project configuration from {}", path.display());
            config.merge(ConfigFile::read(&path)?);
        }

        config.apply_env(env)?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }
}

/// `<user config dir>/fnpack/fnpack.toml`
pub fn user_config_path() -> Option<PathBuf> {
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("fnpack").join(CONFIG_FILE_NAME))
}

impl Config {
    /// Overlay the keys a file sets
    pub fn merge(&mut self, file: ConfigFile) {
        if let Some(dir) = file.source_dir {
            self.source_dir = Some(dir);
        }
        if let Some(dir) = file.deployment_dir {
            self.deployment_dir = Some(dir);
        }
        if let Some(functions) = file.functions {
            self.functions = functions;
        }
        if let Some(exclude) = file.exclude {
            self.exclude = exclude;
        }
        if let Some(strict) = file.strict_orphan_checking {
            self.strict_orphan_checking = strict;
        }
        if let Some(as_errors) = file.orphans_as_errors {
            self.orphans_as_errors = as_errors;
        }
        if let Some(force) = file.force_rebuild {
            self.force_rebuild = force;
        }
        if let Some(verbose) = file.verbose {
            self.verbose = verbose;
        }
        if let Some(version) = file.target_version {
            self.target_version = version;
        }
        if let Some(names) = file.known_stdlib {
            self.known_stdlib = names;
        }
        if let Some(module) = file.shared_config_module {
            self.shared_config_module = module;
        }
        if let Some(prefix) = file.rename_prefix {
            self.rename_prefix = prefix;
        }
        if let Some(markers) = file.markers {
            self.markers = markers;
        }
        self.transfer_blocks.extend(file.transfer_blocks);
        self.sync_rules.extend(file.sync_rules);
    }

    /// Apply `FNPACK_*` variables
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(dir) = env("FNPACK_SOURCE_DIR") {
            self.source_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = env("FNPACK_DEPLOYMENT_DIR") {
            self.deployment_dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = env("FNPACK_STRICT_ORPHAN_CHECKING") {
            self.strict_orphan_checking = parse_flag("FNPACK_STRICT_ORPHAN_CHECKING", &value)?;
        }
        if let Some(value) = env("FNPACK_FORCE_REBUILD") {
            self.force_rebuild = parse_flag("FNPACK_FORCE_REBUILD", &value)?;
        }
        if let Some(version) = env("FNPACK_TARGET_VERSION") {
            self.target_version = version;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(dir) = &overrides.source_dir {
            self.source_dir = Some(dir.clone());
        }
        if let Some(dir) = &overrides.deployment_dir {
            self.deployment_dir = Some(dir.clone());
        }
        if !overrides.functions.is_empty() {
            self.functions.clone_from(&overrides.functions);
        }
        if let Some(strict) = overrides.strict_orphan_checking {
            self.strict_orphan_checking = strict;
        }
        if let Some(force) = overrides.force_rebuild {
            self.force_rebuild = force;
        }
        if let Some(verbose) = overrides.verbose {
            self.verbose = verbose;
        }
        if let Some(version) = &overrides.target_version {
            self.target_version.clone_from(version);
        }
    }

    /// Check everything that would otherwise fail halfway through a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        let source_dir = self.source_dir()?;
        if !source_dir.is_dir() {
            return Err(ConfigError::NotADirectory {
                key: "source_dir",
                path: source_dir.to_path_buf(),
            });
        }
        // `sync` runs without a deployment directory; `build` and `check` ask for it later
        if let Some(deployment_dir) = &self.deployment_dir
            && deployment_dir.exists()
            && !deployment_dir.is_dir()
        {
            return Err(ConfigError::NotADirectory {
                key: "deployment_dir",
                path: deployment_dir.clone(),
            });
        }
        self.python_version()?;
        self.compiled_rules()?;
        Ok(())
    }

    pub fn source_dir(&self) -> Result<&Path, ConfigError> {
        self.source_dir
            .as_deref()
            .ok_or(ConfigError::Missing { key: "source_dir" })
    }

    pub fn deployment_dir(&self) -> Result<&Path, ConfigError> {
        self.deployment_dir.as_deref().ok_or(ConfigError::Missing {
            key: "deployment_dir",
        })
    }

    pub fn python_version(&self) -> Result<u8, ConfigError> {
        parse_python_version(&self.target_version).ok_or_else(|| ConfigError::TargetVersion {
            value: self.target_version.clone(),
        })
    }

    pub fn stdlib_registry(&self) -> Result<StdlibRegistry, ConfigError> {
        Ok(StdlibRegistry::for_python_version(self.python_version()?)
            .with_extra_names(self.known_stdlib.iter().cloned()))
    }

    pub fn import_parser(&self) -> Result<ImportParser, ConfigError> {
        Ok(ImportParser::new(
            ImportClassifier::new(self.stdlib_registry()?),
            self.markers.clone(),
        ))
    }

    pub fn marker_scanner(&self) -> MarkerScanner {
        MarkerScanner::new(self.markers.clone())
            .with_orphan_checking(self.strict_orphan_checking, self.orphans_as_errors)
            .with_transfer_names(self.transfer_blocks.keys().cloned())
    }

    pub fn module_analyzer(&self) -> Result<ModuleAnalyzer, ConfigError> {
        Ok(ModuleAnalyzer::new(self.marker_scanner(), self.import_parser()?))
    }

    pub fn compiled_rules(&self) -> Result<FxIndexMap<String, Vec<CompiledRule>>, ConfigError> {
        self.sync_rules
            .iter()
            .map(|(function, rules)| {
                let compiled = rules
                    .iter()
                    .map(|rule| {
                        rule.compile().map_err(|source| ConfigError::InvalidRule {
                            function: function.clone(),
                            pattern: rule.pattern.clone(),
                            source,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((function.clone(), compiled))
            })
            .collect()
    }

    pub fn synchronizer(&self) -> Result<TransferBlockSynchronizer, ConfigError> {
        Ok(TransferBlockSynchronizer::new(
            self.compiled_rules()?,
            self.transfer_blocks.clone(),
        ))
    }

    pub fn generator(&self) -> Result<DeploymentFileGenerator, ConfigError> {
        Ok(
            DeploymentFileGenerator::new(self.import_parser()?, self.shared_config_module.as_str())
                .with_rename_prefix(self.rename_prefix.as_str()),
        )
    }

    pub fn validator(&self) -> MarkerValidator {
        MarkerValidator::new(self.markers.clone())
    }

    /// Hash of every setting that changes generated text
    pub fn generation_fingerprint(&self) -> String {
        let markers = serde_json::to_string(&self.markers).unwrap_or_default();
        let known_stdlib = self.known_stdlib.join(",");
        content_hash([
            self.target_version.as_str(),
            known_stdlib.as_str(),
            self.shared_config_module.as_str(),
            self.rename_prefix.as_str(),
            markers.as_str(),
        ])
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Environment {
            name: name.to_owned(),
            value: value.to_owned(),
        }),
    }
}
