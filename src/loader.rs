use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub use crate::types::{ModuleRef, Props, RemoteDefinition, SharedDefinition, SlotDefinition};

/// Remote, shared library and slot definitions for one host.
#[derive(Debug, Clone, Default)]
pub struct FederationConfig {
    pub remotes: Vec<RemoteDefinition>,
    pub shared: Vec<SharedDefinition>,
    pub slots: Vec<SlotDefinition>,
}

impl FederationConfig {
    /// Create a new ConfigBuilder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Parse definitions from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let definitions = parse_toml(content)?;
        validate(definitions)
    }

    pub fn get_remote(&self, name: &str) -> Option<&RemoteDefinition> {
        self.remotes.iter().find(|def| def.name == name)
    }
}

/// Builder for constructing a FederationConfig
pub struct ConfigBuilder {
    paths: Vec<PathBuf>,
}

impl ConfigBuilder {
    fn new() -> Self {
        Self { paths: Vec::new() }
    }

    /// Load definitions from a file (.toml or .json entry) or an oci:// reference
    pub fn load_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Build the FederationConfig from all loaded definitions
    pub fn build(self) -> Result<FederationConfig> {
        load_definitions(&self.paths)
    }
}

/// Load remote, shared and slot definitions from configuration files.
pub fn load_definitions(
    definition_files: &[PathBuf], // .toml and .json files
) -> Result<FederationConfig> {
    let mut toml_files = Vec::new();
    let mut entry_files = Vec::new();

    for path in definition_files {
        let path_str = path.to_string_lossy();

        // Handle OCI URIs as remote entries
        if path_str.starts_with("oci://") {
            entry_files.push(path.clone());
        } else if let Some(extension) = path.extension().and_then(|s| s.to_str()) {
            match extension {
                "json" => entry_files.push(path.clone()),
                "toml" => toml_files.push(path.clone()),
                _ => return Err(anyhow::anyhow!("Unsupported file type: {}", path.display())),
            }
        } else {
            return Err(anyhow::anyhow!(
                "File without extension: {}",
                path.display()
            ));
        }
    }

    let mut definitions = Definitions::default();
    for file in &toml_files {
        let content = fs::read_to_string(file)?;
        definitions.extend(
            parse_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", file.display()))?,
        );
    }
    definitions
        .remotes
        .extend(create_implicit_remote_definitions(&entry_files)?);

    validate(definitions)
}

#[derive(Default)]
struct Definitions {
    remotes: Vec<RemoteDefinition>,
    shared: Vec<SharedDefinition>,
    slots: Vec<SlotDefinition>,
}

impl Definitions {
    fn extend(&mut self, other: Definitions) {
        self.remotes.extend(other.remotes);
        self.shared.extend(other.shared);
        self.slots.extend(other.slots);
    }
}

fn validate(definitions: Definitions) -> Result<FederationConfig> {
    // Collision detection - ensure unique names across all definitions
    let mut all_names = HashSet::new();
    let names = definitions
        .remotes
        .iter()
        .map(|def| &def.name)
        .chain(definitions.shared.iter().map(|def| &def.name))
        .chain(definitions.slots.iter().map(|def| &def.name));
    for name in names {
        if !all_names.insert(name) {
            return Err(anyhow::anyhow!("Duplicate definition name: '{name}'"));
        }
    }

    for def in &definitions.shared {
        let version = semver::Version::parse(&def.version).map_err(|e| {
            anyhow::anyhow!(
                "Shared library '{}' has invalid version '{}': {e}",
                def.name,
                def.version
            )
        })?;
        if let Some(range) = &def.required_version {
            let required = semver::VersionReq::parse(range).map_err(|e| {
                anyhow::anyhow!(
                    "Shared library '{}' has invalid required_version '{range}': {e}",
                    def.name
                )
            })?;
            if !required.matches(&version) {
                return Err(anyhow::anyhow!(
                    "Shared library '{}' provides {version}, which its own required_version '{range}' excludes",
                    def.name
                ));
            }
        }
    }

    let remote_names: HashSet<_> = definitions.remotes.iter().map(|def| &def.name).collect();
    for slot in &definitions.slots {
        if !remote_names.contains(&slot.module.remote) {
            return Err(anyhow::anyhow!(
                "Slot '{}' references undefined remote '{}'",
                slot.name,
                slot.module.remote
            ));
        }
    }

    Ok(FederationConfig {
        remotes: definitions.remotes,
        shared: definitions.shared,
        slots: definitions.slots,
    })
}

fn parse_toml(content: &str) -> Result<Definitions> {
    let toml_doc: toml::Value = toml::from_str(content)?;

    let mut definitions = Definitions::default();

    if let toml::Value::Table(table) = toml_doc {
        for (name, value) in table {
            if let toml::Value::Table(mut def_table) = value {
                // Classify by URI scheme: shared:*, module:* or a remote entry
                let Some(uri) = def_table
                    .get("uri")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                else {
                    return Err(anyhow::anyhow!(
                        "Definition '{name}' missing required 'uri' field"
                    ));
                };

                if let Some(library) = uri.strip_prefix("shared:") {
                    definitions
                        .shared
                        .push(parse_shared_definition(&name, library, def_table)?);
                } else if let Some(reference) = uri.strip_prefix("module:") {
                    let module = ModuleRef::parse(reference).ok_or_else(|| {
                        anyhow::anyhow!(
                            "Slot '{name}' has invalid module reference '{reference}', expected 'remote/path'"
                        )
                    })?;
                    let props = match def_table.remove("props") {
                        Some(toml::Value::Table(props_table)) => {
                            convert_toml_table_to_json_map(&props_table)?
                        }
                        Some(_) => {
                            return Err(anyhow::anyhow!("Slot '{name}' props must be a table"));
                        }
                        None => Props::new(),
                    };
                    definitions.slots.push(SlotDefinition {
                        name: name.clone(),
                        module,
                        props,
                    });
                } else {
                    definitions.remotes.push(parse_remote_definition(&name, &uri)?);
                }
            } else if let toml::Value::String(uri) = value {
                // Shorthand: `name = "uri"` declares a remote
                definitions.remotes.push(parse_remote_definition(&name, &uri)?);
            } else {
                return Err(anyhow::anyhow!(
                    "Definition '{name}' must be a table or a remote URI string"
                ));
            }
        }
    } else {
        return Err(anyhow::anyhow!(
            "TOML file must contain a table at root level"
        ));
    }
    Ok(definitions)
}

#[derive(serde::Deserialize)]
struct SharedTable {
    version: String,
    #[serde(default)]
    singleton: bool,
    #[serde(default)]
    required_version: Option<String>,
}

fn parse_shared_definition(
    name: &str,
    library: &str,
    mut def_table: toml::map::Map<String, toml::Value>,
) -> Result<SharedDefinition> {
    if library.is_empty() {
        return Err(anyhow::anyhow!(
            "Shared definition '{name}' must name a library, e.g. 'shared:react'"
        ));
    }
    def_table.remove("uri");
    let table: SharedTable = toml::Value::Table(def_table)
        .try_into()
        .map_err(|e| anyhow::anyhow!("Failed to parse shared library '{name}': {e}"))?;
    Ok(SharedDefinition {
        name: name.to_string(),
        library: library.to_string(),
        version: table.version,
        singleton: table.singleton,
        required_version: table.required_version,
    })
}

/// Accepts `http://host/remoteEntry.json` as well as the
/// `entry_name@http://host/remoteEntry.json` form.
fn parse_remote_definition(name: &str, uri: &str) -> Result<RemoteDefinition> {
    let (entry_name, uri) = match uri.split_once('@') {
        Some((entry_name, rest))
            if !entry_name.is_empty() && !entry_name.contains(':') && !entry_name.contains('/') =>
        {
            (Some(entry_name.to_string()), rest)
        }
        _ => (None, uri),
    };
    if uri.is_empty() {
        return Err(anyhow::anyhow!("Remote '{name}' has an empty URI"));
    }
    Ok(RemoteDefinition {
        name: name.to_string(),
        uri: uri.to_string(),
        entry_name,
    })
}

fn create_implicit_remote_definitions(entry_files: &[PathBuf]) -> Result<Vec<RemoteDefinition>> {
    let mut definitions = Vec::new();
    for path in entry_files {
        let path_str = path.to_string_lossy();
        let name = if let Some(oci_ref) = path_str.strip_prefix("oci://") {
            // Extract remote name from OCI URI: oci://ghcr.io/modulewise/app1:0.1.0 -> app1
            if let Some((pkg_part, _version)) = oci_ref.rsplit_once(':') {
                if let Some(name_part) = pkg_part.rsplit_once('/') {
                    name_part.1.to_string()
                } else {
                    pkg_part.to_string()
                }
            } else {
                return Err(anyhow::anyhow!("Invalid OCI URI format: {path_str}"));
            }
        } else {
            file_stem(path)?
        };

        definitions.push(RemoteDefinition {
            name,
            uri: path_str.to_string(),
            entry_name: None,
        });
    }
    Ok(definitions)
}

fn file_stem(path: &Path) -> Result<String> {
    Ok(path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("Cannot extract remote name from path: {}", path.display()))?
        .to_string())
}

fn convert_toml_table_to_json_map(
    table: &toml::map::Map<String, toml::Value>,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut map = serde_json::Map::new();
    for (key, value) in table {
        let json_value = convert_toml_value_to_json(value)?;
        map.insert(key.clone(), json_value);
    }
    Ok(map)
}

fn convert_toml_value_to_json(value: &toml::Value) -> Result<serde_json::Value> {
    match value {
        toml::Value::String(s) => Ok(serde_json::Value::String(s.clone())),
        toml::Value::Integer(i) => Ok(serde_json::Value::Number((*i).into())),
        toml::Value::Float(f) => Ok(serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)),
        toml::Value::Boolean(b) => Ok(serde_json::Value::Bool(*b)),
        toml::Value::Array(arr) => {
            let json_arr: Result<Vec<_>, _> = arr.iter().map(convert_toml_value_to_json).collect();
            Ok(serde_json::Value::Array(json_arr?))
        }
        toml::Value::Table(table) => Ok(serde_json::Value::Object(
            convert_toml_table_to_json_map(table)?,
        )),
        toml::Value::Datetime(dt) => Ok(serde_json::Value::String(dt.to_string())),
    }
}
