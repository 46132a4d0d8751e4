//! Typed configuration-file registry
//!
//! Maps each logical filename (or per-guest filename pattern) to a
//! parser/writer pair and to the version-vector field governing its
//! freshness. The observed filename set is fixed; registration happens once
//! at startup and passing an unregistered name to the read/write path is a
//! programming error.

use crate::error::{QuorumFsError, Result};
use crate::section_tree::SectionNode;
use crate::types::{GuestKind, GuestList, VersionVector};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Parsed value of a configuration file. All variants are deep-`Clone`;
/// cache reads hand out clones, never references into the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// Key/value files (`datacenter.cfg`, guest configs, shadow entries)
    Properties(BTreeMap<String, String>),
    /// The membership definition tree
    Tree(SectionNode),
    /// Opaque text (credentials)
    Text(String),
}

impl ConfigValue {
    pub fn as_properties(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            ConfigValue::Properties(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&SectionNode> {
        match self {
            ConfigValue::Tree(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Parsers must accept an absent file (`None`) and produce a well-defined
/// empty value; absence is a legitimate state of the store, never an error.
pub type Parser = Arc<dyn Fn(&str, Option<&[u8]>) -> Result<ConfigValue> + Send + Sync>;
pub type Writer = Arc<dyn Fn(&str, &ConfigValue) -> Result<Vec<u8>> + Send + Sync>;

#[derive(Clone)]
pub struct FileRegistration {
    parser: Parser,
    writer: Option<Writer>,
}

impl std::fmt::Debug for FileRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRegistration")
            .field("writer", &self.writer.is_some())
            .finish_non_exhaustive()
    }
}

impl FileRegistration {
    pub fn new(parser: Parser, writer: Option<Writer>) -> Self {
        Self { parser, writer }
    }

    pub fn parse(&self, name: &str, raw: Option<&[u8]>) -> Result<ConfigValue> {
        (self.parser)(name, raw)
    }

    pub fn serialize(&self, name: &str, value: &ConfigValue) -> Result<Vec<u8>> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| QuorumFsError::NoWriterRegistered {
                name: name.to_string(),
            })?;
        writer(name, value)
    }

    pub fn has_writer(&self) -> bool {
        self.writer.is_some()
    }
}

/// The fixed set of cluster-observed plain filenames
pub const OBSERVED_FILES: &[&str] = &[
    "cluster.conf",
    "cluster.conf.new",
    "datacenter.cfg",
    "user.cfg",
    "priv/shadow.cfg",
    "priv/authkey.key",
];

pub struct FileRegistry {
    files: HashMap<String, FileRegistration>,
    guest_kinds: HashMap<GuestKind, FileRegistration>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            guest_kinds: HashMap::new(),
        }
    }

    /// Register a plain observed filename. Names outside the observed set
    /// and duplicate registrations are rejected.
    pub fn register(&mut self, name: &str, parser: Parser, writer: Option<Writer>) -> Result<()> {
        if !OBSERVED_FILES.contains(&name) {
            return Err(QuorumFsError::UnknownFile {
                name: name.to_string(),
            });
        }
        if self.files.contains_key(name) {
            return Err(QuorumFsError::AlreadyRegistered {
                name: name.to_string(),
            });
        }
        self.files
            .insert(name.to_string(), FileRegistration::new(parser, writer));
        Ok(())
    }

    /// Register the shared parser/writer pair for one guest kind's per-guest
    /// configuration files.
    pub fn register_guest_kind(
        &mut self,
        kind: GuestKind,
        parser: Parser,
        writer: Option<Writer>,
    ) -> Result<()> {
        if self.guest_kinds.contains_key(&kind) {
            return Err(QuorumFsError::AlreadyRegistered {
                name: format!("{}/<id>.conf", kind.config_dir()),
            });
        }
        self.guest_kinds
            .insert(kind, FileRegistration::new(parser, writer));
        Ok(())
    }

    /// Split a per-guest path like `vms/100.conf` into its kind and guest id
    pub fn parse_guest_path(path: &str) -> Option<(GuestKind, u32)> {
        let (dir, file) = path.split_once('/')?;
        let kind = GuestKind::from_config_dir(dir)?;
        let id = file.strip_suffix(".conf")?.parse().ok()?;
        Some((kind, id))
    }

    /// Resolve a filename to its registration and governing version.
    ///
    /// Plain files are governed by the scalar version in the version vector;
    /// per-guest files by the guest's individual version in the guest list.
    /// An unknown version (`None`) means "always stale". A guest id missing
    /// from the guest list resolves to an unknown version, which forces a
    /// refetch on every read of that file until the list catches up; with
    /// `strict` (the write path) it is an `UnknownGuest` error instead.
    pub fn resolve_version(
        &self,
        name: &str,
        versions: &VersionVector,
        guests: &GuestList,
        strict: bool,
    ) -> Result<(Option<u64>, &FileRegistration)> {
        if let Some((kind, guest_id)) = Self::parse_guest_path(name) {
            let registration =
                self.guest_kinds
                    .get(&kind)
                    .ok_or_else(|| QuorumFsError::UnknownFile {
                        name: name.to_string(),
                    })?;
            let version = guests.version_of(guest_id);
            if strict && version.is_none() {
                return Err(QuorumFsError::UnknownGuest { guest_id });
            }
            return Ok((version, registration));
        }

        let registration = self
            .files
            .get(name)
            .ok_or_else(|| QuorumFsError::UnknownFile {
                name: name.to_string(),
            })?;
        Ok((versions.config_version(name), registration))
    }

    /// Registry pre-populated with every observed file kind
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(
            "cluster.conf",
            Arc::new(parse_tree),
            Some(Arc::new(write_tree)),
        )?;
        registry.register(
            "cluster.conf.new",
            Arc::new(parse_tree),
            Some(Arc::new(write_tree)),
        )?;
        registry.register(
            "datacenter.cfg",
            Arc::new(parse_properties),
            Some(Arc::new(write_properties)),
        )?;
        registry.register(
            "user.cfg",
            Arc::new(parse_properties),
            Some(Arc::new(write_properties)),
        )?;
        registry.register(
            "priv/shadow.cfg",
            Arc::new(parse_shadow),
            Some(Arc::new(write_shadow)),
        )?;
        // Key material is generated elsewhere; this client only reads it.
        registry.register("priv/authkey.key", Arc::new(parse_text), None)?;
        registry.register_guest_kind(
            GuestKind::Vm,
            Arc::new(parse_properties),
            Some(Arc::new(write_properties)),
        )?;
        registry.register_guest_kind(
            GuestKind::Container,
            Arc::new(parse_properties),
            Some(Arc::new(write_properties)),
        )?;
        Ok(registry)
    }
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn utf8(name: &str, raw: &[u8]) -> Result<String> {
    String::from_utf8(raw.to_vec()).map_err(|e| QuorumFsError::ParseError {
        name: name.to_string(),
        details: e.to_string(),
    })
}

/// `key: value` lines, `#` comments, absent file parses as an empty map
pub fn parse_properties(name: &str, raw: Option<&[u8]>) -> Result<ConfigValue> {
    let mut map = BTreeMap::new();
    let Some(raw) = raw else {
        return Ok(ConfigValue::Properties(map));
    };
    let text = utf8(name, raw)?;
    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or_else(|| QuorumFsError::ParseError {
            name: name.to_string(),
            details: format!("line {}: expected 'key: value'", idx + 1),
        })?;
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(ConfigValue::Properties(map))
}

pub fn write_properties(name: &str, value: &ConfigValue) -> Result<Vec<u8>> {
    let map = value
        .as_properties()
        .ok_or_else(|| QuorumFsError::SerializeError {
            name: name.to_string(),
            details: "expected key/value properties".to_string(),
        })?;
    let mut out = String::new();
    for (key, value) in map {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    Ok(out.into_bytes())
}

/// Shadow-style `name:secret` lines; absent file parses as an empty map
pub fn parse_shadow(name: &str, raw: Option<&[u8]>) -> Result<ConfigValue> {
    let mut map = BTreeMap::new();
    let Some(raw) = raw else {
        return Ok(ConfigValue::Properties(map));
    };
    let text = utf8(name, raw)?;
    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let (user, secret) = line.split_once(':').ok_or_else(|| QuorumFsError::ParseError {
            name: name.to_string(),
            details: format!("line {}: expected 'name:secret'", idx + 1),
        })?;
        map.insert(user.to_string(), secret.to_string());
    }
    Ok(ConfigValue::Properties(map))
}

pub fn write_shadow(name: &str, value: &ConfigValue) -> Result<Vec<u8>> {
    let map = value
        .as_properties()
        .ok_or_else(|| QuorumFsError::SerializeError {
            name: name.to_string(),
            details: "expected shadow entries".to_string(),
        })?;
    let mut out = String::new();
    for (user, secret) in map {
        out.push_str(user);
        out.push(':');
        out.push_str(secret);
        out.push('\n');
    }
    Ok(out.into_bytes())
}

/// Membership tree; absent file parses as an empty `cluster` section
pub fn parse_tree(name: &str, raw: Option<&[u8]>) -> Result<ConfigValue> {
    let Some(raw) = raw else {
        return Ok(ConfigValue::Tree(SectionNode::new("cluster")));
    };
    let text = utf8(name, raw)?;
    if text.trim().is_empty() {
        return Ok(ConfigValue::Tree(SectionNode::new("cluster")));
    }
    let root = SectionNode::parse(&text).map_err(|e| QuorumFsError::ParseError {
        name: name.to_string(),
        details: e.to_string(),
    })?;
    Ok(ConfigValue::Tree(root))
}

pub fn write_tree(name: &str, value: &ConfigValue) -> Result<Vec<u8>> {
    let root = value.as_tree().ok_or_else(|| QuorumFsError::SerializeError {
        name: name.to_string(),
        details: "expected a section tree".to_string(),
    })?;
    Ok(root.to_string().into_bytes())
}

/// Opaque text; absent file parses as the empty string
pub fn parse_text(name: &str, raw: Option<&[u8]>) -> Result<ConfigValue> {
    match raw {
        Some(raw) => Ok(ConfigValue::Text(utf8(name, raw)?)),
        None => Ok(ConfigValue::Text(String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GuestEntry;

    fn guest_list() -> GuestList {
        GuestList::new(vec![GuestEntry {
            id: 100,
            kind: GuestKind::Vm,
            node: "alpha".to_string(),
            version: 7,
        }])
    }

    #[test]
    fn test_register_rejects_unobserved_names() {
        let mut registry = FileRegistry::new();
        let err = registry
            .register("nope.cfg", Arc::new(parse_properties), None)
            .unwrap_err();
        assert!(matches!(err, QuorumFsError::UnknownFile { .. }));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = FileRegistry::new();
        registry
            .register("datacenter.cfg", Arc::new(parse_properties), None)
            .unwrap();
        let err = registry
            .register("datacenter.cfg", Arc::new(parse_properties), None)
            .unwrap_err();
        assert!(matches!(err, QuorumFsError::AlreadyRegistered { .. }));

        registry
            .register_guest_kind(GuestKind::Vm, Arc::new(parse_properties), None)
            .unwrap();
        let err = registry
            .register_guest_kind(GuestKind::Vm, Arc::new(parse_properties), None)
            .unwrap_err();
        assert!(matches!(err, QuorumFsError::AlreadyRegistered { .. }));
    }

    #[test]
    fn test_guest_path_parsing() {
        assert_eq!(
            FileRegistry::parse_guest_path("vms/100.conf"),
            Some((GuestKind::Vm, 100))
        );
        assert_eq!(
            FileRegistry::parse_guest_path("containers/9001.conf"),
            Some((GuestKind::Container, 9001))
        );
        assert_eq!(FileRegistry::parse_guest_path("datacenter.cfg"), None);
        assert_eq!(FileRegistry::parse_guest_path("vms/abc.conf"), None);
        assert_eq!(FileRegistry::parse_guest_path("other/100.conf"), None);
    }

    #[test]
    fn test_resolve_plain_and_guest_versions() {
        let registry = FileRegistry::with_defaults().unwrap();
        let mut versions = VersionVector::default();
        versions.start_time = 1;
        versions
            .config_versions
            .insert("datacenter.cfg".to_string(), 5);
        let guests = guest_list();

        let (version, _) = registry
            .resolve_version("datacenter.cfg", &versions, &guests, false)
            .unwrap();
        assert_eq!(version, Some(5));

        // Plain file with no published version yet: unknown, always stale
        let (version, _) = registry
            .resolve_version("user.cfg", &versions, &guests, false)
            .unwrap();
        assert_eq!(version, None);

        let (version, _) = registry
            .resolve_version("vms/100.conf", &versions, &guests, false)
            .unwrap();
        assert_eq!(version, Some(7));

        // Missing guest: unknown version when lenient, hard error when strict
        let (version, _) = registry
            .resolve_version("vms/101.conf", &versions, &guests, false)
            .unwrap();
        assert_eq!(version, None);
        let err = registry
            .resolve_version("vms/101.conf", &versions, &guests, true)
            .unwrap_err();
        assert!(matches!(err, QuorumFsError::UnknownGuest { guest_id: 101 }));

        let err = registry
            .resolve_version("bogus.cfg", &versions, &guests, false)
            .unwrap_err();
        assert!(matches!(err, QuorumFsError::UnknownFile { .. }));
    }

    #[test]
    fn test_properties_round_trip() {
        let mut map = BTreeMap::new();
        map.insert("language".to_string(), "en".to_string());
        map.insert("keyboard".to_string(), "de".to_string());
        let value = ConfigValue::Properties(map);

        let bytes = write_properties("datacenter.cfg", &value).unwrap();
        let parsed = parse_properties("datacenter.cfg", Some(&bytes)).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_properties_parse_accepts_absence_and_comments() {
        let parsed = parse_properties("datacenter.cfg", None).unwrap();
        assert_eq!(parsed, ConfigValue::Properties(BTreeMap::new()));

        let parsed =
            parse_properties("datacenter.cfg", Some(b"# comment\n\nlanguage: en\n")).unwrap();
        let map = parsed.as_properties().unwrap();
        assert_eq!(map.get("language").map(|s| s.as_str()), Some("en"));
    }

    #[test]
    fn test_shadow_round_trip() {
        let mut map = BTreeMap::new();
        map.insert("root".to_string(), "$5$abc$def".to_string());
        let value = ConfigValue::Properties(map);

        let bytes = write_shadow("priv/shadow.cfg", &value).unwrap();
        let parsed = parse_shadow("priv/shadow.cfg", Some(&bytes)).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_tree_round_trip() {
        let mut root = SectionNode::new("cluster");
        root.set_attribute("name", "demo");
        let mut nodes = SectionNode::new("nodes");
        let mut node = SectionNode::new("node");
        node.set_attribute("name", "alpha");
        node.set_attribute("nodeid", "1");
        nodes.push_child(node);
        root.push_child(nodes);
        let value = ConfigValue::Tree(root);

        let bytes = write_tree("cluster.conf", &value).unwrap();
        let parsed = parse_tree("cluster.conf", Some(&bytes)).unwrap();
        assert_eq!(parsed, value);

        let empty = parse_tree("cluster.conf", None).unwrap();
        assert_eq!(empty, ConfigValue::Tree(SectionNode::new("cluster")));
    }

    #[test]
    fn test_writer_rejects_mismatched_variant() {
        let err = write_properties("datacenter.cfg", &ConfigValue::Text("x".to_string()))
            .unwrap_err();
        assert!(matches!(err, QuorumFsError::SerializeError { .. }));
    }

    #[test]
    fn test_readonly_registration_has_no_writer() {
        let registry = FileRegistry::with_defaults().unwrap();
        let versions = VersionVector::default();
        let guests = GuestList::default();
        let (_, registration) = registry
            .resolve_version("priv/authkey.key", &versions, &guests, false)
            .unwrap();
        assert!(!registration.has_writer());
        let err = registration
            .serialize("priv/authkey.key", &ConfigValue::Text("key".to_string()))
            .unwrap_err();
        assert!(matches!(err, QuorumFsError::NoWriterRegistered { .. }));
    }
}
