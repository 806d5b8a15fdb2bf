//! Core data structures for the dependency graph

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Stable identifier for a file, derived from its normalised path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct FileId(pub u64);

impl FileId {
    pub fn of(path: &Path) -> Self {
        FileId(stable_hash(&[normalize_path(path).to_string_lossy().as_bytes()]))
    }
}

/// Stable identifier for a declaration, derived from its [`DeclKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct DeclId(pub u64);

impl DeclId {
    pub fn of(key: &DeclKey) -> Self {
        DeclId(stable_hash(&[
            key.qualified_name.as_bytes(),
            key.discriminator.as_bytes(),
        ]))
    }
}

/// First eight bytes of SHA-256 over length-prefixed parts.
///
/// `DefaultHasher` is not stable across toolchains, which would break
/// persisted graphs.
fn stable_hash(parts: &[&[u8]]) -> u64 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

/// Lexically normalise a path: drop `.` components and fold `..` where possible.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Content hash over normalised text or an externally visible interface.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fingerprint(pub [u8; 16]);

impl Fingerprint {
    pub const EMPTY: Fingerprint = Fingerprint([0; 16]);

    /// Hash arbitrary bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        Fingerprint(out)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 32 || !hex.is_ascii() {
            return None;
        }
        let mut out = [0u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Fingerprint(out))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&hex)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid fingerprint: {hex}")))
    }
}

/// Identity of a declaration: qualified name plus overload/template discriminator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeclKey {
    pub qualified_name: String,
    #[serde(default)]
    pub discriminator: String,
}

impl DeclKey {
    pub fn new(qualified_name: impl Into<String>, discriminator: impl Into<String>) -> Self {
        DeclKey {
            qualified_name: qualified_name.into(),
            discriminator: discriminator.into(),
        }
    }

    /// A key without discriminator (non-overloadable entities such as macros).
    pub fn named(qualified_name: impl Into<String>) -> Self {
        Self::new(qualified_name, "")
    }

    pub fn id(&self) -> DeclId {
        DeclId::of(self)
    }

    /// Parse the [`Display`](fmt::Display) form, `name` or `name#discriminator`.
    pub fn parse(text: &str) -> Self {
        match text.split_once(DISCRIMINATOR_SEPARATOR) {
            Some((name, discriminator)) => Self::new(name, discriminator),
            None => Self::named(text),
        }
    }
}

/// Separates qualified name and discriminator in rendered keys.
pub const DISCRIMINATOR_SEPARATOR: char = '#';

impl fmt::Display for DeclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.discriminator.is_empty() {
            f.write_str(&self.qualified_name)
        } else {
            write!(f, "{}{}{}", self.qualified_name, DISCRIMINATOR_SEPARATOR, self.discriminator)
        }
    }
}

/// Discriminates what kind of entity a declaration is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Function,
    Class,
    Variable,
    Macro,
    Template,
    Enum,
}

/// Subtype of a declaration-to-declaration reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefKind {
    Calls,
    UsesType,
    Inherits,
    Overrides,
    Instantiates,
}

impl RefKind {
    pub const ALL: [RefKind; 5] = [
        RefKind::Calls,
        RefKind::UsesType,
        RefKind::Inherits,
        RefKind::Overrides,
        RefKind::Instantiates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Calls => "calls",
            RefKind::UsesType => "uses-type",
            RefKind::Inherits => "inherits",
            RefKind::Overrides => "overrides",
            RefKind::Instantiates => "instantiates",
        }
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// File → File, `#include`.
    Includes,
    /// File → Declaration, definition site.
    Defines,
    /// File → Declaration, forward declaration site.
    Declares,
    /// Declaration → Declaration.
    References(RefKind),
    /// Declaration | File → File, textual macro expansion.
    MacroExpandsIn,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Includes => f.write_str("includes"),
            EdgeKind::Defines => f.write_str("defines"),
            EdgeKind::Declares => f.write_str("declares"),
            EdgeKind::References(kind) => f.write_str(kind.as_str()),
            EdgeKind::MacroExpandsIn => f.write_str("macro-expands-in"),
        }
    }
}

/// A node of the graph: either a file or a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Entity {
    File(FileId),
    Decl(DeclId),
}

/// A directed, typed edge. Equality over all three fields is the dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: Entity,
    pub kind: EdgeKind,
    pub target: Entity,
}

impl Edge {
    pub fn new(source: Entity, kind: EdgeKind, target: Entity) -> Self {
        Edge { source, kind, target }
    }

    /// The endpoint opposite to `entity`, if `entity` is one of the endpoints.
    pub fn other(&self, entity: Entity) -> Option<Entity> {
        if self.source == entity {
            Some(self.target)
        } else if self.target == entity {
            Some(self.source)
        } else {
            None
        }
    }
}

/// A file known to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub path: PathBuf,
    /// Hash of the normalised text.
    pub fingerprint: Fingerprint,
    /// Direct includes in textual order, repeated includes collapsed.
    pub includes: Vec<PathBuf>,
    /// Declarations this file defines.
    pub defines: BTreeSet<DeclId>,
    /// Declarations this file only declares.
    pub declares: BTreeSet<DeclId>,
}

impl FileRecord {
    /// Every declaration mentioned by this file.
    pub fn declarations(&self) -> impl Iterator<Item = DeclId> + '_ {
        self.defines.union(&self.declares).copied()
    }
}

/// A named entity with a stable cross-file identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub id: DeclId,
    pub key: DeclKey,
    pub kind: DeclKind,
    /// Files holding a definition; several for header-defined entities seen
    /// through multiple translation units.
    pub defining_files: BTreeSet<FileId>,
    /// Files holding a forward declaration.
    pub declaring_files: BTreeSet<FileId>,
    /// Hash over the externally visible interface.
    pub signature: Fingerprint,
    /// Hash over the implementation.
    pub body: Fingerprint,
}

impl Declaration {
    /// Defining files first, then declaring files.
    pub fn home_files(&self) -> impl Iterator<Item = FileId> + '_ {
        self.defining_files
            .iter()
            .chain(self.declaring_files.difference(&self.defining_files))
            .copied()
    }

    pub fn is_orphaned(&self) -> bool {
        self.defining_files.is_empty() && self.declaring_files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_deterministic() {
        let key = DeclKey::new("ns::f", "(int)");
        assert_eq!(DeclId::of(&key), DeclId::of(&key.clone()));
        assert_ne!(DeclId::of(&key), DeclId::of(&DeclKey::new("ns::f", "(long)")));

        assert_eq!(FileId::of(Path::new("src/a.h")), FileId::of(Path::new("./src/a.h")));
        assert_eq!(FileId::of(Path::new("src/x/../a.h")), FileId::of(Path::new("src/a.h")));
    }

    #[test]
    fn test_discriminator_is_length_prefixed() {
        // "ab" + "c" must not collide with "a" + "bc"
        assert_ne!(
            DeclId::of(&DeclKey::new("ab", "c")),
            DeclId::of(&DeclKey::new("a", "bc"))
        );
    }

    #[test]
    fn test_key_display_keeps_parts_apart() {
        assert_ne!(DeclKey::new("ab", "c").to_string(), DeclKey::new("a", "bc").to_string());
        assert_eq!(DeclKey::new("ns::f", "(int)").to_string(), "ns::f#(int)");
        assert_eq!(DeclKey::named("ns::f").to_string(), "ns::f");

        for key in [DeclKey::new("ns::f", "(int)"), DeclKey::named("FEATURE_X")] {
            assert_eq!(DeclKey::parse(&key.to_string()), key);
        }
    }

    #[test]
    fn test_fingerprint_hex() {
        let fp = Fingerprint::of(b"int f(int);");
        assert_eq!(Fingerprint::from_hex(&fp.to_hex()), Some(fp));
        assert_eq!(Fingerprint::from_hex("zz"), None);

        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.to_hex()));
    }

    #[test]
    fn test_edge_kind_display() {
        assert_eq!(EdgeKind::References(RefKind::UsesType).to_string(), "uses-type");
        assert_eq!(EdgeKind::MacroExpandsIn.to_string(), "macro-expands-in");
    }

    #[test]
    fn test_home_files_orders_definitions_first() {
        let decl = Declaration {
            id: DeclId(1),
            key: DeclKey::named("f"),
            kind: DeclKind::Function,
            defining_files: [FileId(9)].into_iter().collect(),
            declaring_files: [FileId(2), FileId(9)].into_iter().collect(),
            signature: Fingerprint::EMPTY,
            body: Fingerprint::EMPTY,
        };
        let homes: Vec<_> = decl.home_files().collect();
        assert_eq!(homes, vec![FileId(9), FileId(2)]);
    }
}
