//! Hierarchical identifiers.
//!
//! Every component of the system (monitored system, plugin, converter,
//! IASIO, ASCE, DASU, supervisor, client) is named by an [`Identifier`]:
//! a local id, a kind, and an optional parent whose kind is constrained
//! by the child's kind. The root-to-leaf concatenation (the *running id*)
//! uniquely names a component instance; the *full running id* adds kind
//! annotations so it is self-describing and parseable.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Separator between elements of a running id.
///
/// Forbidden inside local ids.
pub const SEPARATOR: char = ':';

/// Prefix and suffix wrapping the instance number of a templated id,
/// e.g. `Threshold[!#3!]`.
pub const TEMPLATE_PREFIX: &str = "[!#";
/// Closing marker of a templated id.
pub const TEMPLATE_SUFFIX: &str = "!]";

/// The kind of a component named by an [`Identifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierKind {
    /// A remote system monitored by plugins.
    #[serde(rename = "MONITORED_SYSTEM")]
    MonitoredSystem,
    /// A plugin sampling monitor points of a monitored system.
    #[serde(rename = "PLUGIN")]
    Plugin,
    /// The converter translating plugin samples into core values.
    #[serde(rename = "CONVERTER")]
    Converter,
    /// A monitor point or alarm flowing through the core.
    #[serde(rename = "IASIO")]
    Iasio,
    /// A computing element.
    #[serde(rename = "ASCE")]
    Asce,
    /// A distributed unit.
    #[serde(rename = "DASU")]
    Dasu,
    /// A supervisor hosting distributed units.
    #[serde(rename = "SUPERVISOR")]
    Supervisor,
    /// An external client (consoles, senders).
    #[serde(rename = "CLIENT")]
    Client,
}

impl IdentifierKind {
    /// The kinds a parent identifier may have for a child of this kind.
    ///
    /// An empty slice means the kind is a root and accepts no parent.
    #[must_use]
    pub fn allowed_parents(self) -> &'static [IdentifierKind] {
        match self {
            IdentifierKind::Plugin => &[IdentifierKind::MonitoredSystem],
            IdentifierKind::Converter => &[IdentifierKind::Plugin],
            IdentifierKind::Iasio => &[IdentifierKind::Converter, IdentifierKind::Asce],
            IdentifierKind::Asce => &[IdentifierKind::Dasu],
            IdentifierKind::Dasu => &[IdentifierKind::Supervisor],
            IdentifierKind::MonitoredSystem
            | IdentifierKind::Supervisor
            | IdentifierKind::Client => &[],
        }
    }

    /// The wire rendering of the kind, as used in full running ids.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IdentifierKind::MonitoredSystem => "MONITORED_SYSTEM",
            IdentifierKind::Plugin => "PLUGIN",
            IdentifierKind::Converter => "CONVERTER",
            IdentifierKind::Iasio => "IASIO",
            IdentifierKind::Asce => "ASCE",
            IdentifierKind::Dasu => "DASU",
            IdentifierKind::Supervisor => "SUPERVISOR",
            IdentifierKind::Client => "CLIENT",
        }
    }

    /// Parses the wire rendering produced by [`IdentifierKind::as_str`].
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::UnknownKind`] for any other string.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        match s {
            "MONITORED_SYSTEM" => Ok(IdentifierKind::MonitoredSystem),
            "PLUGIN" => Ok(IdentifierKind::Plugin),
            "CONVERTER" => Ok(IdentifierKind::Converter),
            "IASIO" => Ok(IdentifierKind::Iasio),
            "ASCE" => Ok(IdentifierKind::Asce),
            "DASU" => Ok(IdentifierKind::Dasu),
            "SUPERVISOR" => Ok(IdentifierKind::Supervisor),
            "CLIENT" => Ok(IdentifierKind::Client),
            other => Err(IdentifierError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while constructing or parsing identifiers.
///
/// All failures happen at construction: a built [`Identifier`] cannot
/// be invalid.
#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    /// The local id is empty.
    #[error("empty identifier")]
    Empty,

    /// The local id contains a character reserved by the encoding.
    #[error("identifier '{id}' contains forbidden character '{ch}'")]
    ForbiddenCharacter {
        /// The offending local id.
        id: String,
        /// The reserved character found in it.
        ch: char,
    },

    /// The parent kind is not allowed for the child kind.
    #[error("identifier of kind {kind} cannot have a parent of kind {parent_kind}")]
    WrongParentKind {
        /// Kind of the identifier being built.
        kind: IdentifierKind,
        /// Kind of the rejected parent.
        parent_kind: IdentifierKind,
    },

    /// A kind string did not match any known kind.
    #[error("unknown identifier kind: {0}")]
    UnknownKind(String),

    /// A full running id string could not be parsed.
    #[error("malformed full running id: {0}")]
    Malformed(String),
}

/// A hierarchical, immutable name.
///
/// Built once, validated at construction, compared by value. The parent
/// chain is shared (`Arc`) because many values produced by the same DASU
/// carry the same ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    id: String,
    kind: IdentifierKind,
    parent: Option<Arc<Identifier>>,
}

impl Identifier {
    /// Builds an identifier, validating the local id and the parent kind.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::Empty`] for an empty local id,
    /// [`IdentifierError::ForbiddenCharacter`] if the id contains the
    /// separator or one of the encoding characters, and
    /// [`IdentifierError::WrongParentKind`] if a parent of a kind not
    /// allowed for `kind` is supplied.
    pub fn new(
        id: impl Into<String>,
        kind: IdentifierKind,
        parent: Option<Arc<Identifier>>,
    ) -> Result<Self, IdentifierError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdentifierError::Empty);
        }
        for ch in [SEPARATOR, '(', ')', '@'] {
            if id.contains(ch) {
                return Err(IdentifierError::ForbiddenCharacter { id, ch });
            }
        }
        if let Some(ref p) = parent {
            if !kind.allowed_parents().contains(&p.kind) {
                return Err(IdentifierError::WrongParentKind {
                    kind,
                    parent_kind: p.kind,
                });
            }
        }
        Ok(Self { id, kind, parent })
    }

    /// Builds the identifier of one instance of a template,
    /// `base[!#instance!]`.
    ///
    /// # Errors
    ///
    /// Same as [`Identifier::new`].
    pub fn templated(
        base: &str,
        kind: IdentifierKind,
        instance: usize,
        parent: Option<Arc<Identifier>>,
    ) -> Result<Self, IdentifierError> {
        Self::new(
            format!("{base}{TEMPLATE_PREFIX}{instance}{TEMPLATE_SUFFIX}"),
            kind,
            parent,
        )
    }

    /// The local id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The kind of the named component.
    #[must_use]
    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    /// The parent, when the identifier is not a root.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<Identifier>> {
        self.parent.as_ref()
    }

    /// Root-to-leaf concatenation of the local ids, separated by
    /// [`SEPARATOR`]. Never empty.
    #[must_use]
    pub fn running_id(&self) -> String {
        let mut elems = self.chain();
        let first = elems.remove(0);
        let mut out = first.id.clone();
        for e in elems {
            out.push(SEPARATOR);
            out.push_str(&e.id);
        }
        out
    }

    /// Root-to-leaf concatenation with kind annotations:
    /// `(id:KIND)@(id:KIND)@...`. Self-describing and parseable back with
    /// [`Identifier::from_full_running_id`].
    #[must_use]
    pub fn full_running_id(&self) -> String {
        self.chain()
            .iter()
            .map(|e| format!("({}:{})", e.id, e.kind))
            .collect::<Vec<_>>()
            .join("@")
    }

    /// Parses a string produced by [`Identifier::full_running_id`],
    /// rebuilding the whole parent chain.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::Malformed`] when the shape is not
    /// `(id:KIND)@...`, plus any construction error of the chain.
    pub fn from_full_running_id(s: &str) -> Result<Self, IdentifierError> {
        let mut parent: Option<Arc<Identifier>> = None;
        let mut last: Option<Identifier> = None;
        for elem in s.split('@') {
            let inner = elem
                .strip_prefix('(')
                .and_then(|e| e.strip_suffix(')'))
                .ok_or_else(|| IdentifierError::Malformed(s.to_string()))?;
            let (id, kind_str) = inner
                .rsplit_once(':')
                .ok_or_else(|| IdentifierError::Malformed(s.to_string()))?;
            let kind = IdentifierKind::parse(kind_str)?;
            let ident = Identifier::new(id, kind, parent.take())?;
            parent = Some(Arc::new(ident.clone()));
            last = Some(ident);
        }
        last.ok_or_else(|| IdentifierError::Malformed(s.to_string()))
    }

    /// Walks the parent chain looking for an ancestor of the given kind.
    #[must_use]
    pub fn ancestor_of_kind(&self, kind: IdentifierKind) -> Option<&Identifier> {
        let mut cur = self.parent.as_deref();
        while let Some(p) = cur {
            if p.kind == kind {
                return Some(p);
            }
            cur = p.parent.as_deref();
        }
        None
    }

    /// The instance number when the local id is templated
    /// (`base[!#N!]`), `None` otherwise.
    #[must_use]
    pub fn template_instance(&self) -> Option<usize> {
        let start = self.id.find(TEMPLATE_PREFIX)?;
        let rest = &self.id[start + TEMPLATE_PREFIX.len()..];
        let end = rest.find(TEMPLATE_SUFFIX)?;
        rest[..end].parse().ok()
    }

    /// The chain of identifiers from the root down to `self`.
    fn chain(&self) -> Vec<&Identifier> {
        let mut elems = Vec::new();
        let mut cur = Some(self);
        while let Some(e) = cur {
            elems.push(e);
            cur = e.parent.as_deref();
        }
        elems.reverse();
        elems
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.running_id())
    }
}
