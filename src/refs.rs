//! Reference normalization.
//!
//! A location in the store is addressed by a slash-separated path whose
//! segments alternate collection/document, starting at a collection. A path
//! with an odd segment count names a collection, an even count names a
//! document. [`DocumentRef`] and [`CollectionRef`] are immutable value
//! handles over such paths; [`DocArg`] and [`CollectionArg`] normalize the
//! heterogeneous inputs callers pass (a resolved reference or a raw path
//! string) into one of them, failing fast on kind mismatches.

use crate::error::{Result, SyncError};
use crate::types::DocumentId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of location a path resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Document,
    Collection,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKind::Document => write!(f, "document"),
            RefKind::Collection => write!(f, "collection"),
        }
    }
}

/// Split a path into validated segments.
fn split_segments(path: &str, expected: RefKind) -> Result<Vec<String>> {
    if path.is_empty() || path.split('/').any(|s| s.is_empty()) {
        return Err(SyncError::InvalidReferenceKind {
            expected,
            path: path.to_string(),
        });
    }
    Ok(path.split('/').map(str::to_string).collect())
}

/// Handle to a single document in the store.
///
/// Immutable, cheap to clone, compared structurally.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    segments: Vec<String>,
}

impl DocumentRef {
    /// Parse a document path. The segment count must be even.
    pub fn parse(path: &str) -> Result<Self> {
        let segments = split_segments(path, RefKind::Document)?;
        if segments.len() % 2 != 0 {
            return Err(SyncError::InvalidReferenceKind {
                expected: RefKind::Document,
                path: path.to_string(),
            });
        }
        Ok(Self { segments })
    }

    /// The document's identifier (last path segment).
    pub fn id(&self) -> DocumentId {
        DocumentId(self.segments[self.segments.len() - 1].clone())
    }

    /// The enclosing collection.
    pub fn parent(&self) -> CollectionRef {
        CollectionRef {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        }
    }

    /// Full slash-joined path.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Debug for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentRef({})", self.path())
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Handle to a collection in the store.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionRef {
    segments: Vec<String>,
}

impl CollectionRef {
    /// Parse a collection path. The segment count must be odd.
    pub fn parse(path: &str) -> Result<Self> {
        let segments = split_segments(path, RefKind::Collection)?;
        if segments.len() % 2 == 0 {
            return Err(SyncError::InvalidReferenceKind {
                expected: RefKind::Collection,
                path: path.to_string(),
            });
        }
        Ok(Self { segments })
    }

    /// Reference to a document within this collection.
    pub fn doc(&self, id: &str) -> DocumentRef {
        let mut segments = self.segments.clone();
        segments.push(id.to_string());
        DocumentRef { segments }
    }

    /// Full slash-joined path.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Debug for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionRef({})", self.path())
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Normalized input for operations targeting a document.
///
/// Call sites historically passed either a resolved reference or a raw path
/// string; this folds both shapes into one parameter resolved exactly once at
/// the entry of each public operation. A collection reference passed where a
/// document is required fails with `InvalidReferenceKind` rather than being
/// coerced.
#[derive(Clone, Debug)]
pub enum DocArg {
    Ref(DocumentRef),
    Collection(CollectionRef),
    Path(String),
}

impl DocArg {
    /// Resolve to a document reference. Identity passthrough for an
    /// already-correct reference.
    pub fn resolve(self) -> Result<DocumentRef> {
        match self {
            DocArg::Ref(r) => Ok(r),
            DocArg::Collection(c) => Err(SyncError::InvalidReferenceKind {
                expected: RefKind::Document,
                path: c.path(),
            }),
            DocArg::Path(p) => DocumentRef::parse(&p),
        }
    }
}

impl From<DocumentRef> for DocArg {
    fn from(r: DocumentRef) -> Self {
        DocArg::Ref(r)
    }
}

impl From<&DocumentRef> for DocArg {
    fn from(r: &DocumentRef) -> Self {
        DocArg::Ref(r.clone())
    }
}

impl From<CollectionRef> for DocArg {
    fn from(r: CollectionRef) -> Self {
        DocArg::Collection(r)
    }
}

impl From<&str> for DocArg {
    fn from(p: &str) -> Self {
        DocArg::Path(p.to_string())
    }
}

impl From<String> for DocArg {
    fn from(p: String) -> Self {
        DocArg::Path(p)
    }
}

/// Normalized input for operations targeting a collection.
#[derive(Clone, Debug)]
pub enum CollectionArg {
    Ref(CollectionRef),
    Document(DocumentRef),
    Path(String),
}

impl CollectionArg {
    /// Resolve to a collection reference. Identity passthrough for an
    /// already-correct reference.
    pub fn resolve(self) -> Result<CollectionRef> {
        match self {
            CollectionArg::Ref(r) => Ok(r),
            CollectionArg::Document(d) => Err(SyncError::InvalidReferenceKind {
                expected: RefKind::Collection,
                path: d.path(),
            }),
            CollectionArg::Path(p) => CollectionRef::parse(&p),
        }
    }
}

impl From<CollectionRef> for CollectionArg {
    fn from(r: CollectionRef) -> Self {
        CollectionArg::Ref(r)
    }
}

impl From<&CollectionRef> for CollectionArg {
    fn from(r: &CollectionRef) -> Self {
        CollectionArg::Ref(r.clone())
    }
}

impl From<DocumentRef> for CollectionArg {
    fn from(r: DocumentRef) -> Self {
        CollectionArg::Document(r)
    }
}

impl From<&str> for CollectionArg {
    fn from(p: &str) -> Self {
        CollectionArg::Path(p.to_string())
    }
}

impl From<String> for CollectionArg {
    fn from(p: String) -> Self {
        CollectionArg::Path(p)
    }
}
