//! Canonical type descriptors and arena handles

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::tuple::ValueTuple;
use crate::types::{FieldSet, Result, TypeDefinition, TypeKind, Value, ValueKind};

/// Identity of one registry scope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub(crate) u32);

/// Handle of a type inside the arena of its owning scope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub(crate) scope: ScopeId,
    pub(crate) slot: u32,
}

impl TypeRef {
    /// Scope owning the type
    pub fn scope(&self) -> ScopeId {
        self.scope
    }
}

const UNLINKED: u8 = 0;
const LINKING: u8 = 1;
const LINKED: u8 = 2;

#[derive(Clone, Debug, Default)]
pub(crate) struct TypeLinks {
    pub(crate) archetype: Option<TypeRef>,
    pub(crate) base: Option<TypeRef>,
    pub(crate) field_types: Vec<Option<TypeRef>>,
}

/// Scheme of `.type` meta records
pub(crate) static META_SCHEME: Lazy<Option<Arc<FieldSet>>> = Lazy::new(|| {
    FieldSet::builder(Some("urn:builtin:type"))
        .field("uri", "urn:builtin:string")
        .field("kind", "urn:builtin:string")
        .field("archetype", "urn:builtin:string")
        .field("base", "urn:builtin:string")
        .field("content", "urn:builtin:string")
        .build()
        .ok()
});

/// Canonical, resolvable type descriptor
pub struct Type {
    id: TypeRef,
    uri: Arc<str>,
    kind: TypeKind,
    value_kind: Option<ValueKind>,
    archetype_uri: Option<String>,
    base_uri: Option<String>,
    content: Option<Arc<Type>>,
    scheme: Option<Arc<FieldSet>>,
    state: AtomicU8,
    links: RwLock<TypeLinks>,
}

impl Type {
    pub(crate) fn from_definition(id: TypeRef, uri: &str, definition: TypeDefinition) -> Result<Self> {
        let scheme = definition.build_scheme()?;
        Ok(Self {
            id,
            uri: Arc::from(uri),
            kind: definition.kind,
            value_kind: definition.value_kind,
            archetype_uri: definition.archetype,
            base_uri: definition.base,
            content: None,
            scheme,
            state: AtomicU8::new(UNLINKED),
            links: RwLock::new(TypeLinks::default()),
        })
    }

    pub(crate) fn derived(id: TypeRef, uri: &str, kind: TypeKind, content: Arc<Type>) -> Self {
        let scheme = match kind {
            TypeKind::Buffer | TypeKind::Delta => content.scheme.clone(),
            TypeKind::Meta => META_SCHEME.clone(),
            _ => None,
        };
        Self {
            id,
            uri: Arc::from(uri),
            kind,
            value_kind: None,
            archetype_uri: None,
            base_uri: None,
            content: Some(content),
            scheme,
            state: AtomicU8::new(UNLINKED),
            links: RwLock::new(TypeLinks::default()),
        }
    }

    /// Arena handle
    pub fn id(&self) -> TypeRef {
        self.id
    }

    /// Type identity
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Descriptor kind
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Value kind of primitive types
    pub fn value_kind(&self) -> Option<ValueKind> {
        self.value_kind
    }

    /// Whether values are aggregates of a content type
    pub fn is_aggregate(&self) -> bool {
        self.kind.is_aggregate()
    }

    /// Scheme of record-shaped types
    pub fn scheme(&self) -> Option<&Arc<FieldSet>> {
        self.scheme.as_ref()
    }

    /// Wrapped type of a derived type (`Foo` for `Foo.array`)
    pub fn content(&self) -> Option<&Arc<Type>> {
        self.content.as_ref()
    }

    /// Declared archetype URI
    pub fn archetype_uri(&self) -> Option<&str> {
        self.archetype_uri.as_deref()
    }

    /// Declared base type URI
    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    /// Linked archetype handle
    pub fn archetype(&self) -> Option<TypeRef> {
        self.links.read().archetype
    }

    /// Linked base type handle
    pub fn base(&self) -> Option<TypeRef> {
        self.links.read().base
    }

    /// Linked type of the field at `index`
    pub fn field_type(&self, index: usize) -> Option<TypeRef> {
        self.links.read().field_types.get(index).copied().flatten()
    }

    /// Whether every reference has been resolved
    pub fn is_linked(&self) -> bool {
        self.state.load(Ordering::Acquire) == LINKED
    }

    /// Claim the link step; false when linked or already linking
    ///
    /// Only called under the registry's link gate, so `LINKING` is only ever
    /// observed by the thread running the link.
    pub(crate) fn begin_link(&self) -> bool {
        self.state
            .compare_exchange(UNLINKED, LINKING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn finish_link(&self, links: Option<TypeLinks>, complete: bool) {
        if let Some(links) = links {
            *self.links.write() = links;
        }
        self.state
            .store(if complete { LINKED } else { UNLINKED }, Ordering::Release);
    }

    /// Whether `value` may be stored in a field of this type
    pub fn accepts(&self, value: &Value) -> bool {
        match (self.kind, self.value_kind) {
            (TypeKind::Primitive, Some(ValueKind::Null)) => true,
            (TypeKind::Primitive, Some(kind)) => value.fits(kind),
            (TypeKind::Array | TypeKind::List, _) => value.fits(ValueKind::List),
            _ => value.fits(ValueKind::Record),
        }
    }

    /// Empty record following this type's scheme
    pub fn new_record(&self) -> Option<ValueTuple> {
        self.scheme.as_ref().map(|s| ValueTuple::empty(Arc::clone(s)))
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("uri", &self.uri)
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("linked", &self.is_linked())
            .finish()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}
