//! Type registry
//!
//! A [`TypeRegistry`] resolves type URIs to canonical [`Type`] descriptors.
//! Registries form a tree of scopes; each scope owns a concurrent cache, an
//! arena of the types it created and a pointer to its parent. Resolution
//! proceeds in this order:
//!
//! 1. the local cache;
//! 2. derived suffixes (`.array`, `.list`, `.buffer`, `.delta`, `.type`):
//!    one suffix is stripped, the remainder resolved, and the wrapper cached
//!    in the scope owning the wrapped type;
//! 3. the parent scope, unless the URI scheme is post-delegated;
//! 4. the local factory chain;
//! 5. the parent scope for post-delegated schemes.
//!
//! Types reference each other through [`TypeRef`] handles into the arena of
//! the owning scope. A type is cached before it is linked, so schemes can
//! refer to themselves, and references that cannot be resolved yet are
//! retried on the next [`TypeRegistry::link`].

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};

use crate::constants::{ARRAY_SUFFIX, BUFFER_SUFFIX, DELTA_SUFFIX, LIST_SUFFIX, META_SUFFIX};
use crate::core::RegistryConfig;
use crate::tuple::{Tuple, ValueTuple};
use crate::types::{Error, Result, TypeDefinition, TypeKind, Value};
use crate::{log_debug, log_trace};

/// Descriptors and handles
pub mod types;
/// Factory trait and in-memory factories
pub mod factory;
/// Prototype file factory
pub mod prototype;

pub use factory::{AssembledTypeFactory, BuiltinTypeFactory, DescribeType, DescribedTypeFactory, FactoryChain, TypeFactory};
pub use prototype::PrototypeTypeFactory;
pub use types::{ScopeId, Type, TypeRef};

use types::TypeLinks;


static NEXT_SCOPE: AtomicU32 = AtomicU32::new(1);

/// Split one derived suffix off `uri`
pub fn split_derived(uri: &str) -> Option<(&str, TypeKind)> {
    [
        (ARRAY_SUFFIX, TypeKind::Array),
        (LIST_SUFFIX, TypeKind::List),
        (BUFFER_SUFFIX, TypeKind::Buffer),
        (DELTA_SUFFIX, TypeKind::Delta),
        (META_SUFFIX, TypeKind::Meta),
    ]
    .into_iter()
    .find_map(|(suffix, kind)| {
        uri.strip_suffix(suffix)
            .filter(|base| !base.is_empty())
            .map(|base| (base, kind))
    })
}

/// Scheme part of a URI (`file` for `file:a/b`), empty when there is none
fn uri_scheme(uri: &str) -> &str {
    uri.split_once(':').map(|(scheme, _)| scheme).unwrap_or("")
}

/// Scoped, caching resolver of type URIs
pub struct TypeRegistry {
    scope: ScopeId,
    name: String,
    parent: Option<Arc<TypeRegistry>>,
    cache: DashMap<Arc<str>, Arc<Type>>,
    arena: RwLock<Vec<Arc<Type>>>,
    factories: ArcSwap<FactoryChain>,
    assembled: Arc<AssembledTypeFactory>,
    described: Arc<DescribedTypeFactory>,
    post_delegated: Vec<String>,
    // Shared by every scope of one tree; held for a whole link pass
    link_gate: Arc<ReentrantMutex<()>>,
}

impl TypeRegistry {
    fn with_chain(
        name: &str,
        parent: Option<Arc<TypeRegistry>>,
        mut chain: FactoryChain,
        post_delegated: Vec<String>,
    ) -> Self {
        let assembled = Arc::new(AssembledTypeFactory::new());
        let described = Arc::new(DescribedTypeFactory::new());
        chain.push(Arc::clone(&assembled) as Arc<dyn TypeFactory>);
        chain.push(Arc::clone(&described) as Arc<dyn TypeFactory>);
        let scope = ScopeId(NEXT_SCOPE.fetch_add(1, Ordering::Relaxed));
        log_debug!("Created type registry scope '{}' ({:?})", name, scope);
        let link_gate = match &parent {
            Some(parent) => Arc::clone(&parent.link_gate),
            None => Arc::new(ReentrantMutex::new(())),
        };
        Self {
            scope,
            name: name.to_string(),
            parent,
            cache: DashMap::new(),
            arena: RwLock::new(Vec::new()),
            factories: ArcSwap::from_pointee(chain),
            assembled,
            described,
            post_delegated,
            link_gate,
        }
    }

    fn configured_chain(config: &RegistryConfig) -> Result<FactoryChain> {
        let mut chain: FactoryChain = Vec::new();
        if !config.prototype_dirs.is_empty() {
            chain.push(Arc::new(PrototypeTypeFactory::load(&config.prototype_dirs)?));
        }
        if config.builtin_types {
            chain.push(Arc::new(BuiltinTypeFactory));
        }
        Ok(chain)
    }

    /// Root scope built from `config`
    ///
    /// The factory chain is: prototype files (when directories are
    /// configured), built-ins (when enabled), assembled, described.
    pub fn root(config: &RegistryConfig) -> Result<Arc<Self>> {
        let chain = Self::configured_chain(config)?;
        Ok(Arc::new(Self::with_chain(
            "root",
            None,
            chain,
            config.post_delegated_schemes.clone(),
        )))
    }

    /// Child scope with only assembled and described factories
    pub fn child(self: &Arc<Self>, name: &str) -> Arc<Self> {
        Arc::new(Self::with_chain(
            name,
            Some(Arc::clone(self)),
            Vec::new(),
            self.post_delegated.clone(),
        ))
    }

    /// Child scope with its own prototype directories and settings
    pub fn child_with_config(self: &Arc<Self>, name: &str, config: &RegistryConfig) -> Result<Arc<Self>> {
        let chain = Self::configured_chain(config)?;
        Ok(Arc::new(Self::with_chain(
            name,
            Some(Arc::clone(self)),
            chain,
            config.post_delegated_schemes.clone(),
        )))
    }

    /// Scope identity
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Scope name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent scope
    pub fn parent(&self) -> Option<&Arc<TypeRegistry>> {
        self.parent.as_ref()
    }

    /// Number of types cached in this scope
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Append `factory` to the end of the chain
    pub fn add_factory(&self, factory: Arc<dyn TypeFactory>) {
        log_debug!("Adding factory '{}' to scope '{}'", factory.name(), self.name);
        self.factories.rcu(|chain| {
            let mut next = FactoryChain::clone(chain);
            next.push(Arc::clone(&factory));
            next
        });
    }

    /// Register a definition with this scope's assembled factory
    pub fn assemble(&self, definition: TypeDefinition) -> Result<()> {
        self.assembled.add(definition)
    }

    /// Register `T` with this scope's described factory and resolve it
    pub fn describe_type<T: DescribeType>(&self) -> Result<Arc<Type>> {
        self.described.register::<T>();
        self.resolve(T::type_uri())
    }

    /// Resolve `uri` to its canonical type
    pub fn resolve(&self, uri: &str) -> Result<Arc<Type>> {
        self.try_resolve(uri)?.ok_or_else(|| Error::type_not_found(uri))
    }

    /// Resolve `uri`, returning `None` when nothing knows it
    pub fn try_resolve(&self, uri: &str) -> Result<Option<Arc<Type>>> {
        let cached = self.cache.get(uri).map(|ty| Arc::clone(ty.value()));
        if let Some(ty) = cached {
            if !ty.is_linked() {
                self.link(&ty)?;
            }
            return Ok(Some(ty));
        }

        if let Some((base_uri, kind)) = split_derived(uri) {
            let Some(base) = self.try_resolve(base_uri)? else {
                return Ok(None);
            };
            let owner = self.owner_of(base.id().scope).unwrap_or(self);
            return owner.derive(uri, kind, base).map(Some);
        }

        let post_delegated = self.post_delegated.iter().any(|s| s == uri_scheme(uri));
        if !post_delegated {
            if let Some(ty) = self.resolve_in_parent(uri)? {
                return Ok(Some(ty));
            }
        }

        if let Some(definition) = self.create_local(uri)? {
            return self.register(uri, definition).map(Some);
        }

        if post_delegated {
            return self.resolve_in_parent(uri);
        }
        Ok(None)
    }

    fn resolve_in_parent(&self, uri: &str) -> Result<Option<Arc<Type>>> {
        match &self.parent {
            Some(parent) => {
                let found = parent.try_resolve(uri)?;
                if found.is_some() {
                    log_trace!("Scope '{}' delegated {} to '{}'", self.name, uri, parent.name);
                }
                Ok(found)
            }
            None => Ok(None),
        }
    }

    fn create_local(&self, uri: &str) -> Result<Option<TypeDefinition>> {
        let chain = self.factories.load_full();
        for factory in chain.iter() {
            if let Some(definition) = factory.create(self, uri)? {
                log_trace!("Factory '{}' produced {}", factory.name(), uri);
                return Ok(Some(definition));
            }
        }
        Ok(None)
    }

    /// Registry in this scope's ancestry owning `scope`
    fn owner_of(&self, scope: ScopeId) -> Option<&TypeRegistry> {
        let mut current = self;
        loop {
            if current.scope == scope {
                return Some(current);
            }
            current = current.parent.as_deref()?;
        }
    }

    /// Insert-if-absent; a racing loser adopts the winner
    fn insert<F>(&self, uri: &str, build: F) -> Result<(Arc<Type>, bool)>
    where
        F: FnOnce(TypeRef) -> Result<Type>,
    {
        match self.cache.entry(Arc::from(uri)) {
            Entry::Occupied(existing) => Ok((Arc::clone(existing.get()), false)),
            Entry::Vacant(vacant) => {
                let mut arena = self.arena.write();
                let id = TypeRef {
                    scope: self.scope,
                    slot: arena.len() as u32,
                };
                let ty = Arc::new(build(id)?);
                arena.push(Arc::clone(&ty));
                vacant.insert(Arc::clone(&ty));
                Ok((ty, true))
            }
        }
    }

    fn register(&self, uri: &str, definition: TypeDefinition) -> Result<Arc<Type>> {
        let (ty, created) = self.insert(uri, |id| Type::from_definition(id, uri, definition))?;
        if created {
            log_debug!("Registered {} in scope '{}'", uri, self.name);
        }
        self.link(&ty)?;
        Ok(ty)
    }

    fn derive(&self, uri: &str, kind: TypeKind, base: Arc<Type>) -> Result<Arc<Type>> {
        let (ty, created) = self.insert(uri, |id| Ok(Type::derived(id, uri, kind, base)))?;
        if created {
            log_debug!("Derived {} ({}) in scope '{}'", uri, kind, self.name);
        }
        self.link(&ty)?;
        Ok(ty)
    }

    /// Type behind `handle`, looked up in the owning scope
    pub fn get(&self, handle: TypeRef) -> Option<Arc<Type>> {
        let owner = self.owner_of(handle.scope)?;
        let arena = owner.arena.read();
        arena.get(handle.slot as usize).cloned()
    }

    /// Resolve the references of `ty`
    ///
    /// Idempotent. Returns whether every reference is now resolved; missing
    /// references stay pending and are retried on the next call. A cycle in
    /// the archetype or base chain is a [`Error::Definition`].
    ///
    /// A thread that finds another thread linking waits for it to finish
    /// and then sees the linked result.
    pub fn link(&self, ty: &Arc<Type>) -> Result<bool> {
        if ty.is_linked() {
            return Ok(true);
        }
        // Other threads block here until the running link pass finishes
        let _gate = self.link_gate.lock();
        if ty.is_linked() {
            return Ok(true);
        }
        if !ty.begin_link() {
            // Already being linked further up this thread's resolution
            return Ok(false);
        }

        match self.resolve_links(ty) {
            Ok((links, complete)) => {
                ty.finish_link(Some(links), complete);
                if complete {
                    log_trace!("Linked {}", ty.uri());
                } else {
                    log_debug!("Linked {} with pending forward references", ty.uri());
                }
                Ok(complete)
            }
            Err(e) => {
                ty.finish_link(None, false);
                Err(e)
            }
        }
    }

    fn resolve_links(&self, ty: &Arc<Type>) -> Result<(TypeLinks, bool)> {
        let mut complete = true;
        let mut resolve_ref = |uri: Option<&str>| -> Result<Option<TypeRef>> {
            let Some(uri) = uri else {
                return Ok(None);
            };
            let found = self.try_resolve(uri)?.map(|t| t.id());
            complete &= found.is_some();
            Ok(found)
        };

        let archetype = resolve_ref(ty.archetype_uri())?;
        let base = resolve_ref(ty.base_uri())?;
        let field_types = match ty.scheme() {
            Some(scheme) if ty.kind() == TypeKind::Record => scheme
                .fields()
                .iter()
                .map(|f| resolve_ref(Some(f.type_uri())))
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };

        let links = TypeLinks {
            archetype,
            base,
            field_types,
        };
        self.check_acyclic(ty, &links)?;
        Ok((links, complete))
    }

    fn check_acyclic(&self, ty: &Type, links: &TypeLinks) -> Result<()> {
        for (label, start, next) in [
            ("base", links.base, Type::base as fn(&Type) -> Option<TypeRef>),
            ("archetype", links.archetype, Type::archetype),
        ] {
            let mut seen = HashSet::from([ty.id()]);
            let mut current = start;
            while let Some(handle) = current {
                if !seen.insert(handle) {
                    return Err(Error::definition(format!("Cyclic {} chain through {}", label, ty.uri())));
                }
                current = self.get(handle).and_then(|t| next(&t));
            }
        }
        Ok(())
    }

    /// Linked archetype of `ty`
    pub fn archetype_of(&self, ty: &Type) -> Option<Arc<Type>> {
        ty.archetype().and_then(|h| self.get(h))
    }

    /// Linked base type of `ty`
    pub fn base_of(&self, ty: &Type) -> Option<Arc<Type>> {
        ty.base().and_then(|h| self.get(h))
    }

    /// Whether `ancestor` is `ty` or reachable through base or archetype links
    pub fn is_subtype(&self, ty: &Type, ancestor: &Type) -> bool {
        let mut pending = vec![ty.id()];
        let mut seen = HashSet::new();
        while let Some(handle) = pending.pop() {
            if handle == ancestor.id() {
                return true;
            }
            if !seen.insert(handle) {
                continue;
            }
            if let Some(t) = self.get(handle) {
                pending.extend(t.base());
                pending.extend(t.archetype());
            }
        }
        false
    }

    /// Extent of `tuple` belonging to the ancestor type `ancestor`
    pub fn widen(&self, tuple: &dyn Tuple, ancestor: &Type) -> Result<ValueTuple> {
        tuple.widen(ancestor.uri())
    }

    /// Empty record of the type `uri`, with one extent per base-type level
    pub fn new_record(&self, uri: &str) -> Result<ValueTuple> {
        let ty = self.resolve(uri)?;
        self.new_record_of(&ty, &mut HashSet::new())
    }

    fn new_record_of(&self, ty: &Type, seen: &mut HashSet<TypeRef>) -> Result<ValueTuple> {
        if !seen.insert(ty.id()) {
            return Err(Error::definition(format!("Cyclic base chain through {}", ty.uri())));
        }
        let record = ty
            .new_record()
            .ok_or_else(|| Error::type_mismatch("record type", ty.uri()))?;
        match self.base_of(ty) {
            Some(base) => Ok(record.with_base(Arc::new(self.new_record_of(&base, seen)?))),
            None => Ok(record),
        }
    }

    /// Meta record describing `ty`
    pub fn describe(&self, ty: &Type) -> Result<ValueTuple> {
        let meta = self.resolve(&format!("{}{}", ty.uri(), META_SUFFIX))?;
        let scheme = meta
            .scheme()
            .ok_or_else(|| Error::definition("meta type without scheme"))?;
        let uri_of = |handle: Option<TypeRef>| -> Value {
            handle
                .and_then(|h| self.get(h))
                .map(|t| Value::text(t.uri()))
                .unwrap_or_default()
        };
        ValueTuple::new(
            Arc::clone(scheme),
            vec![
                Value::text(ty.uri()),
                Value::text(ty.kind().to_string()),
                uri_of(ty.archetype()),
                uri_of(ty.base()),
                ty.content().map(|c| Value::text(c.uri())).unwrap_or_default(),
            ],
        )
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field("cached", &self.cache.len())
            .finish()
    }
}
