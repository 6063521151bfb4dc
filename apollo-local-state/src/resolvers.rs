//! Resolvers of local fields.
//!
//! A resolver is selected by the runtime type name of the parent value and the field name.
//! Types and fields without a resolver fall back to the data already present on the parent.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use apollo_compiler::Node;
use apollo_compiler::ast;
use futures::future::BoxFuture;
use tower::BoxError;

use crate::Context;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::services::local_state::Operation;
use crate::spec::Fragments;
use crate::spec::transform::QuerySplit;
use crate::store::Store;

/// The outcome of a resolver: `Ok(None)` when it produced no value.
pub type ResolverResult = Result<Option<Value>, BoxError>;

/// Produces the value of one field.
///
/// Implemented for async closures taking the same arguments as [`Resolver::resolve`].
pub trait Resolver: Send + Sync + 'static {
    /// Resolves the field.
    ///
    /// `parent` is the root value for root fields, otherwise the object the field is selected
    /// on, with aliased sibling keys renamed back to their field names.
    fn resolve(
        &self,
        parent: Value,
        args: Object,
        context: ResolverContext,
        info: ResolveInfo,
    ) -> BoxFuture<'static, ResolverResult>;
}

impl<F, Fut> Resolver for F
where
    F: Fn(Value, Object, ResolverContext, ResolveInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ResolverResult> + Send + 'static,
{
    fn resolve(
        &self,
        parent: Value,
        args: Object,
        context: ResolverContext,
        info: ResolveInfo,
    ) -> BoxFuture<'static, ResolverResult> {
        Box::pin(self(parent, args, context, info))
    }
}

struct SyncResolver<F>(F);

impl<F> Resolver for SyncResolver<F>
where
    F: Fn(Value, Object, ResolverContext, ResolveInfo) -> ResolverResult + Send + Sync + 'static,
{
    fn resolve(
        &self,
        parent: Value,
        args: Object,
        context: ResolverContext,
        info: ResolveInfo,
    ) -> BoxFuture<'static, ResolverResult> {
        Box::pin(futures::future::ready((self.0)(parent, args, context, info)))
    }
}

/// Resolvers by type name, then field name.
#[derive(Clone, Default)]
pub struct ResolverMap {
    types: HashMap<String, HashMap<String, Arc<dyn Resolver>>>,
}

impl ResolverMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resolver` for `type_name.field_name`, replacing any previous one.
    pub fn insert(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: impl Resolver,
    ) -> &mut Self {
        self.types
            .entry(type_name.into())
            .or_default()
            .insert(field_name.into(), Arc::new(resolver));
        self
    }

    /// Registers an async closure for `type_name.field_name`.
    pub fn insert_async<F, Fut>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: F,
    ) -> &mut Self
    where
        F: Fn(Value, Object, ResolverContext, ResolveInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        self.insert(type_name, field_name, resolver)
    }

    /// Registers a synchronous resolver for `type_name.field_name`.
    pub fn insert_fn<F>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: F,
    ) -> &mut Self
    where
        F: Fn(Value, Object, ResolverContext, ResolveInfo) -> ResolverResult + Send + Sync + 'static,
    {
        self.insert(type_name, field_name, SyncResolver(resolver))
    }

    pub fn get(&self, type_name: &str, field_name: &str) -> Option<&Arc<dyn Resolver>> {
        self.types.get(type_name)?.get(field_name)
    }

    /// Deep merges `other` into this map. Resolvers of `other` win on conflicts.
    pub fn merge(&mut self, other: ResolverMap) {
        for (type_name, fields) in other.types {
            self.types.entry(type_name).or_default().extend(fields);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.types.values().all(HashMap::is_empty)
    }
}

impl fmt::Debug for ResolverMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .types
            .iter()
            .flat_map(|(type_name, fields)| {
                fields
                    .keys()
                    .map(move |field_name| format!("{type_name}.{field_name}"))
            })
            .collect();
        names.sort();
        f.debug_struct("ResolverMap")
            .field("resolvers", &names)
            .finish()
    }
}

/// The value passed as `parent` to the resolvers of root fields.
#[derive(Clone)]
pub enum RootValue {
    Static(Value),
    Factory(Arc<dyn Fn(&Operation) -> Value + Send + Sync>),
}

impl RootValue {
    /// A root value computed for each operation.
    pub fn factory(factory: impl Fn(&Operation) -> Value + Send + Sync + 'static) -> Self {
        RootValue::Factory(Arc::new(factory))
    }

    pub(crate) fn resolve(&self, operation: &Operation) -> Value {
        match self {
            RootValue::Static(value) => value.clone(),
            RootValue::Factory(factory) => factory(operation),
        }
    }
}

impl Default for RootValue {
    fn default() -> Self {
        RootValue::Static(Value::Object(Object::new()))
    }
}

impl From<Value> for RootValue {
    fn from(value: Value) -> Self {
        RootValue::Static(value)
    }
}

impl fmt::Debug for RootValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootValue::Static(value) => f.debug_tuple("Static").field(value).finish(),
            RootValue::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// What a resolver knows about the request it runs for.
#[derive(Clone)]
pub struct ResolverContext {
    operation: Arc<Operation>,
    context: Context,
    store: Option<Arc<dyn Store>>,
}

impl ResolverContext {
    pub(crate) fn new(
        operation: Arc<Operation>,
        context: Context,
        store: Option<Arc<dyn Store>>,
    ) -> Self {
        Self {
            operation,
            context,
            store,
        }
    }

    /// The operation being resolved.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// The request context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn store(&self) -> Option<&dyn Store> {
        self.store.as_deref()
    }
}

/// Where in the query a resolver runs.
#[derive(Clone)]
pub struct ResolveInfo {
    field: Node<ast::Field>,
    split: Arc<QuerySplit>,
    path: Path,
}

impl ResolveInfo {
    pub(crate) fn new(field: Node<ast::Field>, split: Arc<QuerySplit>, path: Path) -> Self {
        Self { field, split, path }
    }

    /// The field node being resolved.
    pub fn field(&self) -> &Node<ast::Field> {
        &self.field
    }

    /// The fragment definitions of the query.
    pub fn fragments(&self) -> &Fragments {
        &self.split.fragments
    }

    /// The path of the field in the response.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
