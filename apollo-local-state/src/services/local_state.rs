//! Resolution of `@client` fields, before and after forwarding a request.
//!
//! A request goes through the following steps:
//! - its query is split in two: the server part, without the `@client` selections, and the
//!   selections requiring local resolution
//! - a query with no `@client` selection at all is forwarded as is
//! - a query with only `@client` selections is resolved locally, nothing is forwarded
//! - otherwise the server part is forwarded, and every emission of the forward link is merged
//!   with the local resolution of the query against its data

use std::sync::Arc;
use std::task::Poll;

use apollo_compiler::Node;
use apollo_compiler::ast;
use derivative::Derivative;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::future::ready;
use futures::stream::once;
use parking_lot::RwLock;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use static_assertions::assert_impl_all;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceExt;
use tracing::Instrument;

use crate::Configuration;
use crate::Context;
use crate::error::LocalStateError;
use crate::execution::ExecutionContext;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::resolvers::ResolverContext;
use crate::resolvers::ResolverMap;
use crate::resolvers::RootValue;
use crate::spec::SpecError;
use crate::spec::get_operation;
use crate::spec::local_selections::Definition;
use crate::spec::local_selections::TraverseCache;
use crate::spec::parse_query;
use crate::spec::transform::SplitCache;
use crate::store::Store;

pub type BoxService = tower::util::BoxService<Request, Response, BoxError>;
pub type BoxCloneService = tower::util::BoxCloneService<Request, Response, BoxError>;
pub type ServiceResult = Result<Response, BoxError>;

/// A GraphQL operation: a parsed query document and what selects the operation to run in it.
#[derive(Clone, Debug)]
pub struct Operation {
    /// The query document.
    ///
    /// Cached work is keyed by the identity of the document: reuse the same [`Arc`] across
    /// requests for the same query.
    pub query: Arc<ast::Document>,
    pub operation_name: Option<String>,
    pub variables: Object,
    pub extensions: Object,
}

assert_impl_all!(Request: Send);
/// A request to the local state handler, or to a forward link.
#[derive(Clone, Debug)]
pub struct Request {
    pub operation: Operation,

    /// Context for resolvers and forward links
    pub context: Context,
}

#[buildstructor::buildstructor]
impl Request {
    /// Parses `query` into a new request.
    #[builder(visibility = "pub")]
    fn new(
        query: String,
        operation_name: Option<String>,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        variables: JsonMap<ByteString, Value>,
        extensions: JsonMap<ByteString, Value>,
        context: Option<Context>,
    ) -> Result<Request, SpecError> {
        Ok(Request::from_document_new(
            Arc::new(parse_query(&query)?),
            operation_name,
            variables,
            extensions,
            context,
        ))
    }

    /// A request for an already parsed document.
    #[builder(visibility = "pub")]
    fn from_document_new(
        query: Arc<ast::Document>,
        operation_name: Option<String>,
        variables: JsonMap<ByteString, Value>,
        extensions: JsonMap<ByteString, Value>,
        context: Option<Context>,
    ) -> Request {
        Request {
            operation: Operation {
                query,
                operation_name,
                variables,
                extensions,
            },
            context: context.unwrap_or_default(),
        }
    }
}

assert_impl_all!(Response: Send);
/// A stream of GraphQL responses and the [`Context`] of the request.
pub struct Response {
    pub response: graphql::ResponseStream,
    pub context: Context,
}

#[buildstructor::buildstructor]
impl Response {
    /// A response emitting a single GraphQL response.
    #[builder(visibility = "pub")]
    fn new(
        data: Option<Value>,
        errors: Vec<graphql::Error>,
        extensions: JsonMap<ByteString, Value>,
        context: Context,
    ) -> Self {
        let response = graphql::Response::builder()
            .and_data(data)
            .errors(errors)
            .extensions(extensions)
            .build();
        Response::new_from_graphql_response(response, context)
    }
}

impl Response {
    pub fn new_from_graphql_response(response: graphql::Response, context: Context) -> Self {
        Self {
            response: once(ready(response)).boxed(),
            context,
        }
    }

    pub async fn next_response(&mut self) -> Option<graphql::Response> {
        self.response.next().await
    }

    pub fn map_stream(
        self,
        f: impl FnMut(graphql::Response) -> graphql::Response + Send + 'static,
    ) -> Self {
        Response {
            response: self.response.map(f).boxed(),
            context: self.context,
        }
    }
}

/// The local state handler.
///
/// Cloning is cheap, clones share resolvers and caches.
#[derive(Clone, Debug)]
pub struct LocalState {
    inner: Arc<Inner>,
}

#[derive(Derivative)]
#[derivative(Debug)]
struct Inner {
    // replaced as a whole on registration, requests keep the map they started with
    resolvers: RwLock<Arc<ResolverMap>>,
    root_value: RootValue,
    #[derivative(Debug = "ignore")]
    store: Option<Arc<dyn Store>>,
    configuration: Configuration,
    #[derivative(Debug = "ignore")]
    split_cache: SplitCache,
    #[derivative(Debug = "ignore")]
    traverse_cache: TraverseCache,
}

/// What a request needs once its query is analyzed.
enum Plan<S> {
    PassThrough {
        request: Request,
        next: S,
    },
    Local {
        ctx: ExecutionContext,
        context: Context,
    },
    Mixed {
        ctx: ExecutionContext,
        request: Request,
        next: S,
    },
}

#[buildstructor::buildstructor]
impl LocalState {
    #[builder(visibility = "pub")]
    fn new(
        resolvers: Option<ResolverMap>,
        root_value: Option<RootValue>,
        store: Option<Arc<dyn Store>>,
        configuration: Option<Configuration>,
    ) -> Self {
        let configuration = configuration.unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                resolvers: RwLock::new(Arc::new(resolvers.unwrap_or_default())),
                root_value: root_value.unwrap_or_default(),
                store,
                split_cache: SplitCache::new(configuration.query_split_limit()),
                traverse_cache: TraverseCache::new(configuration.traverse_limit()),
                configuration,
            }),
        }
    }
}

impl LocalState {
    /// Merges `resolvers` into the registered ones, the new resolvers winning on conflicts.
    ///
    /// Requests already started keep using the resolvers they started with.
    pub fn add_resolvers(&self, resolvers: ResolverMap) {
        let mut current = self.inner.resolvers.write();
        Arc::make_mut(&mut current).merge(resolvers);
    }

    /// A snapshot of the registered resolvers.
    pub fn resolvers(&self) -> Arc<ResolverMap> {
        self.inner.resolvers.read().clone()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.inner.configuration
    }

    /// A layer putting this handler in front of a forward link.
    pub fn layer(&self) -> LocalStateLayer {
        LocalStateLayer::new(self.clone())
    }

    /// Handles `request`, forwarding its server part to `next`.
    ///
    /// Errors of the query document, and the lack of a forward link when the query needs one,
    /// are returned before anything is forwarded.
    pub fn execute<S>(&self, request: Request, next: Option<S>) -> BoxFuture<'static, ServiceResult>
    where
        S: Service<Request, Response = Response, Error = BoxError> + Send + 'static,
        S::Future: Send + 'static,
    {
        let span = tracing::info_span!(
            "local_state",
            "graphql.operation.name" = request.operation.operation_name.as_deref().unwrap_or("")
        );
        let plan = match span.in_scope(|| self.plan(request, next)) {
            Ok(plan) => plan,
            Err(error) => {
                return Box::pin(ready(Err(error.into())));
            }
        };

        match plan {
            Plan::PassThrough { request, next } => Box::pin(next.oneshot(request)),
            Plan::Local { ctx, context } => Box::pin(
                async move {
                    let (data, errors) = ctx.execute(&Value::Object(Object::new())).await;
                    Ok(Response::builder()
                        .data(Value::Object(data))
                        .errors(errors)
                        .context(context)
                        .build())
                }
                .instrument(span),
            ),
            Plan::Mixed { ctx, request, next } => Box::pin(
                async move {
                    let response = next.oneshot(request).await?;
                    let ctx = Arc::new(ctx);
                    let stream = response
                        .response
                        .then(move |emission| {
                            let ctx = ctx.clone();
                            async move { merge_local_results(&ctx, emission).await }
                        })
                        .boxed();
                    Ok(Response {
                        response: stream,
                        context: response.context,
                    })
                }
                .instrument(span),
            ),
        }
    }

    fn plan<S>(&self, request: Request, next: Option<S>) -> Result<Plan<S>, LocalStateError> {
        let document = request.operation.query.clone();
        let split = self.inner.split_cache.split(&document)?;

        if !split.has_client_directives {
            tracing::debug!("no local field in the query, forwarding it");
            let next = next.ok_or(LocalStateError::MissingForwardLink)?;
            return Ok(Plan::PassThrough { request, next });
        }

        let operation_name = request.operation.operation_name.as_deref();
        let operation: Node<ast::OperationDefinition> =
            get_operation(&document, operation_name)?.clone();
        let local_selections = self.inner.traverse_cache.local_selections(
            &document,
            &split.fragments,
            Definition::Operation(&operation),
        )?;

        let server = split.server.clone().filter(|server| {
            get_operation(server, operation_name).is_ok()
        });

        if local_selections.is_empty()
            && server.is_some()
            && let Some(next) = next
        {
            tracing::debug!("no local field in the operation, forwarding it");
            return Ok(Plan::PassThrough { request, next });
        }

        let ctx = ExecutionContext::new(
            document,
            operation,
            split,
            local_selections,
            &request.operation.variables,
            self.resolvers(),
            self.inner.root_value.resolve(&request.operation),
            ResolverContext::new(
                Arc::new(request.operation.clone()),
                request.context.clone(),
                self.inner.store.clone(),
            ),
            self.inner.configuration.warnings.clone(),
        );

        match server {
            None => {
                tracing::debug!("only local fields in the operation, resolving it locally");
                Ok(Plan::Local {
                    ctx,
                    context: request.context,
                })
            }
            Some(server) => {
                let next = next.ok_or(LocalStateError::MissingForwardLink)?;
                let request = Request {
                    operation: Operation {
                        query: server,
                        ..request.operation
                    },
                    context: request.context,
                };
                Ok(Plan::Mixed { ctx, request, next })
            }
        }
    }
}

/// Merges the local resolution of the operation into one emission of the forward link.
///
/// Emissions without data are left untouched. Local errors come after the remote ones.
async fn merge_local_results(
    ctx: &ExecutionContext,
    mut response: graphql::Response,
) -> graphql::Response {
    let Some(mut data) = response.data.take() else {
        return response;
    };
    let (local, mut errors) = ctx.execute(&data).await;
    if !data.is_null() {
        data.deep_merge(Value::Object(local));
    }
    response.data = Some(data);
    response.append_errors(&mut errors);
    response
}

/// [`Layer`] resolving `@client` fields in front of a forward link.
#[derive(Clone, Debug)]
pub struct LocalStateLayer {
    local_state: LocalState,
}

impl LocalStateLayer {
    pub fn new(local_state: LocalState) -> Self {
        Self { local_state }
    }
}

impl<S> Layer<S> for LocalStateLayer
where
    S: Service<Request, Response = Response, Error = BoxError> + Clone + Send + 'static,
    <S as Service<Request>>::Future: Send + 'static,
{
    type Service = LocalStateService<S>;

    fn layer(&self, next: S) -> Self::Service {
        LocalStateService {
            local_state: self.local_state.clone(),
            next: Some(next),
        }
    }
}

/// The local state handler as a [`Service`].
#[derive(Clone, Debug)]
pub struct LocalStateService<S> {
    local_state: LocalState,
    next: Option<S>,
}

impl LocalStateService<BoxCloneService> {
    /// A service with no forward link: queries requiring a server fail.
    pub fn terminal(local_state: LocalState) -> Self {
        Self {
            local_state,
            next: None,
        }
    }
}

impl<S> Service<Request> for LocalStateService<S>
where
    S: Service<Request, Response = Response, Error = BoxError> + Clone + Send + 'static,
    <S as Service<Request>>::Future: Send + 'static,
{
    type Response = Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, ServiceResult>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        // the forward link is polled when called, through `oneshot`
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        self.local_state.execute(request, self.next.clone())
    }
}
