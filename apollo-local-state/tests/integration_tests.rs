use std::sync::Arc;

use apollo_local_state::Configuration;
use apollo_local_state::Context;
use apollo_local_state::InMemoryStore;
use apollo_local_state::LocalState;
use apollo_local_state::LocalStateError;
use apollo_local_state::LocalStateService;
use apollo_local_state::ResolverMap;
use apollo_local_state::ResolverResult;
use apollo_local_state::RootValue;
use apollo_local_state::SpecError;
use apollo_local_state::Store;
use apollo_local_state::graphql;
use apollo_local_state::json_ext::Path;
use apollo_local_state::json_ext::Value;
use apollo_local_state::parse_query;
use apollo_local_state::services::Request;
use apollo_local_state::test_harness::MockForward;
use maplit::hashmap;
use serde_json_bytes::json;
use tower::BoxError;
use tower::Layer;
use tower::ServiceBuilder;
use tower::ServiceExt;

fn property(value: &Value, key: &str) -> Value {
    value
        .as_object()
        .and_then(|object| object.get(key))
        .cloned()
        .unwrap_or_default()
}

fn cart_resolvers() -> ResolverMap {
    let mut resolvers = ResolverMap::new();
    resolvers
        .insert_fn("Query", "isLoggedIn", |_, _, _, _| Ok(Some(json!(true))))
        .insert_fn("Cart", "total", |parent, _, _, _| {
            let count = property(&parent, "items")
                .as_array()
                .map(Vec::len)
                .unwrap_or_default();
            Ok(Some(json!(count * 10)))
        })
        .insert_async("Item", "cost", |parent, _, _, _| async move {
            let cost: ResolverResult = match property(&parent, "id").as_str() {
                Some("c") => Err("no price for item c".into()),
                Some(_) => Ok(Some(json!(5))),
                None => Ok(None),
            };
            cost
        });
    resolvers
}

fn request(query: &str) -> Request {
    Request::builder().query(query).build().unwrap()
}

async fn single_response(
    local_state: &LocalState,
    forward: MockForward,
    request: Request,
) -> graphql::Response {
    let mut response = ServiceBuilder::new()
        .layer(local_state.layer())
        .service(forward)
        .oneshot(request)
        .await
        .unwrap();
    let first = response.next_response().await.unwrap();
    assert!(response.next_response().await.is_none());
    first
}

fn messages(response: &graphql::Response) -> Vec<&str> {
    response
        .errors
        .iter()
        .map(|error| error.message.as_str())
        .collect()
}

#[tokio::test]
async fn local_only_query_is_not_forwarded() {
    let local_state = LocalState::builder().resolvers(cart_resolvers()).build();
    let forward = MockForward::builder().build();

    let response = single_response(
        &local_state,
        forward.clone(),
        request("query IsUserLoggedIn { isLoggedIn @client }"),
    )
    .await;

    assert_eq!(response.data, Some(json!({ "isLoggedIn": true })));
    assert!(response.errors.is_empty());
    assert!(forward.received().is_empty());
}

#[tokio::test]
async fn mixed_query_merges_local_fields_into_server_data() {
    let local_state = LocalState::builder().resolvers(cart_resolvers()).build();
    let forward = MockForward::builder()
        .mocks(hashmap! {
            "{ cart { id items { id } __typename } }".to_string() => vec![
                graphql::Response::builder()
                    .data(json!({
                        "cart": {
                            "id": "1",
                            "items": [{ "id": "a" }, { "id": "b" }],
                            "__typename": "Cart",
                        }
                    }))
                    .build(),
            ],
        })
        .build();

    let response = single_response(
        &local_state,
        forward.clone(),
        request("{ cart { id items { id } total @client } isLoggedIn @client }"),
    )
    .await;

    assert_eq!(
        response.data,
        Some(json!({
            "cart": {
                "id": "1",
                "items": [{ "id": "a" }, { "id": "b" }],
                "__typename": "Cart",
                "total": 20,
            },
            "isLoggedIn": true,
        }))
    );
    assert!(response.errors.is_empty());

    let received = forward.received();
    assert_eq!(received.len(), 1);
    pretty_assertions::assert_eq!(
        received[0].query.to_string(),
        parse_query("{ cart { id items { id } __typename } }")
            .unwrap()
            .to_string()
    );
}

#[tokio::test]
async fn fields_of_nested_fragments_are_resolved_locally() {
    let mut resolvers = ResolverMap::new();
    resolvers.insert_fn("Cart", "total", |_, _, _, _| Ok(Some(json!(12))));
    let local_state = LocalState::builder().resolvers(resolvers).build();
    let forward = MockForward::builder()
        .mock(
            "{ cart { id __typename } }",
            vec![
                graphql::Response::builder()
                    .data(json!({ "cart": { "id": "1", "__typename": "Cart" } }))
                    .build(),
            ],
        )
        .build();

    let response = single_response(
        &local_state,
        forward.clone(),
        request(
            "
            query { cart { id ...Outer } }
            fragment Outer on Cart { ...Inner }
            fragment Inner on Cart { total @client }
            ",
        ),
    )
    .await;

    assert_eq!(
        response.data,
        Some(json!({ "cart": { "id": "1", "__typename": "Cart", "total": 12 } }))
    );
    assert!(response.errors.is_empty());

    let received = forward.received();
    assert_eq!(received.len(), 1);
    pretty_assertions::assert_eq!(
        received[0].query.to_string(),
        parse_query("{ cart { id __typename } }").unwrap().to_string()
    );
}

#[tokio::test]
async fn failing_resolver_nulls_its_field_only() {
    let local_state = LocalState::builder().resolvers(cart_resolvers()).build();
    let forward = MockForward::builder()
        .mock(
            "{ items { id __typename } }",
            vec![
                graphql::Response::builder()
                    .data(json!({
                        "items": [
                            { "id": "a", "__typename": "Item" },
                            { "id": "b", "__typename": "Item" },
                            { "id": "c", "__typename": "Item" },
                        ]
                    }))
                    .error(
                        graphql::Error::builder()
                            .message("upstream warning")
                            .path(Path::from("items"))
                            .build(),
                    )
                    .build(),
            ],
        )
        .build();

    let response = single_response(
        &local_state,
        forward,
        request("{ items { id cost @client } }"),
    )
    .await;

    assert_eq!(
        response.data,
        Some(json!({
            "items": [
                { "id": "a", "__typename": "Item", "cost": 5 },
                { "id": "b", "__typename": "Item", "cost": 5 },
                { "id": "c", "__typename": "Item", "cost": null },
            ]
        }))
    );
    assert_eq!(
        messages(&response),
        ["upstream warning", "resolver Item.cost failed: no price for item c"]
    );
    let local_error = &response.errors[1];
    assert_eq!(local_error.path, Some(Path::from("items/2/cost")));
    assert_eq!(
        local_error.extension_code().as_deref(),
        Some("LOCAL_RESOLVER_FAILED")
    );
    assert_eq!(
        local_error.extensions.get("source"),
        Some(&json!("local_state"))
    );
}

#[tokio::test]
async fn null_server_data_stays_null() {
    let local_state = LocalState::builder().resolvers(cart_resolvers()).build();
    let forward = MockForward::builder()
        .mock(
            "{ viewer { id } }",
            vec![
                graphql::Response::builder()
                    .data(Value::Null)
                    .error(graphql::Error::builder().message("unauthorized").build())
                    .build(),
            ],
        )
        .build();

    let response = single_response(
        &local_state,
        forward,
        request("{ viewer { id } isLoggedIn @client }"),
    )
    .await;

    assert_eq!(response.data, Some(Value::Null));
    assert_eq!(response.errors.len(), 2);
    assert_eq!(response.errors[0].message, "unauthorized");
    assert_eq!(
        response.errors[1].extension_code().as_deref(),
        Some("LOCAL_NULL_ROOT")
    );
}

#[tokio::test]
async fn query_without_client_fields_is_passed_through() {
    let local_state = LocalState::builder().resolvers(cart_resolvers()).build();
    let upstream = graphql::Response::builder()
        .data(json!({ "cart": { "id": "1" } }))
        .extension("cost", json!(3))
        .build();
    let forward = MockForward::builder()
        .mock("{ cart { id } }", vec![upstream.clone()])
        .build();

    let document = Arc::new(parse_query("{ cart { id } }").unwrap());
    let request = Request::from_document_builder()
        .query(document.clone())
        .build();
    let response = single_response(&local_state, forward.clone(), request).await;

    assert_eq!(response, upstream);
    let received = forward.received();
    assert_eq!(received.len(), 1);
    assert!(Arc::ptr_eq(&received[0].query, &document));
}

#[tokio::test]
async fn every_emission_is_merged() {
    let local_state = LocalState::builder().resolvers(cart_resolvers()).build();
    let forward = MockForward::builder()
        .mock(
            "{ remote }",
            vec![
                graphql::Response::builder()
                    .data(json!({ "remote": 1 }))
                    .build(),
                graphql::Response::builder()
                    .data(json!({ "remote": 2 }))
                    .build(),
                graphql::Response::builder().extension("done", json!(true)).build(),
            ],
        )
        .build();

    let mut response = local_state
        .layer()
        .layer(forward)
        .oneshot(request("{ remote isLoggedIn @client }"))
        .await
        .unwrap();

    let mut emissions = Vec::new();
    while let Some(emission) = response.next_response().await {
        emissions.push(emission);
    }
    assert_eq!(emissions.len(), 3);
    assert_eq!(
        emissions[0].data,
        Some(json!({ "remote": 1, "isLoggedIn": true }))
    );
    assert_eq!(
        emissions[1].data,
        Some(json!({ "remote": 2, "isLoggedIn": true }))
    );
    assert_eq!(emissions[2].data, None);
    assert_eq!(emissions[2].extensions.get("done"), Some(&json!(true)));
}

#[tokio::test]
async fn server_part_without_forward_link_fails() {
    let local_state = LocalState::builder().resolvers(cart_resolvers()).build();

    let error: BoxError = LocalStateService::terminal(local_state.clone())
        .oneshot(request("{ remote isLoggedIn @client }"))
        .await
        .err()
        .unwrap();
    assert_eq!(
        error.downcast_ref::<LocalStateError>(),
        Some(&LocalStateError::MissingForwardLink)
    );

    let error: BoxError = LocalStateService::terminal(local_state.clone())
        .oneshot(request("{ remote }"))
        .await
        .err()
        .unwrap();
    assert_eq!(
        error.downcast_ref::<LocalStateError>(),
        Some(&LocalStateError::MissingForwardLink)
    );

    // local only queries need no forward link
    let mut response = LocalStateService::terminal(local_state)
        .oneshot(request("{ isLoggedIn @client }"))
        .await
        .unwrap();
    assert_eq!(
        response.next_response().await.unwrap().data,
        Some(json!({ "isLoggedIn": true }))
    );
}

#[tokio::test]
async fn document_errors_are_returned_before_forwarding() {
    let local_state = LocalState::builder().build();
    let forward = MockForward::builder().build();

    let request = Request::builder()
        .query("query A { a @client } query B { b @client }")
        .operation_name("C")
        .build()
        .unwrap();
    let error = local_state
        .layer()
        .layer(forward.clone())
        .oneshot(request)
        .await
        .err()
        .unwrap();
    assert_eq!(
        error.downcast_ref::<LocalStateError>(),
        Some(&LocalStateError::Spec(SpecError::UnknownOperation(
            "C".to_string()
        )))
    );
    assert!(forward.received().is_empty());

    assert!(matches!(
        Request::builder().query("{ a").build(),
        Err(SpecError::ParsingError(_))
    ));
}

#[tokio::test]
async fn added_resolvers_apply_to_later_requests() {
    let local_state = LocalState::builder().build();
    let terminal = LocalStateService::terminal(local_state.clone());

    let mut response = terminal
        .clone()
        .oneshot(request("{ isLoggedIn @client }"))
        .await
        .unwrap();
    assert_eq!(
        response.next_response().await.unwrap().data,
        Some(json!({ "isLoggedIn": null }))
    );

    local_state.add_resolvers(cart_resolvers());
    let mut response = terminal
        .oneshot(request("{ isLoggedIn @client }"))
        .await
        .unwrap();
    assert_eq!(
        response.next_response().await.unwrap().data,
        Some(json!({ "isLoggedIn": true }))
    );
}

#[tokio::test]
async fn resolvers_use_context_store_and_root_value() {
    let mut resolvers = ResolverMap::new();
    resolvers
        .insert_fn("Mutation", "addToCart", |_, args, context, _| {
            let fragment = parse_query("fragment Added on Cart { items }")?;
            let user: Option<String> = context.context().get("user")?;
            let store = context.store().ok_or("no store")?;
            let written = store.write_fragment(
                "Cart:1",
                &fragment,
                json!({ "items": [args.get("item").cloned().unwrap_or_default()] }),
            );
            Ok(Some(json!({
                "__typename": "AddToCartResult",
                "user": user,
                "ref": written,
            })))
        })
        .insert_fn("Mutation", "version", |parent, _, _, _| {
            Ok(Some(property(&parent, "version")))
        });

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let local_state = LocalState::builder()
        .resolvers(resolvers)
        .store(store.clone())
        .root_value(RootValue::factory(|operation| {
            json!({ "version": operation.operation_name.clone() })
        }))
        .build();

    let context = Context::new();
    context.insert("user", "ada".to_string()).unwrap();
    let request = Request::builder()
        .query(
            r#"mutation Add($item: String!) {
                addToCart(item: $item) @client { user ref }
                version @client
            }"#,
        )
        .operation_name("Add")
        .variables(
            json!({ "item": "apple" })
                .as_object()
                .cloned()
                .unwrap_or_default(),
        )
        .context(context)
        .build()
        .unwrap();

    let mut response = LocalStateService::terminal(local_state)
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(
        response.next_response().await.unwrap().data,
        Some(json!({
            "addToCart": { "user": "ada", "ref": { "__ref": "Cart:1" } },
            "version": "Add",
        }))
    );
    let fragment = parse_query("fragment Read on Cart { items }").unwrap();
    assert_eq!(
        store.read_fragment("Cart:1", &fragment),
        Some(json!({ "items": ["apple"] }))
    );
}

#[tokio::test]
async fn warnings_can_be_disabled() {
    let configuration: Configuration = "warnings:\n  missing_resolver: false\n"
        .parse()
        .unwrap();
    assert!(!configuration.warnings().missing_resolver);

    let local_state = LocalState::builder().configuration(configuration).build();
    let mut response = LocalStateService::terminal(local_state)
        .oneshot(request("{ unknown @client }"))
        .await
        .unwrap();
    assert_eq!(
        response.next_response().await.unwrap().data,
        Some(json!({ "unknown": null }))
    );
}

#[tokio::test]
async fn operation_without_local_fields_is_passed_through() {
    let local_state = LocalState::builder().resolvers(cart_resolvers()).build();
    let forward = MockForward::builder()
        .mock(
            "query Remote { remote } query Local { isLoggedIn @client }",
            vec![graphql::Response::builder().data(json!({ "remote": 1 })).build()],
        )
        .build();

    let document = Arc::new(
        parse_query("query Remote { remote } query Local { isLoggedIn @client }").unwrap(),
    );
    let request = Request::from_document_builder()
        .query(document.clone())
        .operation_name("Remote")
        .build();
    let response = single_response(&local_state, forward.clone(), request).await;

    assert_eq!(response.data, Some(json!({ "remote": 1 })));
    assert!(Arc::ptr_eq(&forward.received()[0].query, &document));
}
