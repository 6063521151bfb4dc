//! Test utilities: a mock forward link.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::Poll;

use futures::StreamExt;
use futures::future;
use futures::stream;
use parking_lot::Mutex;
use tower::BoxError;
use tower::Service;

use crate::graphql;
use crate::services::Operation;
use crate::services::Request;
use crate::services::Response;
use crate::spec::parse_query;

type MockResponses = HashMap<String, Vec<graphql::Response>>;

/// A forward link answering with canned responses, by query.
///
/// Queries are compared once parsed and printed, so formatting differences do not matter.
#[derive(Clone, Default)]
pub struct MockForward {
    // using an arc to improve efficiency when service is cloned
    mocks: Arc<MockResponses>,
    received: Arc<Mutex<Vec<Operation>>>,
}

#[buildstructor::buildstructor]
impl MockForward {
    /// Each mocked query answers with a stream of its responses, in order.
    #[builder(visibility = "pub")]
    fn new(mocks: HashMap<String, Vec<graphql::Response>>) -> Self {
        let mocks = mocks
            .into_iter()
            .map(|(query, responses)| (normalize(&query), responses))
            .collect();
        Self {
            mocks: Arc::new(mocks),
            received: Default::default(),
        }
    }
}

impl MockForward {
    /// The operations forwarded so far.
    pub fn received(&self) -> Vec<Operation> {
        self.received.lock().clone()
    }
}

fn normalize(query: &str) -> String {
    match parse_query(query) {
        Ok(document) => document.to_string(),
        Err(_) => query.to_string(),
    }
}

impl Service<Request> for MockForward {
    type Response = Response;

    type Error = BoxError;

    type Future = future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let query = req.operation.query.to_string();
        self.received.lock().push(req.operation);
        let responses = match self.mocks.get(&query) {
            Some(responses) => responses.clone(),
            None => vec![
                graphql::Response::builder()
                    .error(
                        graphql::Error::builder()
                            .message(format!("couldn't find mock for query {query}"))
                            .extension_code("MOCK_NOT_FOUND")
                            .build(),
                    )
                    .build(),
            ],
        };
        future::ok(Response {
            response: stream::iter(responses).boxed(),
            context: req.context,
        })
    }
}
