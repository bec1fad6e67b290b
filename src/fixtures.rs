//! Helper methods only available for tests
use http::{Method, Request, Response, StatusCode};
use kube::{Client, client::Body};
use serde_json::{Value, json};

pub type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;
pub type Responder = tower_test::mock::SendResponse<Response<Body>>;

/// Scripted stand-in for the Kubernetes API server
pub struct ApiServerVerifier(ApiServerHandle);

/// Client whose requests are answered by the returned verifier
pub fn mock_client() -> (Client, ApiServerVerifier) {
    let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
    (Client::new(mock_service, "argo"), ApiServerVerifier(handle))
}

impl ApiServerVerifier {
    /// Next request, or None once the client is gone
    pub async fn next(&mut self) -> Option<(Request<Body>, Responder)> {
        self.0.next_request().await
    }

    /// Next request, asserting its method and path, with the decoded JSON body
    pub async fn expect(&mut self, method: Method, path: &str) -> (Value, Responder) {
        let (request, send) = self.next().await.expect("service not called");
        assert_eq!(request.method(), &method);
        assert_eq!(request.uri().path(), path);
        let body = request.into_body().collect_bytes().await.unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).expect("request body is json")
        };
        (json, send)
    }

    /// Assert the client issued no further request
    pub async fn done(mut self) {
        assert!(self.next().await.is_none(), "unexpected extra request");
    }
}

pub fn respond(send: Responder, status: StatusCode, body: &Value) {
    send.send_response(
        Response::builder()
            .status(status)
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
    );
}

pub fn status(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code,
    })
}

pub fn already_exists(send: Responder, what: &str) {
    respond(
        send,
        StatusCode::CONFLICT,
        &status(409, "AlreadyExists", &format!("{what} already exists")),
    );
}

pub fn pod(name: &str, ready: bool) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": name, "namespace": "argo", "labels": { "app": "minio" } },
        "status": {
            "phase": if ready { "Running" } else { "Pending" },
            "conditions": [
                { "type": "PodScheduled", "status": "True" },
                { "type": "Ready", "status": if ready { "True" } else { "False" } },
            ]
        }
    })
}

pub fn pod_list(items: Vec<Value>) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "PodList",
        "metadata": { "resourceVersion": "1" },
        "items": items,
    })
}
