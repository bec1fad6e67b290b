use crate::resources::argo::Workflow;
use reqwest::{Client, StatusCode, header, redirect};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Request: {0}")]
    Request(reqwest::Error),

    #[error("BadStatusCode: {0}")]
    BadStatusCode(StatusCode),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Client for the Argo Server REST API
#[derive(Clone)]
pub struct ArgoServerClient {
    token: Option<String>,
    url: String,
    http_client: Client,
}

#[derive(Serialize)]
struct WorkflowCreateRequest<'a> {
    namespace: &'a str,
    workflow: &'a Workflow,
}

fn workflows_url(url: &str, namespace: &str) -> String {
    format!("{0}/api/v1/workflows/{1}", url.trim_end_matches('/'), namespace)
}

static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

impl ArgoServerClient {
    pub fn new(url: String, token: Option<String>) -> Result<ArgoServerClient, Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "Content-Type",
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "Accept",
            header::HeaderValue::from_static("application/json"),
        );

        let http_client = reqwest::ClientBuilder::new()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(Error::Request)?;

        Ok(ArgoServerClient {
            token,
            url,
            http_client,
        })
    }

    pub async fn create_workflow(
        &self,
        namespace: &str,
        workflow: &Workflow,
    ) -> Result<Workflow, Error> {
        let body = WorkflowCreateRequest {
            namespace,
            workflow,
        };

        let mut request = self
            .http_client
            .post(workflows_url(&self.url, namespace))
            .json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(res) => {
                let status_code = res.status();
                if !status_code.is_success() {
                    return Err(Error::BadStatusCode(status_code));
                }
                res.json::<Workflow>().await.map_err(Error::Request)
            }
            Err(err) => Err(Error::Request(err)),
        }
    }
}
