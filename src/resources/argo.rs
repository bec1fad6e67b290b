use crate::{ArgoServerClient, Context, Error, Result, settings::SubmitBackend};
use k8s_openapi::api::core::v1::Container;
use kube::{
    CustomResource, ResourceExt,
    api::{Api, PostParams},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::*;

pub mod builder;

/// Workflow on the Argo Workflows controller
///
/// Only the fields this tool writes are modelled; anything else the
/// controller adds is dropped on deserialization.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    kind = "Workflow",
    group = "argoproj.io",
    version = "v1alpha1",
    namespaced,
    shortname = "wf",
    status = "WorkflowStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    pub entrypoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    pub templates: Vec<Template>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<ParallelSteps>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Outputs>,
}

/// One step group; its steps run in parallel, groups run in sequence
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct ParallelSteps(pub Vec<WorkflowStep>);

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct WorkflowStep {
    pub name: String,
    pub template: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct Outputs {
    pub parameters: Vec<Parameter>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    pub value_from: ValueFrom,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct ValueFrom {
    pub path: String,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Workflow {
    /// Templates referenced by the entrypoint, one per step group
    pub fn step_groups(&self) -> Vec<&ParallelSteps> {
        self.spec
            .templates
            .iter()
            .find(|t| t.name == self.spec.entrypoint)
            .and_then(|t| t.steps.as_ref())
            .map(|groups| groups.iter().collect())
            .unwrap_or_default()
    }
}

/// Create `workflow` through the configured backend and return what was stored
#[instrument(skip(ctx, workflow), fields(namespace = %ctx.namespace()))]
pub async fn submit(ctx: &Context, workflow: &Workflow) -> Result<Workflow> {
    let namespace = ctx.namespace();
    let submit = &ctx.settings.submit;

    let created = match submit.backend {
        SubmitBackend::Kubernetes => {
            let workflows: Api<Workflow> = Api::namespaced(ctx.kube_client.clone(), namespace);
            workflows
                .create(&PostParams::default(), workflow)
                .await
                .map_err(Error::KubeError)?
        }
        SubmitBackend::ArgoServer => {
            let url = submit
                .argo_server_url
                .clone()
                .ok_or(Error::MissingArgoServerUrl)?;
            ArgoServerClient::new(url, submit.argo_server_token.clone())?
                .create_workflow(namespace, workflow)
                .await?
        }
    };

    info!("Submitted Workflow \"{}\"", created.name_any());
    Ok(created)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        Settings, State,
        fixtures::{mock_client, respond, status},
        settings::Variant,
    };
    use http::{Method, StatusCode};
    use serde_json::json;

    static WORKFLOWS: &str = "/apis/argoproj.io/v1alpha1/namespaces/argo/workflows";

    async fn submit_with_prefix(variant: Variant) -> String {
        let (client, mut server) = mock_client();
        let verifier = tokio::spawn(async move {
            let (mut body, send) = server.expect(Method::POST, WORKFLOWS).await;
            let prefix = body["metadata"]["generateName"].as_str().unwrap().to_string();
            body["metadata"]["name"] = json!(format!("{prefix}x7k2q"));
            body["status"] = json!({ "phase": "Pending" });
            respond(send, StatusCode::CREATED, &body);
            server
        });

        let mut settings = Settings::default();
        settings.workflow.variant = variant;
        let ctx = State::new(settings).to_context(client);
        let workflow = builder::workflow_for(&ctx.settings);
        let created = submit(&ctx, &workflow).await.unwrap();
        drop(ctx);
        verifier.await.unwrap().done().await;

        created.name_any()
    }

    #[tokio::test]
    async fn created_name_keeps_crud_prefix() {
        let name = submit_with_prefix(Variant::MinioCrud).await;
        assert!(name.starts_with("minio-crud-"));
    }

    #[tokio::test]
    async fn created_name_keeps_echo_prefix() {
        let name = submit_with_prefix(Variant::EchoDemo).await;
        assert!(name.starts_with("echo-demo-task-"));
    }

    #[tokio::test]
    async fn submit_propagates_api_errors() {
        let (client, mut server) = mock_client();
        let verifier = tokio::spawn(async move {
            let (_, send) = server.expect(Method::POST, WORKFLOWS).await;
            respond(
                send,
                StatusCode::NOT_FOUND,
                &status(404, "NotFound", "the server could not find the requested resource"),
            );
            server
        });

        let ctx = State::new(Settings::default()).to_context(client);
        let workflow = builder::workflow_for(&ctx.settings);
        let err = submit(&ctx, &workflow).await.unwrap_err();
        drop(ctx);
        verifier.await.unwrap().done().await;

        assert!(matches!(err, Error::KubeError(_)));
    }

    #[tokio::test]
    async fn argo_server_backend_needs_url() {
        let (client, server) = mock_client();
        let mut settings = Settings::default();
        settings.submit.backend = SubmitBackend::ArgoServer;
        let ctx = State::new(settings).to_context(client);
        let workflow = builder::workflow_for(&ctx.settings);

        let err = submit(&ctx, &workflow).await.unwrap_err();
        drop(ctx);
        server.done().await;

        assert!(matches!(err, Error::MissingArgoServerUrl));
    }

    #[test]
    fn step_groups_serialize_as_nested_lists() {
        let template = Template {
            name: "main".into(),
            steps: Some(vec![ParallelSteps(vec![WorkflowStep {
                name: "run-create".into(),
                template: "create".into(),
            }])]),
            ..Template::default()
        };

        assert_eq!(
            serde_json::to_value(&template).unwrap(),
            json!({ "name": "main", "steps": [[{ "name": "run-create", "template": "create" }]] })
        );
    }
}
