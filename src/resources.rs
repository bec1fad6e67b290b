use crate::{AppliedResource, Error, Metrics, Result, Settings, settings::ConflictPolicy, settings::Credentials};
use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, SecretKeySelector};
use kube::{
    Resource, ResourceExt,
    api::{Api, DeleteParams, PostParams},
};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use tracing::*;

pub mod argo;
pub mod minio;

/// Keys looked up in the credentials Secret
pub static ACCESS_KEY: &str = "access-key";
pub static SECRET_KEY: &str = "secret-key";

/// Outcome of a create call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Applied {
    Created,
    AlreadyExists,
}

impl Applied {
    pub fn as_str(&self) -> &'static str {
        match self {
            Applied::Created => "created",
            Applied::AlreadyExists => "already_exists",
        }
    }
}

pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists")
}

pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Create `object`, treating an existing object of the same name according to `policy`
///
/// Existing objects are never compared against `object` or updated.
pub async fn create_or_ignore<K>(
    api: &Api<K>,
    object: &K,
    policy: ConflictPolicy,
    metrics: &Metrics,
) -> Result<AppliedResource>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
{
    let kind = K::kind(&()).to_string();
    let name = object.name_any();

    let outcome = match api.create(&PostParams::default(), object).await {
        Ok(_) => {
            info!("Created {kind} \"{name}\"");
            Applied::Created
        }
        Err(err) if is_already_exists(&err) => match policy {
            ConflictPolicy::Ignore => {
                warn!("{kind} \"{name}\" already exists, leaving it untouched");
                Applied::AlreadyExists
            }
            ConflictPolicy::Fail => {
                metrics.resources.record(&kind, "conflict");
                return Err(Error::AlreadyExists { kind, name });
            }
        },
        Err(err) => {
            metrics.resources.record(&kind, "error");
            return Err(Error::KubeError(err));
        }
    };

    metrics.resources.record(&kind, outcome.as_str());
    Ok(AppliedResource {
        kind,
        name,
        outcome,
    })
}

/// Delete `name`, returning whether it existed
pub async fn delete_or_ignore<K>(api: &Api<K>, name: &str) -> Result<bool>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let kind = K::kind(&());
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => {
            info!("Deleted {kind} \"{name}\"");
            Ok(true)
        }
        Err(err) if is_not_found(&err) => {
            debug!("{kind} \"{name}\" not found");
            Ok(false)
        }
        Err(err) => Err(Error::KubeError(err)),
    }
}

/// Credential environment variables, inline or from the configured Secret
pub fn credential_env(credentials: &Credentials, user_var: &str, secret_var: &str) -> Vec<EnvVar> {
    let var = |name: &str, key: &str, value: &str| match &credentials.secret_name {
        Some(secret) => EnvVar {
            name: name.to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: secret.clone(),
                    key: key.to_string(),
                    optional: None,
                }),
                ..EnvVarSource::default()
            }),
            ..EnvVar::default()
        },
        None => EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..EnvVar::default()
        },
    };

    vec![
        var(user_var, ACCESS_KEY, &credentials.access_key),
        var(secret_var, SECRET_KEY, &credentials.secret_key),
    ]
}

/// Every manifest a run would apply, as a multi-document YAML stream
pub fn render(settings: &Settings) -> Result<String> {
    let mut documents = Vec::new();

    if settings.workflow.variant.needs_object_store() {
        documents.push(serde_yaml::to_string(&minio::persistent_volume_claim(settings))?);
        documents.push(serde_yaml::to_string(&minio::deployment(settings))?);
        documents.push(serde_yaml::to_string(&minio::service(settings))?);
    }
    documents.push(serde_yaml::to_string(&argo::builder::workflow_for(settings))?);

    Ok(documents
        .into_iter()
        .map(|document| format!("---\n{document}"))
        .collect())
}
