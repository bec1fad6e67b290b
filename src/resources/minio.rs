use crate::{
    AppliedResource, Context, Result, Settings,
    resources::{create_or_ignore, credential_env, delete_or_ignore},
};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            Container, ContainerPort, PersistentVolumeClaim, PersistentVolumeClaimSpec,
            PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Service, ServicePort,
            ServiceSpec, Volume, VolumeMount, VolumeResourceRequirements,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity, apis::meta::v1::LabelSelector, apis::meta::v1::ObjectMeta,
        util::intstr::IntOrString,
    },
};
use kube::api::Api;
use std::collections::BTreeMap;
use tracing::*;

pub mod readiness;

static DATA_VOLUME: &str = "minio-data";
static DATA_PATH: &str = "/data";

fn metadata(name: &str, settings: &Settings) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(settings.namespace.clone()),
        ..ObjectMeta::default()
    }
}

pub fn persistent_volume_claim(settings: &Settings) -> PersistentVolumeClaim {
    let minio = settings.minio();

    PersistentVolumeClaim {
        metadata: metadata(&minio.pvc_name, settings),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: minio.storage_class.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(minio.storage.clone()),
                )])),
                ..VolumeResourceRequirements::default()
            }),
            ..PersistentVolumeClaimSpec::default()
        }),
        ..PersistentVolumeClaim::default()
    }
}

pub fn deployment(settings: &Settings) -> Deployment {
    let minio = settings.minio();

    let container = Container {
        name: minio.name.clone(),
        image: Some(minio.image.clone()),
        args: Some(minio.args.clone()),
        ports: Some(vec![
            ContainerPort {
                name: Some("api".to_string()),
                container_port: minio.api_port,
                ..ContainerPort::default()
            },
            ContainerPort {
                name: Some("console".to_string()),
                container_port: minio.console_port,
                ..ContainerPort::default()
            },
        ]),
        env: Some(credential_env(
            &settings.credentials,
            "MINIO_ROOT_USER",
            "MINIO_ROOT_PASSWORD",
        )),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_PATH.to_string(),
            ..VolumeMount::default()
        }]),
        ..Container::default()
    };

    Deployment {
        metadata: metadata(&minio.name, settings),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(minio.labels.clone()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(minio.labels.clone()),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: DATA_VOLUME.to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: minio.pvc_name.clone(),
                            read_only: None,
                        }),
                        ..Volume::default()
                    }]),
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

pub fn service(settings: &Settings) -> Service {
    let minio = settings.minio();
    let port = |name: &str, port: i32| ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        ..ServicePort::default()
    };

    Service {
        metadata: metadata(&minio.name, settings),
        spec: Some(ServiceSpec {
            selector: Some(minio.labels.clone()),
            ports: Some(vec![
                port("api", minio.api_port),
                port("console", minio.console_port),
            ]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Create the PVC, Deployment and Service, in that order
///
/// The first failure aborts; objects created before it are left in place.
#[instrument(skip(ctx), fields(namespace = %ctx.namespace()))]
pub async fn provision(ctx: &Context) -> Result<Vec<AppliedResource>> {
    let settings = &*ctx.settings;
    let client = ctx.kube_client.clone();
    let namespace = ctx.namespace();
    let policy = settings.provision.conflict_policy;

    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let services: Api<Service> = Api::namespaced(client, namespace);

    Ok(vec![
        create_or_ignore(&pvcs, &persistent_volume_claim(settings), policy, &ctx.metrics).await?,
        create_or_ignore(&deployments, &deployment(settings), policy, &ctx.metrics).await?,
        create_or_ignore(&services, &service(settings), policy, &ctx.metrics).await?,
    ])
}

/// Delete the Service, Deployment and PVC, skipping those already gone
#[instrument(skip(ctx), fields(namespace = %ctx.namespace()))]
pub async fn teardown(ctx: &Context) -> Result<usize> {
    let minio = ctx.settings.minio();
    let client = ctx.kube_client.clone();
    let namespace = ctx.namespace();

    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client, namespace);

    let deleted = [
        delete_or_ignore(&services, &minio.name).await?,
        delete_or_ignore(&deployments, &minio.name).await?,
        delete_or_ignore(&pvcs, &minio.pvc_name).await?,
    ]
    .into_iter()
    .filter(|d| *d)
    .count();

    info!("Removed {deleted} objects");
    Ok(deleted)
}
