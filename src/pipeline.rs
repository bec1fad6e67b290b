use crate::{
    AppliedResource, Context, Error, Result, RunReport,
    resources::{
        argo::{self, Workflow, builder},
        minio::{
            self,
            readiness::{Readiness, wait_for_ready},
        },
    },
    telemetry,
};
use k8s_openapi::api::core::v1::Pod;
use kube::{ResourceExt, api::Api};
use std::future::Future;
use std::sync::Arc;
use tracing::*;

/// Time a stage and count its failure
async fn stage<T>(ctx: &Context, name: &str, work: impl Future<Output = Result<T>>) -> Result<T> {
    let _timer = ctx
        .metrics
        .stages
        .measure(name, &telemetry::get_trace_id());

    work.await.inspect_err(|e| {
        warn!("{name} failed: {e:?}");
        ctx.metrics.stages.set_failure(name, e);
    })
}

pub async fn provision(ctx: &Context) -> Result<Vec<AppliedResource>> {
    stage(ctx, "provision", minio::provision(ctx)).await
}

/// Wait for a MinIO pod to be ready, returning its name and the number of polls
pub async fn wait(ctx: &Context) -> Result<(String, u32)> {
    stage(ctx, "wait", async {
        let selector = ctx.settings.minio().selector();
        let pods: Api<Pod> = Api::namespaced(ctx.kube_client.clone(), ctx.namespace());

        info!("Waiting for pods matching `{selector}` to be ready");
        match wait_for_ready(&pods, &selector, &ctx.settings.readiness, &ctx.metrics).await {
            Readiness::Ready { pod, attempts } => Ok((pod, attempts)),
            Readiness::TimedOut { attempts, elapsed } => Err(Error::ReadinessTimeout {
                selector,
                attempts,
                elapsed,
            }),
        }
    })
    .await
}

pub async fn submit(ctx: &Context) -> Result<Workflow> {
    stage(ctx, "submit", async {
        let workflow = builder::workflow_for(&ctx.settings);
        argo::submit(ctx, &workflow).await
    })
    .await
}

/// Provision, wait and submit, stopping at the first error
///
/// Variants that do not use the object store go straight to submission.
#[instrument(skip(ctx), fields(trace_id))]
pub async fn run(ctx: Arc<Context>) -> Result<RunReport> {
    let trace_id = telemetry::get_trace_id();
    if trace_id != opentelemetry::trace::TraceId::INVALID {
        Span::current().record("trace_id", field::display(&trace_id));
    }

    let mut report = RunReport::new(&ctx.settings);

    if ctx.settings.workflow.variant.needs_object_store() {
        report.resources = provision(&ctx).await?;

        let (pod, attempts) = wait(&ctx).await?;
        report.ready_pod = Some(pod);
        report.readiness_polls = attempts;
    } else {
        info!("Variant {:?} needs no object store", ctx.settings.workflow.variant);
    }

    let workflow = submit(&ctx).await?;
    report.workflow = Some(workflow.name_any());

    Ok(report.finish())
}
