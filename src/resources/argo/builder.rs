use super::{Outputs, ParallelSteps, Parameter, Template, ValueFrom, Workflow, WorkflowSpec, WorkflowStep};
use crate::{
    Settings,
    resources::credential_env,
    settings::{Variant, Workflow as WorkflowSettings},
};
use k8s_openapi::{api::core::v1::Container, apimachinery::pkg::apis::meta::v1::ObjectMeta};

/// Operations run against the bucket, in the order the workflow runs them
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrudOp {
    Create,
    Read,
    Update,
    Delete,
}

impl CrudOp {
    pub const ALL: [CrudOp; 4] = [CrudOp::Create, CrudOp::Read, CrudOp::Update, CrudOp::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrudOp::Create => "create",
            CrudOp::Read => "read",
            CrudOp::Update => "update",
            CrudOp::Delete => "delete",
        }
    }

    pub fn step_name(&self) -> String {
        format!("run-{}", self.as_str())
    }
}

/// Shell script run by the AWS CLI container for `op`
///
/// Each step pulls the object (or starts empty), appends a marker line and
/// uploads it again, so the final object records every step that ran.
pub fn crud_script(op: CrudOp, workflow: &WorkflowSettings) -> String {
    let fetch = match op {
        CrudOp::Create => "aws --endpoint-url $ENDPOINT s3 mb s3://$BUCKET || true",
        _ => "aws --endpoint-url $ENDPOINT s3 cp s3://$BUCKET/$KEY $FILE || touch $FILE",
    };

    format!(
        r#"FILE="{file}"
BUCKET="{bucket}"
KEY="{key}"
ENDPOINT="{endpoint}"

{fetch}
echo "{op} success" >> $FILE
aws --endpoint-url $ENDPOINT s3 cp $FILE s3://$BUCKET/$KEY
cat $FILE
"#,
        file = workflow.scratch_file,
        bucket = workflow.bucket,
        key = workflow.object_key,
        endpoint = workflow.endpoint,
        op = op.as_str(),
    )
}

/// Container template running `script` with the object store credentials
pub fn script_template(name: &str, script: String, settings: &Settings) -> Template {
    let workflow = settings.workflow();

    Template {
        name: name.to_string(),
        container: Some(Container {
            name: "main".to_string(),
            image: Some(workflow.cli_image.clone()),
            env: Some(credential_env(
                &settings.credentials,
                "AWS_ACCESS_KEY_ID",
                "AWS_SECRET_ACCESS_KEY",
            )),
            command: Some(vec!["sh".to_string(), "-c".to_string()]),
            args: Some(vec![script]),
            ..Container::default()
        }),
        outputs: workflow.capture_outputs.then(|| Outputs {
            parameters: vec![Parameter {
                name: "result".to_string(),
                value_from: ValueFrom {
                    path: workflow.scratch_file.clone(),
                },
            }],
        }),
        ..Template::default()
    }
}

/// Placeholder template that only echoes its name
pub fn echo_template(name: &str, settings: &Settings) -> Template {
    Template {
        name: name.to_string(),
        container: Some(Container {
            name: "main".to_string(),
            image: Some(settings.workflow().echo_image.clone()),
            command: Some(vec!["echo".to_string()]),
            args: Some(vec![format!("{name} task")]),
            ..Container::default()
        }),
        ..Template::default()
    }
}

pub fn crud_steps(settings: &Settings) -> Vec<(String, Template)> {
    CrudOp::ALL
        .iter()
        .map(|op| {
            let script = crud_script(*op, settings.workflow());
            (op.step_name(), script_template(op.as_str(), script, settings))
        })
        .collect()
}

pub fn echo_steps(settings: &Settings) -> Vec<(String, Template)> {
    CrudOp::ALL
        .iter()
        .map(|op| (op.step_name(), echo_template(op.as_str(), settings)))
        .collect()
}

/// Workflow running each `(step name, template)` pair as its own step group, in order
pub fn build_workflow(settings: &Settings, steps: Vec<(String, Template)>) -> Workflow {
    let workflow = settings.workflow();

    let groups = steps
        .iter()
        .map(|(step, template)| {
            ParallelSteps(vec![WorkflowStep {
                name: step.clone(),
                template: template.name.clone(),
            }])
        })
        .collect();

    let entrypoint = Template {
        name: workflow.entrypoint.clone(),
        steps: Some(groups),
        ..Template::default()
    };

    let mut templates = vec![entrypoint];
    templates.extend(steps.into_iter().map(|(_, template)| template));

    Workflow {
        metadata: ObjectMeta {
            generate_name: Some(workflow.generate_name()),
            namespace: Some(settings.namespace.clone()),
            ..ObjectMeta::default()
        },
        spec: WorkflowSpec {
            entrypoint: workflow.entrypoint.clone(),
            service_account_name: Some(workflow.service_account.clone()),
            templates,
        },
        status: None,
    }
}

/// Workflow for the configured variant
pub fn workflow_for(settings: &Settings) -> Workflow {
    let steps = match settings.workflow().variant {
        Variant::MinioCrud => crud_steps(settings),
        Variant::EchoDemo => echo_steps(settings),
    };
    build_workflow(settings, steps)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_json_diff::assert_json_include;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn crud_workflow_has_four_ordered_groups() {
        let workflow = workflow_for(&Settings::default());
        let groups = workflow.step_groups();

        assert_eq!(groups.len(), 4);
        let steps: Vec<_> = groups
            .iter()
            .map(|g| {
                assert_eq!(g.0.len(), 1);
                (g.0[0].name.as_str(), g.0[0].template.as_str())
            })
            .collect();
        assert_eq!(
            steps,
            [
                ("run-create", "create"),
                ("run-read", "read"),
                ("run-update", "update"),
                ("run-delete", "delete"),
            ]
        );

        let referenced: HashSet<_> = steps.iter().map(|(_, t)| *t).collect();
        assert_eq!(referenced.len(), 4);
        for name in referenced {
            assert!(workflow.spec.templates.iter().any(|t| t.name == name));
        }
    }

    #[test]
    fn workflow_metadata_and_entrypoint() {
        let json = serde_json::to_value(workflow_for(&Settings::default())).unwrap();

        assert_json_include!(
            actual: json,
            expected: json!({
                "apiVersion": "argoproj.io/v1alpha1",
                "kind": "Workflow",
                "metadata": { "generateName": "minio-crud-", "namespace": "argo" },
                "spec": {
                    "entrypoint": "main",
                    "serviceAccountName": "argo",
                    "templates": [
                        { "name": "main" },
                        {
                            "name": "create",
                            "container": {
                                "image": "amazon/aws-cli:latest",
                                "command": ["sh", "-c"],
                                "env": [
                                    { "name": "AWS_ACCESS_KEY_ID", "value": "minioadmin" },
                                    { "name": "AWS_SECRET_ACCESS_KEY", "value": "thisisfortesting" },
                                ],
                            },
                        },
                    ],
                },
            })
        );
    }

    #[test]
    fn create_script_makes_bucket_others_fetch_object() {
        let settings = Settings::default();
        let create = crud_script(CrudOp::Create, settings.workflow());
        let update = crud_script(CrudOp::Update, settings.workflow());

        assert!(create.contains("s3 mb s3://$BUCKET || true"));
        assert!(create.contains("echo \"create success\" >> $FILE"));
        assert!(!create.contains("|| touch $FILE"));

        assert!(update.contains("s3 cp s3://$BUCKET/$KEY $FILE || touch $FILE"));
        assert!(update.contains("echo \"update success\" >> $FILE"));
        assert!(update.contains("ENDPOINT=\"http://minio:9000\""));
        assert!(update.contains("BUCKET=\"testbucket\""));
        assert!(update.contains("FILE=\"/tmp/himinio.txt\""));
    }

    #[test]
    fn scripts_follow_configured_bucket() {
        let mut settings = Settings::default();
        settings.workflow.bucket = "audit".into();
        settings.workflow.endpoint = "http://store.storage:9000".into();

        let script = crud_script(CrudOp::Read, settings.workflow());
        assert!(script.contains("BUCKET=\"audit\""));
        assert!(script.contains("ENDPOINT=\"http://store.storage:9000\""));
    }

    #[test]
    fn captured_outputs_read_scratch_file() {
        let mut settings = Settings::default();
        settings.workflow.capture_outputs = true;
        let workflow = workflow_for(&settings);

        let outputs: Vec<_> = workflow
            .spec
            .templates
            .iter()
            .filter_map(|t| t.outputs.as_ref())
            .collect();
        assert_eq!(outputs.len(), 4);
        assert!(
            outputs
                .iter()
                .all(|o| o.parameters[0].value_from.path == "/tmp/himinio.txt")
        );
    }

    #[test]
    fn echo_demo_uses_placeholder_containers() {
        let mut settings = Settings::default();
        settings.workflow.variant = Variant::EchoDemo;
        let workflow = workflow_for(&settings);

        assert_eq!(workflow.metadata.generate_name.as_deref(), Some("echo-demo-task-"));
        assert_eq!(workflow.step_groups().len(), 4);
        let delete = workflow
            .spec
            .templates
            .iter()
            .find(|t| t.name == "delete")
            .and_then(|t| t.container.as_ref())
            .unwrap();
        assert_eq!(delete.args.as_deref(), Some(&["delete task".to_string()][..]));
        assert!(delete.env.is_none());
    }

    #[test]
    fn builder_accepts_any_step_list() {
        let settings = Settings::default();
        let steps = vec![
            ("first".to_string(), echo_template("a", &settings)),
            ("second".to_string(), echo_template("b", &settings)),
        ];
        let workflow = build_workflow(&settings, steps);

        let names: Vec<_> = workflow.spec.templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["main", "a", "b"]);
        assert_eq!(workflow.step_groups()[1].0[0].name, "second");
    }
}
