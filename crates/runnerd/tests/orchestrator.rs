use std::sync::Arc;
use std::time::Duration;

use runner_core::config::RunnerConfig;
use runner_core::state::JobStatus;
use runner_core::types::{Job, JobId, WorkflowReport};
use runner_github::GitHubClient;
use runner_notify::{CallbackSigner, SIGNATURE_HEADER};
use runnerd::{JobOrchestrator, OrchestratorError};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "s3cret";
const DISPATCH_PATH: &str = "/repos/agent-bot/agent-runner/actions/workflows/run.yml/dispatches";

fn orchestrator(server: &MockServer) -> JobOrchestrator {
    let mut config = RunnerConfig::default();
    config.github.api_base = server.uri();
    config.callback.backoff_secs = 0;
    config.callback.max_attempts = 2;
    config.callback.timeout_secs = 2;

    let api = GitHubClient::with_base_url(server.uri(), "test-token", Duration::from_secs(5));
    JobOrchestrator::with_api(Arc::new(api), &config, Some(SECRET.to_string()))
}

fn new_job(orchestrator: &JobOrchestrator, server: &MockServer) -> Job {
    orchestrator
        .new_job("octo/demo", "fix typo in README", Some(format!("{}/hook", server.uri())))
        .expect("valid job")
}

async fn mount_existing_fork(server: &MockServer) {
    mount_existing_fork_with_sync(server, 200).await;
}

async fn mount_existing_fork_with_sync(server: &MockServer, sync_status: u16) {
    Mock::given(method("GET"))
        .and(path("/repos/agent-bot/demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "full_name": "agent-bot/demo",
            "fork": true,
            "parent": { "full_name": "octo/demo" },
            "permissions": { "push": true }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "full_name": "octo/demo",
            "fork": false,
            "default_branch": "main"
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/agent-bot/demo/merge-upstream"))
        .respond_with(ResponseTemplate::new(sync_status))
        .mount(server)
        .await;
}

async fn mount_hook(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Bodies of every callback the server received, after checking each
/// signature.
async fn callbacks(server: &MockServer) -> Vec<Value> {
    let verifier = CallbackSigner::new(Some(SECRET.to_string()));
    server
        .received_requests()
        .await
        .expect("recording enabled")
        .into_iter()
        .filter(|request| request.url.path() == "/hook")
        .map(|request| {
            let signature = request
                .headers
                .get(SIGNATURE_HEADER)
                .and_then(|value| value.to_str().ok())
                .expect("signed callback")
                .to_string();
            assert!(verifier.verify_signature(&request.body, &signature));
            serde_json::from_slice(&request.body).expect("json callback")
        })
        .collect()
}

#[tokio::test]
async fn start_forks_and_triggers_workflow() {
    let server = MockServer::start().await;
    mount_existing_fork(&server).await;
    Mock::given(method("POST"))
        .and(path(DISPATCH_PATH))
        .and(body_partial_json(json!({
            "ref": "main",
            "inputs": {
                "fork_repo": "agent-bot/demo",
                "upstream_repo": "octo/demo",
                "prompt": "fix typo in README"
            }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    mount_hook(&server).await;

    let orchestrator = orchestrator(&server);
    let mut job = new_job(&orchestrator, &server);
    orchestrator.start(&mut job).await.expect("start");

    assert_eq!(job.status, JobStatus::Triggered);
    assert_eq!(job.fork_repo.as_deref(), Some("agent-bot/demo"));
    assert!(job.error.is_none());
    assert!(job.updated_at >= job.created_at);
    assert!(callbacks(&server).await.is_empty());
}

#[tokio::test]
async fn failed_fork_sync_still_triggers_workflow() {
    let server = MockServer::start().await;
    mount_existing_fork_with_sync(&server, 500).await;
    Mock::given(method("POST"))
        .and(path(DISPATCH_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    mount_hook(&server).await;

    let orchestrator = orchestrator(&server);
    let mut job = new_job(&orchestrator, &server);
    orchestrator.start(&mut job).await.expect("start");

    assert_eq!(job.status, JobStatus::Triggered);
    assert_eq!(job.fork_repo.as_deref(), Some("agent-bot/demo"));
    assert!(job.error.is_none());
    assert!(callbacks(&server).await.is_empty());

    let synced = server
        .received_requests()
        .await
        .expect("recording enabled")
        .iter()
        .filter(|request| request.url.path() == "/repos/agent-bot/demo/merge-upstream")
        .count();
    assert_eq!(synced, 1);
}

#[tokio::test]
async fn dispatch_failure_fails_job_and_sends_one_callback() {
    let server = MockServer::start().await;
    mount_existing_fork(&server).await;
    Mock::given(method("POST"))
        .and(path(DISPATCH_PATH))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({ "message": "Unexpected inputs provided" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_hook(&server).await;

    let orchestrator = orchestrator(&server);
    let mut job = new_job(&orchestrator, &server);
    orchestrator.start(&mut job).await.expect("failure is recorded, not returned");

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.clone().expect("error recorded");
    assert!(error.contains("422"), "{error}");
    assert!(job.pr_url.is_none());

    let sent = callbacks(&server).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["status"], "failed");
    assert_eq!(sent[0]["job_id"], job.job_id.to_string());
    assert_eq!(sent[0]["fork_repo"], "agent-bot/demo");
    assert_eq!(sent[0]["error"], Value::String(error));
}

#[tokio::test]
async fn unrelated_repository_at_fork_path_fails_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/agent-bot/demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "full_name": "agent-bot/demo",
            "fork": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DISPATCH_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;
    mount_hook(&server).await;

    let orchestrator = orchestrator(&server);
    let mut job = new_job(&orchestrator, &server);
    orchestrator.start(&mut job).await.expect("start");

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.fork_repo.is_none());
    assert!(job.error.as_deref().unwrap_or_default().contains("agent-bot/demo"));

    let sent = callbacks(&server).await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].get("fork_repo").is_none());
}

fn running_job(server: &MockServer) -> Job {
    let mut job = Job::new(
        JobId::new("J1"),
        "octo/demo",
        "fix typo in README",
        Some(format!("{}/hook", server.uri())),
    );
    job.status = JobStatus::Running;
    job.fork_repo = Some("agent-bot/demo".to_string());
    job
}

#[tokio::test]
async fn finish_with_changes_opens_pr_and_completes() {
    let server = MockServer::start().await;
    mount_existing_fork(&server).await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/demo/pulls"))
        .and(body_partial_json(json!({
            "title": "bot: fix typo in README",
            "head": "agent-bot:bot/j1",
            "base": "main"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "number": 7,
            "html_url": "https://github.com/octo/demo/pull/7"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_hook(&server).await;

    let orchestrator = orchestrator(&server);
    let mut job = running_job(&server);
    orchestrator
        .finish(
            &mut job,
            WorkflowReport::Succeeded {
                branch: "bot/j1".to_string(),
                has_changes: true,
            },
        )
        .await
        .expect("finish");

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(
        job.pr_url.as_deref(),
        Some("https://github.com/octo/demo/pull/7")
    );
    assert!(job.error.is_none());

    let sent = callbacks(&server).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["status"], "completed");
    assert_eq!(sent[0]["pr_url"], "https://github.com/octo/demo/pull/7");
    assert_eq!(sent[0]["branch"], "bot/j1");
}

#[tokio::test]
async fn finish_without_changes_completes_without_pr() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/demo/pulls"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;
    mount_hook(&server).await;

    let orchestrator = orchestrator(&server);
    let mut job = running_job(&server);
    job.status = JobStatus::Triggered;
    orchestrator
        .finish(
            &mut job,
            WorkflowReport::Succeeded {
                branch: "bot/j1".to_string(),
                has_changes: false,
            },
        )
        .await
        .expect("finish");

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.pr_url.is_none());

    let sent = callbacks(&server).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["status"], "completed");
    assert!(sent[0].get("pr_url").is_none());
}

#[tokio::test]
async fn pr_failure_fails_job() {
    let server = MockServer::start().await;
    mount_existing_fork(&server).await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/demo/pulls"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "Validation Failed",
            "errors": [{ "message": "No commits between main and agent-bot:bot/j1" }]
        })))
        .mount(&server)
        .await;
    mount_hook(&server).await;

    let orchestrator = orchestrator(&server);
    let mut job = running_job(&server);
    orchestrator
        .finish(
            &mut job,
            WorkflowReport::Succeeded {
                branch: "bot/j1".to_string(),
                has_changes: true,
            },
        )
        .await
        .expect("finish");

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.pr_url.is_none());
    assert!(job
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("No commits between"));
    assert_eq!(callbacks(&server).await[0]["status"], "failed");
}

#[tokio::test]
async fn workflow_failure_report_fails_job() {
    let server = MockServer::start().await;
    mount_hook(&server).await;

    let orchestrator = orchestrator(&server);
    let mut job = running_job(&server);
    orchestrator
        .finish(
            &mut job,
            WorkflowReport::Failed {
                error: "agent exited with status 1".to_string(),
            },
        )
        .await
        .expect("finish");

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("agent exited with status 1"));
    assert_eq!(callbacks(&server).await.len(), 1);
}

#[tokio::test]
async fn callback_failure_does_not_change_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server);
    let mut job = running_job(&server);
    orchestrator
        .finish(
            &mut job,
            WorkflowReport::Succeeded {
                branch: "bot/j1".to_string(),
                has_changes: false,
            },
        )
        .await
        .expect("finish");

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.error.is_none());
}

#[tokio::test]
async fn cancel_sends_no_callback_and_blocks_further_steps() {
    let server = MockServer::start().await;
    mount_hook(&server).await;

    let orchestrator = orchestrator(&server);
    let mut job = running_job(&server);
    orchestrator.cancel(&mut job).expect("cancel");
    assert_eq!(job.status, JobStatus::Cancelled);

    let err = orchestrator
        .finish(
            &mut job,
            WorkflowReport::Failed {
                error: "late".to_string(),
            },
        )
        .await
        .expect_err("terminal job");
    assert!(matches!(err, OrchestratorError::StateMachine(_)));
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(callbacks(&server).await.is_empty());
}

#[tokio::test]
async fn mark_running_records_run_id() {
    let server = MockServer::start().await;
    let orchestrator = orchestrator(&server);
    let mut job = running_job(&server);
    job.status = JobStatus::Triggered;

    orchestrator
        .mark_running(&mut job, Some(4242))
        .expect("running");
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.workflow_run_id, Some(4242));

    assert!(orchestrator.mark_running(&mut job, None).is_err());
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let server = MockServer::start().await;
    let orchestrator = orchestrator(&server);
    let mut job = running_job(&server);
    let err = orchestrator.start(&mut job).await.expect_err("not pending");
    assert!(matches!(err, OrchestratorError::StateMachine(_)));
    assert_eq!(job.status, JobStatus::Running);
}
