//! # Renderer Tests
//!
//! Rendered agent configuration: structure, determinism and diagnostics.

mod common;

use common::*;
use serde_json::json;
use serde_yaml::Value;
use telemetry_agent_operator::constants::{DEFAULT_POSITIONS_DIRECTORY, DEFAULT_WAL_DIRECTORY};
use telemetry_agent_operator::controller::render::{render_resolved, ResolvedSecrets};
use telemetry_agent_operator::prelude::*;

async fn render_yaml(desired: &DesiredState, kind: ArtifactKind) -> Value {
    let artifact = render(desired, kind, &secrets()).await.unwrap();
    assert_eq!(artifact.kind, kind);
    serde_yaml::from_slice(&artifact.content).unwrap()
}

async fn diagnostics_of(desired: &DesiredState, kind: ArtifactKind) -> Vec<(String, String)> {
    match render(desired, kind, &secrets()).await {
        Err(RenderError::RenderingFailed { diagnostics }) => diagnostics
            .entries
            .into_iter()
            .map(|d| (d.path, d.message))
            .collect(),
        other => panic!("expected RenderingFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_render_is_byte_stable() {
    let desired = desired(json!({
        "externalLabels": { "cluster": "prod", "region": "eu1" },
        "metrics": [metrics_instance("b"), metrics_instance("a")],
        "logs": [logs_instance("default")]
    }));

    for kind in ArtifactKind::ALL {
        let first = render(&desired, kind, &secrets()).await.unwrap();
        let second = render(&desired, kind, &secrets()).await.unwrap();
        assert_eq!(first.content, second.content, "{kind} output differs");
    }
}

#[tokio::test]
async fn test_metrics_document_layout() {
    let desired = desired(json!({
        "logLevel": "debug",
        "externalLabels": { "cluster": "prod" },
        "metrics": [metrics_instance("default")]
    }));

    let doc = render_yaml(&desired, ArtifactKind::Metrics).await;

    assert_eq!(doc["server"]["log_level"].as_str(), Some("debug"));
    assert_eq!(doc["metrics"]["wal_directory"].as_str(), Some(DEFAULT_WAL_DIRECTORY));
    assert_eq!(doc["metrics"]["global"]["scrape_interval"].as_str(), Some("1m"));
    assert_eq!(doc["metrics"]["global"]["scrape_timeout"].as_str(), Some("10s"));
    assert_eq!(
        doc["metrics"]["global"]["external_labels"]["cluster"].as_str(),
        Some("prod")
    );

    let config = &doc["metrics"]["configs"][0];
    assert_eq!(config["name"].as_str(), Some("monitoring/default"));
    let remote_write = &config["remote_write"][0];
    assert_eq!(
        remote_write["url"].as_str(),
        Some("https://prometheus.example.com/api/v1/write")
    );
    assert_eq!(remote_write["basic_auth"]["username"].as_str(), Some("prom-user"));
    assert_eq!(remote_write["basic_auth"]["password"].as_str(), Some("s3cr3t"));

    let scrape = &config["scrape_configs"][0];
    assert_eq!(scrape["job_name"].as_str(), Some("node"));
    assert_eq!(
        scrape["static_configs"][0]["targets"][0].as_str(),
        Some("node-exporter:9100")
    );
}

#[tokio::test]
async fn test_logs_document_layout() {
    let desired = desired(json!({
        "externalLabels": { "cluster": "prod", "env": "staging" },
        "logs": [{
            "name": "default",
            "clients": [{
                "url": "https://loki.example.com/loki/api/v1/push",
                "tenantId": "team-a",
                "bearerToken": { "name": "loki", "key": "token" },
                "externalLabels": { "env": "prod" }
            }]
        }]
    }));

    let doc = render_yaml(&desired, ArtifactKind::Logs).await;

    assert_eq!(
        doc["logs"]["positions_directory"].as_str(),
        Some(DEFAULT_POSITIONS_DIRECTORY)
    );
    let config = &doc["logs"]["configs"][0];
    assert_eq!(config["name"].as_str(), Some("monitoring/default"));
    assert_eq!(
        config["positions"]["filename"].as_str().map(str::to_string),
        Some(format!("{DEFAULT_POSITIONS_DIRECTORY}/default.yml"))
    );

    let client = &config["clients"][0];
    assert_eq!(client["tenant_id"].as_str(), Some("team-a"));
    assert_eq!(client["bearer_token"].as_str(), Some("loki-token"));
    // Client labels win over agent-wide ones
    assert_eq!(client["external_labels"]["env"].as_str(), Some("prod"));
    assert_eq!(client["external_labels"]["cluster"].as_str(), Some("prod"));
}

#[tokio::test]
async fn test_instances_are_emitted_in_name_order() {
    let desired = desired(json!({
        "metrics": [metrics_instance("zeta"), metrics_instance("alpha"), metrics_instance("mid")]
    }));

    let doc = render_yaml(&desired, ArtifactKind::Metrics).await;
    let names: Vec<&str> = doc["metrics"]["configs"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();

    assert_eq!(names, vec!["monitoring/alpha", "monitoring/mid", "monitoring/zeta"]);
}

#[tokio::test]
async fn test_only_the_selected_kind_is_rendered() {
    let desired = desired(json!({
        "metrics": [metrics_instance("default")],
        "logs": [{ "name": "broken", "clients": [] }]
    }));

    // Logs problems don't block the metrics artifact
    assert!(render(&desired, ArtifactKind::Metrics, &secrets()).await.is_ok());
    let problems = diagnostics_of(&desired, ArtifactKind::Logs).await;
    assert_eq!(
        problems,
        vec![(
            "logs[0].clients".to_string(),
            "at least one client is required".to_string()
        )]
    );
}

#[tokio::test]
async fn test_every_problem_is_reported() {
    let desired = desired(json!({
        "logLevel": "verbose",
        "scrapeInterval": "often",
        "metrics": [
            {
                "name": "dup",
                "remoteWrite": [{
                    "url": "https://prometheus.example.com/api/v1/write",
                    "bearerToken": { "name": "t", "key": "token" },
                    "basicAuth": {
                        "username": { "name": "u", "key": "username" },
                        "password": { "name": "u", "key": "password" }
                    }
                }]
            },
            { "name": "dup" },
            {
                "name": "scrape",
                "scrapeJobs": [{ "jobName": "api", "staticTargets": ["http://api:8080"] }]
            }
        ]
    }));

    let paths: Vec<String> = diagnostics_of(&desired, ArtifactKind::Metrics)
        .await
        .into_iter()
        .map(|(path, _)| path)
        .collect();

    assert_eq!(
        paths,
        vec![
            "logLevel",
            "scrapeInterval",
            "metrics[0].remoteWrite[0]",
            "metrics[1].name",
            "metrics[2].scrapeJobs[0].staticTargets[0]",
        ]
    );
}

#[tokio::test]
async fn test_diagnostics_render_one_problem_per_line() {
    let desired = desired(json!({
        "logs": [{
            "name": "default",
            "clients": [{ "url": "loki:3100", "externalLabels": { "bad-label": "x" } }]
        }]
    }));

    let err = render(&desired, ArtifactKind::Logs, &secrets())
        .await
        .unwrap_err();
    let text = err.to_string();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 3, "{text}");
    assert_eq!(
        lines[0],
        "failed to render logs config for monitoring/agent1 (2 problems):"
    );
    assert!(lines[1].starts_with("  logs[0].clients[0].url: "));
    assert!(lines[2].starts_with("  logs[0].clients[0].externalLabels.bad-label: "));
}

#[tokio::test]
async fn test_missing_secret_key_names_the_reference() {
    let resolver = StaticSecretResolver::new();
    let err = render(&desired(logs_spec()), ArtifactKind::Logs, &resolver)
        .await
        .unwrap_err();

    let diagnostics = err.diagnostics().expect("rendering diagnostics");
    assert_eq!(diagnostics.entries.len(), 1);
    assert_eq!(diagnostics.entries[0].path, "logs[0].clients[0].bearerToken");
    assert_eq!(
        diagnostics.entries[0].message,
        "undefined secret reference: key \"token\" not found in secret monitoring/loki"
    );
}

#[tokio::test]
async fn test_binary_secret_is_rejected() {
    let resolver = StaticSecretResolver::new().with(NAMESPACE, "loki", "token", vec![0xff, 0xfe]);
    let err = render(&desired(logs_spec()), ArtifactKind::Logs, &resolver)
        .await
        .unwrap_err();

    let diagnostics = err.diagnostics().expect("rendering diagnostics");
    assert!(diagnostics.entries[0].message.contains("not valid UTF-8"));
}

#[tokio::test]
async fn test_resolver_outage_names_the_reference() {
    let err = render(&desired(logs_spec()), ArtifactKind::Logs, &UnreachableResolver)
        .await
        .unwrap_err();

    match err {
        RenderError::SecretResolutionFailed { reference, source } => {
            assert_eq!(reference, "monitoring/loki[token]");
            assert!(source.to_string().contains("unavailable"));
        }
        other => panic!("expected SecretResolutionFailed, got {other:?}"),
    }
}

#[test]
fn test_pure_render_with_prefetched_secrets() {
    let desired = desired(json!({
        "metrics": [{
            "name": "default",
            "remoteWrite": [{
                "url": "https://prometheus.example.com/api/v1/write",
                "bearerToken": { "name": "remote-write", "key": "token" }
            }]
        }]
    }));
    let mut resolved = ResolvedSecrets::default();
    resolved.insert(
        SecretKeySelector {
            name: "remote-write".to_string(),
            key: "token".to_string(),
        },
        b"abc".to_vec(),
    );

    let first = render_resolved(&desired, ArtifactKind::Metrics, &resolved).unwrap();
    let second = render_resolved(&desired, ArtifactKind::Metrics, &resolved).unwrap();
    assert_eq!(first, second);

    let doc: Value = serde_yaml::from_slice(&first).unwrap();
    assert_eq!(
        doc["metrics"]["configs"][0]["remote_write"][0]["bearer_token"].as_str(),
        Some("abc")
    );
}

#[test]
fn test_unknown_kind_is_rejected_when_parsed() {
    let err = "traces".parse::<ArtifactKind>().unwrap_err();
    assert!(matches!(err, RenderError::UnsupportedArtifactKind(_)));
    assert!(err.diagnostics().is_none());
}
