//! # Validation
//!
//! Structural checks run before any secret is fetched. Every problem is
//! reported with the path of the offending field.

use crate::controller::artifact::{ArtifactKind, DesiredState};
use crate::controller::render::Diagnostic;
use crate::crd::{BasicAuth, SecretKeySelector};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+(ms|s|m|h|d|w|y))+$").expect("duration regex is valid")
});

static LABEL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("label name regex is valid"));

const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// Prometheus-style duration such as `30s`, `1m30s` or `500ms`
#[must_use]
pub fn is_valid_duration(value: &str) -> bool {
    DURATION_RE.is_match(value)
}

/// Prometheus label name
#[must_use]
pub fn is_valid_label_name(name: &str) -> bool {
    LABEL_NAME_RE.is_match(name)
}

/// Absolute http(s) URL with a host part
#[must_use]
pub fn is_valid_endpoint(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            !host.is_empty() && !url.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Check the agent settings and the instances selected by `kind`
#[must_use]
pub fn validate(desired: &DesiredState, kind: ArtifactKind) -> Vec<Diagnostic> {
    let mut problems = Vec::new();
    let settings = &desired.settings;

    if !LOG_LEVELS.contains(&settings.log_level.as_str()) {
        problems.push(Diagnostic::new(
            "logLevel",
            format!(
                "unknown log level {:?}, expected one of {}",
                settings.log_level,
                LOG_LEVELS.join(", ")
            ),
        ));
    }
    check_labels(&mut problems, "externalLabels", &settings.external_labels);

    match kind {
        ArtifactKind::Metrics => validate_metrics(desired, &mut problems),
        ArtifactKind::Logs => validate_logs(desired, &mut problems),
    }
    problems
}

fn validate_metrics(desired: &DesiredState, problems: &mut Vec<Diagnostic>) {
    let settings = &desired.settings;
    check_duration(problems, "scrapeInterval", &settings.scrape_interval);
    check_duration(problems, "scrapeTimeout", &settings.scrape_timeout);

    let mut seen = HashSet::new();
    for (i, instance) in desired.metrics.iter().enumerate() {
        let base = format!("metrics[{i}]");
        check_instance_name(problems, &base, &instance.name, &mut seen);

        if let Some(freq) = &instance.wal_truncate_frequency {
            check_duration(problems, &format!("{base}.walTruncateFrequency"), freq);
        }

        for (j, rw) in instance.remote_write.iter().enumerate() {
            let path = format!("{base}.remoteWrite[{j}]");
            check_endpoint(problems, &format!("{path}.url"), &rw.url);
            check_auth(problems, &path, rw.basic_auth.as_ref(), rw.bearer_token.as_ref());
            if let Some(timeout) = &rw.remote_timeout {
                check_duration(problems, &format!("{path}.remoteTimeout"), timeout);
            }
        }

        let mut jobs = HashSet::new();
        for (j, job) in instance.scrape_jobs.iter().enumerate() {
            let path = format!("{base}.scrapeJobs[{j}]");
            if job.job_name.trim().is_empty() {
                problems.push(Diagnostic::new(format!("{path}.jobName"), "must not be empty"));
            } else if !jobs.insert(job.job_name.as_str()) {
                problems.push(Diagnostic::new(
                    format!("{path}.jobName"),
                    format!("duplicate job name {:?}", job.job_name),
                ));
            }
            if job.static_targets.is_empty() {
                problems.push(Diagnostic::new(
                    format!("{path}.staticTargets"),
                    "at least one target is required",
                ));
            }
            for (t, target) in job.static_targets.iter().enumerate() {
                if target.trim().is_empty() || target.contains("://") {
                    problems.push(Diagnostic::new(
                        format!("{path}.staticTargets[{t}]"),
                        format!("expected host:port, got {target:?}"),
                    ));
                }
            }
            if let Some(scheme) = &job.scheme {
                if scheme != "http" && scheme != "https" {
                    problems.push(Diagnostic::new(
                        format!("{path}.scheme"),
                        format!("must be http or https, got {scheme:?}"),
                    ));
                }
            }
            if let Some(interval) = &job.scrape_interval {
                check_duration(problems, &format!("{path}.scrapeInterval"), interval);
            }
            check_labels(problems, &format!("{path}.labels"), &job.labels);
        }
    }
}

fn validate_logs(desired: &DesiredState, problems: &mut Vec<Diagnostic>) {
    let mut seen = HashSet::new();
    for (i, instance) in desired.logs.iter().enumerate() {
        let base = format!("logs[{i}]");
        check_instance_name(problems, &base, &instance.name, &mut seen);

        if instance.clients.is_empty() {
            problems.push(Diagnostic::new(
                format!("{base}.clients"),
                "at least one client is required",
            ));
        }
        for (j, client) in instance.clients.iter().enumerate() {
            let path = format!("{base}.clients[{j}]");
            check_endpoint(problems, &format!("{path}.url"), &client.url);
            check_auth(
                problems,
                &path,
                client.basic_auth.as_ref(),
                client.bearer_token.as_ref(),
            );
            check_labels(problems, &format!("{path}.externalLabels"), &client.external_labels);
        }
        if let Some(file) = &instance.positions_file {
            if !file.starts_with('/') {
                problems.push(Diagnostic::new(
                    format!("{base}.positionsFile"),
                    format!("must be an absolute path, got {file:?}"),
                ));
            }
        }
    }
}

fn check_instance_name<'a>(
    problems: &mut Vec<Diagnostic>,
    base: &str,
    name: &'a str,
    seen: &mut HashSet<&'a str>,
) {
    if name.trim().is_empty() {
        problems.push(Diagnostic::new(format!("{base}.name"), "must not be empty"));
    } else if name.contains('/') {
        problems.push(Diagnostic::new(
            format!("{base}.name"),
            format!("must not contain '/', got {name:?}"),
        ));
    } else if !seen.insert(name) {
        problems.push(Diagnostic::new(
            format!("{base}.name"),
            format!("duplicate instance name {name:?}"),
        ));
    }
}

fn check_endpoint(problems: &mut Vec<Diagnostic>, path: &str, url: &str) {
    if !is_valid_endpoint(url) {
        problems.push(Diagnostic::new(
            path,
            format!("expected an http or https URL, got {url:?}"),
        ));
    }
}

fn check_duration(problems: &mut Vec<Diagnostic>, path: &str, value: &str) {
    if !is_valid_duration(value) {
        problems.push(Diagnostic::new(
            path,
            format!("invalid duration {value:?} (examples: 30s, 1m, 1h30m)"),
        ));
    }
}

fn check_labels(problems: &mut Vec<Diagnostic>, path: &str, labels: &BTreeMap<String, String>) {
    for name in labels.keys() {
        if !is_valid_label_name(name) {
            problems.push(Diagnostic::new(
                format!("{path}.{name}"),
                "invalid label name, must match [a-zA-Z_][a-zA-Z0-9_]*",
            ));
        }
    }
}

fn check_auth(
    problems: &mut Vec<Diagnostic>,
    path: &str,
    basic_auth: Option<&BasicAuth>,
    bearer_token: Option<&SecretKeySelector>,
) {
    if basic_auth.is_some() && bearer_token.is_some() {
        problems.push(Diagnostic::new(
            path,
            "basicAuth and bearerToken are mutually exclusive",
        ));
    }
    let selectors = basic_auth
        .into_iter()
        .flat_map(|auth| [("basicAuth.username", &auth.username), ("basicAuth.password", &auth.password)])
        .chain(bearer_token.map(|token| ("bearerToken", token)));
    for (field, selector) in selectors {
        if selector.name.is_empty() || selector.key.is_empty() {
            problems.push(Diagnostic::new(
                format!("{path}.{field}"),
                "secret reference needs both name and key",
            ));
        }
    }
}
