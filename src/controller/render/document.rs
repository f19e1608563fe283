//! Typed agent configuration documents and the builder that fills them in.

use crate::constants::{DEFAULT_POSITIONS_DIRECTORY, DEFAULT_WAL_DIRECTORY};
use crate::controller::artifact::DesiredState;
use crate::controller::render::secrets::{Lookup, ResolvedSecrets};
use crate::controller::render::Diagnostic;
use crate::crd::{BasicAuth, LogsClient, LogsInstance, MetricsInstance, RemoteWrite, ScrapeJob, SecretKeySelector};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub(crate) struct MetricsDocument {
    server: ServerBlock,
    metrics: MetricsBlock,
}

#[derive(Debug, Serialize)]
pub(crate) struct LogsDocument {
    server: ServerBlock,
    logs: LogsBlock,
}

#[derive(Debug, Serialize)]
struct ServerBlock {
    log_level: String,
}

#[derive(Debug, Serialize)]
struct MetricsBlock {
    wal_directory: String,
    global: GlobalBlock,
    configs: Vec<MetricsInstanceBlock>,
}

#[derive(Debug, Serialize)]
struct GlobalBlock {
    scrape_interval: String,
    scrape_timeout: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    external_labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct MetricsInstanceBlock {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    wal_truncate_frequency: Option<String>,
    remote_write: Vec<RemoteWriteBlock>,
    scrape_configs: Vec<ScrapeConfigBlock>,
}

#[derive(Debug, Serialize)]
struct RemoteWriteBlock {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_timeout: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    basic_auth: Option<BasicAuthBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bearer_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct BasicAuthBlock {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct ScrapeConfigBlock {
    job_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scrape_interval: Option<String>,
    static_configs: Vec<StaticConfigBlock>,
}

#[derive(Debug, Serialize)]
struct StaticConfigBlock {
    targets: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct LogsBlock {
    positions_directory: String,
    configs: Vec<LogsInstanceBlock>,
}

#[derive(Debug, Serialize)]
struct LogsInstanceBlock {
    name: String,
    positions: PositionsBlock,
    clients: Vec<LogsClientBlock>,
}

#[derive(Debug, Serialize)]
struct PositionsBlock {
    filename: String,
}

#[derive(Debug, Serialize)]
struct LogsClientBlock {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    basic_auth: Option<BasicAuthBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bearer_token: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    external_labels: BTreeMap<String, String>,
}

/// Builds documents while collecting secret lookup problems
pub(crate) struct DocumentBuilder<'a> {
    desired: &'a DesiredState,
    secrets: &'a ResolvedSecrets,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> DocumentBuilder<'a> {
    pub(crate) fn new(desired: &'a DesiredState, secrets: &'a ResolvedSecrets) -> Self {
        Self {
            desired,
            secrets,
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub(crate) fn metrics_document(&mut self) -> MetricsDocument {
        let desired = self.desired;
        let settings = &desired.settings;

        // Paths refer to the position in the resource, not the sorted output
        let mut instances: Vec<(usize, &MetricsInstance)> =
            desired.metrics.iter().enumerate().collect();
        instances.sort_by(|a, b| a.1.name.cmp(&b.1.name));

        let configs = instances
            .into_iter()
            .map(|(i, instance)| self.metrics_instance(i, instance))
            .collect();

        MetricsDocument {
            server: ServerBlock {
                log_level: settings.log_level.clone(),
            },
            metrics: MetricsBlock {
                wal_directory: DEFAULT_WAL_DIRECTORY.to_string(),
                global: GlobalBlock {
                    scrape_interval: settings.scrape_interval.clone(),
                    scrape_timeout: settings.scrape_timeout.clone(),
                    external_labels: settings.external_labels.clone(),
                },
                configs,
            },
        }
    }

    pub(crate) fn logs_document(&mut self) -> LogsDocument {
        let desired = self.desired;
        let mut instances: Vec<(usize, &LogsInstance)> =
            desired.logs.iter().enumerate().collect();
        instances.sort_by(|a, b| a.1.name.cmp(&b.1.name));

        let configs = instances
            .into_iter()
            .map(|(i, instance)| self.logs_instance(i, instance))
            .collect();

        LogsDocument {
            server: ServerBlock {
                log_level: desired.settings.log_level.clone(),
            },
            logs: LogsBlock {
                positions_directory: DEFAULT_POSITIONS_DIRECTORY.to_string(),
                configs,
            },
        }
    }

    fn instance_name(&self, name: &str) -> String {
        format!("{}/{}", self.desired.owner.namespace, name)
    }

    fn metrics_instance(&mut self, index: usize, instance: &MetricsInstance) -> MetricsInstanceBlock {
        let base = format!("metrics[{index}]");
        let remote_write = instance
            .remote_write
            .iter()
            .enumerate()
            .map(|(j, rw)| self.remote_write(&format!("{base}.remoteWrite[{j}]"), rw))
            .collect();

        MetricsInstanceBlock {
            name: self.instance_name(&instance.name),
            wal_truncate_frequency: instance.wal_truncate_frequency.clone(),
            remote_write,
            scrape_configs: instance.scrape_jobs.iter().map(scrape_config).collect(),
        }
    }

    fn remote_write(&mut self, path: &str, rw: &RemoteWrite) -> RemoteWriteBlock {
        RemoteWriteBlock {
            url: rw.url.clone(),
            remote_timeout: rw.remote_timeout.clone(),
            headers: rw.headers.clone(),
            basic_auth: rw
                .basic_auth
                .as_ref()
                .map(|auth| self.basic_auth(path, auth)),
            bearer_token: rw
                .bearer_token
                .as_ref()
                .map(|token| self.secret(&format!("{path}.bearerToken"), token)),
        }
    }

    fn logs_instance(&mut self, index: usize, instance: &LogsInstance) -> LogsInstanceBlock {
        let base = format!("logs[{index}]");
        let clients = instance
            .clients
            .iter()
            .enumerate()
            .map(|(j, client)| self.logs_client(&format!("{base}.clients[{j}]"), client))
            .collect();

        LogsInstanceBlock {
            name: self.instance_name(&instance.name),
            positions: PositionsBlock {
                filename: instance.positions_file.clone().unwrap_or_else(|| {
                    format!("{DEFAULT_POSITIONS_DIRECTORY}/{}.yml", instance.name)
                }),
            },
            clients,
        }
    }

    fn logs_client(&mut self, path: &str, client: &LogsClient) -> LogsClientBlock {
        let mut external_labels = self.desired.settings.external_labels.clone();
        external_labels.extend(client.external_labels.clone());

        LogsClientBlock {
            url: client.url.clone(),
            tenant_id: client.tenant_id.clone(),
            basic_auth: client
                .basic_auth
                .as_ref()
                .map(|auth| self.basic_auth(path, auth)),
            bearer_token: client
                .bearer_token
                .as_ref()
                .map(|token| self.secret(&format!("{path}.bearerToken"), token)),
            external_labels,
        }
    }

    fn basic_auth(&mut self, path: &str, auth: &BasicAuth) -> BasicAuthBlock {
        BasicAuthBlock {
            username: self.secret(&format!("{path}.basicAuth.username"), &auth.username),
            password: self.secret(&format!("{path}.basicAuth.password"), &auth.password),
        }
    }

    fn secret(&mut self, path: &str, selector: &SecretKeySelector) -> String {
        match self.secrets.lookup(selector) {
            Lookup::Text(value) => value.to_string(),
            Lookup::NotUtf8 => {
                self.diagnostics.push(Diagnostic::new(
                    path,
                    format!(
                        "secret {}/{} key {:?} is not valid UTF-8 text",
                        self.desired.owner.namespace, selector.name, selector.key
                    ),
                ));
                String::new()
            }
            Lookup::Undefined => {
                self.diagnostics.push(Diagnostic::new(
                    path,
                    format!(
                        "undefined secret reference: key {:?} not found in secret {}/{}",
                        selector.key, self.desired.owner.namespace, selector.name
                    ),
                ));
                String::new()
            }
        }
    }
}

fn scrape_config(job: &ScrapeJob) -> ScrapeConfigBlock {
    ScrapeConfigBlock {
        job_name: job.job_name.clone(),
        metrics_path: job.metrics_path.clone(),
        scheme: job.scheme.clone(),
        scrape_interval: job.scrape_interval.clone(),
        static_configs: vec![StaticConfigBlock {
            targets: job.static_targets.clone(),
            labels: job.labels.clone(),
        }],
    }
}
