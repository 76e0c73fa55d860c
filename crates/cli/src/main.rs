use std::collections::BTreeMap;
use std::path::Path;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use kdeploy_application::Link;
use kdeploy_core::collab::is_remote;
use kdeploy_core::{DeployError, ImageRef};
use kdeploy_deploy::{ApplyOptions, ClusterIdentity, Deployer, PrepareOptions};
use kdeploy_kubehub::{GcloudContext, GcloudImageResolver, GsutilTransfer, KubeGateway};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "kdeployctl", version, about = "Prepare and apply Kubernetes manifests, then wait for them to be ready")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Expand, label and pin manifests without touching the cluster
    Prepare(PrepareArgs),
    /// Apply manifests and wait until every object is ready
    Apply {
        /// Manifest file, directory or gs:// location
        #[arg(short = 'f', long = "filename", env = "KDEPLOY_FILENAME")]
        filename: String,
        /// Descend into subdirectories
        #[arg(short = 'R', long = "recursive", action = ArgAction::SetTrue)]
        recursive: bool,
        /// Override the namespace of every object
        #[arg(short = 'n', long = "namespace", env = "KDEPLOY_NAMESPACE")]
        namespace: Option<String>,
        #[command(flatten)]
        target: ApplyTarget,
    },
    /// Prepare, then apply the expanded output
    Run {
        #[command(flatten)]
        prepare: PrepareArgs,
        #[command(flatten)]
        target: ApplyTarget,
    },
}

#[derive(Args, Debug)]
struct PrepareArgs {
    /// Container image to deploy; pinned by digest in the expanded output
    #[arg(short = 'i', long = "image", env = "KDEPLOY_IMAGE")]
    image: Option<ImageRef>,
    /// Application name, recorded as app.kubernetes.io/name
    #[arg(short = 'a', long = "app", env = "KDEPLOY_APP")]
    app: Option<String>,
    /// Application version, recorded as app.kubernetes.io/version
    #[arg(long = "app-version", env = "KDEPLOY_APP_VERSION")]
    app_version: Option<String>,
    /// Manifest file, directory or gs:// location
    #[arg(short = 'f', long = "filename", env = "KDEPLOY_FILENAME")]
    filename: Option<String>,
    /// Descend into subdirectories
    #[arg(short = 'R', long = "recursive", action = ArgAction::SetTrue)]
    recursive: bool,
    /// Base directory or gs:// location for the suggested/ and expanded/ outputs
    #[arg(short = 'o', long = "output", env = "KDEPLOY_OUTPUT", default_value = "./output")]
    output: String,
    /// Namespace for every object; created when it is not "default"
    #[arg(short = 'n', long = "namespace", env = "KDEPLOY_NAMESPACE")]
    namespace: Option<String>,
    /// Extra label, key=value (repeatable)
    #[arg(short = 'L', long = "label", value_parser = parse_key_val)]
    labels: Vec<(String, String)>,
    /// Extra annotation, key=value (repeatable)
    #[arg(short = 'A', long = "annotation", value_parser = parse_key_val)]
    annotations: Vec<(String, String)>,
    /// Expose the app through a LoadBalancer Service on this port
    #[arg(short = 'x', long = "expose", default_value_t = 0)]
    expose: u16,
    /// Add an Application object grouping the deployed kinds
    #[arg(long = "create-application-cr", action = ArgAction::SetTrue)]
    create_application: bool,
    /// Application link, description=url (repeatable)
    #[arg(long = "links", value_parser = parse_link)]
    links: Vec<Link>,
}

#[derive(Args, Debug)]
struct ApplyTarget {
    /// GKE cluster to fetch credentials for
    #[arg(short = 'c', long = "cluster", env = "KDEPLOY_CLUSTER", requires_all = ["location", "project"])]
    cluster: Option<String>,
    /// Cluster region or zone
    #[arg(short = 'l', long = "location", env = "KDEPLOY_LOCATION")]
    location: Option<String>,
    /// Cluster project
    #[arg(short = 'p', long = "project", env = "KDEPLOY_PROJECT")]
    project: Option<String>,
    /// How long to wait for readiness, e.g. 300, 90s, 5m, 1h
    #[arg(short = 't', long = "timeout", value_parser = parse_duration, default_value = "5m")]
    timeout: Duration,
    /// Validate on the server without persisting or waiting
    #[arg(long = "server-dry-run", action = ArgAction::SetTrue)]
    server_dry_run: bool,
}

impl PrepareArgs {
    fn options(&self) -> PrepareOptions {
        PrepareOptions {
            image: self.image.clone(),
            app_name: self.app.clone(),
            app_version: self.app_version.clone(),
            config: self.filename.clone(),
            recursive: self.recursive,
            suggested_output: join_location(&self.output, "suggested"),
            expanded_output: join_location(&self.output, "expanded"),
            namespace: self.namespace.clone(),
            labels: self.labels.iter().cloned().collect::<BTreeMap<_, _>>(),
            annotations: self.annotations.iter().cloned().collect::<BTreeMap<_, _>>(),
            expose: self.expose,
            create_application: self.create_application,
            application_links: self.links.clone(),
        }
    }
}

impl ApplyTarget {
    fn options(&self, config: String, recursive: bool, namespace: Option<String>) -> ApplyOptions {
        let mut opts = ApplyOptions::new(config);
        opts.recursive = recursive;
        opts.namespace = namespace;
        opts.wait_timeout = self.timeout;
        opts.cluster = match (&self.cluster, &self.location, &self.project) {
            (Some(name), Some(location), Some(project)) => Some(ClusterIdentity {
                name: name.clone(),
                location: location.clone(),
                project: project.clone(),
            }),
            _ => None,
        };
        opts
    }
}

fn deployer(server_dry_run: bool) -> Deployer {
    Deployer::new(
        Arc::new(KubeGateway::new().dry_run(server_dry_run)),
        Arc::new(GcloudContext::default()),
        Arc::new(GsutilTransfer::default()),
        Arc::new(GcloudImageResolver::default()),
    )
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}

fn parse_link(s: &str) -> Result<Link, String> {
    let (description, url) = parse_key_val(s).map_err(|_| format!("expected description=url, got {:?}", s))?;
    if url.is_empty() {
        return Err(format!("link {:?} has no url", description));
    }
    Ok(Link::new(description, url))
}

/// Bare seconds, or any humantime duration such as `90s`, `5m` or `1h 30m`.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = u64::from_str(s) {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| format!("invalid duration {:?}: {}", s, e))
}

fn join_location(base: &str, child: &str) -> String {
    if is_remote(base) {
        format!("{}/{}", base.trim_end_matches('/'), child)
    } else {
        Path::new(base).join(child).display().to_string()
    }
}

fn init_tracing() {
    let env = std::env::var("KDEPLOY_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KDEPLOY_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KDEPLOY_METRICS_ADDR; expected host:port");
        }
    }
}

async fn execute(cli: Cli) -> Result<(), DeployError> {
    match cli.command {
        Commands::Prepare(args) => {
            let opts = args.options();
            let report = deployer(false).prepare(&opts).await?;
            info!(objects = report.expanded.len(), digest = ?report.digest, output = %opts.expanded_output, "prepared");
        }
        Commands::Apply { filename, recursive, namespace, target } => {
            let opts = target.options(filename, recursive, namespace);
            deployer(target.server_dry_run).apply(&opts).await?;
        }
        Commands::Run { prepare, target } => {
            let deployer = deployer(target.server_dry_run);
            let prep = prepare.options();
            let report = deployer.prepare(&prep).await?;
            info!(objects = report.expanded.len(), digest = ?report.digest, "prepared; applying");
            // The expanded output already carries the namespace.
            let opts = target.options(prep.expanded_output.clone(), false, None);
            deployer.apply(&opts).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "kdeployctl failed");
            eprintln!("error: {}", e);
            if e.is_timeout() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_values_split_on_first_equals() {
        assert_eq!(parse_key_val("team=payments"), Ok(("team".into(), "payments".into())));
        assert_eq!(parse_key_val("q=a=b"), Ok(("q".into(), "a=b".into())));
        assert!(parse_key_val("team").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn links_need_a_url() {
        let link = parse_link("Docs=https://docs.acme.dev/?a=1").unwrap();
        assert_eq!(link, Link::new("Docs", "https://docs.acme.dev/?a=1"));
        assert!(parse_link("Docs=").is_err());
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("300"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("90s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("1h 30m"), Ok(Duration::from_secs(5400)));
        assert!(parse_duration("5q").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("6000000000000000h").is_err());
    }

    #[test]
    fn outputs_join_locally_and_remotely() {
        assert_eq!(join_location("gs://acme-out/", "expanded"), "gs://acme-out/expanded");
        assert_eq!(join_location("out", "suggested"), Path::new("out").join("suggested").display().to_string());
    }

    #[test]
    fn run_maps_flags_onto_both_phases() {
        let cli = Cli::try_parse_from([
            "kdeployctl", "run", "-i", "gcr.io/acme/web:v1", "-a", "web", "-o", "gs://acme-out", "-n", "shop", "-L",
            "team=payments", "-x", "8080", "-c", "prod", "-l", "us-central1", "-p", "acme", "-t", "90s",
        ])
        .unwrap();
        let Commands::Run { prepare, target } = cli.command else { panic!("expected run") };
        let prep = prepare.options();
        assert_eq!(prep.expanded_output, "gs://acme-out/expanded");
        assert_eq!(prep.labels.get("team").map(String::as_str), Some("payments"));
        assert_eq!(prep.expose, 8080);
        let apply = target.options(prep.expanded_output.clone(), false, None);
        assert_eq!(apply.wait_timeout, Duration::from_secs(90));
        assert_eq!(apply.cluster.unwrap().project, "acme");
    }

    #[test]
    fn cluster_requires_location_and_project() {
        assert!(Cli::try_parse_from(["kdeployctl", "apply", "-f", "out", "-c", "prod"]).is_err());
        assert!(Cli::try_parse_from(["kdeployctl", "apply", "-f", "out"]).is_ok());
    }
}
