use kube_ext_discovery::{
    evaluate, render_text, CancellationToken, DetectContext, DetectOptions, ExtensionKind, Report,
};

use clap::{Parser, ValueEnum};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Detect extensions installed in a Kubernetes cluster and their versions
#[derive(Parser, Debug)]
#[command(
    name = "kube-ext-discovery",
    version,
    long_about = "kube-ext-discovery inspects the namespaces and pods of the current \
                  kubeconfig context to find out which cluster extensions (Istio, Knative, \
                  Helm Tiller) are installed, and reports the version each component runs.\n\n\
                  Examples:\n  \
                  kube-ext-discovery\n  \
                  kube-ext-discovery --context staging --output json\n  \
                  kube-ext-discovery --extension istio --skip-tag-resolution"
)]
struct CliArgs {
    #[arg(long, value_name = "PATH", help = "Path to the kubectl binary (defaults to PATH lookup)")]
    kubectl: Option<PathBuf>,

    #[arg(long, value_name = "NAME", help = "Kubeconfig context to query")]
    context: Option<String>,

    #[arg(
        short = 'e',
        long = "extension",
        value_name = "KIND",
        help = "Only detect this extension (istio, knative, helm-tiller); can be repeated"
    )]
    extensions: Vec<ExtensionKind>,

    #[arg(short = 'o', long, value_enum, default_value = "text", help = "Output format")]
    output: OutputFormat,

    #[arg(long, help = "Report digest-pinned images as-is instead of looking up their tags")]
    skip_tag_resolution: bool,

    #[arg(long, value_name = "SECONDS", default_value = "30", help = "Timeout for one kubectl call")]
    query_timeout: u64,

    #[arg(long, value_name = "SECONDS", default_value = "5", help = "Timeout for one registry tag lookup")]
    registry_timeout: u64,

    #[arg(long, value_name = "LEVEL", help = "Set logging level")]
    log_level: Option<Level>,

    #[arg(short = 'v', long, help = "Log detection progress")]
    verbose: bool,

    #[arg(
        short = 'q',
        long,
        conflicts_with = "verbose",
        help = "Quiet mode - only log errors"
    )]
    quiet: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    /// Indented list, one component per line
    Text,
    /// Full tree as JSON
    Json,
}

impl CliArgs {
    fn detect_options(&self) -> DetectOptions {
        DetectOptions {
            kubectl: self.kubectl.clone(),
            kube_context: self.context.clone(),
            query_timeout: Duration::from_secs(self.query_timeout),
            registry_timeout: Duration::from_secs(self.registry_timeout),
            skip_tag_resolution: self.skip_tag_resolution,
        }
    }

    fn selected_kinds(&self) -> Vec<ExtensionKind> {
        ExtensionKind::all()
            .filter(|kind| self.extensions.is_empty() || self.extensions.contains(kind))
            .collect()
    }
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("kube-ext-discovery v{} starting", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    std::process::exit(run(&args).await);
}

async fn run(args: &CliArgs) -> i32 {
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling detection");
                cancel.cancel();
            }
        }
    });

    let ctx = DetectContext::from_options(&args.detect_options(), cancel);
    let mut tree: Vec<_> = args.selected_kinds().iter().map(ExtensionKind::node).collect();

    if let Err(e) = evaluate(&ctx, &mut tree).await {
        warn!("failed to detect some extensions: {e}");
    }

    match args.output {
        OutputFormat::Text => print!("{}", render_text(&tree)),
        OutputFormat::Json => match Report::from_tree(&tree).to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: failed to serialize report: {e}");
                return 1;
            }
        },
    }
    0
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level) = args.log_level {
        level
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        env::var("KUBE_EXT_DISCOVERY_LOG_LEVEL")
            .ok()
            .and_then(|level| level.parse().ok())
            .unwrap_or(Level::WARN)
    };

    let mut filter = EnvFilter::from_default_env();

    if env::var("RUST_LOG").is_err() {
        for directive in [format!("kube_ext_discovery={level}"), "hyper=warn".into(), "reqwest=warn".into()] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}
