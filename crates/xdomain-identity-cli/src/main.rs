//! xdomain — command-line harness for cross-domain identity propagation.

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde_json::{json, Map, Value};

use xdomain_identity::{SiteResolver, TagEnvironment, TagStatus, Tracker};
use xdomain_identity_cli::config::{load_config, resolve_profile_dir};
use xdomain_identity_cli::profile::{parse_origin, BrowserProfile};
use xdomain_identity_cli::{Browser, MAX_JOURNEY_HOPS};

#[derive(Parser)]
#[command(
    name = "xdomain",
    about = "Simulate cross-domain visitor identity propagation between sites",
    version
)]
struct Cli {
    /// Path to a JSON tracking configuration.
    #[arg(short, long)]
    config: Option<String>,

    /// Browser profile directory (per-origin storage lives here).
    #[arg(short, long)]
    profile: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Report the analytics tag as loaded.
    #[arg(long)]
    tags_loaded: bool,

    /// Tag environment whose URL `sites` reports.
    #[arg(long, value_enum, default_value_t = TagEnv::Production)]
    tags_env: TagEnv,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum TagEnv {
    Production,
    Development,
    Staging,
}

impl From<TagEnv> for TagEnvironment {
    fn from(env: TagEnv) -> Self {
        match env {
            TagEnv::Production => TagEnvironment::Production,
            TagEnv::Development => TagEnvironment::Development,
            TagEnv::Staging => TagEnvironment::Staging,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List configured sites.
    Sites,

    /// Load a page and track a page view.
    Visit {
        /// Page URL, e.g. http://site-a.local:3001/
        url: String,

        /// HTML file to use instead of the built-in demo page.
        #[arg(long)]
        html: Option<String>,

        /// End the browser session before loading.
        #[arg(long)]
        new_session: bool,

        /// Extra page-view fields as a JSON object.
        #[arg(long)]
        fields: Option<String>,
    },

    /// Load a page and click one of its links.
    Click {
        url: String,

        /// Index of the link in document order.
        #[arg(short, long, default_value_t = 1)]
        link: usize,

        #[arg(long)]
        html: Option<String>,
    },

    /// Follow cross-domain links from page to page.
    Journey {
        url: String,

        /// Number of navigations.
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u16).range(..=MAX_JOURNEY_HOPS as i64))]
        hops: u16,
    },

    /// Print an origin's persisted tracking log.
    Log {
        /// Origin URL or host[:port].
        origin: String,
    },

    /// Clear an origin's identity, first touch, session and log.
    Reset { origin: String },

    /// Close the browser: end every origin's session.
    EndSession,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let profile = BrowserProfile::open(resolve_profile_dir(cli.profile.as_deref()));
    let tags = TagStatus {
        loaded: cli.tags_loaded,
        load_error: false,
    };
    let browser = Browser::new(&config, profile.clone())
        .with_tags(tags)
        .with_trace_sink(true);

    match cli.command {
        Commands::Sites => {
            let resolver = SiteResolver::new(&config);
            let sites: Vec<_> = config
                .sites
                .iter()
                .filter_map(|s| resolver.resolve_current_site(&s.domain))
                .collect();
            print_json(&json!({
                "tagsConfigured": config.is_tags_configured(),
                "tagsUrl": config.tags_url_for(cli.tags_env.into()),
                "asyncLoad": config.async_load,
                "sites": sites,
            }))?;
        }

        Commands::Visit {
            url,
            html,
            new_session,
            fields,
        } => {
            if new_session {
                profile.end_session()?;
            }
            let url = parse_origin(&url)?;
            let html = read_html(html.as_deref())?;
            let extra = parse_fields(fields.as_deref())?;
            let visit = browser.visit(&url, html.as_deref(), extra);
            print_json(&visit)?;
        }

        Commands::Click { url, link, html } => {
            let url = parse_origin(&url)?;
            let html = read_html(html.as_deref())?;
            let report = browser.click(&url, html.as_deref(), link)?;
            print_json(&report)?;
        }

        Commands::Journey { url, hops } => {
            let url = parse_origin(&url)?;
            let journey = browser.journey(&url, usize::from(hops))?;
            print_json(&journey)?;
        }

        Commands::Log { origin } => {
            let url = parse_origin(&origin)?;
            let mut tracker = Tracker::new(&config, url.clone(), profile.storage_for(&url));
            print_json(&tracker.tracking_log())?;
        }

        Commands::Reset { origin } => {
            let url = parse_origin(&origin)?;
            let mut tracker = Tracker::new(&config, url.clone(), profile.storage_for(&url));
            tracker.reset();
            println!("Reset tracking data for {}", profile.origin_dir(&url).display());
        }

        Commands::EndSession => {
            let ended = profile.end_session()?;
            println!("Ended {ended} sessions");
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "xdomain", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn read_html(path: Option<&str>) -> anyhow::Result<Option<String>> {
    path.map(|p| std::fs::read_to_string(p).with_context(|| format!("failed to read HTML file: {p}")))
        .transpose()
}

fn parse_fields(raw: Option<&str>) -> anyhow::Result<Map<String, Value>> {
    match raw {
        None => Ok(Map::new()),
        Some(raw) => match serde_json::from_str(raw).context("--fields must be JSON")? {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("--fields must be a JSON object"),
        },
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
