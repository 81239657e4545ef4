//! xfrm-monitor - watch kernel IPsec (XFRM) events.
//!
//! Subscribes to the NETLINK_XFRM multicast groups and prints SA and
//! policy changes as they happen, in text or JSON form.

use clap::Parser;
use tokio_stream::StreamExt;
use tracing::info;
use xfrmwatch::netlink::Result;
use xfrmwatch::netlink::events::EventStream;
use xfrmwatch::output::{
    MonitorConfig, OutputFormat, OutputOptions, print_event, print_monitor_start,
};

#[derive(Parser)]
#[command(
    name = "xfrm-monitor",
    version,
    about = "Watch kernel IPsec (XFRM) events"
)]
struct Cli {
    /// Watch SA add/delete/update notifications.
    #[arg(long)]
    sa: bool,

    /// Watch policy add/delete/update notifications.
    #[arg(long)]
    policy: bool,

    /// Watch SA acquisition requests.
    #[arg(long)]
    acquire: bool,

    /// Watch SA/policy lifetime expirations.
    #[arg(long)]
    expire: bool,

    /// Watch kernel reports.
    #[arg(long)]
    report: bool,

    /// Watch every group.
    #[arg(short, long)]
    all: bool,

    /// Output JSON, one object per event.
    #[arg(short = 'j', long)]
    json: bool,

    /// Pretty print JSON.
    #[arg(short = 'p', long)]
    pretty: bool,

    /// Label output lines with event timestamps.
    #[arg(short = 't', long)]
    timestamp: bool,

    /// Do not print key material.
    #[arg(long)]
    hide_keys: bool,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        if e.is_permission_denied() {
            eprintln!("Error: {} (subscribing to XFRM groups requires CAP_NET_ADMIN)", e);
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let config = MonitorConfig::new()
        .with_timestamp(cli.timestamp)
        .with_format(format)
        .with_opts(OutputOptions {
            pretty: cli.pretty,
            hide_keys: cli.hide_keys,
        });

    // Nothing selected falls back to the SA + policy default inside the
    // builder.
    let mut builder = EventStream::builder()
        .sa(cli.sa)
        .policy(cli.policy)
        .acquire(cli.acquire)
        .expire(cli.expire)
        .report(cli.report);
    if cli.all {
        builder = builder.all();
    }
    let mut stream = builder.build()?;

    let mut stdout = std::io::stdout().lock();
    print_monitor_start(
        &mut stdout,
        &config,
        "Monitoring XFRM events (Ctrl+C to stop)...",
    )?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = stream.try_next() => match event? {
                Some(event) => print_event(&mut stdout, &event, &config)?,
                None => break,
            },
        }
    }

    let stats = stream.stats();
    if !stats.is_clean() {
        info!(
            malformed_frames = stats.malformed_frames,
            decode_errors = stats.decode_errors,
            unknown_messages = stats.unknown_messages,
            "frames dropped during this session"
        );
    }

    Ok(())
}
