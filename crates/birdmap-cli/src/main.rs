use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, bail};
use birdmap_core::{
    AlertBatch, AlertDocument, Filter, aggregate, colorize, extract_records, group_sightings,
};
use birdmap_sync::{
    ApiKey, ClientConfig, EbirdClient, NotableSource, RegionQuery, SyncError, collect_notable,
};
use chrono::Local;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod inputs;
mod map;
mod summary;

use map::MapData;
use summary::BatchCount;

/// Exit status when nothing survived filtering and `--allow-empty` was not given.
const EXIT_NOTHING_FOUND: u8 = 2;

/// Plot eBird rare-bird alerts on an interactive map.
#[derive(Parser, Debug)]
#[command(name = "birdmap", version, about)]
struct Args {
    /// Alert files (.eml or .txt) or directories containing them
    inputs: Vec<PathBuf>,

    /// Output HTML file
    #[arg(short, long, default_value = "ebird_map.html")]
    output: PathBuf,

    /// Keep only sightings in this state or province (case-insensitive)
    #[arg(short, long)]
    state: Option<String>,

    /// Keep only sightings within this many days of the newest one
    #[arg(short, long)]
    days: Option<u32>,

    /// Also fetch notable observations for this region code (e.g. US-MA)
    #[arg(long)]
    region: Option<String>,

    /// eBird API key, required with --region
    #[arg(long, env = "EBIRD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Days of API history to request
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..=30))]
    back: u32,

    /// HTTP timeout for the API request
    #[arg(long, env = "BIRDMAP_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    #[arg(long, hide = true, default_value = birdmap_sync::http::DEFAULT_BASE_URL)]
    api_base: String,

    /// Map title (defaults to the first alert's subject)
    #[arg(long)]
    title: Option<String>,

    /// Write an empty map instead of failing when nothing is found
    #[arg(long)]
    allow_empty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("birdmap v{}", env!("CARGO_PKG_VERSION"));

    if args.inputs.is_empty() && args.region.is_none() {
        bail!("no input files given and no --region to query; nothing to do");
    }

    let loaded = inputs::load_inputs(&args.inputs);
    if !args.inputs.is_empty() {
        println!(
            "Read {} alert documents ({} unreadable)",
            loaded.documents.len(),
            loaded.failed
        );
    }
    if loaded.documents.is_empty() && args.region.is_none() {
        bail!("none of the given inputs could be read");
    }

    let client = match &args.region {
        Some(_) => Some(build_client(&args)?),
        None => None,
    };
    run(&args, &loaded.documents, client.as_ref()).await
}

/// Extract, fetch, aggregate and write the map. Any failure before the
/// final write leaves `args.output` untouched.
async fn run<S>(
    args: &Args,
    documents: &[AlertDocument],
    source: Option<&S>,
) -> anyhow::Result<ExitCode>
where
    S: NotableSource + ?Sized + Sync,
{
    let mut batches: Vec<AlertBatch> = documents.iter().map(extract_records).collect();
    if let (Some(region), Some(source)) = (&args.region, source) {
        batches.push(fetch_region(source, region, args.back).await?);
    }

    let title = args
        .title
        .clone()
        .or_else(|| documents.iter().find_map(|d| d.subject.clone()))
        .or_else(|| args.region.as_ref().map(|r| format!("eBird Notable: {}", r.to_uppercase())))
        .unwrap_or_else(|| "eBird Sightings".to_string());

    let filter = Filter {
        state: args.state.clone(),
        max_age_days: args.days,
    };
    let counts: Vec<BatchCount> = batches.iter().map(BatchCount::from).collect();
    let outcome = aggregate(batches, &filter);
    summary::write_summary(&mut io::stdout().lock(), &counts, &filter, &outcome)?;

    let groups = match outcome.into_collection() {
        Some(collection) => group_sightings(colorize(collection)),
        None if args.allow_empty => Vec::new(),
        None => {
            eprintln!("Nothing found; no map written (use --allow-empty to write one anyway).");
            return Ok(ExitCode::from(EXIT_NOTHING_FOUND));
        }
    };

    let html = map::render(&MapData::new(&title, &groups)).context("serializing map data")?;
    std::fs::write(&args.output, html)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(output = %args.output.display(), pins = groups.len(), "map written");
    println!("Map written to {}", args.output.display());

    Ok(ExitCode::SUCCESS)
}

fn build_client(args: &Args) -> anyhow::Result<EbirdClient> {
    let Some(key) = args.api_key.as_deref() else {
        bail!("--region needs an eBird API key (--api-key or EBIRD_API_KEY)");
    };
    let client = EbirdClient::new(
        ApiKey::new(key)?,
        ClientConfig {
            base_url: args.api_base.clone(),
            timeout: Duration::from_secs(args.timeout_secs),
        },
    )?;
    Ok(client)
}

async fn fetch_region<S>(source: &S, region: &str, back: u32) -> anyhow::Result<AlertBatch>
where
    S: NotableSource + ?Sized + Sync,
{
    let query = RegionQuery::new(region, back)?;
    let batch = collect_notable(source, &query, Local::now().date_naive())
        .await
        .map_err(|e| describe_fetch_error(e, query.region()))?;
    println!(
        "Fetched {} notable observations for {}",
        batch.records.len(),
        query.region()
    );
    Ok(batch)
}

fn describe_fetch_error(err: SyncError, region: &str) -> anyhow::Error {
    let hint = if err.is_auth() {
        "authentication failed; check the API key"
    } else if err.is_transient() {
        "eBird is temporarily unavailable; try again later"
    } else {
        "eBird request failed"
    };
    anyhow::Error::new(err).context(format!("fetching notable observations for {region}: {hint}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use birdmap_core::NotableObservation;

    /// Source answering every query with a fixed outcome.
    enum StubSource {
        Fails(u16),
        Returns(Vec<NotableObservation>),
    }

    #[async_trait]
    impl NotableSource for StubSource {
        async fn fetch_notable(
            &self,
            query: &RegionQuery,
        ) -> Result<Vec<NotableObservation>, SyncError> {
            match self {
                StubSource::Fails(status) => Err(SyncError::from_status(
                    *status,
                    query.region(),
                    String::new(),
                    None,
                )),
                StubSource::Returns(entries) => Ok(entries.clone()),
            }
        }
    }

    fn region_args(output: &std::path::Path) -> Args {
        Args::try_parse_from([
            "birdmap",
            "--region",
            "US-MA",
            "--output",
            output.to_str().unwrap(),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn auth_failure_writes_no_map() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("map.html");

        let err = run(&region_args(&output), &[], Some(&StubSource::Fails(403)))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<SyncError>().is_some_and(SyncError::is_auth));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn fetched_sightings_are_written_to_the_map() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("map.html");
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        let entries = vec![NotableObservation {
            com_name: "Snowy Owl".into(),
            loc_name: Some("Plum Island".into()),
            obs_dt: today,
            lat: Some(42.7),
            lng: Some(-70.8),
            ..Default::default()
        }];

        let code = run(&region_args(&output), &[], Some(&StubSource::Returns(entries)))
            .await
            .unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        let html = std::fs::read_to_string(&output).unwrap();
        assert!(html.contains("<title>eBird Notable: US-MA</title>"));
        assert!(html.contains("Snowy Owl"));
    }

    #[tokio::test]
    async fn empty_result_writes_nothing_without_allow_empty() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("map.html");

        let code = run(&region_args(&output), &[], Some(&StubSource::Returns(Vec::new())))
            .await
            .unwrap();
        assert_eq!(code, ExitCode::from(EXIT_NOTHING_FOUND));
        assert!(!output.exists());
    }

    #[test]
    fn args_parse_with_defaults() {
        let args = Args::try_parse_from(["birdmap", "alerts/"]).unwrap();
        assert_eq!(args.inputs, [PathBuf::from("alerts/")]);
        assert_eq!(args.output, PathBuf::from("ebird_map.html"));
        assert_eq!(args.back, 7);
        assert!(!args.allow_empty);
    }

    #[test]
    fn back_is_limited_to_thirty_days() {
        assert!(Args::try_parse_from(["birdmap", "--region", "US-MA", "--back", "31"]).is_err());
        assert!(Args::try_parse_from(["birdmap", "--region", "US-MA", "--back", "0"]).is_err());
    }

    #[test]
    fn auth_errors_are_described_as_such() {
        let err = describe_fetch_error(SyncError::Auth { status: 401 }, "US-MA");
        assert!(format!("{err:#}").contains("authentication failed"));
        assert!(err.downcast_ref::<SyncError>().is_some_and(SyncError::is_auth));
    }
}
