use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{info, warn};

use repo_harvester::git::GitCloner;
use repo_harvester::github::GitHubSearchClient;
use repo_harvester::harvest::{
    Clock, CorpusAssembler, ExtensionFilter, HarvestPipeline, QueryHarvester, QuerySpec,
    RepositoryFetcher, ResultSet, TokioClock,
};
use repo_harvester::{logging, HarvesterConfig};

#[derive(Parser, Debug)]
#[command(name = "repo-harvester", version, about = "Harvest repositories into a training corpus")]
struct Cli {
    /// TOML file overriding the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Page through the search API and save the result set
    Harvest,
    /// Clone the most-starred repositories of the saved result set
    Fetch {
        /// Number of repositories to clone
        #[arg(long, conflicts_with = "all")]
        limit: Option<usize>,
        /// Clone every repository in the result set
        #[arg(long)]
        all: bool,
    },
    /// Copy allow-listed files from local clones into the corpus directory
    Assemble,
    /// Run harvest, fetch and assemble in sequence
    Run,
    /// Print the effective configuration as TOML
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Proxy settings and GITHUB_TOKEN may live in .env
    dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let config = HarvesterConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Harvest => run_harvest(&config).await,
        Commands::Fetch { limit, all } => {
            let limit = if all { None } else { limit.or(config.fetch.limit.rows()) };
            run_fetch(&config, limit).await
        }
        Commands::Assemble => run_assemble(&config).await,
        Commands::Run => run_pipeline(&config).await,
        Commands::PrintConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(TokioClock)
}

fn result_path(config: &HarvesterConfig) -> PathBuf {
    ResultSet::path_for(&config.output_dir, &config.search.suffix)
}

fn build_harvester(config: &HarvesterConfig) -> Result<QueryHarvester<GitHubSearchClient>> {
    let client = GitHubSearchClient::new(config.search.api_url.clone(), &config.http)
        .context("failed to build HTTP client")?;
    if config.http.token.is_none() {
        warn!("GITHUB_TOKEN not set, using unauthenticated search quota");
    }
    Ok(QueryHarvester::new(client, config.search.rate_limit.build(clock()))
        .with_page_size(config.search.per_page)
        .with_sort(config.search.sort.clone(), config.search.order.clone()))
}

fn build_fetcher(config: &HarvesterConfig) -> RepositoryFetcher<GitCloner> {
    RepositoryFetcher::new(
        GitCloner::new(config.fetch.shallow),
        config.fetch.repos_dir.clone(),
        config.fetch.rate_limit.build(clock()),
    )
    .with_host(config.fetch.host.clone())
}

fn build_assembler(config: &HarvesterConfig) -> CorpusAssembler {
    CorpusAssembler::new(
        config.fetch.repos_dir.clone(),
        config.assemble.target_dir.clone(),
        ExtensionFilter::new(config.assemble.extensions.clone()),
    )
    .with_missing_policy(config.assemble.missing_clones)
}

async fn run_harvest(config: &HarvesterConfig) -> Result<()> {
    let harvester = build_harvester(config)?;
    let (outcome, path) = harvester
        .harvest_and_save(
            &config.output_dir,
            &config.search.suffix,
            &config.search.query,
            &config.search.license_query,
        )
        .await?;

    if let Some(failure) = &outcome.failure {
        warn!(error = %failure, "Pagination stopped early, result set is partial");
    }
    info!(path = %path.display(), records = outcome.records.len(), "Harvest finished");
    Ok(())
}

async fn run_fetch(config: &HarvesterConfig, limit: Option<usize>) -> Result<()> {
    let path = result_path(config);
    let results = ResultSet::load(&path)?;
    info!(path = %path.display(), records = results.len(), "Loaded result set");

    build_fetcher(config).fetch_all(&results, limit).await;
    Ok(())
}

async fn run_assemble(config: &HarvesterConfig) -> Result<()> {
    let results = ResultSet::load(&result_path(config))?;
    let assembler = build_assembler(config);

    tokio::task::spawn_blocking(move || assembler.assemble(&results))
        .await
        .context("assembly task failed")??;
    Ok(())
}

async fn run_pipeline(config: &HarvesterConfig) -> Result<()> {
    let pipeline = HarvestPipeline::new(
        build_harvester(config)?,
        build_fetcher(config),
        build_assembler(config),
        config.output_dir.clone(),
    )
    .with_fetch_limit(config.fetch.limit.rows());

    let spec = QuerySpec {
        query: config.search.query.clone(),
        license_query: config.search.license_query.clone(),
        suffix: config.search.suffix.clone(),
    };
    let report = pipeline.execute(&spec).await?;

    info!(
        harvested = report.harvested,
        cloned = report.fetch.cloned,
        failed = report.fetch.failed,
        files = report.assemble.files_copied,
        total_ms = report.stats.total_duration_ms,
        "Pipeline finished"
    );
    Ok(())
}
