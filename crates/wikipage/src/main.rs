use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};
use wikipage_core::assemble::{AssemblyResult, DEFAULT_CHUNK_BYTES};
use wikipage_core::client::{ConfluenceClient, ContentApi, page_url};
use wikipage_core::config::{DEFAULT_CONFIG_PATH, ServiceConfig, load_config};
use wikipage_core::error::AssemblyError;
use wikipage_core::markup::{InputFormat, OutputFormat};
use wikipage_core::pages::{
    CreateOptions, PageEdit, create_page_with_api, extract_page_id, get_page_with_api,
    update_page_with_api,
};

#[derive(Debug, Parser)]
#[command(
    name = "wikipage",
    version,
    about = "Read, update, and create pages on a Confluence-style wiki"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Log request-level detail to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Fetch a page")]
    Get(GetArgs),
    #[command(about = "Replace, append to, or rename a page")]
    Update(UpdateArgs),
    #[command(about = "Create a page, optionally in chunks")]
    Create(CreateArgs),
    #[command(name = "extract-id", about = "Print the page id embedded in a page URL")]
    ExtractId(ExtractIdArgs),
}

#[derive(Debug, Args)]
struct PageTarget {
    #[arg(long, value_name = "ID")]
    page_id: Option<String>,
    #[arg(long, value_name = "URL")]
    url: Option<String>,
}

impl PageTarget {
    fn resolve(&self) -> Result<String> {
        if let Some(page_id) = self.page_id.as_deref().filter(|id| !id.trim().is_empty()) {
            return Ok(page_id.trim().to_string());
        }
        match self.url.as_deref() {
            Some(url) => Ok(extract_page_id(url)?),
            None => bail!("pass --page-id or --url"),
        }
    }
}

#[derive(Debug, Args)]
struct GetArgs {
    #[command(flatten)]
    target: PageTarget,
    #[arg(long, default_value = "markdown", help = "markdown|storage|view")]
    format: String,
    #[arg(short, long, value_name = "PATH", help = "Write page content to a file")]
    output: Option<PathBuf>,
    #[arg(long, help = "Print the page as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    #[command(flatten)]
    target: PageTarget,
    #[arg(short, long, conflicts_with = "file")]
    content: Option<String>,
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,
    #[arg(short, long)]
    title: Option<String>,
    #[arg(long, default_value = "markdown", help = "markdown|html")]
    format: String,
    #[arg(short, long, help = "Append to the existing content instead of replacing it")]
    append: bool,
}

#[derive(Debug, Args)]
struct CreateArgs {
    #[arg(short, long)]
    title: String,
    #[arg(short, long, conflicts_with = "file")]
    content: Option<String>,
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,
    #[arg(short, long, help = "Space key (defaults to WIKI_DEFAULT_SPACE)")]
    space: Option<String>,
    #[arg(short, long, help = "Parent page id (defaults to WIKI_DEFAULT_PARENT_PAGE)")]
    parent: Option<String>,
    #[arg(long, default_value = "html", help = "html|markdown")]
    format: String,
    #[arg(
        long,
        value_name = "BYTES",
        help = "Create in chunks when the rendered content exceeds this many bytes"
    )]
    chunk_size: Option<usize>,
    #[arg(long, help = "Create in chunks using the configured or default (1 MiB) chunk size")]
    chunked: bool,
}

#[derive(Debug, Args)]
struct ExtractIdArgs {
    url: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Some(Commands::Get(args)) => run_get(cli.config.as_deref(), args),
        Some(Commands::Update(args)) => run_update(cli.config.as_deref(), args),
        Some(Commands::Create(args)) => run_create(cli.config.as_deref(), args),
        Some(Commands::ExtractId(args)) => run_extract_id(args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "wikipage={default_level},wikipage_core={default_level}"
            ))
        })
        .context("invalid RUST_LOG filter")?;
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set subscriber")?;
    Ok(())
}

fn resolve_service(config_path: Option<&Path>) -> Result<ServiceConfig> {
    dotenvy::dotenv().ok();
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let file = load_config(&path)?;
    ServiceConfig::from_env(&file)
}

fn run_get(config_path: Option<&Path>, args: GetArgs) -> Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    let page_id = args.target.resolve()?;
    let service = resolve_service(config_path)?;
    let mut client = ConfluenceClient::new(&service)?;

    let view = get_page_with_api(&mut client, &page_id, format)?;
    debug!(requests = client.request_count(), "content service requests");

    if let Some(output) = &args.output {
        fs::write(output, &view.content)
            .with_context(|| format!("failed to write {}", output.display()))?;
        println!("saved: {}", normalize_path(output));
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("title: {}", view.title);
    println!("url: {}", view.url);
    println!("space: {}", view.space);
    println!("version: {}", view.version);
    println!(
        "last_updated: {} ({})",
        view.last_updated_by, view.last_updated
    );
    if !view.labels.is_empty() {
        println!("labels: {}", view.labels.join(", "));
    }
    if !view.attachments.is_empty() {
        println!("attachments: {}", view.attachments.len());
    }
    if args.output.is_none() {
        println!("\n--- content ---\n{}", view.content);
    }
    Ok(())
}

fn run_update(config_path: Option<&Path>, args: UpdateArgs) -> Result<()> {
    let format = InputFormat::parse(&args.format)?;
    let page_id = args.target.resolve()?;
    let content = match (&args.content, &args.file) {
        (Some(content), _) => Some(content.clone()),
        (None, Some(path)) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        (None, None) => None,
    };
    let service = resolve_service(config_path)?;
    let mut client = ConfluenceClient::new(&service)?;

    let page = update_page_with_api(
        &mut client,
        &page_id,
        &PageEdit {
            content,
            title: args.title,
            format: Some(format),
            append: args.append,
        },
    )?;
    debug!(requests = client.request_count(), "content service requests");

    println!("updated: version {}", page.version);
    println!("title: {}", page.title);
    println!("url: {}", page.url);
    println!("updated_by: {}", page.last_updated_by);
    Ok(())
}

fn run_create(config_path: Option<&Path>, args: CreateArgs) -> Result<()> {
    let format = InputFormat::parse(&args.format)?;
    let content = match (args.content, &args.file) {
        (Some(content), _) => content.into_bytes(),
        (None, Some(path)) => {
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?
        }
        (None, None) => bail!("pass --content or --file"),
    };
    let service = resolve_service(config_path)?;
    let space_key = service.space_key(args.space.as_deref())?;
    let parent_id = service.parent_page(args.parent.as_deref());
    let chunk_size = args
        .chunk_size
        .or(service.chunk_size)
        .or(args.chunked.then_some(DEFAULT_CHUNK_BYTES));
    let mut client = ConfluenceClient::new(&service)?;

    let result = create_page_with_api(
        &mut client,
        &CreateOptions {
            title: args.title,
            content,
            space_key,
            parent_id,
            format,
            chunk_size,
        },
    );
    debug!(requests = client.request_count(), "content service requests");
    match result {
        Ok(result) => {
            print_assembly(&result);
            Ok(())
        }
        Err(error) => {
            eprintln!("failed_stage: {:?}", error.stage());
            if let AssemblyError::PartialAssembly {
                page_id,
                completed_chunks,
                total_chunks,
                ..
            } = &error
            {
                eprintln!("partial.page_id: {page_id}");
                eprintln!("partial.url: {}", page_url(client.base_url(), page_id));
                eprintln!("partial.chunks_written: {completed_chunks}/{total_chunks}");
            }
            Err(error.into())
        }
    }
}

fn print_assembly(result: &AssemblyResult) {
    println!("created: {}", result.page_id);
    println!("title: {}", result.title);
    println!("url: {}", result.url);
    println!("space: {}", result.space_key);
    println!("version: {}", result.version);
    if result.chunked {
        println!("chunks: {}", result.chunks);
        println!("total_bytes: {}", result.total_bytes);
        for append in &result.appends {
            println!(
                "append.{}: {} bytes -> version {}",
                append.chunk, append.bytes, append.version
            );
        }
    }
}

fn run_extract_id(args: ExtractIdArgs) -> Result<()> {
    println!("{}", extract_page_id(&args.url)?);
    Ok(())
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
