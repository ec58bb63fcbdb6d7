//! Trademark Pages CLI - render, exercise and check trademark search pages

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use walkdir::WalkDir;

use trademark_pages::{
    Configuration, DispatchOutcome, Document, Endpoint, FixSuggestion, Gateway, HttpTransport,
    ImageUpload, MockTransport, Page, PageError, PageKind, PageParams, Settings, Transport,
};

#[derive(Parser)]
#[command(name = "trademark-pages")]
#[command(about = "Trademark Pages - bind data into trademark search pages and run their actions")]
#[command(version)]
struct Cli {
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LoadArgs {
    /// Page kind (home, search, trademark); detected from the page if omitted
    #[arg(short, long)]
    page: Option<PageKind>,

    /// Search query the page was opened with
    #[arg(short, long)]
    query: Option<String>,

    /// Trademark id for detail pages
    #[arg(long)]
    id: Option<String>,

    /// YAML settings file
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Do not touch the network; every request fails and snapshots are used
    #[arg(long)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a page, bind its data and print the resulting HTML
    Render {
        /// Path to the .html page
        file: PathBuf,

        #[command(flatten)]
        load: LoadArgs,

        /// Write the HTML here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the page event log (JSON) to stderr
        #[arg(long)]
        events: bool,
    },

    /// Load a page and click an element
    Click {
        /// Path to the .html page
        file: PathBuf,

        /// Selector of the element to click
        selector: String,

        #[command(flatten)]
        load: LoadArgs,

        /// Print the page HTML after the click
        #[arg(long)]
        html: bool,
    },

    /// Load a page and run image search with a local file
    Upload {
        /// Path to the .html page
        file: PathBuf,

        /// Image to upload
        image: PathBuf,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Check pages: configuration, data snapshots, action markers
    Validate {
        /// A page or a directory of pages
        path: PathBuf,
    },

    /// Show the resolved endpoint configuration of a page
    Config {
        /// Path to the .html page
        file: PathBuf,

        /// YAML settings file
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let result = match cli.command {
        Commands::Render {
            file,
            load,
            output,
            events,
        } => render(&file, &load, output.as_deref(), events).await,
        Commands::Click {
            file,
            selector,
            load,
            html,
        } => click(&file, &selector, &load, html).await,
        Commands::Upload { file, image, load } => upload(&file, &image, &load).await,
        Commands::Validate { path } => validate(&path),
        Commands::Config { file, settings } => show_config(&file, settings.as_deref()),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            if let Some(suggestion) = e.downcast_ref::<PageError>().and_then(|pe| pe.fix_suggestion()) {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            std::process::exit(1);
        }
    }
}

async fn open_page(file: &Path, load: &LoadArgs) -> Result<Page> {
    let html = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let settings = Settings::load(load.settings.as_deref())?;
    let transport: Arc<dyn Transport> = if load.offline {
        Arc::new(MockTransport::offline())
    } else {
        Arc::new(HttpTransport::new(&settings)?)
    };
    let params = PageParams {
        query: load.query.clone(),
        trademark_id: load.id.clone(),
    };
    let page = Page::load(&html, load.page, params, settings, transport)?;
    let report = page.initialize().await;

    eprintln!(
        "{} {} page | data: {} | {}",
        "→".cyan(),
        page.kind().to_string().cyan().bold(),
        report.source.cyan(),
        match report.bind {
            Some(bind) => format!(
                "{} written, {} gaps, {} rows",
                bind.written, bind.gaps, bind.rows
            ),
            None => "nothing bound".to_string(),
        }
    );
    Ok(page)
}

async fn render(file: &Path, load: &LoadArgs, output: Option<&Path>, events: bool) -> Result<bool> {
    let page = open_page(file, load).await?;
    let html = page.html();
    match output {
        Some(path) => {
            fs::write(path, &html).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} Wrote {}", "✓".green(), path.display());
        }
        None => println!("{html}"),
    }
    if events {
        eprintln!("{}", serde_json::to_string_pretty(&page.events().to_json())?);
    }
    Ok(true)
}

async fn click(file: &Path, selector: &str, load: &LoadArgs, html: bool) -> Result<bool> {
    let page = open_page(file, load).await?;
    let outcome = page.click_selector(selector).await?;
    print_notifications(&page);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if html {
        println!("{}", page.html());
    }
    Ok(!matches!(outcome, DispatchOutcome::Failed { .. }))
}

async fn upload(file: &Path, image: &Path, load: &LoadArgs) -> Result<bool> {
    let page = open_page(file, load).await?;
    let upload = ImageUpload::from_path(image)?;
    let outcome = page.submit_image(upload).await;
    print_notifications(&page);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(!matches!(outcome, DispatchOutcome::Failed { .. }))
}

fn print_notifications(page: &Page) {
    for event in page.events().events() {
        if let trademark_pages::EventKind::Notified { severity, message } = event.kind {
            let tag = match severity.as_str() {
                "error" => severity.red().bold(),
                "success" => severity.green().bold(),
                _ => severity.blue().bold(),
            };
            eprintln!("  [{}] {}", tag, message);
        }
    }
}

/// Problems found in one page
fn check_page(file: &Path) -> Result<(Option<PageKind>, Vec<String>)> {
    let html = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let doc = Document::parse(&html);
    let mut issues = Vec::new();

    let Some(kind) = PageKind::detect(&doc) else {
        return Ok((None, issues));
    };

    if let Some(element) = doc.element_by_id(trademark_pages::config::CONFIG_ELEMENT_ID) {
        if let Err(e) = Configuration::from_json(&doc.text_content(element)) {
            issues.push(e.to_string());
        }
    }
    if Gateway::load_fallback(&doc, kind.template_id()).is_none() {
        issues.push(format!("#{} is not valid JSON", kind.template_id()));
    }

    let page = Page::load(
        &html,
        Some(kind),
        PageParams::default(),
        Settings::default(),
        Arc::new(MockTransport::offline()),
    )?;
    issues.extend(page.audit().iter().map(ToString::to_string));

    Ok((Some(kind), issues))
}

fn validate(path: &Path) -> Result<bool> {
    let files: Vec<PathBuf> = if path.is_dir() {
        WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "html"))
            .collect()
    } else {
        vec![path.to_path_buf()]
    };

    let mut clean = true;
    let mut checked = 0;
    for file in &files {
        match check_page(file)? {
            (None, _) => {
                println!("{} {} (not a trademark page, skipped)", "-".dimmed(), file.display());
            }
            (Some(kind), issues) if issues.is_empty() => {
                checked += 1;
                println!("{} {} ({})", "✓".green(), file.display(), kind);
            }
            (Some(kind), issues) => {
                checked += 1;
                clean = false;
                println!("{} {} ({})", "✗".red(), file.display(), kind);
                for issue in issues {
                    println!("  {} {}", "•".yellow(), issue);
                }
            }
        }
    }

    if checked == 0 {
        return Err(PageError::UnknownPage.into());
    }
    println!("  Pages checked: {checked}");
    Ok(clean)
}

fn show_config(file: &Path, settings: Option<&Path>) -> Result<bool> {
    let html = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let settings = Settings::load(settings)?;
    let doc = Document::parse(&html);
    let config = Configuration::from_document(&doc).with_settings(&settings);

    println!("{} Base URL: {}", "→".cyan(), config.base_url.cyan().bold());
    println!("  Origin: {}", settings.origin);
    let sample = [("id".to_string(), "ID".to_string())];
    for endpoint in Endpoint::ALL {
        let url = config.url(&settings.origin, *endpoint, &sample, &[])?;
        println!("  {:<16} {}", endpoint.name(), url);
    }
    Ok(true)
}
