use anyhow::Context;
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use oidwalk_core::crawl::{
    CrawlOptions, CrawlProgressCallback, CrawlSummary, DEFAULT_ROOTS, execute_crawl,
};
use oidwalk_core::data::{CrawlSession, Database};
use oidwalk_core::drill::DrillPath;
use oidwalk_core::error::CrawlError;
use oidwalk_core::policy::FanOutPolicy;
use oidwalk_scanner::enumerate::{EnumeratedChild, document_title, enumerate_table};
use oidwalk_scanner::fetcher::HttpFetcher;
use oidwalk_scanner::record::is_dotted_identifier;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;
use url::Url;

// Helper functions for crawl handler

/// Expand `~` in a user-supplied path
pub fn resolve_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Parse a single line as a dotted identifier
pub fn parse_oid_line(line: &str) -> Option<String> {
    let line = line.trim();
    if is_dotted_identifier(line) {
        return Some(line.to_string());
    }

    eprintln!("⚠️  Skipping invalid identifier '{}'", line);
    None
}

/// Load and parse identifiers from a newline-delimited file
pub fn load_oids_from_file(path: &Path) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    let oids: Vec<String> = content
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .filter_map(parse_oid_line)
        .collect();

    if oids.is_empty() {
        return Err(format!("No valid identifiers found in {}", path.display()));
    }

    Ok(oids)
}

/// Load the identifiers of an `enumerate` seed file
pub fn load_seed_file(path: &Path) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read seed file {}: {}", path.display(), e))?;
    let rows: Vec<EnumeratedChild> = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid seed file {}: {}", path.display(), e))?;

    if rows.is_empty() {
        return Err(format!("Seed file {} has no rows", path.display()));
    }

    Ok(rows.into_iter().map(|row| row.identifier).collect())
}

/// Roots from explicit identifiers, then seed file rows, then the defaults
pub fn collect_roots(explicit: &[String], seed_file: Option<&PathBuf>) -> Result<Vec<String>, String> {
    let mut roots = Vec::new();
    for root in explicit {
        match parse_oid_line(root) {
            Some(root) => roots.push(root),
            None => return Err(format!("Invalid root identifier '{}'", root)),
        }
    }
    if let Some(seed_file) = seed_file {
        roots.extend(load_seed_file(seed_file)?);
    }
    if roots.is_empty() {
        roots = DEFAULT_ROOTS.iter().map(|root| root.to_string()).collect();
    }
    Ok(roots)
}

/// Roots for resuming an aborted session: the abort root and every root after it
pub fn resume_roots(session: &CrawlSession) -> Result<Vec<String>, String> {
    let abort_root = session
        .abort_root
        .as_deref()
        .ok_or_else(|| format!("Session {} has no recorded abort root", session.id))?;
    let roots: Vec<String> = serde_json::from_str(&session.roots)
        .map_err(|e| format!("Session {} has unreadable roots: {}", session.id, e))?;

    let resumed: Vec<String> = match roots.iter().position(|root| root == abort_root) {
        Some(index) => roots[index..].to_vec(),
        None => vec![abort_root.to_string()],
    };
    Ok(resumed)
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> String {
    print!("{} ", msg.bright_cyan().bold());
    let _ = io::stdout().flush();
    let mut response = String::new();
    if io::stdin().read_line(&mut response).is_err() {
        return String::new();
    }
    response.trim().to_lowercase()
}

pub fn print_banner() {
    println!(
        "{} {}",
        "oidwalk".bright_cyan().bold(),
        env!("CARGO_PKG_VERSION").bright_white()
    );
    println!("{}", "walking the OID tree, one node at a time".dimmed());
    println!();
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", "✗".red().bold(), msg);
    std::process::exit(1);
}

pub fn handle_init(args: &ArgMatches) {
    print_divider();
    println!("{}", "  OIDWALK INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let config_dir = args
        .get_one::<String>("PATH")
        .map(|path| resolve_path(path))
        .unwrap_or_else(|| resolve_path("~/.config/oidwalk/"));
    let force = args.get_flag("force");
    let db_path = config_dir.join("oidwalk.db");

    println!(
        "{} Target: {}",
        "→".blue(),
        config_dir.display().to_string().bright_white()
    );
    println!();

    if let Err(e) = fs::create_dir_all(&config_dir) {
        fail(format!("Failed to create {}: {}", config_dir.display(), e));
    }

    if Database::exists(&db_path) {
        let overwrite = if force {
            true
        } else {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!("Database already exists at:");
            println!(
                "  {} {}",
                "•".yellow(),
                db_path.display().to_string().bright_white()
            );
            println!();
            let response = print_prompt("Would you like to overwrite it? [y/N]:");
            println!();
            response == "y" || response == "yes"
        };

        if overwrite {
            if let Err(e) = Database::drop(&db_path) {
                fail(format!("Failed to remove {}: {}", db_path.display(), e));
            }
            println!("{} Existing database removed", "✓".green().bold());
        } else {
            println!("{} Keeping existing database", "→".blue());
        }
        println!();
    }

    if !Database::exists(&db_path) {
        println!("{} Creating database...", "→".blue());
        if let Err(e) = Database::new(&db_path) {
            fail(format!("Failed to create database: {}", e));
        }
    }

    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!();
}

pub async fn handle_crawl(sub_matches: &ArgMatches) {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let db_path = resolve_path(
        sub_matches
            .get_one::<String>("db")
            .map(String::as_str)
            .unwrap_or("~/.config/oidwalk/oidwalk.db"),
    );
    let base_url = sub_matches
        .get_one::<Url>("base-url")
        .map(|url| url.as_str().to_string())
        .unwrap_or_else(|| oidwalk_scanner::DEFAULT_BASE_URL.to_string());
    let max_depth = *sub_matches.get_one::<usize>("max-depth").unwrap_or(&64);
    let timeout = *sub_matches.get_one::<u64>("timeout").unwrap_or(&10);
    let fraction = *sub_matches.get_one::<f64>("fan-out-fraction").unwrap_or(&0.5);

    if let Some(parent) = db_path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        fail(format!("Failed to create {}: {}", parent.display(), e));
    }
    let store = match Database::new(&db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => fail(format!("Failed to open database {}: {}", db_path.display(), e)),
    };

    let roots = if sub_matches.get_flag("resume") {
        match store.last_failed_session() {
            Ok(Some(session)) => resume_roots(&session),
            Ok(None) => Err("No aborted crawl to resume".to_string()),
            Err(e) => Err(format!("Failed to read sessions: {}", e)),
        }
    } else {
        let explicit: Vec<String> = sub_matches
            .get_many::<String>("root")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        collect_roots(&explicit, sub_matches.get_one::<PathBuf>("seed-file"))
    };
    let roots = roots.unwrap_or_else(|e| fail(e));

    let mut skip_list: HashSet<String> = sub_matches
        .get_many::<String>("skip")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    if let Some(skip_file) = sub_matches.get_one::<PathBuf>("skip-file") {
        skip_list.extend(load_oids_from_file(skip_file).unwrap_or_else(|e| fail(e)));
    }

    let drill_path = match sub_matches.get_one::<String>("drill-to") {
        Some(target) => DrillPath::to_target(target).unwrap_or_else(|e| fail(e)),
        None => DrillPath::default(),
    };

    let mut fan_out = FanOutPolicy::new(FanOutPolicy::width_from_fraction(fraction));
    if let Some(depths) = sub_matches.get_many::<usize>("fan-out-depth") {
        for depth in depths {
            fan_out = fan_out.with_depth(*depth);
        }
    }
    if let Some(oids) = sub_matches.get_many::<String>("fan-out-oid") {
        for oid in oids {
            fan_out = fan_out.with_identifier(oid.clone());
        }
    }

    let fetcher = match HttpFetcher::with_timeout(&base_url, timeout) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => fail(e),
    };

    // Print crawl configuration
    println!("\n🌳 Crawling {} root(s) from {}", roots.len(), base_url);
    println!("Database: {}", db_path.display());
    println!("Max depth: {}", max_depth);
    if !skip_list.is_empty() {
        println!("Skipping: {} identifier(s)", skip_list.len());
    }
    if !drill_path.is_empty() {
        println!("Drill path: {}", drill_path);
    }
    println!("Fan-out workers: {}\n", fan_out.width());

    let configuration = serde_json::json!({
        "base_url": base_url,
        "max_depth": max_depth,
        "skip": skip_list.iter().collect::<Vec<_>>(),
        "drill_path": drill_path.as_slice(),
        "fan_out_width": fan_out.width(),
    })
    .to_string();
    let roots_json = serde_json::to_string(&roots).unwrap_or_else(|_| "[]".to_string());
    let session_id = match store.create_session(&roots_json, Some(&configuration)) {
        Ok(id) => id,
        Err(e) => fail(format!("Failed to record crawl session: {}", e)),
    };
    info!("Crawl session {} started with roots {}", session_id, roots_json);

    let options = CrawlOptions {
        roots,
        max_depth,
        skip_list,
        drill_path,
        fan_out,
    };

    // Set up single progress bar for overall crawl progress
    let progress_bar = Arc::new(ProgressBar::new_spinner());
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        progress_bar.set_style(style);
    }
    progress_bar.enable_steady_tick(Duration::from_millis(120));
    progress_bar.set_message("Starting crawl...");

    let processed_count = Arc::new(AtomicUsize::new(0));
    let pb_clone = progress_bar.clone();
    let count_clone = processed_count.clone();
    let progress_callback: CrawlProgressCallback = Arc::new(move |identifier: String| {
        let count = count_clone.fetch_add(1, Ordering::Relaxed) + 1;
        pb_clone.set_message(format!("Crawling {} ({} nodes fetched)", identifier, count));
    });

    let result = execute_crawl(options, fetcher, store.clone(), Some(progress_callback)).await;

    match result {
        Ok(summary) => {
            progress_bar.finish_with_message(format!(
                "Crawl complete! {} nodes fetched",
                processed_count.load(Ordering::Relaxed)
            ));
            if let Err(e) = store.complete_session(&session_id) {
                eprintln!("⚠️  Failed to close session {}: {}", session_id, e);
            }
            println!();
            print!("{}", format_summary(&summary));
        }
        Err(CrawlError::Fatal { root, identifier }) => {
            progress_bar.abandon_with_message("Crawl aborted");
            if let Err(e) = store.fail_session(&session_id, Some(&root)) {
                eprintln!("⚠️  Failed to record abort for session {}: {}", session_id, e);
            }
            eprintln!();
            eprintln!(
                "{} {} did not contain a description list; the site may be blocking requests.",
                "✗".red().bold(),
                identifier.bright_white()
            );
            eprintln!(
                "{} Resume with: oidwalk crawl --root {}  (or --resume)",
                "→".yellow().bold(),
                root.bright_white().bold()
            );
            std::process::exit(1);
        }
        Err(e) => {
            progress_bar.abandon_with_message("Crawl failed");
            let _ = store.fail_session(&session_id, None);
            fail(format!("Crawl failed: {}", e));
        }
    }
}

/// Render the crawl summary shown after a run
pub fn format_summary(summary: &CrawlSummary) -> String {
    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Nodes visited: {}\n", summary.visited));
    report.push_str(&format!("  Records stored: {}\n", summary.inserted));
    report.push_str(&format!("  Already stored: {}\n", summary.duplicates));
    report.push_str(&format!("  Dropped nodes: {}\n", summary.failed));
    report.push_str(&format!("  Store failures: {}\n", summary.store_failures));
    report.push_str(&format!("  Skipped: {}\n", summary.skipped));
    report.push_str(&format!("  Off drill path: {}\n", summary.gated));
    report.push_str(&format!("  Beyond max depth: {}\n", summary.truncated));
    if !summary.field_names.is_empty() {
        let names: Vec<&str> = summary.field_names.iter().map(String::as_str).collect();
        report.push_str(&format!("  Description terms: {}\n", names.join(", ")));
    }
    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    report
}

/// Enumerate a saved table page into a JSON seed file, returning the row
/// count and the page title
pub fn run_enumerate(
    input: &Path,
    output: &Path,
    base_url: &str,
    pretty: bool,
) -> anyhow::Result<(usize, Option<String>)> {
    let body = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let rows = enumerate_table(&body, base_url)
        .with_context(|| format!("Failed to enumerate {}", input.display()))?;

    let json = if pretty {
        serde_json::to_string_pretty(&rows)?
    } else {
        serde_json::to_string(&rows)?
    };
    fs::write(output, json).with_context(|| format!("Failed to write {}", output.display()))?;
    Ok((rows.len(), document_title(&body)))
}

pub fn handle_enumerate(args: &ArgMatches) {
    let Some(input) = args.get_one::<PathBuf>("FILE") else {
        fail("An input file is required");
    };
    let Some(output) = args.get_one::<PathBuf>("output") else {
        fail("--output is required");
    };
    let base_url = args
        .get_one::<String>("base-url")
        .map(String::as_str)
        .unwrap_or(oidwalk_scanner::DEFAULT_BASE_URL);

    match run_enumerate(input, output, base_url, args.get_flag("pretty")) {
        Ok((count, title)) => {
            if let Some(title) = title {
                println!("{} Table: {}", "→".blue(), title.bright_white());
            }
            println!(
                "{} Wrote {} rows to {}",
                "✓".green().bold(),
                count.to_string().cyan(),
                output.display().to_string().bright_white()
            );
        }
        Err(e) => fail(format!("{:#}", e)),
    }
}

pub fn handle_drill_path(args: &ArgMatches) {
    let Some(target) = args.get_one::<String>("OID") else {
        fail("An identifier is required");
    };
    match DrillPath::to_target(target) {
        Ok(path) => println!("{}", path),
        Err(e) => fail(e),
    }
}

/// Export every stored record as a JSON array, returning the record count
pub fn run_export(db_path: &Path, output: &Path) -> anyhow::Result<usize> {
    if !Database::exists(db_path) {
        anyhow::bail!("No database at {}", db_path.display());
    }
    let db = Database::new(db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    let records = db.all_nodes()?;
    fs::write(output, serde_json::to_string_pretty(&records)?)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(records.len())
}

pub fn handle_export(args: &ArgMatches) {
    let db_path = resolve_path(
        args.get_one::<String>("db")
            .map(String::as_str)
            .unwrap_or("~/.config/oidwalk/oidwalk.db"),
    );
    let Some(output) = args.get_one::<PathBuf>("output") else {
        fail("--output is required");
    };

    match run_export(&db_path, output) {
        Ok(count) => println!(
            "{} Exported {} records to {}",
            "✓".green().bold(),
            count.to_string().cyan(),
            output.display().to_string().bright_white()
        ),
        Err(e) => fail(format!("{:#}", e)),
    }
}
