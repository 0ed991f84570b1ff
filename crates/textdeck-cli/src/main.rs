use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use textdeck_core::limits;
use textdeck_local::{Endpoints, Fetcher, PageSession};

#[derive(Parser, Debug)]
#[command(name = "textdeck")]
#[command(about = "Fetch, strip, and wrap web pages for a narrow text display", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search and print numbered results.
    Search(SearchCmd),
    /// Fetch a page through the reader proxy and print its wrapped lines.
    Open(OpenCmd),
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    /// Query terms (joined with spaces).
    #[arg(required = true)]
    terms: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct OpenCmd {
    url: String,
    /// Wrap width in columns.
    #[arg(long, default_value_t = limits::WRAP_COLUMNS)]
    width: usize,
    /// Suppress the link footer.
    #[arg(long)]
    no_links: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Search(cmd) => run_search(cmd),
        Commands::Open(cmd) => run_open(cmd),
    }
}

fn run_search(cmd: SearchCmd) -> Result<()> {
    let fetcher = Fetcher::new(Endpoints::from_env());
    let mut session = PageSession::new();
    let query = cmd.terms.join(" ");
    let n = fetcher.search(&mut session, &query)?;
    if n == 0 {
        bail!("no results for {query:?}");
    }
    for (i, r) in session.results.iter().enumerate() {
        println!("{:3}. {}", i + 1, r.title);
        println!("     {}", r.url);
        if !r.snippet.is_empty() {
            println!("     {}", r.snippet);
        }
    }
    Ok(())
}

fn run_open(cmd: OpenCmd) -> Result<()> {
    let mut fetcher = Fetcher::new(Endpoints::from_env());
    fetcher.wrap_width = cmd.width;
    let mut session = PageSession::new();
    fetcher.fetch_page(&mut session, &cmd.url)?;
    for i in 0..session.lines.len() {
        println!("{}", session.line(i).unwrap_or(""));
    }
    if !cmd.no_links && !session.links.is_empty() {
        println!();
        for (i, url) in session.links.iter().enumerate() {
            println!("[{}] {}", i + 1, url);
        }
    }
    Ok(())
}
