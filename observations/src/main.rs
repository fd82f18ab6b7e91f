use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use observations::core::Entry;
use observations::favorites::{YamlFavorites, entry_hash};
use observations::history::{self, days_ago, history_dates};
use observations::storage::FavoritesStore;
use observations::{DayView, FsDayStore, load_days};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "observations",
    about = "Browse daily journal observations by date",
    version
)]
struct Cli {
    /// Directory holding `YYYY-MM/` folders and `YYYY.tgz` archives.
    #[arg(long, global = true, env = "OBSERVATIONS_DATA_ROOT", default_value = "data")]
    data_root: PathBuf,
    /// Favorites file. Defaults to `<data-root>/favorites.yaml`.
    #[arg(long, global = true, env = "OBSERVATIONS_FAVORITES")]
    favorites: Option<PathBuf>,
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the observations recorded for a date (defaults to today).
    Show(ShowArgs),

    /// Show today's observations.
    Today(ViewArgs),

    /// Show the observations of a random day since the journal began.
    Random(ViewArgs),

    /// List or toggle favorite entries.
    #[command(subcommand)]
    Favorites(FavoritesCommand),
}

#[derive(Debug, Args)]
struct ShowArgs {
    /// Date to show (YYYY-MM-DD).
    date: Option<NaiveDate>,
    #[command(flatten)]
    view: ViewArgs,
}

#[derive(Debug, Args)]
struct ViewArgs {
    /// Include categories hidden by default (exercise, memorable, ...).
    #[arg(long)]
    all: bool,
    /// Also show the same day in every earlier year.
    #[arg(long)]
    history: bool,
    /// Emit JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum FavoritesCommand {
    /// Print all favorites.
    List {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Mark an entry as favorite, or unmark it if it already is one.
    Toggle {
        /// Date the entry belongs to (YYYY-MM-DD).
        date: NaiveDate,
        /// Entry text; separate continuation lines with `\n`.
        text: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store = FsDayStore::new(&cli.data_root);
    let favorites_path = favorites_path(&cli.data_root, cli.favorites.as_deref());
    match cli.command {
        Commands::Show(args) => {
            let date = args.date.unwrap_or_else(history::today);
            handle_view(&store, &favorites_path, date, args.view)
        }
        Commands::Today(args) => handle_view(&store, &favorites_path, history::today(), args),
        Commands::Random(args) => {
            let date = history::random_date(&mut rand::thread_rng(), history::today());
            handle_view(&store, &favorites_path, date, args)
        }
        Commands::Favorites(command) => handle_favorites(&favorites_path, command),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn favorites_path(data_root: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(PathBuf::from)
        .unwrap_or_else(|| data_root.join("favorites.yaml"))
}

fn handle_view(
    store: &FsDayStore,
    favorites_path: &Path,
    date: NaiveDate,
    args: ViewArgs,
) -> Result<()> {
    let ViewArgs {
        all,
        history: walk_back,
        json,
    } = args;
    let views = collect_views(store, date, walk_back, all)
        .with_context(|| format!("loading observations for {date}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    let favorites = YamlFavorites::load(favorites_path)
        .with_context(|| format!("loading favorites {:?}", favorites_path))?;
    let today = history::today();
    for (idx, view) in views.iter().enumerate() {
        if idx > 0 {
            println!();
        }
        print!("{}", render_day(view, &favorites, today));
    }
    Ok(())
}

/// Views for `date` (and earlier years when `walk_back`). A date on or before the
/// journal epoch gives one empty view.
fn collect_views(
    store: &FsDayStore,
    date: NaiveDate,
    walk_back: bool,
    include_filtered: bool,
) -> Result<Vec<DayView>> {
    let dates = history_dates(date, walk_back);
    if dates.is_empty() {
        debug!(%date, epoch = %history::EPOCH, "date precedes the journal");
        return Ok(vec![DayView::empty(date)]);
    }
    Ok(load_days(store, dates, include_filtered)?)
}

fn handle_favorites(path: &Path, command: FavoritesCommand) -> Result<()> {
    let mut favorites =
        YamlFavorites::load(path).with_context(|| format!("loading favorites {:?}", path))?;

    match command {
        FavoritesCommand::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(favorites.all())?);
            } else if favorites.all().is_empty() {
                eprintln!("No favorites saved in {:?}.", path);
            } else {
                for (date, entries) in favorites.all() {
                    println!("{date}");
                    for text in entries.values() {
                        println!("{}", indent_entry(text.lines()));
                    }
                }
            }
        }
        FavoritesCommand::Toggle { date, text } => {
            let entry = Entry(text.split("\\n").map(str::to_string).collect());
            let now_favorite = favorites
                .toggle(date, &entry)
                .with_context(|| format!("toggling favorite on {date}"))?;
            let state = if now_favorite { "added" } else { "removed" };
            println!("{state} favorite {} on {date}", &entry_hash(&entry)[..12]);
        }
    }
    Ok(())
}

/// Text rendering of one day: header with age, then each category and its entries.
/// Favorite entries are marked with `*`.
fn render_day(view: &DayView, favorites: &dyn FavoritesStore, today: NaiveDate) -> String {
    let mut out = String::new();
    let age = days_ago(view.date, today);
    let _ = writeln!(out, "{} ({})", view.date.format("%A, %Y-%m-%d"), describe_age(age));

    if view.observations.is_empty() {
        let _ = writeln!(out, "  (no observations)");
        return out;
    }

    for (category, entries) in view.observations.iter() {
        let _ = writeln!(out, "== {category} ==");
        for entry in entries {
            let marker = if favorites.is_favorite(view.date, entry) {
                '*'
            } else {
                ' '
            };
            let _ = writeln!(
                out,
                "{marker}{}",
                indent_entry(entry.lines().iter().map(String::as_str))
            );
        }
    }
    out
}

fn indent_entry<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    lines
        .enumerate()
        .map(|(idx, line)| {
            if idx == 0 {
                format!(" - {line}")
            } else {
                format!("     {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_age(days: i64) -> String {
    match days {
        0 => "today".to_string(),
        1 => "yesterday".to_string(),
        d if d < 0 => format!("in {} days", -d),
        d if d < 365 => format!("{d} days ago"),
        d => {
            let years = d / 365;
            if years == 1 {
                "1 year ago".to_string()
            } else {
                format!("{years} years ago")
            }
        }
    }
}
