//! schoolday - school meals, class timetable and academic schedule from the terminal.
//!
//! Every command opens the local store, runs one operation against the
//! school data service and prints the result.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use schoolday_core::cache::{CacheKind, CACHE_NAMESPACE};
use schoolday_core::models::{MealRecord, SchoolRef, TimetableGrid};
use schoolday_core::{
    ApiClient, Config, FileStore, KeyValueStore, LoadOutcome, PagerOptions, SchoolService,
    SettingsProvider, SystemClock,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable overriding the configured API base URL
const API_URL_ENV: &str = "SCHOOLDAY_API_URL";

const WEEKDAYS: [&str; 7] = ["월", "화", "수", "목", "금", "토", "일"];

const USAGE: &str = "\
Usage: schoolday <command>

Commands:
  search <name>                          Find a school by name
  select <region> <school> [name]        Choose the school to follow
  class <grade> <class>                  Set grade and class for the timetable
  today                                  Timetable, meals and schedule for today
  timetable                              Weekly timetable with your edits
  meals [pages]                          Upcoming meals, optionally loading more months
  edit <row> <col> <subject> <teacher>   Override one timetable cell
  reset <row> <col>                      Restore one cell from the school's timetable
  allergy on|off                         Show allergy codes with meals
  refresh                                Drop cached meals and timetable and fetch again
  clear-cache                            Remove every cached response";

/// Initialize the tracing subscriber for logging.
/// Logs go to stderr and to a daily file in the data directory.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "schoolday.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr_layer).init();
            None
        }
    }
}

async fn build_service(config: &Config) -> Result<SchoolService> {
    let store_path = config.store_path()?;
    let store: Arc<dyn KeyValueStore> = Arc::new(
        FileStore::open(&store_path)
            .await
            .with_context(|| format!("Failed to open store at {}", store_path.display()))?,
    );

    let base_url = std::env::var(API_URL_ENV).unwrap_or_else(|_| config.base_url().to_string());
    let api = ApiClient::with_base_url(&base_url, config.request_timeout())?;
    info!(base_url = %api.base_url(), "API client configured");

    let settings = SettingsProvider::load(store.clone()).await?;
    Ok(SchoolService::new(Arc::new(api), store, settings, Arc::new(SystemClock)))
}

fn parse_arg<T: std::str::FromStr>(args: &[String], index: usize, name: &str) -> Result<T> {
    let raw = args
        .get(index)
        .ok_or_else(|| anyhow::anyhow!("Missing <{}>\n\n{}", name, USAGE))?;
    raw.parse()
        .map_err(|_| anyhow::anyhow!("Invalid <{}>: {}", name, raw))
}

fn print_timetable(grid: &TimetableGrid) {
    let columns = grid.first().map(Vec::len).unwrap_or(0);
    if columns == 0 {
        println!("No timetable published.");
        return;
    }

    let header: Vec<String> = WEEKDAYS.iter().take(columns).map(|d| format!("{:<10}", d)).collect();
    println!("     {}", header.join(""));
    for (period, row) in grid.iter().enumerate() {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| {
                let mark = if cell.is_user_changed() {
                    "*"
                } else if cell.changed {
                    "!"
                } else {
                    ""
                };
                format!("{:<10}", format!("{}{}", cell.subject, mark))
            })
            .collect();
        println!("{:>3}  {}", period + 1, cells.join(""));
    }
    println!("\n* edited by you   ! substitution");
}

fn print_meals(meals: &[MealRecord]) {
    if meals.is_empty() {
        println!("No meals published.");
        return;
    }
    for record in meals {
        let kind = record.kind.as_deref().unwrap_or("");
        let calorie = record.calorie.as_deref().map(|c| format!(" ({})", c)).unwrap_or_default();
        println!("{} {}{}", record.date, kind, calorie);
        for item in &record.meal {
            println!("    {}", item.display());
        }
    }
}

async fn run(args: &[String], config: &Config) -> Result<()> {
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };
    let service = build_service(config).await?;

    match command.as_str() {
        "search" => {
            let name = args[1..].join(" ");
            if name.trim().is_empty() {
                bail!("Missing <name>\n\n{}", USAGE);
            }
            for school in service.search_schools(&name).await? {
                let region = school.region_name.as_deref().unwrap_or("-");
                println!(
                    "{}  [{}]  select {} {} {}",
                    school.name, region, school.region_code, school.school_code, school.name
                );
            }
        }
        "select" => {
            let region: String = parse_arg(args, 1, "regionCode")?;
            let school: String = parse_arg(args, 2, "schoolCode")?;
            let name = (args.len() > 3).then(|| args[3..].join(" "));
            service
                .settings()
                .update(|s| {
                    s.school = Some(SchoolRef::new(school, region));
                    s.school_name = name;
                })
                .await?;
            println!("School selected.");
        }
        "class" => {
            let grade: u32 = parse_arg(args, 1, "grade")?;
            let class_num: u32 = parse_arg(args, 2, "class")?;
            service
                .settings()
                .update(|s| {
                    s.grade = Some(grade);
                    s.class_num = Some(class_num);
                })
                .await?;
            println!("Class set to {}-{}.", grade, class_num);
        }
        "today" => {
            let overview = service.today().await;
            match service.settings().current().school_name {
                Some(name) => println!("== {} · {} ==\n", name, overview.date),
                None => println!("== {} ==\n", overview.date),
            }
            match overview.timetable {
                Ok(grid) => print_timetable(&grid),
                Err(e) => println!("Timetable: {}", e.notice()),
            }
            println!();
            match overview.meals {
                Ok(meals) => print_meals(&meals),
                Err(e) => println!("Meals: {}", e.notice()),
            }
            println!();
            match overview.schedule {
                Ok(schedule) if schedule.is_empty() => println!("No events this month."),
                Ok(schedule) => {
                    for entry in schedule {
                        println!("{}  {}", entry.date, entry.schedule);
                    }
                }
                Err(e) => println!("Schedule: {}", e.notice()),
            }
        }
        "timetable" => print_timetable(&service.timetable().await?),
        "meals" => {
            let pages: usize = if args.len() > 1 { parse_arg(args, 1, "pages")? } else { 0 };
            let pager = service.meal_pager(PagerOptions::default());
            pager.load_initial().await?;
            for _ in 0..pages {
                if pager.load_more(false).await? == LoadOutcome::HorizonReached {
                    println!("(no menus are published this far ahead)");
                    break;
                }
            }
            let feed = pager.feed();
            print_meals(&feed.meals);
            let end = if feed.has_more { "" } else { " (end)" };
            println!("\nLoaded through {}{}", feed.current_month, end);
        }
        "edit" => {
            let row: usize = parse_arg(args, 1, "row")?;
            let col: usize = parse_arg(args, 2, "col")?;
            let subject: String = parse_arg(args, 3, "subject")?;
            let teacher: String = parse_arg(args, 4, "teacher")?;
            print_timetable(&service.edit_cell(row, col, &subject, &teacher).await?);
        }
        "reset" => {
            let row: usize = parse_arg(args, 1, "row")?;
            let col: usize = parse_arg(args, 2, "col")?;
            print_timetable(&service.reset_cell(row, col).await?);
        }
        "allergy" => {
            let show = match args.get(1).map(String::as_str) {
                Some("on") => true,
                Some("off") => false,
                _ => bail!("Expected on or off\n\n{}", USAGE),
            };
            if service.settings().update(|s| s.show_allergy = show).await? {
                let removed = service.cache().clear_kind(CacheKind::Meal).await?;
                info!(removed, "Meal cache cleared after allergy preference change");
            }
            println!("Allergy codes {}.", if show { "shown" } else { "hidden" });
        }
        "refresh" => {
            let pager = service.meal_pager(PagerOptions::default());
            let count = pager.reload_all().await?;
            println!("{} meals this month.", count);
            match service.refresh_timetable().await {
                Ok(_) => println!("Timetable refreshed."),
                Err(e) => println!("Timetable: {}", e.notice()),
            }
        }
        "clear-cache" => {
            let removed = service.cache().clear_by_prefix(CACHE_NAMESPACE).await?;
            println!("Removed {} cached responses.", removed);
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: {:#}, using defaults", e);
            Config::default()
        }
    };

    let log_dir = config
        .log_dir()
        .ok()
        .filter(|dir| std::fs::create_dir_all(dir).is_ok());
    let _guard = init_tracing(log_dir.as_deref());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<schoolday_core::Error>() {
                Some(core) => eprintln!("{}", core.notice()),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}
