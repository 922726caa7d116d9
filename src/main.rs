use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use eyre::Result;
use std::path::PathBuf;
use std::process;
use todostore::{Backend, Category, Config, Filter, NewTask, Priority, Storage, SystemClock, Task, TaskPatch, TaskStore};
use tracing::Level;

#[derive(Parser)]
#[command(name = "todostore")]
#[command(about = "todostore - a to-do list with priorities, categories and due dates")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the config file (default: ~/.config/todostore/config.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the task list (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Storage backend; `memory` keeps nothing between runs
    #[arg(long, value_enum, global = true)]
    backend: Option<Backend>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task
    Add {
        /// Task text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Priority (low, medium, high)
        #[arg(short, long, value_parser = parse_priority)]
        priority: Option<Priority>,

        /// Category (Personal, Work, Study, Home, Health)
        #[arg(short, long, value_parser = parse_category)]
        category: Option<Category>,

        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(short, long, value_parser = parse_due)]
        due: Option<DateTime<Utc>>,
    },

    /// List tasks
    #[command(alias = "ls")]
    List {
        /// Which tasks to show (all, active, completed)
        #[arg(short, long, default_value = "all")]
        filter: String,
    },

    /// Show one task with its details
    Show { id: i64 },

    /// Mark a task completed, or active again
    #[command(alias = "done")]
    Toggle { id: i64 },

    /// Edit a task
    Edit {
        id: i64,

        /// New text
        #[arg(long)]
        text: Option<String>,

        /// New details
        #[arg(long)]
        details: Option<String>,

        /// New priority
        #[arg(short, long, value_parser = parse_priority)]
        priority: Option<Priority>,

        /// New category
        #[arg(short, long, value_parser = parse_category)]
        category: Option<Category>,

        /// New due date
        #[arg(short, long, value_parser = parse_due, conflicts_with = "clear_due")]
        due: Option<DateTime<Utc>>,

        /// Remove the due date
        #[arg(long)]
        clear_due: bool,
    },

    /// Delete a task
    Rm { id: i64 },
}

fn main() {
    let cli = Cli::parse();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    if let Err(e) = try_main(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn try_main(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    let storage = config.open_storage()?;
    let mut store = TaskStore::open_with(storage, SystemClock, &config.key)?;

    run(cli.command, &config, &mut store)
}

fn run(command: Commands, config: &Config, store: &mut TaskStore<Box<dyn Storage>>) -> Result<()> {
    match command {
        Commands::Add {
            text,
            priority,
            category,
            due,
        } => {
            let new_task = NewTask::new(text.join(" "))
                .priority(priority.unwrap_or(config.defaults.priority))
                .category(category.unwrap_or(config.defaults.category))
                .due(due);

            match store.add(new_task)? {
                Some(task) => {
                    println!("{} {}", "Task added! 🎉".green().bold(), format!("(id {})", task.id).dimmed());
                    println!("{}", render_task(&task, Utc::now()));
                }
                None => println!("{}", "Task text cannot be empty".yellow()),
            }
        }
        Commands::List { filter } => {
            let filter = Filter::from(filter.as_str());
            let tasks = store.list(filter);
            if tasks.is_empty() {
                println!("{}", format!("No {} tasks", filter).dimmed());
            } else {
                let now = Utc::now();
                println!("{}", format!("Tasks ({}): {}", filter, tasks.len()).bold());
                for task in tasks {
                    println!("{}", render_task(task, now));
                }
            }
        }
        Commands::Show { id } => match store.get(id) {
            Some(task) => println!("{}", render_task_detail(task, Utc::now())),
            None => not_found(id),
        },
        Commands::Toggle { id } => match store.toggle(id)? {
            Some(task) => println!("{}", render_task(&task, Utc::now())),
            None => not_found(id),
        },
        Commands::Edit {
            id,
            text,
            details,
            priority,
            category,
            due,
            clear_due,
        } => {
            let Some(current) = store.get(id) else {
                not_found(id);
                return Ok(());
            };

            let mut patch = TaskPatch::from(current);
            if let Some(text) = text {
                patch.text = text;
            }
            if let Some(details) = details {
                patch.details = details;
            }
            if let Some(priority) = priority {
                patch.priority = priority;
            }
            if let Some(category) = category {
                patch.category = category;
            }
            if clear_due {
                patch.due_date = None;
            } else if due.is_some() {
                patch.due_date = due;
            }

            match store.edit(id, patch)? {
                Some(task) => println!("{}", render_task_detail(&task, Utc::now())),
                None => println!("{}", "Task text cannot be empty".yellow()),
            }
        }
        Commands::Rm { id } => match store.delete(id)? {
            Some(task) => println!("{} {}", "Deleted".red(), task.text),
            None => not_found(id),
        },
    }

    Ok(())
}

fn not_found(id: i64) {
    println!("{}", format!("No task with id {}", id).yellow());
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    s.parse().map_err(|e: eyre::Report| e.to_string())
}

fn parse_category(s: &str) -> Result<Category, String> {
    s.parse().map_err(|e: eyre::Report| e.to_string())
}

/// `YYYY-MM-DD` means midnight UTC
fn parse_due(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| format!("invalid date '{}': use YYYY-MM-DD or RFC 3339", s))
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%d %b %Y").to_string()
}

fn priority_colored(text: &str, priority: Priority) -> ColoredString {
    match priority {
        Priority::Low => text.green(),
        Priority::Medium => text.yellow(),
        Priority::High => text.red(),
    }
}

fn render_task(task: &Task, now: DateTime<Utc>) -> String {
    let (mark, text) = if task.completed {
        ("✔".green(), task.text.as_str().dimmed().strikethrough())
    } else {
        ("○".normal(), priority_colored(&task.text, task.priority).bold())
    };

    let mut line = format!(
        "{} {} {}  {} {}  {} {}",
        mark,
        format!("[{}]", task.id).dimmed(),
        text,
        task.category.icon(),
        task.category,
        task.priority.icon(),
        task.priority.label(),
    );

    if let Some(due) = task.due_date {
        let due_text = format!("due {}", format_date(due));
        let due_text = if task.is_overdue(now) { due_text.red() } else { due_text.cyan() };
        line.push_str(&format!("  {}", due_text));
    }

    line
}

fn render_task_detail(task: &Task, now: DateTime<Utc>) -> String {
    let mut out = render_task(task, now);
    out.push_str(&format!("\n    {} {}", "created".dimmed(), format_date(task.created_at)));
    if !task.details.is_empty() {
        for line in task.details.lines() {
            out.push_str(&format!("\n    {}", line));
        }
    }
    out
}
