use std::path::PathBuf;

use almanac::chains::NewChain;
use almanac::config::{self, Defaults, LOG_ENV};
use almanac::stacks::StackItem;
use almanac::tags::{Tag, TagDescriptor};
use almanac::time::parse_colloquial;
use almanac::{
    CollectionKind, Directory, Importance, Item, Journal, NewTask, Resolver, Root, Selection,
    Tasklist, Time, TimeZone,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "almanac",
    about = "Journals, notes and tasks kept as plain JSON",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    /// Root directory. Defaults to $ALMANAC_ROOT, then ~/.almanac.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Interpret dates in this UTC offset (hours) instead of the local zone.
    #[arg(long, global = true, allow_hyphen_values = true)]
    utc_offset: Option<i32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a new root with one default collection of each kind.
    Init(InitArgs),

    /// Create a collection.
    New {
        kind: CollectionKind,
        name: String,
    },

    /// Rename a collection and move its files.
    Rename {
        kind: CollectionKind,
        old: String,
        new: String,
    },

    /// Delete a collection and its files.
    Remove {
        kind: CollectionKind,
        name: String,
    },

    /// List collections, optionally of one kind.
    List { kind: Option<CollectionKind> },

    /// Resolve a selector and print the item as JSON.
    Show(SelectArgs),

    /// Add a journal entry.
    Write(WriteArgs),

    /// Add a note to a directory.
    Note(NoteArgs),

    /// Add a task.
    Task(TaskArgs),

    /// Mark the selected task done.
    Done(SelectArgs),

    /// Archive every done task in a tasklist.
    Archive {
        /// Tasklist to sweep (default tasklist if omitted).
        #[arg(long)]
        tasklist: Option<String>,
    },

    /// Manage the tag registry.
    #[command(subcommand)]
    Tag(TagCommand),

    /// Manage habit chains.
    #[command(subcommand)]
    Chain(ChainCommand),

    /// Manage item stacks.
    #[command(subcommand)]
    Stack(StackCommand),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, default_value = "diary")]
    journal: String,
    #[arg(long, default_value = "notes")]
    directory: String,
    #[arg(long, default_value = "todo")]
    tasklist: String,
}

#[derive(Debug, Args)]
struct SelectArgs {
    /// Index, t/j-qualified index, /hash, YYYY-MM-DD or name.
    selector: Option<String>,
    /// Restrict the search to one collection kind.
    #[arg(long)]
    kind: Option<CollectionKind>,
    /// Search this collection instead of the kind's default.
    #[arg(long, short)]
    collection: Option<String>,
    /// Narrow a journal day to the entry created at HH:MM:SS.
    #[arg(long)]
    at: Option<String>,
}

impl SelectArgs {
    fn selection(&self) -> Selection {
        Selection {
            selector: self.selector.clone(),
            kind: self.kind,
            collection: self.collection.clone(),
            entry_time: self.at.clone(),
        }
    }
}

#[derive(Debug, Args)]
struct WriteArgs {
    text: String,
    #[arg(long)]
    journal: Option<String>,
    /// Creation time (RFC 3339 or epoch milliseconds). Defaults to now.
    #[arg(long)]
    time: Option<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
}

#[derive(Debug, Args)]
struct NoteArgs {
    name: String,
    #[arg(long)]
    directory: Option<String>,
    /// File extension (default md).
    #[arg(long)]
    ext: Option<String>,
    /// Initial note text.
    #[arg(long)]
    text: Option<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
}

#[derive(Debug, Args)]
struct TaskArgs {
    outcome: String,
    #[arg(long)]
    action: Option<String>,
    #[arg(long)]
    details: Option<String>,
    /// Due date, e.g. "tomorrow", "friday at 17:00", "in 3 days".
    #[arg(long)]
    due: Option<String>,
    #[arg(long, value_enum, default_value_t = ImportanceArg::Low)]
    importance: ImportanceArg,
    #[arg(long)]
    tasklist: Option<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ImportanceArg {
    Low,
    High,
    Urgent,
}

impl From<ImportanceArg> for Importance {
    fn from(arg: ImportanceArg) -> Self {
        match arg {
            ImportanceArg::Low => Importance::Low,
            ImportanceArg::High => Importance::High,
            ImportanceArg::Urgent => Importance::Urgent,
        }
    }
}

#[derive(Debug, Subcommand)]
enum TagCommand {
    /// Register a tag.
    Add {
        name: String,
        #[arg(long, default_value = "default")]
        color: String,
    },
    /// Remove a tag from the registry.
    Remove { name: String },
    /// Print the registry.
    List,
}

#[derive(Debug, Subcommand)]
enum ChainCommand {
    /// Start a chain.
    Add {
        name: String,
        #[arg(long)]
        alias: Option<String>,
        #[arg(long)]
        details: Option<String>,
    },
    /// Mark a chain done for today.
    Complete { key: String },
    /// Show active chains with their current streaks.
    List,
}

#[derive(Debug, Subcommand)]
enum StackCommand {
    /// Create an empty stack.
    New { name: String },
    /// Push a selection onto a stack.
    Push {
        stack: String,
        #[command(flatten)]
        select: SelectArgs,
        /// Free-form annotation stored with the item.
        #[arg(long)]
        note: Option<String>,
        /// Insert at this position instead of the head.
        #[arg(long)]
        position: Option<usize>,
    },
    /// Remove the item at INDEX (the head by default).
    Pop {
        stack: String,
        #[arg(default_value_t = 0)]
        index: usize,
    },
    /// Resolve and print every item of a stack.
    Peek { stack: String },
}

/// What every handler needs besides its own arguments.
struct Env {
    root_dir: PathBuf,
    tz: TimeZone,
    now: Time,
}

impl Env {
    fn open(&self) -> Result<Root> {
        Root::open(&self.root_dir).with_context(|| format!("loading root at {:?}", self.root_dir))
    }

    fn tags(&self, names: Vec<String>) -> Vec<Tag> {
        names.into_iter().map(|n| Tag::new(n, self.now)).collect()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let root_dir = match cli.root {
        Some(dir) => dir,
        None => config::root_dir().context("locating the root directory")?,
    };
    let tz = match cli.utc_offset {
        Some(hours) => TimeZone::from_hours(hours)?,
        None => TimeZone::local(),
    };
    let env = Env {
        root_dir,
        tz,
        now: Time::now(),
    };
    run(cli.command, &env)
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands, env: &Env) -> Result<()> {
    match command {
        Commands::Init(args) => handle_init(args, env),
        Commands::New { kind, name } => handle_new(kind, &name, env),
        Commands::Rename { kind, old, new } => {
            let mut root = env.open()?;
            root.rename_collection(kind, &old, &new)
                .with_context(|| format!("renaming {kind} '{old}'"))
        }
        Commands::Remove { kind, name } => {
            let mut root = env.open()?;
            root.remove_collection(kind, &name)
                .with_context(|| format!("removing {kind} '{name}'"))
        }
        Commands::List { kind } => handle_list(kind, env),
        Commands::Show(args) => handle_show(args, env),
        Commands::Write(args) => handle_write(args, env),
        Commands::Note(args) => handle_note(args, env),
        Commands::Task(args) => handle_task(args, env),
        Commands::Done(args) => handle_done(args, env),
        Commands::Archive { tasklist } => handle_archive(tasklist, env),
        Commands::Tag(cmd) => handle_tag(cmd, env),
        Commands::Chain(cmd) => handle_chain(cmd, env),
        Commands::Stack(cmd) => handle_stack(cmd, env),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_init(args: InitArgs, env: &Env) -> Result<()> {
    let InitArgs {
        journal,
        directory,
        tasklist,
    } = args;
    let defaults = Defaults {
        journal,
        directory,
        tasklist,
    };
    Root::init(
        Some(Box::new(almanac::FileSystem::new(&env.root_dir))),
        defaults,
    )
    .with_context(|| format!("initializing root at {:?}", env.root_dir))?;
    println!("Initialized {:?}", env.root_dir);
    Ok(())
}

fn handle_new(kind: CollectionKind, name: &str, env: &Env) -> Result<()> {
    let mut root = env.open()?;
    match kind {
        CollectionKind::Journal => root.add_new_collection::<Journal>(name).map(|_| ()),
        CollectionKind::Directory => root.add_new_collection::<Directory>(name).map(|_| ()),
        CollectionKind::Tasklist => root.add_new_collection::<Tasklist>(name).map(|_| ()),
    }
    .with_context(|| format!("creating {kind} '{name}'"))?;
    root.write_changes().context("writing changes")?;
    Ok(())
}

fn handle_list(kind: Option<CollectionKind>, env: &Env) -> Result<()> {
    let root = env.open()?;
    let kinds = match kind {
        Some(kind) => vec![kind],
        None => CollectionKind::ALL.to_vec(),
    };
    for kind in kinds {
        let default = root.default_name(kind);
        for d in root.descriptors(kind) {
            let marker = if d.name == default { "*" } else { " " };
            println!(
                "{marker} {:<10} {:<20} {}",
                kind.as_str(),
                d.name,
                env.tz.format_date_time(d.modified)
            );
        }
    }
    Ok(())
}

fn handle_show(args: SelectArgs, env: &Env) -> Result<()> {
    let mut root = env.open()?;
    let selection = args.selection();
    let item = Resolver::new(&mut root, env.tz)
        .at(env.now)
        .resolve(&selection)
        .with_context(|| format!("resolving {:?}", selection.selector.as_deref().unwrap_or("")))?;
    print_json(&item)
}

fn handle_write(args: WriteArgs, env: &Env) -> Result<()> {
    let WriteArgs {
        text,
        journal,
        time,
        tags,
    } = args;
    let created = match time {
        Some(t) => Time::parse(&t)?,
        None => env.now,
    };
    let mut root = env.open()?;
    let entry = root
        .add_entry(journal.as_deref(), &text, created, env.tags(tags), &env.tz)
        .context("adding entry")?;
    root.write_changes().context("writing changes")?;
    print_json(&entry)
}

fn handle_note(args: NoteArgs, env: &Env) -> Result<()> {
    let NoteArgs {
        name,
        directory,
        ext,
        text,
        tags,
    } = args;
    let mut root = env.open()?;
    let note = root
        .add_note(
            directory.as_deref(),
            &name,
            ext.as_deref(),
            env.tags(tags),
            text.as_deref(),
        )
        .with_context(|| format!("adding note '{name}'"))?;
    root.write_changes().context("writing changes")?;
    print_json(&note)
}

fn handle_task(args: TaskArgs, env: &Env) -> Result<()> {
    let TaskArgs {
        outcome,
        action,
        details,
        due,
        importance,
        tasklist,
        tags,
    } = args;
    let due = due
        .map(|d| parse_colloquial(&d, env.now, &env.tz))
        .transpose()?;
    let new = NewTask {
        outcome,
        action,
        details,
        due,
        importance: importance.into(),
        tags: env.tags(tags),
    };
    let mut root = env.open()?;
    let task = root
        .add_task(tasklist.as_deref(), new)
        .context("adding task")?;
    root.write_changes().context("writing changes")?;
    print_json(&task)
}

fn handle_done(args: SelectArgs, env: &Env) -> Result<()> {
    let mut root = env.open()?;
    let mut selection = args.selection();
    selection.kind.get_or_insert(CollectionKind::Tasklist);
    let item = Resolver::new(&mut root, env.tz)
        .at(env.now)
        .resolve(&selection)
        .context("resolving task")?;
    let Item::Task { tasklist, task } = item else {
        anyhow::bail!("selection is not a task");
    };
    if task.done.is_some() {
        anyhow::bail!("'{}' is already done", task.outcome);
    }
    let now = env.now;
    root.modify::<Tasklist, _>(&tasklist, |t, _| t.set_done(task.hash, Some(now)))?;
    root.write_changes().context("writing changes")?;
    println!("Done: {} ({})", task.outcome, task.hex_hash());
    Ok(())
}

fn handle_archive(tasklist: Option<String>, env: &Env) -> Result<()> {
    let mut root = env.open()?;
    let name = tasklist.unwrap_or_else(|| root.default_name(CollectionKind::Tasklist).to_string());
    let now = env.now;
    let archived = root.modify::<Tasklist, _>(&name, |t, _| Ok(t.archive_done(now)))?;
    root.write_changes().context("writing changes")?;
    println!("Archived {archived} task(s) in {name}");
    Ok(())
}

fn handle_tag(cmd: TagCommand, env: &Env) -> Result<()> {
    let mut root = env.open()?;
    match cmd {
        TagCommand::Add { name, color } => {
            root.tags()?.add(TagDescriptor {
                name,
                created: env.now,
                color,
            })?;
            root.write_tags().context("writing tags")?;
        }
        TagCommand::Remove { name } => {
            root.tags()?.remove(&name)?;
            root.write_tags().context("writing tags")?;
        }
        TagCommand::List => print_json(&*root.tags()?)?,
    }
    Ok(())
}

fn handle_chain(cmd: ChainCommand, env: &Env) -> Result<()> {
    let mut root = env.open()?;
    match cmd {
        ChainCommand::Add {
            name,
            alias,
            details,
        } => {
            root.chains()?.add_chain(
                NewChain {
                    name,
                    alias,
                    details,
                    tags: vec![],
                },
                env.now,
            )?;
            root.write_chains().context("writing chains")?;
        }
        ChainCommand::Complete { key } => {
            let streak = root
                .chains()?
                .complete(&key, env.now, &env.tz)?
                .current_streak(env.now, &env.tz);
            root.write_chains().context("writing chains")?;
            println!("{key}: {streak} day streak");
        }
        ChainCommand::List => {
            for chain in root.chains()?.active() {
                let mark = if chain.is_completed_today(env.now, &env.tz) {
                    "x"
                } else {
                    " "
                };
                println!(
                    "[{mark}] {:<20} {:>4}",
                    chain.name,
                    chain.current_streak(env.now, &env.tz)
                );
            }
        }
    }
    Ok(())
}

fn handle_stack(cmd: StackCommand, env: &Env) -> Result<()> {
    let mut root = env.open()?;
    match cmd {
        StackCommand::New { name } => {
            root.stacks()?.add_stack(&name, env.now)?;
            root.write_stacks().context("writing stacks")?;
        }
        StackCommand::Push {
            stack,
            select,
            note,
            position,
        } => {
            let selector = select
                .selector
                .clone()
                .context("a selector is required to push")?;
            // Refuse to store a selection that does not resolve now.
            Resolver::new(&mut root, env.tz)
                .at(env.now)
                .resolve(&select.selection())
                .with_context(|| format!("resolving {selector:?}"))?;
            let item = StackItem {
                selector,
                kind: select.kind,
                collection: select.collection,
                note,
                added: env.now,
            };
            root.stacks()?.push(&stack, item, position)?;
            root.write_stacks().context("writing stacks")?;
        }
        StackCommand::Pop { stack, index } => {
            let item = root.stacks()?.pop(&stack, index)?;
            root.write_stacks().context("writing stacks")?;
            print_json(&item)?;
        }
        StackCommand::Peek { stack } => {
            let items: Vec<StackItem> = root.stacks()?.peek(&stack)?.cloned().collect();
            let mut resolver = Resolver::new(&mut root, env.tz).at(env.now);
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(match resolver.resolve_stack_item(item) {
                    Ok(resolved) => serde_json::json!({ "selector": item.selector, "item": resolved }),
                    Err(err) => {
                        serde_json::json!({ "selector": item.selector, "error": err.to_string() })
                    }
                });
            }
            print_json(&out)?;
        }
    }
    Ok(())
}
