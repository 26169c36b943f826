use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use tracing::info;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::recovery::{Prune, RecoveryLog};
use crate::io::{self, config_io, export};
use crate::model::config::Config;
use crate::model::node::FlatItem;
use crate::session::{Session, Signal, UiEvent};
use crate::sync::{decode_snapshot, FileStore, RemoteStore, StoreKey};

type CmdResult = Result<(), Box<dyn Error>>;

/// Account used for trees kept only in the local data directory.
pub const LOCAL_ACCOUNT: &str = "local";

/// Everything a command needs, resolved once from flags and config.
#[derive(Clone)]
struct Ctx {
    data_dir: PathBuf,
    config: Config,
    account: String,
    tree: String,
    json: bool,
}

impl Ctx {
    fn store(&self) -> FileStore {
        FileStore::new(&self.data_dir)
    }

    fn session(&self) -> Result<Session<FileStore>, Box<dyn Error>> {
        let mut config = self.config.clone();
        config.sync.account = Some(self.account.clone());
        let session = Session::open(self.store(), &config, &self.tree, Some(&self.data_dir))?;
        info!(tree = %self.tree, items = session.state().items.len(), "opened tree");
        Ok(session)
    }

    /// Open the tree, refusing when the stored copy cannot be read so that
    /// no edit overwrites it.
    fn open(&self) -> Result<Session<FileStore>, Box<dyn Error>> {
        let session = self.session()?;
        if let Some(notice) = session.open_notices().first() {
            return Err(format!(
                "tree {} could not be loaded: {}. The stored copy is in the recovery log; \
                 `tt import` replaces it",
                self.tree, notice
            )
            .into());
        }
        Ok(session)
    }

    /// Open the tree even when the stored copy cannot be read. Used by
    /// commands that replace the whole tree.
    fn open_lenient(&self) -> Result<Session<FileStore>, Box<dyn Error>> {
        let session = self.session()?;
        for notice in session.open_notices() {
            eprintln!("warning: {}", notice);
        }
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let data_dir = io::data_dir(cli.data_dir.as_deref());
    let config = config_io::load_config(&data_dir)?;
    let account = cli
        .account
        .clone()
        .or_else(|| config.sync.account.clone())
        .unwrap_or_else(|| LOCAL_ACCOUNT.to_string());
    let ctx = Ctx {
        data_dir,
        config,
        account,
        tree: cli.tree,
        json: cli.json,
    };

    match cli.command {
        // Trees
        Commands::Trees => cmd_trees(&ctx),
        Commands::New(args) => cmd_new(&ctx, args),
        Commands::DeleteTree(args) => cmd_delete_tree(&ctx, args),
        Commands::Rename(args) => cmd_rename(&ctx, args),

        // Read
        Commands::Show(args) => cmd_show(&ctx, args),
        Commands::Watch(args) => cmd_watch(&ctx, args),

        // Edits
        Commands::Add(args) => cmd_add(&ctx, args),
        Commands::Mv(args) => cmd_mv(&ctx, args),
        Commands::Indent(args) => cmd_event(&ctx, args, |id| UiEvent::Indent { id }),
        Commands::Outdent(args) => cmd_event(&ctx, args, |id| UiEvent::Outdent { id }),
        Commands::Done(args) => cmd_set_done(&ctx, args, true),
        Commands::Undone(args) => cmd_set_done(&ctx, args, false),
        Commands::Edit(args) => cmd_edit(&ctx, args),
        Commands::Rm(args) => cmd_event(&ctx, args, |id| UiEvent::Remove { id }),
        Commands::Collapse(args) => cmd_event(&ctx, args, |id| UiEvent::ToggleCollapsed { id }),
        Commands::CleanDone => cmd_clean_done(&ctx),

        // Backup
        Commands::Export(args) => cmd_export(&ctx, args),
        Commands::Import(args) => cmd_import(&ctx, args),

        // Maintenance
        Commands::Config(args) => cmd_config(&ctx, args),
        Commands::Recovery(args) => cmd_recovery(&ctx, args),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve an exact id or a unique id prefix.
fn resolve_id(session: &Session<FileStore>, wanted: &str) -> Result<String, Box<dyn Error>> {
    let items = &session.state().items;
    if items.iter().any(|item| item.id == wanted) {
        return Ok(wanted.to_string());
    }
    let matches: Vec<&str> = items
        .iter()
        .map(|item| item.id.as_str())
        .filter(|id| id.starts_with(wanted))
        .collect();
    match matches.as_slice() {
        [only] => Ok(only.to_string()),
        [] => Err(format!("item not found: {}", wanted).into()),
        _ => Err(format!("ambiguous id {}: matches {} items", wanted, matches.len()).into()),
    }
}

/// Feed one event to the session, turning a notice into an error.
fn apply(session: &mut Session<FileStore>, event: UiEvent) -> CmdResult {
    for signal in session.handle(event, Instant::now()) {
        if let Signal::Notice(notice) = signal {
            return Err(notice.into());
        }
    }
    Ok(())
}

fn print_tree(session: &Session<FileStore>, all: bool) {
    let state = session.state();
    let shown: Vec<&FlatItem> = if all {
        state.items.iter().collect()
    } else {
        session.visible()
    };
    println!("{}", format_tree_header(state));
    for line in format_tree(&state.items, &shown, !all) {
        println!("{}", line);
    }
}

// ---------------------------------------------------------------------------
// Trees
// ---------------------------------------------------------------------------

fn cmd_trees(ctx: &Ctx) -> CmdResult {
    let store = ctx.store();
    let mut infos = Vec::new();
    for id in store.list_trees(&ctx.account)? {
        let key = StoreKey::new(&ctx.account, &id)?;
        let Some(raw) = store.read(&key)? else {
            continue;
        };
        match decode_snapshot(&raw) {
            Ok(snapshot) => infos.push(TreeInfoJson {
                id,
                name: snapshot.current_tree_name,
                items: snapshot.items.len(),
                done: snapshot.items.iter().filter(|i| i.done).count(),
            }),
            Err(e) => eprintln!("warning: skipping {}: {}", key, e),
        }
    }

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else if infos.is_empty() {
        println!("no trees");
    } else {
        for info in &infos {
            println!(
                "{:<16} {:<24} {} items, {} done",
                info.id, info.name, info.items, info.done
            );
        }
    }
    Ok(())
}

fn cmd_new(ctx: &Ctx, args: NewArgs) -> CmdResult {
    let store = ctx.store();
    let key = StoreKey::new(&ctx.account, &args.id)?;
    if store.read(&key)?.is_some() {
        return Err(format!("tree already exists: {}", args.id).into());
    }
    let ctx = Ctx {
        tree: args.id.clone(),
        ..ctx.clone()
    };
    let mut session = ctx.open()?;
    session.rename(args.name.unwrap_or_default(), Instant::now());
    session.close()?;
    println!("created {}", args.id);
    Ok(())
}

fn cmd_delete_tree(ctx: &Ctx, args: DeleteTreeArgs) -> CmdResult {
    let key = StoreKey::new(&ctx.account, &args.id)?;
    ctx.store().remove(&key)?;
    info!(key = %key, "tree deleted");
    println!("deleted {}", args.id);
    Ok(())
}

fn cmd_rename(ctx: &Ctx, args: RenameArgs) -> CmdResult {
    let mut session = ctx.open()?;
    session.rename(args.name, Instant::now());
    session.close()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

fn cmd_show(ctx: &Ctx, args: ShowArgs) -> CmdResult {
    let session = ctx.open()?;
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&tree_to_json(session.state())?)?);
    } else {
        print_tree(&session, args.all);
        if let Some(summary) = RecoveryLog::new(&ctx.data_dir).summary() {
            let since = summary
                .oldest
                .map(|t| format!(" since {}", t.format("%Y-%m-%d")))
                .unwrap_or_default();
            eprintln!(
                "note: {} recovery entries{} (see `tt recovery`)",
                summary.entry_count, since
            );
        }
    }
    session.close()?;
    Ok(())
}

fn cmd_watch(ctx: &Ctx, args: WatchArgs) -> CmdResult {
    let mut session = ctx.open()?;
    let stop_at = args.for_secs.map(|s| Instant::now() + Duration::from_secs(s));
    let interval = Duration::from_millis(args.interval_ms.max(10));

    print_tree(&session, false);
    println!();
    loop {
        let now = Instant::now();
        for signal in session.poll(now) {
            match signal {
                Signal::Rerender => {
                    print_tree(&session, false);
                    println!();
                }
                Signal::Notice(notice) => eprintln!("warning: {}", notice),
                Signal::Projected(_) => {}
            }
        }
        if stop_at.is_some_and(|t| now >= t) {
            break;
        }
        std::thread::sleep(interval);
    }
    session.close()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

fn cmd_add(ctx: &Ctx, args: AddArgs) -> CmdResult {
    let mut session = ctx.open()?;
    let parent = args
        .parent
        .as_deref()
        .map(|p| resolve_id(&session, p))
        .transpose()?;
    let id = session.insert(
        parent.as_deref(),
        args.index.unwrap_or(usize::MAX),
        args.text,
        Instant::now(),
    )?;
    session.close()?;
    if ctx.json {
        println!("{}", serde_json::json!({ "id": id }));
    } else {
        println!("{}", id);
    }
    Ok(())
}

fn cmd_mv(ctx: &Ctx, args: MvArgs) -> CmdResult {
    let mut session = ctx.open()?;
    let id = resolve_id(&session, &args.id)?;
    let parent = args
        .parent
        .as_deref()
        .map(|p| resolve_id(&session, p))
        .transpose()?;
    session.move_item(
        &id,
        parent.as_deref(),
        args.index.unwrap_or(usize::MAX),
        Instant::now(),
    )?;
    session.close()?;
    Ok(())
}

/// Commands that are a single event on one item.
fn cmd_event(ctx: &Ctx, args: IdArg, event: impl FnOnce(String) -> UiEvent) -> CmdResult {
    let mut session = ctx.open()?;
    let id = resolve_id(&session, &args.id)?;
    apply(&mut session, event(id))?;
    session.close()?;
    Ok(())
}

fn cmd_set_done(ctx: &Ctx, args: IdArg, done: bool) -> CmdResult {
    let mut session = ctx.open()?;
    let id = resolve_id(&session, &args.id)?;
    let current = session.state().find(&id).is_some_and(|item| item.done);
    if current != done {
        apply(&mut session, UiEvent::ToggleDone { id })?;
    }
    session.close()?;
    Ok(())
}

fn cmd_edit(ctx: &Ctx, args: EditArgs) -> CmdResult {
    let mut session = ctx.open()?;
    let id = resolve_id(&session, &args.id)?;
    apply(
        &mut session,
        UiEvent::EditValue {
            id,
            value: args.text,
        },
    )?;
    session.close()?;
    Ok(())
}

fn cmd_clean_done(ctx: &Ctx) -> CmdResult {
    let mut session = ctx.open()?;
    let removed = session.clean_done(Instant::now())?;
    session.close()?;
    println!("removed {} items", removed);
    Ok(())
}

// ---------------------------------------------------------------------------
// Backup
// ---------------------------------------------------------------------------

fn cmd_export(ctx: &Ctx, args: ExportArgs) -> CmdResult {
    let session = ctx.open()?;
    let path = match args.output {
        Some(path) => {
            export::export_to_file(session.state(), &path)?;
            path
        }
        None => {
            let dir = match args.dir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            export::export_to_dir(session.state(), &dir, &Local::now())?
        }
    };
    session.close()?;
    println!("{}", path.display());
    Ok(())
}

fn cmd_import(ctx: &Ctx, args: ImportArgs) -> CmdResult {
    let snapshot = export::import_file(&args.file, Some(&ctx.data_dir))?;
    let count = snapshot.items.len();
    let mut session = ctx.open_lenient()?;
    session.import(snapshot, Instant::now());
    session.close()?;
    println!("imported {} items into {}", count, ctx.tree);
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config(ctx: &Ctx, args: ConfigCmd) -> CmdResult {
    match args.action {
        None => {
            print!("{}", toml::to_string_pretty(&ctx.config)?);
            Ok(())
        }
        Some(ConfigAction::Path) => {
            println!("{}", config_io::config_path(&ctx.data_dir).display());
            Ok(())
        }
        Some(ConfigAction::SetAccount { account }) => {
            if let Some(account) = &account {
                // Same rules as a store key segment
                StoreKey::new(account, "x")?;
            }
            let (_, mut doc) = config_io::read_config(&ctx.data_dir)?;
            config_io::set_account(&mut doc, account.as_deref());
            config_io::write_config(&ctx.data_dir, &doc)?;
            Ok(())
        }
        Some(ConfigAction::SetDebounce { ms }) => {
            let (_, mut doc) = config_io::read_config(&ctx.data_dir)?;
            config_io::set_debounce(&mut doc, ms);
            config_io::write_config(&ctx.data_dir, &doc)?;
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Recovery log
// ---------------------------------------------------------------------------

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, Box<dyn Error>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp {:?}: {}", s, e).into())
}

fn cmd_recovery(ctx: &Ctx, args: RecoveryCmd) -> CmdResult {
    let log = RecoveryLog::new(&ctx.data_dir);
    match args.action {
        Some(RecoveryAction::Path) => {
            println!("{}", log.path().display());
            Ok(())
        }
        Some(RecoveryAction::Prune(prune)) => {
            let before = prune.before.as_deref().map(parse_timestamp).transpose()?;
            let removed = log.prune(Prune::from_args(before, prune.all))?;
            println!("pruned {} entries", removed);
            Ok(())
        }
        None => {
            let since = args.since.as_deref().map(parse_timestamp).transpose()?;
            let entries = log.recent(Some(args.limit.unwrap_or(10)), since);
            if ctx.json {
                println!("{}", recovery_entries_json(&entries)?);
            } else if entries.is_empty() {
                println!("no recovery entries");
            } else {
                for entry in &entries {
                    print!("{}", format_recovery_entry(entry));
                }
            }
            Ok(())
        }
    }
}
