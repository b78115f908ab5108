use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cli::Invocation;
use crate::config::Config;
use crate::datetime::parse_due_expr;
use crate::render::Renderer;
use crate::state::{SortMode, State};
use crate::store::{Rejection, Store, TaskPatch};
use crate::task::{Period, Priority, Recurrence};
use crate::view;

pub const THEMES: [&str; 8] = [
    "dark", "pastel", "sage", "peach", "pink", "black", "coffee", "sunset",
];

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "list", "next", "show", "done", "edit", "delete", "clear", "subtask", "projects",
        "project", "sort", "theme", "export", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Runs one command. Validation rejections come back as a printed
/// warning and a clean exit; everything else propagates.
#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &mut Store,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    match dispatch_command(store, cfg, renderer, &inv) {
        Err(err) => {
            if let Some(rejection) = err.downcast_ref::<Rejection>() {
                warn!(%rejection, "operation rejected");
                println!("warning: {rejection}");
                return Ok(());
            }
            Err(err)
        }
        ok => ok,
    }
}

fn dispatch_command(
    store: &mut Store,
    _cfg: &Config,
    renderer: &mut Renderer,
    inv: &Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let command = inv.command.as_str();
    let args = &inv.args;

    debug!(command, args = ?args, "dispatching command");

    match command {
        "add" => cmd_add(store, args, now),
        "list" | "next" => cmd_list(store, renderer, args, now),
        "show" => cmd_show(store, renderer, args),
        "done" => cmd_done(store, args, now),
        "edit" => cmd_edit(store, args, now),
        "delete" => cmd_delete(store, args),
        "clear" => cmd_clear(store),
        "subtask" => cmd_subtask(store, args),
        "projects" => cmd_projects(store, renderer),
        "project" => cmd_project(store, args),
        "sort" => cmd_sort(store, args),
        "theme" => cmd_theme(store, args),
        "export" => cmd_export(store),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[derive(Debug, Clone)]
enum Mod {
    TagAdd(String),
    TagRemove(String),
    Priority(Priority),
    Due(Option<DateTime<Utc>>),
    Every(Option<Recurrence>),
}

/// Splits `add`/`edit` arguments into title words and modifiers
/// (`due:`, `pri:`, `every:`, `+tag`, `-tag`). A `--` makes everything
/// after it literal title text.
fn parse_title_and_mods(
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<(String, Vec<Mod>)> {
    let mut title_parts = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, now)? {
            mods.push(one_mod);
            continue;
        }

        title_parts.push(arg.clone());
    }

    Ok((title_parts.join(" "), mods))
}

fn parse_one_mod(tok: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Mod>> {
    if let Some(tag) = tok.strip_prefix('+') {
        return Ok(Some(Mod::TagAdd(tag.to_string())));
    }
    if let Some(tag) = tok.strip_prefix('-')
        && !tag.is_empty()
        && !tag.starts_with('-')
    {
        return Ok(Some(Mod::TagRemove(tag.to_string())));
    }

    let Some((key, value)) = tok.split_once(':') else {
        return Ok(None);
    };

    match key.to_ascii_lowercase().as_str() {
        "pri" | "priority" => Ok(Some(Mod::Priority(Priority::from_input(value)))),
        "due" => {
            if value.is_empty() || value.eq_ignore_ascii_case("none") {
                Ok(Some(Mod::Due(None)))
            } else {
                Ok(Some(Mod::Due(Some(parse_due_expr(value, now)?))))
            }
        }
        "every" => {
            if value.is_empty() || value.eq_ignore_ascii_case("none") {
                Ok(Some(Mod::Every(None)))
            } else {
                Ok(Some(Mod::Every(Some(parse_recurrence(value)?))))
            }
        }
        _ => Ok(None),
    }
}

/// `every:` values: `daily`, `weekly`, `monthly`, optionally with an
/// interval suffix like `weekly/2`.
fn parse_recurrence(value: &str) -> anyhow::Result<Recurrence> {
    let (kind_text, interval_text) = match value.split_once('/') {
        Some((kind, interval)) => (kind, Some(interval)),
        None => (value, None),
    };

    let kind = match kind_text.trim().to_ascii_lowercase().as_str() {
        "daily" | "day" | "d" => Period::Daily,
        "weekly" | "week" | "w" => Period::Weekly,
        "monthly" | "month" | "m" => Period::Monthly,
        other => return Err(anyhow!("unknown recurrence period: {other}")),
    };

    let interval = match interval_text {
        None => 1,
        Some(text) => text
            .trim()
            .parse::<u32>()
            .map_err(|_| anyhow!("invalid recurrence interval: {text}"))?,
    };

    Ok(Recurrence {
        kind,
        interval: interval.max(1),
        count: None,
    })
}

fn patch_from_mods(title: String, mods: Vec<Mod>) -> TaskPatch {
    let mut patch = TaskPatch {
        title: (!title.trim().is_empty()).then_some(title),
        ..TaskPatch::default()
    };

    for one_mod in mods {
        match one_mod {
            Mod::TagAdd(tag) => patch.add_tags.push(tag),
            Mod::TagRemove(tag) => patch.remove_tags.push(tag),
            Mod::Priority(priority) => patch.priority = Some(priority),
            Mod::Due(due) => patch.due_at = Some(due),
            Mod::Every(rule) => patch.recurrence = Some(rule),
        }
    }

    patch
}

/// Resolves a task by unambiguous hex id prefix.
fn resolve_task(state: &State, token: &str) -> anyhow::Result<Uuid> {
    let needle = token.trim().to_ascii_lowercase().replace('-', "");
    if needle.is_empty() {
        return Err(anyhow!("a task id is required"));
    }

    let mut matches = state
        .tasks
        .iter()
        .filter(|t| t.id.simple().to_string().starts_with(&needle));

    let Some(first) = matches.next() else {
        return Err(anyhow!("no task matches '{token}'"));
    };
    if matches.next().is_some() {
        return Err(anyhow!("task id '{token}' is ambiguous"));
    }

    Ok(first.id)
}

/// Resolves a project by exact (case-insensitive) name, falling back to
/// hex id prefix.
fn resolve_project(state: &State, token: &str) -> anyhow::Result<Uuid> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("a project name or id is required"));
    }

    if let Some(project) = state
        .projects
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(trimmed))
    {
        return Ok(project.id);
    }

    let needle = trimmed.to_ascii_lowercase().replace('-', "");
    let mut matches = state
        .projects
        .iter()
        .filter(|p| p.id.simple().to_string().starts_with(&needle));

    let Some(first) = matches.next() else {
        return Err(anyhow!("no project matches '{token}'"));
    };
    if matches.next().is_some() {
        return Err(anyhow!("project id '{token}' is ambiguous"));
    }

    Ok(first.id)
}

#[instrument(skip(store, args, now))]
fn cmd_add(store: &mut Store, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command add");

    let (title, mods) = parse_title_and_mods(args, now)?;

    let mut due_at = None;
    let mut priority = Priority::None;
    let mut tags = Vec::new();
    let mut recurrence = None;
    for one_mod in mods {
        match one_mod {
            Mod::TagAdd(tag) => tags.push(tag),
            Mod::TagRemove(_) => {}
            Mod::Priority(p) => priority = p,
            Mod::Due(due) => due_at = due,
            Mod::Every(rule) => recurrence = rule,
        }
    }

    let id = store.add_task(&title, due_at, priority, tags, recurrence, now)?;
    println!("Created task {}.", &id.simple().to_string()[..8]);
    Ok(())
}

#[instrument(skip(store, renderer, args, now))]
fn cmd_list(
    store: &mut Store,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");

    let Some(project_id) = store.state.effective_active_project() else {
        println!("Create or select a project first.");
        return Ok(());
    };

    let query = args.join(" ");
    let query = (!query.trim().is_empty()).then_some(query.as_str());
    let sort = store.state.settings.sort;
    let visible = view::visible_tasks(&store.state, query, sort);

    if let Some(project) = store.state.project(project_id) {
        println!("Project: {}", project.name);
    }
    if visible.is_empty() {
        println!("No tasks in this project.");
        return Ok(());
    }

    renderer.print_task_table(&visible, now)?;
    Ok(())
}

#[instrument(skip(store, renderer, args))]
fn cmd_show(store: &mut Store, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command show");

    let token = args.first().ok_or_else(|| anyhow!("show requires a task id"))?;
    let id = resolve_task(&store.state, token)?;
    let task = store
        .state
        .task(id)
        .ok_or_else(|| anyhow!("no task matches '{token}'"))?;

    renderer.print_task_info(task, &store.state)?;
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_done(store: &mut Store, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command done");

    let token = args.first().ok_or_else(|| anyhow!("done requires a task id"))?;
    let id = resolve_task(&store.state, token)?;

    let Some(outcome) = store.toggle_task(id, now)? else {
        return Err(anyhow!("no task matches '{token}'"));
    };

    let short = &id.simple().to_string()[..8];
    if outcome.completed {
        println!("Completed task {short}.");
    } else {
        println!("Reopened task {short}.");
    }
    if let Some(next_id) = outcome.spawned {
        println!(
            "Scheduled next occurrence {}.",
            &next_id.simple().to_string()[..8]
        );
    }
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_edit(store: &mut Store, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command edit");

    let token = args.first().ok_or_else(|| anyhow!("edit requires a task id"))?;
    let id = resolve_task(&store.state, token)?;

    let (title, mods) = parse_title_and_mods(&args[1..], now)?;
    if title.trim().is_empty() && mods.is_empty() {
        return Err(anyhow!("edit requires new title text or modifiers"));
    }

    let patch = patch_from_mods(title, mods);
    if store.edit_task(id, patch)? {
        println!("Modified task {}.", &id.simple().to_string()[..8]);
    }
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_delete(store: &mut Store, args: &[String]) -> anyhow::Result<()> {
    info!("command delete");

    let token = args
        .first()
        .ok_or_else(|| anyhow!("delete requires a task id"))?;
    let id = resolve_task(&store.state, token)?;

    store.delete_task(id)?;
    println!("Deleted task {}.", &id.simple().to_string()[..8]);
    Ok(())
}

#[instrument(skip(store))]
fn cmd_clear(store: &mut Store) -> anyhow::Result<()> {
    info!("command clear");

    let removed = store.clear_completed()?;
    println!("Cleared {removed} completed task(s).");
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_subtask(store: &mut Store, args: &[String]) -> anyhow::Result<()> {
    info!("command subtask");

    match args.first().map(String::as_str) {
        Some("add") => {
            let token = args
                .get(1)
                .ok_or_else(|| anyhow!("subtask add requires a task id"))?;
            let id = resolve_task(&store.state, token)?;
            let title = args[2..].join(" ");

            if store.add_subtask(id, &title)?.is_some() {
                println!("Added subtask to {}.", &id.simple().to_string()[..8]);
            }
            Ok(())
        }
        Some("done") => {
            let token = args
                .get(1)
                .ok_or_else(|| anyhow!("subtask done requires a task id"))?;
            let id = resolve_task(&store.state, token)?;

            let index: usize = args
                .get(2)
                .ok_or_else(|| anyhow!("subtask done requires a subtask number"))?
                .parse()
                .map_err(|_| anyhow!("subtask number must be a positive integer"))?;

            let subtask_id = store
                .state
                .task(id)
                .and_then(|t| t.subtasks.get(index.checked_sub(1)?))
                .map(|s| s.id)
                .ok_or_else(|| anyhow!("no subtask #{index} on task '{token}'"))?;

            match store.toggle_subtask(id, subtask_id)? {
                Some(true) => println!("Checked subtask #{index}."),
                Some(false) => println!("Unchecked subtask #{index}."),
                None => return Err(anyhow!("no subtask #{index} on task '{token}'")),
            }
            Ok(())
        }
        _ => Err(anyhow!("usage: subtask add ID TITLE... | subtask done ID N")),
    }
}

#[instrument(skip(store, renderer))]
fn cmd_projects(store: &mut Store, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command projects");

    if store.state.projects.is_empty() {
        println!("No projects yet. Create one with: tally project add NAME");
        return Ok(());
    }

    renderer.print_project_table(&store.state)?;
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_project(store: &mut Store, args: &[String]) -> anyhow::Result<()> {
    info!("command project");

    match args.first().map(String::as_str) {
        None => {
            match store
                .state
                .effective_active_project()
                .and_then(|id| store.state.project(id))
            {
                Some(project) => println!("Active project: {}", project.name),
                None => println!("No active project."),
            }
            Ok(())
        }
        Some("add") => {
            let name = args[1..].join(" ");
            store.add_project(&name)?;
            println!("Created project {}. It is now active.", name.trim());
            Ok(())
        }
        Some("delete") => {
            let token = args
                .get(1)
                .ok_or_else(|| anyhow!("project delete requires a name or id"))?;
            let id = resolve_project(&store.state, token)?;
            let name = store
                .state
                .project(id)
                .map(|p| p.name.clone())
                .unwrap_or_default();

            store.delete_project(id)?;
            println!("Deleted project {name}. Its tasks are now unassigned.");
            Ok(())
        }
        Some(_) => {
            let token = args.join(" ");
            let id = resolve_project(&store.state, &token)?;
            let name = store
                .state
                .project(id)
                .map(|p| p.name.clone())
                .unwrap_or_default();

            store.set_active_project(Some(id))?;
            println!("Switched to project {name}.");
            Ok(())
        }
    }
}

#[instrument(skip(store, args))]
fn cmd_sort(store: &mut Store, args: &[String]) -> anyhow::Result<()> {
    info!("command sort");

    let Some(mode) = args.first().and_then(|arg| SortMode::parse(arg)) else {
        let modes = SortMode::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(anyhow!("sort requires one of: {modes}"));
    };

    store.set_sort(mode)?;
    println!("Sorting by {}.", mode.as_str());
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_theme(store: &mut Store, args: &[String]) -> anyhow::Result<()> {
    info!("command theme");

    let Some(theme) = args.first() else {
        println!("Theme: {}", store.state.settings.theme);
        return Ok(());
    };

    let theme = theme.trim().to_ascii_lowercase();
    if !THEMES.contains(&theme.as_str()) {
        return Err(anyhow!("unknown theme '{theme}'; themes: {}", THEMES.join(", ")));
    }

    store.set_theme(&theme)?;
    println!("Theme set to {theme}.");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_export(store: &mut Store) -> anyhow::Result<()> {
    info!("command export");

    let out = serde_json::to_string(&store.state)?;
    println!("{out}");
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("usage: tally [FLAGS] COMMAND [ARGS]");
    println!();
    println!("  add TITLE... [due:EXPR] [pri:LEVEL] [+tag] [every:PERIOD[/N]]");
    println!("  list [QUERY...]        show the active project's tasks");
    println!("  show ID                full detail for one task");
    println!("  done ID                toggle completion");
    println!("  edit ID [TITLE...] [modifiers]");
    println!("  delete ID              remove a task");
    println!("  clear                  remove all completed tasks");
    println!("  subtask add ID TITLE.. | subtask done ID N");
    println!("  projects               list projects");
    println!("  project [NAME|ID]      show or switch the active project");
    println!("  project add NAME       create a project and switch to it");
    println!("  project delete NAME    delete a project (tasks become unassigned)");
    println!("  sort MODE              created_asc|created_desc|due_asc|due_desc|priority_desc");
    println!("  theme NAME             pick a display theme");
    println!("  export                 dump the state blob as JSON");
    Ok(())
}
