use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Local, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::{Config, parse_bool};
use crate::state::State;
use crate::task::{Priority, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        let color = cfg.get("color").map(|v| parse_bool(&v)).unwrap_or(true);
        Self { color }
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table(&mut self, tasks: &[&Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = ["ID", "", "Due", "Pri", "Title", "Tags", "Subs"];
        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let id = self.paint(&task.short_id(), "33");
            let done = if task.completed { "x" } else { "" }.to_string();

            let due = task
                .due_at
                .map(|date| date.with_timezone(&Local).format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            let due = match task.due_at {
                Some(task_due) if task_due < now && !task.completed => self.paint(&due, "31"),
                _ => due,
            };

            let priority = match task.priority {
                Priority::None => String::new(),
                Priority::High => self.paint("H", "31"),
                Priority::Medium => self.paint("M", "33"),
                Priority::Low => self.paint("L", "36"),
            };

            let tags = task
                .tags
                .iter()
                .map(|tag| format!("+{tag}"))
                .collect::<Vec<_>>()
                .join(" ");

            let subs = if task.subtasks.is_empty() {
                String::new()
            } else {
                let done_count = task.subtasks.iter().filter(|s| s.completed).count();
                format!("{done_count}/{}", task.subtasks.len())
            };

            rows.push(vec![id, done, due, priority, task.title.clone(), tags, subs]);
        }

        write_table(&mut out, &headers, &rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task, state))]
    pub fn print_task_info(&mut self, task: &Task, state: &State) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let project = task
            .project_id
            .and_then(|id| state.project(id))
            .map(|p| p.name.clone())
            .unwrap_or_default();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "status    {}", if task.completed { "done" } else { "open" })?;
        writeln!(out, "project   {project}")?;
        writeln!(out, "priority  {}", task.priority.as_str())?;
        writeln!(out, "tags      {}", task.tags.join(", "))?;
        writeln!(
            out,
            "created   {}",
            task.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        )?;
        if let Some(due) = task.due_at {
            writeln!(
                out,
                "due       {}",
                due.with_timezone(&Local).format("%Y-%m-%d %H:%M")
            )?;
        }
        if let Some(rule) = &task.recurrence {
            writeln!(
                out,
                "repeats   every {} {}(s)",
                rule.interval.max(1),
                rule.kind.noun()
            )?;
        }
        for subtask in &task.subtasks {
            let mark = if subtask.completed { "x" } else { " " };
            writeln!(out, "  [{mark}] {}", subtask.title)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, state))]
    pub fn print_project_table(&mut self, state: &State) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let active = state.effective_active_project();
        let headers = ["", "ID", "Name", "Tasks"];
        let mut rows = Vec::with_capacity(state.projects.len());

        for project in &state.projects {
            let marker = if active == Some(project.id) { "*" } else { "" };
            rows.push(vec![
                marker.to_string(),
                self.paint(&project.short_id(), "33"),
                project.name.clone(),
                state.project_task_count(project.id).to_string(),
            ]);
        }

        write_table(&mut out, &headers, &rows)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(mut writer: W, headers: &[&str], rows: &[Vec<String>]) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(*header))
        .collect();

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (idx, header) in headers.iter().enumerate() {
        write!(writer, "{:width$} ", header, width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
