//! `mp tags` shows and rebuilds a project's tag counts.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use std::collections::BTreeMap;

use super::{Context, resolve_project};
use crate::output::{render_mode, text_row};

#[derive(Args, Debug)]
pub struct TagsArgs {
    #[command(subcommand)]
    pub command: TagsCommand,
}

#[derive(Subcommand, Debug)]
pub enum TagsCommand {
    #[command(about = "Show stored tag counts")]
    Show {
        /// Project name or id.
        project: String,
    },

    #[command(about = "Recount tags across every ticket")]
    Recompute {
        /// Project name or id.
        project: String,
    },
}

fn write_counts(counts: &BTreeMap<String, u64>, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    if counts.is_empty() {
        return writeln!(w, "(no tags)");
    }
    writeln!(w, "{:<32} {:>6}", "TAG", "COUNT")?;
    writeln!(w, "{}", "-".repeat(39))?;
    for (tag, count) in counts {
        writeln!(w, "{tag:<32} {count:>6}")?;
    }
    Ok(())
}

fn write_count_rows(
    counts: &BTreeMap<String, u64>,
    w: &mut dyn std::io::Write,
) -> std::io::Result<()> {
    for (tag, count) in counts {
        text_row(w, &[tag, &count.to_string()])?;
    }
    Ok(())
}

pub fn run_tags(args: &TagsArgs, ctx: &Context) -> Result<()> {
    let mut store = ctx.open_store()?;
    match &args.command {
        TagsCommand::Show { project } => {
            let project = resolve_project(&store, project)?;
            render_mode(ctx.output, &project.tag_counts, write_count_rows, write_counts)
        }
        TagsCommand::Recompute { project } => {
            let project = resolve_project(&store, project)?;
            let project_id = project.id.context("stored project without id")?;
            let counts = store.recompute_tag_counts(project_id)?;
            render_mode(ctx.output, &counts, write_count_rows, write_counts)
        }
    }
}
