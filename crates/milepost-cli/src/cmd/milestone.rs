//! `mp milestone` adds milestones and shows how they line up against now.

use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDate};
use clap::{Args, Subcommand};
use milepost_core::db::now_us;
use milepost_core::model::milestone::{Milestone, MilestonePlan};

use super::{Context, format_us, resolve_project};
use crate::output::{render, render_mode, text_row};

#[derive(Args, Debug)]
pub struct MilestoneArgs {
    #[command(subcommand)]
    pub command: MilestoneCommand,
}

#[derive(Subcommand, Debug)]
pub enum MilestoneCommand {
    #[command(about = "Add a milestone to a project")]
    Add {
        /// Project name or id.
        project: String,

        /// Milestone name.
        name: String,

        /// Expected date: RFC 3339 timestamp or YYYY-MM-DD (midnight UTC).
        #[arg(long)]
        due: Option<String>,
    },

    #[command(about = "Classify a project's milestones")]
    List {
        /// Project name or id.
        project: String,

        /// Classify as of this date instead of now.
        #[arg(long)]
        at: Option<String>,
    },
}

/// Parse an RFC 3339 timestamp or a bare date into microseconds.
pub fn parse_when(raw: &str) -> Result<i64> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.timestamp_micros());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("'{raw}' is neither RFC 3339 nor YYYY-MM-DD"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("'{raw}' has no midnight"))?;
    Ok(midnight.and_utc().timestamp_micros())
}

fn write_row(label: &str, milestone: &Milestone, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    let due = milestone
        .expected_at_us
        .map_or_else(|| "-".to_string(), format_us);
    writeln!(w, "{label:<9} {:<24} {due}", milestone.name)
}

/// The plan flattened in display order, each milestone with its bucket.
pub(super) fn labelled(plan: &MilestonePlan) -> Vec<(&'static str, &Milestone)> {
    plan.current
        .iter()
        .map(|m| ("current", m))
        .chain(plan.upcoming.iter().map(|m| ("upcoming", m)))
        .chain(plan.outdated.iter().map(|m| ("outdated", m)))
        .chain(plan.no_date.iter().map(|m| ("undated", m)))
        .collect()
}

pub fn run_milestone(args: &MilestoneArgs, ctx: &Context) -> Result<()> {
    let mut store = ctx.open_store()?;
    match &args.command {
        MilestoneCommand::Add { project, name, due } => {
            let actor = ctx.require_actor(&store)?;
            let project = resolve_project(&store, project)?;
            ctx.project_access(&project, Some(&actor))
                .ensure_project_admin()?;

            let expected_at_us = due.as_deref().map(parse_when).transpose()?;
            let project_id = project.id.context("stored project without id")?;
            let milestone = store.create_milestone(project_id, name, expected_at_us)?;
            render(ctx.output, &milestone, |milestone, w| {
                writeln!(w, "Added milestone {} to {}", milestone.name, project.name)
            })
        }
        MilestoneCommand::List { project, at } => {
            let project = resolve_project(&store, project)?;
            let now = at.as_deref().map(parse_when).transpose()?.unwrap_or_else(now_us);
            let project_id = project.id.context("stored project without id")?;
            let plan = store.milestone_plan(project_id, now)?;
            render_mode(
                ctx.output,
                &plan,
                |plan, w| {
                    for (label, milestone) in labelled(plan) {
                        let due = milestone
                            .expected_at_us
                            .map_or_else(|| "-".to_string(), |at| at.to_string());
                        text_row(w, &[label, &milestone.id.to_string(), &milestone.name, &due])?;
                    }
                    Ok(())
                },
                |plan, w| {
                    let rows = labelled(plan);
                    if rows.is_empty() {
                        return writeln!(w, "(no milestones)");
                    }
                    for (label, milestone) in rows {
                        write_row(label, milestone, w)?;
                    }
                    Ok(())
                },
            )
        }
    }
}
