//! `mp project` creates, inspects, edits, and removes projects.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use milepost_core::db::now_us;
use milepost_core::db::projects::DestroyReport;
use milepost_core::model::event::Event;
use milepost_core::model::milestone::{Milestone, MilestonePlan};
use milepost_core::model::project::{Project, ProjectAttributes, ProjectChanges};
use serde::Serialize;
use std::io::Write;

use super::milestone::labelled;
use super::{Context, format_us, resolve_project};
use crate::output::{pretty_kv, pretty_section, render, render_mode, text_row};

#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[command(subcommand)]
    pub command: ProjectCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    #[command(
        about = "Create a project",
        long_about = "Create a project with the acting user as its single admin member."
    )]
    Create {
        /// Unique project name.
        name: String,

        #[arg(long, short)]
        description: Option<String>,
    },

    #[command(about = "Show one project")]
    Show {
        /// Project name or id.
        project: String,
    },

    #[command(about = "List projects")]
    List,

    #[command(about = "Rename or redescribe a project")]
    Update {
        /// Project name or id.
        project: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, short, conflicts_with = "clear_description")]
        description: Option<String>,

        /// Remove the description.
        #[arg(long)]
        clear_description: bool,
    },

    #[command(
        about = "Delete a project",
        long_about = "Delete a project along with its members, milestones, tickets, and events."
    )]
    Destroy {
        /// Project name or id.
        project: String,
    },
}

#[derive(Debug, Serialize)]
struct ProjectDetail {
    project: Project,
    milestones: MilestonePlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest_event: Option<Event>,
}

#[derive(Debug, Serialize)]
struct DestroyOutput {
    project: String,
    removed: DestroyReport,
}

fn write_summary(project: &Project, w: &mut dyn Write) -> std::io::Result<()> {
    let id = project.id.map_or_else(|| "-".to_string(), |id| id.to_string());
    writeln!(
        w,
        "{id:>4}  {:<24} {} member(s)",
        project.name,
        project.members.len()
    )
}

fn write_summary_row(project: &Project, w: &mut dyn Write) -> std::io::Result<()> {
    let id = project.id.map_or_else(|| "-".to_string(), |id| id.to_string());
    text_row(w, &[&id, &project.name, &project.members.len().to_string()])
}

/// One record per line, first field naming the record kind.
fn write_detail_text(detail: &ProjectDetail, w: &mut dyn Write) -> std::io::Result<()> {
    let project = &detail.project;
    let id = project.id.map_or_else(|| "-".to_string(), |id| id.to_string());
    text_row(w, &["project", &id, &project.name])?;
    if let Some(description) = &project.description {
        text_row(w, &["description", description])?;
    }
    let next = project.num_ticket.unwrap_or(1);
    text_row(w, &["next_ticket", &next.to_string()])?;
    for member in &project.members {
        text_row(
            w,
            &[
                "member",
                &member.id.to_string(),
                &member.user_name,
                &member.function_name,
                if member.is_admin { "admin" } else { "-" },
            ],
        )?;
    }
    for (label, milestone) in labelled(&detail.milestones) {
        text_row(w, &["milestone", label, &milestone.name])?;
    }
    for (tag, count) in &project.tag_counts {
        text_row(w, &["tag", tag, &count.to_string()])?;
    }
    Ok(())
}

fn write_milestone(label: &str, milestone: &Milestone, w: &mut dyn Write) -> std::io::Result<()> {
    let due = milestone
        .expected_at_us
        .map_or_else(|| "no date".to_string(), format_us);
    writeln!(w, "  {label:<9} {} ({due})", milestone.name)
}

fn write_detail(detail: &ProjectDetail, w: &mut dyn Write) -> std::io::Result<()> {
    let project = &detail.project;
    pretty_section(w, project.title())?;
    if let Some(description) = &project.description {
        pretty_kv(w, "description", description)?;
    }
    pretty_kv(
        w,
        "tickets",
        project
            .num_ticket
            .map_or(0, |next| next - 1)
            .to_string(),
    )?;
    pretty_kv(w, "created", format_us(project.created_at_us))?;
    pretty_kv(w, "updated", format_us(project.updated_at_us))?;

    writeln!(w)?;
    writeln!(w, "Members")?;
    for member in &project.members {
        let admin = if member.is_admin { " (admin)" } else { "" };
        writeln!(
            w,
            "  #{:<3} {:<20} {}{admin}",
            member.id.get(),
            member.user_name,
            member.function_name
        )?;
    }

    let plan = &detail.milestones;
    if plan.current.is_some() {
        writeln!(w)?;
        writeln!(w, "Milestones")?;
        if let Some(current) = &plan.current {
            write_milestone("current", current, w)?;
        }
        for milestone in &plan.upcoming {
            write_milestone("upcoming", milestone, w)?;
        }
        for milestone in &plan.outdated {
            write_milestone("outdated", milestone, w)?;
        }
        for milestone in &plan.no_date {
            write_milestone("undated", milestone, w)?;
        }
    }

    if !project.tag_counts.is_empty() {
        writeln!(w)?;
        writeln!(w, "Tags")?;
        for (tag, count) in &project.tag_counts {
            writeln!(w, "  {tag:<24} {count:>5}")?;
        }
    }
    Ok(())
}

pub fn run_project(args: &ProjectArgs, ctx: &Context) -> Result<()> {
    let mut store = ctx.open_store()?;
    match &args.command {
        ProjectCommand::Create { name, description } => {
            let founder = ctx.require_actor(&store)?;
            let attributes = ProjectAttributes {
                name: name.clone(),
                description: description.clone(),
            };
            let project = store
                .create_project(attributes, Some(founder.id))
                .with_context(|| format!("create project '{name}'"))?;
            render(ctx.output, &project, |project, w| {
                writeln!(
                    w,
                    "Created project {} (id {})",
                    project.name,
                    project.id.map_or(0, |id| id.get())
                )
            })
        }
        ProjectCommand::Show { project } => {
            let project = resolve_project(&store, project)?;
            let id = project.id.context("stored project without id")?;
            let detail = ProjectDetail {
                milestones: store.milestone_plan(id, now_us())?,
                latest_event: store.latest_event(id)?,
                project,
            };
            render_mode(ctx.output, &detail, write_detail_text, write_detail)
        }
        ProjectCommand::List => {
            let projects = store.list_projects()?;
            render_mode(
                ctx.output,
                &projects,
                |projects, w| {
                    for project in projects {
                        write_summary_row(project, w)?;
                    }
                    Ok(())
                },
                |projects, w| {
                    if projects.is_empty() {
                        return writeln!(w, "(no projects)");
                    }
                    for project in projects {
                        write_summary(project, w)?;
                    }
                    Ok(())
                },
            )
        }
        ProjectCommand::Update {
            project,
            name,
            description,
            clear_description,
        } => {
            let actor = ctx.require_actor(&store)?;
            let mut project = resolve_project(&store, project)?;
            ctx.project_access(&project, Some(&actor))
                .ensure_project_admin()?;

            let changes = ProjectChanges {
                name: name.clone(),
                description: if *clear_description {
                    Some(None)
                } else {
                    description.clone().map(Some)
                },
            };
            if changes.is_empty() {
                anyhow::bail!("nothing to update; pass --name, --description, or --clear-description");
            }
            store
                .update_project(&mut project, changes, Some(actor.id))
                .context("update project")?;
            render(ctx.output, &project, |project, w| {
                writeln!(w, "Updated project {}", project.name)
            })
        }
        ProjectCommand::Destroy { project } => {
            let actor = ctx.actor(&store)?;
            let project = resolve_project(&store, project)?;
            ctx.project_access(&project, actor.as_ref())
                .ensure_project_admin()?;

            let id = project.id.context("stored project without id")?;
            let removed = store.destroy_project(id)?;
            let payload = DestroyOutput {
                project: project.name,
                removed,
            };
            render(ctx.output, &payload, |value, w| {
                writeln!(
                    w,
                    "Destroyed project {}: {} member(s), {} milestone(s), {} ticket(s), {} event(s)",
                    value.project,
                    value.removed.members,
                    value.removed.milestones,
                    value.removed.tickets,
                    value.removed.events
                )
            })
        }
    }
}
