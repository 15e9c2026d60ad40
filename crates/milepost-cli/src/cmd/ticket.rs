//! `mp ticket` opens tickets and edits their tags.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use milepost_core::model::ids::TicketId;
use milepost_core::model::ticket::Ticket;

use super::{Context, resolve_project};
use crate::output::{render_mode, text_row};

#[derive(Args, Debug)]
pub struct TicketArgs {
    #[command(subcommand)]
    pub command: TicketCommand,
}

#[derive(Subcommand, Debug)]
pub enum TicketCommand {
    #[command(about = "Open a ticket")]
    Add {
        /// Project name or id.
        project: String,

        title: String,

        /// Tag to attach (repeatable).
        #[arg(long = "tag", short)]
        tags: Vec<String>,
    },

    #[command(about = "Replace a ticket's tags")]
    Tag {
        /// Ticket id.
        ticket: i64,

        /// New tag set; pass none to clear.
        tags: Vec<String>,
    },

    #[command(about = "List a project's tickets")]
    List {
        /// Project name or id.
        project: String,
    },
}

fn write_ticket(ticket: &Ticket, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    let tags = ticket
        .tags
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(w, "#{:<4} {:<40} [{tags}]", ticket.number, ticket.title)
}

fn write_ticket_row(ticket: &Ticket, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    let tags = ticket.tags.iter().map(String::as_str).collect::<Vec<_>>().join(",");
    text_row(
        w,
        &[&ticket.id.to_string(), &ticket.number.to_string(), &ticket.title, &tags],
    )
}

pub fn run_ticket(args: &TicketArgs, ctx: &Context) -> Result<()> {
    let mut store = ctx.open_store()?;
    match &args.command {
        TicketCommand::Add {
            project,
            title,
            tags,
        } => {
            let project = resolve_project(&store, project)?;
            let project_id = project.id.context("stored project without id")?;
            let ticket = store.create_ticket(project_id, title, tags)?;
            render_mode(ctx.output, &ticket, write_ticket_row, write_ticket)
        }
        TicketCommand::Tag { ticket, tags } => {
            let ticket = store.set_ticket_tags(TicketId(*ticket), tags)?;
            render_mode(ctx.output, &ticket, write_ticket_row, write_ticket)
        }
        TicketCommand::List { project } => {
            let project = resolve_project(&store, project)?;
            let project_id = project.id.context("stored project without id")?;
            let tickets = store.list_tickets(project_id)?;
            render_mode(
                ctx.output,
                &tickets,
                |tickets, w| {
                    for ticket in tickets {
                        write_ticket_row(ticket, w)?;
                    }
                    Ok(())
                },
                |tickets, w| {
                    if tickets.is_empty() {
                        return writeln!(w, "(no tickets)");
                    }
                    for ticket in tickets {
                        write_ticket(ticket, w)?;
                    }
                    Ok(())
                },
            )
        }
    }
}
