//! `mp events` prints a project's audit trail, newest first.

use anyhow::{Context as _, Result};
use clap::Args;
use milepost_core::model::ids::UserId;
use std::collections::BTreeMap;

use super::{Context, format_us, resolve_project};
use crate::output::{render_mode, text_row};

#[derive(Args, Debug)]
pub struct EventsArgs {
    /// Project name or id.
    pub project: String,

    /// Show at most this many events.
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

pub fn run_events(args: &EventsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let project = resolve_project(&store, &args.project)?;
    let project_id = project.id.context("stored project without id")?;

    let mut events = store.list_events(project_id)?;
    if let Some(limit) = args.limit {
        events.truncate(limit);
    }

    let logins: BTreeMap<_, _> = store
        .list_users()?
        .into_iter()
        .map(|user| (user.id, user.login))
        .collect();

    let who = |user_id: Option<UserId>| {
        user_id
            .and_then(|id| logins.get(&id))
            .map(String::as_str)
    };
    render_mode(
        ctx.output,
        &events,
        |events, w| {
            for event in events {
                text_row(
                    w,
                    &[
                        &event.created_at_us.to_string(),
                        event.event_type.as_str(),
                        &event.eventable_type,
                        &event.eventable_id.to_string(),
                        who(event.user_id).unwrap_or("-"),
                    ],
                )?;
            }
            Ok(())
        },
        |events, w| {
            if events.is_empty() {
                return writeln!(w, "(no events)");
            }
            for event in events {
                let login = who(event.user_id).unwrap_or("(deleted user)");
                writeln!(
                    w,
                    "{}  {:<8} {}",
                    format_us(event.created_at_us),
                    event.event_type.as_str(),
                    login
                )?;
            }
            Ok(())
        },
    )
}
