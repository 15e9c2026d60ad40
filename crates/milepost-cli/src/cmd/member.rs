//! `mp member` adds members and moves them between roles.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use milepost_core::ErrorCode;
use milepost_core::db::Store;
use milepost_core::model::function::Function;
use milepost_core::model::ids::{FunctionId, MemberId};
use milepost_core::model::project::ReassignOutcome;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{Context, Refused, resolve_function, resolve_project, resolve_user};
use crate::output::render;

#[derive(Args, Debug)]
pub struct MemberArgs {
    #[command(subcommand)]
    pub command: MemberCommand,
}

#[derive(Subcommand, Debug)]
pub enum MemberCommand {
    #[command(about = "Add a user to a project")]
    Add {
        /// Project name or id.
        project: String,

        /// Login of the user to add.
        login: String,

        /// Role name or id (defaults to the configured member role).
        #[arg(long, short)]
        function: Option<String>,
    },

    #[command(
        about = "Move members to new roles",
        long_about = "Reassign roles as MEMBER=FUNCTION pairs. Either every pair applies or none \
                      does, and at least one target role must be an admin role.",
        after_help = "EXAMPLES:\n    # Hand admin over from member 1 to member 2\n    mp member reassign apollo 1=Member 2=Admin"
    )]
    Reassign {
        /// Project name or id.
        project: String,

        /// MEMBER=FUNCTION pairs (member id, role name or id).
        #[arg(required = true, value_name = "MEMBER=FUNCTION")]
        assignments: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
struct AddOutput {
    project: String,
    login: String,
    function: String,
    added: bool,
}

fn default_member_function(store: &Store, ctx: &Context) -> Result<Function> {
    let configured = &ctx.config.project.registry.member_function;
    if let Ok(function) = resolve_function(store, configured) {
        return Ok(function);
    }
    store.lookup_default_non_admin()?.ok_or_else(|| {
        Refused::new(ErrorCode::NotFound, "no non-admin role in the registry").into()
    })
}

/// Split `MEMBER=FUNCTION` into a member id and the role key.
fn parse_assignment(raw: &str) -> Result<(MemberId, &str)> {
    let (member, function) = raw
        .split_once('=')
        .with_context(|| format!("expected MEMBER=FUNCTION, got '{raw}'"))?;
    let member = member
        .trim()
        .parse::<i64>()
        .with_context(|| format!("member id in '{raw}' is not a number"))?;
    Ok((MemberId(member), function.trim()))
}

/// Parse every `MEMBER=FUNCTION` pair. A member may appear only once.
fn parse_assignments(raw: &[String]) -> Result<Vec<(MemberId, &str)>> {
    let mut seen = BTreeMap::new();
    let mut pairs = Vec::with_capacity(raw.len());
    for entry in raw {
        let (member, key) = parse_assignment(entry)?;
        if let Some(previous) = seen.insert(member, entry.as_str()) {
            anyhow::bail!("member {member} is assigned twice ('{previous}' and '{entry}')");
        }
        pairs.push((member, key));
    }
    Ok(pairs)
}

pub fn run_member(args: &MemberArgs, ctx: &Context) -> Result<()> {
    let mut store = ctx.open_store()?;
    match &args.command {
        MemberCommand::Add {
            project,
            login,
            function,
        } => {
            let actor = ctx.require_actor(&store)?;
            let project = resolve_project(&store, project)?;
            ctx.project_access(&project, Some(&actor))
                .ensure_project_admin()?;

            let user = resolve_user(&store, login)?;
            let function = match function {
                Some(key) => resolve_function(&store, key)?,
                None => default_member_function(&store, ctx)?,
            };
            let project_id = project.id.context("stored project without id")?;
            let added = store.add_member(project_id, user.id, function.id, Some(actor.id))?;

            let payload = AddOutput {
                project: project.name,
                login: user.login,
                function: function.name,
                added,
            };
            render(ctx.output, &payload, |value, w| {
                if value.added {
                    writeln!(w, "Added {} to {} as {}", value.login, value.project, value.function)
                } else {
                    writeln!(w, "{} is already a member of {}", value.login, value.project)
                }
            })
        }
        MemberCommand::Reassign {
            project,
            assignments,
        } => {
            let actor = ctx.require_actor(&store)?;
            let project = resolve_project(&store, project)?;
            ctx.project_access(&project, Some(&actor))
                .ensure_project_admin()?;

            // Numeric role ids that match nothing are left for the store to
            // report alongside unknown member ids.
            let mut batch: BTreeMap<MemberId, FunctionId> = BTreeMap::new();
            for (member, key) in parse_assignments(assignments)? {
                let function_id = match resolve_function(&store, key) {
                    Ok(function) => function.id,
                    Err(err) => match key.parse::<i64>() {
                        Ok(raw_id) => FunctionId(raw_id),
                        Err(_) => return Err(err),
                    },
                };
                batch.insert(member, function_id);
            }

            let project_id = project.id.context("stored project without id")?;
            let outcome = store.reassign_functions(project_id, &batch, Some(actor.id))?;
            render(ctx.output, &outcome, |outcome, w| match outcome {
                ReassignOutcome::Applied => {
                    writeln!(w, "Reassigned {} member(s) in {}", batch.len(), project.name)
                }
                ReassignOutcome::Rejected { rejection } => {
                    writeln!(w, "Reassignment refused: {rejection}")
                }
            })?;

            match outcome.rejection() {
                None => Ok(()),
                Some(rejection) => {
                    Err(Refused::new(ErrorCode::ReassignRejected, rejection.to_string()).into())
                }
            }
        }
    }
}
