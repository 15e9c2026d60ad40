//! `mp function` manages the role registry shared by every project.

use anyhow::Result;
use clap::{Args, Subcommand};
use milepost_core::model::function::Function;
use serde::Serialize;
use std::collections::BTreeSet;

use super::{Context, resolve_function};
use crate::output::{pretty_section, render, render_mode, text_row};

#[derive(Args, Debug)]
pub struct FunctionArgs {
    #[command(subcommand)]
    pub command: FunctionCommand,
}

#[derive(Subcommand, Debug)]
pub enum FunctionCommand {
    #[command(about = "Define a new role")]
    Add {
        /// Unique role name.
        name: String,

        /// Holding this role makes a member a project admin.
        #[arg(long)]
        admin: bool,
    },

    #[command(about = "List roles")]
    List,

    #[command(
        about = "Rewrite admin flags",
        long_about = "Flag exactly the given roles as admin and clear the flag on every other role."
    )]
    SetAdmin {
        /// Role names or ids to flag as admin.
        #[arg(required = true)]
        functions: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
struct SetAdminOutput {
    changed: usize,
    functions: Vec<Function>,
}

fn write_rows(functions: &[Function], w: &mut dyn std::io::Write) -> std::io::Result<()> {
    for function in functions {
        text_row(
            w,
            &[
                &function.id.to_string(),
                &function.name,
                if function.is_admin { "admin" } else { "-" },
            ],
        )?;
    }
    Ok(())
}

fn write_table(functions: &[Function], w: &mut dyn std::io::Write) -> std::io::Result<()> {
    writeln!(w, "{:>4}  {:<24} {}", "ID", "NAME", "ADMIN")?;
    for function in functions {
        let flag = if function.is_admin { "yes" } else { "" };
        writeln!(w, "{:>4}  {:<24} {flag}", function.id.get(), function.name)?;
    }
    Ok(())
}

pub fn run_function(args: &FunctionArgs, ctx: &Context) -> Result<()> {
    let mut store = ctx.open_store()?;
    match &args.command {
        FunctionCommand::Add { name, admin } => {
            let actor = ctx.actor(&store)?;
            ctx.global_access(actor.as_ref()).ensure_global_admin()?;

            let function = store.create_function(name, *admin)?;
            render(ctx.output, &function, |function, w| {
                writeln!(
                    w,
                    "Defined role {} (id {}{})",
                    function.name,
                    function.id,
                    if function.is_admin { ", admin" } else { "" }
                )
            })
        }
        FunctionCommand::List => {
            let functions = store.list_functions()?;
            render_mode(
                ctx.output,
                &functions,
                |functions, w| write_rows(functions, w),
                |functions, w| {
                    if functions.is_empty() {
                        return writeln!(w, "(no roles)");
                    }
                    write_table(functions, w)
                },
            )
        }
        FunctionCommand::SetAdmin { functions } => {
            let actor = ctx.actor(&store)?;
            ctx.global_access(actor.as_ref()).ensure_global_admin()?;

            let admin_ids = functions
                .iter()
                .map(|key| resolve_function(&store, key).map(|function| function.id))
                .collect::<Result<BTreeSet<_>>>()?;
            let changed = store.set_admin_flags(&admin_ids)?;

            let payload = SetAdminOutput {
                changed,
                functions: store.list_functions()?,
            };
            render_mode(
                ctx.output,
                &payload,
                |value, w| write_rows(&value.functions, w),
                |value, w| {
                    pretty_section(w, &format!("Admin flags rewritten ({} changed)", value.changed))?;
                    write_table(&value.functions, w)
                },
            )
        }
    }
}
