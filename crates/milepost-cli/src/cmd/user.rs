//! `mp user` registers and lists users.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;
use crate::output::{render, render_mode, text_row};

#[derive(Args, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    #[command(about = "Register a user")]
    Add {
        /// Unique login.
        login: String,
    },

    #[command(about = "List users")]
    List,
}

pub fn run_user(args: &UserArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    match &args.command {
        UserCommand::Add { login } => {
            let user = store.create_user(login)?;
            render(ctx.output, &user, |user, w| {
                writeln!(w, "Registered user {} (id {})", user.login, user.id)
            })
        }
        UserCommand::List => {
            let users = store.list_users()?;
            render_mode(
                ctx.output,
                &users,
                |users, w| {
                    for user in users {
                        text_row(w, &[&user.id.to_string(), &user.login])?;
                    }
                    Ok(())
                },
                |users, w| {
                    if users.is_empty() {
                        return writeln!(w, "(no users)");
                    }
                    for user in users {
                        writeln!(w, "{:>4}  {}", user.id.get(), user.login)?;
                    }
                    Ok(())
                },
            )
        }
    }
}
