use anyhow::{Context as _, Result};
use clap::Args;
use milepost_core::config::{
    STORE_DIR, add_global_admin, load_project_config, store_path, write_default_project_config,
};
use milepost_core::db::Store;
use milepost_core::model::function::{Function, User};
use serde::Serialize;

use super::Context;
use crate::output::{pretty_kv, render_mode, text_row};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Re-run initialization on an existing store (re-seeds missing roles).
    #[arg(long)]
    pub force: bool,

    /// Also register this login as the first user and list it as a global
    /// admin in the project config.
    #[arg(long, value_name = "LOGIN")]
    pub user: Option<String>,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    store: String,
    config_written: bool,
    admin_function: Function,
    member_function: Function,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<User>,
    global_admins: Vec<String>,
}

fn write_init_text(value: &InitOutput, w: &mut dyn std::io::Write) -> std::io::Result<()> {
    text_row(w, &["store", &value.store])?;
    text_row(w, &["admin_function", &value.admin_function.name])?;
    text_row(w, &["member_function", &value.member_function.name])?;
    if let Some(user) = &value.user {
        text_row(w, &["user", &user.login])?;
    }
    for login in &value.global_admins {
        text_row(w, &["global_admin", login])?;
    }
    Ok(())
}

/// Execute `mp init`. Creates the store skeleton:
///
/// ```text
/// .milepost/
///   config.toml     (every default spelled out)
///   milepost.db     (migrated, with the two default roles)
///   registry.lock   (created on first registry write)
/// ```
///
/// # Errors
///
/// Returns an error if the store already exists and `--force` is not set, or
/// if any filesystem or store operation fails.
pub fn run_init(args: &InitArgs, ctx: &Context) -> Result<()> {
    let path = store_path(&ctx.root);
    if path.exists() && !args.force {
        anyhow::bail!("{STORE_DIR}/ already exists. Use `mp init --force` to reinitialize.");
    }

    let config_written = write_default_project_config(&ctx.root)?.is_some();
    let mut store = Store::open(&path, &ctx.config.project.store)?;

    let registry = &ctx.config.project.registry;
    let (admin_function, member_function) = store
        .seed_default_functions(&registry.admin_function, &registry.member_function)
        .context("seed default functions")?;

    let user = match args.user.as_deref() {
        Some(login) => Some(match store.find_user_by_login(login)? {
            Some(existing) => existing,
            None => store.create_user(login)?,
        }),
        None => None,
    };
    if let Some(user) = &user {
        add_global_admin(&ctx.root, &user.login).context("record global admin")?;
    }
    let global_admins = load_project_config(&ctx.root)?.access.global_admins;

    tracing::info!(store = %path.display(), config_written, "store initialized");

    let payload = InitOutput {
        store: path.display().to_string(),
        config_written,
        admin_function,
        member_function,
        user,
        global_admins,
    };
    render_mode(ctx.output, &payload, write_init_text, |value, w| {
        writeln!(w, "Initialized milepost store")?;
        pretty_kv(w, "store", &value.store)?;
        pretty_kv(w, "admin role", &value.admin_function.name)?;
        pretty_kv(w, "member role", &value.member_function.name)?;
        if let Some(user) = &value.user {
            pretty_kv(w, "user", &user.login)?;
        }
        if !value.global_admins.is_empty() {
            pretty_kv(w, "global admins", value.global_admins.join(", "))?;
        }
        Ok(())
    })
}
