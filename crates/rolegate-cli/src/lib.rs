//! # rolegate-cli
//!
//! Admin tool for Rolegate:
//! - Permission catalog listing
//! - Role creation, inspection, retirement and grant edits
//! - Audit history
//! - Access checks against a freshly loaded snapshot
//! - Config file management
//!
//! Every handler writes to a caller-supplied [`std::io::Write`] so it can be
//! driven from tests.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod commands;
pub mod config_handlers;

pub use app::App;
pub use cli::Cli;

use anyhow::Result;
use rolegate_core::{ActorId, RolegateConfig};
use std::io::Write;
use std::process::ExitCode;

use cli::{CatalogAction, Command, ConfigAction, RoleAction};

/// Runs one parsed command line.
///
/// Returns a failing exit code when an access check is denied.
pub async fn run<W: Write>(cli: Cli, out: &mut W) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();

    let command = match cli.command {
        Command::Config { action } => {
            match action {
                ConfigAction::Path => config_handlers::cmd_config_path(config_path, out)?,
                ConfigAction::Init { file, force } => {
                    config_handlers::cmd_config_init(file.as_deref(), force, out)?
                }
            }
            return Ok(ExitCode::SUCCESS);
        }
        other => other,
    };

    let config = RolegateConfig::load(config_path)?;
    let app = App::open(config).await?;

    match command {
        Command::Catalog {
            action: CatalogAction::List,
        } => commands::cmd_catalog_list(&app, out)?,
        Command::Role { action } => match action {
            RoleAction::List => commands::cmd_role_list(&app, out).await?,
            RoleAction::Show { role } => commands::cmd_role_show(&app, &role, out).await?,
            RoleAction::Create {
                id,
                name,
                grants,
                actor,
            } => {
                let actor = ActorId::new(actor);
                commands::cmd_role_create(&app, id, name, grants, &actor, out).await?
            }
            RoleAction::Retire {
                role,
                expected_version,
                actor,
            } => {
                let actor = ActorId::new(actor);
                commands::cmd_role_retire(&app, &role, expected_version, &actor, out).await?
            }
            RoleAction::SetGrants {
                role,
                grants,
                expected_version,
                yes,
                actor,
            } => {
                let actor = ActorId::new(actor);
                let edit = commands::GrantEdit {
                    grants: grants.into_iter().collect(),
                    expected_version,
                    confirmed: yes,
                };
                commands::cmd_role_set_grants(&app, &role, edit, &actor, out).await?
            }
        },
        Command::Audit { role, json } => commands::cmd_audit(&app, &role, json, out).await?,
        Command::Check(args) => {
            let allowed = commands::cmd_check(&app, args, out).await?;
            if !allowed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Config { .. } => {}
    }
    Ok(ExitCode::SUCCESS)
}
