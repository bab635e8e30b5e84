//! Command-line definitions.

use clap::{Args, Parser, Subcommand};
use rolegate_core::{PermissionKey, RoleId};

/// Rolegate - role and permission administration
#[derive(Parser, Debug)]
#[command(name = "rolegate")]
#[command(author, version, about = "Role and permission administration tool", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Permission catalog
    Catalog {
        /// Catalog action
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Role administration
    Role {
        /// Role action
        #[command(subcommand)]
        action: RoleAction,
    },
    /// Show a role's audit history
    Audit {
        /// Role id
        role: RoleId,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Evaluate an access requirement
    Check(CheckArgs),
    /// Configuration file management
    Config {
        /// Config action
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Catalog subcommands.
#[derive(Subcommand, Debug)]
pub enum CatalogAction {
    /// List permissions grouped by category
    List,
}

/// Role subcommands.
#[derive(Subcommand, Debug)]
pub enum RoleAction {
    /// List all roles
    List,
    /// Show a role and its grants
    Show {
        /// Role id
        role: RoleId,
    },
    /// Create a role
    Create {
        /// New role id
        id: RoleId,
        /// Display name
        #[arg(long)]
        name: String,
        /// Permission to grant (repeatable)
        #[arg(long = "grant")]
        grants: Vec<PermissionKey>,
        /// Who is making the change
        #[arg(long, env = "ROLEGATE_ACTOR", default_value = "cli")]
        actor: String,
    },
    /// Retire a role
    Retire {
        /// Role id
        role: RoleId,
        /// Version the change is based on; defaults to the current one
        #[arg(long)]
        expected_version: Option<u64>,
        /// Who is making the change
        #[arg(long, env = "ROLEGATE_ACTOR", default_value = "cli")]
        actor: String,
    },
    /// Replace a role's grant set
    SetGrants {
        /// Role id
        role: RoleId,
        /// Permission to grant (repeatable); omit all to clear the role
        #[arg(long = "grant")]
        grants: Vec<PermissionKey>,
        /// Version the edit is based on; defaults to the current one
        #[arg(long)]
        expected_version: Option<u64>,
        /// Apply even if validation produced warnings
        #[arg(short, long)]
        yes: bool,
        /// Who is making the change
        #[arg(long, env = "ROLEGATE_ACTOR", default_value = "cli")]
        actor: String,
    },
}

/// Arguments for `rolegate check`.
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Role to evaluate; omit to evaluate an unauthenticated caller
    #[arg(long)]
    pub role: Option<RoleId>,
    /// Subject reported in the identity
    #[arg(long, default_value = "cli")]
    pub subject: String,
    /// Per-identity override (repeatable)
    #[arg(long = "override")]
    pub overrides: Vec<PermissionKey>,
    /// Required permission (repeatable)
    #[arg(long = "require")]
    pub require: Vec<PermissionKey>,
    /// Allow if any required permission is held
    #[arg(long)]
    pub any: bool,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved config file path
    Path,
    /// Write a default config file
    Init {
        /// Target file; defaults to the platform config dir
        #[arg(long)]
        file: Option<String>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
