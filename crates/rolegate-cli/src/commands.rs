//! Handlers for catalog, role, audit and check commands.

use anyhow::{Result, bail};
use chrono::SecondsFormat;
use rolegate_cache::{Refresher, SnapshotCache};
use rolegate_core::{
    AccessMode, ActorId, Error, GrantDiff, Identity, NewRole, PermissionKey, PermissionSet,
    RoleId,
};
use rolegate_guard::Guard;
use rolegate_workflow::{RoleEditor, SubmitOutcome};
use std::io::Write;

use crate::app::App;
use crate::cli::CheckArgs;

// ============================================================================
// Catalog
// ============================================================================

/// Prints every permission, grouped by category.
pub fn cmd_catalog_list<W: Write>(app: &App, out: &mut W) -> Result<()> {
    for (category, permissions) in app.store().catalog().list() {
        writeln!(out, "{category}")?;
        for permission in permissions {
            writeln!(out, "  {:<32} {}", permission.key, permission.description)?;
        }
    }
    Ok(())
}

// ============================================================================
// Roles
// ============================================================================

/// Prints one line per role.
pub async fn cmd_role_list<W: Write>(app: &App, out: &mut W) -> Result<()> {
    writeln!(out, "{:<24} {:<24} {:>7}  FLAGS", "ID", "NAME", "VERSION")?;
    for role in app.store().list_roles().await? {
        let mut flags = Vec::new();
        if role.is_system {
            flags.push("system");
        }
        if role.retired {
            flags.push("retired");
        }
        writeln!(
            out,
            "{:<24} {:<24} {:>7}  {}",
            role.id,
            role.name,
            role.version,
            flags.join(",")
        )?;
    }
    Ok(())
}

/// Prints a role, its effective permissions and the grant rows behind them.
pub async fn cmd_role_show<W: Write>(app: &App, role_id: &RoleId, out: &mut W) -> Result<()> {
    let store = app.store();
    let role = store.get_role(role_id).await?;
    let effective = store.effective_grants(role_id).await?;
    let rows = store.grant_rows(role_id).await?;

    writeln!(out, "id:       {}", role.id)?;
    writeln!(out, "name:     {}", role.name)?;
    writeln!(out, "version:  {}", role.version)?;
    writeln!(out, "system:   {}", role.is_system)?;
    writeln!(out, "retired:  {}", role.retired)?;
    writeln!(out, "created:  {}", timestamp(&role.created_at))?;

    writeln!(out, "effective permissions:")?;
    if effective.permissions.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for key in effective.permissions.iter() {
        writeln!(out, "  {key}")?;
    }

    if !rows.is_empty() {
        writeln!(out, "grants:")?;
        for grant in rows {
            writeln!(
                out,
                "  {:<32} {} by {}",
                grant.key,
                timestamp(&grant.granted_at),
                grant.granted_by
            )?;
        }
    }
    Ok(())
}

/// Creates a role.
pub async fn cmd_role_create<W: Write>(
    app: &App,
    id: RoleId,
    name: String,
    grants: Vec<PermissionKey>,
    actor: &ActorId,
    out: &mut W,
) -> Result<()> {
    let role = app
        .store()
        .create_role(NewRole::new(id, name).with_grants(grants), actor)
        .await?;
    writeln!(out, "Created role '{}' at version {}", role.id, role.version)?;
    Ok(())
}

/// Retires a role.
///
/// Without `expected_version` the current version is used, which still
/// fails if somebody else commits between the read and the write.
pub async fn cmd_role_retire<W: Write>(
    app: &App,
    role_id: &RoleId,
    expected_version: Option<u64>,
    actor: &ActorId,
    out: &mut W,
) -> Result<()> {
    let store = app.store();
    let expected = match expected_version {
        Some(v) => v,
        None => store.get_role(role_id).await?.version,
    };
    let commit = store.retire_role(role_id, expected, actor).await?;
    writeln!(
        out,
        "Retired role '{}' at version {}",
        role_id,
        commit.version()
    )?;
    Ok(())
}

/// Requested grant edit.
#[derive(Debug, Clone, Default)]
pub struct GrantEdit {
    /// Complete new grant set
    pub grants: PermissionSet,
    /// Version the edit is based on
    pub expected_version: Option<u64>,
    /// Whether warnings were acknowledged
    pub confirmed: bool,
}

/// Replaces a role's grant set through an edit session.
///
/// Conflicts are reported with the role's current state and never
/// overwritten; the administrator re-runs against the new version.
pub async fn cmd_role_set_grants<W: Write>(
    app: &App,
    role_id: &RoleId,
    edit: GrantEdit,
    actor: &ActorId,
    out: &mut W,
) -> Result<()> {
    let editor = RoleEditor::from_config(app.store().clone(), &app.config().store);
    let mut session = editor.open(role_id).await?;

    if let Some(expected) = edit.expected_version
        && expected != session.pinned_version()
    {
        bail!(Error::VersionConflict {
            id: role_id.to_string(),
            expected,
            actual: session.pinned_version(),
        });
    }

    let report = session.validate(edit.grants).await?;
    if report.diff.is_empty() {
        writeln!(out, "No changes to role '{role_id}'")?;
        return Ok(());
    }
    write_diff(out, &report.diff)?;
    for warning in &report.warnings {
        writeln!(out, "warning: {warning}")?;
    }
    if !report.warnings.is_empty() && !edit.confirmed {
        bail!("edit not applied; re-run with --yes to accept the warnings above");
    }

    match session.submit(actor).await? {
        SubmitOutcome::Committed(commit) => {
            writeln!(
                out,
                "Committed role '{}' at version {}",
                role_id,
                commit.version()
            )?;
            Ok(())
        }
        SubmitOutcome::Conflict {
            current,
            current_grants,
            ..
        } => {
            writeln!(out, "Role '{}' is now at version {} with:", current.id, current.version)?;
            for key in &current_grants {
                writeln!(out, "  {key}")?;
            }
            bail!(
                "role '{}' changed while the edit was in progress; review and re-run with \
                 --expected-version {}",
                current.id,
                current.version
            );
        }
    }
}

// ============================================================================
// Audit
// ============================================================================

/// Prints a role's audit history, oldest first.
pub async fn cmd_audit<W: Write>(app: &App, role_id: &RoleId, json: bool, out: &mut W) -> Result<()> {
    for entry in app.store().audit_log(role_id).await? {
        if json {
            writeln!(out, "{}", serde_json::to_string(&entry)?)?;
            continue;
        }
        writeln!(
            out,
            "v{:<4} {} {:<16} {}",
            entry.version,
            timestamp(&entry.at),
            entry.action,
            entry.actor
        )?;
        for key in &entry.diff.added {
            writeln!(out, "        + {key}")?;
        }
        for key in &entry.diff.removed {
            writeln!(out, "        - {key}")?;
        }
    }
    Ok(())
}

// ============================================================================
// Check
// ============================================================================

/// Evaluates a requirement against a freshly loaded snapshot.
///
/// The snapshot is loaded by a refresher subscribed to the app's bus; the
/// check waits up to `cache.ready_timeout_ms` for it. Returns whether access
/// was allowed.
pub async fn cmd_check<W: Write>(app: &App, args: CheckArgs, out: &mut W) -> Result<bool> {
    let subscription = app.bus().subscribe().await?;
    let cache = SnapshotCache::new(app.store().clone(), app.config().cache.clone());
    let refresher = Refresher::spawn(cache.clone(), app.bus().clone(), subscription);
    let ready = cache
        .health()
        .wait_ready(app.config().cache.ready_timeout())
        .await;
    refresher.shutdown().await;
    ready.map_err(anyhow::Error::msg)?;
    let mode = if args.any {
        AccessMode::Any
    } else {
        AccessMode::All
    };
    let guard = Guard::new(cache, args.require)
        .with_mode(mode)
        .with_access(&app.config().access);

    let identity = args
        .role
        .map(|role| Identity::new(args.subject, role).with_overrides(args.overrides));
    let decision = guard.check(identity.as_ref());

    let verdict = if decision.allowed { "allowed" } else { "denied" };
    writeln!(
        out,
        "{verdict} (role version {})",
        decision.evaluated_against_version
    )?;
    if !decision.missing.is_empty() {
        let missing: Vec<&str> = decision.missing.iter().map(|k| k.as_str()).collect();
        writeln!(out, "missing: {}", missing.join(", "))?;
    }
    Ok(decision.allowed)
}

fn write_diff<W: Write>(out: &mut W, diff: &GrantDiff) -> Result<()> {
    for key in &diff.added {
        writeln!(out, "+ {key}")?;
    }
    for key in &diff.removed {
        writeln!(out, "- {key}")?;
    }
    Ok(())
}

fn timestamp(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
