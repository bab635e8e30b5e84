#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Rolegate Workflow
//!
//! Administrator-facing edits of a role's grant set.
//!
//! ```rust,ignore
//! let editor = RoleEditor::new(store);
//! let mut session = editor.open(&teacher).await?;
//! let report = session.validate(proposed).await?;
//! match session.submit(&actor).await? {
//!     SubmitOutcome::Committed(commit) => println!("now at v{}", commit.version()),
//!     SubmitOutcome::Conflict { current, .. } => println!("changed to v{}", current.version),
//! }
//! ```

pub mod directory;
pub mod editor;
pub mod session;

pub use directory::{IdentityDirectory, StaticDirectory};
pub use editor::RoleEditor;
pub use session::{EditSession, SessionState, SubmitOutcome, ValidationReport, ValidationWarning};
