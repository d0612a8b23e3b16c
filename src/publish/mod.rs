//! Forum publication
//!
//! - `changeset`: what changed since the last announcement
//! - `render`: titles, changelogs, tables, bodies and outdated banners
//! - `validate`: checks run before any forum write
//! - `machine`: the publication state machine
//! - `feedback`: comment-driven status line updates

mod changeset;
mod feedback;
mod machine;
mod render;
mod validate;

pub use changeset::{Addition, ChangeSet, Removal, Update};
pub use feedback::{
    next_interval, score_comments, set_status_line, CheckOutcome, CommentChecker, FeedbackStatus,
};
pub use machine::{PublicationDecision, PublicationStateMachine};
pub use render::{
    apply_banner, render_body, render_changelog, render_table, render_title, MAX_TITLED_CHANGES,
};
pub use validate::{validate_post, Severity, ValidationIssue, ValidationReport};
