//! Pipeline stages built on the adapters, the store and the notification port.
//!
//! - `collect`: fetch a source, detect changes, announce new courses
//! - `pending`: re-send announcements that never went out
//! - `schedule`: periodic loops driving both

pub mod collect;
pub mod diff;
pub mod dispatch;
pub mod lease;
pub mod pending;
pub mod schedule;

pub use collect::{CollectReport, CollectStatus, CollectionOrchestrator};
pub use diff::{ChangeCounts, ChangeDetector, ChangeReport, is_relevant_update};
pub use dispatch::{DispatchReport, NewCourseNotifier, summary_link};
pub use lease::{RunLease, RunLocks};
pub use pending::{FlushReport, PendingNotifier};
pub use schedule::{run_collect_loop, run_pending_loop, spawn_schedulers};
