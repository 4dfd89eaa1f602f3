//! Appointment watch cycle
//!
//! Ties the session crate together into a single `run_once()` call:
//! query dates with the stored session, renew it at most once if the portal
//! reports it expired, and text the applicant when a date earlier than the
//! one they hold shows up.
//!
//! Run lifecycle:
//! 1. `Orchestrator` queries with the stored pair (`Querying`)
//! 2. Portal reports expiry → one negotiation, committed to the store
//!    (`Reauthenticating`)
//! 3. Query repeated once with the new pair; a second expiry fails the run
//! 4. `should_alert` compares the earliest date with the held one
//! 5. `Notifier` sends the SMS when it is earlier

pub mod alert;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod watcher;

pub use alert::{alert_message, should_alert};
pub use error::{Error, Result};
pub use notify::{Notifier, TwilioNotifier};
pub use orchestrator::{DateSource, Orchestrator, RunState, SessionSource, advance};
pub use watcher::{RunReport, Watcher};
