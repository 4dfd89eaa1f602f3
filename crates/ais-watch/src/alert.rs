//! Alert decision and message

use chrono::NaiveDate;

/// Whether the earliest candidate is strictly earlier than the held date.
/// No candidate means no alert.
pub fn should_alert(earliest: Option<NaiveDate>, target: NaiveDate) -> bool {
    earliest.is_some_and(|candidate| candidate < target)
}

/// SMS body announcing a better date.
pub fn alert_message(candidate: NaiveDate, target: NaiveDate) -> String {
    format!("Nueva fecha! (Nueva: {candidate}, Vieja: {target})")
}
