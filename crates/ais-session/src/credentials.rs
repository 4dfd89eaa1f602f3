//! Credential record storage
//!
//! The credential record is a single JSON file holding the applicant's
//! identity, the notification credentials, the currently held appointment
//! date and the last negotiated session. Every commit rewrites the whole
//! file with an atomic temp-file + rename, so a crash right after a
//! successful negotiation never loses the new token pair and a concurrent
//! reader never sees a half-written record.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Session token + anti-forgery token produced by one negotiation.
///
/// Kept as a single value so a cookie from one exchange can never be paired
/// with a token from another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub session_token: Secret<String>,
    pub anti_forgery_token: Secret<String>,
}

impl TokenPair {
    pub fn new(session_token: impl Into<String>, anti_forgery_token: impl Into<String>) -> Self {
        Self {
            session_token: Secret::new(session_token.into()),
            anti_forgery_token: Secret::new(anti_forgery_token.into()),
        }
    }
}

/// Portal login identity and the phone alerts are sent to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub password: Secret<String>,
    pub phone: String,
}

/// Twilio messaging credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCredentials {
    pub account_sid: String,
    pub auth_token: Secret<String>,
    pub messaging_service_sid: String,
}

/// The full durable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    /// Last negotiated session; `None` until the first successful login.
    #[serde(default)]
    pub session: Option<TokenPair>,
    /// Appointment date currently held
    pub target_date: NaiveDate,
    pub identity: Identity,
    pub notification: NotificationCredentials,
}

/// Fields to merge into the record on commit. `None` leaves a field as is.
#[derive(Debug, Default)]
pub struct CredentialUpdate {
    pub session: Option<TokenPair>,
    pub target_date: Option<NaiveDate>,
}

impl CredentialUpdate {
    pub fn session(tokens: TokenPair) -> Self {
        Self {
            session: Some(tokens),
            ..Self::default()
        }
    }

    pub fn target_date(date: NaiveDate) -> Self {
        Self {
            target_date: Some(date),
            ..Self::default()
        }
    }
}

/// File-backed credential record.
///
/// The Mutex serializes commits. Reads clone the in-memory record so callers
/// never hold the lock across network I/O.
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<CredentialRecord>,
}

impl CredentialStore {
    /// Load the record from the given file path.
    ///
    /// A missing or malformed file is `ConfigMissing`: the record carries the
    /// login identity, so there is nothing sensible to start from without it.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let record = read_record(&path).await?;

        info!(
            path = %path.display(),
            target_date = %record.target_date,
            has_session = record.session.is_some(),
            "loaded credential record"
        );

        Ok(Self {
            path,
            state: Mutex::new(record),
        })
    }

    /// Replace the in-memory record with the current file contents.
    ///
    /// Picks up edits made by other processes (a new held date, a hand-fixed
    /// password) so the next commit merges into them instead of overwriting
    /// them. Same error mapping as `load`; on error memory is unchanged.
    pub async fn reload(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = read_record(&self.path).await?;
        debug!(
            target_date = %record.target_date,
            has_session = record.session.is_some(),
            "reloaded credential record"
        );
        *state = record;
        Ok(())
    }

    /// Clone of the current in-memory record.
    pub async fn snapshot(&self) -> CredentialRecord {
        self.state.lock().await.clone()
    }

    /// Current session, if one has been negotiated.
    pub async fn session(&self) -> Option<TokenPair> {
        self.state.lock().await.session.clone()
    }

    /// Merge `update` into the record and persist the full record.
    ///
    /// The in-memory record is only replaced once the file write succeeded,
    /// so memory and disk never disagree after a failed commit.
    pub async fn commit(&self, update: CredentialUpdate) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let mut fields = Vec::new();
        if let Some(session) = update.session {
            next.session = Some(session);
            fields.push("session");
        }
        if let Some(date) = update.target_date {
            next.target_date = date;
            fields.push("target_date");
        }
        if fields.is_empty() {
            return Ok(());
        }

        write_atomic(&self.path, &next).await?;
        *state = next;
        debug!(?fields, "committed credential update");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn read_record(path: &Path) -> Result<CredentialRecord> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ConfigMissing(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
    };

    serde_json::from_str(&contents)
        .map_err(|e| Error::ConfigMissing(format!("parsing {}: {e}", path.display())))
}

/// Write the record to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Permissions are 0600 since the record holds a password and
/// live session tokens.
async fn write_atomic(path: &Path, record: &CredentialRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::CredentialParse(format!("serializing credential record: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        Some(_) => Path::new("."),
        None => return Err(Error::Io("credential path has no parent directory".into())),
    };

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credential record");
    Ok(())
}
