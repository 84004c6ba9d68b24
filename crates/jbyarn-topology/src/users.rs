//! Management realm users (`mgmt-users.properties`).
//!
//! Each entry is `user=hex(md5("user:realm:password"))`, the digest form
//! the server's properties realm expects.

use std::path::Path;

use md5::{Digest, Md5};
use tracing::info;

use crate::document::write_replace;
use crate::error::{TopologyError, TopologyResult};

/// Digest stored for a user in `realm`.
pub fn user_digest(user: &str, realm: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(user.as_bytes());
    hasher.update(b":");
    hasher.update(realm.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Set `user`'s entry in properties `content`, replacing an existing one.
pub fn upsert_user(content: &str, user: &str, digest: &str) -> String {
    let entry = format!("{user}={digest}");
    let prefix = format!("{user}=");
    let mut replaced = false;

    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            if !line.trim_start().starts_with('#') && line.trim_start().starts_with(&prefix) {
                replaced = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(entry);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Add (or update) a user in the properties file at `path`.
///
/// A missing file is created. The caller holds the file's lock.
pub fn add_user(path: &Path, user: &str, password: &str, realm: &str) -> TopologyResult<()> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(TopologyError::io(path, e)),
    };

    let updated = upsert_user(&content, user, &user_digest(user, realm, password));
    write_replace(path, updated.as_bytes())?;

    info!(%user, %realm, path = %path.display(), "management user added");
    Ok(())
}
