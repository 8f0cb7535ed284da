//! Single-slot signal mailbox shared with the speech-capture process.
//!
//! Every [`SignalKind`] has exactly one slot. Publishing overwrites whatever
//! unread message of that kind is there (last write wins); polling consumes
//! it, so a message is delivered at most once. There is no ordering between
//! kinds and no queueing within a kind.
//!
//! [`FileMailbox`] stores each slot as a marker file in a shared directory
//! so an independent process can take part:
//!
//! - **publish** writes a temp file in the same directory and renames it
//!   over the marker, so a reader sees either the old payload or the new
//!   one, never a partial write.
//! - **poll** first renames the marker to a unique claim name, then reads
//!   and deletes the claim. A publish racing the poll lands on a fresh
//!   marker instead of being half-read or deleted unseen.
//!
//! A payload that cannot be read or is not UTF-8 is logged as
//! [`RoverError::MailboxCorruption`] and treated as absent.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rover_types::{RoverError, SignalKind, SignalMessage};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

const CLAIM_TAG: &str = ".claim-";

pub trait Mailbox: Send + Sync {
    /// Atomically write (or overwrite) the slot for `message.kind()`.
    fn publish(&self, message: &SignalMessage) -> Result<(), RoverError>;

    /// Take the pending message of `kind`, if any.
    fn poll(&self, kind: SignalKind) -> Result<Option<SignalMessage>, RoverError>;

    /// Whether a message of `kind` is waiting, without consuming it.
    fn is_pending(&self, kind: SignalKind) -> bool;

    /// Remove every pending message.
    fn clear(&self) -> Result<(), RoverError>;
}

// ────────────────────────────────────────────────────────────────────────────
// File-backed
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FileMailbox {
    dir: PathBuf,
}

impl FileMailbox {
    /// Use `dir` as the mailbox, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, RoverError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| RoverError::Mailbox(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn marker_path(&self, kind: SignalKind) -> PathBuf {
        self.dir.join(kind.marker_name())
    }

    fn claim_path(&self, kind: SignalKind) -> PathBuf {
        self.dir
            .join(format!(".{}{CLAIM_TAG}{}", kind.marker_name(), Uuid::new_v4()))
    }

    fn read_claim(&self, kind: SignalKind, claim: &Path) -> Option<SignalMessage> {
        let read = fs::read(claim);
        if let Err(e) = fs::remove_file(claim) {
            warn!(path = %claim.display(), error = %e, "could not remove claimed marker");
        }
        let decoded = read
            .map_err(|e| e.to_string())
            .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()));
        match decoded {
            Ok(payload) => Some(SignalMessage::from_payload(kind, payload)),
            Err(details) => {
                let error = RoverError::MailboxCorruption { kind, details };
                warn!(error = %error, "discarding unreadable mailbox payload");
                None
            }
        }
    }
}

impl Mailbox for FileMailbox {
    fn publish(&self, message: &SignalMessage) -> Result<(), RoverError> {
        let kind = message.kind();
        let target = self.marker_path(kind);
        let to_err = |e: io::Error| RoverError::Mailbox(format!("publish {kind}: {e}"));

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(to_err)?;
        tmp.write_all(message.payload().as_bytes()).map_err(to_err)?;
        tmp.as_file().sync_all().map_err(to_err)?;
        tmp.persist(&target).map_err(|e| to_err(e.error))?;
        debug!(%kind, path = %target.display(), "signal published");
        Ok(())
    }

    fn poll(&self, kind: SignalKind) -> Result<Option<SignalMessage>, RoverError> {
        let marker = self.marker_path(kind);
        let claim = self.claim_path(kind);
        match fs::rename(&marker, &claim) {
            Ok(()) => Ok(self.read_claim(kind, &claim)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RoverError::Mailbox(format!("claim {kind}: {e}"))),
        }
    }

    fn is_pending(&self, kind: SignalKind) -> bool {
        self.marker_path(kind).exists()
    }

    fn clear(&self) -> Result<(), RoverError> {
        for kind in SignalKind::ALL {
            match fs::remove_file(self.marker_path(kind)) {
                Ok(()) => debug!(%kind, "stale marker removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(RoverError::Mailbox(format!("clear {kind}: {e}"))),
            }
        }
        // Claims left behind by a reader that died mid-poll.
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| RoverError::Mailbox(format!("list {}: {e}", self.dir.display())))?;
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().contains(CLAIM_TAG) {
                let path = entry.path();
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "could not remove orphaned claim");
                }
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

/// Same semantics as [`FileMailbox`], held in process memory.
#[derive(Debug, Default)]
pub struct MemoryMailbox {
    slots: Mutex<HashMap<SignalKind, SignalMessage>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<SignalKind, SignalMessage>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Mailbox for MemoryMailbox {
    fn publish(&self, message: &SignalMessage) -> Result<(), RoverError> {
        self.slots().insert(message.kind(), message.clone());
        Ok(())
    }

    fn poll(&self, kind: SignalKind) -> Result<Option<SignalMessage>, RoverError> {
        Ok(self.slots().remove(&kind))
    }

    fn is_pending(&self, kind: SignalKind) -> bool {
        self.slots().contains_key(&kind)
    }

    fn clear(&self) -> Result<(), RoverError> {
        self.slots().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn transcript(text: &str) -> SignalMessage {
        SignalMessage::TranscriptReady(text.to_string())
    }

    fn check_single_slot_semantics(mailbox: &dyn Mailbox) {
        mailbox.publish(&transcript("go left")).unwrap();
        assert_eq!(
            mailbox.poll(SignalKind::TranscriptReady).unwrap(),
            Some(transcript("go left"))
        );
        assert_eq!(mailbox.poll(SignalKind::TranscriptReady).unwrap(), None);

        // Last write wins.
        mailbox.publish(&transcript("first")).unwrap();
        mailbox.publish(&transcript("second")).unwrap();
        assert_eq!(
            mailbox.poll(SignalKind::TranscriptReady).unwrap(),
            Some(transcript("second"))
        );
        assert_eq!(mailbox.poll(SignalKind::TranscriptReady).unwrap(), None);

        // Kinds do not interfere.
        mailbox.publish(&SignalMessage::WakeDetected).unwrap();
        assert_eq!(mailbox.poll(SignalKind::TranscriptReady).unwrap(), None);
        assert!(mailbox.is_pending(SignalKind::WakeDetected));
        assert_eq!(
            mailbox.poll(SignalKind::WakeDetected).unwrap(),
            Some(SignalMessage::WakeDetected)
        );

        mailbox.publish(&SignalMessage::Ack).unwrap();
        mailbox.clear().unwrap();
        assert!(!mailbox.is_pending(SignalKind::Ack));
    }

    #[test]
    fn memory_mailbox_is_single_slot() {
        check_single_slot_semantics(&MemoryMailbox::new());
    }

    #[test]
    fn file_mailbox_is_single_slot() {
        let dir = tempdir().unwrap();
        check_single_slot_semantics(&FileMailbox::open(dir.path()).unwrap());
    }

    #[test]
    fn file_mailbox_reads_markers_written_by_another_process() {
        let dir = tempdir().unwrap();
        let mailbox = FileMailbox::open(dir.path()).unwrap();
        fs::write(dir.path().join("transcript_ready.txt"), "what time is it").unwrap();
        fs::write(dir.path().join("wake_detected.flag"), "").unwrap();

        assert_eq!(
            mailbox.poll(SignalKind::TranscriptReady).unwrap(),
            Some(transcript("what time is it"))
        );
        assert_eq!(
            mailbox.poll(SignalKind::WakeDetected).unwrap(),
            Some(SignalMessage::WakeDetected)
        );
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn corrupt_payload_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let mailbox = FileMailbox::open(dir.path()).unwrap();
        fs::write(mailbox.marker_path(SignalKind::TranscriptReady), [0xff, 0xfe, 0x00]).unwrap();

        assert_eq!(mailbox.poll(SignalKind::TranscriptReady).unwrap(), None);
        assert!(!mailbox.is_pending(SignalKind::TranscriptReady));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn publish_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let mailbox = FileMailbox::open(dir.path()).unwrap();
        mailbox.publish(&SignalMessage::ListenRequest).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["listen_request.flag".to_string()]);
    }

    #[test]
    fn clear_removes_abandoned_claims() {
        let dir = tempdir().unwrap();
        let mailbox = FileMailbox::open(dir.path()).unwrap();
        fs::write(dir.path().join(".ack.flag.claim-dead"), "").unwrap();
        mailbox.clear().unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn unremovable_claim_does_not_fail_clear() {
        let dir = tempdir().unwrap();
        let mailbox = FileMailbox::open(dir.path()).unwrap();
        // remove_file refuses a directory, so this claim survives.
        let stuck = dir.path().join(".ack.flag.claim-stuck");
        fs::create_dir(&stuck).unwrap();
        fs::write(dir.path().join(".wake_detected.flag.claim-dead"), "").unwrap();

        mailbox.clear().unwrap();
        let left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(left, vec![stuck]);
    }
}
