//! Append-only hash-chained WORM ledger
//!
//! Storage is line-delimited JSON: a header line declaring the format
//! version and hash algorithm, then one event per line, each carrying the
//! hash of its predecessor. Exactly one writer holds an exclusive advisory
//! lock; readers parse the file without it. A chain break or sequence gap
//! flips the handle into a read-only tamper-suspected mode that refuses all
//! further appends until the operator rotates the ledger.

use chrono::Utc;
use fs2::FileExt;
use penin_enc::{digest_from_hex, Digest32, EncodingError, HashAlgorithm, ZERO_HASH_HEX};
use penin_merkle::{MerkleError, MerkleProof, MerkleTree};
use penin_pcag::ProofCarryingArtifact;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

mod event;
pub mod query;

pub use event::{EventType, LedgerEvent, LedgerHeader, LEDGER_VERSION};
pub use query::{filter_events, find_by_event_id, find_pcag, EventFilter};

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Ledger is locked by another writer")]
    Locked,
    #[error("Ledger tamper suspected: {0}")]
    Tamper(String),
    #[error("Malformed record at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),
    #[error("Merkle error: {0}")]
    Merkle(#[from] MerkleError),
    #[error("Refusing to seal invalid PCAg: {0}")]
    InvalidPcag(String),
    #[error("Rotation target already exists: {0}")]
    RotateTargetExists(PathBuf),
    #[error("No event at sequence {0}")]
    NoSuchSequence(u64),
}

/// Read-only summary of a ledger handle
#[derive(Debug, Clone)]
pub struct LedgerStats {
    pub event_count: usize,
    pub tail_sequence: Option<u64>,
    pub tamper_suspected: bool,
    pub merkle_root: String,
}

/// The single writing handle onto one ledger file
pub struct WormLedger {
    path: PathBuf,
    file: File,
    header: LedgerHeader,
    algorithm: HashAlgorithm,
    tail_sequence: Option<u64>,
    tail_hash: String,
    event_hashes: Vec<Digest32>,
    tamper: Option<String>,
}

impl WormLedger {
    /// Open a ledger for writing, creating it with a fresh header if absent
    ///
    /// New ledgers always hash with BLAKE2b-256; an existing header may
    /// declare the legacy algorithm, which is honored for both linkage and
    /// new appends to that file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Self::open_with_header(path, LedgerHeader::new(HashAlgorithm::Blake2b256))
    }

    fn open_with_header(path: impl AsRef<Path>, fresh: LedgerHeader) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        file.try_lock_exclusive().map_err(|_| LedgerError::Locked)?;

        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut bytes)?;

        // A crashed writer may leave a partial trailing record; it was never
        // acknowledged, so it is truncated before the scan completes.
        if !bytes.is_empty() && !bytes.ends_with(b"\n") {
            let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |p| p + 1);
            warn!(
                path = %path.display(),
                dropped = bytes.len() - keep,
                "truncating partial trailing record"
            );
            bytes.truncate(keep);
            file.set_len(keep as u64)?;
            file.sync_all()?;
        }

        if bytes.is_empty() {
            let mut line = serde_json::to_string(&fresh)
                .map_err(|e| EncodingError::SerializationFailed(e.to_string()))?;
            line.push('\n');
            file.write_all(line.as_bytes())?;
            file.sync_all()?;
            info!(path = %path.display(), algorithm = %fresh.hash_algorithm, "ledger created");
            let algorithm = fresh.algorithm()?;
            return Ok(Self {
                path,
                file,
                header: fresh,
                algorithm,
                tail_sequence: None,
                tail_hash: ZERO_HASH_HEX.to_string(),
                event_hashes: Vec::new(),
                tamper: None,
            });
        }

        let text = String::from_utf8_lossy(&bytes);
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

        let (_, header_line) = lines.next().ok_or_else(|| LedgerError::Malformed {
            line: 1,
            reason: "missing header".to_string(),
        })?;
        let header: LedgerHeader =
            serde_json::from_str(header_line).map_err(|e| LedgerError::Malformed {
                line: 1,
                reason: format!("header: {e}"),
            })?;
        let algorithm = header.algorithm()?;

        let mut tail_sequence = None;
        let mut tail_hash = ZERO_HASH_HEX.to_string();
        let mut event_hashes = Vec::new();
        let mut tamper = None;

        for (index, line) in lines {
            let parsed: Result<LedgerEvent, _> = serde_json::from_str(line);
            let event = match parsed {
                Ok(event) => event,
                Err(e) => {
                    tamper = Some(format!("line {}: unparseable record: {e}", index + 1));
                    break;
                }
            };
            let expected_sequence = tail_sequence.map_or(0, |s: u64| s + 1);
            if event.sequence != expected_sequence {
                tamper = Some(format!(
                    "sequence {}: expected {expected_sequence}",
                    event.sequence
                ));
                break;
            }
            if event.prev_hash != tail_hash {
                tamper = Some(format!("sequence {}: prev_hash broken", event.sequence));
                break;
            }
            match digest_from_hex(&event.event_hash) {
                Ok(digest) => event_hashes.push(digest),
                Err(e) => {
                    tamper = Some(format!("sequence {}: event_hash: {e}", event.sequence));
                    break;
                }
            }
            tail_sequence = Some(event.sequence);
            tail_hash = event.event_hash;
        }

        if let Some(reason) = &tamper {
            warn!(path = %path.display(), %reason, "ledger opened in tamper-suspected mode");
        } else {
            debug!(
                path = %path.display(),
                events = event_hashes.len(),
                "ledger opened"
            );
        }

        Ok(Self {
            path,
            file,
            header,
            algorithm,
            tail_sequence,
            tail_hash,
            event_hashes,
            tamper,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &LedgerHeader {
        &self.header
    }

    pub fn is_tamper_suspected(&self) -> bool {
        self.tamper.is_some()
    }

    /// Append one event, durably, and return the sealed record
    pub fn append(
        &mut self,
        event_type: EventType,
        event_id: &str,
        payload: serde_json::Value,
    ) -> Result<LedgerEvent, LedgerError> {
        self.append_with(event_type, event_id, payload, None)
    }

    /// Append a `pcag` event embedding the full artifact
    ///
    /// The payload binds the artifact hash into the event hash chain; the
    /// embedded artifact additionally self-verifies.
    pub fn append_pcag(&mut self, pcag: ProofCarryingArtifact) -> Result<LedgerEvent, LedgerError> {
        pcag.verify()
            .map_err(|e| LedgerError::InvalidPcag(e.to_string()))?;
        let payload = serde_json::json!({
            "artifact_id": pcag.artifact_id,
            "artifact_hash": pcag.artifact_hash,
            "parent_run_id": pcag.parent_run_id,
        });
        let event_id = pcag.artifact_id.clone();
        self.append_with(EventType::Pcag, &event_id, payload, Some(pcag))
    }

    fn append_with(
        &mut self,
        event_type: EventType,
        event_id: &str,
        payload: serde_json::Value,
        pcag: Option<ProofCarryingArtifact>,
    ) -> Result<LedgerEvent, LedgerError> {
        if let Some(reason) = &self.tamper {
            return Err(LedgerError::Tamper(reason.clone()));
        }

        let sequence = self.tail_sequence.map_or(0, |s| s + 1);
        let event = LedgerEvent::seal(
            sequence,
            event_type,
            event_id,
            Utc::now(),
            payload,
            self.tail_hash.clone(),
            pcag,
            self.algorithm,
        )?;

        let mut line = serde_json::to_string(&event)
            .map_err(|e| EncodingError::SerializationFailed(e.to_string()))?;
        line.push('\n');
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(line.as_bytes())?;
        self.file.sync_all()?;

        self.tail_sequence = Some(sequence);
        self.tail_hash = event.event_hash.clone();
        self.event_hashes.push(digest_from_hex(&event.event_hash)?);
        debug!(%event_type, sequence, event_id, "ledger event sealed");
        Ok(event)
    }

    fn load_from_disk(&self) -> Result<(LedgerHeader, Vec<LedgerEvent>), LedgerError> {
        read_ledger(&self.path)
    }

    /// Re-read the file and verify density, linkage and every event hash
    ///
    /// Returns `(true, "ok")` or `(false, reason)` naming the first failing
    /// sequence. A failure flips this handle into tamper-suspected mode.
    pub fn verify_chain(&mut self) -> (bool, String) {
        let (header, events) = match self.load_from_disk() {
            Ok(loaded) => loaded,
            Err(e) => {
                let reason = format!("unreadable ledger: {e}");
                self.tamper = Some(reason.clone());
                return (false, reason);
            }
        };
        let algorithm = match header.algorithm() {
            Ok(a) => a,
            Err(e) => {
                let reason = format!("header: {e}");
                self.tamper = Some(reason.clone());
                return (false, reason);
            }
        };

        let mut prev_hash = ZERO_HASH_HEX.to_string();
        for (index, event) in events.iter().enumerate() {
            let sequence = index as u64;
            if event.sequence != sequence {
                return self.flag_tamper(format!(
                    "sequence {sequence}: gap (found {})",
                    event.sequence
                ));
            }
            if event.prev_hash != prev_hash {
                return self.flag_tamper(format!("sequence {sequence}: prev_hash mismatch"));
            }
            match event.recompute_hash(algorithm) {
                Ok(recomputed) if recomputed == event.event_hash => {}
                Ok(_) => {
                    return self.flag_tamper(format!("sequence {sequence}: event_hash mismatch"))
                }
                Err(e) => return self.flag_tamper(format!("sequence {sequence}: {e}")),
            }
            if let Some(pcag) = &event.pcag {
                if pcag.verify().is_err() {
                    return self.flag_tamper(format!("sequence {sequence}: pcag hash mismatch"));
                }
                let bound = event
                    .payload
                    .get("artifact_hash")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                if bound != pcag.artifact_hash {
                    return self.flag_tamper(format!("sequence {sequence}: pcag not bound"));
                }
            }
            prev_hash = event.event_hash.clone();
        }
        (true, "ok".to_string())
    }

    fn flag_tamper(&mut self, reason: String) -> (bool, String) {
        warn!(path = %self.path.display(), %reason, "ledger tamper detected");
        self.tamper = Some(reason.clone());
        (false, reason)
    }

    /// Merkle root over event hashes in sequence order; the zero-hash for an
    /// empty ledger
    pub fn merkle_root(&self) -> String {
        if self.event_hashes.is_empty() {
            return ZERO_HASH_HEX.to_string();
        }
        // Non-empty input cannot fail.
        MerkleTree::from_hashes(self.event_hashes.clone())
            .map(|tree| tree.root_hex())
            .unwrap_or_else(|_| ZERO_HASH_HEX.to_string())
    }

    /// Inclusion proof for the event at `sequence`
    pub fn merkle_proof(&self, sequence: u64) -> Result<MerkleProof, LedgerError> {
        if sequence as usize >= self.event_hashes.len() {
            return Err(LedgerError::NoSuchSequence(sequence));
        }
        let tree = MerkleTree::from_hashes(self.event_hashes.clone())?;
        Ok(tree.proof(sequence as usize)?)
    }

    /// Read-only pass over all sealed events
    pub fn iter_events(&self) -> Result<impl Iterator<Item = LedgerEvent>, LedgerError> {
        let (_, events) = self.load_from_disk()?;
        Ok(events.into_iter())
    }

    /// The raw ledger text, byte-exact, for external auditors
    pub fn export_audit(&self) -> Result<String, LedgerError> {
        Ok(std::fs::read_to_string(&self.path)?)
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            event_count: self.event_hashes.len(),
            tail_sequence: self.tail_sequence,
            tamper_suspected: self.tamper.is_some(),
            merkle_root: self.merkle_root(),
        }
    }

    /// Operator recovery: seal a fresh ledger whose header records this
    /// ledger's final Merkle root, then hand back the new writing handle
    ///
    /// Permitted in tamper-suspected mode; the root covers the sealed good
    /// prefix.
    pub fn rotate(&self, new_path: impl AsRef<Path>) -> Result<WormLedger, LedgerError> {
        let new_path = new_path.as_ref();
        if new_path.exists() {
            return Err(LedgerError::RotateTargetExists(new_path.to_path_buf()));
        }
        let mut header = LedgerHeader::new(HashAlgorithm::Blake2b256);
        header.predecessor_root = Some(self.merkle_root());
        info!(
            from = %self.path.display(),
            to = %new_path.display(),
            "rotating ledger"
        );
        Self::open_with_header(new_path, header)
    }
}

/// Parse a ledger file without taking the writer lock
///
/// This is the reader path: many readers may run concurrently with the one
/// writer and see only fully sealed events.
pub fn read_ledger(path: impl AsRef<Path>) -> Result<(LedgerHeader, Vec<LedgerEvent>), LedgerError> {
    let text = std::fs::read_to_string(path)?;
    let total_lines = text.lines().count();
    let complete = text.ends_with('\n');

    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let (_, header_line) = lines.next().ok_or(LedgerError::Malformed {
        line: 1,
        reason: "missing header".to_string(),
    })?;
    let header: LedgerHeader =
        serde_json::from_str(header_line).map_err(|e| LedgerError::Malformed {
            line: 1,
            reason: format!("header: {e}"),
        })?;

    let mut events = Vec::new();
    for (index, line) in lines {
        // A partial trailing record was never acknowledged; readers skip it.
        if !complete && index == total_lines - 1 {
            break;
        }
        let event: LedgerEvent =
            serde_json::from_str(line).map_err(|e| LedgerError::Malformed {
                line: index + 1,
                reason: e.to_string(),
            })?;
        events.push(event);
    }
    Ok((header, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use penin_attest::Verdict;
    use penin_pcag::PcagBuilder;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn payload(n: u64) -> serde_json::Value {
        serde_json::json!({"candidate_id": "cand-001", "n": n})
    }

    fn ledger_path(dir: &TempDir) -> PathBuf {
        dir.path().join("worm.jsonl")
    }

    fn pcag() -> ProofCarryingArtifact {
        PcagBuilder::new("pcag-001", "promotion")
            .parent_run("run-1")
            .metric("linf", 0.77)
            .gates(BTreeMap::from([("bias".to_string(), true)]))
            .decision(Verdict::Pass, "all gates passed", "ckpt-0")
            .artifact_hashes("c0".repeat(32), "c1".repeat(32), "c2".repeat(32))
            .attestation_chain("ab".repeat(32))
            .build()
            .unwrap()
    }

    #[test]
    fn fresh_ledger_has_header_and_zero_root() {
        let dir = TempDir::new().unwrap();
        let mut ledger = WormLedger::open(ledger_path(&dir)).unwrap();
        assert_eq!(ledger.merkle_root(), ZERO_HASH_HEX);
        let (ok, reason) = ledger.verify_chain();
        assert!(ok, "{reason}");

        let text = ledger.export_audit().unwrap();
        assert!(text.starts_with(r#"{"ledger_version":"2.0.0","hash_algorithm":"blake2b-256""#));
    }

    #[test]
    fn appended_events_chain() {
        let dir = TempDir::new().unwrap();
        let mut ledger = WormLedger::open(ledger_path(&dir)).unwrap();
        let e0 = ledger.append(EventType::ShadowEval, "evt-0", payload(0)).unwrap();
        let e1 = ledger.append(EventType::CanaryEval, "evt-1", payload(1)).unwrap();
        let e2 = ledger.append(EventType::Promote, "evt-2", payload(2)).unwrap();

        assert_eq!(e0.sequence, 0);
        assert_eq!(e0.prev_hash, ZERO_HASH_HEX);
        assert_eq!(e1.prev_hash, e0.event_hash);
        assert_eq!(e2.prev_hash, e1.event_hash);

        let (ok, reason) = ledger.verify_chain();
        assert!(ok, "{reason}");
        assert_eq!(ledger.stats().event_count, 3);
    }

    #[test]
    fn reopen_continues_the_chain() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);
        let tail = {
            let mut ledger = WormLedger::open(&path).unwrap();
            ledger.append(EventType::ShadowEval, "evt-0", payload(0)).unwrap();
            ledger.append(EventType::CanaryEval, "evt-1", payload(1)).unwrap();
            ledger.stats().tail_sequence
        };
        assert_eq!(tail, Some(1));

        let mut ledger = WormLedger::open(&path).unwrap();
        let e2 = ledger.append(EventType::Promote, "evt-2", payload(2)).unwrap();
        assert_eq!(e2.sequence, 2);
        let (ok, reason) = ledger.verify_chain();
        assert!(ok, "{reason}");
    }

    #[test]
    fn second_writer_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);
        let _writer = WormLedger::open(&path).unwrap();
        assert!(matches!(WormLedger::open(&path), Err(LedgerError::Locked)));
    }

    #[test]
    fn readers_run_without_the_lock() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);
        let mut ledger = WormLedger::open(&path).unwrap();
        ledger.append(EventType::ShadowEval, "evt-0", payload(0)).unwrap();

        let (header, events) = read_ledger(&path).unwrap();
        assert_eq!(header.hash_algorithm, "blake2b-256");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, "evt-0");
    }

    #[test]
    fn tampered_payload_detected_at_its_sequence() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);
        {
            let mut ledger = WormLedger::open(&path).unwrap();
            for n in 0..4 {
                ledger
                    .append(EventType::ShadowEval, &format!("evt-{n}"), payload(n))
                    .unwrap();
            }
        }

        // Flip one character inside event #2's payload on disk.
        let text = std::fs::read_to_string(&path).unwrap();
        let tampered = text.replace(r#""n":2"#, r#""n":7"#);
        assert_ne!(text, tampered);
        std::fs::write(&path, tampered).unwrap();

        let mut ledger = WormLedger::open(&path).unwrap();
        let (ok, reason) = ledger.verify_chain();
        assert!(!ok);
        assert!(reason.contains("sequence 2"), "{reason}");
        assert!(ledger.is_tamper_suspected());
    }

    #[test]
    fn deleting_an_event_breaks_the_chain() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);
        {
            let mut ledger = WormLedger::open(&path).unwrap();
            for n in 0..3 {
                ledger
                    .append(EventType::ShadowEval, &format!("evt-{n}"), payload(n))
                    .unwrap();
            }
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = text
            .lines()
            .filter(|l| !l.contains("\"evt-1\""))
            .collect();
        std::fs::write(&path, format!("{}\n", kept.join("\n"))).unwrap();

        let mut ledger = WormLedger::open(&path).unwrap();
        let (ok, _) = ledger.verify_chain();
        assert!(!ok);
    }

    #[test]
    fn tamper_mode_blocks_appends() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);
        {
            let mut ledger = WormLedger::open(&path).unwrap();
            ledger.append(EventType::ShadowEval, "evt-0", payload(0)).unwrap();
            ledger.append(EventType::ShadowEval, "evt-1", payload(1)).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace(r#""n":0"#, r#""n":9"#)).unwrap();

        let mut ledger = WormLedger::open(&path).unwrap();
        let (ok, _) = ledger.verify_chain();
        assert!(!ok);
        assert!(matches!(
            ledger.append(EventType::Rollback, "evt-2", payload(2)),
            Err(LedgerError::Tamper(_))
        ));
    }

    #[test]
    fn partial_trailing_record_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);
        {
            let mut ledger = WormLedger::open(&path).unwrap();
            ledger.append(EventType::ShadowEval, "evt-0", payload(0)).unwrap();
        }

        // Simulate a crash mid-append: a record with no terminating newline.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"sequence":1,"event_type":"canary"#).unwrap();
        drop(file);

        let mut ledger = WormLedger::open(&path).unwrap();
        assert!(!ledger.is_tamper_suspected());
        assert_eq!(ledger.stats().event_count, 1);
        let (ok, reason) = ledger.verify_chain();
        assert!(ok, "{reason}");

        // The chain continues cleanly after recovery.
        let e1 = ledger.append(EventType::CanaryEval, "evt-1", payload(1)).unwrap();
        assert_eq!(e1.sequence, 1);
    }

    #[test]
    fn merkle_root_tracks_events_and_proofs_verify() {
        let dir = TempDir::new().unwrap();
        let mut ledger = WormLedger::open(ledger_path(&dir)).unwrap();
        let root0 = ledger.merkle_root();
        ledger.append(EventType::ShadowEval, "evt-0", payload(0)).unwrap();
        let root1 = ledger.merkle_root();
        ledger.append(EventType::CanaryEval, "evt-1", payload(1)).unwrap();
        let root2 = ledger.merkle_root();
        assert_ne!(root0, root1);
        assert_ne!(root1, root2);

        let root = digest_from_hex(&root2).unwrap();
        for sequence in 0..2 {
            assert!(ledger.merkle_proof(sequence).unwrap().verify(&root));
        }
        assert!(matches!(
            ledger.merkle_proof(9),
            Err(LedgerError::NoSuchSequence(9))
        ));
    }

    #[test]
    fn pcag_event_embeds_and_binds_the_artifact() {
        let dir = TempDir::new().unwrap();
        let mut ledger = WormLedger::open(ledger_path(&dir)).unwrap();
        let artifact = pcag();
        let event = ledger.append_pcag(artifact.clone()).unwrap();
        assert_eq!(event.event_type, EventType::Pcag);
        assert_eq!(event.payload["artifact_hash"], artifact.artifact_hash);

        let (ok, reason) = ledger.verify_chain();
        assert!(ok, "{reason}");

        let stored = ledger.iter_events().unwrap().next().unwrap();
        assert_eq!(stored.pcag.unwrap().artifact_hash, artifact.artifact_hash);
    }

    #[test]
    fn legacy_sha256_ledger_appends_and_verifies() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);
        std::fs::write(
            &path,
            concat!(
                r#"{"ledger_version":"2.0.0","hash_algorithm":"sha-256","#,
                r#""created_at":"2025-06-01T12:00:00+00:00"}"#,
                "\n"
            ),
        )
        .unwrap();

        let mut ledger = WormLedger::open(&path).unwrap();
        assert_eq!(ledger.header().hash_algorithm, "sha-256");
        ledger.append(EventType::ShadowEval, "evt-0", payload(0)).unwrap();
        ledger.append(EventType::Rollback, "evt-1", payload(1)).unwrap();
        let (ok, reason) = ledger.verify_chain();
        assert!(ok, "{reason}");
    }

    #[test]
    fn rotation_records_predecessor_root() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);
        let mut ledger = WormLedger::open(&path).unwrap();
        ledger.append(EventType::ShadowEval, "evt-0", payload(0)).unwrap();
        let root = ledger.merkle_root();

        let successor = ledger.rotate(dir.path().join("worm-2.jsonl")).unwrap();
        assert_eq!(successor.header().predecessor_root.as_deref(), Some(root.as_str()));
        assert_eq!(successor.stats().event_count, 0);
    }
}
