//! Zero-knowledge proof verification capability
//!
//! The matching engine never decrypts opaque payloads; it only asks a
//! [`ProofVerifier`] whether `(proof, pairing)` establishes a balanced match.
//! [`CommandVerifier`] shells out to the external verifier binary as
//! `<program> -v <keys_path> <proof> <pairing>` and reads exit status 0 as a
//! valid proof.

use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::VerifierConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifierError {
    #[error("Proof arguments are not valid text: {reason}")]
    InvalidArgument { reason: String },

    #[error("Failed to run verifier {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Verifier did not finish within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl VerifierError {
    /// True when the submitted proof itself is at fault
    pub fn is_request_fault(&self) -> bool {
        matches!(self, VerifierError::InvalidArgument { .. })
    }
}

/// Decide whether a proof establishes a match
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &[u8], pairing: &[u8]) -> Result<bool, VerifierError>;
}

/// Runs the external verifier binary once per call
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    config: VerifierConfig,
}

impl CommandVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }
}

fn as_text<'a>(name: &str, bytes: &'a [u8]) -> Result<&'a str, VerifierError> {
    std::str::from_utf8(bytes).map_err(|e| VerifierError::InvalidArgument {
        reason: format!("{}: {}", name, e),
    })
}

impl ProofVerifier for CommandVerifier {
    fn verify(&self, proof: &[u8], pairing: &[u8]) -> Result<bool, VerifierError> {
        let proof = as_text("proof", proof)?;
        let pairing = as_text("pairing", pairing)?;
        let spawn_error = |e: std::io::Error| VerifierError::Spawn {
            program: self.config.program.clone(),
            reason: e.to_string(),
        };

        let mut child = Command::new(&self.config.program)
            .arg("-v")
            .arg(&self.config.keys_path)
            .arg(proof)
            .arg(pairing)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_error)?;

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(spawn_error)? {
                debug!(program = %self.config.program, code = ?status.code(), "verifier finished");
                return Ok(status.success());
            }
            if started.elapsed() >= timeout {
                // Best effort; the process may already have exited
                let _ = child.kill();
                let _ = child.wait();
                warn!(
                    program = %self.config.program,
                    timeout_ms = self.config.timeout_ms,
                    "verifier timed out"
                );
                return Err(VerifierError::Timeout {
                    timeout_ms: self.config.timeout_ms,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Verifier with a fixed answer that counts its calls
#[derive(Debug, Default)]
pub struct StaticVerifier {
    accept: bool,
    calls: AtomicUsize,
}

impl StaticVerifier {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProofVerifier for StaticVerifier {
    fn verify(&self, _proof: &[u8], _pairing: &[u8]) -> Result<bool, VerifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(program: &str) -> VerifierConfig {
        VerifierConfig {
            program: program.to_string(),
            keys_path: "/tmp/keys".to_string(),
            timeout_ms: 2_000,
        }
    }

    #[test]
    fn test_static_verifier_counts_calls() {
        let verifier = StaticVerifier::accepting();
        assert_eq!(verifier.verify(b"p", b"q"), Ok(true));
        assert_eq!(StaticVerifier::rejecting().verify(b"p", b"q"), Ok(false));
        assert_eq!(verifier.calls(), 1);
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let verifier = CommandVerifier::new(config("/nonexistent/verifier-binary"));
        let result = verifier.verify(b"proof", b"pairing");
        assert!(matches!(result, Err(VerifierError::Spawn { .. })));
    }

    #[test]
    fn test_non_text_proof_is_request_fault() {
        let verifier = CommandVerifier::new(config("/nonexistent/verifier-binary"));
        let err = verifier.verify(&[0xff, 0xfe], b"pairing").unwrap_err();
        assert!(err.is_request_fault());
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_decides() {
        assert_eq!(CommandVerifier::new(config("true")).verify(b"p", b"q"), Ok(true));
        assert_eq!(CommandVerifier::new(config("false")).verify(b"p", b"q"), Ok(false));
    }
}
