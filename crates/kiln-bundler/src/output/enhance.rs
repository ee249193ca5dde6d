//! Hash and compressed-size telemetry.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::OutputArtifact;

/// SHA-256 hex digest of `content`.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Gzip size at the default level, or `None` when compression fails.
pub fn gzip_size(content: &[u8]) -> Option<u64> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(content.len() / 2), Compression::default());
    encoder.write_all(content).ok()?;
    encoder.finish().ok().map(|buf| buf.len() as u64)
}

/// Fill in size, hash and gzip size. Gzip failures report 0.
pub fn enhance(artifact: &mut OutputArtifact) {
    enhance_with(artifact, gzip_size);
}

/// [`enhance`] with a custom compressed-size measure.
pub fn enhance_with(artifact: &mut OutputArtifact, compressed_size: fn(&[u8]) -> Option<u64>) {
    let bytes = artifact.bytes();
    let (size, hash, gzip) = (bytes.len() as u64, content_hash(bytes), compressed_size(bytes));
    artifact.size = size;
    artifact.hash = hash;
    artifact.gzip_size = gzip.unwrap_or_else(|| {
        debug!(file = %artifact.file_name, "gzip size unavailable");
        0
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::OutputFormat;

    #[test]
    fn hash_depends_only_on_content() {
        let mut a = OutputArtifact::chunk("es/a.js", OutputFormat::Esm, "export const a = 1;");
        let mut b = OutputArtifact::chunk("cjs/b.js", OutputFormat::Cjs, "export const a = 1;");
        enhance(&mut a);
        enhance(&mut b);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);

        let mut c = OutputArtifact::chunk("es/a.js", OutputFormat::Esm, "export const a = 2;");
        enhance(&mut c);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn gzip_shrinks_repetitive_content() {
        let content = "abc".repeat(1000);
        let gz = gzip_size(content.as_bytes()).unwrap();
        assert!(gz > 0 && gz < content.len() as u64);
    }

    #[test]
    fn failed_compression_reports_zero() {
        let mut chunk = OutputArtifact::chunk("es/index.js", OutputFormat::Esm, "export const a = 1;");
        enhance_with(&mut chunk, |_| None);
        assert_eq!(chunk.gzip_size, 0);
        assert_eq!(chunk.size, 19);
        assert_eq!(chunk.hash, content_hash(b"export const a = 1;"));
    }

    #[test]
    fn empty_artifact_still_enhances() {
        let mut empty = OutputArtifact::asset("es/empty.css", OutputFormat::Esm, Vec::new());
        enhance(&mut empty);
        assert_eq!(empty.size, 0);
        assert_eq!(empty.hash, content_hash(b""));
    }
}
