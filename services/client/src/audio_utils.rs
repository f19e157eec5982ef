use std::path::{Path, PathBuf};

use base64::Engine;

/// Recorded speech ready to be sent for transcription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub base64: String,
    pub mime: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("could not read audio file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("audio file {} is empty", .0.display())]
    Empty(PathBuf),
}

/// Detects the container format from the leading bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some("audio/wav"),
        [b'O', b'g', b'g', b'S', ..] => Some("audio/ogg"),
        [0x1A, 0x45, 0xDF, 0xA3, ..] => Some("audio/webm"),
        [b'I', b'D', b'3', ..] | [0xFF, 0xFB | 0xF3 | 0xF2, ..] => Some("audio/mpeg"),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some("audio/mp4"),
        _ => None,
    }
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "wav" => Some("audio/wav"),
        "ogg" | "oga" | "opus" => Some("audio/ogg"),
        "webm" => Some("audio/webm"),
        "mp3" => Some("audio/mpeg"),
        "m4a" | "mp4" => Some("audio/mp4"),
        _ => None,
    }
}

/// Encodes raw audio bytes, preferring the sniffed format over the extension.
pub fn encode_clip(bytes: &[u8], path: &Path) -> Result<AudioClip, AudioError> {
    if bytes.is_empty() {
        return Err(AudioError::Empty(path.to_path_buf()));
    }
    let mime = sniff_mime(bytes)
        .or_else(|| mime_from_extension(path))
        .ok_or_else(|| AudioError::UnsupportedFormat(path.display().to_string()))?;
    Ok(AudioClip {
        base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        mime: mime.to_string(),
    })
}

/// Reads an audio file into a clip for `speech_to_text_input`.
pub async fn load_audio_clip(path: impl AsRef<Path>) -> Result<AudioClip, AudioError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|source| AudioError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    encode_clip(&bytes, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sniff_known_containers() {
        assert_eq!(sniff_mime(b"RIFF\x24\x00\x00\x00WAVEfmt "), Some("audio/wav"));
        assert_eq!(sniff_mime(b"OggS\x00\x02"), Some("audio/ogg"));
        assert_eq!(sniff_mime(&[0x1A, 0x45, 0xDF, 0xA3, 0x01]), Some("audio/webm"));
        assert_eq!(sniff_mime(b"ID3\x04\x00"), Some("audio/mpeg"));
        assert_eq!(sniff_mime(b"\x00\x00\x00\x20ftypM4A "), Some("audio/mp4"));
        assert_eq!(sniff_mime(b"hello"), None);
        assert_eq!(sniff_mime(b""), None);
    }

    #[test]
    fn test_extension_fallback() {
        let clip = encode_clip(b"\x01\x02\x03", Path::new("take.MP3")).unwrap();
        assert_eq!(clip.mime, "audio/mpeg");
        assert_eq!(clip.base64, "AQID");

        let err = encode_clip(b"\x01\x02\x03", Path::new("notes.txt")).unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_load_audio_clip_from_file() {
        let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        file.write_all(b"OggS\x00\x02\x00\x00").unwrap();

        let clip = load_audio_clip(file.path()).await.unwrap();
        assert_eq!(clip.mime, "audio/ogg");
        assert!(!clip.base64.is_empty());
    }

    #[tokio::test]
    async fn test_load_audio_clip_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = load_audio_clip(dir.path().join("missing.wav")).await;
        assert!(matches!(missing, Err(AudioError::Read { .. })));

        let empty_path = dir.path().join("empty.wav");
        std::fs::write(&empty_path, b"").unwrap();
        let empty = load_audio_clip(&empty_path).await;
        assert!(matches!(empty, Err(AudioError::Empty(_))));
    }
}
