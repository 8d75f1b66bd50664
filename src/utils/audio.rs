/// Media type every synthesized clip is re-tagged to when nothing better is known.
pub const DEFAULT_AUDIO_TYPE: &str = "audio/mpeg";

/// Strips parameters (`; charset=...`) and lowercases a Content-Type value.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Whether a 2xx response with this Content-Type may carry audio bytes.
/// `application/octet-stream` and a missing header are accepted and sniffed later.
pub fn is_audio_content_type(content_type: Option<&str>) -> bool {
    match content_type.map(essence) {
        None => true,
        Some(t) if t.is_empty() => true,
        Some(t) => t.starts_with("audio/") || t == "application/octet-stream",
    }
}

fn alias(media_type: &str) -> Option<&'static str> {
    match media_type {
        "audio/mpeg" | "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg" | "audio/x-mp3" => {
            Some("audio/mpeg")
        }
        "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Some("audio/wav"),
        "audio/ogg" | "audio/opus" | "audio/x-ogg" => Some("audio/ogg"),
        "audio/flac" | "audio/x-flac" => Some("audio/flac"),
        "audio/aac" | "audio/x-aac" => Some("audio/aac"),
        "audio/webm" => Some("audio/webm"),
        _ => None,
    }
}

/// Guesses the container from the first bytes of the payload.
pub fn sniff(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return Some("audio/wav");
    }
    if bytes.starts_with(b"OggS") {
        return Some("audio/ogg");
    }
    if bytes.starts_with(b"fLaC") {
        return Some("audio/flac");
    }
    if bytes.starts_with(b"ID3") {
        return Some("audio/mpeg");
    }
    // MPEG audio frame sync: 11 set bits. ADTS AAC shares the sync word but has layer bits 00.
    if bytes.len() >= 2 && bytes[0] == 0xFF && (bytes[1] & 0xE0) == 0xE0 {
        if (bytes[1] & 0x06) == 0 {
            return Some("audio/aac");
        }
        return Some("audio/mpeg");
    }
    None
}

/// Picks the media type a player should be told about.
///
/// Known aliases of the declared type win, then magic bytes, then `audio/mpeg`.
/// Players are picky about non-standard names like `audio/mp3`, so the declared
/// type is never passed through unless it is a recognised one.
pub fn canonical_media_type(content_type: Option<&str>, bytes: &[u8]) -> &'static str {
    if let Some(known) = content_type.map(essence).as_deref().and_then(alias) {
        return known;
    }
    sniff(bytes).unwrap_or(DEFAULT_AUDIO_TYPE)
}

/// File extension used when exporting a clip of the given media type.
pub fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "audio/wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        "audio/aac" => "aac",
        "audio/webm" => "webm",
        _ => "mp3",
    }
}
