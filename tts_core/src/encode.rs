use base64::{engine::general_purpose, Engine as _};

/// MIME type for a provider output format such as `mp3_44100_128`.
pub fn content_type_for(output_format: &str) -> &'static str {
    match output_format.split('_').next().unwrap_or_default() {
        "mp3" => "audio/mpeg",
        "pcm" => "audio/pcm",
        "ulaw" => "audio/basic",
        "opus" => "audio/opus",
        _ => "application/octet-stream",
    }
}

/// Encode aggregated audio as Base64 for JSON transport.
pub fn encode_audio_base64(audio: &[u8]) -> String {
    general_purpose::STANDARD.encode(audio)
}
