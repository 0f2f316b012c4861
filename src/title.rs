// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Derive a human-readable title from a server-issued podcast filename
///
/// Strips a known audio extension, turns `_` and `-` into spaces and
/// collapses runs of whitespace. Falls back to the raw filename when nothing
/// readable is left.
pub fn display_title(filename: &str) -> String {
    let stem = strip_audio_extension(filename);

    let spaced: String = stem
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();

    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        filename.to_string()
    } else {
        collapsed
    }
}

fn strip_audio_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && is_audio_extension(ext) => stem,
        _ => filename,
    }
}

/// Check if a string is a known audio file extension
pub fn is_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}
