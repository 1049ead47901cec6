//! Extension → media type lookup.
//!
//! When several types claim an extension the most "official" one wins:
//! score = facet + source + top-level type + a small bonus for shorter names.
//! `application/octet-stream` always scores zero so any specific type beats it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy)]
enum Source {
    Iana,
    Apache,
    Nginx,
    Unknown,
}

struct Entry {
    essence: &'static str,
    source: Source,
    charset: Option<&'static str>,
    extensions: &'static [&'static str],
}

const fn entry(
    essence: &'static str,
    source: Source,
    charset: Option<&'static str>,
    extensions: &'static [&'static str],
) -> Entry {
    Entry {
        essence,
        source,
        charset,
        extensions,
    }
}

use Source::{Apache, Iana, Nginx, Unknown};

const UTF8: Option<&str> = Some("UTF-8");

static DATABASE: &[Entry] = &[
    entry("application/epub+zip", Iana, None, &["epub"]),
    entry("application/font-woff", Iana, None, &["woff"]),
    entry("application/gzip", Iana, None, &["gz"]),
    entry("application/javascript", Iana, UTF8, &["js", "mjs"]),
    entry("application/json", Iana, UTF8, &["json", "map"]),
    entry("application/ld+json", Iana, None, &["jsonld"]),
    entry("application/manifest+json", Iana, UTF8, &["webmanifest"]),
    entry("application/mp4", Iana, None, &["mp4", "mpg4", "mp4s", "m4p"]),
    entry("application/msword", Iana, None, &["doc", "dot"]),
    entry(
        "application/octet-stream",
        Iana,
        None,
        &["bin", "dms", "lrf", "mar", "so", "dist", "distz", "pkg", "bpk", "dump", "elc", "deploy", "exe", "dll", "deb", "dmg", "iso", "img", "msi", "msp", "msm", "buffer"],
    ),
    entry("application/pdf", Iana, None, &["pdf"]),
    entry("application/rtf", Iana, None, &["rtf"]),
    entry("application/toml", Unknown, None, &["toml"]),
    entry("application/vnd.ms-excel", Iana, None, &["xls", "xlm", "xla", "xlc", "xlt", "xlw"]),
    entry(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Iana,
        None,
        &["xlsx"],
    ),
    entry(
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Iana,
        None,
        &["docx"],
    ),
    entry("application/wasm", Iana, None, &["wasm"]),
    entry("application/x-7z-compressed", Apache, None, &["7z"]),
    entry("application/x-msdownload", Apache, None, &["exe", "dll", "com", "bat", "msi"]),
    entry("application/x-sh", Apache, None, &["sh"]),
    entry("application/x-tar", Apache, None, &["tar"]),
    entry("application/xml", Iana, None, &["xml", "xsl", "xsd", "rng"]),
    entry("application/zip", Iana, None, &["zip"]),
    entry("audio/mp3", Unknown, None, &["mp3"]),
    entry("audio/mp4", Iana, None, &["m4a", "mp4a"]),
    entry("audio/mpeg", Iana, None, &["mpga", "mp2", "mp2a", "mp3", "m2a", "m3a"]),
    entry("audio/ogg", Iana, None, &["oga", "ogg", "spx", "opus"]),
    entry("audio/wav", Unknown, None, &["wav"]),
    entry("audio/wave", Unknown, None, &["wav"]),
    entry("audio/webm", Apache, None, &["weba"]),
    entry("audio/x-wav", Apache, None, &["wav"]),
    entry("font/otf", Iana, None, &["otf"]),
    entry("font/ttf", Iana, None, &["ttf"]),
    entry("font/woff", Iana, None, &["woff"]),
    entry("font/woff2", Iana, None, &["woff2"]),
    entry("image/avif", Unknown, None, &["avif"]),
    entry("image/bmp", Iana, None, &["bmp"]),
    entry("image/gif", Iana, None, &["gif"]),
    entry("image/jpeg", Iana, None, &["jpeg", "jpg", "jpe"]),
    entry("image/png", Iana, None, &["png"]),
    entry("image/svg+xml", Iana, None, &["svg", "svgz"]),
    entry("image/tiff", Iana, None, &["tif", "tiff"]),
    entry("image/vnd.microsoft.icon", Iana, None, &["ico"]),
    entry("image/webp", Iana, None, &["webp"]),
    entry("image/x-icon", Apache, None, &["ico"]),
    entry("image/x-ms-bmp", Nginx, None, &["bmp"]),
    entry("text/calendar", Iana, None, &["ics", "ifb"]),
    entry("text/css", Iana, UTF8, &["css"]),
    entry("text/csv", Iana, None, &["csv"]),
    entry("text/html", Iana, None, &["html", "htm", "shtml"]),
    entry("text/markdown", Iana, None, &["md", "markdown"]),
    entry("text/plain", Iana, None, &["txt", "text", "conf", "def", "list", "log", "in", "ini"]),
    entry("text/rtf", Iana, None, &["rtf"]),
    entry("text/vtt", Iana, UTF8, &["vtt"]),
    entry("text/xml", Iana, None, &["xml"]),
    entry("text/yaml", Unknown, None, &["yaml", "yml"]),
    entry("video/mp4", Iana, None, &["mp4", "mp4v", "mpg4"]),
    entry("video/mpeg", Iana, None, &["mpeg", "mpg", "mpe", "m1v", "m2v"]),
    entry("video/ogg", Iana, None, &["ogv"]),
    entry("video/quicktime", Iana, None, &["qt", "mov"]),
    entry("video/webm", Apache, None, &["webm"]),
    entry("video/x-msvideo", Apache, None, &["avi"]),
];

static BY_EXTENSION: LazyLock<HashMap<&'static str, &'static Entry>> = LazyLock::new(|| {
    let mut map: HashMap<&'static str, &'static Entry> = HashMap::new();
    for entry in DATABASE {
        for ext in entry.extensions {
            let keep = map
                .get(ext)
                .is_some_and(|existing| score(existing) >= score(entry));
            if !keep {
                map.insert(*ext, entry);
            }
        }
    }
    map
});

/// How "official" a media type is. Higher wins.
fn score(entry: &Entry) -> f64 {
    if entry.essence == "application/octet-stream" {
        return 0.0;
    }

    let (top, subtype) = entry.essence.split_once('/').unwrap_or((entry.essence, ""));

    let facet = match subtype.find('.').into_iter().chain(subtype.find("x-")).min() {
        Some(i) if subtype[i..].starts_with("x-") => &subtype[..i + 2],
        Some(i) => &subtype[..i + 1],
        None => subtype,
    };
    let facet_score = match facet {
        "prs." => 100.0,
        "x-" => 200.0,
        "x." => 300.0,
        "vnd." => 400.0,
        _ => 900.0,
    };
    let source_score = match entry.source {
        Source::Nginx => 10.0,
        Source::Apache => 20.0,
        Source::Iana => 40.0,
        Source::Unknown => 30.0,
    };
    let type_score = match top {
        "application" => 1.0,
        "font" | "audio" => 2.0,
        "video" => 3.0,
        _ => 0.0,
    };
    let length_score = 1.0 - entry.essence.len() as f64 / 100.0;

    facet_score + source_score + type_score + length_score
}

/// Full `Content-Type` value for `extension`, with a charset where one applies.
pub fn content_type_for_extension(extension: &str) -> Option<String> {
    let entry = BY_EXTENSION.get(extension.to_ascii_lowercase().as_str())?;

    let charset = entry
        .charset
        .or_else(|| entry.essence.starts_with("text/").then_some("UTF-8"));
    Some(match charset {
        Some(charset) => format!("{}; charset={}", entry.essence, charset.to_ascii_lowercase()),
        None => entry.essence.to_string(),
    })
}

/// `Content-Type` for a file path, by its extension.
pub fn content_type_for_path(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(content_type_for_extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_types_get_utf8() {
        assert_eq!(
            content_type_for_extension("html").as_deref(),
            Some("text/html; charset=utf-8")
        );
        assert_eq!(
            content_type_for_extension("json").as_deref(),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(content_type_for_extension("png").as_deref(), Some("image/png"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(content_type_for_extension("PNG").as_deref(), Some("image/png"));
    }

    #[test]
    fn test_official_type_wins() {
        assert_eq!(content_type_for_extension("xml").as_deref(), Some("application/xml"));
        assert_eq!(content_type_for_extension("mp4").as_deref(), Some("video/mp4"));
        assert_eq!(content_type_for_extension("woff").as_deref(), Some("font/woff"));
        assert_eq!(content_type_for_extension("wav").as_deref(), Some("audio/wav"));
        assert_eq!(content_type_for_extension("ico").as_deref(), Some("image/vnd.microsoft.icon"));
        assert_eq!(content_type_for_extension("exe").as_deref(), Some("application/x-msdownload"));
        assert_eq!(content_type_for_extension("rtf").as_deref(), Some("application/rtf"));
    }

    #[test]
    fn test_unknown_extension() {
        assert!(content_type_for_extension("nope").is_none());
        assert!(content_type_for_path(Path::new("Makefile")).is_none());
    }
}
