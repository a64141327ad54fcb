//! Video id extraction from raw ids and the common YouTube URL shapes

use url::Url;

/// Length of every YouTube video id
const ID_LEN: usize = 11;

fn is_video_id(s: &str) -> bool {
    s.len() == ID_LEN
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Parse `s` as a URL, assuming https for scheme-less inputs like `youtu.be/ID`
fn parse_url(s: &str) -> Option<Url> {
    match Url::parse(s) {
        Ok(url) if url.has_host() => Some(url),
        _ => Url::parse(&format!("https://{s}")).ok(),
    }
}

/// Extract the 11-character id from a raw id or a watch, youtu.be, embed or
/// shorts URL.
///
/// ```
/// use commentline_youtube::extract_video_id;
/// assert_eq!(
///     extract_video_id("https://youtu.be/dQw4w9WgXcQ?t=42").as_deref(),
///     Some("dQw4w9WgXcQ")
/// );
/// ```
pub fn extract_video_id(input: &str) -> Option<String> {
    let s = input.trim();
    if is_video_id(s) {
        return Some(s.to_string());
    }

    let url = parse_url(s)?;

    // watch?v=ID
    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        if is_video_id(&v) {
            return Some(v.into_owned());
        }
    }

    // youtu.be/ID, /embed/ID, /shorts/ID
    url.path_segments()?
        .filter(|seg| !seg.is_empty())
        .last()
        .filter(|seg| is_video_id(seg))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "dQw4w9WgXcQ";

    #[test]
    fn raw_id() {
        assert_eq!(extract_video_id(ID).as_deref(), Some(ID));
        assert_eq!(extract_video_id("  dQw4w9WgXcQ \n").as_deref(), Some(ID));
    }

    #[test]
    fn url_shapes() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=10",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1",
            "https://youtube.com/shorts/dQw4w9WgXcQ",
            "youtu.be/dQw4w9WgXcQ#comments",
            "www.youtube.com/watch?v=dQw4w9WgXcQ",
        ] {
            assert_eq!(extract_video_id(url).as_deref(), Some(ID), "{url}");
        }
    }

    #[test]
    fn query_is_percent_decoded() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?%76=dQw4w9WgXcQ").as_deref(),
            Some(ID)
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/attribution_link?u=%2Fwatch&v=dQw4w9WgXcQ")
                .as_deref(),
            Some(ID)
        );
    }

    #[test]
    fn rejects_non_ids() {
        assert_eq!(extract_video_id(""), None);
        assert_eq!(extract_video_id("short"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=tooShort"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/"), None);
        assert_eq!(extract_video_id("dQw4w9WgXc!"), None);
    }
}
