use crate::error::AppError;

/// Default output file name for a playlist URL: the last path segment with
/// its extension replaced by `.ts`, truncated to a sane length.
///
/// # Examples
///
/// ```ignore
/// let name = output_name_from_url("https://example.com/show/ep1.m3u8")?;
/// assert_eq!(name, "ep1.ts");
/// ```
pub fn output_name_from_url(url_str: &str) -> Result<String, AppError> {
    let url = url_str
        .parse::<reqwest::Url>()
        .map_err(|e| AppError::InvalidInput(format!("Invalid URL '{url_str}': {e}")))?;

    let file_name = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("video");

    let stem = match file_name.rfind('.') {
        Some(pos) if pos > 0 => &file_name[..pos],
        _ => file_name,
    };

    // we dont want large filenames
    let stem: String = stem.chars().take(30).collect();
    Ok(format!("{stem}.ts"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name_from_url() {
        assert_eq!(
            output_name_from_url("https://example.com/show/ep1.m3u8?token=x").unwrap(),
            "ep1.ts"
        );
        assert_eq!(output_name_from_url("https://example.com/").unwrap(), "video.ts");
        assert_eq!(
            output_name_from_url("https://example.com/playlist").unwrap(),
            "playlist.ts"
        );
        let long = format!("https://example.com/{}.m3u8", "a".repeat(50));
        assert_eq!(output_name_from_url(&long).unwrap(), format!("{}.ts", "a".repeat(30)));
        assert!(output_name_from_url("not a url").is_err());
    }
}
