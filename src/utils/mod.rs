//! Common utilities shared across the pipeline

pub mod retry;

use std::sync::OnceLock;

use regex::Regex;

/// Extract a filename from a Content-Disposition header value.
///
/// Some archive responses wrap the filename in quotation marks; strip them.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    static FILENAME_RE: OnceLock<Regex> = OnceLock::new();

    let re = FILENAME_RE.get_or_init(|| Regex::new(r"filename=(.+)").expect("Invalid regex pattern"));

    re.captures(value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace('"', ""))
}

/// Fall back to parsing a filename out of a download URL.
///
/// Typical URL:
/// https://www.cadc-ccda.hia-iha.nrc-cnrc.gc.ca/data/pub/GEM/N20140505S0114.fits?RUNID=mf731ukqsipqpdgk
pub fn filename_from_url(url: &str) -> Option<String> {
    let last = url.rsplit('/').next()?;
    let name = last.split('?').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition("attachment; filename=N20140505S0114.fits").as_deref(),
            Some("N20140505S0114.fits")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=\"N20140505S0114.fits\"").as_deref(),
            Some("N20140505S0114.fits")
        );
        assert_eq!(filename_from_disposition("attachment"), None);
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url(
                "https://example.org/data/pub/GEM/N20140505S0114.fits?RUNID=mf731ukqsipqpdgk"
            )
            .as_deref(),
            Some("N20140505S0114.fits")
        );
        assert_eq!(filename_from_url("https://example.org/data/"), None);
    }
}
