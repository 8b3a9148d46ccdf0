/// URL detection for plain text messages.
use once_cell::sync::Lazy;
use regex::Regex;

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s<>\[\](){},"']+"#).unwrap()
});

/// First http(s) URL in the text, if any.
pub fn find_url(text: &str) -> Option<&str> {
    URL_RE.find(text).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_url() {
        let text = "check this https://youtu.be/abc and https://example.com";
        assert_eq!(find_url(text), Some("https://youtu.be/abc"));
    }

    #[test]
    fn plain_text_has_no_url() {
        assert_eq!(find_url("hello there"), None);
    }

    #[test]
    fn url_stops_at_whitespace() {
        assert_eq!(
            find_url("https://example.com/watch?v=x rest"),
            Some("https://example.com/watch?v=x")
        );
    }
}
