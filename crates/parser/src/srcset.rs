//! `srcset` candidate splitting.
//!
//! Candidates are separated by commas, but a URL may itself contain commas
//! (image-proxy option lists such as `w=1920,format=auto`). A comma inside a
//! URL token ends the candidate unless the text after it reads as another
//! `key=value` option. Whitespace always ends the URL token.

use std::ops::Range;

/// Byte ranges of each candidate URL within `srcset`.
pub fn candidate_ranges(srcset: &str) -> Vec<Range<usize>> {
    let bytes = srcset.as_bytes();
    let mut ranges = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b',') {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }

        let start = pos;
        let mut ended_by_comma = false;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
            if bytes[pos] == b',' && !continues_options(&bytes[pos + 1..]) {
                ended_by_comma = true;
                break;
            }
            pos += 1;
        }
        if pos > start {
            ranges.push(start..pos);
        }

        if !ended_by_comma {
            // Skip descriptors up to the next separator.
            while pos < bytes.len() && bytes[pos] != b',' {
                pos += 1;
            }
        }
    }

    ranges
}

/// True when the text after a comma is an option like `format=auto`.
fn continues_options(rest: &[u8]) -> bool {
    rest.iter()
        .take_while(|&&b| !b.is_ascii_whitespace() && b != b',' && b != b'/')
        .any(|&b| b == b'=')
}

/// The URL token of each candidate.
pub fn candidates(srcset: &str) -> impl Iterator<Item = &str> {
    candidate_ranges(srcset)
        .into_iter()
        .map(move |range| &srcset[range])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_srcset() {
        let urls: Vec<_> = candidates("a.png 1x, b.png 2x").collect();
        assert_eq!(urls, vec!["a.png", "b.png"]);
    }

    #[test]
    fn test_width_descriptors_and_no_spaces() {
        let urls: Vec<_> = candidates("small.jpg 480w,large.jpg 1080w").collect();
        assert_eq!(urls, vec!["small.jpg", "large.jpg"]);
    }

    #[test]
    fn test_comma_inside_url() {
        let urls: Vec<_> =
            candidates("/cdn-cgi/image/w=640,format=auto/files/a.png 640w, /files/b.png 1x").collect();
        assert_eq!(
            urls,
            vec!["/cdn-cgi/image/w=640,format=auto/files/a.png", "/files/b.png"]
        );
    }

    #[test]
    fn test_comma_without_descriptor() {
        let urls: Vec<_> = candidates("a.png,b.png").collect();
        assert_eq!(urls, vec!["a.png", "b.png"]);

        let urls: Vec<_> = candidates("/a.png,/b.png 2x,https://cdn.example.com/c.png").collect();
        assert_eq!(urls, vec!["/a.png", "/b.png", "https://cdn.example.com/c.png"]);

        let urls: Vec<_> = candidates("a.png, b.png").collect();
        assert_eq!(urls, vec!["a.png", "b.png"]);
    }

    #[test]
    fn test_option_list_without_descriptor() {
        let urls: Vec<_> =
            candidates("/cdn-cgi/image/w=320,fit=cover/files/a.png,/files/b.png").collect();
        assert_eq!(urls, vec!["/cdn-cgi/image/w=320,fit=cover/files/a.png", "/files/b.png"]);
    }

    #[test]
    fn test_empty() {
        assert!(candidate_ranges("").is_empty());
        assert!(candidate_ranges(" , ,").is_empty());
    }

    #[test]
    fn test_ranges_slice_back() {
        let srcset = "  x.png 1x ,y.png 2x";
        let ranges = candidate_ranges(srcset);
        assert_eq!(&srcset[ranges[0].clone()], "x.png");
        assert_eq!(&srcset[ranges[1].clone()], "y.png");
    }
}
