use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHtml {
    pub html: String,
    pub encoding_label: String,
    /// Some bytes were replaced with U+FFFD.
    pub lossy: bool,
}

/// Decode a listing page into UTF-8 using: BOM -> Content-Type charset -> chardetng guess.
///
/// Malformed sequences are replaced rather than rejected; hrefs are
/// usually percent-encoded ASCII, so a lossy decode still yields links.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>, source: Option<&Url>) -> DecodedHtml {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(label) = content_type.and_then(extract_charset) {
        if let Some(enc) = Encoding::for_label(label.as_bytes()) {
            return decode_with(bytes, enc);
        }
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let tld = source.and_then(top_level_domain);
    let enc = detector.guess(tld.as_deref().map(str::as_bytes), true);
    decode_with(bytes, enc)
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches(['"', '\'']).to_string())
        } else {
            None
        }
    })
}

fn top_level_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let tld = host.rsplit('.').next()?;
    if tld.is_empty() || tld.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(tld.to_ascii_lowercase())
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> DecodedHtml {
    let (text, actual, had_errors) = enc.decode(bytes);
    DecodedHtml {
        html: text.into_owned(),
        encoding_label: actual.name().to_string(),
        lossy: had_errors,
    }
}
