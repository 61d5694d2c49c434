use crate::cdx::normalize::WILDCARD;

const OCTET_STREAM: &str = "application/octet-stream";

/// Top-level media types registered by RFC 2046.
const REGISTERED_MAIN_TYPES: [&str; 7] = [
    "application",
    "audio",
    "image",
    "message",
    "multipart",
    "text",
    "video",
];

const FORBIDDEN: &str = "<>@,:;?.=][()\\\"/";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentTypeOptions {
    pub main_type_only: bool,
    pub ascii_prefix: bool,
    pub rfc: bool,
}

fn has_forbidden(token: &str) -> bool {
    token
        .chars()
        .any(|c| c.is_control() || c == ' ' || FORBIDDEN.contains(c))
}

fn ascii_prefix(value: &str) -> &str {
    let end = value
        .find(|c: char| !(' '..='~').contains(&c))
        .unwrap_or(value.len());
    &value[..end]
}

/// Reduces a media type to a registered (or `x-` experimental) main type and
/// a token-safe sub-type, falling back to `application/octet-stream`.
pub fn rfc_clean(value: &str) -> String {
    let (main, sub) = match value.split_once('/') {
        Some((main, sub)) => (main, Some(sub)),
        None => (value, None),
    };

    let main_ok = REGISTERED_MAIN_TYPES.contains(&main)
        || (main.starts_with("x-") && !has_forbidden(main));

    let mut out = String::new();
    if main_ok {
        out.push_str(main);
        if let Some(sub) = sub.filter(|s| !s.is_empty() && !has_forbidden(s)) {
            out.push('/');
            out.push_str(sub);
        }
    }

    if out.starts_with(OCTET_STREAM) || out.is_empty() {
        return OCTET_STREAM.to_string();
    }
    out
}

/// Replaces anything that could be mistaken for an output field separator.
pub fn protect_delimiters(value: &str) -> String {
    value.replace('\t', ";").replace(", ", ";")
}

pub fn canonical_content_type(raw: &str, opts: ContentTypeOptions) -> String {
    if raw == WILDCARD {
        return raw.to_string();
    }
    let mut value = if raw.is_empty() {
        "-".to_string()
    } else {
        raw.to_lowercase()
    };
    if opts.main_type_only
        && let Some((main, _)) = value.split_once('/')
    {
        value = main.to_string();
    }
    if opts.ascii_prefix {
        value = ascii_prefix(&value).to_string();
    }
    if opts.rfc {
        value = rfc_clean(&value);
    }
    protect_delimiters(&value)
}

#[cfg(test)]
mod tests {
    use super::{ContentTypeOptions, canonical_content_type, rfc_clean};

    #[test]
    fn registered_types_survive() {
        assert_eq!(rfc_clean("text/html"), "text/html");
        assert_eq!(rfc_clean("image/svg+xml"), "image/svg+xml");
        assert_eq!(rfc_clean("x-world/x-vrml"), "x-world/x-vrml");
    }

    #[test]
    fn unregistered_main_type_falls_back_to_octet_stream() {
        assert_eq!(rfc_clean("foo/bar"), "application/octet-stream");
        assert_eq!(rfc_clean(""), "application/octet-stream");
        assert_eq!(rfc_clean("x-a b/c"), "application/octet-stream");
        assert_eq!(rfc_clean("Text/html"), "application/octet-stream");
    }

    #[test]
    fn invalid_sub_type_is_cleared_not_truncated() {
        assert_eq!(rfc_clean("text/html; charset=utf-8"), "text");
        assert_eq!(rfc_clean("image/"), "image");
        assert_eq!(rfc_clean("application/a/b"), "application");
    }

    #[test]
    fn octet_stream_garbage_collapses() {
        assert_eq!(
            rfc_clean("application/octet-streamxyz"),
            "application/octet-stream"
        );
    }

    #[test]
    fn rfc_clean_is_idempotent() {
        for raw in [
            "text/html",
            "text/html; charset=utf-8",
            "foo",
            "x-foo/b(a)r",
            "application/octet-stream-ish",
            "video/",
            "\u{1}/x",
        ] {
            let once = rfc_clean(raw);
            assert_eq!(rfc_clean(&once), once, "raw={raw:?}");
        }
    }

    #[test]
    fn canonical_defaults_lowercases_and_protects_delimiters() {
        let opts = ContentTypeOptions::default();
        assert_eq!(canonical_content_type("", opts), "-");
        assert_eq!(canonical_content_type("Text/HTML", opts), "text/html");
        assert_eq!(
            canonical_content_type("text/html, charset\tx", opts),
            "text/html;charset;x"
        );
        assert_eq!(canonical_content_type("*", opts), "*");
    }

    #[test]
    fn empty_value_still_goes_through_the_rfc_cleaner() {
        let rfc = ContentTypeOptions {
            rfc: true,
            ..Default::default()
        };
        assert_eq!(canonical_content_type("", rfc), "application/octet-stream");
        let main_only = ContentTypeOptions {
            main_type_only: true,
            ..Default::default()
        };
        assert_eq!(canonical_content_type("", main_only), "-");
    }

    #[test]
    fn canonical_modes_apply_in_order() {
        let main_only = ContentTypeOptions {
            main_type_only: true,
            ..Default::default()
        };
        assert_eq!(canonical_content_type("image/png", main_only), "image");

        let ascii = ContentTypeOptions {
            ascii_prefix: true,
            ..Default::default()
        };
        assert_eq!(canonical_content_type("text/html\u{7f}junk", ascii), "text/html");
        assert_eq!(canonical_content_type("text/plé", ascii), "text/pl");

        let rfc = ContentTypeOptions {
            rfc: true,
            ..Default::default()
        };
        assert_eq!(canonical_content_type("Bogus", rfc), "application/octet-stream");
    }
}
