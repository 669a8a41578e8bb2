use once_cell::sync::Lazy;
use url::Url;

/// Placeholder origin used to resolve document-relative references. Never
/// leaks into results: relative references resolve to a path.
static RELATIVE_BASE: Lazy<Url> = Lazy::new(|| {
    Url::parse("https://content.invalid").expect("static base URL is valid")
});

const IGNORED_SCHEMES: &[&str] =
    &["data:", "javascript:", "mailto:", "tel:", "blob:", "about:"];

/// A reference resolved to its normalized `src`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRef {
    pub src: String,
    pub is_external: bool,
}

/// Resolves raw attribute values against the document they appear in.
#[derive(Clone, Debug)]
pub struct UrlResolver {
    content_hosts: Vec<String>,
}

impl UrlResolver {
    pub fn new(content_hosts: &[String]) -> Self {
        Self {
            content_hosts: content_hosts
                .iter()
                .map(|host| host.trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    pub fn is_content_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.content_hosts.iter().any(|known| *known == host)
    }

    /// Normalizes `raw` as found in `document_path`.
    ///
    /// Returns `None` for empty references, in-page anchors and non-fetchable
    /// schemes. Absolute `http(s)` URLs pass through without their fragment,
    /// protocol-relative ones gain `https:`, everything else resolves to an
    /// absolute path (plus query) relative to the document.
    pub fn resolve(&self, document_path: &str, raw: &str) -> Option<ResolvedRef> {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            return None;
        }
        let lower = raw.to_ascii_lowercase();
        if IGNORED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            return None;
        }

        if let Some(rest) = raw.strip_prefix("//") {
            return self.absolute(&format!("https://{rest}"));
        }
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return self.absolute(raw);
        }
        if has_scheme(raw) {
            return None;
        }

        let document = RELATIVE_BASE.join(document_path).ok()?;
        let resolved = document.join(raw).ok()?;
        let mut src = resolved.path().to_string();
        if let Some(query) = resolved.query() {
            src.push('?');
            src.push_str(query);
        }
        Some(ResolvedRef {
            src,
            is_external: false,
        })
    }

    fn absolute(&self, raw: &str) -> Option<ResolvedRef> {
        let mut url = Url::parse(raw).ok()?;
        url.set_fragment(None);
        let host = url.host_str()?.to_string();
        Some(ResolvedRef {
            src: url.to_string(),
            is_external: !self.is_content_host(&host),
        })
    }
}

/// `scheme:` prefix per RFC 3986 (letter followed by letters, digits, `+-.`).
fn has_scheme(raw: &str) -> bool {
    let Some((scheme, _)) = raw.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
