//! Reference Identity
//!
//! A `$ref` leaf is keyed by `"$ref" + target`. Equal keys denote one shared
//! resource and collapse into a single node, which is what lets cycles
//! appear once references are resolved.
//!
//! Targets are classified as local fragment pointers, URLs naming the
//! document itself, remote URLs, or malformed strings. Relative references
//! are joined against the document base (`$id`, or the URL a document was
//! fetched from) before classification so that the same resource reached
//! through different spellings gets one identity.

use url::{ParseError, Url};

use super::node::REF_KEYWORD;

/// Canonical key identifying a `$ref` target for merge/sharing purposes
pub type RefIdentity = String;

/// Classified reference target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    /// `#...` pointer into the current document
    Local { fragment: String },
    /// URL naming the current document, with its fragment (`#` if none)
    SelfUrl { fragment: String },
    /// Another document; fragment still attached
    Remote { url: Url },
    /// Unusable target string
    Malformed { reason: String },
}

/// Canonical spelling of a target: fragments verbatim, URLs normalized and
/// made absolute against `base` when possible. A URL naming the base
/// document itself collapses to its fragment.
pub fn canonical_target(raw: &str, base: Option<&Url>) -> String {
    if raw.is_empty() || raw.starts_with('#') {
        return raw.to_string();
    }
    let absolute = match Url::parse(raw) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) => match base.and_then(|b| b.join(raw).ok()) {
            Some(url) => url,
            None => return raw.to_string(),
        },
        Err(_) => return raw.to_string(),
    };
    match base {
        Some(b) if without_fragment(&absolute) == *b => fragment_of(&absolute),
        _ => absolute.to_string(),
    }
}

/// Local identity for a URL identity that names the document at `base`
pub fn self_alias(identity: &str, base: Option<&Url>) -> Option<RefIdentity> {
    let base = base?;
    let target = identity_target(identity);
    if target.starts_with('#') {
        return None;
    }
    let url = Url::parse(target).ok()?;
    (without_fragment(&url) == *base).then(|| local_identity(&fragment_of(&url)))
}

/// Identity key for a `$ref` target
pub fn identity_key(raw: &str, base: Option<&Url>) -> RefIdentity {
    format!("{}{}", REF_KEYWORD, canonical_target(raw, base))
}

/// Identity key of a local fragment target
pub fn local_identity(fragment: &str) -> RefIdentity {
    format!("{}{}", REF_KEYWORD, fragment)
}

/// Target text carried by an identity key
pub fn identity_target(identity: &str) -> &str {
    identity.strip_prefix(REF_KEYWORD).unwrap_or(identity)
}

/// Parse an `$id` value into a base URL, dropping any fragment.
///
/// Only absolute ids produce a base; relative ids cannot anchor anything.
pub fn base_from_id(id: &str) -> Option<Url> {
    Url::parse(id).ok().map(|u| without_fragment(&u))
}

pub fn without_fragment(url: &Url) -> Url {
    let mut doc = url.clone();
    doc.set_fragment(None);
    doc
}

/// Fragment of a URL in `#...` form (`#` when absent)
pub fn fragment_of(url: &Url) -> String {
    format!("#{}", url.fragment().unwrap_or(""))
}

/// Classify a raw `$ref` string.
///
/// `own` lists the fragment-free URLs under which the current document is
/// known (its `$id`, and for fetched documents the fetch URL).
pub fn classify(raw: &str, base: Option<&Url>, own: &[Url]) -> RefTarget {
    if raw.is_empty() {
        return RefTarget::Malformed { reason: "empty reference".to_string() };
    }
    if raw.starts_with('#') {
        return RefTarget::Local { fragment: raw.to_string() };
    }

    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) => match base.map(|b| b.join(raw)) {
            Some(Ok(url)) => url,
            Some(Err(e)) => return RefTarget::Malformed { reason: e.to_string() },
            None => {
                return RefTarget::Malformed {
                    reason: "relative reference in a document without an absolute $id".to_string(),
                }
            }
        },
        Err(e) => return RefTarget::Malformed { reason: e.to_string() },
    };

    let document = without_fragment(&url);
    if own.iter().any(|o| *o == document) {
        return RefTarget::SelfUrl { fragment: fragment_of(&url) };
    }

    match url.scheme() {
        "http" | "https" | "file" => RefTarget::Remote { url },
        other => RefTarget::Malformed { reason: format!("unsupported scheme '{}'", other) },
    }
}

/// Split a `#/a/b` fragment into unescaped pointer components.
///
/// `#` (or an empty string) is the document root and yields no components.
/// Plain-name fragments (`#foo`, anchors) are not pointers and yield `None`.
pub fn pointer_components(fragment: &str) -> Option<Vec<String>> {
    let path = fragment.strip_prefix('#').unwrap_or(fragment);
    if path.is_empty() {
        return Some(Vec::new());
    }
    let path = path.strip_prefix('/')?;
    Some(path.split('/').map(unescape_component).collect())
}

/// JSON-pointer unescaping: `~1` is `/`, `~0` is `~`
pub fn unescape_component(component: &str) -> String {
    component.replace("~1", "/").replace("~0", "~")
}

pub fn escape_component(name: &str) -> String {
    name.replace('~', "~0").replace('/', "~1")
}

/// First-level section named by a local fragment (`#/definitions/x` →
/// `definitions`), plus the number of components below it.
pub fn definition_section(fragment: &str) -> Option<(String, usize)> {
    let components = pointer_components(fragment)?;
    let (section, rest) = components.split_first()?;
    Some((section.clone(), rest.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_classify_local() {
        assert_eq!(
            classify("#/definitions/a", None, &[]),
            RefTarget::Local { fragment: "#/definitions/a".into() }
        );
    }

    #[test]
    fn test_classify_self_url() {
        let own = vec![url("http://example.com/root.json")];
        assert_eq!(
            classify("http://example.com/root.json", None, &own),
            RefTarget::SelfUrl { fragment: "#".into() }
        );
        assert_eq!(
            classify("http://example.com/root.json#/definitions/a", None, &own),
            RefTarget::SelfUrl { fragment: "#/definitions/a".into() }
        );
    }

    #[test]
    fn test_classify_relative() {
        let base = url("http://example.com/schemas/root.json");
        match classify("item.json#/definitions/x", Some(&base), &[]) {
            RefTarget::Remote { url } => {
                assert_eq!(url.as_str(), "http://example.com/schemas/item.json#/definitions/x")
            }
            other => panic!("Expected Remote, got {:?}", other),
        }
        assert!(matches!(classify("item.json", None, &[]), RefTarget::Malformed { .. }));
    }

    #[test]
    fn test_classify_malformed() {
        assert!(matches!(classify("", None, &[]), RefTarget::Malformed { .. }));
        assert!(matches!(classify("urn:example:thing", None, &[]), RefTarget::Malformed { .. }));
    }

    #[test]
    fn test_identity_canonicalization() {
        let base = url("http://example.com/schemas/root.json");
        assert_eq!(
            identity_key("item.json", Some(&base)),
            identity_key("http://example.com/schemas/item.json", None)
        );
        assert_eq!(identity_key("#/a", Some(&base)), "$ref#/a");
        assert_eq!(identity_key("root.json#/a", Some(&base)), "$ref#/a");
        assert_eq!(identity_key("http://example.com/schemas/root.json", Some(&base)), "$ref#");
    }

    #[test]
    fn test_self_alias() {
        let base = url("http://example.com/root.json");
        assert_eq!(
            self_alias("$refhttp://example.com/root.json#/definitions/a", Some(&base)),
            Some("$ref#/definitions/a".to_string())
        );
        assert_eq!(self_alias("$refhttp://example.com/other.json", Some(&base)), None);
        assert_eq!(self_alias("$ref#/definitions/a", Some(&base)), None);
    }

    #[test]
    fn test_pointer_components() {
        assert_eq!(pointer_components("#"), Some(vec![]));
        assert_eq!(
            pointer_components("#/definitions/a~1b~0c"),
            Some(vec!["definitions".to_string(), "a/b~c".to_string()])
        );
        assert_eq!(pointer_components("#anchor"), None);
        assert_eq!(escape_component("a/b~c"), "a~1b~0c");
    }

    #[test]
    fn test_definition_section() {
        assert_eq!(definition_section("#/definitions/a"), Some(("definitions".into(), 1)));
        assert_eq!(definition_section("#/definitions/a/properties/b"), Some(("definitions".into(), 3)));
        assert_eq!(definition_section("#"), None);
    }
}
