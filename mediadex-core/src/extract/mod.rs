//! Media reference extraction from markup documents.

pub mod rules;
mod resolve;

pub use resolve::{ResolvedRef, UrlResolver};

use std::collections::HashMap;

use mediadex_model::AssetFragment;
use scraper::Html;

/// Runs every extraction rule over a document and returns the resolved,
/// per-document deduplicated fragments.
#[derive(Clone, Debug)]
pub struct Extractor {
    resolver: UrlResolver,
}

impl Extractor {
    pub fn new(content_hosts: &[String]) -> Self {
        Self {
            resolver: UrlResolver::new(content_hosts),
        }
    }

    pub fn resolver(&self) -> &UrlResolver {
        &self.resolver
    }

    /// Fragments for `document_path`, unique by `(src, used_in[0])` and in
    /// first-seen order. A later duplicate fills a missing alt or size.
    pub fn extract(&self, document_path: &str, markup: &str) -> Vec<AssetFragment> {
        let document = Html::parse_document(markup);
        let mut hits = rules::Hits::new();
        rules::images(&document, &mut hits);
        rules::srcsets(&document, &mut hits);
        rules::inline_styles(&document, &mut hits);
        rules::style_blocks(&document, &mut hits);
        rules::media_elements(&document, &mut hits);
        rules::links(&document, &mut hits);

        let mut fragments: Vec<AssetFragment> = Vec::with_capacity(hits.len());
        let mut seen: HashMap<String, usize> = HashMap::new();
        for hit in hits {
            let Some(resolved) = self.resolver.resolve(document_path, &hit.raw)
            else {
                continue;
            };
            if let Some(&idx) = seen.get(&resolved.src) {
                let existing = &mut fragments[idx];
                if existing.alt.is_empty() && !hit.alt.is_empty() {
                    existing.alt = hit.alt;
                }
                if existing.dimensions.is_none() {
                    existing.dimensions = hit.dimensions;
                }
                continue;
            }
            seen.insert(resolved.src.clone(), fragments.len());
            fragments.push(
                AssetFragment::new(resolved.src, document_path, hit.context)
                    .with_alt(hit.alt)
                    .with_dimensions(hit.dimensions)
                    .external(resolved.is_external),
            );
        }
        fragments
    }
}

/// Removes repeated `(src, used_in[0])` pairs, keeping the first.
pub fn dedup_fragments(fragments: Vec<AssetFragment>) -> Vec<AssetFragment> {
    let mut seen = std::collections::HashSet::new();
    fragments
        .into_iter()
        .filter(|fragment| {
            let (src, page) = fragment.dedup_key();
            seen.insert((src.to_string(), page.map(str::to_string)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use mediadex_model::AssetContext;

    use super::*;

    #[test]
    fn image_plus_picture_sources_yield_three_fragments() {
        let extractor = Extractor::new(&[]);
        let fragments = extractor.extract(
            "/gallery/index.html",
            r#"<html><body>
                <img src="hero.jpg" alt="Hero">
                <picture>
                  <source srcset="hero-1x.webp 1x, hero-2x.webp 2x">
                  <img src="hero.jpg" alt="Hero">
                </picture>
            </body></html>"#,
        );
        assert_eq!(fragments.len(), 3);
        assert!(
            fragments
                .iter()
                .all(|f| f.used_in == vec!["/gallery/index.html".to_string()])
        );
        let srcs: Vec<_> = fragments.iter().map(|f| f.src.as_str()).collect();
        assert_eq!(
            srcs,
            vec![
                "/gallery/hero.jpg",
                "/gallery/hero-1x.webp",
                "/gallery/hero-2x.webp"
            ]
        );
    }

    #[test]
    fn duplicates_fill_missing_alt() {
        let extractor = Extractor::new(&[]);
        let fragments = extractor.extract(
            "/p.html",
            r#"<div style="background-image:url(/a.png)"></div><img src="/a.png" alt="A">"#,
        );
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].alt, "A");
        assert_eq!(fragments[0].context, AssetContext::Image);
    }

    #[test]
    fn external_hosts_are_tagged_for_every_rule() {
        let extractor = Extractor::new(&["www.example.com".to_string()]);
        let fragments = extractor.extract(
            "/p.html",
            r#"<img src="https://cdn.other.test/a.png">
               <img src="https://www.example.com/b.png">
               <video src="//media.other.test/c.mp4"></video>"#,
        );
        let external: Vec<_> = fragments
            .iter()
            .map(|f| (f.src.as_str(), f.is_external))
            .collect();
        assert_eq!(
            external,
            vec![
                ("https://cdn.other.test/a.png", true),
                ("https://www.example.com/b.png", false),
                ("https://media.other.test/c.mp4", true),
            ]
        );
    }

    #[test]
    fn ignored_refs_produce_nothing() {
        let extractor = Extractor::new(&[]);
        let fragments = extractor.extract(
            "/p.html",
            r##"<img src=""><img src="data:image/gif;base64,R0lG"><a href="#top">x</a><a href="mailto:a@b.test">m</a>"##,
        );
        assert!(fragments.is_empty());
    }

    #[test]
    fn dedup_keeps_first_per_page() {
        let a = AssetFragment::new("/a.png", "/p.html", AssetContext::Image);
        let b = AssetFragment::new("/a.png", "/p.html", AssetContext::Link);
        let c = AssetFragment::new("/a.png", "/q.html", AssetContext::Image);
        let out = dedup_fragments(vec![a.clone(), b, c.clone()]);
        assert_eq!(out, vec![a, c]);
    }
}
