//! The fixed set of media-reference patterns recognised in a document.
//!
//! Every rule pushes raw hits into a [`Hits`] collector; resolution and
//! deduplication happen once in [`super::Extractor::extract`].

use mediadex_model::{AssetContext, AssetType, Dimensions, media_extension};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// One unresolved reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawHit {
    pub raw: String,
    pub alt: String,
    pub dimensions: Option<Dimensions>,
    pub context: AssetContext,
}

pub type Hits = Vec<RawHit>;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static CSS selector is valid")
}

static IMG_SRC: Lazy<Selector> = Lazy::new(|| selector("img[src]"));
static SRCSET: Lazy<Selector> =
    Lazy::new(|| selector("source[srcset], img[srcset]"));
static PICTURE_IMG: Lazy<Selector> = Lazy::new(|| selector("img"));
static INLINE_STYLE: Lazy<Selector> = Lazy::new(|| selector("[style]"));
static STYLE_BLOCK: Lazy<Selector> = Lazy::new(|| selector("style"));
static MEDIA_ELEMENT: Lazy<Selector> = Lazy::new(|| selector("video, audio"));
static NESTED_SOURCE: Lazy<Selector> = Lazy::new(|| selector("source[src]"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));

static BACKGROUND_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)background(?:-image)?\s*:\s*([^;}]+)")
        .expect("background regex should compile")
});

static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*['"]?([^'")]+?)['"]?\s*\)"#)
        .expect("css url regex should compile")
});

/// Image CDNs and asset services whose URLs carry no file extension.
static IMAGE_SERVICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(/is/image/|images\.unsplash\.com/|res\.cloudinary\.com/|\.imgix\.net/|/media_[0-9a-f]{6,}|images\.ctfassets\.net/|cdn\.sanity\.io/images/)",
    )
    .expect("image service regex should compile")
});

fn attr(element: &ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_dimension(value: &str) -> Option<u32> {
    value.trim().trim_end_matches("px").trim().parse().ok()
}

fn dimensions(element: &ElementRef<'_>) -> Option<Dimensions> {
    let width = parse_dimension(element.value().attr("width")?)?;
    let height = parse_dimension(element.value().attr("height")?)?;
    Some(Dimensions { width, height })
}

fn hit(raw: String, context: AssetContext) -> RawHit {
    RawHit {
        raw,
        alt: String::new(),
        dimensions: None,
        context,
    }
}

/// (a) `img[src]` with its alt text and declared size.
pub fn images(document: &Html, hits: &mut Hits) {
    for img in document.select(&IMG_SRC) {
        if let Some(src) = attr(&img, "src") {
            hits.push(RawHit {
                raw: src,
                alt: attr(&img, "alt").unwrap_or_default(),
                dimensions: dimensions(&img),
                context: AssetContext::Image,
            });
        }
    }
}

/// (b) every candidate of `source[srcset]` and `img[srcset]`. Sources inside
/// a `picture` borrow the alt text of the picture's `img`.
pub fn srcsets(document: &Html, hits: &mut Hits) {
    for element in document.select(&SRCSET) {
        let Some(srcset) = element.value().attr("srcset") else {
            continue;
        };
        let alt = if element.value().name() == "img" {
            attr(&element, "alt")
        } else {
            picture_alt(&element)
        }
        .unwrap_or_default();
        for candidate in srcset_candidates(srcset) {
            hits.push(RawHit {
                raw: candidate.to_string(),
                alt: alt.clone(),
                dimensions: None,
                context: AssetContext::PictureSource,
            });
        }
    }
}

fn picture_alt(source: &ElementRef<'_>) -> Option<String> {
    let parent = source.parent().and_then(ElementRef::wrap)?;
    if parent.value().name() != "picture" {
        return None;
    }
    parent.select(&PICTURE_IMG).find_map(|img| attr(&img, "alt"))
}

/// URLs of a `srcset` attribute, descriptors dropped. URLs may contain
/// commas; a candidate ends at whitespace, its descriptor at the next comma.
pub fn srcset_candidates(srcset: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let mut rest = srcset;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (url, tail) = rest.split_at(end);
        let trimmed = url.trim_end_matches(',');
        if !trimmed.is_empty() {
            candidates.push(trimmed);
        }
        rest = if trimmed.len() < url.len() {
            // "a.png," has no descriptor.
            tail
        } else {
            match tail.find(',') {
                Some(idx) => &tail[idx + 1..],
                None => "",
            }
        };
    }
    candidates
}

fn background_urls(css: &str) -> impl Iterator<Item = String> + '_ {
    BACKGROUND_DECL.captures_iter(css).flat_map(|decl| {
        let value = decl.get(1).map(|m| m.as_str()).unwrap_or_default();
        CSS_URL
            .captures_iter(value)
            .filter_map(|url| url.get(1).map(|m| m.as_str().trim().to_string()))
            .collect::<Vec<_>>()
    })
}

/// (c) `url(..)` in inline `background`/`background-image` declarations.
pub fn inline_styles(document: &Html, hits: &mut Hits) {
    for element in document.select(&INLINE_STYLE) {
        if let Some(style) = element.value().attr("style") {
            hits.extend(
                background_urls(style)
                    .map(|raw| hit(raw, AssetContext::InlineStyle)),
            );
        }
    }
}

/// (d) `url(..)` in `background`/`background-image` rules of `<style>`.
pub fn style_blocks(document: &Html, hits: &mut Hits) {
    for block in document.select(&STYLE_BLOCK) {
        let css: String = block.text().collect();
        hits.extend(
            background_urls(&css).map(|raw| hit(raw, AssetContext::StyleBlock)),
        );
    }
}

/// (e) `video`/`audio` sources and posters, including nested `source[src]`.
pub fn media_elements(document: &Html, hits: &mut Hits) {
    for element in document.select(&MEDIA_ELEMENT) {
        let context = if element.value().name() == "audio" {
            AssetContext::AudioSource
        } else {
            AssetContext::VideoSource
        };
        if let Some(src) = attr(&element, "src") {
            hits.push(RawHit {
                dimensions: dimensions(&element),
                ..hit(src, context)
            });
        }
        if let Some(poster) = attr(&element, "poster") {
            hits.push(hit(poster, AssetContext::VideoPoster));
        }
        for source in element.select(&NESTED_SOURCE) {
            if let Some(src) = attr(&source, "src") {
                hits.push(hit(src, context));
            }
        }
    }
}

/// Whether a link target points at media rather than another page.
pub fn is_media_link(href: &str) -> bool {
    let known_extension = media_extension(href)
        .map(|ext| AssetType::from_extension(&ext) != AssetType::Unknown)
        .unwrap_or(false);
    known_extension || IMAGE_SERVICE.is_match(href)
}

/// (f) `a[href]` targets with a media extension or image-service URL.
pub fn links(document: &Html, hits: &mut Hits) {
    for link in document.select(&LINK) {
        if let Some(href) = attr(&link, "href")
            && is_media_link(&href)
        {
            let text: String = link.text().collect();
            hits.push(RawHit {
                alt: text.trim().to_string(),
                ..hit(href, AssetContext::Link)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(rule: fn(&Html, &mut Hits), html: &str) -> Vec<(String, AssetContext)> {
        let document = Html::parse_document(html);
        let mut hits = Hits::new();
        rule(&document, &mut hits);
        hits.into_iter().map(|h| (h.raw, h.context)).collect()
    }

    #[test]
    fn srcset_candidates_drop_descriptors() {
        assert_eq!(
            srcset_candidates("a.png 1x, b.png 2x"),
            vec!["a.png", "b.png"]
        );
        assert_eq!(
            srcset_candidates(" /w_100,h_50/a.jpg 100w,/b.jpg 200w "),
            vec!["/w_100,h_50/a.jpg", "/b.jpg"]
        );
        assert_eq!(srcset_candidates("a.png,b.png"), vec!["a.png,b.png"]);
        assert_eq!(srcset_candidates("a.png, b.png"), vec!["a.png", "b.png"]);
        assert!(srcset_candidates("  ").is_empty());
    }

    #[test]
    fn images_capture_alt_and_dimensions() {
        let document = Html::parse_document(
            r#"<img src="/a.png" alt="Hero" width="640" height="480px"><img src="">"#,
        );
        let mut hits = Hits::new();
        images(&document, &mut hits);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].alt, "Hero");
        assert_eq!(
            hits[0].dimensions,
            Some(Dimensions {
                width: 640,
                height: 480
            })
        );
    }

    #[test]
    fn picture_sources_use_picture_alt() {
        let document = Html::parse_document(
            r#"<picture><source srcset="/a.webp 1x, /a2.webp 2x"><img src="/a.jpg" alt="Pic"></picture>"#,
        );
        let mut hits = Hits::new();
        srcsets(&document, &mut hits);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.alt == "Pic"));
    }

    #[test]
    fn background_urls_in_inline_and_block_styles() {
        let inline = run(
            inline_styles,
            r#"<div style="color: red; background-image: url('/bg.jpg')"></div>
               <div style="border: url(/ignored.png)"></div>"#,
        );
        assert_eq!(inline, vec![("/bg.jpg".to_string(), AssetContext::InlineStyle)]);

        let block = run(
            style_blocks,
            r#"<style>.a { background: #fff url("/x.png") no-repeat; } .b { background-image: url(/y.svg), url(/z.gif); }</style>"#,
        );
        let srcs: Vec<_> = block.into_iter().map(|(raw, _)| raw).collect();
        assert_eq!(srcs, vec!["/x.png", "/y.svg", "/z.gif"]);
    }

    #[test]
    fn media_elements_cover_src_poster_and_sources() {
        let hits = run(
            media_elements,
            r#"<video poster="/p.jpg"><source src="/v.mp4"><source src="/v.webm"></video>
               <audio src="/a.mp3"></audio>"#,
        );
        assert_eq!(
            hits,
            vec![
                ("/p.jpg".to_string(), AssetContext::VideoPoster),
                ("/v.mp4".to_string(), AssetContext::VideoSource),
                ("/v.webm".to_string(), AssetContext::VideoSource),
                ("/a.mp3".to_string(), AssetContext::AudioSource),
            ]
        );
    }

    #[test]
    fn links_only_count_when_they_point_at_media() {
        let hits = run(
            links,
            r#"<a href="/about.html">About</a>
               <a href="/files/report.pdf">Report</a>
               <a href="https://images.unsplash.com/photo-123?w=800">Photo</a>"#,
        );
        let srcs: Vec<_> = hits.into_iter().map(|(raw, _)| raw).collect();
        assert_eq!(
            srcs,
            vec!["/files/report.pdf", "https://images.unsplash.com/photo-123?w=800"]
        );
    }
}
