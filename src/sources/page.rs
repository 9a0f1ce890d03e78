//! Web page scraper: fetches an article and keeps its readable text.

use super::{ScrapedSource, Scraper};
use crate::config::PageSettings;
use crate::error::{LodestarError, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Elements whose text is never part of the article.
const IGNORED_TAGS: &[&str] = &[
    "script", "style", "template", "noscript", "svg", "nav", "header", "footer", "aside",
    "form",
];

/// Elements kept as one line of text each.
const BLOCK_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "blockquote", "pre",
];

/// Parsed selectors, built once per scraper.
#[derive(Clone)]
pub(crate) struct PageSelectors {
    title: Selector,
    heading: Selector,
    article: Selector,
    main: Selector,
    body: Selector,
    blocks: Selector,
}

impl PageSelectors {
    pub(crate) fn new() -> Self {
        Self {
            title: Selector::parse("title").expect("title selector"),
            heading: Selector::parse("h1").expect("h1 selector"),
            article: Selector::parse("article").expect("article selector"),
            main: Selector::parse("main").expect("main selector"),
            body: Selector::parse("body").expect("body selector"),
            blocks: Selector::parse(&BLOCK_TAGS.join(", ")).expect("block selector"),
        }
    }

    fn pick_root<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        document
            .select(&self.article)
            .next()
            .or_else(|| document.select(&self.main).next())
            .or_else(|| document.select(&self.body).next())
            .unwrap_or_else(|| document.root_element())
    }
}

/// Scrapes ordinary web pages such as guides and wiki articles.
pub struct PageScraper {
    client: reqwest::Client,
    selectors: PageSelectors,
}

impl PageScraper {
    pub fn new(config: &PageSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LodestarError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            selectors: PageSelectors::new(),
        })
    }
}

#[async_trait]
impl Scraper for PageScraper {
    fn can_handle(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
    }

    #[instrument(skip(self))]
    async fn scrape(&self, url: &str) -> Result<ScrapedSource> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() || e.is_connect() => {
                warn!("Page unreachable, marking restricted: {}", e);
                return Ok(ScrapedSource::restricted(url));
            }
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Page not readable ({}), marking restricted", status);
            return Ok(ScrapedSource::restricted(url));
        }

        let html = response.text().await?;
        debug!("Fetched {} bytes", html.len());

        let source = extract_page(&self.selectors, url, &html);
        if source.is_restricted() {
            warn!("No readable text on page, marking restricted");
        } else {
            info!("Scraped page with {} characters", source.content.len());
        }
        Ok(source)
    }
}

/// Pull the title and article text out of an HTML document.
///
/// A page without any readable block of text is reported as restricted.
pub(crate) fn extract_page(selectors: &PageSelectors, url: &str, html: &str) -> ScrapedSource {
    let document = Html::parse_document(html);

    let title = document
        .select(&selectors.title)
        .next()
        .or_else(|| document.select(&selectors.heading).next())
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .unwrap_or_default();

    let root = selectors.pick_root(&document);
    let mut lines = Vec::new();
    for element in root.select(&selectors.blocks) {
        if inside_skipped(&element) {
            continue;
        }
        let text = if element.value().name() == "pre" {
            element.text().collect::<String>().trim_end().to_string()
        } else {
            collapse_whitespace(&element.text().collect::<String>())
        };
        if !text.is_empty() {
            lines.push(text);
        }
    }

    if lines.is_empty() {
        return ScrapedSource::restricted(url);
    }
    ScrapedSource::accessible(url, title, lines.join("\n"))
}

/// True for elements under page chrome, or nested in another kept block.
fn inside_skipped(element: &ElementRef<'_>) -> bool {
    element.ancestors().filter_map(ElementRef::wrap).any(|ancestor| {
        let name = ancestor.value().name();
        IGNORED_TAGS.contains(&name) || BLOCK_TAGS.contains(&name)
    })
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUIDE: &str = r#"
        <html>
          <head><title> RDR2 Gold Bars
            Guide </title><script>var tracking = 1;</script></head>
          <body>
            <nav><ul><li>Home</li><li>Guides</li></ul></nav>
            <article>
              <h1>Where to find gold bars</h1>
              <p>Gold bar locations are
                 in <b>chapter 2</b>.</p>
              <ul>
                <li><p>Behind the waterfall</p></li>
                <li>Inside the mine</li>
              </ul>
              <aside><p>Sponsored</p></aside>
            </article>
            <footer><p>Copyright</p></footer>
          </body>
        </html>"#;

    #[test]
    fn test_extract_article_text() {
        let source = extract_page(&PageSelectors::new(), "https://guides.example/gold", GUIDE);

        assert!(!source.is_restricted());
        assert_eq!(source.title, "RDR2 Gold Bars Guide");
        assert_eq!(
            source.content,
            "Where to find gold bars\n\
             Gold bar locations are in chapter 2.\n\
             Behind the waterfall\n\
             Inside the mine"
        );
    }

    #[test]
    fn test_falls_back_to_body_and_heading_title() {
        let html = "<body><h1>Armor</h1><p>Visit the blacksmith.</p><pre>  a\n  b\n</pre></body>";
        let source = extract_page(&PageSelectors::new(), "https://b.example", html);
        assert_eq!(source.title, "Armor");
        assert_eq!(source.content, "Armor\nVisit the blacksmith.\n  a\n  b");
    }

    #[test]
    fn test_page_without_text_is_restricted() {
        let html = "<html><body><nav><p>Menu</p></nav><div>   </div></body></html>";
        let source = extract_page(&PageSelectors::new(), "https://blocked.example", html);
        assert!(source.is_restricted());
        assert_eq!(source.restricted.as_deref(), Some("https://blocked.example"));
    }

    #[test]
    fn test_url_handling() {
        let scraper = PageScraper::new(&PageSettings::default()).unwrap();
        assert!(scraper.can_handle("https://guides.example/gold"));
        assert!(scraper.can_handle("http://guides.example"));
        assert!(!scraper.can_handle("ftp://guides.example/file"));
        assert!(!scraper.can_handle("not a url"));
    }
}
