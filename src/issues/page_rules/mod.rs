//! Page rule catalog
//!
//! Each rule is a plain `(IssueKind, fn)` pair. Predicates are pure: they read
//! the observation, the parsed document and the response headers and return
//! whether the page exhibits the defect. They never panic on missing data and
//! must tolerate an empty document (timeouts and non-HTML responses are
//! evaluated too). Order does not matter.

mod address;
mod canonical;
mod content;
mod headers;
mod headings;
mod hreflang;
mod links;
mod media;
mod status;

use crate::issues::IssueKind;
use crate::page::PageReport;
use reqwest::header::HeaderMap;
use scraper::Html;

/// Predicate signature shared by every page rule
pub type PageCheck = fn(&PageReport, &Html, &HeaderMap) -> bool;

/// One page-level defect check
#[derive(Clone, Copy)]
pub struct PageRule {
    pub kind: IssueKind,
    pub check: PageCheck,
}

impl std::fmt::Debug for PageRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageRule").field("kind", &self.kind).finish()
    }
}

macro_rules! rule {
    ($kind:ident, $check:path) => {
        PageRule {
            kind: IssueKind::$kind,
            check: $check,
        }
    };
}

static PAGE_RULES: &[PageRule] = &[
    rule!(Error30x, status::is_30x),
    rule!(Error40x, status::is_40x),
    rule!(Error50x, status::is_50x),
    rule!(Timeout, status::timed_out),
    rule!(BlockedByRobots, status::blocked),
    rule!(RedirectWithoutTarget, status::redirect_without_target),
    rule!(RedirectToHttp, status::redirect_to_http),
    rule!(RedirectToExternal, status::redirect_to_external),
    rule!(EmptyTitle, content::empty_title),
    rule!(ShortTitle, content::short_title),
    rule!(LongTitle, content::long_title),
    rule!(MultipleTitleTags, content::multiple_title_tags),
    rule!(EmptyDescription, content::empty_description),
    rule!(ShortDescription, content::short_description),
    rule!(LongDescription, content::long_description),
    rule!(MultipleDescriptionTags, content::multiple_description_tags),
    rule!(LittleContent, content::little_content),
    rule!(LargeHtml, content::large_html),
    rule!(NoLang, content::no_lang),
    rule!(InvalidLang, content::invalid_lang),
    rule!(NoCharset, content::no_charset),
    rule!(NoViewport, content::no_viewport),
    rule!(NoDoctype, content::no_doctype),
    rule!(LargeDom, content::large_dom),
    rule!(MetaRefresh, content::meta_refresh),
    rule!(Noindex, content::noindex),
    rule!(NofollowMeta, content::nofollow_meta),
    rule!(XRobotsNoindex, content::x_robots_noindex),
    rule!(SlowTtfb, content::slow_ttfb),
    rule!(DeprecatedTags, content::deprecated_tags),
    rule!(DuplicatedIds, content::duplicated_ids),
    rule!(RenderBlockingScripts, content::render_blocking_scripts),
    rule!(TitleEqualsDescription, content::title_equals_description),
    rule!(NoFavicon, content::no_favicon),
    rule!(NoH1, headings::no_h1),
    rule!(MultipleH1, headings::multiple_h1),
    rule!(InvalidHeadingOrder, headings::invalid_heading_order),
    rule!(EmptyHeading, headings::empty_heading),
    rule!(LongH1, headings::long_h1),
    rule!(TooManyLinks, links::too_many_links),
    rule!(HttpLinks, links::http_links),
    rule!(InternalNofollow, links::internal_nofollow),
    rule!(ExternalWithoutNofollow, links::external_without_nofollow),
    rule!(NoInternalLinks, links::no_internal_links),
    rule!(EmptyLinkText, links::empty_link_text),
    rule!(LocalhostLinks, links::localhost_links),
    rule!(ExternalLinkBroken, links::external_link_broken),
    rule!(ExternalLinkRedirect, links::external_link_redirect),
    rule!(UnderscoreUrl, address::underscore),
    rule!(SpaceInUrl, address::space),
    rule!(MultipleSlashes, address::multiple_slashes),
    rule!(LongUrl, address::too_long),
    rule!(UppercaseUrl, address::uppercase),
    rule!(HttpPage, address::http_page),
    rule!(ManyQueryParams, address::many_query_params),
    rule!(CanonicalMismatch, canonical::header_tag_mismatch),
    rule!(MultipleCanonical, canonical::multiple),
    rule!(RelativeCanonical, canonical::relative),
    rule!(CanonicalInBody, canonical::in_body),
    rule!(HreflangMissingSelf, hreflang::missing_self_reference),
    rule!(HreflangLangMismatch, hreflang::self_reference_lang_mismatch),
    rule!(RelativeHreflang, hreflang::relative),
    rule!(InvalidHreflang, hreflang::invalid_code),
    rule!(DuplicatedHreflang, hreflang::duplicated_lang),
    rule!(ImageWithoutAlt, media::image_without_alt),
    rule!(LongAltText, media::long_alt_text),
    rule!(ImageWithoutDimensions, media::image_without_dimensions),
    rule!(MixedContent, media::mixed_content),
    rule!(LargeImage, media::large_image),
    rule!(IframeUsage, media::iframe_usage),
    rule!(MissingHsts, headers::missing_hsts),
    rule!(MissingCsp, headers::missing_csp),
    rule!(MissingContentTypeOptions, headers::missing_content_type_options),
    rule!(MissingReferrerPolicy, headers::missing_referrer_policy),
    rule!(MissingFrameOptions, headers::missing_frame_options),
    rule!(MissingPermissionsPolicy, headers::missing_permissions_policy),
    rule!(ServerVersionExposed, headers::server_version_exposed),
    rule!(PoweredByExposed, headers::powered_by_exposed),
    rule!(InsecureCookie, headers::insecure_cookie),
    rule!(InsecureForm, headers::insecure_form),
];

/// The registered page rules
pub fn page_rules() -> &'static [PageRule] {
    PAGE_RULES
}

/// 2xx HTML response that was actually fetched
fn fetched_html(page: &PageReport) -> bool {
    page.is_success() && page.is_html() && !page.timeout && !page.blocked_by_robots
}

/// Fetched HTML that the crawl policy treats as indexable content
fn indexable(page: &PageReport) -> bool {
    page.is_indexable_html()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// BCP 47 shape check: a 2-3 letter primary subtag followed by 1-8
/// character alphanumeric subtags
pub(crate) fn is_valid_lang_code(code: &str) -> bool {
    let mut parts = code.split(|c| c == '-' || c == '_');
    let primary = match parts.next() {
        Some(p) => p,
        None => return false,
    };
    if !(2..=3).contains(&primary.len()) || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    parts.all(|p| (1..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Primary language subtag, lowercased
fn primary_lang(code: &str) -> String {
    code.split(|c| c == '-' || c == '_')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}
