//! Issue kinds and priorities
//!
//! Every kind has a stable numeric id used in storage. Ids below 100 are
//! produced by page rules, ids from 100 up by crawl-wide rules. Never reuse or
//! renumber an id: stored issues refer to it.

use std::fmt;

/// Severity tier of an issue kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Critical,
    Alert,
    Warning,
}

impl Priority {
    /// Numeric tier stored in the `issue_types` table (1 is most severe)
    pub fn to_db_value(self) -> i64 {
        match self {
            Self::Critical => 1,
            Self::Alert => 2,
            Self::Warning => 3,
        }
    }

    pub fn from_db_value(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Critical),
            2 => Some(Self::Alert),
            3 => Some(Self::Warning),
            _ => None,
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::Critical, Self::Alert, Self::Warning]
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Warning => "warning",
        };
        write!(f, "{}", name)
    }
}

macro_rules! issue_kinds {
    ($($variant:ident = $id:literal, $name:literal, $priority:ident;)*) => {
        /// Stable identity of one defect category
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum IssueKind {
            $($variant,)*
        }

        impl IssueKind {
            /// Every kind, in id order
            pub const ALL: &'static [IssueKind] = &[$(IssueKind::$variant,)*];

            pub fn id(self) -> u16 {
                match self {
                    $(IssueKind::$variant => $id,)*
                }
            }

            pub fn from_id(id: u16) -> Option<Self> {
                match id {
                    $($id => Some(IssueKind::$variant),)*
                    _ => None,
                }
            }

            /// Short machine name, e.g. `error_40x`
            pub fn as_str(self) -> &'static str {
                match self {
                    $(IssueKind::$variant => $name,)*
                }
            }

            /// Priority seeded into the `issue_types` lookup table
            pub fn default_priority(self) -> Priority {
                match self {
                    $(IssueKind::$variant => Priority::$priority,)*
                }
            }
        }
    };
}

issue_kinds! {
    // Status and redirects
    Error30x = 1, "error_30x", Warning;
    Error40x = 2, "error_40x", Critical;
    Error50x = 3, "error_50x", Critical;
    Timeout = 4, "timeout", Critical;
    BlockedByRobots = 5, "blocked_by_robots", Warning;
    RedirectWithoutTarget = 6, "redirect_without_target", Critical;
    RedirectToHttp = 7, "redirect_to_http", Alert;
    RedirectToExternal = 8, "redirect_to_external", Warning;

    // Title and description
    EmptyTitle = 9, "empty_title", Critical;
    ShortTitle = 10, "short_title", Warning;
    LongTitle = 11, "long_title", Warning;
    MultipleTitleTags = 12, "multiple_title_tags", Alert;
    EmptyDescription = 13, "empty_description", Alert;
    ShortDescription = 14, "short_description", Warning;
    LongDescription = 15, "long_description", Warning;
    MultipleDescriptionTags = 16, "multiple_description_tags", Alert;

    // Content
    LittleContent = 17, "little_content", Warning;
    LargeHtml = 18, "large_html", Warning;
    NoLang = 19, "no_lang", Alert;
    InvalidLang = 20, "invalid_lang", Alert;
    NoCharset = 21, "no_charset", Warning;
    NoViewport = 22, "no_viewport", Alert;
    NoDoctype = 23, "no_doctype", Warning;
    LargeDom = 24, "large_dom", Warning;
    MetaRefresh = 25, "meta_refresh", Warning;
    Noindex = 26, "noindex", Warning;
    NofollowMeta = 27, "nofollow_meta", Warning;
    XRobotsNoindex = 28, "x_robots_noindex", Warning;
    SlowTtfb = 29, "slow_ttfb", Alert;
    DeprecatedTags = 30, "deprecated_tags", Warning;
    DuplicatedIds = 31, "duplicated_ids", Warning;
    RenderBlockingScripts = 32, "render_blocking_scripts", Warning;
    TitleEqualsDescription = 33, "title_equals_description", Warning;
    NoFavicon = 34, "no_favicon", Warning;

    // Headings
    NoH1 = 35, "no_h1", Alert;
    MultipleH1 = 36, "multiple_h1", Warning;
    InvalidHeadingOrder = 37, "invalid_heading_order", Warning;
    EmptyHeading = 38, "empty_heading", Warning;
    LongH1 = 39, "long_h1", Warning;

    // Links
    TooManyLinks = 40, "too_many_links", Warning;
    HttpLinks = 41, "http_links", Alert;
    InternalNofollow = 42, "internal_nofollow", Warning;
    ExternalWithoutNofollow = 43, "external_without_nofollow", Warning;
    NoInternalLinks = 44, "no_internal_links", Alert;
    EmptyLinkText = 45, "empty_link_text", Alert;
    LocalhostLinks = 46, "localhost_links", Alert;
    ExternalLinkBroken = 47, "external_link_broken", Alert;
    ExternalLinkRedirect = 48, "external_link_redirect", Warning;

    // URL
    UnderscoreUrl = 49, "underscore_url", Warning;
    SpaceInUrl = 50, "space_in_url", Alert;
    MultipleSlashes = 51, "multiple_slashes", Warning;
    LongUrl = 52, "long_url", Warning;
    UppercaseUrl = 53, "uppercase_url", Warning;
    HttpPage = 54, "http_page", Critical;
    ManyQueryParams = 55, "many_query_params", Warning;

    // Canonical
    CanonicalMismatch = 56, "canonical_mismatch", Alert;
    MultipleCanonical = 57, "multiple_canonical", Alert;
    RelativeCanonical = 58, "relative_canonical", Warning;
    CanonicalInBody = 59, "canonical_in_body", Alert;

    // Hreflang
    HreflangMissingSelf = 60, "hreflang_missing_self", Alert;
    HreflangLangMismatch = 61, "hreflang_lang_mismatch", Alert;
    RelativeHreflang = 62, "relative_hreflang", Warning;
    InvalidHreflang = 63, "invalid_hreflang", Alert;
    DuplicatedHreflang = 64, "duplicated_hreflang", Alert;

    // Media
    ImageWithoutAlt = 65, "image_without_alt", Alert;
    LongAltText = 66, "long_alt_text", Warning;
    ImageWithoutDimensions = 67, "image_without_dimensions", Warning;
    MixedContent = 68, "mixed_content", Critical;
    LargeImage = 69, "large_image", Warning;
    IframeUsage = 70, "iframe_usage", Warning;

    // Security headers
    MissingHsts = 71, "missing_hsts", Warning;
    MissingCsp = 72, "missing_csp", Warning;
    MissingContentTypeOptions = 73, "missing_content_type_options", Warning;
    MissingReferrerPolicy = 74, "missing_referrer_policy", Warning;
    MissingFrameOptions = 75, "missing_frame_options", Warning;
    MissingPermissionsPolicy = 76, "missing_permissions_policy", Warning;
    ServerVersionExposed = 77, "server_version_exposed", Warning;
    PoweredByExposed = 78, "powered_by_exposed", Warning;
    InsecureCookie = 79, "insecure_cookie", Alert;
    InsecureForm = 80, "insecure_form", Critical;

    // Crawl-wide
    DuplicatedTitle = 101, "duplicated_title", Alert;
    DuplicatedDescription = 102, "duplicated_description", Warning;
    DuplicatedContent = 103, "duplicated_content", Alert;
    Orphan = 104, "orphan", Alert;
    RedirectChain = 105, "redirect_chain", Alert;
    RedirectLoop = 106, "redirect_loop", Critical;
    CanonicalToNonCanonical = 107, "canonical_to_non_canonical", Critical;
    CanonicalToNoindex = 108, "canonical_to_noindex", Critical;
    CanonicalToRedirect = 109, "canonical_to_redirect", Critical;
    CanonicalToError = 110, "canonical_to_error", Critical;
    HreflangToNonCanonical = 111, "hreflang_to_non_canonical", Alert;
    HreflangNoReturn = 112, "hreflang_no_return", Alert;
    HreflangToNoindex = 113, "hreflang_to_noindex", Alert;
    FollowAndNofollowIncoming = 114, "follow_and_nofollow_incoming", Warning;
    NonCanonicalInSitemap = 115, "non_canonical_in_sitemap", Alert;
    NoindexInSitemap = 116, "noindex_in_sitemap", Alert;
    BlockedInSitemap = 117, "blocked_in_sitemap", Alert;
    LinkToRedirect = 118, "link_to_redirect", Warning;
    LinkToBroken = 119, "link_to_broken", Critical;
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique_and_resolve() {
        let mut seen = HashSet::new();
        for kind in IssueKind::ALL {
            assert!(seen.insert(kind.id()), "duplicate id {}", kind.id());
            assert_eq!(IssueKind::from_id(kind.id()), Some(*kind));
        }
        assert_eq!(IssueKind::from_id(0), None);
        assert_eq!(IssueKind::from_id(999), None);
    }

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<_> = IssueKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), IssueKind::ALL.len());
    }

    #[test]
    fn test_known_priorities() {
        assert_eq!(IssueKind::Error40x.default_priority(), Priority::Critical);
        assert_eq!(IssueKind::Error30x.default_priority(), Priority::Warning);
        assert_eq!(IssueKind::RedirectLoop.default_priority(), Priority::Critical);
    }

    #[test]
    fn test_priority_db_values() {
        for p in Priority::all() {
            assert_eq!(Priority::from_db_value(p.to_db_value()), Some(p));
        }
        assert_eq!(Priority::from_db_value(4), None);
    }
}
