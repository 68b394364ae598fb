use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficSource {
    #[default]
    Direct,
    OrganicSearch,
    PaidSearch,
    Social,
    Referral,
    Email,
    Display,
    Affiliate,
    Other,
}

const SEARCH_ENGINES: &[&str] = &["google", "bing", "yahoo", "duckduckgo", "baidu", "yandex"];

const SOCIAL_NETWORKS: &[&str] = &[
    "facebook",
    "twitter",
    "linkedin",
    "instagram",
    "pinterest",
    "reddit",
    "tiktok",
    "youtube",
];

/// Lower-cased host of a referrer URL, or `None` if it does not parse.
pub fn referrer_host(referrer: &str) -> Option<String> {
    if referrer.is_empty() {
        return None;
    }
    let url = Url::parse(referrer).ok()?;
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_lowercase)
}

/// Classify where a session came from.
///
/// A UTM medium always wins. Without one, an empty referrer is direct traffic
/// and otherwise the referrer host is matched by substring against known
/// search engines and social networks.
pub fn classify(referrer: Option<&str>, utm_medium: Option<&str>) -> TrafficSource {
    if let Some(medium) = utm_medium.filter(|m| !m.is_empty()) {
        return match medium.to_lowercase().as_str() {
            "cpc" | "ppc" | "paidsearch" => TrafficSource::PaidSearch,
            "organic" => TrafficSource::OrganicSearch,
            "social" => TrafficSource::Social,
            "email" => TrafficSource::Email,
            "display" | "banner" => TrafficSource::Display,
            "affiliate" => TrafficSource::Affiliate,
            "referral" => TrafficSource::Referral,
            _ => TrafficSource::Other,
        };
    }

    let Some(referrer) = referrer.filter(|r| !r.is_empty()) else {
        return TrafficSource::Direct;
    };

    let host = referrer_host(referrer).unwrap_or_default();
    if SEARCH_ENGINES.iter().any(|se| host.contains(se)) {
        TrafficSource::OrganicSearch
    } else if SOCIAL_NETWORKS.iter().any(|sn| host.contains(sn)) {
        TrafficSource::Social
    } else {
        TrafficSource::Referral
    }
}
