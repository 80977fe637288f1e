//! Accept-header content negotiation.
//!
//! The request's `Accept` header lists media ranges with optional quality
//! weights. [`negotiate`] walks the server's offers in preference order and
//! picks the one best matched by those ranges:
//!
//! - a range with `q=0` never matches;
//! - a higher `q` always wins;
//! - at equal `q`, an exact match beats `type/*`, which beats `*/*`;
//! - on a full tie the earlier offer is kept.
//!
//! When nothing matches, including when the header is absent or unparsable,
//! the caller's default is returned.

use http::HeaderMap;
use http::header::ACCEPT;
use mime::Mime;

/// One media range from an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptRange {
    /// `type/subtype`, lowercased. May contain `*` wildcards.
    pub media: String,
    pub q: f32,
}

/// Parses every `Accept` header in `headers`. Unparsable ranges are skipped.
pub fn parse_accept(headers: &HeaderMap) -> Vec<AcceptRange> {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|range| range.trim().parse::<Mime>().ok())
        .map(|mime| AcceptRange {
            media: mime.essence_str().to_ascii_lowercase(),
            q: quality(&mime),
        })
        .collect()
}

fn quality(mime: &Mime) -> f32 {
    mime.get_param("q")
        .and_then(|q| q.as_str().parse::<f32>().ok())
        .map(|q| q.clamp(0.0, 1.0))
        .unwrap_or(1.0)
}

/// How specifically a range matched an offer. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Specificity {
    Exact,
    Subtype,
    Any,
}

fn matches(range: &str, offer: &str) -> Option<Specificity> {
    if range == "*/*" {
        Some(Specificity::Any)
    } else if let Some(prefix) = range.strip_suffix('*') {
        offer.starts_with(prefix).then_some(Specificity::Subtype)
    } else {
        range.eq_ignore_ascii_case(offer).then_some(Specificity::Exact)
    }
}

/// Picks the best of `offers` for the request's `Accept` header.
pub fn negotiate<'a>(headers: &HeaderMap, offers: &[&'a str], default: &'a str) -> &'a str {
    let ranges = parse_accept(headers);
    let mut best: Option<(&'a str, f32, Specificity)> = None;

    for &offer in offers {
        for range in &ranges {
            if range.q <= 0.0 {
                continue;
            }
            let Some(specificity) = matches(&range.media, offer) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((_, q, s)) => range.q > q || (range.q == q && specificity < s),
            };
            if better {
                best = Some((offer, range.q, specificity));
            }
        }
    }

    best.map_or(default, |(offer, _, _)| offer)
}
