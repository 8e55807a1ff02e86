//! Individual resolution strategies and candidate verification.
//!
//! Each strategy returns the first candidate that passes verification
//! (visible, enabled, non-degenerate bounding box), together with the
//! confidence tier the match earns. Confidence reflects how ambiguous
//! the match was: when more than one candidate verifies, the tier
//! drops, because the strategy picked one of several plausible
//! elements.

use crate::errors::LocatorError;
use crate::types::ElementQuery;
use browser_session::PageOps;
use tracing::debug;
use webpilot_core_types::ElementId;

pub const SELECTOR_CONFIDENCE: f64 = 1.0;
pub const ARIA_CONFIDENCE: f64 = 0.95;
pub const ARIA_AMBIGUOUS_CONFIDENCE: f64 = 0.8;
pub const TEXT_CONFIDENCE: f64 = 0.9;
pub const TEXT_AMBIGUOUS_CONFIDENCE: f64 = 0.75;

/// An element is actionable when it is visible, enabled, and occupies
/// space on screen.
pub async fn verify(page: &dyn PageOps, el: &ElementId) -> Result<bool, LocatorError> {
    if !page.is_visible(el).await? {
        return Ok(false);
    }
    if !page.is_enabled(el).await? {
        return Ok(false);
    }
    Ok(page.bounding_box(el).await?.is_some())
}

/// All candidates that pass verification, in document order. The
/// count decides the confidence tier; only actionable elements count
/// toward ambiguity.
async fn verified_candidates(
    page: &dyn PageOps,
    candidates: Vec<ElementId>,
) -> Result<Vec<ElementId>, LocatorError> {
    let mut out = Vec::new();
    for candidate in candidates {
        if verify(page, &candidate).await? {
            out.push(candidate);
        }
    }
    Ok(out)
}

fn pick(mut verified: Vec<ElementId>, unique: f64, ambiguous: f64) -> Option<(ElementId, f64)> {
    match verified.len() {
        0 => None,
        1 => Some((verified.remove(0), unique)),
        _ => Some((verified.remove(0), ambiguous)),
    }
}

/// Structural CSS selector match.
pub async fn by_selector(
    page: &dyn PageOps,
    query: &ElementQuery,
) -> Result<Option<(ElementId, f64)>, LocatorError> {
    let Some(selector) = &query.selector else {
        return Ok(None);
    };
    let candidates = page.query_selector(selector).await?;
    debug!(selector, candidates = candidates.len(), "selector strategy");
    Ok(verified_candidates(page, candidates)
        .await?
        .into_iter()
        .next()
        .map(|el| (el, SELECTOR_CONFIDENCE)))
}

/// Accessibility match: role plus optional accessible name. A single
/// verified match earns the top tier; when several elements share the
/// role and name the first one is taken at the ambiguous tier.
pub async fn by_aria(
    page: &dyn PageOps,
    query: &ElementQuery,
) -> Result<Option<(ElementId, f64)>, LocatorError> {
    let Some(role) = &query.role else {
        return Ok(None);
    };
    let candidates = page.query_role(role, query.name.as_deref()).await?;
    debug!(role, candidates = candidates.len(), "aria strategy");
    let verified = verified_candidates(page, candidates).await?;
    Ok(pick(verified, ARIA_CONFIDENCE, ARIA_AMBIGUOUS_CONFIDENCE))
}

/// Visible-text match: verbatim first, then case-insensitive
/// substring. A unique verbatim match is the only way to earn the top
/// tier; duplicated text and substring matches are both ambiguous.
pub async fn by_text(
    page: &dyn PageOps,
    query: &ElementQuery,
) -> Result<Option<(ElementId, f64)>, LocatorError> {
    let Some(text) = &query.text else {
        return Ok(None);
    };
    let exact = page.query_text(text, query.scope, true).await?;
    debug!(text, candidates = exact.len(), "text strategy (exact)");
    let verified = verified_candidates(page, exact).await?;
    if let Some(hit) = pick(verified, TEXT_CONFIDENCE, TEXT_AMBIGUOUS_CONFIDENCE) {
        return Ok(Some(hit));
    }
    let partial = page.query_text(text, query.scope, false).await?;
    debug!(text, candidates = partial.len(), "text strategy (partial)");
    Ok(verified_candidates(page, partial)
        .await?
        .into_iter()
        .next()
        .map(|el| (el, TEXT_AMBIGUOUS_CONFIDENCE)))
}

/// Synthesize a selector that should survive page rebuilds, preferring
/// the most stable attribute the element carries.
pub async fn durable_selector(
    page: &dyn PageOps,
    el: &ElementId,
) -> Result<Option<String>, LocatorError> {
    if let Some(id) = page.attribute(el, "id").await? {
        if !id.is_empty() {
            return Ok(Some(format!("#{id}")));
        }
    }
    if let Some(testid) = page.attribute(el, "data-testid").await? {
        if !testid.is_empty() {
            return Ok(Some(format!("[data-testid=\"{testid}\"]")));
        }
    }
    if let Some(label) = page.attribute(el, "aria-label").await? {
        if !label.is_empty() {
            return Ok(Some(format!("[aria-label=\"{label}\"]")));
        }
    }
    Ok(None)
}
