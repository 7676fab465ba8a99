//! Listing identifier discovery.
//!
//! Before any estate is merged, the full set of listing identifiers is
//! enumerated by paging the agency's listing endpoint. The result is saved
//! as a flat id list ([`id_list`]) so later runs can skip enumeration.

pub mod id_list;

use housing_crawler::AgencyApi;
use housing_shared::{ListingId, Locale, Result};
use tracing::{debug, info, instrument, warn};

/// Largest page the listing endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

// ---------------------------------------------------------------------------
// Discovery options
// ---------------------------------------------------------------------------

/// Configuration for the enumeration loop.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Page size requested from the listing endpoint (clamped to 1..=1000).
    pub page_size: u32,
    /// Language of the listing request. Ids are locale-neutral.
    pub locale: Locale,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            locale: Locale::CANONICAL,
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Enumerate every listing identifier.
///
/// Pages from 1 until `page * page_size` reaches the declared total. The
/// declared total is the smallest `count` seen on any page so far; a later,
/// larger count is never trusted. Ids are not deduplicated here.
///
/// Any page failure aborts the whole enumeration: a truncated list would
/// silently under-enumerate the domain.
#[instrument(skip_all, fields(page_size = opts.page_size))]
pub async fn discover_listing_ids(api: &AgencyApi, opts: &DiscoveryOptions) -> Result<Vec<ListingId>> {
    let page_size = opts.page_size.clamp(1, MAX_PAGE_SIZE);
    let mut declared_total: Option<u64> = None;
    let mut ids = Vec::new();
    let mut page: u32 = 1;

    loop {
        let listing = api.listing_page(page, page_size, opts.locale).await?;

        let total = declared_total.map_or(listing.count, |t| t.min(listing.count));
        declared_total = Some(total);

        let before = ids.len();
        ids.extend(
            listing
                .result
                .into_iter()
                .flatten()
                .map(|entry| ListingId::new(entry.id)),
        );
        let added = ids.len() - before;
        debug!(page, added, declared_total = total, "listing page fetched");

        if u64::from(page) * u64::from(page_size) >= total {
            break;
        }
        if added == 0 {
            warn!(page, declared_total = total, "empty listing page before declared total, stopping");
            break;
        }
        page += 1;
    }

    info!(count = ids.len(), pages = page, "listing ids discovered");
    Ok(ids)
}
