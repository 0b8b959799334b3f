//! Candidate discovery.
//!
//! Offset pagination over owner rows: pages are requested with increasing
//! offset until one comes back shorter than the page size. The reference
//! store blanks out already-watermarked references, and this module
//! flattens the remaining slots into a de-duplicated id list.

use std::collections::HashSet;
use std::future::Future;

use crate::error::WatermarkError;
use crate::store::{CandidateRow, OwnerKind, ReferenceStore};
use crate::watermark::WatermarkMarker;

/// Fetch pages until the first short (or empty) page.
pub async fn fetch_all_pages<T, F, Fut>(
    page_size: usize,
    mut fetch_page: F,
) -> Result<Vec<T>, WatermarkError>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, WatermarkError>>,
{
    let page_size = page_size.max(1);
    let mut offset = 0;
    let mut items = Vec::new();

    loop {
        let page = fetch_page(offset, page_size).await?;
        let fetched = page.len();
        items.extend(page);

        if fetched < page_size {
            break;
        }
        offset += fetched;
    }

    Ok(items)
}

/// Flatten row slots into ids, dropping empty slots and duplicates.
///
/// First-seen order is kept.
pub fn flatten_unique<'a, I>(rows: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a CandidateRow>,
{
    let mut seen = HashSet::new();
    rows.into_iter()
        .flat_map(|row| row.image_ids.iter())
        .filter_map(|slot| slot.as_deref())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

/// Not-yet-watermarked image ids referenced by every owner of `kind`.
pub async fn discover_kind(
    references: &dyn ReferenceStore,
    kind: OwnerKind,
    page_size: usize,
    marker: &WatermarkMarker,
) -> Result<Vec<String>, WatermarkError> {
    let rows = fetch_all_pages(page_size, |offset, limit| {
        references.fetch_candidates(kind, offset, limit, marker)
    })
    .await?;

    let ids = flatten_unique(&rows);
    tracing::debug!(
        kind = %kind,
        rows = rows.len(),
        candidates = ids.len(),
        "Discovered watermark candidates"
    );
    Ok(ids)
}

/// Candidates across projects and developers, de-duplicated.
pub async fn discover_all(
    references: &dyn ReferenceStore,
    page_size: usize,
    marker: &WatermarkMarker,
) -> Result<Vec<String>, WatermarkError> {
    let (projects, developers) = futures::try_join!(
        discover_kind(references, OwnerKind::Project, page_size, marker),
        discover_kind(references, OwnerKind::Developer, page_size, marker),
    )?;

    let mut seen = HashSet::new();
    Ok(projects
        .into_iter()
        .chain(developers)
        .filter(|id| seen.insert(id.clone()))
        .collect())
}
