use std::cmp::Ordering;

use crate::core::types::{SortOrder, SortableValue};
use crate::query::KnnScoreSortOption;
use crate::reply::Reply;
use crate::search::params::{SearchParams, SearchResult, SerializedSearchDoc};

/// Order the first `limit` elements, leave the tail unordered: nth-element
/// partition followed by a prefix sort, never a full sort of the
/// concatenation. Not stable; equal keys land in arbitrary order.
pub fn partial_sort_by<T, F>(items: &mut [T], limit: usize, cmp: F)
where
    F: Fn(&T, &T) -> Ordering,
{
    let k = limit.min(items.len());
    if k == 0 {
        return;
    }
    if k < items.len() {
        items.select_nth_unstable_by(k - 1, |a, b| cmp(a, b));
    }
    items[..k].sort_unstable_by(|a, b| cmp(a, b));
}

/// Merge per-shard ranked results into the final reply: KNN cut first, then
/// offset/limit, then the SORTBY pass when it differs from the KNN ordering.
/// Callers have already ruled out shard-local errors.
pub fn build_search_reply(
    params: &SearchParams,
    knn: Option<&KnnScoreSortOption>,
    results: Vec<SearchResult>,
) -> Reply {
    let mut total_hits = 0;
    let mut docs: Vec<SerializedSearchDoc> = Vec::new();
    for shard_result in results {
        total_hits += shard_result.total_hits;
        docs.extend(shard_result.docs);
    }

    // Reorder and cut KNN results before applying SORT and LIMIT.
    let mut knn_score_ret_field = None;
    let mut ignore_sort = false;
    if let Some(knn) = knn {
        total_hits = total_hits.min(knn.limit);
        partial_sort_by(&mut docs, total_hits, |l, r| {
            l.knn_score.partial_cmp(&r.knn_score).unwrap_or(Ordering::Equal)
        });
        docs.truncate(knn.limit);

        ignore_sort = params.sort_option.as_ref().map_or(true, |sort| sort.is_same(knn));
        if params.should_return_field(&knn.score_field_alias) {
            knn_score_ret_field = Some(knn.score_field_alias.clone());
        }
    }

    let offset = params.limit_offset.min(docs.len());
    let limit = (docs.len() - offset).min(params.limit_total);
    let end = offset + limit;

    if let Some(sort) = &params.sort_option {
        if !ignore_sort {
            let order = sort.order;
            partial_sort_by(&mut docs, end, |l, r| {
                let ord = l.sort_score.cmp_natural(&r.sort_score);
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }
    }

    let ids_only = params.ids_only();
    let mut out = Vec::with_capacity(1 + if ids_only { limit } else { limit * 2 });
    out.push(Reply::Long(total_hits as i64));

    for doc in &mut docs[offset..end] {
        if ids_only {
            out.push(Reply::bulk(doc.key.clone()));
            continue;
        }

        if let Some(alias) = &knn_score_ret_field {
            let score = SortableValue::Double(doc.knn_score);
            match doc.values.iter_mut().find(|(name, _)| name == alias) {
                Some(slot) => slot.1 = score,
                None => doc.values.push((alias.clone(), score)),
            }
        }

        out.push(Reply::bulk(doc.key.clone()));
        out.push(Reply::Map(
            doc.values
                .iter()
                .map(|(name, value)| (Reply::bulk(name.clone()), Reply::from(value)))
                .collect(),
        ));
    }

    Reply::Array(out)
}
