use std::collections::BTreeSet;

use dbgdiff_model::{PointKey, View, is_unavailable};

use super::{Check, Discrepancy, DiscrepancyKind, Engine, Pair, Side};

fn record(engine: &Engine, pair: &Pair<'_>, check: Check, view: View, kind: DiscrepancyKind) -> Discrepancy {
    Discrepancy {
        method: pair.method,
        check,
        view,
        file: engine.source.label().to_string(),
        left: pair.left_config.clone(),
        right: pair.right_config.clone(),
        kind,
    }
}

fn permitted(allowed: Option<&BTreeSet<PointKey>>, key: &PointKey) -> bool {
    allowed.is_none_or(|allowed| allowed.contains(key))
}

fn is_brace(text: Option<&str>) -> bool {
    matches!(text, Some("{" | "}"))
}

/// Points visited on one side only.
///
/// Right-only points are not reported for the address view, and points on a
/// line holding just a brace are never reported.
pub(super) fn existence(
    engine: &Engine,
    pair: &Pair<'_>,
    view: View,
    allowed: Option<&BTreeSet<PointKey>>,
) -> Vec<Discrepancy> {
    let left = pair.left.order_in(view);
    let right = pair.right.order_in(view);
    let left_seen: BTreeSet<&PointKey> = left.iter().collect();
    let right_seen: BTreeSet<&PointKey> = right.iter().collect();

    let mut found = Vec::new();
    let mut missing = |key: &PointKey, side: Side| {
        let text = engine.source.annotate(key);
        if !is_brace(text.as_deref()) {
            let kind = DiscrepancyKind::Missing {
                key: key.clone(),
                side,
                text,
            };
            found.push(record(engine, pair, Check::Existence, view, kind));
        }
    };

    for key in &left {
        if permitted(allowed, key) && !right_seen.contains(key) {
            missing(key, Side::LeftOnly);
        }
    }
    if view != View::Adr {
        for key in &right {
            if permitted(allowed, key) && !left_seen.contains(key) {
                missing(key, Side::RightOnly);
            }
        }
    }
    found
}

/// First-visit order, restricted to points both sides (and the line table,
/// when validating) agree exist.
pub(super) fn order(
    engine: &Engine,
    pair: &Pair<'_>,
    view: View,
    allowed: Option<&BTreeSet<PointKey>>,
) -> Option<Discrepancy> {
    let mut left = pair.left.order_in(view);
    let mut right = pair.right.order_in(view);
    if let Some(allowed) = allowed {
        let right_seen: BTreeSet<PointKey> = right.iter().cloned().collect();
        let common: BTreeSet<PointKey> = left
            .iter()
            .filter(|key| right_seen.contains(*key) && allowed.contains(*key))
            .cloned()
            .collect();
        left.retain(|key| common.contains(key));
        right.retain(|key| common.contains(key));
    }
    (left != right).then(|| record(engine, pair, Check::Order, view, DiscrepancyKind::Order { left, right }))
}

/// Points the line-stepped side hit more often than the instruction-stepped
/// side. Never filtered by the line table.
pub(super) fn frequency(engine: &Engine, pair: &Pair<'_>, view: View) -> Vec<Discrepancy> {
    let right = pair.right.hits(view);
    pair.left
        .hits(view)
        .into_iter()
        .filter_map(|(key, left_hits)| {
            let right_hits = *right.get(&key)?;
            (left_hits > right_hits).then(|| {
                let kind = DiscrepancyKind::Frequency {
                    text: engine.source.annotate(&key),
                    key,
                    left: left_hits,
                    right: right_hits,
                };
                record(engine, pair, Check::Frequency, view, kind)
            })
        })
        .collect()
}

/// Differing values of the same variable at the same point, comparing the
/// first snapshot taken there on each side.
pub(super) fn variables(
    engine: &Engine,
    pair: &Pair<'_>,
    view: View,
    allowed: Option<&BTreeSet<PointKey>>,
) -> Vec<Discrepancy> {
    let left = pair.left.variables(view);
    let right = pair.right.variables(view);

    let mut found = Vec::new();
    for (key, snapshots) in &left {
        if !permitted(allowed, key) {
            continue;
        }
        let (Some(mine), Some(theirs)) = (
            snapshots.first(),
            right.get(key).and_then(|snapshots| snapshots.first()),
        ) else {
            continue;
        };
        for (name, left_value, right_value) in mine.shared(theirs) {
            if left_value == right_value || is_unavailable(left_value) || is_unavailable(right_value) {
                continue;
            }
            let kind = DiscrepancyKind::Value {
                key: key.clone(),
                name: name.to_string(),
                left: left_value.to_string(),
                right: right_value.to_string(),
                text: engine.source.annotate(key),
            };
            found.push(record(engine, pair, Check::Variable, view, kind));
        }
    }
    found
}
