use crate::errors::{StoreError, StoreResult};

pub const BASELINE_ORDER: f64 = 0.0;

/// Where a new sibling goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement<'a> {
    #[default]
    End,
    After(&'a str),
    Before(&'a str),
}

impl<'a> Placement<'a> {
    /// `after` wins when both anchors are given.
    pub fn from_anchors(after: Option<&'a str>, before: Option<&'a str>) -> Self {
        match (after, before) {
            (Some(anchor), _) => Self::After(anchor),
            (None, Some(anchor)) => Self::Before(anchor),
            (None, None) => Self::End,
        }
    }
}

/// Computes an order key for a new sibling without touching existing keys.
///
/// Repeated bisection of the same gap eventually runs out of `f64` resolution; keys are never
/// renumbered, so past that point the midpoint collapses onto a neighbour.
pub fn compute_order_key(siblings: &[(&str, f64)], placement: Placement<'_>) -> StoreResult<f64> {
    let mut sorted = siblings.to_vec();
    sorted.sort_by(|left, right| left.1.total_cmp(&right.1));

    let key = match placement {
        Placement::End => sorted
            .iter()
            .map(|(_, key)| *key)
            .reduce(f64::max)
            .map_or(BASELINE_ORDER, |max| max + 1.0),
        Placement::After(anchor) => {
            let index = anchor_index(&sorted, anchor)?;
            match sorted.get(index + 1) {
                Some((_, next)) => midpoint(sorted[index].1, *next),
                None => sorted[index].1 + 1.0,
            }
        }
        Placement::Before(anchor) => {
            let index = anchor_index(&sorted, anchor)?;
            match index.checked_sub(1).map(|prev| sorted[prev].1) {
                Some(prev) => midpoint(prev, sorted[index].1),
                None => sorted[index].1 - 1.0,
            }
        }
    };
    Ok(key)
}

fn anchor_index(sorted: &[(&str, f64)], anchor: &str) -> StoreResult<usize> {
    sorted
        .iter()
        .position(|(id, _)| *id == anchor)
        .ok_or_else(|| StoreError::NotFound(format!("sibling '{}' not found", anchor)))
}

fn midpoint(low: f64, high: f64) -> f64 {
    let mid = low + (high - low) / 2.0;
    if mid <= low || mid >= high {
        tracing::warn!(low, high, "order key gap exhausted");
    }
    mid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sibling_list_uses_baseline() {
        assert_eq!(compute_order_key(&[], Placement::End).expect("baseline"), BASELINE_ORDER);
        assert!(matches!(
            compute_order_key(&[], Placement::After("x")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn anchors_bisect_or_extend() {
        let siblings = [("b", 2.0), ("a", 1.0), ("c", 4.0)];
        assert_eq!(compute_order_key(&siblings, Placement::End).expect("end"), 5.0);
        assert_eq!(compute_order_key(&siblings, Placement::After("a")).expect("after a"), 1.5);
        assert_eq!(compute_order_key(&siblings, Placement::After("c")).expect("after c"), 5.0);
        assert_eq!(compute_order_key(&siblings, Placement::Before("c")).expect("before c"), 3.0);
        assert_eq!(compute_order_key(&siblings, Placement::Before("a")).expect("before a"), 0.0);
        assert!(matches!(
            compute_order_key(&siblings, Placement::Before("zzz")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn repeated_inserts_stay_monotonic() {
        let mut keyed: Vec<(String, f64)> = vec![("first".to_string(), 0.0), ("last".to_string(), 1.0)];

        let mut previous = "first".to_string();
        let mut after_keys = Vec::new();
        for round in 0..20 {
            let view: Vec<(&str, f64)> = keyed.iter().map(|(id, key)| (id.as_str(), *key)).collect();
            let key = compute_order_key(&view, Placement::After(&previous)).expect("after insert");
            after_keys.push(key);
            previous = format!("after-{}", round);
            keyed.push((previous.clone(), key));
        }
        assert!(after_keys.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(after_keys.iter().all(|key| *key > 0.0 && *key < 1.0));

        let mut first = "first".to_string();
        let mut before_keys = Vec::new();
        for round in 0..20 {
            let view: Vec<(&str, f64)> = keyed.iter().map(|(id, key)| (id.as_str(), *key)).collect();
            let key = compute_order_key(&view, Placement::Before(&first)).expect("before insert");
            before_keys.push(key);
            first = format!("before-{}", round);
            keyed.push((first.clone(), key));
        }
        assert!(before_keys.windows(2).all(|pair| pair[0] > pair[1]));
    }

    #[test]
    fn after_takes_precedence_over_before() {
        assert_eq!(Placement::from_anchors(Some("a"), Some("b")), Placement::After("a"));
        assert_eq!(Placement::from_anchors(None, Some("b")), Placement::Before("b"));
        assert_eq!(Placement::from_anchors(None, None), Placement::End);
    }
}
