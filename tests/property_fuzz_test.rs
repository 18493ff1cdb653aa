use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use form_harness::{Dom, ElementHandle, Harness};
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::test_runner::{FileFailurePersistence, TestCaseError, TestCaseResult};

const PROPTEST_REGRESSION_FILE: &str = "tests/proptest-regressions/property_fuzz_test.txt";
const DEFAULT_PROPTEST_CASES: u32 = 128;

fn proptest_cases() -> u32 {
    std::env::var("FORM_HARNESS_PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_PROPTEST_CASES)
}

fn fail(err: form_harness::Error) -> TestCaseError {
    TestCaseError::fail(format!("{err:?}"))
}

fn text_strategy() -> BoxedStrategy<String> {
    vec(
        prop_oneof![
            Just('a'),
            Just('z'),
            Just('0'),
            Just('9'),
            Just(' '),
            Just('.'),
            Just('-'),
            Just('ñ'),
            Just('é'),
        ],
        0..=8,
    )
    .prop_map(|chars| chars.into_iter().collect())
    .boxed()
}

/// Each entry picks the parent of node `i + 1` among nodes `0..=i`, where node
/// 0 is the body.
fn tree_shape_strategy() -> BoxedStrategy<Vec<(usize, bool)>> {
    vec((any::<prop::sample::Index>(), any::<bool>()), 1..=24)
        .prop_map(|picks| {
            picks
                .into_iter()
                .enumerate()
                .map(|(i, (index, is_span))| (index.index(i + 1), is_span))
                .collect()
        })
        .boxed()
}

fn model_preorder(children: &[Vec<usize>], node: usize, out: &mut Vec<usize>) {
    out.push(node);
    for child in &children[node] {
        model_preorder(children, *child, out);
    }
}

fn assert_query_order_matches_model(shape: &[(usize, bool)]) -> TestCaseResult {
    let mut dom = Dom::new();
    let mut handles = vec![dom.body()];
    let mut children = vec![Vec::new()];
    let mut is_span = vec![false];

    for (parent, span) in shape {
        let tag = if *span { "span" } else { "div" };
        let node = dom.create_element(tag);
        dom.append_child(handles[*parent], node).map_err(fail)?;
        children[*parent].push(handles.len());
        handles.push(node);
        children.push(Vec::new());
        is_span.push(*span);
    }

    let mut order = Vec::new();
    model_preorder(&children, 0, &mut order);
    let expected = order
        .into_iter()
        .filter(|index| is_span[*index])
        .map(|index| handles[index])
        .collect::<Vec<ElementHandle>>();

    let actual = dom.query_selector_all("span").map_err(fail)?;
    prop_assert_eq!(actual, expected);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        failure_persistence: Some(Box::new(
            FileFailurePersistence::Direct(PROPTEST_REGRESSION_FILE),
        )),
        .. ProptestConfig::default()
    })]

    #[test]
    fn last_value_write_wins(writes in vec(text_strategy(), 1..=12)) {
        let mut h = Harness::with_fixture().map_err(fail)?;
        for value in &writes {
            h.type_text("#nombre", value).map_err(fail)?;
        }
        let last = writes.last().cloned().unwrap_or_default();
        prop_assert_eq!(h.value("#nombre").map_err(fail)?, last);
    }

    #[test]
    fn query_selector_all_follows_document_preorder(shape in tree_shape_strategy()) {
        assert_query_order_matches_model(&shape)?;
    }

    #[test]
    fn timers_fire_in_due_then_registration_order(
        delays in vec(0u64..50, 1..=16),
        advance_by in 0u64..60,
    ) {
        let mut h = Harness::new();
        let fired = Rc::new(RefCell::new(Vec::new()));
        for (index, delay) in delays.iter().enumerate() {
            let log = Rc::clone(&fired);
            h.set_timeout(*delay, move |h| {
                log.borrow_mut().push((h.now_ms(), index));
                Ok(())
            });
        }
        h.advance(advance_by).map_err(fail)?;

        let mut expected = delays
            .iter()
            .enumerate()
            .filter(|(_, delay)| **delay <= advance_by)
            .map(|(index, delay)| (*delay, index))
            .collect::<Vec<_>>();
        expected.sort();
        prop_assert_eq!(fired.borrow().clone(), expected);
        prop_assert_eq!(h.now_ms(), advance_by);
    }

    #[test]
    fn removed_ids_never_resolve(ids in vec(0usize..6, 1..=12)) {
        let mut dom = Dom::build_fixture().map_err(fail)?;
        let mut live: HashMap<String, ElementHandle> = HashMap::new();
        for id in ids {
            let key = format!("item-{id}");
            if let Some(existing) = live.remove(&key) {
                dom.remove(existing).map_err(fail)?;
                prop_assert_eq!(dom.get_element_by_id(&key), None);
                prop_assert!(!dom.contains(existing));
            } else {
                let body = dom.body();
                let node = dom.create_element_with("p", &[("id", key.as_str())], "x");
                dom.append_child(body, node).map_err(fail)?;
                prop_assert_eq!(dom.get_element_by_id(&key), Some(node));
                live.insert(key, node);
            }
        }
    }
}
