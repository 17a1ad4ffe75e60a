use proptest::prelude::*;
use ticketdeck_core::pagination::{clamp_page, page_window, total_pages};
use ticketdeck_core::persist::{decode_query, encode_query};
use ticketdeck_core::{FilterState, PageButton, PageState, PaginationView, SortKey, StatusFilter};

fn arb_status() -> impl Strategy<Value = StatusFilter> {
    prop_oneof![
        Just(StatusFilter::All),
        "[a-z_]{1,12}".prop_map(StatusFilter::Only),
        prop::sample::select(vec!["all", "ALL", " All ", "", "  ", " resolu "])
            .prop_map(|raw| StatusFilter::Only(raw.to_string())),
    ]
}

fn arb_sort() -> impl Strategy<Value = SortKey> {
    prop_oneof![
        Just(SortKey::Recent),
        Just(SortKey::Oldest),
        Just(SortKey::Deadline),
        "[a-z_]{1,10}".prop_map(|raw| SortKey::parse(&raw)),
        prop::sample::select(vec!["", "recent", " oldest ", "priority"])
            .prop_map(|raw| SortKey::Other(raw.to_string())),
    ]
}

fn arb_filter() -> impl Strategy<Value = FilterState> {
    (
        arb_status(),
        arb_sort(),
        "[ -~]{0,24}",
        "[a-zA-Z0-9 .&=+-]{0,12}",
        any::<bool>(),
    )
        .prop_map(|(status, sort, query, author, overdue_only)| FilterState {
            status,
            sort,
            query,
            author,
            overdue_only,
        })
}

proptest! {
    #[test]
    fn total_pages_is_ceiling_and_at_least_one(total in 0u64..100_000, per_page in 1u32..200) {
        let pages = u64::from(total_pages(total, per_page));
        prop_assert!(pages >= 1);
        prop_assert!(pages * u64::from(per_page) >= total);
        if total > 0 {
            prop_assert!((pages - 1) * u64::from(per_page) < total);
        }
    }

    #[test]
    fn apply_total_keeps_page_in_range(requested in 0u32..500, total in 0u64..5_000, per_page in 1u32..50) {
        let mut state = PageState::new(per_page);
        state.request_page(requested);
        state.apply_total(total);
        prop_assert!(state.is_consistent());
        prop_assert_eq!(state.current_page, clamp_page(requested.max(1), state.total_pages));
    }

    #[test]
    fn window_is_full_and_contains_current(current in 1u32..300, total in 1u32..300, width in 1u32..12) {
        let (start, end) = page_window(current, total, width);
        let current = clamp_page(current, total);
        prop_assert!(start >= 1 && end <= total && start <= end);
        prop_assert!(start <= current && current <= end);
        prop_assert_eq!(end - start + 1, width.min(total));
    }

    #[test]
    fn selector_lists_each_page_once_in_order(current in 1u32..80, total in 2u32..80, width in 1u32..9) {
        let state = PageState {
            current_page: clamp_page(current, total),
            items_per_page: 1,
            total_items: u64::from(total),
            total_pages: total,
        };
        let view = PaginationView::for_state(&state, width).expect("more than one page");
        let numbers: Vec<u32> = view
            .buttons
            .iter()
            .filter_map(|button| match button {
                PageButton::Page { number, .. } => Some(*number),
                PageButton::Ellipsis => None,
            })
            .collect();
        prop_assert_eq!(numbers.first().copied(), Some(1));
        prop_assert_eq!(numbers.last().copied(), Some(total));
        prop_assert!(numbers.windows(2).all(|w| w[0] < w[1]));
        // an ellipsis always stands for at least one hidden page
        for (i, button) in view.buttons.iter().enumerate() {
            if *button == PageButton::Ellipsis {
                let before = match view.buttons[i - 1] { PageButton::Page { number, .. } => number, PageButton::Ellipsis => 0 };
                let after = match view.buttons[i + 1] { PageButton::Page { number, .. } => number, PageButton::Ellipsis => 0 };
                prop_assert!(after - before >= 2);
            }
        }
    }

    #[test]
    fn location_round_trip(state in arb_filter()) {
        let query = encode_query(&state);
        prop_assert!(!query.to_ascii_lowercase().contains("status=all"));
        prop_assert!(!query.contains("status=&") && !query.ends_with("status="));
        let mut restored = FilterState::default();
        decode_query(&query).apply_to(&mut restored);
        prop_assert_eq!(restored, state.normalized());
    }
}
