#![no_main]

use libfuzzer_sys::fuzz_target;
use ticketdeck_core::FilterState;
use ticketdeck_core::persist::{decode_query, encode_query};

// Any location query decodes to a state whose canonical encoding is a fixed point.
fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let mut first = FilterState::default();
    decode_query(raw).apply_to(&mut first);
    let canonical = encode_query(&first);

    let mut second = FilterState::default();
    decode_query(&canonical).apply_to(&mut second);
    assert_eq!(first, second);
    assert_eq!(canonical, encode_query(&second));
});
