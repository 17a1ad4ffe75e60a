#![no_main]

use libfuzzer_sys::fuzz_target;
use ticketdeck_core::TicketPage;

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = std::str::from_utf8(data) {
        let _ = TicketPage::from_json(body);
    }
});
