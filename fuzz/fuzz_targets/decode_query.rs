#![no_main]

use libfuzzer_sys::fuzz_target;
use reql_protocol::Query;

fuzz_target!(|data: &[u8]| {
    if let Ok(query) = Query::decode(1, data) {
        // Anything we accept must survive our own encoder.
        let encoded = query.encode();
        assert!(Query::decode(1, &encoded).is_ok());
    }
});
