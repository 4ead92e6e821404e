#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use reql_protocol::Response;

#[derive(Debug, Arbitrary)]
struct FuzzResponse {
    token: i64,
    payload: Vec<u8>,
}

fuzz_target!(|input: FuzzResponse| {
    if let Ok(response) = Response::decode(input.token, &input.payload) {
        assert_eq!(response.token, input.token);
        let _ = response.is_feed();
        let _ = response.error_message();
    }
});
