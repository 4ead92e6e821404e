#![no_main]

use libfuzzer_sys::fuzz_target;
use reql_types::{FormatOptions, convert_pseudo};
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = serde_json::from_slice::<Value>(data) {
        let _ = convert_pseudo(value.clone(), &FormatOptions::default());
    }
});
