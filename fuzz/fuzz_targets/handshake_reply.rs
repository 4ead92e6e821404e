#![no_main]

use libfuzzer_sys::fuzz_target;
use reql_protocol::HandshakeReply;

fuzz_target!(|data: &[u8]| {
    let reply = HandshakeReply::parse(data);
    let _ = reply.is_success();
    assert!(!reply.message().contains('\n'));
});
