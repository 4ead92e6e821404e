#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use reql_protocol::{FRAME_HEADER_SIZE, FrameHeader};

fuzz_target!(|data: &[u8]| {
    let mut buf = Bytes::copy_from_slice(data);
    if let Ok(header) = FrameHeader::decode(&mut buf) {
        // A decoded header must re-encode to the same bytes.
        let mut out = Vec::with_capacity(FRAME_HEADER_SIZE);
        header.encode(&mut out);
        assert_eq!(&out[..], &data[..FRAME_HEADER_SIZE]);
        let _ = header.frame_length();
    }
});
