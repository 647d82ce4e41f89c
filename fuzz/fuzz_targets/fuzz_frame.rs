#![no_main]
use datagram_protocol::core::envelope;
use datagram_protocol::core::frame::Fragment;
use datagram_protocol::core::nack::NackRequest;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = envelope::open(data, None);
    let _ = Fragment::from_bytes(data);
    let _ = NackRequest::decode(data);
});
