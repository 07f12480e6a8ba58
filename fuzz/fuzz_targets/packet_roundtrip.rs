#![no_main]
use libfuzzer_sys::fuzz_target;

use lifx_core::{decode, encode, Response};

fuzz_target!(|data: &[u8]| {
    // arbitrary network input must never panic
    let packet = match decode(data) {
        Ok(packet) => packet,
        Err(_) => return,
    };
    let _ = Response::from_packet(&packet);

    // reserved bits and the origin/tagged flags are not preserved, so compare the decoded form
    let bytes = encode(&packet.header, packet.typ, &packet.payload).unwrap();
    assert_eq!(bytes.len(), data.len());
    let again = decode(&bytes).unwrap();
    assert_eq!(again.typ, packet.typ);
    assert_eq!(again.source, packet.source);
    assert_eq!(again.payload, packet.payload);
    assert_eq!(again.header.target, packet.header.target);
    assert_eq!(again.header.sequence, packet.header.sequence);
    assert_eq!(again.header.ack_required, packet.header.ack_required);
    assert_eq!(again.header.res_required, packet.header.res_required);
});
