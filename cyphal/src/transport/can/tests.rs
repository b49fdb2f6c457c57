use embedded_time::Clock;

use super::{Can, CanFrame};
use crate::testing::TestClock;
use crate::transfer::{Frame, TransferMetadata};
use crate::transport::Transport;
use crate::{Priority, TransferKind};

fn metadata(clock: &TestClock, transfer_kind: TransferKind, port_id: u16, transfer_id: u8) -> TransferMetadata<TestClock> {
    TransferMetadata {
        timestamp: clock.try_now().unwrap(),
        priority: Priority::Nominal,
        transfer_kind,
        port_id,
        remote_node_id: None,
        transfer_id,
        data_type_crc: 0xFFFF,
    }
}

#[test]
fn single_frame_message_round_trips() {
    let clock = TestClock::new();
    let metadata = metadata(&clock, TransferKind::Message, 341, 7);
    let mut tx_metadata = <Can as Transport<TestClock>>::TxMetadata::default();

    let (frame, consumed) =
        Can::transmit_frame(&metadata, &mut tx_metadata, b"hello", Some(42), clock.try_now().unwrap()).unwrap();
    assert_eq!(consumed, 5);

    let (parsed, frame_metadata) = Can::rx_process_frame(&frame).unwrap();
    assert_eq!(parsed.payload, b"hello");
    assert!(parsed.first_frame);
    assert!(parsed.last_frame);
    assert!(!frame_metadata.toggle_bit);
    assert_eq!(parsed.metadata.port_id, 341);
    assert_eq!(parsed.metadata.remote_node_id, Some(42));
    assert_eq!(parsed.metadata.transfer_id, 7);
}

#[test]
fn multi_frame_transfer_crc_round_trips() {
    let clock = TestClock::new();
    let metadata = metadata(&clock, TransferKind::Message, 100, 3);

    // 10 bytes of payload: larger than the 7-byte single-frame threshold, so
    // the transport must prepend a CRC before fragmenting.
    let mut buf = [0u8; 12];
    buf[0..10].copy_from_slice(b"0123456789");
    let real_len = Can::process_tx_crc(&mut buf, 10, metadata.data_type_crc);
    assert_eq!(real_len, 12);

    let mut tx_metadata = <Can as Transport<TestClock>>::TxMetadata::default();
    let mut rx_metadata = <Can as Transport<TestClock>>::RxMetadata::default();
    let mut reassembled = alloc::vec::Vec::new();

    let mut remaining = &buf[0..real_len];
    while !remaining.is_empty() {
        let (frame, consumed) =
            Can::transmit_frame(&metadata, &mut tx_metadata, remaining, Some(9), clock.try_now().unwrap()).unwrap();
        let (parsed, frame_metadata) = Can::rx_process_frame(&frame).unwrap();
        Can::update_rx_metadata(&mut rx_metadata, &frame_metadata, &parsed).unwrap();
        reassembled.extend_from_slice(parsed.payload);
        remaining = &remaining[consumed..];
    }

    let payload = Can::finalize_rx_payload(&rx_metadata, &reassembled);
    assert_eq!(payload, b"0123456789");
}

#[test]
fn corrupted_payload_byte_trips_crc_error() {
    let clock = TestClock::new();
    let metadata = metadata(&clock, TransferKind::Message, 100, 3);

    let mut buf = [0u8; 12];
    buf[0..10].copy_from_slice(b"0123456789");
    let real_len = Can::process_tx_crc(&mut buf, 10, metadata.data_type_crc);

    // Flip a bit well past the CRC header, inside the payload proper.
    buf[5] ^= 0x01;

    let mut tx_metadata = <Can as Transport<TestClock>>::TxMetadata::default();
    let mut rx_metadata = <Can as Transport<TestClock>>::RxMetadata::default();
    let mut remaining = &buf[0..real_len];
    let mut last_result = Ok(());
    while !remaining.is_empty() {
        let (frame, consumed) =
            Can::transmit_frame(&metadata, &mut tx_metadata, remaining, Some(9), clock.try_now().unwrap()).unwrap();
        let (parsed, frame_metadata) = Can::rx_process_frame(&frame).unwrap();
        last_result = Can::update_rx_metadata(&mut rx_metadata, &frame_metadata, &parsed);
        remaining = &remaining[consumed..];
    }

    assert!(matches!(last_result, Err(crate::RxError::CrcError)));
}

#[test]
fn duplicate_toggle_is_rejected() {
    let clock = TestClock::new();
    let metadata = metadata(&clock, TransferKind::Message, 100, 3);
    let frame = Frame {
        metadata: metadata.clone(),
        payload: b"x",
        first_frame: true,
        last_frame: false,
    };
    let mut rx_metadata = <Can as Transport<TestClock>>::RxMetadata::default();
    // Toggle starts low on the first frame of a transfer.
    let frame_metadata = super::FrameMetadata { toggle_bit: false };
    assert!(Can::update_rx_metadata(&mut rx_metadata, &frame_metadata, &frame).is_ok());

    // Repeating the same toggle value on the next frame must fail.
    assert!(Can::update_rx_metadata(&mut rx_metadata, &frame_metadata, &frame).is_err());
}

#[test]
fn start_of_transfer_with_toggle_set_is_rejected() {
    let clock = TestClock::new();
    // Non-anonymous source, full 7 data bytes (MTU-filling, non-last frame).
    // Tail byte 0xA0: start-of-transfer set, toggle also set — invalid, the
    // first frame of a transfer must carry a cleared toggle bit.
    let id = CanFrame::<TestClock>::new(
        clock.try_now().unwrap(),
        0x1000_0001,
        &[1, 2, 3, 4, 5, 6, 7, 0xA0],
    );
    assert!(Can::rx_process_frame(&id).is_err());
}

#[test]
fn start_of_transfer_with_toggle_clear_is_accepted() {
    let clock = TestClock::new();
    // Tail byte 0x80: start-of-transfer set, toggle clear — the valid first
    // frame of a transfer.
    let id = CanFrame::<TestClock>::new(
        clock.try_now().unwrap(),
        0x1000_0001,
        &[1, 2, 3, 4, 5, 6, 7, 0x80],
    );
    assert!(Can::rx_process_frame(&id).is_ok());
}
