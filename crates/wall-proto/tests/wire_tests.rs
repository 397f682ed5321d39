#![allow(missing_docs)]
use proptest::prelude::*;
use wall_math::{Mat4, Vec3};
use wall_proto::{
    decode_transfer_function, encode_transfer_function, packet, CameraBlob, Command, Message,
    SyncBlock, TfPoint, WireError, MAX_TF_POINTS,
};

fn bits(points: &[TfPoint]) -> Vec<[u32; 5]> {
    points
        .iter()
        .map(|p| {
            [
                p.r.to_bits(),
                p.g.to_bits(),
                p.b.to_bits(),
                p.a.to_bits(),
                p.position.to_bits(),
            ]
        })
        .collect()
}

fn any_point() -> impl Strategy<Value = TfPoint> {
    // Raw bit patterns cover NaN payloads, infinities and subnormals.
    prop::array::uniform5(any::<u32>())
        .prop_map(|b| TfPoint::new(
            f32::from_bits(b[0]),
            f32::from_bits(b[1]),
            f32::from_bits(b[2]),
            f32::from_bits(b[3]),
            f32::from_bits(b[4]),
        ))
}

proptest! {
    #[test]
    fn transfer_function_is_bit_exact(points in prop::collection::vec(any_point(), 0..=MAX_TF_POINTS)) {
        let bytes = encode_transfer_function(&points).unwrap();
        prop_assert_eq!(bytes.len(), 4 + 20 * points.len());
        let back = decode_transfer_function(&bytes).unwrap();
        prop_assert_eq!(bits(&back), bits(&points));
    }

    #[test]
    fn message_decoder_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = Message::decode(&bytes);
    }

    #[test]
    fn payload_decoders_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = Command::from_bytes(&bytes);
        let _ = SyncBlock::from_bytes(&bytes);
        let _ = decode_transfer_function(&bytes);
    }

    #[test]
    fn sync_block_survives_packet_framing(
        frame in any::<u32>(),
        dt in 0.0f64..1.0,
        time in 0.0f64..1e6,
        target in -1i32..8,
        pos in prop::array::uniform3(-100.0f32..100.0),
        yaw in -3.0f32..3.0,
    ) {
        let block = SyncBlock {
            frame,
            dt,
            time,
            cross_fade_target: target,
            camera: CameraBlob::from_position(Vec3::from(pos)),
            transform: Mat4::rotation_y(yaw).with_translation(Vec3::from(pos)),
        };
        let bytes = Message::Sync(block).encode().unwrap();
        let (msg, used) = Message::decode(&bytes).unwrap();
        prop_assert_eq!(used, bytes.len());
        prop_assert_eq!(msg, Message::Sync(block));
    }
}

#[test]
fn control_messages_decode_back() {
    let msgs = [
        Message::Hello {
            hostname: "cave-3.local".into(),
        },
        Message::Welcome {
            rank: 3,
            worker_count: 4,
        },
        Message::BarrierArrive { epoch: 41 },
        Message::BarrierRelease { epoch: 41 },
        Message::Command(Command::new("draw_balls", vec![0], vec![])),
        Message::TransferFunction(vec![TfPoint::new(0.0, 0.0, 1.0, 0.0, 0.0)]),
        Message::Shutdown,
    ];
    let mut stream = Vec::new();
    for m in &msgs {
        stream.extend_from_slice(&m.encode().unwrap());
    }
    let mut offset = 0;
    for expected in &msgs {
        let (msg, used) = Message::decode(&stream[offset..]).unwrap();
        assert_eq!(&msg, expected);
        offset += used;
    }
    assert_eq!(offset, stream.len());
}

#[test]
fn oversized_payloads_are_refused() {
    let too_many = vec![TfPoint::new(0.0, 0.0, 0.0, 0.0, 0.0); MAX_TF_POINTS + 1];
    assert!(matches!(
        Message::TransferFunction(too_many).encode(),
        Err(WireError::InvalidCount { .. })
    ));
    let long_name = Command::new("x".repeat(300), vec![], vec![]);
    assert!(long_name.to_bytes().is_err());

    let mut header = [0u8; packet::HEADER_SIZE];
    header.copy_from_slice(&Message::BarrierArrive { epoch: 0 }.encode().unwrap()[..12]);
    header[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
    assert_eq!(
        packet::frame_len(&header),
        Err(WireError::PayloadTooLarge(u32::MAX))
    );
}

/// Flipping any single bit of a packet must never decode to a different
/// message.
#[test]
fn single_bit_flips_are_caught() {
    use rand::prelude::*;
    let mut rng = StdRng::seed_from_u64(7);
    let original = Message::Command(Command::new("color_scale", vec![], vec![1.3]))
        .encode()
        .unwrap();
    for _ in 0..500 {
        let mut bytes = original.clone();
        let bit = rng.gen_range(0..bytes.len() * 8);
        bytes[bit / 8] ^= 1 << (bit % 8);
        assert!(Message::decode(&bytes).is_err(), "bit {bit} slipped through");
    }
}
