//! Integration tests for the `#[derive(Wire)]` macro.
//!
//! These tests check the generated layouts by actually shipping records
//! through the byte encoding used between ranks.

use glam::{DVec2, Vec2};
use pflock::comm::{decode_records, encode_records};
use pflock::{Boid, Vec2d, Wire, WireRecord};
use std::mem::{align_of, size_of};

#[derive(Wire, Clone, Copy, Debug, PartialEq)]
struct Marker {
    tag: u32,
    position: Vec2d,
}

#[derive(Wire, Clone, Copy, Debug, PartialEq)]
struct Tracer {
    position: DVec2,
    weight: f32,
}

#[derive(Wire, Clone, Copy, Debug, PartialEq)]
struct Mixed {
    a: f32,
    b: u64,
    c: i32,
    d: Vec2,
    e: i64,
    f: f64,
}

#[derive(Wire, Clone, Copy, Debug, PartialEq)]
struct Narrow {
    count: u32,
}

#[test]
fn test_boid_layout() {
    assert_eq!(size_of::<<Boid as WireRecord>::Wire>(), 40);
    assert_eq!(Boid::FIELD_NAMES, &["position", "velocity", "id"]);
}

#[test]
fn test_leading_small_field_is_padded() {
    assert_eq!(size_of::<MarkerWire>(), 24);
    assert_eq!(align_of::<MarkerWire>(), 8);

    let marker = Marker {
        tag: 7,
        position: DVec2::new(1.0, -2.0),
    };
    let wire = marker.to_wire();
    assert_eq!(wire._pad0, 0);
    assert_eq!(wire.position, [1.0, -2.0]);
    assert_eq!(Marker::from_wire(&wire), marker);
}

#[test]
fn test_trailing_small_field_is_padded() {
    assert_eq!(size_of::<TracerWire>(), 24);
    let tracer = Tracer {
        position: DVec2::new(0.5, 0.25),
        weight: 3.5,
    };
    assert_eq!(Tracer::from_wire(&tracer.to_wire()), tracer);
}

#[test]
fn test_mixed_layout() {
    // a:4 pad:4 b:8 c:4 d:8 pad:4 e:8 f:8
    assert_eq!(size_of::<MixedWire>(), 48);
    assert_eq!(Mixed::FIELD_NAMES, &["a", "b", "c", "d", "e", "f"]);

    let records = vec![
        Mixed {
            a: 1.5,
            b: u64::MAX,
            c: -3,
            d: Vec2::new(0.25, 8.0),
            e: i64::MIN,
            f: std::f64::consts::PI,
        },
        Mixed {
            a: -0.0,
            b: 0,
            c: i32::MAX,
            d: Vec2::ZERO,
            e: 42,
            f: 1e-300,
        },
    ];
    let bytes = encode_records(&records);
    assert_eq!(bytes.len(), 96);
    assert_eq!(decode_records::<Mixed>(5, &bytes, 2).unwrap(), records);
}

#[test]
fn test_narrow_record_rounds_up_to_eight_bytes() {
    assert_eq!(size_of::<NarrowWire>(), 8);
    let bytes = encode_records(&[Narrow { count: 3 }, Narrow { count: 9 }]);
    assert_eq!(bytes.len(), 16);
    let back = decode_records::<Narrow>(0, &bytes, 2).unwrap();
    assert_eq!(back[1].count, 9);
}

#[test]
fn test_truncated_payload_is_rejected() {
    let bytes = encode_records(&[Narrow { count: 3 }]);
    let err = decode_records::<Narrow>(2, &bytes[..4], 1).unwrap_err();
    assert!(matches!(
        err,
        pflock::CommError::MalformedPayload {
            source_rank: 2,
            expected: 8,
            actual: 4
        }
    ));
}
